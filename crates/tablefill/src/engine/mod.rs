//! The fill engine: validation, the sequential baseline, and the parallel
//! pass.
//!
//! [`FillEngine::fill_table`] always runs the baseline first on its own table,
//! then plans and runs the parallel fill on a fresh one. Only the parallel
//! table is returned; the baseline exists for its timing.

use crate::{
    Cell, Error, MAX_TABLE_CELLS, PartitionPlan, Result, Table, dispatch::fill_parallel,
    table::checked_dims,
};
use core::{num::NonZeroUsize, time::Duration};
use std::time::Instant;
use tokio_util::sync::CancellationToken;


/// Marker written by the sequential baseline.
pub const BASELINE_MARKER: Cell = 1;

/// Output of one [`FillEngine::fill_table`] call.
#[derive(Clone, Debug)]
pub struct FillResult {
    /// The table produced by the parallel pass.
    pub table: Table,
    /// The plan the parallel pass executed.
    pub plan: PartitionPlan,
    pub single_thread_duration: Duration,
    pub parallel_duration: Duration,
}

impl FillResult {
    /// `single - parallel` in seconds; negative when the parallel pass was
    /// slower.
    pub fn time_difference_secs(&self) -> f64 {
        self.single_thread_duration.as_secs_f64() - self.parallel_duration.as_secs_f64()
    }
}

/// A request to fill a `rows x cols` table with `threads` workers.
///
/// Fields are signed so that out-of-range input can be represented and
/// rejected with a typed error instead of failing to decode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FillRequest {
    pub rows: i64,
    pub cols: i64,
    #[cfg_attr(feature = "serde", serde(rename = "num_threads", alias = "threads"))]
    pub threads: i64,
}

impl FillRequest {
    pub const fn new(rows: i64, cols: i64, threads: i64) -> Self {
        Self {
            rows,
            cols,
            threads,
        }
    }
}

/// Runs table fills under fixed resource limits.
///
/// The engine holds no per-request state, so one instance can be shared by
/// any number of concurrent callers.
#[derive(Clone, Debug)]
pub struct FillEngine {
    max_workers: NonZeroUsize,
    max_cells: usize,
}

impl Default for FillEngine {
    /// One worker thread per CPU and the largest addressable table.
    fn default() -> Self {
        Self::builder().build()
    }
}

impl FillEngine {
    pub fn builder() -> FillEngineBuilder {
        FillEngineBuilder::default()
    }

    /// Upper bound on OS threads used by one parallel pass.
    pub const fn max_workers(&self) -> NonZeroUsize {
        self.max_workers
    }

    /// Upper bound on `rows * cols`.
    pub const fn max_cells(&self) -> usize {
        self.max_cells
    }

    /// Fills a `rows x cols` table sequentially and in parallel.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidDimension`] if `rows` or `cols` is negative.
    /// - [`Error::InvalidThreadCount`] if `threads < 1`.
    /// - [`Error::TableTooLarge`] if the table exceeds [`max_cells`] or its
    ///   buffer cannot be allocated.
    /// - [`Error::WorkerFailure`] if a partition task panicked.
    ///
    /// [`max_cells`]: Self::max_cells
    pub fn fill_table(&self, rows: i64, cols: i64, threads: i64) -> Result<FillResult> {
        self.fill_table_with_cancel(rows, cols, threads, &CancellationToken::new())
    }

    /// Same as [`fill_table`](Self::fill_table) for a decoded request.
    pub fn fill_request(&self, request: &FillRequest) -> Result<FillResult> {
        self.fill_table(request.rows, request.cols, request.threads)
    }

    /// Same as [`fill_table_with_cancel`](Self::fill_table_with_cancel) for a
    /// decoded request.
    pub fn fill_request_with_cancel(
        &self,
        request: &FillRequest,
        cancel: &CancellationToken,
    ) -> Result<FillResult> {
        self.fill_table_with_cancel(request.rows, request.cols, request.threads, cancel)
    }

    /// Like [`fill_table`](Self::fill_table), stopping early once `cancel`
    /// fires.
    ///
    /// Cancellation is checked before the baseline and before each partition
    /// is started. Partitions already running finish their own range.
    ///
    /// # Errors
    ///
    /// Everything [`fill_table`](Self::fill_table) returns, plus
    /// [`Error::Cancelled`].
    pub fn fill_table_with_cancel(
        &self,
        rows: i64,
        cols: i64,
        threads: i64,
        cancel: &CancellationToken,
    ) -> Result<FillResult> {
        let (r, c, threads) = self.validate(rows, cols, threads)?;

        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let alloc = || {
            Table::try_zeroed(r, c).ok_or(Error::TableTooLarge {
                rows,
                cols,
                max_cells: self.max_cells.min(MAX_TABLE_CELLS),
            })
        };

        let baseline = alloc()?;
        let single_thread_duration = time_baseline(baseline).1;

        let plan = PartitionPlan::new(r, c, threads);
        let mut table = alloc()?;
        let parallel_duration = fill_parallel(&mut table, &plan, self.max_workers, cancel)?;

        Ok(FillResult {
            table,
            plan,
            single_thread_duration,
            parallel_duration,
        })
    }

    fn validate(&self, rows: i64, cols: i64, threads: i64) -> Result<(usize, usize, NonZeroUsize)> {
        if rows < 0 || cols < 0 {
            return Err(Error::InvalidDimension { rows, cols });
        }
        // Counts beyond `usize` are clamped by the plan anyway.
        let t = NonZeroUsize::new(usize::try_from(threads).unwrap_or(usize::MAX))
            .filter(|_| threads >= 1)
            .ok_or(Error::InvalidThreadCount { threads })?;
        let (r, c) = checked_dims(rows, cols, self.max_cells)?;
        Ok((r, c, t))
    }
}

/// Builder for [`FillEngine`].
#[derive(Clone, Debug, Default)]
pub struct FillEngineBuilder {
    max_workers: Option<NonZeroUsize>,
    max_cells: Option<usize>,
}

impl FillEngineBuilder {
    /// Caps the OS threads of one parallel pass. Defaults to the CPU count.
    #[must_use]
    pub const fn max_workers(mut self, max_workers: NonZeroUsize) -> Self {
        self.max_workers = Some(max_workers);
        self
    }

    /// Caps `rows * cols`. Defaults to [`MAX_TABLE_CELLS`], the largest
    /// buffer that can be addressed.
    #[must_use]
    pub const fn max_cells(mut self, max_cells: usize) -> Self {
        self.max_cells = Some(max_cells);
        self
    }

    pub fn build(self) -> FillEngine {
        FillEngine {
            max_workers: self.max_workers.unwrap_or_else(default_workers),
            max_cells: self.max_cells.unwrap_or(MAX_TABLE_CELLS),
        }
    }
}

fn default_workers() -> NonZeroUsize {
    NonZeroUsize::new(num_cpus::get()).unwrap_or(NonZeroUsize::MIN)
}

/// Fills a fresh `rows x cols` table with [`BASELINE_MARKER`] in one pass.
///
/// Allocation happens before the timer starts; only the fill is measured.
///
/// # Panics
///
/// Panics if `rows * cols` overflows `usize` or cannot be allocated, like
/// [`Table::new`].
pub fn fill_sequential(rows: usize, cols: usize) -> (Table, Duration) {
    time_baseline(Table::new(rows, cols))
}

fn time_baseline(mut table: Table) -> (Table, Duration) {
    let start = Instant::now();
    table.fill_range(0, table.rows(), BASELINE_MARKER);
    (table, start.elapsed())
}

/// Runs [`FillEngine::fill_table`] on a default engine.
///
/// # Errors
///
/// See [`FillEngine::fill_table`].
pub fn fill_table(rows: i64, cols: i64, threads: i64) -> Result<FillResult> {
    FillEngine::default().fill_table(rows, cols, threads)
}
