//! Partition planning.
//!
//! A [`PartitionPlan`] decides which axis of a table is split and computes one
//! contiguous index range per worker. The ranges are disjoint and cover the
//! axis exactly once, which is what lets the dispatcher write into a single
//! shared buffer without locking.
//!
//! ## Axis choice
//!
//! The requested thread count is first clamped to `max(rows, cols, 1)`. If the
//! clamped count exceeds the number of rows, splitting by rows would leave
//! workers with nothing to do, so the plan splits by columns instead.
//! Otherwise it splits by rows.
//!
//! ## Range computation
//!
//! An axis of length `N` split into `k` parts uses a base size of `N / k`.
//! The first `k - 1` ranges get exactly that many indices and the last range
//! absorbs the remainder.

use crate::Cell;
use core::{num::NonZeroUsize, ops::Range};


/// The table axis a plan splits along.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Axis {
    Rows,
    Columns,
}

/// One worker's share of the table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Partition {
    /// Zero-based position in the plan.
    pub index: usize,
    /// Indices along the plan's axis.
    pub range: Range<usize>,
    /// Value written into every cell of the partition (`index + 1`).
    pub marker: Cell,
}

/// Disjoint, ordered ranges covering one axis of a `rows x cols` table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PartitionPlan {
    rows: usize,
    cols: usize,
    axis: Axis,
    effective_threads: usize,
    ranges: Vec<Range<usize>>,
}

impl PartitionPlan {
    /// Builds the plan for a `rows x cols` table and `requested` workers.
    ///
    /// A table with zero rows or zero columns gets an empty plan: there is
    /// nothing to fill, so no worker is scheduled.
    pub fn new(rows: usize, cols: usize, requested: NonZeroUsize) -> Self {
        let effective_threads = effective_threads(rows, cols, requested);
        let axis = if effective_threads > rows {
            Axis::Columns
        } else {
            Axis::Rows
        };

        let ranges = if rows == 0 || cols == 0 {
            Vec::new()
        } else {
            let len = match axis {
                Axis::Rows => rows,
                Axis::Columns => cols,
            };
            split_ranges(len, effective_threads)
        };

        Self {
            rows,
            cols,
            axis,
            effective_threads,
            ranges,
        }
    }

    pub const fn axis(&self) -> Axis {
        self.axis
    }

    /// The requested thread count after clamping to the larger dimension.
    pub const fn effective_threads(&self) -> usize {
        self.effective_threads
    }

    /// Number of partitions that will actually run.
    ///
    /// Equal to [`effective_threads`](Self::effective_threads) unless the
    /// table is empty, in which case it is zero.
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn ranges(&self) -> &[Range<usize>] {
        &self.ranges
    }

    pub const fn table_rows(&self) -> usize {
        self.rows
    }

    pub const fn table_cols(&self) -> usize {
        self.cols
    }

    /// Iterates over the partitions in range order.
    pub fn partitions(&self) -> impl ExactSizeIterator<Item = Partition> + '_ {
        self.ranges
            .iter()
            .enumerate()
            .map(|(index, range)| Partition {
                index,
                range: range.clone(),
                marker: marker_for(index),
            })
    }
}

/// `min(requested, max(rows, cols, 1))`.
pub fn effective_threads(rows: usize, cols: usize, requested: NonZeroUsize) -> usize {
    requested.get().min(rows.max(cols).max(1))
}

/// Splits `[0, len)` into `parts` contiguous ranges, the last one taking the
/// remainder.
///
/// When `parts > len` the leading ranges are empty; [`PartitionPlan`] never
/// asks for that because of the clamp.
///
/// # Panics
///
/// Panics if `parts == 0`.
pub fn split_ranges(len: usize, parts: usize) -> Vec<Range<usize>> {
    assert!(parts > 0, "cannot split into zero parts");
    let size = len / parts;
    (0..parts)
        .map(|t| {
            let start = t * size;
            let end = if t + 1 == parts { len } else { start + size };
            start..end
        })
        .collect()
}

/// Fill marker for the partition at `index`.
///
/// Saturates rather than wrapping so that a pathological plan can never
/// collide with the zero value.
pub(crate) fn marker_for(index: usize) -> Cell {
    Cell::try_from(index).map_or(Cell::MAX, |i| i.saturating_add(1))
}
