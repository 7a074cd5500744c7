/// A result type defaulting to [`enum@Error`].
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// All possible errors that a fill can produce.
///
/// Every variant is reported to the caller as a value. A failed
/// [`FillEngine`](crate::FillEngine) call never hands back a partially
/// written table.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// A table dimension was negative.
    #[error("invalid dimension: rows={rows}, cols={cols} (both must be >= 0)")]
    InvalidDimension { rows: i64, cols: i64 },

    /// The requested thread count was below one.
    #[error("invalid thread count: {threads} (must be >= 1)")]
    InvalidThreadCount { threads: i64 },

    /// `rows * cols` overflowed or exceeded the engine's cell limit.
    #[error("table {rows}x{cols} exceeds the limit of {max_cells} cells")]
    TableTooLarge {
        rows: i64,
        cols: i64,
        max_cells: usize,
    },

    /// A partition task faulted. `partition` is the lowest failing index.
    #[error("worker for partition {partition} failed: {reason}")]
    WorkerFailure { partition: usize, reason: String },

    /// The fill was cancelled before every partition ran.
    #[error("fill cancelled")]
    Cancelled,
}

impl Error {
    /// Stable, machine-readable name of the variant.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::InvalidDimension { .. } => "invalid_dimension",
            Self::InvalidThreadCount { .. } => "invalid_thread_count",
            Self::TableTooLarge { .. } => "table_too_large",
            Self::WorkerFailure { .. } => "worker_failure",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether the error was caused by the caller's input.
    pub const fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            Self::InvalidDimension { .. }
                | Self::InvalidThreadCount { .. }
                | Self::TableTooLarge { .. }
        )
    }
}
