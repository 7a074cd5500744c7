use crate::{Error, FillResult, Table};
use serde::{Deserialize, Serialize};

/// Successful reply to a fill request.
///
/// Times are in seconds. `time_difference` is `single_thread_time -
/// multi_thread_time` and is negative when the parallel pass was slower.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FillResponse {
    pub table: Table,
    pub single_thread_time: f64,
    pub multi_thread_time: f64,
    pub time_difference: f64,
}

impl From<FillResult> for FillResponse {
    fn from(result: FillResult) -> Self {
        let time_difference = result.time_difference_secs();
        Self {
            single_thread_time: result.single_thread_duration.as_secs_f64(),
            multi_thread_time: result.parallel_duration.as_secs_f64(),
            time_difference,
            table: result.table,
        }
    }
}

/// Failed reply to a fill request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Human-readable description.
    pub error: String,
    /// Stable machine-readable category, e.g. `invalid_dimension`.
    pub kind: String,
}

impl ErrorResponse {
    pub fn new(kind: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            kind: kind.into(),
        }
    }
}

impl From<&Error> for ErrorResponse {
    fn from(err: &Error) -> Self {
        Self::new(err.kind(), err.to_string())
    }
}
