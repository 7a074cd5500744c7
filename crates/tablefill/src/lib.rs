//! # tablefill
//!
//! Fills a `rows x cols` table twice, once in a single pass and once split
//! across worker threads, and reports how long each took.
//!
//! The interesting part is the parallel pass:
//!
//! - A [`PartitionPlan`] clamps the requested thread count to the larger table
//!   dimension, picks an axis (columns when there are more workers than rows,
//!   rows otherwise) and cuts that axis into contiguous ranges, the last one
//!   absorbing the remainder.
//! - [`Table::split_partitions`] turns the plan into disjoint mutable views of
//!   one shared buffer. Disjointness is guaranteed by construction, so workers
//!   never lock.
//! - [`fill_parallel`] runs the views on at most `max_workers` scoped threads,
//!   joins them all, and reports worker panics or cancellation as
//!   [`enum@Error`] values.
//!
//! Worker `t` writes the marker `t + 1`, which makes partition boundaries
//! visible in the output.
//!
//! ## Example
//!
//! ```
//! let result = tablefill::fill_table(4, 4, 2).unwrap();
//! assert_eq!(
//!     result.table.to_nested(),
//!     vec![
//!         vec![1, 1, 1, 1],
//!         vec![1, 1, 1, 1],
//!         vec![2, 2, 2, 2],
//!         vec![2, 2, 2, 2],
//!     ]
//! );
//! ```
//!
//! ## Features
//!
//! - `serde`: `Serialize`/`Deserialize` for [`Table`] and [`FillRequest`],
//!   plus the `FillResponse` and `ErrorResponse` wire types.
//!
//! This crate performs no I/O and does not log.

mod dispatch;
mod engine;
mod error;
mod partition;
#[cfg(feature = "serde")]
mod serde;
mod table;

pub use crate::dispatch::fill_parallel;
pub use crate::engine::*;
pub use crate::error::*;
pub use crate::partition::*;
#[cfg(feature = "serde")]
pub use crate::serde::*;
pub use crate::table::*;
// Re-exported so callers can build tokens without depending on tokio-util.
pub use tokio_util::sync::CancellationToken;
