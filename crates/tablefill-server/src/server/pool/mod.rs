//! Admission control for CPU-bound fills.
//!
//! - [`manager`] - [`manager::FillPool`], the semaphore-bounded front of the
//!   fill engine, plus in-flight tracking for graceful shutdown.

pub mod manager;
