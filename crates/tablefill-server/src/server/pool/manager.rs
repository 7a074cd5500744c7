//! Bounded execution of fills on tokio's blocking pool.
//!
//! This module defines [`FillPool`], which owns the [`FillEngine`] and limits
//! how many fills run at once with a [`Semaphore`]. Each admitted fill runs on
//! a blocking thread so the async accept loop and connection tasks are never
//! stalled by CPU-bound work. The engine itself caps the OS threads a single
//! fill may spawn.
//!
//! Shutdown is coordinated through a shared [`CancellationToken`]: in-flight
//! fills observe it between partitions and return
//! [`tablefill::Error::Cancelled`].

use crate::server::{
    error::{Result, ServiceError},
    telemetry::{decrement_fills_inflight, increment_fills_inflight},
};
use core::time::Duration;
use portable_atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tablefill::{FillEngine, FillRequest, FillResult};
use tokio::{
    sync::Semaphore,
    time::{sleep, timeout},
};
use tokio_util::sync::CancellationToken;

/// Upper bound on how long cancelled fills get to unwind during shutdown.
const CANCEL_GRACE: Duration = Duration::from_secs(3);

/// Admission control and shutdown coordination for fills.
pub struct FillPool {
    engine: FillEngine,
    permits: Arc<Semaphore>,
    shutdown_token: CancellationToken,
    shutdown_timeout: Duration,
    closing: AtomicBool,
    inflight: Arc<AtomicUsize>,
}

/// Marks one connection as in flight until dropped.
///
/// Shutdown waits for every guard to be released before cancelling work.
pub struct InflightGuard {
    inflight: Arc<AtomicUsize>,
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        self.inflight.fetch_sub(1, Ordering::AcqRel);
    }
}

impl FillPool {
    pub fn new(
        engine: FillEngine,
        max_concurrent_fills: usize,
        shutdown_token: CancellationToken,
        shutdown_timeout: Duration,
    ) -> Self {
        Self {
            engine,
            permits: Arc::new(Semaphore::new(max_concurrent_fills)),
            shutdown_token,
            shutdown_timeout,
            closing: AtomicBool::new(false),
            inflight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Registers an in-flight connection.
    pub fn track(&self) -> InflightGuard {
        self.inflight.fetch_add(1, Ordering::AcqRel);
        InflightGuard {
            inflight: Arc::clone(&self.inflight),
        }
    }

    /// Number of connections currently being served.
    pub fn inflight(&self) -> usize {
        self.inflight.load(Ordering::Acquire)
    }

    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::Acquire)
    }

    /// Runs one fill once a slot is free.
    ///
    /// # Errors
    ///
    /// - [`ServiceError::ServiceShutdown`] if the pool is closing, or starts
    ///   closing while the request waits for a slot.
    /// - [`ServiceError::Fill`] for any engine error, including cancellation
    ///   during shutdown.
    /// - [`ServiceError::Internal`] if the blocking task could not be joined.
    pub async fn fill(&self, request: FillRequest) -> Result<FillResult> {
        if self.is_closing() || self.shutdown_token.is_cancelled() {
            return Err(ServiceError::ServiceShutdown);
        }

        let permit = tokio::select! {
            permit = Arc::clone(&self.permits).acquire_owned() => {
                permit.map_err(|_| ServiceError::ServiceShutdown)?
            }
            () = self.shutdown_token.cancelled() => {
                return Err(ServiceError::ServiceShutdown);
            }
        };

        let engine = self.engine.clone();
        let cancel = self.shutdown_token.child_token();

        increment_fills_inflight();
        let joined = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            engine.fill_request_with_cancel(&request, &cancel)
        })
        .await;
        decrement_fills_inflight();

        match joined {
            Ok(result) => Ok(result?),
            Err(e) => Err(ServiceError::Internal {
                context: format!("fill task failed: {e}"),
            }),
        }
    }

    /// Gracefully shuts down the pool.
    ///
    /// - Refuses new fills.
    /// - Waits up to `shutdown_timeout` for in-flight connections to finish.
    /// - Cancels whatever is still running and closes the semaphore.
    /// - Gives cancelled fills a short grace period to unwind.
    ///
    /// This method is typically invoked during service termination.
    pub async fn shutdown(&self) -> Result<()> {
        // === Phase 0: Stop accepting new fills ===
        tracing::info!("Refusing new fills");
        self.closing.store(true, Ordering::Release);

        // === Phase 1: Wait for in-flight connections to drain ===
        tracing::info!(
            "Draining in-flight connections ({} active)",
            self.inflight()
        );
        match timeout(self.shutdown_timeout, self.wait_idle()).await {
            Ok(()) => tracing::debug!("All in-flight connections drained"),
            Err(_) => tracing::warn!(
                "Graceful drain timed out ({} connections still active)",
                self.inflight()
            ),
        }

        // === Phase 2: Cancel remaining work ===
        tracing::debug!("Cancelling remaining fills via shutdown token");
        self.shutdown_token.cancel();
        self.permits.close();

        // === Phase 3: Let cancelled fills unwind ===
        if timeout(CANCEL_GRACE, self.wait_idle()).await.is_err() {
            tracing::warn!(
                "{} connections did not finish after cancellation",
                self.inflight()
            );
        }

        tracing::info!("Fill pool shutdown complete");
        Ok(())
    }

    async fn wait_idle(&self) {
        while self.inflight() > 0 {
            sleep(Duration::from_millis(50)).await;
        }
    }
}
