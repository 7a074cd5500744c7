//! Per-connection request handling.
//!
//! This module defines [`FillService`], which serves exactly one fill per
//! connection:
//!
//! 1. Read one JSON [`FillRequest`] (bounded in size and time).
//! 2. Run the fill through the [`FillPool`].
//! 3. Write one JSON [`FillResponse`] or [`ErrorResponse`] and close.
//!
//! Every connection gets its own tables; nothing is shared between requests
//! except the pool's admission limits.

use crate::server::{
    config::ServerConfig,
    error::{Result, ServiceError},
    pool::manager::FillPool,
    service::request::read_request,
    telemetry::{
        increment_cells_filled, increment_errors, increment_requests, record_fill_duration,
    },
};
use std::{sync::Arc, time::Instant};
use tablefill::{ErrorResponse, FillEngine, FillResponse};
use tokio::{
    io::{AsyncRead, AsyncWrite, AsyncWriteExt},
    time::timeout,
};
use tokio_util::sync::CancellationToken;

/// The table fill service.
///
/// Cheap to clone; clones share the same pool and limits.
#[derive(Clone)]
pub struct FillService {
    config: Arc<ServerConfig>,
    pool: Arc<FillPool>,
}

impl FillService {
    /// Creates the service and its fill pool from `config`.
    pub fn new(config: ServerConfig) -> Self {
        let engine = FillEngine::builder()
            .max_workers(config.max_workers)
            .max_cells(config.max_cells)
            .build();
        let pool = FillPool::new(
            engine,
            config.max_concurrent_fills,
            CancellationToken::new(),
            config.shutdown_timeout,
        );

        Self {
            config: Arc::new(config),
            pool: Arc::new(pool),
        }
    }

    /// Serves one connection to completion.
    ///
    /// Never fails: errors are reported to the client when possible and
    /// logged otherwise.
    pub async fn handle_connection<IO>(&self, mut io: IO)
    where
        IO: AsyncRead + AsyncWrite + Unpin,
    {
        let _guard = self.pool.track();
        increment_requests();

        let reply = match self.process(&mut io).await {
            Ok(response) => serde_json::to_vec(&response),
            Err(e) => {
                increment_errors(e.kind());
                if e.is_client_error() {
                    tracing::info!(kind = e.kind(), "Rejected request: {e}");
                } else {
                    tracing::warn!(kind = e.kind(), "Request failed: {e}");
                }
                serde_json::to_vec(&ErrorResponse::from(&e))
            }
        };

        let bytes = match reply {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!("Failed to encode response: {e}");
                return;
            }
        };

        if let Err(e) = write_and_close(&mut io, &bytes).await {
            tracing::debug!("Client went away before the response was sent: {e}");
        }
    }

    async fn process<IO>(&self, io: &mut IO) -> Result<FillResponse>
    where
        IO: AsyncRead + Unpin,
    {
        let request = timeout(
            self.config.request_timeout,
            read_request(io, self.config.max_request_bytes),
        )
        .await
        .map_err(|_| {
            ServiceError::invalid_request(format!(
                "no complete request within {:?}",
                self.config.request_timeout
            ))
        })??;

        tracing::debug!(
            rows = request.rows,
            cols = request.cols,
            threads = request.threads,
            "Decoded request"
        );

        let start = Instant::now();
        let result = self.pool.fill(request).await?;
        record_fill_duration(start.elapsed().as_secs_f64() * 1_000.0);
        increment_cells_filled(result.table.len() as u64);

        tracing::debug!(
            axis = ?result.plan.axis(),
            partitions = result.plan.len(),
            single_us = result.single_thread_duration.as_micros() as u64,
            parallel_us = result.parallel_duration.as_micros() as u64,
            "Filled table"
        );

        Ok(FillResponse::from(result))
    }

    /// Initiates a graceful shutdown of the fill pool.
    ///
    /// In-flight connections get `shutdown_timeout` to finish before their
    /// fills are cancelled.
    pub async fn shutdown(&self) -> Result<()> {
        self.pool.shutdown().await
    }
}

async fn write_and_close<IO>(io: &mut IO, bytes: &[u8]) -> std::io::Result<()>
where
    IO: AsyncWrite + Unpin,
{
    io.write_all(bytes).await?;
    io.shutdown().await
}
