//! The accept loop.
//!
//! Connections are pulled from any stream of `AsyncRead + AsyncWrite` items
//! (a [`TcpListenerStream`] in production, in-memory pipes in tests) and each
//! one is served on its own task.
//!
//! [`TcpListenerStream`]: tokio_stream::wrappers::TcpListenerStream

use crate::server::service::handler::FillService;
use core::{fmt::Display, future::Future};
use futures::{Stream, StreamExt};
use portable_atomic::{AtomicU64, Ordering};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::Instrument;

/// Serves connections from `incoming` until `signal` resolves or the stream
/// ends.
///
/// The signal future keeps being polled while connections are accepted, so
/// it may run the service's graceful shutdown itself: connections that
/// arrive during the drain are still answered, with a `service_shutdown`
/// error. Accept errors are logged and skipped.
pub async fn serve_with_incoming_shutdown<I, IO, IE, F>(
    incoming: I,
    service: FillService,
    signal: F,
) where
    I: Stream<Item = Result<IO, IE>>,
    IO: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    IE: Display,
    F: Future<Output = ()>,
{
    static NEXT_CONNECTION: AtomicU64 = AtomicU64::new(1);

    let incoming = incoming.fuse();
    tokio::pin!(incoming);
    tokio::pin!(signal);

    loop {
        tokio::select! {
            biased;

            () = &mut signal => {
                tracing::debug!("Accept loop stopped by shutdown signal");
                break;
            }
            next = incoming.next() => match next {
                Some(Ok(io)) => {
                    let id = NEXT_CONNECTION.fetch_add(1, Ordering::Relaxed);
                    let service = service.clone();
                    tokio::spawn(
                        async move { service.handle_connection(io).await }
                            .instrument(tracing::info_span!("connection", id)),
                    );
                }
                Some(Err(e)) => {
                    tracing::warn!("Failed to accept connection: {e}");
                }
                None => {
                    tracing::debug!("Listener closed");
                    break;
                }
            },
        }
    }
}
