//! Error types for the fill service.
//!
//! [`ServiceError`] covers everything that can go wrong while serving one
//! connection. Each case maps to an [`ErrorResponse`] with a stable `kind` so
//! clients can tell bad input apart from server-side failures.
//!
//! ## Error Cases
//! - `InvalidRequest`: the request was malformed, too large, or too slow.
//! - `Fill`: the engine rejected or failed the fill.
//! - `ServiceShutdown`: a request arrived while the service was shutting down.
//! - `Io`: reading from or writing to the client failed.
//! - `Internal`: a blocking fill task could not be joined.

use tablefill::ErrorResponse;

pub type Result<T> = core::result::Result<T, ServiceError>;

/// Unified error type for the fill service.
#[derive(thiserror::Error, Debug)]
pub enum ServiceError {
    /// The client request could not be decoded or violated a transport limit.
    #[error("Invalid request: {reason}")]
    InvalidRequest { reason: String },

    /// The fill engine returned an error.
    #[error(transparent)]
    Fill(#[from] tablefill::Error),

    /// The service is in the process of shutting down.
    #[error("Service is shutting down")]
    ServiceShutdown,

    /// Socket read or write failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A fill task panicked outside the engine or was aborted.
    #[error("Internal error: {context}")]
    Internal { context: String },
}

impl ServiceError {
    pub fn invalid_request(reason: impl Into<String>) -> Self {
        Self::InvalidRequest {
            reason: reason.into(),
        }
    }

    /// Stable, machine-readable name reported to clients.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::InvalidRequest { .. } => "invalid_request",
            Self::Fill(e) => e.kind(),
            Self::ServiceShutdown => "service_shutdown",
            Self::Io(_) | Self::Internal { .. } => "internal",
        }
    }

    /// Whether the client, rather than the server, is at fault.
    pub const fn is_client_error(&self) -> bool {
        match self {
            Self::InvalidRequest { .. } => true,
            Self::Fill(e) => e.is_invalid_input(),
            _ => false,
        }
    }
}

impl From<&ServiceError> for ErrorResponse {
    fn from(err: &ServiceError) -> Self {
        Self::new(err.kind(), err.to_string())
    }
}
