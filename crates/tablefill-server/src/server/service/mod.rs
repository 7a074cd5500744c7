//! TCP service implementation.
//!
//! One request and one response per connection, both JSON. The accept loop
//! hands each connection to the handler, which decodes the request, runs the
//! fill through the pool and writes the result back.
//!
//! ## Structure
//!
//! - [`accept`] - accept loop with graceful shutdown.
//! - [`handler`] - service entry point (`FillService`).
//! - [`request`] - bounded decoding of undelimited JSON requests.

pub mod accept;
pub mod handler;
pub mod request;
