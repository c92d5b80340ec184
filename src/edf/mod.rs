//! Client side of the EDF platform API.

pub mod client;
pub mod envelope;
pub mod transport;
#[cfg(test)]
pub(crate) mod testing;

pub use client::EdfClient;
pub use envelope::{EntityInstancePk, SearchPage, SearchRequest, TokenResponse};
pub use transport::{EdfTransport, HttpTransport, OutboundCall, TransportError};
