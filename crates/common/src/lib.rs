//! Common utilities for the S1500 explorer
//!
//! This crate provides the pieces shared between the session layer and the
//! binary: the bulk transport boundary, cooperative cancellation, error
//! handling, logging setup, and test doubles.

pub mod cancel;
pub mod error;
pub mod logging;
pub mod test_utils;
pub mod transport;

pub use cancel::CancelToken;
pub use error::{Error, Result};
pub use logging::setup_logging;
pub use transport::{BulkTransport, Endpoints, MAX_BULK_READ, TransportError};
