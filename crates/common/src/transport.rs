//! Bulk transport boundary
//!
//! The session layer only ever talks to the scanner through [`BulkTransport`].
//! The rusb-backed device implements it in the explorer binary; tests use
//! [`crate::test_utils::ScriptedTransport`].

use std::time::Duration;
use thiserror::Error;

/// Largest single bulk IN read issued by the explorer
pub const MAX_BULK_READ: usize = 512;

/// Errors reported by a bulk transport
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Transfer timed out")]
    Timeout,

    #[error("Endpoint stalled")]
    Pipe,

    #[error("Device disconnected")]
    NoDevice,

    #[error("Device busy")]
    Busy,

    #[error("Transfer overflow")]
    Overflow,

    #[error("Input/output error")]
    Io,

    #[error("Access denied")]
    Access,

    #[error("USB error: {0}")]
    Other(String),
}

impl TransportError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::Timeout)
    }
}

/// Bulk endpoint pair used for command and response phases
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoints {
    /// Host-to-device endpoint (bit 7 clear)
    pub bulk_out: u8,
    /// Device-to-host endpoint (bit 7 set)
    pub bulk_in: u8,
}

/// Blocking bulk I/O against a claimed device
pub trait BulkTransport {
    /// Write `data` to `endpoint`, returning the number of bytes written
    fn write_bulk(
        &mut self,
        endpoint: u8,
        data: &[u8],
        timeout: Duration,
    ) -> Result<usize, TransportError>;

    /// Read at most `max_len` bytes from `endpoint`
    fn read_bulk(
        &mut self,
        endpoint: u8,
        max_len: usize,
        timeout: Duration,
    ) -> Result<Vec<u8>, TransportError>;
}

impl<T: BulkTransport + ?Sized> BulkTransport for &mut T {
    fn write_bulk(
        &mut self,
        endpoint: u8,
        data: &[u8],
        timeout: Duration,
    ) -> Result<usize, TransportError> {
        (**self).write_bulk(endpoint, data, timeout)
    }

    fn read_bulk(
        &mut self,
        endpoint: u8,
        max_len: usize,
        timeout: Duration,
    ) -> Result<Vec<u8>, TransportError> {
        (**self).read_bulk(endpoint, max_len, timeout)
    }
}
