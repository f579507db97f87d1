//! Blocking bulk transfers on a claimed rusb handle
//!
//! Maps rusb errors onto [`TransportError`] so the session layer never sees
//! rusb types.

use common::TransportError;
use rusb::{Context, DeviceHandle};
use std::time::Duration;
use tracing::trace;

/// Write `data` to a bulk OUT endpoint
pub fn write_bulk(
    handle: &mut DeviceHandle<Context>,
    endpoint: u8,
    data: &[u8],
    timeout: Duration,
) -> Result<usize, TransportError> {
    trace!(
        "Bulk OUT: endpoint={:#04x}, len={}, timeout={}ms",
        endpoint,
        data.len(),
        timeout.as_millis()
    );
    handle
        .write_bulk(endpoint, data, timeout)
        .map_err(map_rusb_error)
}

/// Read up to `max_len` bytes from a bulk IN endpoint
///
/// The returned buffer is truncated to what the device actually sent.
pub fn read_bulk(
    handle: &mut DeviceHandle<Context>,
    endpoint: u8,
    max_len: usize,
    timeout: Duration,
) -> Result<Vec<u8>, TransportError> {
    let mut buffer = vec![0u8; max_len];
    let len = handle
        .read_bulk(endpoint, &mut buffer, timeout)
        .map_err(map_rusb_error)?;
    buffer.truncate(len);

    trace!(
        "Bulk IN: endpoint={:#04x}, got {} of {} bytes",
        endpoint, len, max_len
    );
    Ok(buffer)
}

/// Map rusb error to transport error
pub fn map_rusb_error(err: rusb::Error) -> TransportError {
    match err {
        rusb::Error::Timeout => TransportError::Timeout,
        rusb::Error::Pipe => TransportError::Pipe,
        rusb::Error::NoDevice => TransportError::NoDevice,
        rusb::Error::Busy => TransportError::Busy,
        rusb::Error::Overflow => TransportError::Overflow,
        rusb::Error::Io => TransportError::Io,
        rusb::Error::Access => TransportError::Access,
        _ => TransportError::Other(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_rusb_error() {
        assert_eq!(map_rusb_error(rusb::Error::Timeout), TransportError::Timeout);
        assert_eq!(map_rusb_error(rusb::Error::Pipe), TransportError::Pipe);
        assert_eq!(map_rusb_error(rusb::Error::NoDevice), TransportError::NoDevice);
        assert_eq!(map_rusb_error(rusb::Error::Io), TransportError::Io);
        assert_eq!(map_rusb_error(rusb::Error::Access), TransportError::Access);
    }

    #[test]
    fn test_only_timeout_is_timeout() {
        assert!(map_rusb_error(rusb::Error::Timeout).is_timeout());
        assert!(!map_rusb_error(rusb::Error::Pipe).is_timeout());
        assert!(!map_rusb_error(rusb::Error::Interrupted).is_timeout());
    }

    #[test]
    fn test_unmapped_errors_keep_message() {
        match map_rusb_error(rusb::Error::NotSupported) {
            TransportError::Other(message) => assert!(!message.is_empty()),
            other => panic!("expected Other, got {:?}", other),
        }
    }
}
