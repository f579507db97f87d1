//! Transport boundary integration tests
//!
//! Exercises the scripted transport through the `BulkTransport` trait the way
//! the session layer drives it: generic code holding `&mut T`.
//!
//! Run with: `cargo test -p common --test transport_tests`

use common::test_utils::{ScriptedTransport, TEST_ENDPOINTS, hw_status_reply, status_reply};
use common::{BulkTransport, CancelToken, MAX_BULK_READ, TransportError};
use std::time::Duration;

/// Generic helper mirroring a three-phase exchange
fn exchange<T: BulkTransport>(
    mut transport: T,
    command: &[u8],
) -> Result<(Vec<u8>, Option<Vec<u8>>), TransportError> {
    transport.write_bulk(TEST_ENDPOINTS.bulk_out, command, Duration::from_millis(1000))?;
    let primary = transport.read_bulk(
        TEST_ENDPOINTS.bulk_in,
        MAX_BULK_READ,
        Duration::from_millis(1000),
    )?;
    let secondary = match transport.read_bulk(
        TEST_ENDPOINTS.bulk_in,
        MAX_BULK_READ,
        Duration::from_millis(200),
    ) {
        Ok(data) => Some(data),
        Err(TransportError::Timeout) => None,
        Err(e) => return Err(e),
    };
    Ok((primary, secondary))
}

#[test]
fn test_exchange_through_mut_reference() {
    let mut transport = ScriptedTransport::new();
    transport.push_status_exchange(hw_status_reply(0x80, 0x00));

    let (primary, secondary) = exchange(&mut transport, &[0x43; 31]).unwrap();
    assert_eq!(primary, hw_status_reply(0x80, 0x00));
    assert_eq!(secondary, Some(status_reply()));

    assert_eq!(transport.writes(), &[(0x02, vec![0x43; 31])]);
    let timeouts: Vec<_> = transport.reads().iter().map(|r| r.timeout).collect();
    assert_eq!(
        timeouts,
        vec![Duration::from_millis(1000), Duration::from_millis(200)]
    );
    assert!(transport.reads().iter().all(|r| r.endpoint == 0x81));
}

#[test]
fn test_missing_status_phase_is_not_an_error() {
    let mut transport = ScriptedTransport::new();
    transport.push_read(hw_status_reply(0x00, 0x01));

    let (_, secondary) = exchange(&mut transport, &[0x43]).unwrap();
    assert!(secondary.is_none());
    assert_eq!(transport.pending_replies(), 0);
}

#[test]
fn test_scripted_errors_propagate() {
    let mut transport = ScriptedTransport::new();
    transport.push_read_error(TransportError::NoDevice);

    let err = exchange(&mut transport, &[0x43]).unwrap_err();
    assert_eq!(err, TransportError::NoDevice);
}

#[test]
fn test_write_failure_skips_reads() {
    let mut transport = ScriptedTransport::new();
    transport
        .pass_next_write()
        .fail_next_write(TransportError::Io)
        .push_status_exchange(hw_status_reply(0x80, 0x00))
        .push_status_exchange(hw_status_reply(0x80, 0x00));

    assert!(exchange(&mut transport, &[0x43]).is_ok());
    assert_eq!(
        exchange(&mut transport, &[0x43]).unwrap_err(),
        TransportError::Io
    );
    assert_eq!(transport.reads().len(), 2);
    assert_eq!(transport.pending_replies(), 2);
}

#[test]
fn test_cancel_lands_after_write() {
    let token = CancelToken::new();
    let mut transport = ScriptedTransport::new();
    transport
        .push_status_exchange(hw_status_reply(0x80, 0x00))
        .cancel_after_writes(1, token.clone());

    let (primary, _) = exchange(&mut transport, &[0x43]).unwrap();
    assert!(token.is_cancelled());
    // the in-flight exchange still drained both phases
    assert_eq!(primary.len(), 12);
    assert_eq!(transport.pending_replies(), 0);
}
