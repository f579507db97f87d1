//! Three-phase transaction executor
//!
//! Every S1500 command is a command → data → status exchange over the bulk
//! endpoints:
//!
//! 1. write the 31-byte envelope to the OUT endpoint
//! 2. read the data phase (or, for commands without data, the status phase)
//! 3. read the trailing status phase with a short timeout
//!
//! Phase 3 must be drained even when only the data matters, otherwise the
//! next transaction reads a stale 0x53 envelope as its data.

use common::{BulkTransport, Endpoints, MAX_BULK_READ, TransportError};
use protocol::{
    Envelope, GET_HW_STATUS, HW_STATUS_LEN, HwStatus, STATUS_MARKER, TEST_UNIT_READY, hex_of,
    is_status_reply,
};
use std::time::Duration;
use tracing::{debug, warn};

/// Per-phase timeouts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionTimeouts {
    /// Command write and data-phase read
    pub data: Duration,
    /// Trailing status-phase read
    pub status: Duration,
}

impl Default for TransactionTimeouts {
    fn default() -> Self {
        Self {
            data: Duration::from_millis(1000),
            status: Duration::from_millis(200),
        }
    }
}

/// Raw replies from one transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchange {
    /// First IN reply: data phase, or the status phase for data-less commands
    pub primary: Vec<u8>,
    /// Trailing status phase, if one arrived before the status timeout
    pub secondary: Option<Vec<u8>>,
}

/// A status envelope showed up where data was expected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseMismatch {
    /// The trailing phase carried the data and was decoded instead
    Recovered,
    /// No usable trailing phase; the status envelope itself was decoded
    Unrecovered,
}

/// Outcome of a GET HARDWARE STATUS transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusRead {
    pub snapshot: HwStatus,
    pub exchange: Exchange,
    pub mismatch: Option<PhaseMismatch>,
}

impl StatusRead {
    /// Interpret a GET HARDWARE STATUS exchange
    ///
    /// If the data phase looks like a bare status envelope (0x53, 13 bytes)
    /// and a trailing phase of at least 12 bytes arrived, the trailing phase
    /// is decoded instead.
    pub fn interpret(exchange: Exchange) -> Self {
        let mismatch = if is_status_reply(&exchange.primary) {
            match &exchange.secondary {
                Some(secondary) if secondary.len() >= HW_STATUS_LEN => {
                    Some(PhaseMismatch::Recovered)
                }
                _ => Some(PhaseMismatch::Unrecovered),
            }
        } else {
            None
        };

        let payload = match (mismatch, &exchange.secondary) {
            (Some(PhaseMismatch::Recovered), Some(secondary)) => secondary.as_slice(),
            _ => exchange.primary.as_slice(),
        };

        match mismatch {
            Some(PhaseMismatch::Recovered) => {
                warn!("Got status 0x53 instead of data, decoding data from status phase")
            }
            Some(PhaseMismatch::Unrecovered) => {
                warn!("Got status 0x53 instead of data and no usable status phase")
            }
            None => {}
        }

        Self {
            snapshot: HwStatus::decode(payload),
            exchange,
            mismatch,
        }
    }
}

/// Issues transactions over a bulk transport
#[derive(Debug)]
pub struct TransactionExecutor<T> {
    transport: T,
    endpoints: Endpoints,
    timeouts: TransactionTimeouts,
}

impl<T: BulkTransport> TransactionExecutor<T> {
    pub fn new(transport: T, endpoints: Endpoints) -> Self {
        Self {
            transport,
            endpoints,
            timeouts: TransactionTimeouts::default(),
        }
    }

    pub fn with_timeouts(mut self, timeouts: TransactionTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Run one command → data → status exchange
    ///
    /// Write and data-phase failures propagate. A timeout on the trailing
    /// status read means there was no status phase and yields `None`.
    pub fn execute(
        &mut self,
        envelope: &Envelope,
        expect_data: bool,
    ) -> Result<Exchange, TransportError> {
        self.transport
            .write_bulk(self.endpoints.bulk_out, envelope.as_ref(), self.timeouts.data)?;

        let primary =
            self.transport
                .read_bulk(self.endpoints.bulk_in, MAX_BULK_READ, self.timeouts.data)?;
        debug!("phase 2: [{:2} bytes] {}", primary.len(), hex_of(&primary));

        if !expect_data {
            return Ok(Exchange {
                primary,
                secondary: None,
            });
        }

        let secondary = match self.transport.read_bulk(
            self.endpoints.bulk_in,
            MAX_BULK_READ,
            self.timeouts.status,
        ) {
            Ok(data) => {
                debug!("phase 3: [{:2} bytes] {}", data.len(), hex_of(&data));
                Some(data)
            }
            Err(e) if e.is_timeout() => {
                debug!("phase 3: none");
                None
            }
            Err(e) => return Err(e),
        };

        Ok(Exchange { primary, secondary })
    }

    /// Send TEST UNIT READY; true if the device answers with a status envelope
    pub fn test_unit_ready(&mut self) -> Result<bool, TransportError> {
        let exchange = self.execute(&TEST_UNIT_READY, false)?;
        Ok(exchange.primary.first() == Some(&STATUS_MARKER))
    }

    /// Send GET HARDWARE STATUS and decode the reply
    pub fn read_status(&mut self) -> Result<StatusRead, TransportError> {
        let exchange = self.execute(&GET_HW_STATUS, true)?;
        Ok(StatusRead::interpret(exchange))
    }

    pub fn into_inner(self) -> T {
        self.transport
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::test_utils::{
        ScriptedTransport, TEST_ENDPOINTS, hw_status_reply, status_reply,
    };

    fn executor(transport: &mut ScriptedTransport) -> TransactionExecutor<&mut ScriptedTransport> {
        TransactionExecutor::new(transport, TEST_ENDPOINTS)
    }

    #[test]
    fn test_full_exchange() {
        let mut transport = ScriptedTransport::new();
        transport.push_status_exchange(hw_status_reply(0x80, 0x01));

        let read = executor(&mut transport).read_status().unwrap();
        assert!(!read.snapshot.hopper());
        assert!(read.snapshot.scan_sw());
        assert_eq!(read.exchange.secondary, Some(status_reply()));
        assert_eq!(read.mismatch, None);

        assert_eq!(transport.writes().len(), 1);
        let (endpoint, envelope) = &transport.writes()[0];
        assert_eq!(*endpoint, 0x02);
        assert_eq!(envelope.as_slice(), GET_HW_STATUS.as_ref());
    }

    #[test]
    fn test_phase_timeouts() {
        let mut transport = ScriptedTransport::new();
        transport.push_status_exchange(hw_status_reply(0x80, 0x00));
        executor(&mut transport).read_status().unwrap();

        let reads = transport.reads();
        assert_eq!(reads.len(), 2);
        assert_eq!(reads[0].timeout, Duration::from_millis(1000));
        assert_eq!(reads[0].max_len, 512);
        assert_eq!(reads[1].timeout, Duration::from_millis(200));
        assert!(reads.iter().all(|r| r.endpoint == 0x81));
    }

    #[test]
    fn test_custom_timeouts() {
        let mut transport = ScriptedTransport::new();
        transport.push_status_exchange(hw_status_reply(0x80, 0x00));
        let timeouts = TransactionTimeouts {
            data: Duration::from_millis(300),
            status: Duration::from_millis(50),
        };
        executor(&mut transport)
            .with_timeouts(timeouts)
            .read_status()
            .unwrap();

        assert_eq!(transport.reads()[0].timeout, Duration::from_millis(300));
        assert_eq!(transport.reads()[1].timeout, Duration::from_millis(50));
    }

    #[test]
    fn test_missing_status_phase_is_absent() {
        let mut transport = ScriptedTransport::new();
        transport.push_read(hw_status_reply(0x00, 0x00));

        let exchange = executor(&mut transport)
            .execute(&GET_HW_STATUS, true)
            .unwrap();
        assert_eq!(exchange.primary.len(), 12);
        assert!(exchange.secondary.is_none());
    }

    #[test]
    fn test_no_data_phase_skips_status_read() {
        let mut transport = ScriptedTransport::new();
        transport.push_read(status_reply());

        let exchange = executor(&mut transport)
            .execute(&TEST_UNIT_READY, false)
            .unwrap();
        assert_eq!(exchange.primary, status_reply());
        assert!(exchange.secondary.is_none());
        assert_eq!(transport.reads().len(), 1);
    }

    #[test]
    fn test_write_failure_propagates() {
        let mut transport = ScriptedTransport::new();
        transport.fail_next_write(TransportError::NoDevice);

        let err = executor(&mut transport).read_status().unwrap_err();
        assert_eq!(err, TransportError::NoDevice);
        assert!(transport.reads().is_empty());
    }

    #[test]
    fn test_data_phase_timeout_propagates() {
        let mut transport = ScriptedTransport::new();
        let err = executor(&mut transport).read_status().unwrap_err();
        assert_eq!(err, TransportError::Timeout);
    }

    #[test]
    fn test_status_phase_error_propagates() {
        let mut transport = ScriptedTransport::new();
        transport
            .push_read(hw_status_reply(0x80, 0x00))
            .push_read_error(TransportError::Pipe);

        let err = executor(&mut transport).read_status().unwrap_err();
        assert_eq!(err, TransportError::Pipe);
    }

    #[test]
    fn test_phase_mismatch_substitutes_status_phase() {
        let mut transport = ScriptedTransport::new();
        transport
            .push_read(status_reply())
            .push_read(hw_status_reply(0x00, 0x01));

        let read = executor(&mut transport).read_status().unwrap();
        assert_eq!(read.mismatch, Some(PhaseMismatch::Recovered));
        assert_eq!(read.snapshot.raw(), hw_status_reply(0x00, 0x01).as_slice());
        assert!(read.snapshot.scan_sw());
    }

    #[test]
    fn test_phase_mismatch_without_usable_status_phase() {
        let mut transport = ScriptedTransport::new();
        transport.push_read(status_reply()).push_read(vec![0u8; 4]);

        let read = executor(&mut transport).read_status().unwrap();
        assert_eq!(read.mismatch, Some(PhaseMismatch::Unrecovered));
        assert_eq!(read.snapshot.byte(0), 0x53);
    }

    #[test]
    fn test_status_marker_with_other_length_is_data() {
        // 12-byte reply that happens to start with 0x53 is real data
        let mut data = hw_status_reply(0x80, 0x00);
        data[0] = 0x53;
        let read = StatusRead::interpret(Exchange {
            primary: data.clone(),
            secondary: Some(hw_status_reply(0x00, 0x01)),
        });
        assert_eq!(read.mismatch, None);
        assert_eq!(read.snapshot.raw(), data.as_slice());
    }

    #[test]
    fn test_unit_ready() {
        let mut transport = ScriptedTransport::new();
        transport.push_read(status_reply()).push_read(vec![0x00]);

        let mut exec = executor(&mut transport);
        assert!(exec.test_unit_ready().unwrap());
        assert!(!exec.test_unit_ready().unwrap());

        let (_, envelope) = &transport.writes()[0];
        assert_eq!(envelope.as_slice(), TEST_UNIT_READY.as_ref());
    }

    #[test]
    fn test_unit_ready_empty_reply() {
        let mut transport = ScriptedTransport::new();
        transport.push_read(Vec::new());
        assert!(!executor(&mut transport).test_unit_ready().unwrap());
    }
}
