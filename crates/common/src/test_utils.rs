//! Test utilities for the S1500 explorer
//!
//! Provides a scripted bulk transport and canned scanner replies.
//!
//! # Example
//!
//! ```
//! use common::test_utils::{ScriptedTransport, hw_status_reply, TEST_ENDPOINTS};
//! use common::BulkTransport;
//! use std::time::{Duration, Instant};
//!
//! let mut transport = ScriptedTransport::new();
//! transport.push_read(hw_status_reply(0x80, 0x01));
//!
//! transport.write_bulk(TEST_ENDPOINTS.bulk_out, &[0x43], Duration::ZERO).unwrap();
//! let reply = transport.read_bulk(TEST_ENDPOINTS.bulk_in, 512, Duration::ZERO).unwrap();
//! assert_eq!(reply[4], 0x01);
//! assert_eq!(transport.writes().len(), 1);
//! ```

use crate::cancel::CancelToken;
use crate::transport::{BulkTransport, Endpoints, TransportError};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Endpoint pair used by scripted tests (same values as the S1500)
pub const TEST_ENDPOINTS: Endpoints = Endpoints {
    bulk_out: 0x02,
    bulk_in: 0x81,
};

/// A bulk IN read recorded by [`ScriptedTransport`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadCall {
    pub endpoint: u8,
    pub max_len: usize,
    pub timeout: Duration,
}

/// In-memory transport that replays a script of replies
///
/// Reads pop from the reply queue; once it is empty every read times out,
/// which is what the S1500 does when no status phase follows. Writes always
/// succeed unless a failure has been queued.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    replies: VecDeque<Result<Vec<u8>, TransportError>>,
    write_failures: VecDeque<Option<TransportError>>,
    writes: Vec<(u8, Vec<u8>)>,
    write_times: Vec<Instant>,
    reads: Vec<ReadCall>,
    cancel_after: Option<(usize, CancelToken)>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful bulk IN reply
    pub fn push_read(&mut self, data: impl Into<Vec<u8>>) -> &mut Self {
        self.replies.push_back(Ok(data.into()));
        self
    }

    /// Queue a failing bulk IN read
    pub fn push_read_error(&mut self, error: TransportError) -> &mut Self {
        self.replies.push_back(Err(error));
        self
    }

    /// Queue a full GET HARDWARE STATUS exchange: data phase then status phase
    pub fn push_status_exchange(&mut self, data: impl Into<Vec<u8>>) -> &mut Self {
        self.push_read(data);
        self.push_read(status_reply())
    }

    /// Let the next write succeed (used to position a later write failure)
    pub fn pass_next_write(&mut self) -> &mut Self {
        self.write_failures.push_back(None);
        self
    }

    /// Make the next unqueued write fail with `error`
    pub fn fail_next_write(&mut self, error: TransportError) -> &mut Self {
        self.write_failures.push_back(Some(error));
        self
    }

    /// Cancel `token` once `writes` envelopes have been written
    ///
    /// The transaction in flight still completes, mirroring an operator
    /// pressing Ctrl-C mid-transaction.
    pub fn cancel_after_writes(&mut self, writes: usize, token: CancelToken) -> &mut Self {
        self.cancel_after = Some((writes, token));
        self
    }

    /// Envelopes written so far, with their endpoint
    pub fn writes(&self) -> &[(u8, Vec<u8>)] {
        &self.writes
    }

    /// When each write was attempted, failed ones included
    pub fn write_times(&self) -> &[Instant] {
        &self.write_times
    }

    /// Reads attempted so far
    pub fn reads(&self) -> &[ReadCall] {
        &self.reads
    }

    /// Replies not yet consumed
    pub fn pending_replies(&self) -> usize {
        self.replies.len()
    }
}

impl BulkTransport for ScriptedTransport {
    fn write_bulk(
        &mut self,
        endpoint: u8,
        data: &[u8],
        _timeout: Duration,
    ) -> Result<usize, TransportError> {
        self.write_times.push(Instant::now());
        if let Some(Some(error)) = self.write_failures.pop_front() {
            return Err(error);
        }

        self.writes.push((endpoint, data.to_vec()));

        if let Some((after, token)) = &self.cancel_after {
            if self.writes.len() >= *after {
                token.cancel();
            }
        }

        Ok(data.len())
    }

    fn read_bulk(
        &mut self,
        endpoint: u8,
        max_len: usize,
        timeout: Duration,
    ) -> Result<Vec<u8>, TransportError> {
        self.reads.push(ReadCall {
            endpoint,
            max_len,
            timeout,
        });

        match self.replies.pop_front() {
            Some(Ok(mut data)) => {
                data.truncate(max_len);
                Ok(data)
            }
            Some(Err(error)) => Err(error),
            None => Err(TransportError::Timeout),
        }
    }
}

/// A 12-byte GET HARDWARE STATUS reply with the given ADF and button bytes
pub fn hw_status_reply(adf: u8, buttons: u8) -> Vec<u8> {
    let mut reply = vec![0u8; 12];
    reply[3] = adf;
    reply[4] = buttons;
    reply
}

/// A bare 13-byte status-phase reply ('S' followed by zeros)
pub fn status_reply() -> Vec<u8> {
    let mut reply = vec![0u8; 13];
    reply[0] = 0x53;
    reply
}
