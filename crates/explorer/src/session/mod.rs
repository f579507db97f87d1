//! Session layer
//!
//! Everything that issues transactions against the scanner: the three-phase
//! transaction executor, the device link that reopens a scanner after it
//! disappears, and the sessions built on them (monitor, raw readout, guided
//! discovery, hardware doctor). Sessions emit structured events; rendering
//! them is the caller's job.
//!
//! All of it is blocking and single-threaded. Only one transaction is ever in
//! flight, and cancellation is checked between transactions.

pub mod discovery;
pub mod doctor;
pub mod link;
pub mod monitor;
pub mod poller;
pub mod raw;
pub mod transaction;

use common::{CancelToken, TransportError};
use std::time::{Duration, Instant};
use thiserror::Error;

pub use discovery::{
    DiscoveryAction, DiscoveryEngine, DiscoveryEvent, DiscoveryReport, DiscoveryTrace, Operator,
    ReportEntry, default_script,
};
pub use doctor::{Check, Doctor, DoctorEvent, DoctorReport};
pub use link::{Connector, DeviceLink, StatusLink};
pub use monitor::{Monitor, MonitorEvent, MonitorState};
pub use poller::{PollOutcome, PollSummary};
pub use raw::RawEvent;
pub use transaction::{
    Exchange, PhaseMismatch, StatusRead, TransactionExecutor, TransactionTimeouts,
};

/// Errors that end a session
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Console I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Session cancelled")]
    Cancelled,

    #[error("{failed} of {total} hardware checks failed")]
    ChecksFailed { failed: u32, total: u32 },
}

/// Delays used between transactions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    /// Delay between successful polls
    pub poll_interval: Duration,
    /// Delay after a transport fault before the next attempt
    pub error_backoff: Duration,
    /// Delay between operator confirmation and the first discovery sample
    pub discovery_lead_in: Duration,
    /// Delay between discovery samples
    pub discovery_sample_interval: Duration,
    /// Delay between attempts to reopen a device that went away
    pub reconnect_interval: Duration,
    /// Longest a doctor check waits for the expected state
    pub doctor_timeout: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            error_backoff: Duration::from_secs(1),
            discovery_lead_in: Duration::from_millis(500),
            discovery_sample_interval: Duration::from_millis(100),
            reconnect_interval: Duration::from_secs(2),
            doctor_timeout: Duration::from_secs(15),
        }
    }
}

impl Timing {
    /// No delays at all (tests)
    pub const fn immediate() -> Self {
        Self {
            poll_interval: Duration::ZERO,
            error_backoff: Duration::ZERO,
            discovery_lead_in: Duration::ZERO,
            discovery_sample_interval: Duration::ZERO,
            reconnect_interval: Duration::ZERO,
            doctor_timeout: Duration::ZERO,
        }
    }
}

/// Granularity at which sleeps notice cancellation
const CANCEL_CHECK_SLICE: Duration = Duration::from_millis(50);

/// Sleep for `duration`, returning early if `cancel` fires
///
/// Returns true if the full duration elapsed.
pub fn pause(duration: Duration, cancel: &CancelToken) -> bool {
    let deadline = Instant::now() + duration;
    loop {
        if cancel.is_cancelled() {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        std::thread::sleep((deadline - now).min(CANCEL_CHECK_SLICE));
    }
}
