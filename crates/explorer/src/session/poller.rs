//! Shared polling loop for the monitor and raw readout modes

use super::link::StatusLink;
use super::transaction::StatusRead;
use super::{Timing, pause};
use common::{CancelToken, TransportError};
use std::time::Duration;
use tracing::warn;

/// Result of one poll tick
#[derive(Debug)]
pub enum PollOutcome {
    /// A status read succeeded; `poll` counts successful reads from 1
    Read { poll: u64, read: StatusRead },
    /// The transport failed; the loop backs off and retries
    Fault { error: TransportError },
    /// The device dropped off the bus (ADF lid closed)
    DeviceLeft,
    /// The device is back and has been reopened
    DeviceArrived,
}

/// Totals for a finished polling session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollSummary {
    pub polls: u64,
    pub faults: u64,
    pub reconnects: u64,
}

/// Poll GET HARDWARE STATUS until `cancel` fires
///
/// Transport faults never end the loop: they are reported and followed by
/// `timing.error_backoff`. If the link can reconnect, a vanished device is
/// reported as [`PollOutcome::DeviceLeft`] and reopened every
/// `timing.reconnect_interval` until it returns. Cancellation is only
/// observed between transactions.
pub fn poll_until_cancelled<L, F>(
    link: &mut L,
    timing: &Timing,
    cancel: &CancelToken,
    mut on_outcome: F,
) -> PollSummary
where
    L: StatusLink + ?Sized,
    F: FnMut(PollOutcome),
{
    let mut summary = PollSummary::default();

    while !cancel.is_cancelled() {
        match link.poll_status() {
            Ok(read) => {
                summary.polls += 1;
                on_outcome(PollOutcome::Read {
                    poll: summary.polls,
                    read,
                });
                pause(timing.poll_interval, cancel);
            }
            Err(TransportError::NoDevice) if link.reconnects() => {
                warn!(
                    "Scanner disappeared, retrying every {:?}",
                    timing.reconnect_interval
                );
                link.disconnect();
                on_outcome(PollOutcome::DeviceLeft);
                if !wait_for_device(link, timing.reconnect_interval, cancel) {
                    break;
                }
                summary.reconnects += 1;
                on_outcome(PollOutcome::DeviceArrived);
            }
            Err(error) => {
                summary.faults += 1;
                warn!("USB error: {} - retrying in {:?}", error, timing.error_backoff);
                on_outcome(PollOutcome::Fault { error });
                pause(timing.error_backoff, cancel);
            }
        }
    }

    summary
}

/// Try to reopen the device every `interval`; false if cancelled first
fn wait_for_device<L>(link: &mut L, interval: Duration, cancel: &CancelToken) -> bool
where
    L: StatusLink + ?Sized,
{
    loop {
        if cancel.is_cancelled() {
            return false;
        }
        if link.try_reconnect() {
            return true;
        }
        if !pause(interval, cancel) {
            return false;
        }
    }
}
