//! Continuous raw readout: every sample is reported

use super::Timing;
use super::link::StatusLink;
use super::poller::{PollOutcome, PollSummary, poll_until_cancelled};
use super::transaction::PhaseMismatch;
use common::{CancelToken, TransportError};
use protocol::HwStatus;

#[derive(Debug, Clone, PartialEq)]
pub enum RawEvent {
    Sample { poll: u64, snapshot: HwStatus },
    PhaseMismatch { poll: u64, mismatch: PhaseMismatch },
    Fault { error: TransportError },
    DeviceLeft,
    DeviceArrived,
}

/// Poll until cancelled, reporting every decoded sample
pub fn run<L, F>(
    link: &mut L,
    timing: &Timing,
    cancel: &CancelToken,
    mut on_event: F,
) -> PollSummary
where
    L: StatusLink,
    F: FnMut(RawEvent),
{
    poll_until_cancelled(link, timing, cancel, |outcome| match outcome {
        PollOutcome::Read { poll, read } => {
            if let Some(mismatch) = read.mismatch {
                on_event(RawEvent::PhaseMismatch { poll, mismatch });
            }
            on_event(RawEvent::Sample {
                poll,
                snapshot: read.snapshot,
            });
        }
        PollOutcome::Fault { error } => on_event(RawEvent::Fault { error }),
        PollOutcome::DeviceLeft => on_event(RawEvent::DeviceLeft),
        PollOutcome::DeviceArrived => on_event(RawEvent::DeviceArrived),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::transaction::TransactionExecutor;
    use common::test_utils::{ScriptedTransport, TEST_ENDPOINTS, hw_status_reply};

    #[test]
    fn test_every_sample_reported() {
        let cancel = CancelToken::new();
        let mut transport = ScriptedTransport::new();
        transport
            .push_status_exchange(hw_status_reply(0x80, 0x00))
            .push_status_exchange(hw_status_reply(0x80, 0x00))
            .cancel_after_writes(2, cancel.clone());

        let mut executor = TransactionExecutor::new(&mut transport, TEST_ENDPOINTS);
        let mut events = Vec::new();
        let summary = run(&mut executor, &Timing::immediate(), &cancel, |e| events.push(e));

        assert_eq!(summary.polls, 2);
        assert_eq!(events.len(), 2);
        assert!(
            events
                .iter()
                .all(|e| matches!(e, RawEvent::Sample { snapshot, .. } if !snapshot.hopper()))
        );
    }
}
