//! Change-only monitoring
//!
//! ```text
//! NoBaseline
//!   └─ snapshot ──→ emit Initial ──→ HasBaseline(snapshot)
//!
//! HasBaseline(prev)
//!   └─ snapshot ──→ emit Changed if diff(prev, snapshot) is non-empty
//!                   ──→ HasBaseline(snapshot)
//! ```
//!
//! The held snapshot is replaced on every tick, changed or not. When the
//! device leaves the bus the state drops back to `NoBaseline`, so the first
//! read after it returns is reported as a fresh initial state.

use super::Timing;
use super::link::StatusLink;
use super::poller::{PollOutcome, PollSummary, poll_until_cancelled};
use super::transaction::PhaseMismatch;
use common::{CancelToken, TransportError};
use protocol::{BitSpec, ChangeRecord, HwStatus};

/// Events reported by the monitor
#[derive(Debug, Clone, PartialEq)]
pub enum MonitorEvent {
    /// First successful read of the session
    Initial { poll: u64, snapshot: HwStatus },
    /// Something differs from the previous read
    Changed {
        poll: u64,
        changes: ChangeRecord,
        snapshot: HwStatus,
    },
    /// The data phase carried a status envelope
    PhaseMismatch { poll: u64, mismatch: PhaseMismatch },
    /// Transport failure; the monitor backs off and keeps going
    Fault { error: TransportError },
    /// The scanner dropped off the bus; the baseline is discarded
    DeviceLeft,
    /// The scanner is back
    DeviceArrived,
}

/// Baseline held between monitor ticks
#[derive(Debug, Clone, Default, PartialEq)]
pub enum MonitorState {
    #[default]
    NoBaseline,
    HasBaseline(HwStatus),
}

impl MonitorState {
    /// Feed one snapshot through the state machine
    ///
    /// `extra` bits are compared after the built-in fields.
    pub fn advance(
        self,
        poll: u64,
        snapshot: HwStatus,
        extra: &[BitSpec],
    ) -> (MonitorState, Option<MonitorEvent>) {
        match self {
            MonitorState::NoBaseline => (
                MonitorState::HasBaseline(snapshot.clone()),
                Some(MonitorEvent::Initial { poll, snapshot }),
            ),
            MonitorState::HasBaseline(previous) => {
                let changes = ChangeRecord::between_with(&previous, &snapshot, extra);
                let event = (!changes.is_empty()).then(|| MonitorEvent::Changed {
                    poll,
                    changes,
                    snapshot: snapshot.clone(),
                });
                (MonitorState::HasBaseline(snapshot), event)
            }
        }
    }

    pub fn baseline(&self) -> Option<&HwStatus> {
        match self {
            MonitorState::NoBaseline => None,
            MonitorState::HasBaseline(snapshot) => Some(snapshot),
        }
    }
}

/// Polls the scanner and reports only transitions
pub struct Monitor<'a, L> {
    link: &'a mut L,
    timing: Timing,
    extra: &'a [BitSpec],
}

impl<'a, L: StatusLink> Monitor<'a, L> {
    pub fn new(link: &'a mut L, timing: Timing) -> Self {
        Self {
            link,
            timing,
            extra: &[],
        }
    }

    /// Also report changes in operator-defined bits
    pub fn with_extra_bits(mut self, extra: &'a [BitSpec]) -> Self {
        self.extra = extra;
        self
    }

    /// Run until `cancel` fires
    pub fn run<F>(self, cancel: &CancelToken, mut on_event: F) -> PollSummary
    where
        F: FnMut(MonitorEvent),
    {
        let extra = self.extra;
        let mut state = MonitorState::NoBaseline;

        poll_until_cancelled(self.link, &self.timing, cancel, |outcome| match outcome {
            PollOutcome::Read { poll, read } => {
                if let Some(mismatch) = read.mismatch {
                    on_event(MonitorEvent::PhaseMismatch { poll, mismatch });
                }
                let (next, event) = std::mem::take(&mut state).advance(poll, read.snapshot, extra);
                state = next;
                if let Some(event) = event {
                    on_event(event);
                }
            }
            PollOutcome::Fault { error } => on_event(MonitorEvent::Fault { error }),
            PollOutcome::DeviceLeft => {
                state = MonitorState::NoBaseline;
                on_event(MonitorEvent::DeviceLeft);
            }
            PollOutcome::DeviceArrived => on_event(MonitorEvent::DeviceArrived),
        })
    }
}
