//! Guided bit discovery
//!
//! Walks the operator through a script of physical actions. After each one
//! the status is sampled for the action's settle window and the last sample
//! is kept. Once every action is recorded, each one is diffed against the
//! first (baseline) action, not against its predecessor, so every entry shows
//! that action's net effect.

use super::transaction::{PhaseMismatch, TransactionExecutor};
use super::{SessionError, Timing, pause};
use common::{BulkTransport, CancelToken};
use protocol::{BitSpec, ChangeRecord, HwStatus};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Samples taken per second of settle time
pub const SAMPLES_PER_SECOND: u32 = 10;

/// Longest settle window a configured action may ask for
pub const MAX_SETTLE_SECS: u32 = 300;

/// One physical action the operator performs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryAction {
    pub label: String,
    pub settle_secs: u32,
}

impl DiscoveryAction {
    pub fn new(label: impl Into<String>, settle_secs: u32) -> Self {
        Self {
            label: label.into(),
            settle_secs,
        }
    }

    /// Number of samples taken for this action (at least one)
    pub fn sample_count(&self) -> u32 {
        self.settle_secs.saturating_mul(SAMPLES_PER_SECOND).max(1)
    }
}

/// The script used when the configuration does not override it
pub fn default_script() -> Vec<DiscoveryAction> {
    vec![
        DiscoveryAction::new("baseline — don't touch anything", 3),
        DiscoveryAction::new("PRESS and HOLD the scan button", 3),
        DiscoveryAction::new("RELEASE the scan button", 3),
        DiscoveryAction::new("INSERT a sheet of paper into the feeder", 5),
        DiscoveryAction::new("REMOVE the sheet of paper", 5),
    ]
}

/// Whoever performs the physical actions
pub trait Operator {
    /// Block until the operator reports `action` (step `step` of `total`) as done
    fn confirm(&mut self, action: &DiscoveryAction, step: usize, total: usize)
    -> std::io::Result<()>;

    /// Show a free-form instruction and block until the operator acknowledges it
    fn acknowledge(&mut self, instruction: &str) -> std::io::Result<()>;
}

/// Progress events emitted while the script runs
#[derive(Debug, Clone, PartialEq)]
pub enum DiscoveryEvent {
    /// Operator confirmed; sampling for the settle window
    Sampling {
        step: usize,
        label: String,
        settle_secs: u32,
    },
    PhaseMismatch {
        step: usize,
        mismatch: PhaseMismatch,
    },
    /// Final sample kept for this action
    Recorded {
        step: usize,
        label: String,
        snapshot: HwStatus,
    },
}

/// Ordered (label, snapshot) pairs; the first entry is the baseline
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiscoveryTrace {
    entries: Vec<(String, HwStatus)>,
}

impl DiscoveryTrace {
    pub fn push(&mut self, label: impl Into<String>, snapshot: HwStatus) {
        self.entries.push((label.into(), snapshot));
    }

    pub fn entries(&self) -> &[(String, HwStatus)] {
        &self.entries
    }

    pub fn baseline(&self) -> Option<&(String, HwStatus)> {
        self.entries.first()
    }

    /// Diff every later entry against the baseline
    pub fn report(&self, extra: &[BitSpec]) -> DiscoveryReport {
        let Some((baseline_label, baseline)) = self.baseline() else {
            return DiscoveryReport::default();
        };

        let entries = self.entries[1..]
            .iter()
            .map(|(label, snapshot)| ReportEntry {
                label: label.clone(),
                changes: ChangeRecord::between_with(baseline, snapshot, extra),
            })
            .collect();

        DiscoveryReport {
            baseline: Some(baseline_label.clone()),
            entries,
        }
    }
}

/// One action's net effect relative to the baseline
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportEntry {
    pub label: String,
    pub changes: ChangeRecord,
}

/// Batch diff report produced at the end of a session
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DiscoveryReport {
    pub baseline: Option<String>,
    pub entries: Vec<ReportEntry>,
}

/// Runs a discovery script against the scanner
pub struct DiscoveryEngine<'a, T> {
    executor: &'a mut TransactionExecutor<T>,
    timing: Timing,
    script: &'a [DiscoveryAction],
}

impl<'a, T: BulkTransport> DiscoveryEngine<'a, T> {
    pub fn new(
        executor: &'a mut TransactionExecutor<T>,
        timing: Timing,
        script: &'a [DiscoveryAction],
    ) -> Self {
        Self {
            executor,
            timing,
            script,
        }
    }

    /// Run every action in order and return the recorded trace
    ///
    /// Transport faults end the session. Cancellation is honoured before each
    /// action and between samples.
    pub fn run<O, F>(
        &mut self,
        operator: &mut O,
        cancel: &CancelToken,
        mut on_event: F,
    ) -> Result<DiscoveryTrace, SessionError>
    where
        O: Operator + ?Sized,
        F: FnMut(DiscoveryEvent),
    {
        let mut trace = DiscoveryTrace::default();
        let script = self.script;

        for (index, action) in script.iter().enumerate() {
            let step = index + 1;
            if cancel.is_cancelled() {
                return Err(SessionError::Cancelled);
            }

            operator.confirm(action, step, script.len())?;
            if cancel.is_cancelled() {
                return Err(SessionError::Cancelled);
            }

            info!("discovery step {}: {}", step, action.label);
            on_event(DiscoveryEvent::Sampling {
                step,
                label: action.label.clone(),
                settle_secs: action.settle_secs,
            });

            let snapshot = self.sample(step, action, cancel, &mut on_event)?;
            debug!("discovery step {} recorded: {}", step, protocol::hex_of(snapshot.raw()));

            on_event(DiscoveryEvent::Recorded {
                step,
                label: action.label.clone(),
                snapshot: snapshot.clone(),
            });
            trace.push(action.label.clone(), snapshot);
        }

        Ok(trace)
    }

    /// Sample for the settle window and keep the last reading
    fn sample<F>(
        &mut self,
        step: usize,
        action: &DiscoveryAction,
        cancel: &CancelToken,
        on_event: &mut F,
    ) -> Result<HwStatus, SessionError>
    where
        F: FnMut(DiscoveryEvent),
    {
        if !pause(self.timing.discovery_lead_in, cancel) {
            return Err(SessionError::Cancelled);
        }

        let mut last = None;
        for _ in 0..action.sample_count() {
            if cancel.is_cancelled() {
                return Err(SessionError::Cancelled);
            }
            let read = self.executor.read_status()?;
            if let Some(mismatch) = read.mismatch {
                on_event(DiscoveryEvent::PhaseMismatch { step, mismatch });
            }
            last = Some(read.snapshot);
            pause(self.timing.discovery_sample_interval, cancel);
        }

        last.ok_or(SessionError::Cancelled)
    }
}
