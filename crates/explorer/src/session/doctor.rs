//! Interactive hardware check
//!
//! Verifies the scanner end to end: open the device, read the status once,
//! then have the operator insert and remove a sheet of paper and press and
//! release the scan button. Each physical check polls until the expected
//! state shows up or `Timing::doctor_timeout` runs out. A failed connection
//! or status read aborts the run; a timed-out physical check is recorded and
//! the run moves on.

use super::discovery::Operator;
use super::link::{Connector, DeviceLink};
use super::transaction::TransactionExecutor;
use super::{SessionError, Timing, pause};
use common::{BulkTransport, CancelToken};
use protocol::HwStatus;
use protocol::status::BUTTON_BYTE;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Scan switch (bit 0) or button held (bit 5)
const BUTTON_DOWN_MASK: u8 = 0x21;

/// Hardware checks, in the order they run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Check {
    Connection,
    HardwareStatus,
    PaperIn,
    PaperOut,
    ButtonDown,
    ButtonUp,
}

/// Sensor a physical check watches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sensor {
    Paper,
    Button,
}

impl Sensor {
    pub fn read(self, snapshot: &HwStatus) -> bool {
        match self {
            Sensor::Paper => snapshot.hopper(),
            Sensor::Button => snapshot.byte(BUTTON_BYTE) & BUTTON_DOWN_MASK != 0,
        }
    }
}

/// What the operator is told before a check polls
enum Cue {
    /// Wait for Enter
    Confirm(&'static str),
    /// Show and start polling right away
    Notice(&'static str),
}

impl Check {
    pub const ALL: [Check; 6] = [
        Check::Connection,
        Check::HardwareStatus,
        Check::PaperIn,
        Check::PaperOut,
        Check::ButtonDown,
        Check::ButtonUp,
    ];

    pub fn title(self) -> &'static str {
        match self {
            Check::Connection => "USB connection",
            Check::HardwareStatus => "Hardware status",
            Check::PaperIn => "Paper detect",
            Check::PaperOut => "Paper remove",
            Check::ButtonDown => "Button press",
            Check::ButtonUp => "Button release",
        }
    }

    /// Identifier used in JSON output
    pub fn name(self) -> &'static str {
        match self {
            Check::Connection => "connection",
            Check::HardwareStatus => "hardware_status",
            Check::PaperIn => "paper_in",
            Check::PaperOut => "paper_out",
            Check::ButtonDown => "button_down",
            Check::ButtonUp => "button_up",
        }
    }

    /// Sensor and state a physical check waits for
    pub fn target(self) -> Option<(Sensor, bool)> {
        match self {
            Check::Connection | Check::HardwareStatus => None,
            Check::PaperIn => Some((Sensor::Paper, true)),
            Check::PaperOut => Some((Sensor::Paper, false)),
            Check::ButtonDown => Some((Sensor::Button, true)),
            Check::ButtonUp => Some((Sensor::Button, false)),
        }
    }

    fn cue(self) -> Option<Cue> {
        match self {
            Check::Connection | Check::HardwareStatus => None,
            Check::PaperIn => Some(Cue::Confirm("Press Enter, then insert a sheet of paper")),
            Check::PaperOut => Some(Cue::Confirm("Press Enter, then remove the paper")),
            Check::ButtonDown => Some(Cue::Confirm(
                "Press Enter, then press and HOLD the scan button",
            )),
            Check::ButtonUp => Some(Cue::Notice("Release the button now.")),
        }
    }

    /// Instruction for when the target state is already showing
    fn reset_instruction(self) -> Option<&'static str> {
        match self {
            Check::PaperIn => Some("Paper already in feeder, remove it first, then press Enter"),
            Check::ButtonDown => Some("Button appears held, release it first, then press Enter"),
            _ => None,
        }
    }
}

/// Progress reported while the checks run
#[derive(Debug, Clone, PartialEq)]
pub enum DoctorEvent {
    Started {
        step: usize,
        total: usize,
        check: Check,
    },
    /// Something for the operator to read; no confirmation needed
    Notice { check: Check, message: &'static str },
    /// Polling for the check's target state
    Waiting { check: Check },
    /// `snapshot` is the reading that satisfied the check, if it reads one
    Passed {
        check: Check,
        snapshot: Option<HwStatus>,
    },
    Failed { check: Check, reason: String },
}

/// Tally of a doctor run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DoctorReport {
    pub passed: u32,
    pub failed: u32,
    /// A connection or status failure stopped the run early
    pub aborted: bool,
}

impl DoctorReport {
    pub fn total(&self) -> u32 {
        self.passed + self.failed
    }

    pub fn all_passed(&self) -> bool {
        self.failed == 0 && !self.aborted
    }

    fn pass<F>(&mut self, check: Check, snapshot: Option<HwStatus>, on_event: &mut F)
    where
        F: FnMut(DoctorEvent),
    {
        info!("Doctor: {} passed", check.title());
        self.passed += 1;
        on_event(DoctorEvent::Passed { check, snapshot });
    }

    fn fail<F>(&mut self, check: Check, reason: String, on_event: &mut F)
    where
        F: FnMut(DoctorEvent),
    {
        warn!("Doctor: {} failed: {}", check.title(), reason);
        self.failed += 1;
        on_event(DoctorEvent::Failed { check, reason });
    }

    fn abort<F>(&mut self, check: Check, reason: String, on_event: &mut F)
    where
        F: FnMut(DoctorEvent),
    {
        self.aborted = true;
        self.fail(check, reason, on_event);
    }
}

/// Runs the hardware checks against a device link
pub struct Doctor<'a, C: Connector> {
    link: &'a mut DeviceLink<C>,
    timing: Timing,
}

impl<'a, C: Connector> Doctor<'a, C> {
    pub fn new(link: &'a mut DeviceLink<C>, timing: Timing) -> Self {
        Self { link, timing }
    }

    /// Run every check in order
    ///
    /// Check failures end up in the report; only operator I/O errors and
    /// cancellation are returned as errors.
    pub fn run<O, F>(
        self,
        operator: &mut O,
        cancel: &CancelToken,
        mut on_event: F,
    ) -> Result<DoctorReport, SessionError>
    where
        O: Operator + ?Sized,
        F: FnMut(DoctorEvent),
    {
        let timing = self.timing;
        let total = Check::ALL.len();
        let mut report = DoctorReport::default();

        on_event(DoctorEvent::Started {
            step: 1,
            total,
            check: Check::Connection,
        });
        let executor = match self.link.connect() {
            Ok(executor) => executor,
            Err(e) => {
                report.abort(Check::Connection, e.to_string(), &mut on_event);
                return Ok(report);
            }
        };
        report.pass(Check::Connection, None, &mut on_event);

        on_event(DoctorEvent::Started {
            step: 2,
            total,
            check: Check::HardwareStatus,
        });
        let mut last = match executor.read_status() {
            Ok(read) => read.snapshot,
            Err(e) => {
                report.abort(Check::HardwareStatus, e.to_string(), &mut on_event);
                return Ok(report);
            }
        };
        report.pass(Check::HardwareStatus, Some(last.clone()), &mut on_event);

        for (index, check) in Check::ALL.into_iter().enumerate() {
            let Some((sensor, expected)) = check.target() else {
                continue;
            };
            if cancel.is_cancelled() {
                return Err(SessionError::Cancelled);
            }
            on_event(DoctorEvent::Started {
                step: index + 1,
                total,
                check,
            });

            if sensor.read(&last) == expected {
                if let Some(instruction) = check.reset_instruction() {
                    operator.acknowledge(instruction)?;
                    match wait_for(executor, sensor, !expected, &timing, cancel)? {
                        Some(snapshot) => last = snapshot,
                        None => on_event(DoctorEvent::Notice {
                            check,
                            message: "Timed out, could not establish the starting state",
                        }),
                    }
                }
            }

            match check.cue() {
                Some(Cue::Confirm(instruction)) => operator.acknowledge(instruction)?,
                Some(Cue::Notice(message)) => on_event(DoctorEvent::Notice { check, message }),
                None => {}
            }

            on_event(DoctorEvent::Waiting { check });
            match wait_for(executor, sensor, expected, &timing, cancel)? {
                Some(snapshot) => {
                    last = snapshot.clone();
                    report.pass(check, Some(snapshot), &mut on_event);
                }
                None => report.fail(
                    check,
                    format!("timed out after {:?}", timing.doctor_timeout),
                    &mut on_event,
                ),
            }
        }

        Ok(report)
    }
}

/// Poll until `sensor` reads `expected` or the check times out
///
/// Transport faults are logged and polling continues.
fn wait_for<T: BulkTransport>(
    executor: &mut TransactionExecutor<T>,
    sensor: Sensor,
    expected: bool,
    timing: &Timing,
    cancel: &CancelToken,
) -> Result<Option<HwStatus>, SessionError> {
    let start = Instant::now();
    loop {
        if cancel.is_cancelled() {
            return Err(SessionError::Cancelled);
        }
        match executor.read_status() {
            Ok(read) if sensor.read(&read.snapshot) == expected => return Ok(Some(read.snapshot)),
            Ok(_) => {}
            Err(e) => debug!("Doctor poll failed: {}", e),
        }
        if start.elapsed() >= timing.doctor_timeout {
            return Ok(None);
        }
        if !pause(timing.poll_interval, cancel) {
            return Err(SessionError::Cancelled);
        }
    }
}
