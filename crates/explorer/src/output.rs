//! Console rendering of session events
//!
//! Sessions emit structured events; this module turns them into the operator
//! report on stdout. Text mode keeps the classic explorer layout (hex dumps,
//! 8-bit binary, poll counters). JSON mode writes one object per line.
//! Faults go to the error stream in text mode. Timestamps are local
//! wall-clock time.

use crate::session::doctor::Sensor;
use crate::session::{
    Check, DiscoveryEvent, DiscoveryReport, DoctorEvent, DoctorReport, MonitorEvent,
    PhaseMismatch, PollSummary, RawEvent, StatusRead,
};
use crate::usb::{PRODUCT_ID, S1500_ENDPOINTS, VENDOR_ID};
use protocol::status::{ADF_BYTE, BUTTON_BYTE, CONSUMABLE_BYTE, ERROR_BYTE};
use protocol::{
    BitSpec, Envelope, HW_STATUS_LEN, HwStatus, STATUS_BITS, bits_of, bool_label, hex_of,
};
use chrono::{DateTime, FixedOffset, Local};
use serde_json::{Value, json};
use std::io::{self, Write};

const RULE_WIDTH: usize = 60;
const RAW_RULE_WIDTH: usize = 72;
const DOCTOR_RULE_WIDTH: usize = 20;
/// Width of a dotted doctor check title
const DOCTOR_TITLE_WIDTH: usize = 25;

/// Auxiliary bytes shown in dumps
const BYTES_OF_INTEREST: [(usize, &str); 4] = [
    (ADF_BYTE, "ADF/paper"),
    (BUTTON_BYTE, "buttons"),
    (CONSUMABLE_BYTE, "consumables"),
    (ERROR_BYTE, "errors"),
];

/// Output format selected on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Text,
    Json,
}

/// Writes the operator report
pub struct Renderer<W, E> {
    out: W,
    err: E,
    format: Format,
    extra: Vec<BitSpec>,
    clock: fn() -> DateTime<FixedOffset>,
}

impl Renderer<io::Stdout, io::Stderr> {
    pub fn stdio(format: Format) -> Self {
        Self::new(io::stdout(), io::stderr(), format)
    }
}

impl<W: Write, E: Write> Renderer<W, E> {
    pub fn new(out: W, err: E, format: Format) -> Self {
        Self {
            out,
            err,
            format,
            extra: Vec::new(),
            clock: local_now,
        }
    }

    /// Also show operator-defined bits in decoded dumps
    pub fn with_extra_bits(mut self, extra: &[BitSpec]) -> Self {
        self.extra = extra.to_vec();
        self
    }

    /// Replace the wall clock (tests)
    pub fn with_clock(mut self, clock: fn() -> DateTime<FixedOffset>) -> Self {
        self.clock = clock;
        self
    }

    pub fn into_inner(self) -> (W, E) {
        (self.out, self.err)
    }

    fn json_line(&mut self, value: Value) -> io::Result<()> {
        serde_json::to_writer(&mut self.out, &value)?;
        writeln!(self.out)?;
        self.out.flush()
    }

    fn now(&self) -> DateTime<FixedOffset> {
        (self.clock)()
    }

    /// Startup banner
    pub fn banner(&mut self) -> io::Result<()> {
        if self.format == Format::Json {
            return Ok(());
        }
        writeln!(self.out, "ScanSnap S1500 Explorer")?;
        writeln!(
            self.out,
            "USB: {:#06x}:{:#06x}  EP_OUT={:#04x}  EP_IN={:#04x}",
            VENDOR_ID, PRODUCT_ID, S1500_ENDPOINTS.bulk_out, S1500_ENDPOINTS.bulk_in
        )?;
        writeln!(self.out)
    }

    pub fn connected(&mut self) -> io::Result<()> {
        if self.format == Format::Json {
            return Ok(());
        }
        writeln!(self.out, "Connected.\n")
    }

    /// Single-read diagnostic dump
    pub fn once(&mut self, ready: bool, command: &Envelope, read: &StatusRead) -> io::Result<()> {
        if self.format == Format::Json {
            return self.json_line(json!({
                "event": "once",
                "ready": ready,
                "command": hex_of(command.as_bytes()),
                "data": hex_of(&read.exchange.primary),
                "status": read.exchange.secondary.as_deref().map(hex_of),
                "phase_mismatch": read.mismatch.map(mismatch_name),
                "decoded": read.snapshot,
                "extra": self.extra_values(&read.snapshot),
            }));
        }

        writeln!(self.out, "=== TEST UNIT READY ===")?;
        writeln!(self.out, "Device ready: {}\n", bool_label(ready))?;

        writeln!(self.out, "=== GET_HW_STATUS ===")?;
        writeln!(self.out, "Command: {}\n", hex_of(command.as_bytes()))?;

        let data = &read.exchange.primary;
        writeln!(
            self.out,
            "Phase 2 (data):   [{:2} bytes] {}",
            data.len(),
            hex_of(data)
        )?;
        if let Some(status) = &read.exchange.secondary {
            writeln!(
                self.out,
                "Phase 3 (status): [{:2} bytes] {}",
                status.len(),
                hex_of(status)
            )?;
        }
        if let Some(mismatch) = read.mismatch {
            self.mismatch_line(mismatch)?;
        }
        writeln!(self.out)?;

        let hw = &read.snapshot;
        writeln!(self.out, "Decoded status:")?;
        let rows: Vec<(String, bool)> = STATUS_BITS
            .iter()
            .chain(self.extra.iter())
            .map(|spec| (format!("{} ({}):", spec.name, spec.label), hw.evaluate(spec)))
            .collect();
        let width = rows.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
        for (key, value) in rows {
            writeln!(self.out, "  {:<width$} {}", key, bool_label(value))?;
        }
        writeln!(self.out)?;

        writeln!(self.out, "Raw bytes of interest:")?;
        for (index, label) in BYTES_OF_INTEREST {
            let b = hw.byte(index);
            writeln!(
                self.out,
                "  byte[{}] ({:12}): 0x{:02x} = {}",
                index,
                label,
                b,
                bits_of(b)
            )?;
        }
        self.out.flush()
    }

    pub fn raw_header(&mut self) -> io::Result<()> {
        if self.format == Format::Json {
            return Ok(());
        }
        writeln!(self.out, "{:>12} | {:40} | hop adf btn", "time", "raw hex")?;
        writeln!(self.out, "{}", "-".repeat(RAW_RULE_WIDTH))?;
        self.out.flush()
    }

    pub fn raw_event(&mut self, event: &RawEvent) -> io::Result<()> {
        match event {
            RawEvent::Sample { poll, snapshot } => {
                let time = clock_tenths(&self.now());
                if self.format == Format::Json {
                    return self.json_line(json!({
                        "event": "sample",
                        "time": time,
                        "poll": poll,
                        "status": snapshot,
                        "extra": self.extra_values(snapshot),
                    }));
                }
                writeln!(
                    self.out,
                    "{:>12} | {:40} | {} {} {}",
                    time,
                    hex_of(snapshot.raw()),
                    flag(snapshot.hopper(), 'Y'),
                    flag(snapshot.adf_open(), 'O'),
                    flag(snapshot.scan_sw(), 'B'),
                )?;
                self.out.flush()
            }
            RawEvent::PhaseMismatch { poll, mismatch } => self.mismatch("poll", *poll, *mismatch),
            RawEvent::Fault { error } => self.fault(error),
            RawEvent::DeviceLeft => self.presence(false),
            RawEvent::DeviceArrived => self.presence(true),
        }
    }

    pub fn monitor_intro(&mut self) -> io::Result<()> {
        if self.format == Format::Json {
            return Ok(());
        }
        writeln!(self.out, "Monitoring for state changes... (Ctrl-C to stop)")?;
        writeln!(
            self.out,
            "Try: press scan button, insert paper, remove paper, open/close ADF"
        )?;
        writeln!(self.out)?;
        self.out.flush()
    }

    pub fn monitor_event(&mut self, event: &MonitorEvent) -> io::Result<()> {
        match event {
            MonitorEvent::Initial { poll, snapshot } => {
                let time = clock(&self.now());
                if self.format == Format::Json {
                    return self.json_line(json!({
                        "event": "initial",
                        "time": time,
                        "poll": poll,
                        "status": snapshot,
                        "extra": self.extra_values(snapshot),
                    }));
                }
                writeln!(self.out, "[{}] Initial state (poll #{}):", time, poll)?;
                writeln!(
                    self.out,
                    "  hopper={}  adf_open={}  scan_sw={}",
                    bool_label(snapshot.hopper()),
                    bool_label(snapshot.adf_open()),
                    bool_label(snapshot.scan_sw())
                )?;
                writeln!(self.out, "  raw: {}", hex_of(snapshot.raw()))?;
                for (index, _) in BYTES_OF_INTEREST {
                    let b = snapshot.byte(index);
                    writeln!(self.out, "  byte[{}]: 0x{:02x} = {}", index, b, bits_of(b))?;
                }
                writeln!(self.out)?;
                self.out.flush()
            }
            MonitorEvent::Changed {
                poll,
                changes,
                snapshot,
            } => {
                let time = clock(&self.now());
                if self.format == Format::Json {
                    return self.json_line(json!({
                        "event": "changed",
                        "time": time,
                        "poll": poll,
                        "changes": changes,
                        "raw": hex_of(snapshot.raw()),
                    }));
                }
                writeln!(self.out, "[{}] STATE CHANGE (poll #{}):", time, poll)?;
                for change in changes {
                    writeln!(self.out, "  {}", change)?;
                }
                writeln!(self.out, "  raw: {}", hex_of(snapshot.raw()))?;
                writeln!(self.out)?;
                self.out.flush()
            }
            MonitorEvent::PhaseMismatch { poll, mismatch } => {
                self.mismatch("poll", *poll, *mismatch)
            }
            MonitorEvent::Fault { error } => self.fault(error),
            MonitorEvent::DeviceLeft => self.presence(false),
            MonitorEvent::DeviceArrived => self.presence(true),
        }
    }

    /// Closing line for the polling modes
    pub fn summary(&mut self, summary: &PollSummary) -> io::Result<()> {
        if self.format == Format::Json {
            return self.json_line(json!({
                "event": "done",
                "polls": summary.polls,
                "faults": summary.faults,
                "reconnects": summary.reconnects,
            }));
        }
        match summary.reconnects {
            0 => writeln!(self.out, "\nDone. {} polls.", summary.polls)?,
            n => writeln!(
                self.out,
                "\nDone. {} polls, device reconnected {} time(s).",
                summary.polls, n
            )?,
        }
        self.out.flush()
    }

    pub fn discovery_intro(&mut self) -> io::Result<()> {
        if self.format == Format::Json {
            return Ok(());
        }
        writeln!(self.out, "=== BIT DISCOVERY MODE ===")?;
        writeln!(
            self.out,
            "We'll record the raw response, then ask you to change something,"
        )?;
        writeln!(
            self.out,
            "then record again and show you exactly which bits changed.\n"
        )?;
        self.out.flush()
    }

    pub fn discovery_event(&mut self, event: &DiscoveryEvent) -> io::Result<()> {
        match event {
            DiscoveryEvent::Sampling {
                step,
                label,
                settle_secs,
            } => {
                if self.format == Format::Json {
                    return self.json_line(json!({
                        "event": "sampling",
                        "step": step,
                        "label": label,
                        "settle_secs": settle_secs,
                    }));
                }
                writeln!(
                    self.out,
                    "  reading (waiting {}s for settle)...",
                    settle_secs
                )?;
                self.out.flush()
            }
            DiscoveryEvent::PhaseMismatch { step, mismatch } => {
                self.mismatch("step", *step as u64, *mismatch)
            }
            DiscoveryEvent::Recorded {
                step,
                label,
                snapshot,
            } => {
                if self.format == Format::Json {
                    return self.json_line(json!({
                        "event": "recorded",
                        "step": step,
                        "label": label,
                        "status": snapshot,
                    }));
                }
                writeln!(self.out, "  raw: {}", hex_of(snapshot.raw()))?;
                for index in 0..HW_STATUS_LEN {
                    let b = snapshot.byte(index);
                    writeln!(self.out, "    [{:2}] 0x{:02x} = {}", index, b, bits_of(b))?;
                }
                writeln!(self.out)?;
                self.out.flush()
            }
        }
    }

    /// Batch diff of every action against the baseline
    pub fn discovery_report(&mut self, report: &DiscoveryReport) -> io::Result<()> {
        if self.format == Format::Json {
            return self.json_line(json!({
                "event": "report",
                "report": report,
            }));
        }
        writeln!(self.out, "{}", "=".repeat(RULE_WIDTH))?;
        writeln!(self.out, "DIFF REPORT")?;
        writeln!(self.out, "{}", "=".repeat(RULE_WIDTH))?;
        for entry in &report.entries {
            writeln!(self.out, "\n'{}' vs baseline:", entry.label)?;
            if entry.changes.is_empty() {
                writeln!(self.out, "  (no changes)")?;
            }
            for change in &entry.changes {
                writeln!(self.out, "    {}", change)?;
            }
        }
        self.out.flush()
    }

    pub fn doctor_intro(&mut self) -> io::Result<()> {
        if self.format == Format::Json {
            return Ok(());
        }
        writeln!(self.out, "s1500-explore doctor")?;
        writeln!(self.out, "{}\n", "=".repeat(DOCTOR_RULE_WIDTH))?;
        writeln!(
            self.out,
            "Verifying USB communication and hardware event detection"
        )?;
        writeln!(self.out, "for the ScanSnap S1500.\n")?;
        self.out.flush()
    }

    pub fn doctor_event(&mut self, event: &DoctorEvent) -> io::Result<()> {
        if self.format == Format::Json {
            return match event {
                DoctorEvent::Started { step, total, check } => self.json_line(json!({
                    "event": "check",
                    "step": step,
                    "total": total,
                    "check": check.name(),
                })),
                DoctorEvent::Notice { check, message } => self.json_line(json!({
                    "event": "notice",
                    "check": check.name(),
                    "message": message,
                })),
                DoctorEvent::Waiting { .. } => Ok(()),
                DoctorEvent::Passed { check, snapshot } => self.json_line(json!({
                    "event": "check_passed",
                    "check": check.name(),
                    "status": snapshot,
                })),
                DoctorEvent::Failed { check, reason } => self.json_line(json!({
                    "event": "check_failed",
                    "check": check.name(),
                    "reason": reason,
                })),
            };
        }

        match event {
            DoctorEvent::Started { step, total, check } => {
                if check.target().is_some() {
                    writeln!(self.out, "\n[{}/{}] {}", step, total, check.title())?;
                } else {
                    let title = format!("{} ", check.title());
                    write!(
                        self.out,
                        "[{}/{}] {:.<width$} ",
                        step,
                        total,
                        title,
                        width = DOCTOR_TITLE_WIDTH
                    )?;
                }
            }
            DoctorEvent::Notice { message, .. } => writeln!(self.out, "      {}", message)?,
            DoctorEvent::Waiting { .. } => write!(self.out, "      Polling...")?,
            DoctorEvent::Passed { check, snapshot } => match (check.target(), snapshot) {
                (Some(_), _) => writeln!(self.out, " detected!       PASS")?,
                (None, Some(snapshot)) => writeln!(
                    self.out,
                    "ok  (paper={}, button={})",
                    bool_label(Sensor::Paper.read(snapshot)),
                    bool_label(Sensor::Button.read(snapshot))
                )?,
                (None, None) => writeln!(self.out, "ok")?,
            },
            DoctorEvent::Failed { check, reason } => {
                if check.target().is_some() {
                    writeln!(self.out, " timed out       FAIL")?;
                } else {
                    writeln!(self.out, "FAIL\n\n      {}", reason)?;
                    if *check == Check::Connection {
                        writeln!(self.out, "      Check: lsusb | grep 04c5")?;
                    }
                }
            }
        }
        self.out.flush()
    }

    pub fn doctor_summary(&mut self, report: &DoctorReport) -> io::Result<()> {
        if self.format == Format::Json {
            return self.json_line(json!({
                "event": "doctor_done",
                "passed": report.passed,
                "failed": report.failed,
                "aborted": report.aborted,
            }));
        }
        writeln!(self.out, "\n{}", "=".repeat(DOCTOR_RULE_WIDTH))?;
        if report.all_passed() {
            writeln!(
                self.out,
                "All {} checks passed. Scanner is working correctly.",
                report.total()
            )?;
        } else {
            writeln!(
                self.out,
                "{}/{} passed, {} failed.",
                report.passed,
                report.total(),
                report.failed
            )?;
            if report.aborted {
                writeln!(self.out, "Remaining checks skipped.")?;
            }
        }
        self.out.flush()
    }

    /// Phase mismatch tagged with the poll or step it happened on
    fn mismatch(&mut self, key: &str, counter: u64, mismatch: PhaseMismatch) -> io::Result<()> {
        if self.format == Format::Json {
            let mut event = json!({
                "event": "phase_mismatch",
                "outcome": mismatch_name(mismatch),
            });
            event[key] = json!(counter);
            return self.json_line(event);
        }
        self.mismatch_line(mismatch)
    }

    fn presence(&mut self, arrived: bool) -> io::Result<()> {
        let time = clock(&self.now());
        if self.format == Format::Json {
            let event = if arrived { "device_arrived" } else { "device_left" };
            return self.json_line(json!({
                "event": event,
                "time": time,
            }));
        }
        if arrived {
            writeln!(self.out, "[{}] Device arrived.\n", time)?;
        } else {
            writeln!(
                self.out,
                "[{}] Device left (ADF lid closed?), waiting for it to return...",
                time
            )?;
        }
        self.out.flush()
    }

    fn mismatch_line(&mut self, mismatch: PhaseMismatch) -> io::Result<()> {
        match mismatch {
            PhaseMismatch::Recovered => writeln!(
                self.out,
                "  WARNING: got status 0x53 instead of data. Using data from status phase."
            ),
            PhaseMismatch::Unrecovered => writeln!(
                self.out,
                "  WARNING: got status 0x53 instead of data and no usable status phase."
            ),
        }
    }

    fn fault(&mut self, error: &common::TransportError) -> io::Result<()> {
        if self.format == Format::Json {
            return self.json_line(json!({
                "event": "fault",
                "error": error.to_string(),
            }));
        }
        writeln!(self.err, "USB error: {} (retrying)", error)?;
        self.err.flush()
    }

    fn extra_values(&self, snapshot: &HwStatus) -> Value {
        let map = self
            .extra
            .iter()
            .map(|spec| (spec.name.to_string(), Value::Bool(snapshot.evaluate(spec))))
            .collect();
        Value::Object(map)
    }
}

fn flag(set: bool, symbol: char) -> char {
    if set { symbol } else { '.' }
}

fn mismatch_name(mismatch: PhaseMismatch) -> &'static str {
    match mismatch {
        PhaseMismatch::Recovered => "recovered",
        PhaseMismatch::Unrecovered => "unrecovered",
    }
}

fn local_now() -> DateTime<FixedOffset> {
    Local::now().fixed_offset()
}

/// Wall-clock time as HH:MM:SS in the time's own offset
pub fn clock(time: &DateTime<FixedOffset>) -> String {
    time.format("%H:%M:%S").to_string()
}

/// Wall-clock time as HH:MM:SS.t (tenths)
pub fn clock_tenths(time: &DateTime<FixedOffset>) -> String {
    format!(
        "{}.{}",
        time.format("%H:%M:%S"),
        time.timestamp_subsec_millis() / 100
    )
}
