//! Run modes
//!
//! Each mode drives the session layer and forwards its events to the
//! [`Renderer`]. Output failures (stdout closed) cancel the session.

use crate::output::Renderer;
use crate::session::{
    self, Connector, DeviceLink, DiscoveryAction, DiscoveryEngine, DiscoveryReport, Doctor,
    DoctorReport, Monitor, Operator, PollSummary, SessionError, StatusLink, Timing,
    TransactionExecutor,
};
use common::{BulkTransport, CancelToken};
use protocol::{BitSpec, GET_HW_STATUS};
use std::io::{self, BufRead, Write};
use tracing::{info, warn};

/// Operating mode selected on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Single read with a full diagnostic dump
    Once,
    /// One raw line per poll
    Raw,
    /// Report state changes only
    #[default]
    Monitor,
    /// Guided bit discovery
    Discover,
    /// Interactive pass/fail hardware check
    Doctor,
}

/// Settings shared by every mode
pub struct ModeContext<'a> {
    pub timing: Timing,
    pub extra_bits: &'a [BitSpec],
    pub script: &'a [DiscoveryAction],
    pub cancel: &'a CancelToken,
}

/// Run `mode` to completion
///
/// Polling modes only end on cancellation and always succeed; they wait out
/// a vanished device. One-shot and discovery modes need the device to be
/// open already and fail on the first transport fault. Doctor mode opens the
/// device itself and fails if any check fails.
pub fn run<C, W, E, O>(
    mode: Mode,
    link: &mut DeviceLink<C>,
    ctx: &ModeContext<'_>,
    renderer: &mut Renderer<W, E>,
    operator: &mut O,
) -> Result<(), SessionError>
where
    C: Connector,
    W: Write,
    E: Write,
    O: Operator + ?Sized,
{
    info!("Running in {:?} mode", mode);
    match mode {
        Mode::Once => run_once(link.executor()?, renderer),
        Mode::Raw => {
            run_raw(link, ctx, renderer);
            Ok(())
        }
        Mode::Monitor => {
            run_monitor(link, ctx, renderer);
            Ok(())
        }
        Mode::Discover => run_discover(link.executor()?, ctx, renderer, operator).map(|_| ()),
        Mode::Doctor => {
            let report = run_doctor(link, ctx, renderer, operator)?;
            if report.all_passed() {
                Ok(())
            } else {
                Err(SessionError::ChecksFailed {
                    failed: report.failed,
                    total: report.total(),
                })
            }
        }
    }
}

/// TEST UNIT READY followed by one GET HARDWARE STATUS, both phases shown
pub fn run_once<T, W, E>(
    executor: &mut TransactionExecutor<T>,
    renderer: &mut Renderer<W, E>,
) -> Result<(), SessionError>
where
    T: BulkTransport,
    W: Write,
    E: Write,
{
    let ready = executor.test_unit_ready()?;
    let read = executor.read_status()?;
    renderer.once(ready, &GET_HW_STATUS, &read)?;
    Ok(())
}

pub fn run_raw<L, W, E>(
    link: &mut L,
    ctx: &ModeContext<'_>,
    renderer: &mut Renderer<W, E>,
) -> PollSummary
where
    L: StatusLink,
    W: Write,
    E: Write,
{
    emit(renderer.raw_header(), ctx.cancel);
    let summary = session::raw::run(link, &ctx.timing, ctx.cancel, |event| {
        emit(renderer.raw_event(&event), ctx.cancel)
    });
    emit(renderer.summary(&summary), ctx.cancel);
    summary
}

pub fn run_monitor<L, W, E>(
    link: &mut L,
    ctx: &ModeContext<'_>,
    renderer: &mut Renderer<W, E>,
) -> PollSummary
where
    L: StatusLink,
    W: Write,
    E: Write,
{
    emit(renderer.monitor_intro(), ctx.cancel);
    let summary = Monitor::new(link, ctx.timing)
        .with_extra_bits(ctx.extra_bits)
        .run(ctx.cancel, |event| {
            emit(renderer.monitor_event(&event), ctx.cancel)
        });
    emit(renderer.summary(&summary), ctx.cancel);
    summary
}

pub fn run_discover<T, W, E, O>(
    executor: &mut TransactionExecutor<T>,
    ctx: &ModeContext<'_>,
    renderer: &mut Renderer<W, E>,
    operator: &mut O,
) -> Result<DiscoveryReport, SessionError>
where
    T: BulkTransport,
    W: Write,
    E: Write,
    O: Operator + ?Sized,
{
    renderer.discovery_intro()?;

    let trace = DiscoveryEngine::new(executor, ctx.timing, ctx.script).run(
        operator,
        ctx.cancel,
        |event| emit(renderer.discovery_event(&event), ctx.cancel),
    )?;

    let report = trace.report(ctx.extra_bits);
    renderer.discovery_report(&report)?;
    Ok(report)
}

pub fn run_doctor<C, W, E, O>(
    link: &mut DeviceLink<C>,
    ctx: &ModeContext<'_>,
    renderer: &mut Renderer<W, E>,
    operator: &mut O,
) -> Result<DoctorReport, SessionError>
where
    C: Connector,
    W: Write,
    E: Write,
    O: Operator + ?Sized,
{
    renderer.doctor_intro()?;
    let report = Doctor::new(link, ctx.timing).run(operator, ctx.cancel, |event| {
        emit(renderer.doctor_event(&event), ctx.cancel)
    })?;
    renderer.doctor_summary(&report)?;
    Ok(report)
}

/// Stop the session if the report can no longer be written
fn emit(result: io::Result<()>, cancel: &CancelToken) {
    if let Err(e) = result {
        warn!("Failed to write output: {}", e);
        cancel.cancel();
    }
}

/// Prompts on a writer and waits for Enter on a reader
pub struct LineOperator<R, W> {
    input: R,
    prompt: W,
}

impl LineOperator<io::StdinLock<'static>, io::Stdout> {
    pub fn stdin() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl LineOperator<io::StdinLock<'static>, io::Stderr> {
    /// Prompt on stderr so stdout stays machine-readable
    pub fn stdin_quiet() -> Self {
        Self::new(io::stdin().lock(), io::stderr())
    }
}

impl<R: BufRead, W: Write> LineOperator<R, W> {
    pub fn new(input: R, prompt: W) -> Self {
        Self { input, prompt }
    }

    fn wait_for_enter(&mut self) -> io::Result<()> {
        self.prompt.flush()?;
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "operator input closed",
            ));
        }
        Ok(())
    }
}

impl<R: BufRead, W: Write> Operator for LineOperator<R, W> {
    fn confirm(&mut self, action: &DiscoveryAction, step: usize, total: usize) -> io::Result<()> {
        write!(
            self.prompt,
            ">>> [{}/{}] {}, then press Enter... ",
            step, total, action.label
        )?;
        self.wait_for_enter()
    }

    fn acknowledge(&mut self, instruction: &str) -> io::Result<()> {
        write!(self.prompt, "      {}: ", instruction)?;
        self.wait_for_enter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::Format;
    use common::TransportError;
    use common::test_utils::{ScriptedTransport, TEST_ENDPOINTS, hw_status_reply, status_reply};
    use std::io::Cursor;

    fn renderer() -> Renderer<Vec<u8>, Vec<u8>> {
        Renderer::new(Vec::new(), Vec::new(), Format::Text)
    }

    fn context<'a>(cancel: &'a CancelToken, script: &'a [DiscoveryAction]) -> ModeContext<'a> {
        ModeContext {
            timing: Timing::immediate(),
            extra_bits: &[],
            script,
            cancel,
        }
    }

    #[test]
    fn test_once_sends_tur_then_status() {
        let mut transport = ScriptedTransport::new();
        transport
            .push_read(status_reply())
            .push_status_exchange(hw_status_reply(0x80, 0x00));

        let mut executor = TransactionExecutor::new(&mut transport, TEST_ENDPOINTS);
        let mut out = renderer();
        run_once(&mut executor, &mut out).unwrap();

        let text = String::from_utf8(out.into_inner().0).unwrap();
        assert!(text.contains("Device ready: True"));
        assert_eq!(transport.writes().len(), 2);
    }

    #[test]
    fn test_once_fault_is_fatal() {
        let mut transport = ScriptedTransport::new();
        transport.push_read(status_reply());

        let mut executor = TransactionExecutor::new(&mut transport, TEST_ENDPOINTS);
        let err = run_once(&mut executor, &mut renderer()).unwrap_err();
        assert!(matches!(
            err,
            SessionError::Transport(TransportError::Timeout)
        ));
    }

    #[test]
    fn test_monitor_mode_until_cancelled() {
        let cancel = CancelToken::new();
        let mut transport = ScriptedTransport::new();
        transport
            .push_status_exchange(hw_status_reply(0x80, 0x00))
            .push_status_exchange(hw_status_reply(0x80, 0x01))
            .cancel_after_writes(2, cancel.clone());

        let mut executor = TransactionExecutor::new(&mut transport, TEST_ENDPOINTS);
        let mut out = renderer();
        let summary = run_monitor(&mut executor, &context(&cancel, &[]), &mut out);
        assert_eq!(summary.polls, 2);

        let text = String::from_utf8(out.into_inner().0).unwrap();
        assert!(text.contains("Initial state (poll #1)"));
        assert!(text.contains("STATE CHANGE (poll #2)"));
        assert!(text.contains("Done. 2 polls."));
    }

    #[test]
    fn test_raw_mode_one_line_per_poll() {
        let cancel = CancelToken::new();
        let mut transport = ScriptedTransport::new();
        transport
            .push_status_exchange(hw_status_reply(0x80, 0x00))
            .push_status_exchange(hw_status_reply(0x80, 0x00))
            .push_status_exchange(hw_status_reply(0x80, 0x00))
            .cancel_after_writes(3, cancel.clone());

        let mut executor = TransactionExecutor::new(&mut transport, TEST_ENDPOINTS);
        let mut out = renderer();
        run_raw(&mut executor, &context(&cancel, &[]), &mut out);

        let text = String::from_utf8(out.into_inner().0).unwrap();
        let samples = text.lines().filter(|l| l.contains(" | 00 00 00 80")).count();
        assert_eq!(samples, 3);
    }

    #[test]
    fn test_discover_mode_report() {
        let cancel = CancelToken::new();
        let mut transport = ScriptedTransport::new();
        transport
            .push_status_exchange(hw_status_reply(0x80, 0x00))
            .push_status_exchange(hw_status_reply(0x80, 0x01));
        let script = [
            DiscoveryAction::new("baseline", 0),
            DiscoveryAction::new("press", 0),
        ];

        let mut executor = TransactionExecutor::new(&mut transport, TEST_ENDPOINTS);
        let mut out = renderer();
        let mut operator = LineOperator::new(Cursor::new("\n\n"), Vec::new());
        let report = run_discover(
            &mut executor,
            &context(&cancel, &script),
            &mut out,
            &mut operator,
        )
        .unwrap();

        assert_eq!(report.entries.len(), 1);
        let text = String::from_utf8(out.into_inner().0).unwrap();
        assert!(text.contains("'press' vs baseline:"));

        let prompts = String::from_utf8(operator.prompt).unwrap();
        assert!(prompts.contains(">>> [1/2] baseline, then press Enter... "));
        assert!(prompts.contains(">>> [2/2] press, then press Enter... "));
    }

    #[test]
    fn test_operator_eof_ends_discovery() {
        let cancel = CancelToken::new();
        let mut transport = ScriptedTransport::new();
        let script = [DiscoveryAction::new("baseline", 0)];

        let mut executor = TransactionExecutor::new(&mut transport, TEST_ENDPOINTS);
        let mut operator = LineOperator::new(Cursor::new(""), Vec::new());
        let err = run_discover(
            &mut executor,
            &context(&cancel, &script),
            &mut renderer(),
            &mut operator,
        )
        .unwrap_err();
        assert!(matches!(err, SessionError::Io(_)));
        assert!(transport.writes().is_empty());
    }

    #[test]
    fn test_raw_mode_reports_lid_cycle() {
        let cancel = CancelToken::new();
        let mut before = ScriptedTransport::new();
        before.fail_next_write(TransportError::NoDevice);
        let mut after = ScriptedTransport::new();
        after
            .push_status_exchange(hw_status_reply(0x80, 0x00))
            .cancel_after_writes(1, cancel.clone());

        let mut pool = vec![&mut after, &mut before];
        let mut link = DeviceLink::new(move || pool.pop().ok_or("absent"), TEST_ENDPOINTS);
        link.connect().unwrap();

        let mut out = renderer();
        let summary = run_raw(&mut link, &context(&cancel, &[]), &mut out);
        assert_eq!(summary.reconnects, 1);

        let text = String::from_utf8(out.into_inner().0).unwrap();
        assert!(text.contains("Device left"));
        assert!(text.contains("Device arrived"));
        assert!(text.contains(" | 00 00 00 80"));
    }

    #[test]
    fn test_once_without_device_is_fatal() {
        let cancel = CancelToken::new();
        let mut link = DeviceLink::new(|| Err::<ScriptedTransport, _>("absent"), TEST_ENDPOINTS);
        let mut operator = LineOperator::new(Cursor::new(""), Vec::new());
        let err = run(
            Mode::Once,
            &mut link,
            &context(&cancel, &[]),
            &mut renderer(),
            &mut operator,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            SessionError::Transport(TransportError::NoDevice)
        ));
    }

    #[test]
    fn test_doctor_mode_passes_healthy_scanner() {
        let cancel = CancelToken::new();
        let mut transport = ScriptedTransport::new();
        transport
            .push_status_exchange(hw_status_reply(0x80, 0x00))
            .push_status_exchange(hw_status_reply(0x00, 0x00))
            .push_status_exchange(hw_status_reply(0x80, 0x00))
            .push_status_exchange(hw_status_reply(0x80, 0x01))
            .push_status_exchange(hw_status_reply(0x80, 0x00));

        let mut pool = vec![&mut transport];
        let mut link = DeviceLink::new(move || pool.pop().ok_or("absent"), TEST_ENDPOINTS);
        let mut out = renderer();
        let mut operator = LineOperator::new(Cursor::new("\n\n\n"), Vec::new());
        run(
            Mode::Doctor,
            &mut link,
            &context(&cancel, &[]),
            &mut out,
            &mut operator,
        )
        .unwrap();

        let text = String::from_utf8(out.into_inner().0).unwrap();
        assert!(text.contains("[1/6] USB connection"));
        assert!(text.contains("All 6 checks passed."));
        let prompts = String::from_utf8(operator.prompt).unwrap();
        assert!(prompts.contains("      Press Enter, then insert a sheet of paper: "));
    }

    #[test]
    fn test_doctor_mode_fails_on_timeout() {
        let cancel = CancelToken::new();
        let mut transport = ScriptedTransport::new();
        for _ in 0..5 {
            transport.push_status_exchange(hw_status_reply(0x80, 0x00));
        }

        let mut pool = vec![&mut transport];
        let mut link = DeviceLink::new(move || pool.pop().ok_or("absent"), TEST_ENDPOINTS);
        let mut out = renderer();
        let mut operator = LineOperator::new(Cursor::new("\n\n\n"), Vec::new());
        let err = run(
            Mode::Doctor,
            &mut link,
            &context(&cancel, &[]),
            &mut out,
            &mut operator,
        )
        .unwrap_err();

        // paper never arrives and the button never goes down
        assert!(matches!(
            err,
            SessionError::ChecksFailed {
                failed: 2,
                total: 6
            }
        ));
        let text = String::from_utf8(out.into_inner().0).unwrap();
        assert!(text.contains("4/6 passed, 2 failed."));
    }

    #[test]
    fn test_default_mode_is_monitor() {
        assert_eq!(Mode::default(), Mode::Monitor);
    }
}
