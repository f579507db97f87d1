//! s1500-explore
//!
//! Interactive diagnostic client for the ScanSnap S1500 status protocol.

use anyhow::{Context, Result};
use clap::Parser;
use common::{CancelToken, setup_logging};
use explorer::config::{ExplorerConfig, validate_log_level};
use explorer::modes::{self, LineOperator, Mode, ModeContext};
use explorer::output::{Format, Renderer};
use explorer::session::{DeviceLink, Operator, SessionError};
use explorer::usb::{DeviceSlot, S1500_ENDPOINTS};
use std::path::PathBuf;
use tracing::{info, warn};

/// Exit status after a second Ctrl-C (128 + SIGINT)
const FORCED_EXIT_CODE: i32 = 130;

#[derive(Parser, Debug)]
#[command(name = "s1500-explore")]
#[command(
    author,
    version,
    about = "ScanSnap S1500 hardware status explorer"
)]
#[command(long_about = "
Sends GET HARDWARE STATUS to a ScanSnap S1500 over its vendor bulk endpoints
and decodes the 12-byte reply into sensor state.

EXAMPLES:
    # Print only state changes (default)
    sudo s1500-explore

    # Single read with a full hex dump
    sudo s1500-explore --once

    # One raw line per poll
    sudo s1500-explore --raw

    # Guided discovery of which bits each physical action flips
    sudo s1500-explore --discover

    # Interactive hardware check: connection, paper sensor, scan button
    sudo s1500-explore --doctor

    # Machine-readable output
    sudo s1500-explore --monitor --json

CONFIGURATION:
    The explorer looks for configuration files in the following order:
    1. Path specified with --config
    2. ~/.config/s1500-explore/explorer.toml
    3. /etc/s1500-explore/explorer.toml
    4. Built-in defaults

Stop any other scanner daemon first; the explorer resets and claims the device.
Closing the ADF lid drops the scanner off the bus; --raw and --monitor wait for
it and carry on once the lid is opened again. Timestamps are local time.
Ctrl-C stops after the current transaction; a second Ctrl-C releases the
scanner and exits immediately.
")]
struct Args {
    #[command(flatten)]
    mode: ModeArgs,

    /// Path to configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Save default configuration to default location and exit
    #[arg(long)]
    save_config: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Emit one JSON object per event instead of the text report
    #[arg(long)]
    json: bool,
}

#[derive(clap::Args, Debug, Default)]
#[group(multiple = false)]
struct ModeArgs {
    /// Single read with full diagnostic dump
    #[arg(long)]
    once: bool,

    /// Continuous raw hex output, one line per poll
    #[arg(long)]
    raw: bool,

    /// Print only state changes (default)
    #[arg(long)]
    monitor: bool,

    /// Guided bit discovery
    #[arg(long)]
    discover: bool,

    /// Interactive hardware check
    #[arg(long)]
    doctor: bool,
}

impl ModeArgs {
    fn selected(&self) -> Mode {
        if self.once {
            Mode::Once
        } else if self.raw {
            Mode::Raw
        } else if self.discover {
            Mode::Discover
        } else if self.doctor {
            Mode::Doctor
        } else {
            Mode::Monitor
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    if args.save_config {
        let config = ExplorerConfig::default();
        let path = args.config.clone().unwrap_or_else(ExplorerConfig::default_path);
        config.save(&path).context("Failed to save configuration")?;
        println!("Configuration saved to: {}", path.display());
        return Ok(());
    }

    let config = ExplorerConfig::load_or_default(args.config.as_deref())
        .context("Failed to load configuration")?;

    let log_level = args
        .log_level
        .as_deref()
        .unwrap_or(&config.explorer.log_level);
    validate_log_level(log_level)?;
    setup_logging(log_level).context("Failed to setup logging")?;

    info!("s1500-explore v{}", env!("CARGO_PKG_VERSION"));

    let cancel = CancelToken::new();
    let slot = DeviceSlot::new();
    {
        let cancel = cancel.clone();
        let slot = slot.clone();
        ctrlc::set_handler(move || {
            if cancel.cancel() {
                // blocked on operator input; nothing else will notice the flag
                slot.release();
                std::process::exit(FORCED_EXIT_CODE);
            }
            info!("Interrupt received, stopping after the current transaction");
        })
        .context("Failed to install Ctrl-C handler")?;
    }

    let mode = args.mode.selected();
    let format = if args.json { Format::Json } else { Format::Text };
    let mut renderer = Renderer::stdio(format).with_extra_bits(&config.bits);

    renderer.banner()?;
    let mut link = DeviceLink::new(
        {
            let slot = slot.clone();
            move || slot.open()
        },
        S1500_ENDPOINTS,
    )
    .with_timeouts(config.timeouts());

    // the doctor reports its own connection check
    if mode != Mode::Doctor {
        link.connect().context("Failed to open scanner")?;
        renderer.connected()?;
    }

    let ctx = ModeContext {
        timing: config.timing(),
        extra_bits: &config.bits,
        script: &config.discovery.actions,
        cancel: &cancel,
    };

    let mut operator: Box<dyn Operator> = match format {
        Format::Text => Box::new(LineOperator::stdin()),
        Format::Json => Box::new(LineOperator::stdin_quiet()),
    };

    let result = modes::run(mode, &mut link, &ctx, &mut renderer, operator.as_mut());

    // releases the interface and reattaches the kernel driver
    drop(link);
    slot.release();

    match result {
        Ok(()) => Ok(()),
        Err(SessionError::Cancelled) => {
            warn!("Session cancelled");
            Ok(())
        }
        Err(e) => Err(e).context(format!("{:?} mode failed", mode)),
    }
}
