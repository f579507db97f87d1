//! Integration tests for configuration parsing
//!
//! Covers a complete explorer.toml, the `--save-config` round trip through the
//! file system, and rejection of invalid files.

use explorer::config::ExplorerConfig;
use explorer::session::{Timing, TransactionTimeouts};
use protocol::HwStatus;
use std::time::Duration;
use tempfile::TempDir;

const FULL_CONFIG: &str = r#"
[explorer]
log_level = "debug"

[timing]
poll_interval_ms = 50
error_backoff_ms = 2000
data_timeout_ms = 1500
status_timeout_ms = 300
discovery_lead_in_ms = 250
reconnect_interval_ms = 500
doctor_timeout_ms = 30000

[[discovery.actions]]
label = "baseline"
settle_secs = 1

[[discovery.actions]]
label = "PRESS and HOLD the scan button for two seconds"
settle_secs = 3

[[bits]]
name = "scan_held"
label = "scan button held"
byte = 4
bit = 5
"#;

#[test]
fn test_full_config() {
    let config = ExplorerConfig::parse(FULL_CONFIG).unwrap();

    assert_eq!(config.explorer.log_level, "debug");
    assert_eq!(config.discovery.actions.len(), 2);
    assert_eq!(config.discovery.actions[1].settle_secs, 3);

    let timing: Timing = config.timing();
    assert_eq!(timing.poll_interval, Duration::from_millis(50));
    assert_eq!(timing.error_backoff, Duration::from_secs(2));
    assert_eq!(timing.discovery_lead_in, Duration::from_millis(250));
    assert_eq!(timing.discovery_sample_interval, Duration::from_millis(100));
    assert_eq!(timing.reconnect_interval, Duration::from_millis(500));
    assert_eq!(timing.doctor_timeout, Duration::from_secs(30));

    assert_eq!(
        config.timeouts(),
        TransactionTimeouts {
            data: Duration::from_millis(1500),
            status: Duration::from_millis(300),
        }
    );
}

#[test]
fn test_configured_bit_evaluates() {
    let config = ExplorerConfig::parse(FULL_CONFIG).unwrap();
    let held = &config.bits[0];
    assert!(!held.inverted);

    let mut reply = [0u8; 12];
    reply[4] = 0x21;
    let status = HwStatus::decode(&reply);
    assert!(status.evaluate(held));
    assert!(status.scan_sw());
}

#[test]
fn test_empty_file_is_all_defaults() {
    let config = ExplorerConfig::parse("").unwrap();
    assert_eq!(config, ExplorerConfig::default());
}

#[test]
fn test_saved_defaults_reload() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("explorer.toml");

    ExplorerConfig::default().save(&path).unwrap();
    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.contains("poll_interval_ms = 100"));
    assert!(text.contains("RELEASE the scan button"));

    let loaded = ExplorerConfig::load(Some(&path)).unwrap();
    assert_eq!(loaded, ExplorerConfig::default());
}

#[test]
fn test_malformed_file_reports_path() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.toml");
    std::fs::write(&path, "[timing\npoll_interval_ms = ").unwrap();

    let err = ExplorerConfig::load(Some(&path)).unwrap_err();
    assert!(format!("{:#}", err).contains("broken.toml"));
}

#[test]
fn test_invalid_bit_position() {
    let result = ExplorerConfig::parse(
        r#"
[[bits]]
name = "nine"
label = "bit nine"
byte = 3
bit = 9
"#,
    );
    assert!(result.is_err());
}
