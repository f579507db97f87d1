//! ScanSnap S1500 hardware-status explorer
//!
//! Drives the scanner's GET HARDWARE STATUS command over its bulk endpoints
//! and reports sensor state: one-shot dumps, raw readouts, change monitoring
//! and operator-guided discovery of undocumented bits.
//!
//! The [`session`] layer is generic over [`common::BulkTransport`]; [`usb`]
//! provides the rusb-backed implementation.

pub mod config;
pub mod modes;
pub mod output;
pub mod session;
pub mod usb;
