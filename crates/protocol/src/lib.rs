//! Protocol library for the ScanSnap S1500 explorer
//!
//! This crate holds the transport-independent half of the scanner protocol:
//! the 31-byte command envelope, decoding of the GET HARDWARE STATUS reply into
//! an immutable [`HwStatus`] snapshot, and change detection between snapshots.
//!
//! # Example
//!
//! ```
//! use protocol::{GET_HW_STATUS, HwStatus, diff};
//!
//! assert_eq!(GET_HW_STATUS.as_bytes().len(), 31);
//!
//! let mut reply = [0u8; 12];
//! reply[4] = 0x01;
//! let pressed = HwStatus::decode(&reply);
//! assert!(pressed.hopper());
//! assert!(pressed.scan_sw());
//!
//! reply[4] = 0x00;
//! let released = HwStatus::decode(&reply);
//!
//! let changes = diff(&pressed, &released);
//! assert_eq!(changes.lines()[0], "scan button: True → False");
//! ```

pub mod change;
pub mod envelope;
pub mod error;
pub mod status;

pub use change::{Change, ChangeRecord, diff};
pub use envelope::{
    CDB_OFFSET, ENVELOPE_LEN, Envelope, GET_HW_STATUS, HW_STATUS_LEN, MAX_CDB_LEN,
    STATUS_MARKER, STATUS_REPLY_LEN, TEST_UNIT_READY, USB_COMMAND_CODE, is_status_reply,
};
pub use error::{ProtocolError, Result};
pub use status::{BitSpec, HwStatus, STATUS_BITS, StatusField};

/// Decode a GET HARDWARE STATUS response
pub fn decode(response: &[u8]) -> HwStatus {
    HwStatus::decode(response)
}

/// Space-separated lowercase hex, e.g. `"00 80 0c"`
pub fn hex_of(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Eight-digit binary, MSB first
pub fn bits_of(byte: u8) -> String {
    format!("{:08b}", byte)
}

/// Boolean rendering used in change records
pub fn bool_label(value: bool) -> &'static str {
    if value { "True" } else { "False" }
}
