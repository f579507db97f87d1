//! GET HARDWARE STATUS decoding
//!
//! The response is 12 bytes. Only a handful of bits are understood:
//!
//! ```text
//! byte 0-2:  reserved
//! byte 3:    ADF status  (bit 7: hopper empty, bit 6: ADF open, bit 5: paper end)
//! byte 4:    buttons     (bit 0: scan switch, bit 1: manual feed, bit 2: send switch)
//! byte 5:    consumables (roller/pad wear alerts)
//! byte 6:    error flags
//! byte 7-11: reserved / error codes
//! ```
//!
//! Only `hopper` and `scan_sw` are confirmed on hardware. Bit positions live in
//! [`STATUS_BITS`] so new findings from discovery sessions are a table edit.

use crate::envelope::HW_STATUS_LEN;
use crate::error::{ProtocolError, Result};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// Location and polarity of a single named status bit
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BitSpec {
    /// Short identifier (used in JSON output)
    pub name: Cow<'static, str>,
    /// Human-readable label (used in change records)
    pub label: Cow<'static, str>,
    /// Byte index within the status response
    pub byte: usize,
    /// Bit index within the byte (0 = LSB)
    pub bit: u8,
    /// Field is true when the bit is clear
    #[serde(default)]
    pub inverted: bool,
}

impl BitSpec {
    pub const fn new(
        name: &'static str,
        label: &'static str,
        byte: usize,
        bit: u8,
        inverted: bool,
    ) -> Self {
        Self {
            name: Cow::Borrowed(name),
            label: Cow::Borrowed(label),
            byte,
            bit,
            inverted,
        }
    }

    /// Check that the bit lies inside the status response
    pub fn validate(&self) -> Result<()> {
        if self.byte >= HW_STATUS_LEN || self.bit > 7 {
            return Err(ProtocolError::InvalidBitSpec {
                name: self.name.to_string(),
                byte: self.byte,
                bit: self.bit,
                max_byte: HW_STATUS_LEN,
            });
        }
        Ok(())
    }

    pub fn mask(&self) -> u8 {
        1u8 << (self.bit & 0x07)
    }

    /// Evaluate against a raw response; missing bytes read as zero
    pub fn evaluate(&self, raw: &[u8]) -> bool {
        let byte = raw.get(self.byte).copied().unwrap_or(0);
        (byte & self.mask() != 0) != self.inverted
    }
}

/// Built-in named status fields, in report order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusField {
    Hopper,
    AdfOpen,
    PaperEnd,
    ScanSwitch,
    ManualFeed,
    SendSwitch,
}

impl StatusField {
    pub const ALL: [StatusField; 6] = [
        StatusField::Hopper,
        StatusField::AdfOpen,
        StatusField::PaperEnd,
        StatusField::ScanSwitch,
        StatusField::ManualFeed,
        StatusField::SendSwitch,
    ];

    pub fn spec(self) -> &'static BitSpec {
        &STATUS_BITS[self as usize]
    }
}

/// Bit table for the built-in fields, indexed by [`StatusField`]
pub static STATUS_BITS: [BitSpec; 6] = [
    BitSpec::new("hopper", "paper in feeder", 3, 7, true),
    BitSpec::new("adf_open", "ADF door open", 3, 6, false),
    BitSpec::new("paper_end", "paper path end", 3, 5, false),
    BitSpec::new("scan_sw", "scan button", 4, 0, false),
    BitSpec::new("manual_feed", "manual feed", 4, 1, false),
    BitSpec::new("send_sw", "send button", 4, 2, false),
];

/// Byte indices kept verbatim for bits nobody has named yet
pub const ADF_BYTE: usize = 3;
pub const BUTTON_BYTE: usize = 4;
pub const CONSUMABLE_BYTE: usize = 5;
pub const ERROR_BYTE: usize = 6;

/// Decoded GET HARDWARE STATUS response
///
/// Immutable once decoded. Every named field is derived from `raw`, so two
/// snapshots with the same `raw` are always equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct HwStatus {
    #[serde(serialize_with = "serialize_hex")]
    raw: Vec<u8>,

    hopper: bool,
    adf_open: bool,
    paper_end: bool,
    scan_sw: bool,
    manual_feed: bool,
    send_sw: bool,

    adf_byte: u8,
    button_byte: u8,
    consumable_byte: u8,
    error_byte: u8,
}

impl HwStatus {
    /// Decode a response buffer
    ///
    /// Never fails. Responses longer than 12 bytes are truncated; shorter ones
    /// are kept as-is and their missing bytes read as zero.
    pub fn decode(response: &[u8]) -> Self {
        let raw = response[..response.len().min(HW_STATUS_LEN)].to_vec();
        let bit = |field: StatusField| field.spec().evaluate(&raw);
        let byte = |index: usize| raw.get(index).copied().unwrap_or(0);

        Self {
            hopper: bit(StatusField::Hopper),
            adf_open: bit(StatusField::AdfOpen),
            paper_end: bit(StatusField::PaperEnd),
            scan_sw: bit(StatusField::ScanSwitch),
            manual_feed: bit(StatusField::ManualFeed),
            send_sw: bit(StatusField::SendSwitch),
            adf_byte: byte(ADF_BYTE),
            button_byte: byte(BUTTON_BYTE),
            consumable_byte: byte(CONSUMABLE_BYTE),
            error_byte: byte(ERROR_BYTE),
            raw,
        }
    }

    /// Raw response bytes (at most 12)
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// Byte at `index`, zero if the response was shorter
    pub fn byte(&self, index: usize) -> u8 {
        self.raw.get(index).copied().unwrap_or(0)
    }

    pub fn get(&self, field: StatusField) -> bool {
        match field {
            StatusField::Hopper => self.hopper,
            StatusField::AdfOpen => self.adf_open,
            StatusField::PaperEnd => self.paper_end,
            StatusField::ScanSwitch => self.scan_sw,
            StatusField::ManualFeed => self.manual_feed,
            StatusField::SendSwitch => self.send_sw,
        }
    }

    /// Evaluate an arbitrary bit spec against this snapshot
    pub fn evaluate(&self, spec: &BitSpec) -> bool {
        spec.evaluate(&self.raw)
    }

    /// Paper present in the hopper
    pub fn hopper(&self) -> bool {
        self.hopper
    }

    pub fn adf_open(&self) -> bool {
        self.adf_open
    }

    pub fn paper_end(&self) -> bool {
        self.paper_end
    }

    /// Scan button pressed
    pub fn scan_sw(&self) -> bool {
        self.scan_sw
    }

    pub fn manual_feed(&self) -> bool {
        self.manual_feed
    }

    pub fn send_sw(&self) -> bool {
        self.send_sw
    }

    pub fn adf_byte(&self) -> u8 {
        self.adf_byte
    }

    pub fn button_byte(&self) -> u8 {
        self.button_byte
    }

    pub fn consumable_byte(&self) -> u8 {
        self.consumable_byte
    }

    pub fn error_byte(&self) -> u8 {
        self.error_byte
    }
}

fn serialize_hex<S: serde::Serializer>(raw: &[u8], s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_str(&crate::hex_of(raw))
}
