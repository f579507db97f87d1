//! Command envelope codec
//!
//! The S1500 does not speak USB mass storage. Every SCSI command descriptor
//! block (CDB) travels inside a fixed 31-byte vendor envelope:
//!
//! ```text
//! byte 0:      0x43  (command code)
//! bytes 1-18:  0x00  (padding)
//! bytes 19-30: CDB, zero padded (up to 12 bytes)
//! ```

use crate::error::{ProtocolError, Result};

/// Command code placed in byte 0 of every outbound envelope
pub const USB_COMMAND_CODE: u8 = 0x43;

/// Total envelope length in bytes
pub const ENVELOPE_LEN: usize = 31;

/// Offset of the CDB within the envelope
pub const CDB_OFFSET: usize = 19;

/// Largest CDB the envelope can carry
pub const MAX_CDB_LEN: usize = ENVELOPE_LEN - CDB_OFFSET;

/// First byte of a status-phase reply ('S')
pub const STATUS_MARKER: u8 = 0x53;

/// Length of a bare status-phase reply
pub const STATUS_REPLY_LEN: usize = 13;

/// SCSI opcode for GET HARDWARE STATUS
pub const GET_HW_STATUS_OPCODE: u8 = 0xC2;

/// Number of bytes requested by GET HARDWARE STATUS
pub const HW_STATUS_LEN: usize = 12;

/// GET HARDWARE STATUS CDB: opcode 0xC2, allocation length at bytes 7-8
pub const GET_HW_STATUS_CDB: [u8; 10] = [
    GET_HW_STATUS_OPCODE,
    0,
    0,
    0,
    0,
    0,
    0,
    0,
    HW_STATUS_LEN as u8,
    0,
];

/// TEST UNIT READY CDB: six zero bytes
pub const TEST_UNIT_READY_CDB: [u8; 6] = [0; 6];

/// Precomputed GET HARDWARE STATUS envelope
pub const GET_HW_STATUS: Envelope = Envelope::from_cdb(USB_COMMAND_CODE, &GET_HW_STATUS_CDB);

/// Precomputed TEST UNIT READY envelope
pub const TEST_UNIT_READY: Envelope = Envelope::from_cdb(USB_COMMAND_CODE, &TEST_UNIT_READY_CDB);

/// A 31-byte command envelope, ready to be written to the bulk OUT endpoint
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Envelope([u8; ENVELOPE_LEN]);

impl Envelope {
    /// Wrap a CDB in an envelope with the given command code
    ///
    /// Fails if the CDB is longer than [`MAX_CDB_LEN`].
    pub fn wrap(command_code: u8, cdb: &[u8]) -> Result<Self> {
        if cdb.len() > MAX_CDB_LEN {
            return Err(ProtocolError::CommandBlockTooLong {
                len: cdb.len(),
                max: MAX_CDB_LEN,
            });
        }
        Ok(Self::from_cdb(command_code, cdb))
    }

    /// Compile-time constructor used for the well-known commands
    ///
    /// Panics (at compile time when used in a `const`) if the CDB does not fit.
    pub const fn from_cdb(command_code: u8, cdb: &[u8]) -> Self {
        assert!(cdb.len() <= MAX_CDB_LEN, "CDB does not fit in envelope");

        let mut buf = [0u8; ENVELOPE_LEN];
        buf[0] = command_code;
        let mut i = 0;
        while i < cdb.len() {
            buf[CDB_OFFSET + i] = cdb[i];
            i += 1;
        }
        Self(buf)
    }

    /// Command code in byte 0
    pub fn command_code(&self) -> u8 {
        self.0[0]
    }

    /// The CDB region (always [`MAX_CDB_LEN`] bytes, zero padded)
    pub fn cdb(&self) -> &[u8] {
        &self.0[CDB_OFFSET..]
    }

    pub fn as_bytes(&self) -> &[u8; ENVELOPE_LEN] {
        &self.0
    }
}

impl AsRef<[u8]> for Envelope {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for Envelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Envelope({})", crate::hex_of(&self.0))
    }
}

/// Returns true if `reply` looks like a bare status-phase acknowledgement
pub fn is_status_reply(reply: &[u8]) -> bool {
    reply.len() == STATUS_REPLY_LEN && reply[0] == STATUS_MARKER
}
