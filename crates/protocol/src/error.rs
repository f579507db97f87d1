//! Protocol error types

use thiserror::Error;

/// Protocol-level errors
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// CDB does not fit in the command envelope
    #[error("Command block too long: {len} bytes (max: {max})")]
    CommandBlockTooLong { len: usize, max: usize },

    /// Bit specification points outside the status response
    #[error("Invalid bit spec '{name}': byte {byte} bit {bit} (byte must be < {max_byte}, bit < 8)")]
    InvalidBitSpec {
        name: String,
        byte: usize,
        bit: u8,
        max_byte: usize,
    },
}

/// Type alias for protocol results
pub type Result<T> = std::result::Result<T, ProtocolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ProtocolError::CommandBlockTooLong { len: 16, max: 12 };
        let msg = format!("{}", err);
        assert!(msg.contains("Command block too long"));
        assert!(msg.contains("16"));
        assert!(msg.contains("12"));
    }

    #[test]
    fn test_invalid_bit_spec_error() {
        let err = ProtocolError::InvalidBitSpec {
            name: "held".to_string(),
            byte: 12,
            bit: 9,
            max_byte: 12,
        };
        let msg = format!("{}", err);
        assert!(msg.contains("held"));
        assert!(msg.contains("byte 12 bit 9"));
    }
}
