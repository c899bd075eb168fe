//! Protocol errors

use thiserror::Error;

/// Errors that can occur on the bus transport
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Opening or configuring the port failed
    #[error("Serial port error: {0}")]
    SerialError(String),

    /// Checksum does not match the frame
    #[error("CRC mismatch: expected {expected:#06x}, got {actual:#06x}")]
    CrcMismatch {
        /// Checksum computed over the frame
        expected: u16,
        /// Checksum carried by the frame
        actual: u16,
    },

    /// Frame shorter than the minimum
    #[error("Telegram truncated: {0} bytes")]
    Truncated(usize),

    /// Command byte is not a known command
    #[error("Unknown command 0x{0:02x}")]
    UnknownCommand(u8),

    /// Length byte disagrees with the frame
    #[error("Invalid declared length {0}")]
    InvalidLength(u8),

    /// Payload exceeds what the length byte can describe
    #[error("Payload of {0} bytes does not fit a telegram")]
    PayloadTooLong(usize),

    /// No attempt came back from the bus unmodified
    #[error("Sent telegram not echoed back after {attempts} attempts")]
    EchoTimeout {
        /// Writes made
        attempts: u32,
    },

    /// Transport failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
