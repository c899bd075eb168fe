//! Protocol commands
//!
//! Defines the command codes carried in byte 4 of every BSB telegram.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::ProtocolError;

/// Telegram command codes (5-bit wire values)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Command {
    /// Internal query
    QIN = 0x01,
    /// Unsolicited information
    INF = 0x02,
    /// Write request
    SET = 0x03,
    /// Write acknowledged
    ACK = 0x04,
    /// Write rejected
    NAK = 0x05,
    /// Query
    QUR = 0x06,
    /// Answer to a query
    ANS = 0x07,
    /// Error reply
    ERR = 0x08,
    /// Query reset value
    QRV = 0x0F,
    /// Answer reset value
    ARV = 0x10,
    /// Query reset
    QRE = 0x11,
    /// Internal query 1
    IQ1 = 0x12,
    /// Internal answer 1
    IA1 = 0x13,
    /// Internal query 2
    IQ2 = 0x14,
    /// Internal answer 2
    IA2 = 0x15,
}

impl Command {
    /// All commands in wire order
    pub const ALL: [Command; 15] = [
        Command::QIN,
        Command::INF,
        Command::SET,
        Command::ACK,
        Command::NAK,
        Command::QUR,
        Command::ANS,
        Command::ERR,
        Command::QRV,
        Command::ARV,
        Command::QRE,
        Command::IQ1,
        Command::IA1,
        Command::IQ2,
        Command::IA2,
    ];

    /// Wire byte
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Short mnemonic used in logs
    pub fn name(self) -> &'static str {
        match self {
            Command::QIN => "QIN",
            Command::INF => "INF",
            Command::SET => "SET",
            Command::ACK => "ACK",
            Command::NAK => "NAK",
            Command::QUR => "QUR",
            Command::ANS => "ANS",
            Command::ERR => "ERR",
            Command::QRV => "QRV",
            Command::ARV => "ARV",
            Command::QRE => "QRE",
            Command::IQ1 => "IQ1",
            Command::IA1 => "IA1",
            Command::IQ2 => "IQ2",
            Command::IA2 => "IA2",
        }
    }

    /// Whether the parameter id travels in swapped form
    pub fn swaps_param(self) -> bool {
        matches!(self, Command::QUR | Command::SET)
    }

    /// Whether the payload always starts with a flag byte
    pub fn has_leading_flag(self) -> bool {
        matches!(self, Command::NAK | Command::ERR)
    }
}

impl TryFrom<u8> for Command {
    type Error = ProtocolError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        Command::ALL
            .iter()
            .copied()
            .find(|cmd| cmd.code() == byte)
            .ok_or(ProtocolError::UnknownCommand(byte))
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_codes() {
        assert_eq!(Command::QUR.code(), 0x06);
        assert_eq!(Command::IA2.code(), 0x15);
        for cmd in Command::ALL {
            assert_eq!(Command::try_from(cmd.code()).unwrap(), cmd);
        }
    }

    #[test]
    fn test_unknown_command() {
        assert!(matches!(
            Command::try_from(0x09),
            Err(ProtocolError::UnknownCommand(0x09))
        ));
        assert!(Command::try_from(0x00).is_err());
    }

    #[test]
    fn test_param_swap_commands() {
        assert!(Command::QUR.swaps_param());
        assert!(Command::SET.swaps_param());
        assert!(!Command::ANS.swaps_param());
        assert!(!Command::INF.swaps_param());
    }
}
