//! BSB Protocol Communication
//!
//! Implements the telegram format and the half-duplex serial transport of the
//! BSB heating controller bus.

pub mod commands;
mod driver;
mod error;
pub mod serial;
mod stream;
mod telegram;

pub use commands::Command;
pub use driver::{BusDriver, DriverTiming};
pub use error::ProtocolError;
pub use serial::{byte_timeout, configure_port, open_port};
pub use stream::{BusChannel, SerialChannel};
pub use telegram::{address_label, crc16, swap_param, Telegram, TelegramBuilder, FLAG_NULL, FLAG_PRESENT};

/// Start-of-frame marker (after inversion)
pub const SOF: u8 = 0xDC;

/// Our own bus address, the "LAN" controller
pub const DEFAULT_SRC: u8 = 0x42;

/// The boiler
pub const DEFAULT_DST: u8 = 0x00;

/// Broadcast address
pub const BROADCAST: u8 = 0x7F;

/// Line speed
pub const BAUD_RATE: u32 = 4800;

/// Start, 8 data, parity and stop bit
pub const BITS_PER_BYTE: f64 = 11.0;

/// Header, parameter id and CRC of an empty telegram
pub const MIN_FRAME_LEN: usize = 11;

/// Largest payload the one-byte length field can describe
pub const MAX_PAYLOAD_LEN: usize = u8::MAX as usize - MIN_FRAME_LEN;
