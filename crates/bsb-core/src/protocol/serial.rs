//! Serial port handling
//!
//! Opens the BSB adapter line: 4800 baud, 8 data bits, odd parity, one stop bit.

use serialport::SerialPort;
use std::time::Duration;

use super::{ProtocolError, BAUD_RATE, BITS_PER_BYTE};

/// Per-byte read timeout: ten character times
pub fn byte_timeout() -> Duration {
    Duration::from_secs_f64(BITS_PER_BYTE / BAUD_RATE as f64 * 10.0)
}

/// Open a serial port configured for the bus
pub fn open_port(name: &str) -> Result<Box<dyn SerialPort>, ProtocolError> {
    let mut port = serialport::new(name, BAUD_RATE)
        .timeout(byte_timeout())
        .open()
        .map_err(|e| ProtocolError::SerialError(e.to_string()))?;
    configure_port(port.as_mut())?;
    Ok(port)
}

/// Configure a serial port for the bus line settings
pub fn configure_port(port: &mut dyn SerialPort) -> Result<(), ProtocolError> {
    port.set_data_bits(serialport::DataBits::Eight)
        .map_err(|e| ProtocolError::SerialError(e.to_string()))?;
    port.set_parity(serialport::Parity::Odd)
        .map_err(|e| ProtocolError::SerialError(e.to_string()))?;
    port.set_stop_bits(serialport::StopBits::One)
        .map_err(|e| ProtocolError::SerialError(e.to_string()))?;
    port.set_flow_control(serialport::FlowControl::None)
        .map_err(|e| ProtocolError::SerialError(e.to_string()))?;
    Ok(())
}
