//! Telegram encoding/decoding
//!
//! Frame format (all bytes XOR 0xFF on the wire):
//! - 1 byte: SOF (0xDC)
//! - 1 byte: source address | 0x80
//! - 1 byte: destination address
//! - 1 byte: total length including CRC
//! - 1 byte: command
//! - 4 bytes: parameter id (big-endian, swapped for QUR/SET)
//! - N bytes: payload, optionally with a leading or trailing flag byte
//! - 2 bytes: CRC-16/XMODEM of everything before it (big-endian)

use std::fmt;
use std::sync::Arc;

use byteorder::{BigEndian, ByteOrder};
use chrono::{DateTime, Local};
use tracing::warn;

use super::{Command, ProtocolError, BROADCAST, DEFAULT_DST, DEFAULT_SRC, MAX_PAYLOAD_LEN, MIN_FRAME_LEN, SOF};
use crate::fields::{FieldError, FieldType, Value};
use crate::messages::{Flags, Message, MessageRegistry};

/// Flag byte value for a present value
pub const FLAG_PRESENT: u8 = 0x00;
/// Flag byte value for a null value
pub const FLAG_NULL: u8 = 0x01;

/// CRC-16, polynomial 0x1021, initial value 0, MSB first
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0;
    for &byte in data {
        crc ^= (byte as u16) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ 0x1021
            } else {
                crc << 1
            };
        }
    }
    crc
}

/// Exchange byte 0 with byte 1 of a parameter id
///
/// QUR and SET carry the id in this form; the transform is its own inverse.
pub fn swap_param(param: u32) -> u32 {
    ((param & 0x00FF_0000) << 8) | ((param & 0xFF00_0000) >> 8) | (param & 0x0000_FFFF)
}

/// Symbolic name of a bus address
pub fn address_label(addr: u8) -> String {
    match addr {
        0x00 => "K".to_string(),
        0x06 => "T".to_string(),
        0x07 => "U".to_string(),
        0x08 => "V".to_string(),
        0x7F => "B".to_string(),
        0x42 => "L".to_string(),
        other => format!("{:02X}", other),
    }
}

/// One decoded or outbound BSB telegram
#[derive(Debug, Clone)]
pub struct Telegram {
    timestamp: DateTime<Local>,
    message: Arc<Message>,
    param: u32,
    command: Command,
    src: u8,
    dst: u8,
    raw_payload: Vec<u8>,
    flag_byte: Option<u8>,
    data: Vec<u8>,
    value: Option<Value>,
}

impl Telegram {
    /// Decode an un-inverted frame
    ///
    /// No command or address coercion is applied; the telegram reproduces
    /// `raw` exactly through [`Telegram::to_raw`].
    pub fn from_raw(raw: &[u8], registry: &MessageRegistry) -> Result<Self, ProtocolError> {
        if raw.len() < MIN_FRAME_LEN {
            return Err(ProtocolError::Truncated(raw.len()));
        }

        let body_len = raw.len() - 2;
        let expected = crc16(&raw[..body_len]);
        let actual = BigEndian::read_u16(&raw[body_len..]);
        if expected != actual {
            return Err(ProtocolError::CrcMismatch { expected, actual });
        }

        if raw[3] as usize != raw.len() {
            return Err(ProtocolError::InvalidLength(raw[3]));
        }

        let command = Command::try_from(raw[4])?;
        let wire_param = BigEndian::read_u32(&raw[5..9]);
        let param = if command.swaps_param() {
            swap_param(wire_param)
        } else {
            wire_param
        };

        let mut telegram = Self {
            timestamp: Local::now(),
            message: registry.lookup(param),
            param,
            command,
            src: raw[1] & 0x7F,
            dst: raw[2],
            raw_payload: raw[9..body_len].to_vec(),
            flag_byte: None,
            data: Vec::new(),
            value: None,
        };
        telegram.split_payload();
        telegram.bind_value();
        Ok(telegram)
    }

    /// Serialize to the un-inverted frame
    pub fn to_raw(&self) -> Vec<u8> {
        let param = if self.command.swaps_param() {
            swap_param(self.param)
        } else {
            self.param
        };

        let mut raw = Vec::with_capacity(MIN_FRAME_LEN + self.raw_payload.len());
        raw.extend_from_slice(&[SOF, self.src | 0x80, self.dst, 0, self.command.code()]);
        let mut param_bytes = [0u8; 4];
        BigEndian::write_u32(&mut param_bytes, param);
        raw.extend_from_slice(&param_bytes);
        raw.extend_from_slice(&self.raw_payload);
        raw[3] = (raw.len() + 2) as u8;

        let mut crc_bytes = [0u8; 2];
        BigEndian::write_u16(&mut crc_bytes, crc16(&raw));
        raw.extend_from_slice(&crc_bytes);
        raw
    }

    /// Serialize to the bytes written to the line
    pub fn to_wire(&self) -> Vec<u8> {
        self.to_raw().iter().map(|b| b ^ 0xFF).collect()
    }

    /// Encode a value into the payload
    ///
    /// `None` requests the null representation. On failure the telegram is
    /// left unchanged.
    pub fn set_value(&mut self, value: Option<Value>) -> Result<(), FieldError> {
        let field_type = self.message.field_type.ok_or(FieldError::NoFieldType)?;
        let data = field_type.encode(value.as_ref())?;

        let flags = self.message.flags;
        let flag_byte = if flags.contains(Flags::FB) {
            Some(if value.is_some() { FLAG_PRESENT } else { FLAG_NULL })
        } else if flags.contains(Flags::LB) {
            // LB fields have no null marker
            Some(FLAG_PRESENT)
        } else {
            None
        };

        let mut raw_payload = Vec::with_capacity(data.len() + 1);
        if flags.contains(Flags::FB) {
            raw_payload.extend(flag_byte);
        }
        raw_payload.extend_from_slice(&data);
        if flags.contains(Flags::LB) {
            raw_payload.extend(flag_byte);
        }

        self.data = data;
        self.flag_byte = flag_byte;
        self.raw_payload = raw_payload;
        self.bind_value();
        Ok(())
    }

    fn split_payload(&mut self) {
        let payload = &self.raw_payload;
        let flags = self.message.flags;
        let (flag_byte, data) = match payload.split_first() {
            None => (None, Vec::new()),
            Some((&flag, rest)) if self.command.has_leading_flag() || flags.contains(Flags::FB) => {
                (Some(flag), rest.to_vec())
            }
            Some(_) if flags.contains(Flags::LB) && self.command == Command::INF => {
                let last = payload.len() - 1;
                (Some(payload[last]), payload[..last].to_vec())
            }
            Some(_) => (None, payload.clone()),
        };
        self.flag_byte = flag_byte;
        self.data = data;
    }

    fn bind_value(&mut self) {
        self.value = None;
        let Some(field_type) = self.message.field_type else {
            return;
        };
        if self.data.is_empty() {
            return;
        }

        match field_type.decode(&self.data) {
            Ok(value) => {
                let nullable = self.message.flags.contains(Flags::FB)
                    && matches!(self.command, Command::ANS | Command::SET);
                if nullable && self.command == Command::ANS && self.flag_byte == Some(FLAG_NULL) {
                    return;
                }
                self.value = Some(value);
            }
            Err(e) => {
                warn!(
                    "Failed to decode {} (0x{:08x}) as {:?}: {}, payload {:02x?}",
                    self.message.name, self.param, field_type, e, self.raw_payload
                );
            }
        }
    }

    /// Local time the telegram was received or built
    pub fn timestamp(&self) -> DateTime<Local> {
        self.timestamp
    }

    /// Message definition for the parameter
    pub fn message(&self) -> &Arc<Message> {
        &self.message
    }

    /// Stable message name
    pub fn name(&self) -> &str {
        &self.message.name
    }

    /// Canonical (unswapped) parameter id
    pub fn param(&self) -> u32 {
        self.param
    }

    /// Command code
    pub fn command(&self) -> Command {
        self.command
    }

    /// Source address, without the 0x80 marker
    pub fn src(&self) -> u8 {
        self.src
    }

    /// Destination address
    pub fn dst(&self) -> u8 {
        self.dst
    }

    /// Field type of the parameter, if known
    pub fn field_type(&self) -> Option<FieldType> {
        self.message.field_type
    }

    /// Payload including any flag byte
    pub fn raw_payload(&self) -> &[u8] {
        &self.raw_payload
    }

    /// Flag byte of FB/LB messages
    pub fn flag_byte(&self) -> Option<u8> {
        self.flag_byte
    }

    /// Payload without flag bytes
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Decoded value, `None` when null, undecodable or untyped
    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }
}

impl fmt::Display for Telegram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = self.value.as_ref().map(Value::to_string).unwrap_or_default();
        let hex: Vec<String> = self.data.iter().map(|b| format!("{:02x}", b)).collect();
        let hex = hex.join(" ");
        let flags = self.message.flags;

        let data = match self.flag_byte {
            Some(flag) if flags.contains(Flags::FB) => format!("|{:02x}|{}|", flag, hex),
            Some(flag) if flags.contains(Flags::LB) => format!("   |{}|{:02x}", hex, flag),
            _ if !hex.is_empty() => format!("   |{}|", hex),
            _ => String::new(),
        };

        write!(
            f,
            "{} {:<2}=>{:>2} {} 0x{:08x} {:<25.25} {:<20} {}",
            self.timestamp.format("%d.%m. %H:%M:%S"),
            address_label(self.src),
            address_label(self.dst),
            self.command,
            self.param,
            self.message.name,
            value,
            data
        )
    }
}

/// Builder for outbound telegrams
///
/// Applies the message's directional coercions on [`TelegramBuilder::build`]:
/// `BC` forces the broadcast destination, `IF` turns SET into INF and `QI`
/// turns QUR into QIN.
pub struct TelegramBuilder {
    message: Arc<Message>,
    command: Command,
    src: u8,
    dst: u8,
    payload: Vec<u8>,
}

impl TelegramBuilder {
    /// Start a QUR from the local controller to the boiler
    pub fn new(message: Arc<Message>) -> Self {
        Self {
            message,
            command: Command::QUR,
            src: DEFAULT_SRC,
            dst: DEFAULT_DST,
            payload: Vec::new(),
        }
    }

    /// Set the requested command
    pub fn command(mut self, command: Command) -> Self {
        self.command = command;
        self
    }

    /// Set the source address
    pub fn src(mut self, src: u8) -> Self {
        self.src = src;
        self
    }

    /// Set the destination address
    pub fn dst(mut self, dst: u8) -> Self {
        self.dst = dst;
        self
    }

    /// Set a raw payload (flag bytes included)
    pub fn payload(mut self, payload: &[u8]) -> Self {
        self.payload = payload.to_vec();
        self
    }

    /// Build the telegram
    ///
    /// Fails when the payload does not fit the one-byte length field.
    pub fn build(self) -> Result<Telegram, ProtocolError> {
        if self.payload.len() > MAX_PAYLOAD_LEN {
            return Err(ProtocolError::PayloadTooLong(self.payload.len()));
        }
        let flags = self.message.flags;

        let dst = if flags.contains(Flags::BC) {
            BROADCAST
        } else {
            self.dst
        };
        let command = match self.command {
            Command::SET if flags.contains(Flags::IF) => Command::INF,
            Command::QUR if flags.contains(Flags::QI) => Command::QIN,
            other => other,
        };

        let mut telegram = Telegram {
            timestamp: Local::now(),
            param: self.message.param,
            message: self.message,
            command,
            src: self.src & 0x7F,
            dst,
            raw_payload: self.payload,
            flag_byte: None,
            data: Vec::new(),
            value: None,
        };
        telegram.split_payload();
        telegram.bind_value();
        Ok(telegram)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> MessageRegistry {
        MessageRegistry::builtin()
    }

    #[test]
    fn test_crc_vector() {
        assert_eq!(crc16(b"123456789"), 0x31C3);
        assert_eq!(crc16(&[]), 0);
    }

    #[test]
    fn test_swap_param() {
        assert_eq!(swap_param(0x0d3d0519), 0x3d0d0519);
        assert_eq!(swap_param(swap_param(0x2d3d0574)), 0x2d3d0574);
    }

    #[test]
    fn test_address_labels() {
        assert_eq!(address_label(0x00), "K");
        assert_eq!(address_label(0x7F), "B");
        assert_eq!(address_label(0x42), "L");
        assert_eq!(address_label(0x0A), "0A");
    }

    #[test]
    fn test_qur_frame_layout() {
        let registry = registry();
        let msg = registry.by_name("boiler_temp").unwrap();
        let raw = TelegramBuilder::new(msg).build().unwrap().to_raw();

        assert_eq!(&raw[..5], &[0xDC, 0xC2, 0x00, 11, 0x06]);
        // Swapped on the wire
        assert_eq!(&raw[5..9], &[0x3d, 0x0d, 0x05, 0x19]);
        assert_eq!(raw.len(), 11);
    }

    #[test]
    fn test_from_raw_restores_canonical_param() {
        let registry = registry();
        let msg = registry.by_name("boiler_temp").unwrap();
        let raw = TelegramBuilder::new(msg).build().unwrap().to_raw();

        let decoded = Telegram::from_raw(&raw, &registry).unwrap();
        assert_eq!(decoded.param(), 0x0d3d0519);
        assert_eq!(decoded.command(), Command::QUR);
        assert_eq!(decoded.src(), 0x42);
        assert_eq!(decoded.to_raw(), raw);
    }

    #[test]
    fn test_oversize_payload_is_rejected() {
        let registry = registry();
        let msg = registry.by_name("identify").unwrap();

        let max = TelegramBuilder::new(Arc::clone(&msg))
            .command(Command::INF)
            .payload(&[0xAA; MAX_PAYLOAD_LEN])
            .build()
            .unwrap();
        assert_eq!(max.to_raw().len(), 255);
        assert_eq!(max.to_raw()[3], 255);

        assert!(matches!(
            TelegramBuilder::new(msg)
                .command(Command::INF)
                .payload(&[0xAA; MAX_PAYLOAD_LEN + 1])
                .build(),
            Err(ProtocolError::PayloadTooLong(245))
        ));
    }

    #[test]
    fn test_truncated_frame() {
        assert!(matches!(
            Telegram::from_raw(&[0xDC, 0xC2, 0x00], &registry()),
            Err(ProtocolError::Truncated(3))
        ));
    }

    #[test]
    fn test_set_value_fb_flags() {
        let registry = registry();
        let msg = registry.by_name("room1_req_comfort_temp").unwrap();

        let mut telegram = TelegramBuilder::new(Arc::clone(&msg)).command(Command::SET).build().unwrap();
        telegram.set_value(Some(Value::Float(21.0))).unwrap();
        assert_eq!(telegram.raw_payload(), &[0x00, 0x05, 0x40]);
        assert_eq!(telegram.value(), Some(&Value::Float(21.0)));

        telegram.set_value(None).unwrap();
        assert_eq!(telegram.raw_payload(), &[0x01, 0x00, 0x00]);
    }

    #[test]
    fn test_set_value_failure_leaves_telegram() {
        let registry = registry();
        let msg = registry.by_name("hc1_operating_mode").unwrap();
        let mut telegram = TelegramBuilder::new(msg).command(Command::SET).build().unwrap();
        telegram.set_value(Some(Value::from("comfort"))).unwrap();

        assert!(telegram.set_value(Some(Value::from("turbo"))).is_err());
        assert_eq!(telegram.raw_payload(), &[0x00, 0x03]);
        assert_eq!(telegram.value(), Some(&Value::from("comfort")));
    }

    #[test]
    fn test_set_value_untyped() {
        let registry = registry();
        let msg = registry.by_name("identify").unwrap();
        let mut telegram = TelegramBuilder::new(msg).build().unwrap();
        assert_eq!(telegram.set_value(Some(Value::Int(1))), Err(FieldError::NoFieldType));
    }

    #[test]
    fn test_ans_null_flag() {
        let registry = registry();
        let msg = registry.by_name("boiler_temp").unwrap();
        let telegram = TelegramBuilder::new(msg)
            .command(Command::ANS)
            .payload(&[0x01, 0x00, 0x00])
            .build()
            .unwrap();
        assert_eq!(telegram.flag_byte(), Some(0x01));
        assert_eq!(telegram.data(), &[0x00, 0x00]);
        assert_eq!(telegram.value(), None);
    }

    #[test]
    fn test_nak_leading_flag() {
        let registry = registry();
        let msg = registry.by_name("identify").unwrap();
        let telegram = TelegramBuilder::new(msg)
            .command(Command::NAK)
            .payload(&[0x05, 0xAA])
            .build()
            .unwrap();
        assert_eq!(telegram.flag_byte(), Some(0x05));
        assert_eq!(telegram.data(), &[0xAA]);
    }

    #[test]
    fn test_undecodable_value_is_absent() {
        let registry = registry();
        let msg = registry.by_name("hc1_enabled").unwrap();
        let telegram = TelegramBuilder::new(msg)
            .command(Command::ANS)
            .payload(&[0x00, 0x42])
            .build()
            .unwrap();
        assert_eq!(telegram.data(), &[0x42]);
        assert_eq!(telegram.value(), None);
    }

    #[test]
    fn test_display_format() {
        let registry = registry();
        let msg = registry.by_name("boiler_temp").unwrap();
        let telegram = TelegramBuilder::new(msg)
            .command(Command::ANS)
            .src(0x00)
            .dst(0x42)
            .payload(&[0x00, 0x0A, 0xA0])
            .build()
            .unwrap();

        let text = telegram.to_string();
        let expected_tail = format!(
            "K => L ANS 0x0d3d0519 {:<25} {:<20} |00|0a a0|",
            "boiler_temp", "42.5"
        );
        assert!(text.ends_with(&expected_tail), "{}", text);
    }

    #[test]
    fn test_display_lb_and_plain() {
        let registry = registry();
        let msg = registry.by_name("room1_temp_status").unwrap();
        let telegram = TelegramBuilder::new(msg)
            .command(Command::INF)
            .src(0x06)
            .payload(&[0x05, 0x40, 0x00])
            .build()
            .unwrap();
        assert!(telegram.to_string().ends_with("   |05 40|00"));

        let msg = registry.by_name("identify").unwrap();
        let telegram = TelegramBuilder::new(msg)
            .command(Command::ANS)
            .payload(&[0x01, 0x02])
            .build()
            .unwrap();
        assert!(telegram.to_string().ends_with("   |01 02|"));
    }
}
