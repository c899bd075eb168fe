//! Field codecs
//!
//! Converts raw telegram payloads to typed [`Value`]s and back. Every field
//! type is a variant of [`FieldType`]; decoding and encoding dispatch over the
//! variant, so the set of codecs is closed and known at compile time.
//!
//! Codecs are stateless. Composite status blocks are read-only and refuse to
//! encode.

mod status;
mod time;
mod value;

use byteorder::{BigEndian, ByteOrder};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use value::{HcStatus, HwStatus, Plan, Value};

/// Errors raised by field codecs
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FieldError {
    /// Payload shorter than the type needs
    #[error("Payload too short: need {needed} bytes, got {got}")]
    Truncated {
        /// Bytes the type needs
        needed: usize,
        /// Bytes available
        got: usize,
    },

    /// Byte with no label and no fallback
    #[error("Unknown value 0x{0:02x}")]
    UnknownValue(u8),

    /// Value of the wrong kind or an unknown label
    #[error("Unsupported value for {field:?}: {value}")]
    UnsupportedValue {
        /// Target type
        field: FieldType,
        /// Rejected value
        value: String,
    },

    /// Number does not fit the field
    #[error("Value out of range for {field:?}: {value}")]
    OutOfRange {
        /// Target type
        field: FieldType,
        /// Rejected value
        value: String,
    },

    /// Type is decode-only
    #[error("Field type {0:?} is read-only")]
    ReadOnly(FieldType),

    /// Schedule text does not parse
    #[error("Invalid schedule: {0}")]
    InvalidSchedule(String),

    /// Date text does not parse
    #[error("Invalid date: {0}")]
    InvalidDate(String),

    /// Null given for a type without a null encoding
    #[error("Field type {0:?} cannot encode a null value")]
    NullValue(FieldType),

    /// Value given for a message without a field type
    #[error("Message has no field type")]
    NoFieldType,
}

/// Field type tag of a parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    /// Signed 16-bit, 1/64 °C
    Temp,
    /// Any non-zero byte is on
    OnOff,
    /// 0xFF enabled, 0x00 disabled, anything else is an error
    Enable,
    /// Heating circuit operating mode
    OpMode,
    /// Component status code
    CStatus,
    /// Unsigned byte
    Int8,
    /// Unsigned 16-bit
    Int16,
    /// Unsigned 32-bit
    Int32,
    /// Unsigned 16-bit, hundredths
    Pct2,
    /// Unsigned 16-bit, tenths
    Float10,
    /// 9-byte date/time record
    Date,
    /// Appliance error code
    Error,
    /// Hot water state bits
    HWater,
    /// Burner state bits
    StatB,
    /// Three 10-minute-resolution periods
    Plan,
    /// Three `hh mm hh mm` periods
    Schedule,
    /// Heating circuit status block
    HcStat,
    /// Hot water / outdoor status block
    StatHw,
}

/// Enum lookup table with an optional fallback label
struct EnumTable {
    values: &'static [(u8, &'static str)],
    unknown: Option<&'static str>,
}

impl EnumTable {
    fn decode(&self, byte: u8) -> Result<Value, FieldError> {
        self.values
            .iter()
            .find(|(code, _)| *code == byte)
            .map(|(_, label)| *label)
            .or(self.unknown)
            .map(Value::from)
            .ok_or(FieldError::UnknownValue(byte))
    }

    fn encode(&self, field: FieldType, value: &Value) -> Result<Vec<u8>, FieldError> {
        let label = value.as_str().ok_or_else(|| unsupported(field, value))?;
        self.values
            .iter()
            .find(|(_, l)| *l == label)
            .map(|(code, _)| vec![*code])
            .ok_or_else(|| unsupported(field, value))
    }
}

const OP_MODE: EnumTable = EnumTable {
    values: &[
        (0x00, "protection"),
        (0x01, "automatic"),
        (0x02, "reduced"),
        (0x03, "comfort"),
    ],
    unknown: Some("unknown"),
};

const C_STATUS: EnumTable = EnumTable {
    values: &[
        (0x00, "disabled"),
        (0x10, "modulation"),
        (0x11, "finishing"),
        (0x12, "in_operation"),
        (0x19, "off"),
        (0x45, "charging_active"),
        (0x4b, "charged"),
        (0x5d, "charging_forced"),
        (0x60, "charging_to_req_temp"),
        (0x63, "nabito_jmenovita_teplota"),
        (0x68, "omezeno_prednost_hw"),
        (0x6e, "forced_circulation"),
        (0x72, "heat_comfort"),
        (0x74, "heat_reduced"),
        (0x78, "setback_reduced"),
        (0x7a, "room_temp_limitation"),
        (0xa6, "HC"),
        (0xa7, "partial HC"),
        (0xa8, "hotwater"),
        (0xa9, "hotwater2"),
        (0xae, "finishing hotwater"),
        (0xaf, "release HC"),
        (0xd8, "off_stby"),
    ],
    unknown: Some("unknown"),
};

impl FieldType {
    /// Labels an enumerated type accepts, in code order; empty for other types
    pub fn labels(self) -> Vec<&'static str> {
        let table = match self {
            FieldType::OpMode => &OP_MODE,
            FieldType::CStatus => &C_STATUS,
            _ => return Vec::new(),
        };
        table.values.iter().map(|(_, label)| *label).collect()
    }

    /// Decode a payload (flag bytes already stripped)
    pub fn decode(self, data: &[u8]) -> Result<Value, FieldError> {
        match self {
            FieldType::Temp => Ok(Value::Float(decode_temp(data)?)),
            FieldType::OnOff => Ok(Value::Bool(take(data, 1)?[0] != 0)),
            FieldType::Enable => match take(data, 1)?[0] {
                0xFF => Ok(Value::Bool(true)),
                0x00 => Ok(Value::Bool(false)),
                other => Err(FieldError::UnknownValue(other)),
            },
            FieldType::OpMode => OP_MODE.decode(take(data, 1)?[0]),
            FieldType::CStatus => C_STATUS.decode(take(data, 1)?[0]),
            FieldType::Int8 => Ok(Value::Int(take(data, 1)?[0] as u32)),
            FieldType::Int16 => Ok(Value::Int(BigEndian::read_u16(take(data, 2)?) as u32)),
            FieldType::Int32 => Ok(Value::Int(BigEndian::read_u32(take(data, 4)?))),
            FieldType::Pct2 => Ok(Value::Float(BigEndian::read_u16(take(data, 2)?) as f64 / 100.0)),
            FieldType::Float10 => Ok(Value::Float(decode_float10(data)?)),
            FieldType::Date => time::decode_date(data).map(Value::Text),
            FieldType::Error => status::decode_error(data).map(Value::Text),
            FieldType::HWater => status::decode_hot_water(data).map(Value::Text),
            FieldType::StatB => status::decode_burner(data).map(Value::Text),
            FieldType::Plan => time::decode_plan(data).map(Value::Plan),
            FieldType::Schedule => time::decode_schedule(data).map(Value::Text),
            FieldType::HcStat => status::decode_hc_status(data).map(Value::HcStatus),
            FieldType::StatHw => status::decode_hw_status(data).map(Value::HwStatus),
        }
    }

    /// Encode a value; `None` requests the field's null representation
    pub fn encode(self, value: Option<&Value>) -> Result<Vec<u8>, FieldError> {
        if !self.is_writable() {
            return Err(FieldError::ReadOnly(self));
        }
        let value = match value {
            Some(v) => v,
            // Null temperatures go out as a zero field; the flag byte carries the null
            None if self == FieldType::Temp => return Ok(vec![0, 0]),
            None => return Err(FieldError::NullValue(self)),
        };

        match self {
            FieldType::Temp => {
                let raw = scaled(self, value, 64.0, i16::MIN as f64, i16::MAX as f64)?;
                Ok((raw as i16).to_be_bytes().to_vec())
            }
            FieldType::OnOff => match value {
                Value::Bool(b) => Ok(vec![*b as u8]),
                Value::Int(n) => Ok(vec![(*n != 0) as u8]),
                other => Err(unsupported(self, other)),
            },
            FieldType::Enable => match value {
                Value::Bool(true) => Ok(vec![0xFF]),
                Value::Bool(false) => Ok(vec![0x00]),
                other => Err(unsupported(self, other)),
            },
            FieldType::OpMode => OP_MODE.encode(self, value),
            FieldType::CStatus => C_STATUS.encode(self, value),
            FieldType::Int8 => Ok(vec![integer(self, value, u8::MAX as u32)? as u8]),
            FieldType::Int16 => {
                Ok((integer(self, value, u16::MAX as u32)? as u16).to_be_bytes().to_vec())
            }
            FieldType::Int32 => Ok(integer(self, value, u32::MAX)?.to_be_bytes().to_vec()),
            FieldType::Pct2 => {
                let raw = scaled(self, value, 100.0, 0.0, u16::MAX as f64)?;
                Ok((raw as u16).to_be_bytes().to_vec())
            }
            FieldType::Float10 => {
                let raw = scaled(self, value, 10.0, 0.0, u16::MAX as f64)?;
                Ok((raw as u16).to_be_bytes().to_vec())
            }
            FieldType::Date => time::encode_date(value),
            FieldType::Schedule => match value {
                Value::Text(text) => time::encode_schedule(text),
                other => Err(unsupported(self, other)),
            },
            FieldType::Error
            | FieldType::HWater
            | FieldType::StatB
            | FieldType::Plan
            | FieldType::HcStat
            | FieldType::StatHw => Err(FieldError::ReadOnly(self)),
        }
    }

    /// Whether values of this type can be written to the bus
    pub fn is_writable(self) -> bool {
        !matches!(
            self,
            FieldType::Error
                | FieldType::HWater
                | FieldType::StatB
                | FieldType::Plan
                | FieldType::HcStat
                | FieldType::StatHw
        )
    }
}

/// Borrow the first `n` bytes or report truncation
fn take(data: &[u8], n: usize) -> Result<&[u8], FieldError> {
    data.get(..n).ok_or(FieldError::Truncated {
        needed: n,
        got: data.len(),
    })
}

fn decode_temp(data: &[u8]) -> Result<f64, FieldError> {
    Ok(BigEndian::read_i16(take(data, 2)?) as f64 / 64.0)
}

fn decode_float10(data: &[u8]) -> Result<f64, FieldError> {
    Ok(BigEndian::read_u16(take(data, 2)?) as f64 / 10.0)
}

fn unsupported(field: FieldType, value: &Value) -> FieldError {
    FieldError::UnsupportedValue {
        field,
        value: value.to_string(),
    }
}

/// Multiply, truncate toward zero and range-check
fn scaled(field: FieldType, value: &Value, factor: f64, min: f64, max: f64) -> Result<f64, FieldError> {
    let v = value.as_f64().ok_or_else(|| unsupported(field, value))?;
    let raw = (v * factor).trunc();
    if !raw.is_finite() || raw < min || raw > max {
        return Err(FieldError::OutOfRange {
            field,
            value: value.to_string(),
        });
    }
    Ok(raw)
}

fn integer(field: FieldType, value: &Value, max: u32) -> Result<u32, FieldError> {
    let n = value.as_u32().ok_or_else(|| unsupported(field, value))?;
    if n > max {
        return Err(FieldError::OutOfRange {
            field,
            value: value.to_string(),
        });
    }
    Ok(n)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temp_scaling() {
        assert_eq!(FieldType::Temp.encode(Some(&Value::Float(42.5))).unwrap(), vec![0x0A, 0xA0]);
        assert_eq!(FieldType::Temp.decode(&[0x0A, 0xA0]).unwrap(), Value::Float(42.5));
        assert_eq!(FieldType::Temp.decode(&[0xFF, 0xC0]).unwrap(), Value::Float(-1.0));
    }

    #[test]
    fn test_temp_truncates_toward_zero() {
        // -0.01 * 64 = -0.64, truncated to 0
        assert_eq!(FieldType::Temp.encode(Some(&Value::Float(-0.01))).unwrap(), vec![0, 0]);
        // 0.02 * 64 = 1.28, truncated to 1
        assert_eq!(FieldType::Temp.encode(Some(&Value::Float(0.02))).unwrap(), vec![0, 1]);
    }

    #[test]
    fn test_temp_null_is_zero_field() {
        assert_eq!(FieldType::Temp.encode(None).unwrap(), vec![0, 0]);
        assert_eq!(FieldType::Int8.encode(None), Err(FieldError::NullValue(FieldType::Int8)));
    }

    #[test]
    fn test_temp_out_of_range() {
        assert!(matches!(
            FieldType::Temp.encode(Some(&Value::Float(600.0))),
            Err(FieldError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_onoff_any_nonzero() {
        assert_eq!(FieldType::OnOff.decode(&[0x07]).unwrap(), Value::Bool(true));
        assert_eq!(FieldType::OnOff.decode(&[0x00]).unwrap(), Value::Bool(false));
    }

    #[test]
    fn test_enable_unknown_is_error() {
        assert_eq!(FieldType::Enable.decode(&[0xFF]).unwrap(), Value::Bool(true));
        assert_eq!(FieldType::Enable.decode(&[0x01]), Err(FieldError::UnknownValue(0x01)));
    }

    #[test]
    fn test_enum_fallback() {
        assert_eq!(FieldType::OpMode.decode(&[0x09]).unwrap(), Value::from("unknown"));
        assert_eq!(FieldType::CStatus.decode(&[0x4b]).unwrap(), Value::from("charged"));
        assert!(FieldType::OpMode.encode(Some(&Value::from("turbo"))).is_err());
    }

    #[test]
    fn test_integer_range() {
        assert!(FieldType::Int8.encode(Some(&Value::Int(256))).is_err());
        assert_eq!(FieldType::Int16.encode(Some(&Value::Int(0xFFFF))).unwrap(), vec![0xFF, 0xFF]);
    }

    #[test]
    fn test_truncated_payload() {
        assert_eq!(
            FieldType::Int32.decode(&[0, 1]),
            Err(FieldError::Truncated { needed: 4, got: 2 })
        );
    }

    #[test]
    fn test_read_only_types() {
        assert_eq!(
            FieldType::HcStat.encode(Some(&Value::Int(1))),
            Err(FieldError::ReadOnly(FieldType::HcStat))
        );
        assert!(!FieldType::Error.is_writable());
        assert!(FieldType::Schedule.is_writable());
    }
}
