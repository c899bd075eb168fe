//! Typed field values
//!
//! Domain values produced by decoding a telegram payload, and accepted when
//! encoding one.

use std::fmt;

use chrono::{NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

/// A decoded parameter value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// On/off, enable flags
    Bool(bool),
    /// Unsigned integer counters and percentages
    Int(u32),
    /// Temperatures, pressures and other scaled quantities
    Float(f64),
    /// Enum labels and pre-rendered text (dates, schedules, errors)
    Text(String),
    /// Daily heating plan
    Plan(Plan),
    /// Heating circuit status
    HcStatus(HcStatus),
    /// Hot water / outdoor status block
    HwStatus(HwStatus),
    /// Structured timestamp (only meaningful as input to the date field)
    DateTime(NaiveDateTime),
}

impl Value {
    /// Get as bool, returning None if not a bool
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Get as a float, widening integers
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            Value::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Get as an unsigned integer
    pub fn as_u32(&self) -> Option<u32> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Get as text
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(v) => write!(f, "{}", v),
            Value::Int(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Text(v) => f.write_str(v),
            Value::Plan(v) => write!(f, "{}", v),
            Value::HcStatus(v) => write!(f, "{}", v),
            Value::HwStatus(v) => write!(f, "{}", v),
            Value::DateTime(v) => write!(f, "{}", v.format("%d.%m.%Y %H:%M:%S")),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<u8> for Value {
    fn from(v: u8) -> Self {
        Value::Int(v as u32)
    }
}

impl From<u16> for Value {
    fn from(v: u16) -> Self {
        Value::Int(v as u32)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::DateTime(v)
    }
}

/// Up to three `(start, end)` periods of a day, `None` for unused slots
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    /// The three periods
    pub intervals: [Option<(NaiveTime, NaiveTime)>; 3],
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .intervals
            .iter()
            .flatten()
            .map(|(start, end)| format!("{}-{}", start.format("%H:%M"), end.format("%H:%M")))
            .collect();
        f.write_str(&parts.join(" "))
    }
}

/// Heating circuit status block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HcStatus {
    /// Operating mode selected by the user
    pub mode: String,
    /// Level currently applied by the time program
    pub current: String,
    /// Today's time program
    pub plan: Plan,
    /// Circuit pump running
    pub running: bool,
}

impl fmt::Display for HcStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "mode: {} cur: {} run: {} plan: {}",
            self.mode, self.current, self.running, self.plan
        )
    }
}

/// Hot water status block, broadcast with outdoor temperature and pressure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HwStatus {
    /// Hot water in standby
    pub standby: bool,
    /// Outdoor temperature in °C
    pub outdoor_temp: f64,
    /// System pressure in bar
    pub water_pressure: f64,
    /// Today's hot water program
    pub plan: Plan,
}

impl fmt::Display for HwStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "OT: {:5.1}, WP: {:.1} Stby: {} Plan: {}",
            self.outdoor_temp, self.water_pressure, self.standby, self.plan
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_accessors() {
        let value = Value::Float(21.5);
        assert_eq!(value.as_f64(), Some(21.5));
        assert_eq!(value.as_bool(), None);
        assert_eq!(Value::Int(7).as_f64(), Some(7.0));
        assert_eq!(Value::from("comfort").as_str(), Some("comfort"));
    }

    #[test]
    fn test_plan_display_skips_unused() {
        let t = |h, m| NaiveTime::from_hms_opt(h, m, 0).unwrap();
        let plan = Plan {
            intervals: [Some((t(6, 0), t(8, 30))), None, Some((t(16, 0), t(22, 0)))],
        };
        assert_eq!(plan.to_string(), "06:00-08:30 16:00-22:00");
    }

    #[test]
    fn test_untagged_deserialize() {
        let v: Value = serde_json::from_str("42").unwrap();
        assert_eq!(v, Value::Int(42));
        let v: Value = serde_json::from_str("20.5").unwrap();
        assert_eq!(v, Value::Float(20.5));
        let v: Value = serde_json::from_str("\"reduced\"").unwrap();
        assert_eq!(v, Value::Text("reduced".into()));
    }
}
