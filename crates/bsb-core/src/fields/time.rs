//! Date, plan and schedule codecs

use std::sync::OnceLock;

use chrono::{Datelike, NaiveDateTime, NaiveTime, Timelike};
use regex::Regex;

use super::{take, FieldError, FieldType, Plan, Value};

/// Marks an unused plan slot (first byte of a pair)
const PLAN_UNUSED: u8 = 0xFF;

/// Marks an unused schedule slot (first byte of a group)
const SCHEDULE_UNUSED: u8 = 0x80;

const SCHEDULE_SLOTS: usize = 3;

/// Accepted textual date formats for writing
const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%d.%m.%Y %H:%M:%S"];

fn schedule_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(\d+):(\d+)-(\d+):(\d+)").expect("valid schedule pattern"))
}

/// `[reserved, year-1900, month, day, weekday, hour, min, sec, reserved]`
pub(super) fn decode_date(data: &[u8]) -> Result<String, FieldError> {
    let d = take(data, 9)?;
    let (year, month, day) = (d[1] as u32 + 1900, d[2], d[3]);
    let (hour, minute, second) = (d[5], d[6], d[7]);
    Ok(format!(
        "{:02}.{:02}.{} {:02}:{:02}:{:02}",
        day, month, year, hour, minute, second
    ))
}

pub(super) fn encode_date(value: &Value) -> Result<Vec<u8>, FieldError> {
    let dt = match value {
        Value::DateTime(dt) => *dt,
        Value::Text(text) => DATE_FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(text.trim(), fmt).ok())
            .ok_or_else(|| FieldError::InvalidDate(text.clone()))?,
        other => {
            return Err(FieldError::UnsupportedValue {
                field: FieldType::Date,
                value: other.to_string(),
            })
        }
    };

    let year = dt.year() - 1900;
    if !(0..=255).contains(&year) {
        return Err(FieldError::InvalidDate(dt.to_string()));
    }

    Ok(vec![
        0,
        year as u8,
        dt.month() as u8,
        dt.day() as u8,
        // Sunday is 0, Monday 1
        (dt.weekday().number_from_monday() % 7) as u8,
        dt.hour() as u8,
        dt.minute() as u8,
        dt.second() as u8,
        0,
    ])
}

/// 10-minute units since midnight, wrapping at 24h
fn plan_time(units: u8) -> NaiveTime {
    let minutes = (units as u32 * 10) % (24 * 60);
    NaiveTime::from_num_seconds_from_midnight_opt(minutes * 60, 0).unwrap_or(NaiveTime::MIN)
}

pub(super) fn decode_plan(data: &[u8]) -> Result<Plan, FieldError> {
    let d = take(data, 6)?;
    let mut intervals = [None; 3];
    for (slot, pair) in intervals.iter_mut().zip(d.chunks_exact(2)) {
        if pair[0] != PLAN_UNUSED {
            *slot = Some((plan_time(pair[0]), plan_time(pair[1])));
        }
    }
    Ok(Plan { intervals })
}

pub(super) fn decode_schedule(data: &[u8]) -> Result<String, FieldError> {
    let d = take(data, SCHEDULE_SLOTS * 4)?;
    let parts: Vec<String> = d
        .chunks_exact(4)
        .filter(|group| group[0] & SCHEDULE_UNUSED == 0)
        .map(|g| format!("{:02}:{:02}-{:02}:{:02}", g[0], g[1], g[2], g[3]))
        .collect();
    Ok(parts.join(" "))
}

/// Parse `HH:MM-HH:MM` tokens; at most three are used, unused slots are padded
pub(super) fn encode_schedule(text: &str) -> Result<Vec<u8>, FieldError> {
    let invalid = || FieldError::InvalidSchedule(text.to_string());

    let mut periods = Vec::new();
    for caps in schedule_pattern().captures_iter(text).take(SCHEDULE_SLOTS) {
        let mut nums = [0u32; 4];
        for (i, n) in nums.iter_mut().enumerate() {
            *n = caps[i + 1].parse().map_err(|_| invalid())?;
        }
        let [h1, m1, h2, m2] = nums;
        if h1 > 23 || h2 > 23 || m1 > 59 || m2 > 59 {
            return Err(invalid());
        }
        if h1 * 60 + m1 > h2 * 60 + m2 {
            return Err(invalid());
        }
        periods.push([h1 as u8, m1 as u8, h2 as u8, m2 as u8]);
    }

    if periods.is_empty() {
        return Err(invalid());
    }

    let mut out = Vec::with_capacity(SCHEDULE_SLOTS * 4);
    for i in 0..SCHEDULE_SLOTS {
        match periods.get(i) {
            Some(p) => out.extend_from_slice(p),
            None => out.extend_from_slice(&[SCHEDULE_UNUSED, 0, 0, 0]),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_date_decode() {
        let data = [0x00, 0x7c, 0x03, 0x0f, 0x05, 0x0e, 0x1e, 0x05, 0x00];
        assert_eq!(decode_date(&data).unwrap(), "15.03.2024 14:30:05");
    }

    #[test]
    fn test_date_encode_weekday() {
        // 2024-03-17 was a Sunday
        let dt = NaiveDate::from_ymd_opt(2024, 3, 17)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap();
        let bytes = encode_date(&Value::DateTime(dt)).unwrap();
        assert_eq!(bytes, vec![0, 124, 3, 17, 0, 8, 0, 0, 0]);

        let monday = encode_date(&Value::from("2024-03-18 08:00:00")).unwrap();
        assert_eq!(monday[4], 1);
    }

    #[test]
    fn test_date_encode_rejects_garbage() {
        assert!(matches!(
            encode_date(&Value::from("tomorrow")),
            Err(FieldError::InvalidDate(_))
        ));
    }

    #[test]
    fn test_plan_decode() {
        let plan = decode_plan(&[36, 51, 0xFF, 0, 96, 132]).unwrap();
        assert_eq!(plan.to_string(), "06:00-08:30 16:00-22:00");
        assert!(plan.intervals[1].is_none());
    }

    #[test]
    fn test_schedule_decode_skips_unused() {
        let data = [5, 0, 6, 30, 16, 0, 22, 0, 0x98, 0, 0x18, 0];
        assert_eq!(decode_schedule(&data).unwrap(), "05:00-06:30 16:00-22:00");
    }

    #[test]
    fn test_schedule_encode_pads() {
        let bytes = encode_schedule("5:00-6:30").unwrap();
        assert_eq!(bytes, vec![5, 0, 6, 30, 0x80, 0, 0, 0, 0x80, 0, 0, 0]);
    }

    #[test]
    fn test_schedule_encode_validation() {
        assert!(encode_schedule("").is_err());
        assert!(encode_schedule("no times here").is_err());
        assert!(encode_schedule("24:00-25:00").is_err());
        assert!(encode_schedule("10:60-11:00").is_err());
        // start after end
        assert!(encode_schedule("22:00-06:00").is_err());
        // one bad interval fails the whole value
        assert!(encode_schedule("05:00-06:00 09:00-08:00").is_err());
    }
}
