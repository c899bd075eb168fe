//! Read-only status fields

use super::{decode_float10, decode_temp, take, time, FieldError, HcStatus, HwStatus, Value, OP_MODE};

/// Known appliance error payloads
const ERRORS: &[(&[u8], &str)] = &[
    (&[0x7f, 0x06], "Legionelni teplota"),
    (&[0x69, 0x05], "Nizky tlak vody"),
];

pub(super) fn decode_error(data: &[u8]) -> Result<String, FieldError> {
    let errno = take(data, 2)?[1];
    let text = ERRORS
        .iter()
        .find(|(pattern, _)| *pattern == data)
        .map(|(_, text)| *text)
        .unwrap_or("unknown error");
    Ok(format!("{}: {}", errno, text))
}

pub(super) fn decode_hot_water(data: &[u8]) -> Result<String, FieldError> {
    let bits = take(data, 2)?[1];
    let mut s = String::from(if bits & 0x08 != 0 { "charging" } else { "ready" });
    if bits & 0x04 == 0 {
        s.push_str(", stby");
    }
    Ok(s)
}

pub(super) fn decode_burner(data: &[u8]) -> Result<String, FieldError> {
    let bits = take(data, 1)?[0];
    let stage = if bits & 0x10 != 0 {
        2
    } else if bits & 0x04 != 0 {
        1
    } else {
        0
    };
    Ok(format!("Burner: {}", stage))
}

/// `[mode, current, plan(6), running, ..]`
pub(super) fn decode_hc_status(data: &[u8]) -> Result<HcStatus, FieldError> {
    let d = take(data, 9)?;
    let mode = match OP_MODE.decode(d[0])? {
        Value::Text(label) => label,
        other => other.to_string(),
    };
    let current = match d[1] {
        0 => "protection",
        1 => "reduced",
        2 => "comfort",
        _ => "unknown",
    };
    Ok(HcStatus {
        mode,
        current: current.to_string(),
        plan: time::decode_plan(&d[2..8])?,
        running: d[8] == 0x02,
    })
}

/// `[outdoor(2), pressure(2), plan(6), flags]`
pub(super) fn decode_hw_status(data: &[u8]) -> Result<HwStatus, FieldError> {
    let d = take(data, 11)?;
    Ok(HwStatus {
        standby: d[10] & 0x08 != 0,
        outdoor_temp: decode_temp(&d[0..2])?,
        water_pressure: decode_float10(&d[2..4])?,
        plan: time::decode_plan(&d[4..10])?,
    })
}
