//! Message table
//!
//! Maps 32-bit parameter identifiers to their flags, field type and stable
//! name. The table is built once and shared read-only (`Arc<MessageRegistry>`)
//! between the telegram codec and the controller.

use std::collections::HashMap;
use std::fmt;
use std::ops::BitOr;
use std::sync::Arc;

use crate::fields::FieldType;

/// Per-message protocol flags
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Flags(u8);

impl Flags {
    /// No flags
    pub const NONE: Flags = Flags(0);
    /// Flag byte precedes the data
    pub const FB: Flags = Flags(0x01);
    /// Flag byte follows the data (INF only)
    pub const LB: Flags = Flags(0x02);
    /// SET is sent as INF
    pub const IF: Flags = Flags(0x04);
    /// Always addressed to the broadcast address
    pub const BC: Flags = Flags(0x08);
    /// QUR is sent as QIN
    pub const QI: Flags = Flags(0x10);

    /// Raw bit pattern
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Check whether all bits of `other` are set
    pub const fn contains(self, other: Flags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for Flags {
    type Output = Flags;

    fn bitor(self, rhs: Flags) -> Flags {
        Flags(self.0 | rhs.0)
    }
}

impl fmt::Debug for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = [
            (Flags::FB, "FB"),
            (Flags::LB, "LB"),
            (Flags::IF, "IF"),
            (Flags::BC, "BC"),
            (Flags::QI, "QI"),
        ]
        .iter()
        .filter(|(flag, _)| self.contains(*flag))
        .map(|(_, name)| *name)
        .collect();
        if names.is_empty() {
            f.write_str("NONE")
        } else {
            f.write_str(&names.join("|"))
        }
    }
}

/// A bus parameter definition
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Message {
    /// Parameter id, in canonical (unswapped) byte order
    pub param: u32,
    /// Protocol flags
    pub flags: Flags,
    /// Codec of the data, `None` for raw-only messages
    pub field_type: Option<FieldType>,
    /// Unique name
    pub name: String,
}

impl Message {
    /// Create a message definition
    pub fn new(param: u32, flags: Flags, field_type: Option<FieldType>, name: impl Into<String>) -> Self {
        Self {
            param,
            flags,
            field_type,
            name: name.into(),
        }
    }

    /// Placeholder for parameters missing from the table
    pub fn unknown(param: u32) -> Self {
        Self::new(param, Flags::FB, None, UNKNOWN_NAME)
    }

    /// Whether this is the placeholder for an unmapped parameter
    pub fn is_unknown(&self) -> bool {
        self.name == UNKNOWN_NAME && self.field_type.is_none()
    }
}

/// Name given to unmapped parameters
pub const UNKNOWN_NAME: &str = "unknown";

/// Lookup service from parameter id or name to [`Message`]
#[derive(Debug, Default)]
pub struct MessageRegistry {
    by_param: HashMap<u32, Arc<Message>>,
    by_name: HashMap<String, Arc<Message>>,
}

impl MessageRegistry {
    /// Build a registry from message definitions; later names shadow earlier ones
    pub fn new(messages: impl IntoIterator<Item = Message>) -> Self {
        let mut registry = Self::default();
        for msg in messages {
            let msg = Arc::new(msg);
            registry.by_param.insert(msg.param, Arc::clone(&msg));
            registry.by_name.insert(msg.name.clone(), msg);
        }
        registry
    }

    /// The built-in parameter table
    pub fn builtin() -> Self {
        Self::new(builtin_messages())
    }

    /// Look up a parameter; unmapped ids resolve to [`Message::unknown`]
    pub fn lookup(&self, param: u32) -> Arc<Message> {
        self.by_param
            .get(&param)
            .cloned()
            .unwrap_or_else(|| Arc::new(Message::unknown(param)))
    }

    /// Look up a message by its stable name
    pub fn by_name(&self, name: &str) -> Option<Arc<Message>> {
        self.by_name.get(name).cloned()
    }

    /// Number of distinct parameters
    pub fn len(&self) -> usize {
        self.by_param.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.by_param.is_empty()
    }

    /// Iterate all known names
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.by_name.keys().map(String::as_str)
    }
}

const DAYS: [&str; 7] = ["mon", "tue", "wed", "thu", "fri", "sat", "sun"];

fn builtin_messages() -> Vec<Message> {
    use FieldType::*;

    const FB: Flags = Flags::FB;
    const NN: Flags = Flags::NONE;
    const QI: Flags = Flags::QI;
    let sb = Flags::IF | Flags::BC;
    let li = Flags::IF | Flags::LB;

    let m = Message::new;
    let mut messages = vec![
        m(0x05000064, NN, None, "identify"),
        m(0x053d0248, NN, None, "unknown1"),
        m(0x0500006c, sb, Some(Date), "datetime"),
        m(0x0500006b, NN, Some(Error), "error"),
        // INF K->B variants; QUR/ANS use the *_qa ids
        m(0x2d000211, NN, Some(HcStat), "hc1_status"),
        m(0x2e000211, NN, Some(HcStat), "hc2_status"),
        m(0x2f000211, NN, Some(HcStat), "hc3_status"),
        m(0x2d3d0211, NN, Some(HcStat), "hc1_status_qa"),
        m(0x2e3e0211, QI, Some(HcStat), "hc2_status_qa"),
        m(0x2f3f0211, NN, Some(HcStat), "hc3_status_qa"),
        m(0x31000212, FB, Some(HWater), "hot_water_status"),
        m(0x313d0212, FB, Some(HWater), "hot_water_status_qa"),
        m(0x05000213, NN, Some(StatB), "status_burner"),
        m(0x053d0213, NN, Some(StatB), "status_burner"),
        m(0x3d2d0215, li, Some(Temp), "room1_temp_status"),
        m(0x3e2e0215, li, Some(Temp), "room2_temp_status"),
        m(0x05000219, NN, Some(StatHw), "status_hw"),
        m(0x053d0219, NN, Some(StatHw), "status_hw_qa"),
        m(0x053d0236, FB, Some(OnOff), "standby"),
        m(0x053d04c0, FB, Some(Enable), "hc1_enabled"),
        m(0x063d04c0, FB, Some(Enable), "hc2_enabled"),
        m(0x073d04c0, FB, Some(Enable), "hc3_enabled"),
        m(0x0d3d0519, FB, Some(Temp), "boiler_temp"),
        m(0x113d051a, FB, Some(Temp), "boiler_return_temp"),
        m(0x053d051d, FB, Some(Temp), "flue_temp"),
        m(0x2d3d051e, FB, Some(Temp), "room1_temp"),
        m(0x2e3d051e, FB, Some(Temp), "room2_temp"),
        m(0x053d0521, FB, Some(Temp), "outer_temp"),
        m(0x313d052f, FB, Some(Temp), "boiler_water_temp"),
        m(0x053d056f, FB, Some(Temp), "outer_temp_min"),
        m(0x053d056e, FB, Some(Temp), "outer_temp_max"),
        m(0x313d0571, FB, Some(OnOff), "hot_water_operating_mode"),
        m(0x313d0573, FB, Some(OnOff), "hot_water_push"),
        m(0x2d3d0574, FB, Some(OpMode), "hc1_operating_mode"),
        m(0x2e3d0574, FB, Some(OpMode), "hc2_operating_mode"),
        m(0x2d3d058e, FB, Some(Temp), "room1_req_comfort_temp"),
        m(0x2e3d058e, FB, Some(Temp), "room2_req_comfort_temp"),
        m(0x2d3d0590, FB, Some(Temp), "room1_req_reduced_temp"),
        m(0x2e3d0590, FB, Some(Temp), "room2_req_reduced_temp"),
        m(0x2d3d0592, FB, Some(Temp), "hc1_temp_antifreeze"),
        m(0x2e3d0593, FB, Some(Temp), "room2_setpoint"),
        m(0x2d3d0593, FB, Some(Temp), "room1_requested_temp"),
        m(0x2d3d05a5, FB, Some(Temp), "hc1_temp_comfort_max"),
        m(0x2d3d05f6, FB, None, "hc1_curve_steep"),
        m(0x2d3d0603, FB, Some(Int8), "hc1_room_influence_ptc"),
        m(0x2e3d0603, FB, Some(Int8), "hc2_room_influence_ptc"),
        m(0x2d3d060b, FB, Some(Enable), "hc1_curve_adaptation"),
        m(0x2d3d0610, FB, None, "hc1_curve_offset"),
        m(0x3d210662, FB, Some(Temp), "hc1_rampup_temp"),
        m(0x213d0662, FB, Some(Temp), "hc1_rampup_max_temp"),
        m(0x223d0662, FB, Some(Temp), "hc2_rampup_max_temp"),
        m(0x313d06b9, FB, Some(Temp), "req_hot_water_nominal_temp"),
        m(0x313d06ba, FB, Some(Temp), "req_hot_water_reduced_temp"),
        m(0x053d06e8, NN, None, "phone_number"),
        m(0x313d074b, FB, Some(Temp), "req_hot_water_temp"),
        m(0x313d0759, FB, None, "legionella_function"),
        m(0x053d07a1, FB, Some(CStatus), "hot_water_status_info"),
        m(0x053d07a2, FB, Some(CStatus), "hot_water_state"),
        m(0x053d07a3, FB, Some(CStatus), "hc1_mode"),
        m(0x053d07a4, FB, Some(CStatus), "hc1_state_central_heating"),
        m(0x053d07a5, FB, Some(CStatus), "hc2_mode"),
        m(0x053d07a6, FB, Some(CStatus), "hc2_state_central_heating"),
        m(0x053d07a7, FB, Some(CStatus), "hc3_mode"),
        m(0x053d07a9, FB, Some(CStatus), "boiler_status"),
        m(0x053d07aa, FB, Some(CStatus), "hc_boiler_status"),
        m(0x053d0805, FB, Some(Float10), "water_pressure"),
        m(0x053d0826, FB, Some(Int8), "pump_modulation_pct"),
        m(0x053d0834, FB, Some(Int8), "burner_modulation_pct"),
        m(0x053d08a5, FB, Some(Int32), "burner_start_count"),
        m(0x0d3d093b, FB, Some(Int32), "first_stage_op_time"),
        m(0x053d09a3, FB, Some(Enable), "hw_pump"),
        m(0x053d09a5, FB, Some(Enable), "hc1_pump"),
        m(0x053d0a73, FB, Some(Enable), "cc1_enabled"),
        m(0x213d0a88, FB, Some(Temp), "hc1_flow_temp_setpoint_room_stat"),
        m(0x223d0a88, FB, Some(Temp), "hc2_zadana_teplota_nabehu_prostoroveho_termostatu"),
    ];

    for (i, day) in DAYS.iter().enumerate() {
        messages.push(Message::new(0x053d0a8c + i as u32, NN, Some(Schedule), format!("hc1_time_prog_{}", day)));
    }
    for (i, day) in DAYS.iter().enumerate() {
        messages.push(Message::new(0x053d0aa0 + i as u32, NN, Some(Schedule), format!("hot_water_time_prog_{}", day)));
    }

    messages.extend([
        m(0x093d0dfd, FB, Some(CStatus), "burner_current_phase"),
        m(0x093d0e00, FB, Some(Pct2), "fan_modulation_pct"),
        // Divide by 100 for µA
        m(0x093d0e16, FB, Some(Int16), "burner_ionisation_current"),
        m(0x093d0e69, FB, Some(Int16), "fan_rpm"),
        m(0x093d0f62, FB, None, "sitherm_operating_phase"),
        m(0x053d0f66, FB, Some(CStatus), "burner_state"),
        m(0x053d0f8e, NN, None, "hot_water_flow"),
        m(0x053d1071, FB, Some(Temp), "primary_temp"),
        m(0x2d3d1125, FB, Some(Temp), "room1_temp_req"),
        m(0x2e3e1125, FB, Some(Temp), "room2_temp_req"),
        m(0x053d1289, FB, Some(Enable), "hc1_continuous_pump_operation"),
        m(0x053d1a7a, FB, Some(Int32), "gas_consumption_heating"),
        m(0x053d1a7b, FB, Some(Int32), "gas_consumption_hot_water"),
        m(0x053d1a7c, FB, Some(Int32), "gas_consumption"),
        m(0x053d1ac1, FB, None, "sitherm_pro_state"),
        m(0x053d1ac2, FB, None, "SithermPro_state"),
        m(0x053d2feb, FB, Some(Int32), "hc_op_time"),
        m(0x053d2fec, FB, Some(Int32), "hot_water_op_time"),
        m(0x053d3063, FB, Some(Int16), "burner_water_pressure"),
        m(0x053d3043, FB, Some(Int16), "gas_quality"),
    ]);

    messages
}
