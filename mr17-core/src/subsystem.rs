//! Fixed-shape state records for the four vehicle control units
//!
//! Each record is created zeroed and only ever has values overwritten by
//! accepted frames. Field sets never grow: unknown keys in a payload are
//! ignored, and so are values of the wrong type.

use crate::error::ConfigError;
use crate::frame::{FieldValue, Payload};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Logical subsystem behind a CAN id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubsystemKind {
    /// Electronic stability control A (ballast carriage)
    EscA,
    /// Electronic stability control B (brakes)
    EscB,
    /// Engine and CVT transmission
    Transmission,
    /// Vehicle dynamics control
    Vdc,
}

impl SubsystemKind {
    pub const ALL: [SubsystemKind; 4] = [
        SubsystemKind::EscA,
        SubsystemKind::EscB,
        SubsystemKind::Transmission,
        SubsystemKind::Vdc,
    ];

    /// Field names the record for this subsystem carries
    pub fn fields(&self) -> &'static [&'static str] {
        match self {
            SubsystemKind::EscA => EscARecord::FIELDS,
            SubsystemKind::EscB => EscBRecord::FIELDS,
            SubsystemKind::Transmission => TransmissionRecord::FIELDS,
            SubsystemKind::Vdc => VdcRecord::FIELDS,
        }
    }
}

impl fmt::Display for SubsystemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SubsystemKind::EscA => "esc_a",
            SubsystemKind::EscB => "esc_b",
            SubsystemKind::Transmission => "transmission",
            SubsystemKind::Vdc => "vdc",
        };
        f.write_str(name)
    }
}

/// Outcome of assigning one payload entry to a record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assign {
    Updated,
    UnknownField,
    TypeMismatch,
}

/// A record with a fixed, named field set
pub trait FieldSet {
    const FIELDS: &'static [&'static str];

    /// Overwrite one field if the name is known and the value fits
    fn assign(&mut self, field: &str, value: &FieldValue) -> Assign;
}

fn set_f64(slot: &mut f64, value: &FieldValue) -> Assign {
    match value.as_f64() {
        Some(v) => {
            *slot = v;
            Assign::Updated
        }
        None => Assign::TypeMismatch,
    }
}

fn set_i64(slot: &mut i64, value: &FieldValue) -> Assign {
    match value.as_i64() {
        Some(v) => {
            *slot = v;
            Assign::Updated
        }
        None => Assign::TypeMismatch,
    }
}

/// ESC-A: ballast carriage controller
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct EscARecord {
    /// Ballast carriage position (0-100 %)
    pub ballast_position: f64,
    pub ballast_state: i64,
    /// Ballast motor temperature (°C)
    pub motor_temp: f64,
}

impl FieldSet for EscARecord {
    const FIELDS: &'static [&'static str] = &["ballast_position", "ballast_state", "motor_temp"];

    fn assign(&mut self, field: &str, value: &FieldValue) -> Assign {
        match field {
            "ballast_position" => set_f64(&mut self.ballast_position, value),
            "ballast_state" => set_i64(&mut self.ballast_state, value),
            "motor_temp" => set_f64(&mut self.motor_temp, value),
            _ => Assign::UnknownField,
        }
    }
}

/// ESC-B: brake controller
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct EscBRecord {
    pub left_brake: f64,
    pub right_brake: f64,
    pub brake_temp: f64,
}

impl FieldSet for EscBRecord {
    const FIELDS: &'static [&'static str] = &["left_brake", "right_brake", "brake_temp"];

    fn assign(&mut self, field: &str, value: &FieldValue) -> Assign {
        match field {
            "left_brake" => set_f64(&mut self.left_brake, value),
            "right_brake" => set_f64(&mut self.right_brake, value),
            "brake_temp" => set_f64(&mut self.brake_temp, value),
            _ => Assign::UnknownField,
        }
    }
}

/// Transmission controller (engine, CVT, hour meter)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct TransmissionRecord {
    pub engine_rpm: f64,
    pub shaft_rpm: f64,
    /// -1 = reverse, 0 = neutral, 1-4 = forward ranges
    pub gear: i64,
    pub throttle: f64,
    pub engine_temp: f64,
    pub cvt_temp: f64,
    pub hours: f64,
}

impl FieldSet for TransmissionRecord {
    const FIELDS: &'static [&'static str] = &[
        "engine_rpm",
        "shaft_rpm",
        "gear",
        "throttle",
        "engine_temp",
        "cvt_temp",
        "hours",
    ];

    fn assign(&mut self, field: &str, value: &FieldValue) -> Assign {
        match field {
            "engine_rpm" => set_f64(&mut self.engine_rpm, value),
            "shaft_rpm" => set_f64(&mut self.shaft_rpm, value),
            "gear" => set_i64(&mut self.gear, value),
            "throttle" => set_f64(&mut self.throttle, value),
            "engine_temp" => set_f64(&mut self.engine_temp, value),
            "cvt_temp" => set_f64(&mut self.cvt_temp, value),
            "hours" => set_f64(&mut self.hours, value),
            _ => Assign::UnknownField,
        }
    }
}

pub const CART_MODE_MANUAL: i64 = 0;
pub const CART_MODE_AUTO: i64 = 1;
pub const CART_DIRECTION_OFF: i64 = 0;
pub const CART_DIRECTION_FORWARD: i64 = 1;
pub const CART_DIRECTION_BACKWARD: i64 = 2;

/// Vehicle dynamics controller
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct VdcRecord {
    /// Vehicle speed reported by the controller (km/h)
    pub velocity: f64,
    pub cart_mode: i64,
    pub cart_direction: i64,
}

impl FieldSet for VdcRecord {
    const FIELDS: &'static [&'static str] = &["velocity", "cart_mode", "cart_direction"];

    fn assign(&mut self, field: &str, value: &FieldValue) -> Assign {
        match field {
            "velocity" => set_f64(&mut self.velocity, value),
            "cart_mode" => set_i64(&mut self.cart_mode, value),
            "cart_direction" => set_i64(&mut self.cart_direction, value),
            _ => Assign::UnknownField,
        }
    }
}

/// What a merge did with each payload key
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    pub updated: Vec<String>,
    pub ignored: Vec<String>,
}

impl MergeReport {
    pub fn is_clean(&self) -> bool {
        self.ignored.is_empty()
    }
}

/// Merge every payload entry into a record: known keys overwrite, the rest is
/// left alone
pub fn merge<R: FieldSet>(record: &mut R, payload: &Payload) -> MergeReport {
    let mut report = MergeReport::default();
    for (field, value) in payload.iter() {
        match record.assign(field, value) {
            Assign::Updated => report.updated.push(field.to_string()),
            Assign::UnknownField | Assign::TypeMismatch => report.ignored.push(field.to_string()),
        }
    }
    report
}

/// A point-in-time copy of one subsystem's state
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SubsystemRecord {
    EscA(EscARecord),
    EscB(EscBRecord),
    Transmission(TransmissionRecord),
    Vdc(VdcRecord),
}

impl SubsystemRecord {
    pub fn kind(&self) -> SubsystemKind {
        match self {
            SubsystemRecord::EscA(_) => SubsystemKind::EscA,
            SubsystemRecord::EscB(_) => SubsystemKind::EscB,
            SubsystemRecord::Transmission(_) => SubsystemKind::Transmission,
            SubsystemRecord::Vdc(_) => SubsystemKind::Vdc,
        }
    }
}

/// ID routing table, 1:1 between CAN ids and subsystems
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubsystemTable {
    entries: Vec<(i64, SubsystemKind)>,
}

impl SubsystemTable {
    /// Build a table, rejecting anything that is not a complete 1:1 mapping
    pub fn new(entries: Vec<(i64, SubsystemKind)>) -> Result<Self, ConfigError> {
        if entries.is_empty() {
            return Err(ConfigError::EmptyTable);
        }
        for (i, (id, kind)) in entries.iter().enumerate() {
            if entries[..i].iter().any(|(other, _)| other == id) {
                return Err(ConfigError::DuplicateId(*id));
            }
            if entries[..i].iter().any(|(_, other)| other == kind) {
                return Err(ConfigError::DuplicateKind(*kind));
            }
        }
        if let Some(missing) = SubsystemKind::ALL
            .iter()
            .find(|kind| !entries.iter().any(|(_, k)| k == *kind))
        {
            return Err(ConfigError::MissingKind(*missing));
        }
        Ok(Self { entries })
    }

    /// The MR17 gateway's id assignment
    pub fn mr17() -> Self {
        Self {
            entries: vec![
                (9, SubsystemKind::EscA),
                (10, SubsystemKind::EscB),
                (11, SubsystemKind::Transmission),
                (12, SubsystemKind::Vdc),
            ],
        }
    }

    pub fn kind_of(&self, id: i64) -> Option<SubsystemKind> {
        self.entries
            .iter()
            .find(|(known, _)| *known == id)
            .map(|(_, kind)| *kind)
    }

    pub fn id_of(&self, kind: SubsystemKind) -> Option<i64> {
        self.entries
            .iter()
            .find(|(_, known)| *known == kind)
            .map(|(id, _)| *id)
    }

    pub fn entries(&self) -> &[(i64, SubsystemKind)] {
        &self.entries
    }
}

impl Default for SubsystemTable {
    fn default() -> Self {
        Self::mr17()
    }
}
