//! Unified telemetry snapshot
//!
//! The snapshot is what leaves the engine: a flat, always fully populated set
//! of output fields. It is rebuilt from scratch on every tick and never
//! edited afterwards.

use crate::units::*;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::str::FromStr;

/// Where the values of a snapshot came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotMode {
    /// Composed from the subsystem records
    Live,
    /// Generated by the simulator
    Simulated,
}

/// How the slip value was arrived at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlipStatus {
    Computed,
    NoGroundSpeed,
    UnknownGear,
    /// Ground speed sample was zero, negative or not finite
    ZeroGroundSpeed,
}

/// Complete telemetry snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    /// Increments on every published snapshot
    pub sequence: u64,

    /// When this snapshot was composed
    pub timestamp: DateTime<Utc>,

    pub mode: SnapshotMode,

    // === Derived ===
    /// Wheel speed over ground speed
    pub slip: f64,
    pub slip_status: SlipStatus,

    /// Engine rpm over shaft rpm, -1 when the shaft is stopped
    pub cvt_ratio: f64,

    // === Transmission ===
    pub rpm: Rpm,
    pub shaft_rpm: Rpm,
    pub gear: i64,
    pub throttle: Percent,
    pub engine_temp: Celsius,
    pub cvt_temp: Celsius,
    pub hours: Hours,

    // === Brakes (ESC-B) ===
    pub lbrake: Percent,
    pub rbrake: Percent,
    pub brake_temp: Celsius,

    // === Ballast (ESC-A) ===
    pub ballast_position: Percent,
    pub ballast_state: i64,
    pub motor_temp: Celsius,

    // === Vehicle dynamics (VDC) ===
    pub velocity: KilometersPerHour,
    pub cart_mode: i64,
    pub cart_direction: i64,

    /// Ground speed sample used for slip (0 when none was available)
    pub ground_speed: KilometersPerHour,
}

impl TelemetrySnapshot {
    /// Every output field name, in serialization order
    pub const FIELDS: &'static [&'static str] = &[
        "sequence",
        "timestamp",
        "mode",
        "slip",
        "slip_status",
        "cvt_ratio",
        "rpm",
        "shaft_rpm",
        "gear",
        "throttle",
        "engine_temp",
        "cvt_temp",
        "hours",
        "lbrake",
        "rbrake",
        "brake_temp",
        "ballast_position",
        "ballast_state",
        "motor_temp",
        "velocity",
        "cart_mode",
        "cart_direction",
        "ground_speed",
    ];

    /// Fields included regardless of the mask
    const ALWAYS: &'static [&'static str] = &["sequence", "timestamp", "mode"];

    /// JSON for the debug log. A mask trims the output to its fields; the
    /// header fields (sequence, timestamp, mode) stay regardless.
    pub fn to_json_filtered(&self, mask: Option<&FieldMask>) -> serde_json::Result<String> {
        let mask = match mask {
            Some(mask) if !mask.is_all() => mask,
            _ => return serde_json::to_string(self),
        };

        let mut value = serde_json::to_value(self)?;
        if let Some(map) = value.as_object_mut() {
            map.retain(|key, _| Self::ALWAYS.contains(&key.as_str()) || mask.includes(key));
        }
        serde_json::to_string(&value)
    }
}

/// Which snapshot fields the debug log prints.
///
/// Names are resolved against [`TelemetrySnapshot::FIELDS`] once, when the
/// list is parsed, ignoring case. Names that resolve to nothing are kept for
/// reporting and never match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldMask {
    /// `None` selects every field
    selected: Option<BTreeSet<&'static str>>,
    unknown: Vec<String>,
}

impl FieldMask {
    pub fn all() -> Self {
        Self::default()
    }

    /// Parse a comma-separated list such as `"slip, rpm,cvt_ratio"`
    pub fn parse(list: &str) -> Self {
        let mut selected = BTreeSet::new();
        let mut unknown = Vec::new();
        for name in list.split(',').map(str::trim).filter(|n| !n.is_empty()) {
            match TelemetrySnapshot::FIELDS
                .iter()
                .find(|field| field.eq_ignore_ascii_case(name))
            {
                Some(field) => {
                    selected.insert(*field);
                }
                None => unknown.push(name.to_lowercase()),
            }
        }
        unknown.sort();
        unknown.dedup();

        Self {
            selected: Some(selected),
            unknown,
        }
    }

    pub fn includes(&self, field: &str) -> bool {
        match &self.selected {
            None => true,
            Some(selected) => selected.iter().any(|f| f.eq_ignore_ascii_case(field)),
        }
    }

    pub fn is_all(&self) -> bool {
        self.selected.is_none()
    }

    /// Snapshot fields picked by the list, in name order
    pub fn selected(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.selected.iter().flatten().copied()
    }

    /// Requested names that are not snapshot fields, sorted
    pub fn unknown_fields(&self) -> &[String] {
        &self.unknown
    }
}

impl FromStr for FieldMask {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_test_snapshot() -> TelemetrySnapshot {
        TelemetrySnapshot {
            sequence: 7,
            timestamp: Utc::now(),
            mode: SnapshotMode::Live,
            slip: 0.5,
            slip_status: SlipStatus::Computed,
            cvt_ratio: 2.0,
            rpm: Rpm(3000.0),
            shaft_rpm: Rpm(1500.0),
            gear: 2,
            throttle: Percent(80.0),
            engine_temp: Celsius(90.0),
            cvt_temp: Celsius(70.0),
            hours: Hours(120.5),
            lbrake: Percent(0.0),
            rbrake: Percent(5.0),
            brake_temp: Celsius(40.0),
            ballast_position: Percent(30.0),
            ballast_state: 1,
            motor_temp: Celsius(50.0),
            velocity: KilometersPerHour(14.0),
            cart_mode: 1,
            cart_direction: 1,
            ground_speed: KilometersPerHour(13.2),
        }
    }

    #[test]
    fn test_field_list_matches_serialization() {
        let value = serde_json::to_value(make_test_snapshot()).unwrap();
        let keys: Vec<&str> = value.as_object().unwrap().keys().map(|k| k.as_str()).collect();
        assert_eq!(keys, TelemetrySnapshot::FIELDS);
    }

    #[test]
    fn test_to_json_filtered_with_none_returns_everything() {
        let snapshot = make_test_snapshot();
        let json = snapshot.to_json_filtered(None).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.as_object().unwrap().len(), TelemetrySnapshot::FIELDS.len());
        assert_eq!(parsed["rpm"], 3000.0);
        assert_eq!(parsed["mode"], "live");
        assert_eq!(parsed["slip_status"], "computed");
    }

    #[test]
    fn test_to_json_filtered_with_all_mask() {
        let snapshot = make_test_snapshot();
        let json = snapshot.to_json_filtered(Some(&FieldMask::all())).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.as_object().unwrap().len(), TelemetrySnapshot::FIELDS.len());
    }

    #[test]
    fn test_to_json_filtered_with_mask_returns_only_requested_fields() {
        let snapshot = make_test_snapshot();
        let mask = FieldMask::parse("slip,cvt_ratio,RPM");
        let json = snapshot.to_json_filtered(Some(&mask)).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        let map = parsed.as_object().unwrap();

        assert!(map.contains_key("sequence"));
        assert!(map.contains_key("timestamp"));
        assert!(map.contains_key("mode"));
        assert_eq!(map["slip"], 0.5);
        assert_eq!(map["cvt_ratio"], 2.0);
        assert_eq!(map["rpm"], 3000.0);
        assert!(!map.contains_key("lbrake"));
        assert_eq!(map.len(), 6);
    }

    #[test]
    fn test_field_mask_parse() {
        let mask = FieldMask::parse(" slip , RPM ,, cvt_ratio");
        assert!(mask.includes("slip"));
        assert!(mask.includes("rpm"));
        assert!(!mask.includes("lbrake"));
        assert!(!mask.is_all());
        assert_eq!(mask.selected().collect::<Vec<_>>(), vec!["cvt_ratio", "rpm", "slip"]);
    }

    #[test]
    fn test_field_mask_keeps_unknown_names_aside() {
        let mask: FieldMask = "rpm,Turbo,speed,turbo".parse().unwrap();
        assert_eq!(mask.unknown_fields(), ["speed".to_string(), "turbo".to_string()]);
        assert_eq!(mask.selected().collect::<Vec<_>>(), vec!["rpm"]);
        assert!(!mask.includes("turbo"));
    }

    #[test]
    fn test_field_mask_of_only_unknown_names_keeps_header_fields() {
        let snapshot = make_test_snapshot();
        let mask = FieldMask::parse("turbo");
        let json = snapshot.to_json_filtered(Some(&mask)).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.as_object().unwrap().len(), 3);
    }

    #[test]
    fn test_default_field_mask_selects_everything() {
        let mask = FieldMask::default();
        assert!(mask.is_all());
        assert!(mask.includes("lbrake"));
        assert_eq!(mask.selected().count(), 0);
    }

    #[test]
    fn test_snapshot_serialization_roundtrip() {
        let snapshot = make_test_snapshot();
        let json = serde_json::to_string(&snapshot).unwrap();
        let back: TelemetrySnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snapshot);
    }
}
