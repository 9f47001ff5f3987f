//! Telemetry composer
//!
//! Maps the four subsystem records onto the output snapshot and derives the
//! two computed values:
//!
//! - **slip**: wheel speed implied by the shaft rpm and the gear's axle ratio,
//!   divided by the measured ground speed. Only computed when a ground-speed
//!   sample is supplied and the gear is in the table.
//! - **cvt_ratio**: engine rpm over shaft rpm, [`CVT_DISENGAGED`] while the
//!   shaft is stopped.

use crate::registry::RegistryView;
use crate::snapshot::{SlipStatus, SnapshotMode, TelemetrySnapshot};
use crate::units::*;
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Slip reported when the ground-speed sample cannot be divided by
pub const SLIP_UNDEFINED: f64 = -1.0;

/// CVT ratio reported while the output shaft is not turning
pub const CVT_DISENGAGED: f64 = -1.0;

pub const DEFAULT_EFFECTIVE_RADIUS_CM: f64 = 28.0;

/// Versioned gear → axle ratio lookup
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GearTable {
    pub version: u32,
    ratios: &'static [(i64, f64)],
}

impl GearTable {
    pub const V1: GearTable = GearTable {
        version: 1,
        ratios: &[(1, 43.28), (2, 35.88), (3, 15.95), (4, 47.84)],
    };

    /// Axle ratio for a gear, None for anything outside the table
    pub fn ratio(&self, gear: i64) -> Option<f64> {
        self.ratios
            .iter()
            .find(|(g, _)| *g == gear)
            .map(|(_, ratio)| *ratio)
    }

    pub fn gears(&self) -> impl Iterator<Item = i64> + '_ {
        self.ratios.iter().map(|(g, _)| *g)
    }
}

impl Default for GearTable {
    fn default() -> Self {
        Self::V1
    }
}

/// Tunables for composition
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ComposerConfig {
    /// Loaded rolling radius of the drive wheels
    #[serde(default = "default_effective_radius_cm")]
    pub effective_radius_cm: f64,
}

fn default_effective_radius_cm() -> f64 {
    DEFAULT_EFFECTIVE_RADIUS_CM
}

impl Default for ComposerConfig {
    fn default() -> Self {
        Self {
            effective_radius_cm: DEFAULT_EFFECTIVE_RADIUS_CM,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TelemetryComposer {
    config: ComposerConfig,
    gears: GearTable,
}

impl TelemetryComposer {
    pub fn new(config: ComposerConfig) -> Self {
        Self {
            config,
            gears: GearTable::V1,
        }
    }

    pub fn gear_table(&self) -> &GearTable {
        &self.gears
    }

    /// Build a live snapshot from the records and an optional ground-speed
    /// sample in km/h. The sequence number is left at 0 for the caller to
    /// stamp.
    pub fn compose(&self, view: &RegistryView, ground_speed: Option<f64>) -> TelemetrySnapshot {
        let tsc = &view.transmission;
        let (slip, slip_status) = self.slip(tsc.shaft_rpm, tsc.gear, ground_speed);

        TelemetrySnapshot {
            sequence: 0,
            timestamp: Utc::now(),
            mode: SnapshotMode::Live,
            slip,
            slip_status,
            cvt_ratio: cvt_ratio(tsc.engine_rpm, tsc.shaft_rpm),
            rpm: Rpm(tsc.engine_rpm),
            shaft_rpm: Rpm(tsc.shaft_rpm),
            gear: tsc.gear,
            throttle: Percent(tsc.throttle),
            engine_temp: Celsius(tsc.engine_temp),
            cvt_temp: Celsius(tsc.cvt_temp),
            hours: Hours(tsc.hours),
            lbrake: Percent(view.esc_b.left_brake),
            rbrake: Percent(view.esc_b.right_brake),
            brake_temp: Celsius(view.esc_b.brake_temp),
            ballast_position: Percent(view.esc_a.ballast_position),
            ballast_state: view.esc_a.ballast_state,
            motor_temp: Celsius(view.esc_a.motor_temp),
            velocity: KilometersPerHour(view.vdc.velocity),
            cart_mode: view.vdc.cart_mode,
            cart_direction: view.vdc.cart_direction,
            ground_speed: KilometersPerHour(ground_speed.unwrap_or(0.0)),
        }
    }

    /// Slip ratio and how it was obtained
    pub fn slip(&self, shaft_rpm: f64, gear: i64, ground_speed: Option<f64>) -> (f64, SlipStatus) {
        let Some(ground_speed) = ground_speed else {
            return (0.0, SlipStatus::NoGroundSpeed);
        };
        let Some(ratio) = self.gears.ratio(gear) else {
            return (0.0, SlipStatus::UnknownGear);
        };
        if !ground_speed.is_finite() || ground_speed <= 0.0 {
            return (SLIP_UNDEFINED, SlipStatus::ZeroGroundSpeed);
        }

        let axle = Rpm(shaft_rpm / ratio);
        let wheel = axle.wheel_speed(Centimeters(self.config.effective_radius_cm));
        (wheel.0 / ground_speed, SlipStatus::Computed)
    }
}

impl Default for TelemetryComposer {
    fn default() -> Self {
        Self::new(ComposerConfig::default())
    }
}

/// Engine rpm over shaft rpm
pub fn cvt_ratio(engine_rpm: f64, shaft_rpm: f64) -> f64 {
    if shaft_rpm == 0.0 {
        CVT_DISENGAGED
    } else {
        engine_rpm / shaft_rpm
    }
}
