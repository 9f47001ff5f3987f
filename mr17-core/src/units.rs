//! Type-safe wrappers for physical units
//!
//! Newtype wrappers around f64 so that a shaft speed cannot be handed to
//! something expecting a ground speed.
//!
//! All unit types serialize with 4 decimal places to keep snapshot JSON
//! compact.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Round f64 to 4 decimal places for compact JSON serialization
fn round4<S: serde::Serializer>(val: &f64, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64((*val * 10000.0).round() / 10000.0)
}

/// Revolutions per minute
#[derive(Debug, Clone, Copy, Default, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Rpm(#[serde(serialize_with = "round4")] pub f64);

/// Kilometers per hour
#[derive(Debug, Clone, Copy, Default, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct KilometersPerHour(#[serde(serialize_with = "round4")] pub f64);

/// Celsius
#[derive(Debug, Clone, Copy, Default, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Celsius(#[serde(serialize_with = "round4")] pub f64);

/// Percentage on the gateway's 0-100 scale
#[derive(Debug, Clone, Copy, Default, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Percent(#[serde(serialize_with = "round4")] pub f64);

/// Engine hours
#[derive(Debug, Clone, Copy, Default, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Hours(#[serde(serialize_with = "round4")] pub f64);

/// Centimeters (wheel geometry)
#[derive(Debug, Clone, Copy, Default, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Centimeters(pub f64);

impl Centimeters {
    pub fn as_kilometers(&self) -> f64 {
        self.0 / 1e5
    }
}

impl Rpm {
    /// Linear speed of a wheel with the given radius turning at this rate
    pub fn wheel_speed(&self, radius: Centimeters) -> KilometersPerHour {
        // circumference in km times revolutions per hour
        KilometersPerHour(2.0 * PI * radius.as_kilometers() * (60.0 * self.0))
    }
}
