//! The record a wake cycle sends to the collector.

use crate::config::DeviceIdentity;
use crate::filter::FilteredVector;

/// One reading, ready to hand to the reporter.
///
/// A report lives for a single delivery attempt sequence. It is never queued:
/// when delivery fails the reading is dropped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Report<'a> {
    pub identity: DeviceIdentity<'a>,
    pub vector: FilteredVector,
    /// Tilt from vertical in degrees, derived from `vector`.
    pub angle_degrees: f32,
    pub temperature_celsius: Option<f32>,
    pub battery_volts: Option<f32>,
    /// Seconds since the Unix epoch, when the platform knows the time.
    pub timestamp: Option<u64>,
}

/// Shape a filtered reading into a report. Pure and total.
pub fn encode<'a>(
    identity: DeviceIdentity<'a>,
    vector: FilteredVector,
    timestamp: Option<u64>,
) -> Report<'a> {
    Report {
        identity,
        vector,
        angle_degrees: vector.vector.tilt_degrees(),
        temperature_celsius: None,
        battery_volts: None,
        timestamp,
    }
}

impl Report<'_> {
    pub fn sensor_id(&self) -> u32 {
        self.identity.sensor_id
    }

    pub fn with_temperature(mut self, celsius: Option<f32>) -> Self {
        self.temperature_celsius = celsius;
        self
    }

    pub fn with_battery(mut self, volts: Option<f32>) -> Self {
        self.battery_volts = volts;
        self
    }
}
