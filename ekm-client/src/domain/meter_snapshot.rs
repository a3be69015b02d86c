use serde::Serialize;
use serde_json::{Map, Value};

/// One reading fetched from an EKM meter.
///
/// Field names are the device API's wire names; they are also the object keys
/// of the snapshot's canonical encoding, so renaming a field changes every
/// signature produced from it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeterSnapshot {
    pub meter_name: String,
    /// Auxiliary measurements reported by the device, keyed by name.
    pub meter_data: Map<String, Value>,
    pub meter_day_of_week: String,
    pub reading_date: String,
    pub model: String,
    pub address: String,
    pub firmware: String,
    pub total_watt_hour: f64,
    pub voltage: f64,
    pub amps: f64,
    pub total_power_watts: f64,
    pub ct_ratio: f64,
    pub frequency_hz: f64,
}

impl MeterSnapshot {
    /// Numeric measurement fields as `(wire name, value)` pairs.
    pub fn measurements(&self) -> [(&'static str, f64); 6] {
        [
            ("total_watt_hour", self.total_watt_hour),
            ("voltage", self.voltage),
            ("amps", self.amps),
            ("total_power_watts", self.total_power_watts),
            ("ct_ratio", self.ct_ratio),
            ("frequency_hz", self.frequency_hz),
        ]
    }

    /// Name of the first measurement that is NaN or infinite, if any.
    pub fn first_non_finite(&self) -> Option<&'static str> {
        self.measurements()
            .into_iter()
            .find(|(_, v)| !v.is_finite())
            .map(|(name, _)| name)
    }
}
