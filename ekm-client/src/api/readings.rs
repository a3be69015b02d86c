use serde::Deserialize;
use serde_json::{Map, Value};

use crate::domain::MeterSnapshot;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ReadingDecodeError {
    #[error("field `{field}` is not numeric: {value:?}")]
    NotNumeric { field: &'static str, value: String },
    #[error("field `{field}` is not a finite number")]
    NonFinite { field: &'static str },
}

/// A numeric measurement as the device reports it: either a JSON number or a
/// decimal string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum NumericReading {
    Number(f64),
    Text(String),
}

impl NumericReading {
    /// Absent and `null` readings resolve to `0.0`.
    fn resolve(field: &'static str, reading: Option<Self>) -> Result<f64, ReadingDecodeError> {
        let value = match reading {
            None => return Ok(0.0),
            Some(Self::Number(n)) => n,
            Some(Self::Text(s)) => s.trim().parse::<f64>().map_err(|_| {
                ReadingDecodeError::NotNumeric {
                    field,
                    value: s.clone(),
                }
            })?,
        };

        if !value.is_finite() {
            return Err(ReadingDecodeError::NonFinite { field });
        }
        Ok(value)
    }
}

/// Response body of `GET {base}/meters/{id}/`.
///
/// Identifying fields and `meter_data` are mandatory; a missing one fails
/// deserialization. Unknown fields are ignored.
#[derive(Debug, Deserialize)]
pub struct MeterReadingResponse {
    pub meter_name: String,
    pub meter_data: Map<String, Value>,
    pub meter_day_of_week: String,
    pub reading_date: String,
    pub model: String,
    pub address: String,
    pub firmware: String,
    #[serde(default)]
    pub total_watt_hour: Option<NumericReading>,
    #[serde(default)]
    pub voltage: Option<NumericReading>,
    #[serde(default)]
    pub amps: Option<NumericReading>,
    #[serde(default)]
    pub total_power_watts: Option<NumericReading>,
    #[serde(default)]
    pub ct_ratio: Option<NumericReading>,
    #[serde(default)]
    pub frequency_hz: Option<NumericReading>,
}

impl TryFrom<MeterReadingResponse> for MeterSnapshot {
    type Error = ReadingDecodeError;

    fn try_from(r: MeterReadingResponse) -> Result<Self, Self::Error> {
        Ok(MeterSnapshot {
            total_watt_hour: NumericReading::resolve("total_watt_hour", r.total_watt_hour)?,
            voltage: NumericReading::resolve("voltage", r.voltage)?,
            amps: NumericReading::resolve("amps", r.amps)?,
            total_power_watts: NumericReading::resolve("total_power_watts", r.total_power_watts)?,
            ct_ratio: NumericReading::resolve("ct_ratio", r.ct_ratio)?,
            frequency_hz: NumericReading::resolve("frequency_hz", r.frequency_hz)?,
            meter_name: r.meter_name,
            meter_data: r.meter_data,
            meter_day_of_week: r.meter_day_of_week,
            reading_date: r.reading_date,
            model: r.model,
            address: r.address,
            firmware: r.firmware,
        })
    }
}
