//! Telemetry sample and its wire payload.

use serde::Serialize;

use super::ports::TemperatureReading;
use crate::error::SessionError;

/// One ephemeral sample: read, maybe published, then discarded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TelemetrySample {
    pub temperature_celsius: f32,
    pub fault: bool,
}

impl From<TemperatureReading> for TelemetrySample {
    fn from(r: TemperatureReading) -> Self {
        Self {
            temperature_celsius: r.celsius,
            fault: r.fault,
        }
    }
}

#[derive(Serialize)]
struct TelemetryPayload {
    temperature_celsius: f32,
}

impl TelemetrySample {
    /// Serialise to the single-key record `{"temperature_celsius": <float>}`.
    ///
    /// The fault flag is not part of the payload; the raw value is forwarded.
    pub fn to_json(&self) -> Result<String, SessionError> {
        serde_json::to_string(&TelemetryPayload {
            temperature_celsius: self.temperature_celsius,
        })
        .map_err(|_| SessionError::Encoding)
    }
}
