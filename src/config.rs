//! Gateway configuration parameters.
//!
//! Every timing and protocol constant lives here as a named constant.
//! [`GatewayConfig::default()`] assembles them; tests build shortened
//! variants instead of patching literals inside the orchestrator.

use serde::{Deserialize, Serialize};

// --- Timing ---

/// Connectivity supervisor period (milliseconds).
pub const CONNECTION_CHECK_MS: u64 = 1_000;
/// Telemetry publish period (milliseconds), 15 minutes.
pub const TELEMETRY_INTERVAL_MS: u64 = 900_000;
/// Emit the OTA progress attribute on every Nth progress callback.
pub const OTA_PROGRESS_EVERY: u32 = 10;
/// Delay between link status polls during a blocking reconnect.
pub const LINK_RETRY_DELAY_MS: u32 = 500;
/// Re-issue the link association request after this many unsuccessful polls.
pub const LINK_REBEGIN_POLLS: u32 = 20;

// --- OTA ---

pub const OTA_RETRY_LIMIT: u8 = 24;
pub const OTA_CHUNK_SIZE: u16 = 4096;
/// Re-request a firmware chunk that has not arrived within this window.
pub const OTA_CHUNK_TIMEOUT_MS: u64 = 10_000;

// --- Backend ---

pub const MQTT_SERVER: &str = "mqtt.thingsboard.cloud";
pub const MQTT_PORT: u16 = 1883;
pub const MQTT_BUFFER_SIZE: u16 = 512;
/// Upper bound on how long a session connect waits for the broker ack.
pub const MQTT_CONNECT_TIMEOUT_MS: u32 = 5_000;

// --- PT100 front-end ---

pub const PT100_NOMINAL_RESISTANCE: f32 = 100.0;
pub const PT100_REFERENCE_RESISTOR: f32 = 430.0;

// ───────────────────────────────────────────────────────────────
// Device identity
// ───────────────────────────────────────────────────────────────

/// Product variant, fixed at compile time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceType {
    ColdStorage,
    Generic,
}

#[cfg(not(feature = "generic-device"))]
pub const DEVICE_TYPE: DeviceType = DeviceType::ColdStorage;
#[cfg(feature = "generic-device")]
pub const DEVICE_TYPE: DeviceType = DeviceType::Generic;

/// Firmware version reported to the backend.
pub const FIRMWARE_VERSION: &str = env!("CARGO_PKG_VERSION");

impl DeviceType {
    /// Short class tag used in logs.
    pub const fn tag(self) -> &'static str {
        match self {
            Self::ColdStorage => "cold_storage",
            Self::Generic => "generic",
        }
    }

    /// Firmware title the backend matches OTA packages against.
    pub const fn firmware_title(self) -> &'static str {
        match self {
            Self::ColdStorage => "PT100_Cold_Storage",
            Self::Generic => "PT100_Generic",
        }
    }
}

/// Immutable identity of the running firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub device_type: DeviceType,
    pub title: &'static str,
    pub version: &'static str,
}

impl DeviceIdentity {
    pub const fn for_type(device_type: DeviceType) -> Self {
        Self {
            device_type,
            title: device_type.firmware_title(),
            version: FIRMWARE_VERSION,
        }
    }

    /// Identity selected by the `generic-device` build feature.
    pub const fn current() -> Self {
        Self::for_type(DEVICE_TYPE)
    }
}

// ───────────────────────────────────────────────────────────────
// Grouped configuration
// ───────────────────────────────────────────────────────────────

/// Orchestrator timer periods and throttle factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timing {
    pub connection_check_ms: u64,
    pub telemetry_interval_ms: u64,
    pub progress_report_every: u32,
    pub link_retry_delay_ms: u32,
    pub link_rebegin_polls: u32,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            connection_check_ms: CONNECTION_CHECK_MS,
            telemetry_interval_ms: TELEMETRY_INTERVAL_MS,
            progress_report_every: OTA_PROGRESS_EVERY,
            link_retry_delay_ms: LINK_RETRY_DELAY_MS,
            link_rebegin_polls: LINK_REBEGIN_POLLS,
        }
    }
}

/// Telemetry backend endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendConfig {
    pub server: heapless::String<64>,
    pub port: u16,
    pub buffer_size: u16,
}

impl Default for BackendConfig {
    fn default() -> Self {
        let mut server = heapless::String::new();
        // MQTT_SERVER is shorter than the capacity.
        let _ = server.push_str(MQTT_SERVER);
        Self {
            server,
            port: MQTT_PORT,
            buffer_size: MQTT_BUFFER_SIZE,
        }
    }
}

/// Parameters handed to the update session when it is armed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OtaParams {
    pub retry_limit: u8,
    pub chunk_size: u16,
}

impl Default for OtaParams {
    fn default() -> Self {
        Self {
            retry_limit: OTA_RETRY_LIMIT,
            chunk_size: OTA_CHUNK_SIZE,
        }
    }
}

/// Calibration constants passed to the PT100 front-end.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pt100Calibration {
    pub nominal_ohms: f32,
    pub reference_ohms: f32,
}

impl Default for Pt100Calibration {
    fn default() -> Self {
        Self {
            nominal_ohms: PT100_NOMINAL_RESISTANCE,
            reference_ohms: PT100_REFERENCE_RESISTOR,
        }
    }
}

/// Everything the gateway service needs besides credentials.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub timing: Timing,
    pub backend: BackendConfig,
    pub ota: OtaParams,
    pub pt100: Pt100Calibration,
}
