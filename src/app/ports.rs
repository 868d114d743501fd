//! Port traits: the hexagonal boundary between the orchestrator and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ GatewayService (domain)
//! ```
//!
//! The [`GatewayService`](super::service::GatewayService) consumes these
//! via generics injected at call sites, so the loop logic never touches the
//! WiFi driver, the MQTT client, SPI or NVS directly.
//!
//! ## Contract notes
//!
//! - Every method is expected to return promptly.  The only blocking the
//!   orchestrator performs is the bounded link-reconnect spin, and it does
//!   that itself through [`SystemPort`]'s delay.
//! - Port errors are typed; the orchestrator logs and absorbs them.

use embedded_hal::delay::DelayNs;

use super::credentials::NetworkCredentials;
use super::events::GatewayEvent;
use super::update::{UpdateEvent, UpdateRequest};
use crate::error::{LinkError, SensorError, SessionError, StorageError};

// ───────────────────────────────────────────────────────────────
// Credential store (driven adapter: NVS → domain, read-only)
// ───────────────────────────────────────────────────────────────

/// Read-only key/value provider consulted once at boot.
///
/// Implementations never write; provisioning is a separate process.
pub trait CredentialStore {
    /// Read a string value into `buf`.  Returns the number of UTF-8 bytes.
    fn read_str(&self, key: &str, buf: &mut [u8]) -> Result<usize, StorageError>;

    /// Read a raw byte blob into `buf`.  Returns the number of bytes read.
    fn read_bytes(&self, key: &str, buf: &mut [u8]) -> Result<usize, StorageError>;

    /// Read a signed 32-bit integer.
    fn read_i32(&self, key: &str) -> Result<i32, StorageError>;
}

// ───────────────────────────────────────────────────────────────
// Link port (driven adapter: domain ↔ WiFi station)
// ───────────────────────────────────────────────────────────────

/// Link-layer connectivity.
pub trait LinkPort {
    /// Issue an association request.  Does not wait for the result.
    fn begin(&mut self, credentials: &NetworkCredentials) -> Result<(), LinkError>;

    /// Whether the link is associated and has an address.
    fn link_up(&self) -> bool;
}

// ───────────────────────────────────────────────────────────────
// Session port (driven adapter: domain ↔ telemetry backend)
// ───────────────────────────────────────────────────────────────

/// Firmware state strings understood by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirmwareState {
    Downloading,
    Downloaded,
    Verified,
    Updating,
    Updated,
    Failed,
}

impl FirmwareState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Downloading => "DOWNLOADING",
            Self::Downloaded => "DOWNLOADED",
            Self::Verified => "VERIFIED",
            Self::Updating => "UPDATING",
            Self::Updated => "UPDATED",
            Self::Failed => "FAILED",
        }
    }
}

/// Application session with the telemetry backend.
///
/// The session also hosts the update capability: once
/// [`subscribe_firmware_update`](Self::subscribe_firmware_update) succeeds,
/// the transfer advances inside [`poll`](Self::poll) and its lifecycle is
/// reported back as [`UpdateEvent`]s.
pub trait SessionPort {
    /// Establish the session.  Blocks at most for the client's own
    /// connect timeout.
    fn connect(&mut self, server: &str, token: &str, port: u16) -> Result<(), SessionError>;

    /// Whether the client currently reports an established session.
    fn session_connected(&self) -> bool;

    /// Publish a serialised telemetry record.
    fn publish_telemetry(&mut self, payload: &str) -> Result<(), SessionError>;

    /// Send a single named attribute.
    fn send_attribute(&mut self, name: &str, value: f32) -> Result<(), SessionError>;

    /// Report the running firmware title and version.
    fn send_firmware_info(&mut self, title: &str, version: &str) -> Result<(), SessionError>;

    /// Report the firmware state.
    fn send_firmware_state(&mut self, state: FirmwareState) -> Result<(), SessionError>;

    /// Arm the update subscription with the given parameters.
    fn subscribe_firmware_update(&mut self, request: &UpdateRequest) -> Result<(), SessionError>;

    /// Pump internal session events; update lifecycle events are handed
    /// to `on_update` in arrival order, at most
    /// [`UPDATE_EVENTS_PER_POLL`](crate::app::update::UPDATE_EVENTS_PER_POLL)
    /// per call.
    fn poll(&mut self, on_update: &mut dyn FnMut(UpdateEvent));
}

// ───────────────────────────────────────────────────────────────
// Sensor port (driven adapter: PT100 front-end → domain)
// ───────────────────────────────────────────────────────────────

/// One raw temperature reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TemperatureReading {
    pub celsius: f32,
    /// Front-end reported a fault (open RTD, out-of-range ratio, ...).
    /// The value in `celsius` is still whatever the conversion produced.
    pub fault: bool,
}

pub trait SensorPort {
    /// One-time front-end initialisation.
    fn begin(&mut self) -> Result<(), SensorError>;

    /// Read one sample.  Never filtered.
    fn read_temperature(&mut self) -> TemperatureReading;
}

// ───────────────────────────────────────────────────────────────
// System port (driven adapter: domain → SoC)
// ───────────────────────────────────────────────────────────────

/// Delay and restart primitives of the SoC.
pub trait SystemPort: DelayNs {
    /// Hand control to the bootloader.  On hardware this never returns.
    fn restart(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → logging)
// ───────────────────────────────────────────────────────────────

/// The domain emits structured [`GatewayEvent`]s through this port.
pub trait EventSink {
    fn emit(&mut self, event: &GatewayEvent);
}
