//! Unified error types for the gateway firmware.
//!
//! Each subsystem has its own small `Copy` error enum; all of them convert
//! into [`Error`] so wiring code can funnel failures through `?` and
//! `anyhow` at the binary boundary.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    Link(LinkError),
    Session(SessionError),
    Sensor(SensorError),
    Storage(StorageError),
    Ota(crate::ota::OtaError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Link(e) => write!(f, "link: {e}"),
            Self::Session(e) => write!(f, "session: {e}"),
            Self::Sensor(e) => write!(f, "sensor: {e}"),
            Self::Storage(e) => write!(f, "storage: {e}"),
            Self::Ota(e) => write!(f, "ota: {e}"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Link layer (WiFi association)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkError {
    /// Driver refused the station configuration.
    InvalidConfig,
    /// Association request could not be issued.
    BeginFailed,
    /// Driver or peripheral initialisation failed.
    InitFailed,
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidConfig => write!(f, "station configuration rejected"),
            Self::BeginFailed => write!(f, "association request failed"),
            Self::InitFailed => write!(f, "WiFi driver init failed"),
        }
    }
}

impl From<LinkError> for Error {
    fn from(e: LinkError) -> Self {
        Self::Link(e)
    }
}

// ---------------------------------------------------------------------------
// Session layer (MQTT / ThingsBoard)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionError {
    /// Broker refused or never acknowledged the connection.
    ConnectFailed,
    /// Operation requires an established session.
    NotConnected,
    /// Publish could not be queued.
    PublishFailed,
    /// Topic subscription failed.
    SubscribeFailed,
    /// Payload could not be serialised or exceeded the buffer.
    Encoding,
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectFailed => write!(f, "session connect failed"),
            Self::NotConnected => write!(f, "session not connected"),
            Self::PublishFailed => write!(f, "publish failed"),
            Self::SubscribeFailed => write!(f, "subscribe failed"),
            Self::Encoding => write!(f, "payload encoding failed"),
        }
    }
}

impl From<SessionError> for Error {
    fn from(e: SessionError) -> Self {
        Self::Session(e)
    }
}

// ---------------------------------------------------------------------------
// Sensor front-end
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    /// SPI transaction with the front-end failed.
    BusFailed,
}

impl fmt::Display for SensorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BusFailed => write!(f, "SPI transaction failed"),
        }
    }
}

impl From<SensorError> for Error {
    fn from(e: SensorError) -> Self {
        Self::Sensor(e)
    }
}

// ---------------------------------------------------------------------------
// Credential storage
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// Requested key does not exist.
    NotFound,
    /// Stored value does not fit the destination buffer or type.
    InvalidLength,
    /// Generic I/O error.
    IoError,
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "key not found"),
            Self::InvalidLength => write!(f, "stored value has unexpected length"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

impl From<crate::ota::OtaError> for Error {
    fn from(e: crate::ota::OtaError) -> Self {
        Self::Ota(e)
    }
}
