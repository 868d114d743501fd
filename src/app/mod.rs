//! Application core: pure orchestration logic, zero I/O.
//!
//! This module contains the gateway's rules: connectivity supervision,
//! telemetry pacing and the update lifecycle.  All interaction with the
//! radio, the broker, the sensor and flash happens through **port traits**
//! defined in [`ports`], keeping this layer testable without hardware.

pub mod credentials;
pub mod events;
pub mod ports;
pub mod service;
pub mod telemetry;
pub mod update;
