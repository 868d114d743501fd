//! PT100 gateway firmware library.
//!
//! Exposes the orchestrator, ports and host-simulated adapters for
//! integration testing. All ESP-IDF-specific code is guarded by
//! `#[cfg(target_os = "espidf")]` within each module.

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod config;
pub mod error;
pub mod ota;
pub mod pins;
pub mod scheduler;
pub mod sensors;
