//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing structured gateway events to the
//! ESP-IDF logger (UART / USB-CDC in production), one tagged line each.

use log::{info, warn};

use crate::app::events::GatewayEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`GatewayEvent`] to the serial console.
#[derive(Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &GatewayEvent) {
        match event {
            GatewayEvent::Booted(id) => {
                info!(
                    "BOOT | {} v{} | class={}",
                    id.title,
                    id.version,
                    id.device_type.tag()
                );
            }
            GatewayEvent::ConnectionChanged { from, to } => {
                info!("LINK | {:?} -> {:?}", from, to);
            }
            GatewayEvent::LinkBeginFailed(e) => {
                warn!("LINK | begin failed: {}", e);
            }
            GatewayEvent::LinkRestored { polls } => {
                info!("LINK | up after {} polls", polls);
            }
            GatewayEvent::SessionFailed(e) => {
                warn!("SESSION | connect failed: {}", e);
            }
            GatewayEvent::SessionOpFailed { op, error } => {
                warn!("SESSION | {} failed: {}", op, error);
            }
            GatewayEvent::UpdateArmed => {
                info!("OTA | update subscription armed");
            }
            GatewayEvent::TelemetryPublished(s) => {
                info!(
                    "TELEM | T={:.2}\u{00b0}C{}",
                    s.temperature_celsius,
                    if s.fault { " (sensor fault)" } else { "" }
                );
            }
            GatewayEvent::TelemetryDropped(s) => {
                info!(
                    "TELEM | dropped T={:.2}\u{00b0}C, session down",
                    s.temperature_celsius
                );
            }
            GatewayEvent::UpdateProgress { percent } => {
                info!("OTA | {:.1}%", percent);
            }
            GatewayEvent::UpdateSucceeded => {
                info!("OTA | completed successfully, restarting");
            }
            GatewayEvent::UpdateFailed => {
                warn!("OTA | update failed, keeping current firmware");
            }
        }
    }
}
