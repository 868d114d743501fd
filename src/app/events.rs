//! Outbound gateway events.
//!
//! The [`GatewayService`](super::service::GatewayService) emits these
//! through the [`EventSink`](super::ports::EventSink) port.  Adapters on
//! the other side decide what to do with them (serial log today).

use crate::config::DeviceIdentity;
use crate::error::{LinkError, SessionError};

use super::telemetry::TelemetrySample;

/// Derived connectivity of the gateway.
///
/// ```text
///  Disconnected ──link up──▶ LinkUp ──session up──▶ Connected
///       ▲                      ▲  └───────◀── session drop ──┘
///       └──── link drop ───────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    /// Link associated, application session down.
    LinkUp,
    Connected,
}

/// Structured events emitted by the gateway core.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayEvent {
    /// Boot sequence finished; the loop is about to start.
    Booted(DeviceIdentity),

    /// The supervisor observed a connectivity transition.
    ConnectionChanged {
        from: ConnectionState,
        to: ConnectionState,
    },

    /// Link association request could not be issued.
    LinkBeginFailed(LinkError),

    /// Link came back after `polls` status checks.
    LinkRestored { polls: u32 },

    /// Session connect attempt failed; retried on the next check.
    SessionFailed(SessionError),

    /// A session-side operation (metadata, subscribe) failed.
    SessionOpFailed {
        op: &'static str,
        error: SessionError,
    },

    /// Update subscription armed with fresh callbacks.
    UpdateArmed,

    /// A telemetry sample was published.
    TelemetryPublished(TelemetrySample),

    /// A sample was read while the session was down and discarded.
    TelemetryDropped(TelemetrySample),

    /// Throttled update progress report.
    UpdateProgress { percent: f32 },

    /// Update finished successfully; restart follows.
    UpdateSucceeded,

    /// Update failed; the running firmware stays in place.
    UpdateFailed,
}
