//! Gateway service: the cooperative orchestration loop.
//!
//! [`GatewayService`] owns both interval timers, the session-connected
//! flag, the derived [`ConnectionState`] and the update tracker.  All I/O
//! flows through port traits injected at call sites, so the whole loop is
//! testable with mock adapters and a synthetic clock.
//!
//! ```text
//!   LinkPort + SessionPort ◀─┐
//!                            │  ┌──────────────────────────────┐
//!   SensorPort ─────────────▶├──│        GatewayService        │──▶ EventSink
//!                            │  │ supervisor · telemetry · OTA │
//!   SystemPort ◀─────────────┘  └──────────────────────────────┘
//! ```
//!
//! One [`tick`](GatewayService::tick) runs, in order:
//!
//! 1. connectivity supervisor, when its timer is due;
//! 2. telemetry publisher, when its timer is due or the boot seed is set;
//! 3. the session's event pump, dispatching update lifecycle events.
//!
//! Both timers are marked whenever they fire, whatever the guarded action
//! did.  A failed session connect therefore retries one full check period
//! later, not on the next tick.

use log::{info, warn};

use crate::config::{DeviceIdentity, GatewayConfig};
use crate::scheduler::IntervalTimer;

use super::credentials::{self, NetworkCredentials, SessionToken};
use super::events::{ConnectionState, GatewayEvent};
use super::ports::{
    CredentialStore, EventSink, FirmwareState, LinkPort, SensorPort, SessionPort, SystemPort,
};
use super::telemetry::TelemetrySample;
use super::update::{
    UPDATE_EVENTS_PER_POLL, UpdateAction, UpdateEvent, UpdateRequest, UpdateTracker,
};

/// Attribute name carrying the throttled update percentage.
pub const PROGRESS_ATTRIBUTE: &str = "OTA_Progress";

// ───────────────────────────────────────────────────────────────
// GatewayService
// ───────────────────────────────────────────────────────────────

pub struct GatewayService {
    config: GatewayConfig,
    identity: DeviceIdentity,
    credentials: NetworkCredentials,
    token: SessionToken,
    connectivity_timer: IntervalTimer,
    telemetry_timer: IntervalTimer,
    /// Boot seed: publish on the first opportunity regardless of the timer.
    send_immediately: bool,
    /// Set only by the supervisor; read by the telemetry publisher.
    session_connected: bool,
    state: ConnectionState,
    /// Present once the update subscription has been armed.
    tracker: Option<UpdateTracker>,
}

impl GatewayService {
    // ── Boot ──────────────────────────────────────────────────

    /// Run the one-time boot sequence and return the ready service.
    ///
    /// Loads credentials (defaults on any missing key), initialises the
    /// sensor and blocks until the link is up.
    pub fn boot(
        config: GatewayConfig,
        identity: DeviceIdentity,
        store: &impl CredentialStore,
        link: &mut impl LinkPort,
        sensor: &mut impl SensorPort,
        system: &mut impl SystemPort,
        sink: &mut impl EventSink,
    ) -> Self {
        let credentials = NetworkCredentials::load(store);
        let token = credentials::load_token(store);
        info!(
            "Boot: {} v{} ({}), ssid='{}'",
            identity.title,
            identity.version,
            identity.device_type.tag(),
            credentials.ssid
        );

        let timing = config.timing;
        let mut service = Self {
            config,
            identity,
            credentials,
            token,
            connectivity_timer: IntervalTimer::due_immediately(timing.connection_check_ms),
            telemetry_timer: IntervalTimer::due_immediately(timing.telemetry_interval_ms),
            send_immediately: true,
            session_connected: false,
            state: ConnectionState::Disconnected,
            tracker: None,
        };

        service.restore_link(link, system, sink);

        if let Err(e) = sensor.begin() {
            warn!("Boot: sensor init failed ({}); readings will carry the fault flag", e);
        }

        sink.emit(&GatewayEvent::Booted(identity));
        service
    }

    // ── Per-tick orchestration ────────────────────────────────

    /// Run one loop iteration at `now_ms` (monotonic milliseconds).
    ///
    /// `net` satisfies both [`LinkPort`] and [`SessionPort`]: the session
    /// rides on the link, and one adapter owns both.
    pub fn tick(
        &mut self,
        now_ms: u64,
        net: &mut (impl LinkPort + SessionPort),
        sensor: &mut impl SensorPort,
        system: &mut impl SystemPort,
        sink: &mut impl EventSink,
    ) {
        if self.connectivity_timer.fire_if_due(now_ms) {
            self.supervise(net, system, sink);
        }

        if self.send_immediately || self.telemetry_timer.is_due(now_ms) {
            self.send_immediately = false;
            self.telemetry_timer.mark(now_ms);
            self.publish_telemetry(net, sensor, sink);
        }

        self.pump_session(net, system, sink);
    }

    // ── Connectivity supervisor ───────────────────────────────

    fn supervise(
        &mut self,
        net: &mut (impl LinkPort + SessionPort),
        system: &mut impl SystemPort,
        sink: &mut impl EventSink,
    ) {
        if !net.link_up() {
            self.session_connected = false;
            self.set_state(ConnectionState::Disconnected, sink);
            self.restore_link(net, system, sink);
        }

        if net.session_connected() {
            self.set_state(ConnectionState::Connected, sink);
            if !self.session_connected {
                // Client came up on its own after a failed connect.
                info!("Session established in background; arming");
                self.session_connected = true;
                self.arm_update(net, sink);
            }
            return;
        }

        self.session_connected = false;
        self.set_state(ConnectionState::LinkUp, sink);

        let backend = &self.config.backend;
        if let Err(e) = net.connect(&backend.server, &self.token, backend.port) {
            warn!("Session connect to {}:{} failed: {}", backend.server, backend.port, e);
            sink.emit(&GatewayEvent::SessionFailed(e));
            return;
        }

        self.session_connected = true;
        self.set_state(ConnectionState::Connected, sink);
        self.arm_update(net, sink);
    }

    /// Report identity and state, then register a fresh update tracker.
    fn arm_update(&mut self, session: &mut impl SessionPort, sink: &mut impl EventSink) {
        if let Err(e) = session.send_firmware_info(self.identity.title, self.identity.version) {
            sink.emit(&GatewayEvent::SessionOpFailed {
                op: "firmware_info",
                error: e,
            });
        }
        if let Err(e) = session.send_firmware_state(FirmwareState::Updated) {
            sink.emit(&GatewayEvent::SessionOpFailed {
                op: "firmware_state",
                error: e,
            });
        }

        let request = UpdateRequest::new(&self.identity, &self.config.ota);
        match session.subscribe_firmware_update(&request) {
            Ok(()) => {
                self.tracker = Some(UpdateTracker::new(self.config.timing.progress_report_every));
                sink.emit(&GatewayEvent::UpdateArmed);
            }
            Err(e) => sink.emit(&GatewayEvent::SessionOpFailed {
                op: "firmware_subscribe",
                error: e,
            }),
        }
    }

    /// Issue an association request and spin until the link reports up.
    fn restore_link(
        &mut self,
        link: &mut impl LinkPort,
        system: &mut impl SystemPort,
        sink: &mut impl EventSink,
    ) {
        self.begin_link(link, sink);

        let rebegin_every = self.config.timing.link_rebegin_polls;
        let mut polls: u32 = 0;
        while !link.link_up() {
            system.delay_ms(self.config.timing.link_retry_delay_ms);
            polls = polls.saturating_add(1);
            if rebegin_every > 0 && polls % rebegin_every == 0 {
                self.begin_link(link, sink);
            }
        }

        sink.emit(&GatewayEvent::LinkRestored { polls });
        self.set_state(ConnectionState::LinkUp, sink);
    }

    fn begin_link(&self, link: &mut impl LinkPort, sink: &mut impl EventSink) {
        if let Err(e) = link.begin(&self.credentials) {
            warn!("Link begin failed: {}", e);
            sink.emit(&GatewayEvent::LinkBeginFailed(e));
        }
    }

    fn set_state(&mut self, to: ConnectionState, sink: &mut impl EventSink) {
        if self.state != to {
            let from = self.state;
            self.state = to;
            sink.emit(&GatewayEvent::ConnectionChanged { from, to });
        }
    }

    // ── Telemetry publisher ───────────────────────────────────

    fn publish_telemetry(
        &mut self,
        session: &mut impl SessionPort,
        sensor: &mut impl SensorPort,
        sink: &mut impl EventSink,
    ) {
        let sample = TelemetrySample::from(sensor.read_temperature());

        if !self.session_connected {
            sink.emit(&GatewayEvent::TelemetryDropped(sample));
            return;
        }

        let result = sample
            .to_json()
            .and_then(|payload| session.publish_telemetry(&payload));
        match result {
            Ok(()) => sink.emit(&GatewayEvent::TelemetryPublished(sample)),
            Err(e) => sink.emit(&GatewayEvent::SessionOpFailed {
                op: "telemetry",
                error: e,
            }),
        }
    }

    // ── Session pump & update lifecycle ───────────────────────

    fn pump_session(
        &mut self,
        session: &mut impl SessionPort,
        system: &mut impl SystemPort,
        sink: &mut impl EventSink,
    ) {
        let mut events: heapless::Vec<UpdateEvent, UPDATE_EVENTS_PER_POLL> = heapless::Vec::new();
        let mut overflow: u32 = 0;
        session.poll(&mut |ev| {
            if events.push(ev).is_err() {
                overflow += 1;
            }
        });
        if overflow > 0 {
            warn!("Session delivered {} update events past the per-poll bound", overflow);
        }

        for event in events {
            let Some(tracker) = self.tracker.as_mut() else {
                warn!("Update event {:?} without an armed subscription", event);
                continue;
            };
            match tracker.on_event(event) {
                UpdateAction::None => {}
                UpdateAction::ReportProgress(percent) => {
                    if let Err(e) = session.send_attribute(PROGRESS_ATTRIBUTE, percent) {
                        warn!("Progress attribute not sent: {}", e);
                    }
                    sink.emit(&GatewayEvent::UpdateProgress { percent });
                }
                UpdateAction::Restart => {
                    sink.emit(&GatewayEvent::UpdateSucceeded);
                    system.restart();
                    return;
                }
                UpdateAction::ReportFailure => {
                    sink.emit(&GatewayEvent::UpdateFailed);
                }
            }
        }
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn connection_state(&self) -> ConnectionState {
        self.state
    }

    pub fn session_connected(&self) -> bool {
        self.session_connected
    }

    pub fn update_armed(&self) -> bool {
        self.tracker.is_some()
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    pub fn credentials(&self) -> &NetworkCredentials {
        &self.credentials
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }
}
