//! ThingsBoard device session over MQTT.
//!
//! Implements [`SessionPort`] on top of any [`MqttTransport`]:
//!
//! | Operation             | Topic                          | Payload                                   |
//! |-----------------------|--------------------------------|-------------------------------------------|
//! | telemetry             | `v1/devices/me/telemetry`      | caller's JSON record                      |
//! | attribute             | `v1/devices/me/attributes`     | `{"<name>":<value>}`                      |
//! | firmware info         | `v1/devices/me/telemetry`      | `{"current_fw_title":..,"current_fw_version":..}` |
//! | firmware state        | `v1/devices/me/telemetry`      | `{"current_fw_state":"UPDATED"}`          |
//! | firmware download     | `v2/fw/request/{id}/chunk/{n}` | see [`firmware`]                          |
//!
//! Inbound traffic is drained from the transport's [`Inbox`](inbox::Inbox)
//! inside [`SessionPort::poll`], on the gateway loop thread.

pub mod firmware;
pub mod inbox;
pub mod transport;

use std::collections::BTreeMap;

use log::{debug, info, warn};

use crate::adapters::time::MonotonicClock;
use crate::app::ports::{FirmwareState, SessionPort};
use crate::app::update::{UpdateEvent, UpdateRequest};
use crate::error::SessionError;

use self::firmware::FirmwareUpdater;
use self::inbox::InboundEvent;
use self::transport::MqttTransport;

pub const TELEMETRY_TOPIC: &str = "v1/devices/me/telemetry";
pub const ATTRIBUTES_TOPIC: &str = "v1/devices/me/attributes";
pub const ATTRIBUTE_REQUEST_PREFIX: &str = "v1/devices/me/attributes/request/";
pub const ATTRIBUTE_RESPONSE_PREFIX: &str = "v1/devices/me/attributes/response/";
pub const ATTRIBUTE_RESPONSE_SUBSCRIBE: &str = "v1/devices/me/attributes/response/+";
pub const FIRMWARE_RESPONSE_PREFIX: &str = "v2/fw/response/";
pub const FIRMWARE_RESPONSE_SUBSCRIBE: &str = "v2/fw/response/+/chunk/+";

/// Maximum inbound events handled per `poll`.  Anything left waits for
/// the next loop iteration.
const POLL_BUDGET: usize = inbox::INBOX_DEPTH;

// ── Payloads ──────────────────────────────────────────────────

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, SessionError> {
    serde_json::to_string(value).map_err(|_| SessionError::Encoding)
}

pub fn attribute_payload(name: &str, value: f32) -> Result<String, SessionError> {
    let mut map = BTreeMap::new();
    map.insert(name, value);
    to_json(&map)
}

pub fn firmware_info_payload(title: &str, version: &str) -> Result<String, SessionError> {
    let mut map = BTreeMap::new();
    map.insert("current_fw_title", title);
    map.insert("current_fw_version", version);
    to_json(&map)
}

pub fn firmware_state_payload(state: FirmwareState) -> String {
    format!(r#"{{"current_fw_state":"{}"}}"#, state.as_str())
}

// ── Session ───────────────────────────────────────────────────

pub struct ThingsBoardSession<T: MqttTransport, C: MonotonicClock> {
    transport: T,
    clock: C,
    client_id: heapless::String<16>,
    updater: FirmwareUpdater,
}

impl<T: MqttTransport, C: MonotonicClock> ThingsBoardSession<T, C> {
    pub fn new(transport: T, clock: C, client_id: &str) -> Self {
        let mut id = heapless::String::new();
        for c in client_id.chars() {
            if id.push(c).is_err() {
                break;
            }
        }
        Self {
            transport,
            clock,
            client_id: id,
            updater: FirmwareUpdater::new(),
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn updater(&self) -> &FirmwareUpdater {
        &self.updater
    }

    fn publish(&mut self, topic: &str, payload: &str) -> Result<(), SessionError> {
        if !self.transport.is_open() {
            return Err(SessionError::NotConnected);
        }
        self.transport.publish(topic, payload.as_bytes())
    }
}

impl<T: MqttTransport, C: MonotonicClock> SessionPort for ThingsBoardSession<T, C> {
    fn connect(&mut self, server: &str, token: &str, port: u16) -> Result<(), SessionError> {
        info!("TB: connecting to {}:{} as {}", server, port, self.client_id);
        self.transport.open(server, port, &self.client_id, token)
    }

    fn session_connected(&self) -> bool {
        self.transport.is_open()
    }

    fn publish_telemetry(&mut self, payload: &str) -> Result<(), SessionError> {
        self.publish(TELEMETRY_TOPIC, payload)
    }

    fn send_attribute(&mut self, name: &str, value: f32) -> Result<(), SessionError> {
        let payload = attribute_payload(name, value)?;
        self.publish(ATTRIBUTES_TOPIC, &payload)
    }

    fn send_firmware_info(&mut self, title: &str, version: &str) -> Result<(), SessionError> {
        let payload = firmware_info_payload(title, version)?;
        self.publish(TELEMETRY_TOPIC, &payload)
    }

    fn send_firmware_state(&mut self, state: FirmwareState) -> Result<(), SessionError> {
        self.publish(TELEMETRY_TOPIC, &firmware_state_payload(state))
    }

    fn subscribe_firmware_update(&mut self, request: &UpdateRequest) -> Result<(), SessionError> {
        if !self.transport.is_open() {
            return Err(SessionError::NotConnected);
        }
        self.updater.arm(*request, &mut self.transport)
    }

    fn poll(&mut self, on_update: &mut dyn FnMut(UpdateEvent)) {
        for _ in 0..POLL_BUDGET {
            let Some(event) = self.transport.inbox().pop() else {
                break;
            };
            match event {
                InboundEvent::Connected => info!("TB: broker connected"),
                InboundEvent::Disconnected => warn!("TB: broker connection lost"),
                InboundEvent::Message { topic, payload } => {
                    let now = self.clock.now_ms();
                    let handled = self.updater.on_message(
                        &topic,
                        &payload,
                        now,
                        &mut self.transport,
                        &mut *on_update,
                    );
                    if !handled {
                        debug!("TB: unhandled message on {} ({} B)", topic, payload.len());
                    }
                }
            }
        }

        if self.transport.is_open() {
            let now = self.clock.now_ms();
            self.updater.on_tick(now, &mut self.transport, on_update);
        }
    }
}
