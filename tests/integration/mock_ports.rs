//! Mock port adapters for integration tests.
//!
//! Every mock records its calls so tests can assert on the full history
//! without a radio, a broker or an SPI bus.

use std::cell::Cell;
use std::collections::VecDeque;
use std::rc::Rc;

use embedded_hal::delay::DelayNs;
use pt100_gateway::adapters::nvs::NvsCredentialStore;
use pt100_gateway::adapters::time::MonotonicClock;
use pt100_gateway::app::credentials::{KEY_PASSWORD, KEY_SSID, KEY_TOKEN, NetworkCredentials};
use pt100_gateway::app::events::{ConnectionState, GatewayEvent};
use pt100_gateway::app::ports::{
    EventSink, FirmwareState, LinkPort, SensorPort, SessionPort, SystemPort, TemperatureReading,
};
use pt100_gateway::app::service::GatewayService;
use pt100_gateway::app::update::{UpdateEvent, UpdateRequest};
use pt100_gateway::config::{DeviceIdentity, GatewayConfig};
use pt100_gateway::error::{LinkError, SensorError, SessionError};

// ── MockNet (LinkPort + SessionPort) ──────────────────────────

pub struct MockNet {
    /// `link_up` returns true starting with this check (1 = first).
    link_up_on_check: Cell<u32>,
    link_checks: Cell<u32>,
    pub begins: Vec<NetworkCredentials>,
    /// Scripted connect outcomes; empty means success.
    pub connect_script: VecDeque<bool>,
    pub connects: u32,
    pub last_token: String,
    pub session_up: bool,
    pub telemetry: Vec<String>,
    pub attributes: Vec<(String, f32)>,
    pub firmware_info: Vec<(String, String)>,
    pub firmware_states: Vec<FirmwareState>,
    pub subscriptions: Vec<UpdateRequest>,
    pub pending_updates: VecDeque<UpdateEvent>,
    pub polls: u32,
}

#[allow(dead_code)]
impl MockNet {
    /// Link already associated; every session connect succeeds.
    pub fn new() -> Self {
        Self::link_up_after(1)
    }

    pub fn link_up_after(checks: u32) -> Self {
        Self {
            link_up_on_check: Cell::new(checks),
            link_checks: Cell::new(0),
            begins: Vec::new(),
            connect_script: VecDeque::new(),
            connects: 0,
            last_token: String::new(),
            session_up: false,
            telemetry: Vec::new(),
            attributes: Vec::new(),
            firmware_info: Vec::new(),
            firmware_states: Vec::new(),
            subscriptions: Vec::new(),
            pending_updates: VecDeque::new(),
            polls: 0,
        }
    }

    /// Drop the link; it comes back on the `checks`-th check from now.
    pub fn drop_link(&mut self, checks: u32) {
        self.session_up = false;
        self.link_up_on_check
            .set(self.link_checks.get() + checks.max(1));
    }

    pub fn fail_next_connects(&mut self, n: usize) {
        self.connect_script.extend(std::iter::repeat_n(false, n));
    }

    pub fn queue_update(&mut self, event: UpdateEvent) {
        self.pending_updates.push_back(event);
    }

    pub fn progress_attributes(&self) -> Vec<f32> {
        self.attributes
            .iter()
            .filter(|(n, _)| n == "OTA_Progress")
            .map(|(_, v)| *v)
            .collect()
    }
}

impl LinkPort for MockNet {
    fn begin(&mut self, credentials: &NetworkCredentials) -> Result<(), LinkError> {
        self.begins.push(credentials.clone());
        if credentials.ssid.is_empty() {
            return Err(LinkError::InvalidConfig);
        }
        Ok(())
    }

    fn link_up(&self) -> bool {
        let n = self.link_checks.get() + 1;
        self.link_checks.set(n);
        n >= self.link_up_on_check.get()
    }
}

impl SessionPort for MockNet {
    fn connect(&mut self, _server: &str, token: &str, _port: u16) -> Result<(), SessionError> {
        self.connects += 1;
        self.last_token = token.to_string();
        if self.connect_script.pop_front().unwrap_or(true) {
            self.session_up = true;
            Ok(())
        } else {
            self.session_up = false;
            Err(SessionError::ConnectFailed)
        }
    }

    fn session_connected(&self) -> bool {
        self.session_up
    }

    fn publish_telemetry(&mut self, payload: &str) -> Result<(), SessionError> {
        if !self.session_up {
            return Err(SessionError::NotConnected);
        }
        self.telemetry.push(payload.to_string());
        Ok(())
    }

    fn send_attribute(&mut self, name: &str, value: f32) -> Result<(), SessionError> {
        self.attributes.push((name.to_string(), value));
        Ok(())
    }

    fn send_firmware_info(&mut self, title: &str, version: &str) -> Result<(), SessionError> {
        self.firmware_info.push((title.to_string(), version.to_string()));
        Ok(())
    }

    fn send_firmware_state(&mut self, state: FirmwareState) -> Result<(), SessionError> {
        self.firmware_states.push(state);
        Ok(())
    }

    fn subscribe_firmware_update(&mut self, request: &UpdateRequest) -> Result<(), SessionError> {
        self.subscriptions.push(*request);
        Ok(())
    }

    fn poll(&mut self, on_update: &mut dyn FnMut(UpdateEvent)) {
        self.polls += 1;
        while let Some(ev) = self.pending_updates.pop_front() {
            on_update(ev);
        }
    }
}

// ── MockSensor ────────────────────────────────────────────────

pub struct MockSensor {
    pub reading: TemperatureReading,
    pub begins: u32,
    pub reads: u32,
    pub fail_begin: bool,
}

#[allow(dead_code)]
impl MockSensor {
    pub fn new(celsius: f32) -> Self {
        Self {
            reading: TemperatureReading {
                celsius,
                fault: false,
            },
            begins: 0,
            reads: 0,
            fail_begin: false,
        }
    }

    pub fn set(&mut self, celsius: f32, fault: bool) {
        self.reading = TemperatureReading { celsius, fault };
    }
}

impl SensorPort for MockSensor {
    fn begin(&mut self) -> Result<(), SensorError> {
        self.begins += 1;
        if self.fail_begin {
            Err(SensorError::BusFailed)
        } else {
            Ok(())
        }
    }

    fn read_temperature(&mut self) -> TemperatureReading {
        self.reads += 1;
        self.reading
    }
}

// ── MockSystem ────────────────────────────────────────────────

#[derive(Default)]
pub struct MockSystem {
    pub delay_calls: u32,
    pub slept_ns: u64,
    pub restarts: u32,
}

impl DelayNs for MockSystem {
    fn delay_ns(&mut self, ns: u32) {
        self.slept_ns += u64::from(ns);
    }

    fn delay_ms(&mut self, ms: u32) {
        self.delay_calls += 1;
        self.slept_ns += u64::from(ms) * 1_000_000;
    }
}

impl SystemPort for MockSystem {
    fn restart(&mut self) {
        self.restarts += 1;
    }
}

// ── RecordingSink ─────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingSink {
    pub events: Vec<GatewayEvent>,
}

#[allow(dead_code)]
impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, pred: impl Fn(&GatewayEvent) -> bool) -> usize {
        self.events.iter().filter(|e| pred(e)).count()
    }

    pub fn transitions(&self) -> Vec<(ConnectionState, ConnectionState)> {
        self.events
            .iter()
            .filter_map(|e| match e {
                GatewayEvent::ConnectionChanged { from, to } => Some((*from, *to)),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &GatewayEvent) {
        self.events.push(event.clone());
    }
}

// ── ManualClock ───────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct ManualClock(Rc<Cell<u64>>);

#[allow(dead_code)]
impl ManualClock {
    pub fn set(&self, ms: u64) {
        self.0.set(ms);
    }
}

impl MonotonicClock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.0.get()
    }
}

// ── Fixtures ──────────────────────────────────────────────────

pub const TOKEN: &str = "A1_TEST_TOKEN";

pub fn provisioned_store() -> NvsCredentialStore {
    let mut store = NvsCredentialStore::new().unwrap();
    store.seed_str(KEY_SSID, "ColdRoom-AP");
    store.seed_str(KEY_PASSWORD, "freezer-pass");
    store.seed_str(KEY_TOKEN, TOKEN);
    store
}

pub struct Rig {
    pub service: GatewayService,
    pub net: MockNet,
    pub sensor: MockSensor,
    pub system: MockSystem,
    pub sink: RecordingSink,
}

#[allow(dead_code)]
impl Rig {
    /// Boot with provisioned credentials and a link that is already up.
    pub fn boot() -> Self {
        Self::boot_with(MockNet::new())
    }

    pub fn boot_with(mut net: MockNet) -> Self {
        let mut sensor = MockSensor::new(-18.25);
        let mut system = MockSystem::default();
        let mut sink = RecordingSink::new();
        let service = GatewayService::boot(
            GatewayConfig::default(),
            DeviceIdentity::current(),
            &provisioned_store(),
            &mut net,
            &mut sensor,
            &mut system,
            &mut sink,
        );
        Self {
            service,
            net,
            sensor,
            system,
            sink,
        }
    }

    pub fn tick(&mut self, now_ms: u64) {
        self.service.tick(
            now_ms,
            &mut self.net,
            &mut self.sensor,
            &mut self.system,
            &mut self.sink,
        );
    }

    pub fn state(&self) -> ConnectionState {
        self.service.connection_state()
    }
}
