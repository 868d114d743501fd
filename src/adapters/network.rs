//! Pairs the link adapter with the backend session so the orchestrator can
//! drive both through one `&mut`.

use crate::app::credentials::NetworkCredentials;
use crate::app::ports::{FirmwareState, LinkPort, SessionPort};
use crate::app::update::{UpdateEvent, UpdateRequest};
use crate::error::{LinkError, SessionError};

pub struct GatewayNetwork<L: LinkPort, S: SessionPort> {
    pub link: L,
    pub session: S,
}

impl<L: LinkPort, S: SessionPort> GatewayNetwork<L, S> {
    pub fn new(link: L, session: S) -> Self {
        Self { link, session }
    }
}

impl<L: LinkPort, S: SessionPort> LinkPort for GatewayNetwork<L, S> {
    fn begin(&mut self, credentials: &NetworkCredentials) -> Result<(), LinkError> {
        self.link.begin(credentials)
    }

    fn link_up(&self) -> bool {
        self.link.link_up()
    }
}

impl<L: LinkPort, S: SessionPort> SessionPort for GatewayNetwork<L, S> {
    fn connect(&mut self, server: &str, token: &str, port: u16) -> Result<(), SessionError> {
        self.session.connect(server, token, port)
    }

    fn session_connected(&self) -> bool {
        self.session.session_connected()
    }

    fn publish_telemetry(&mut self, payload: &str) -> Result<(), SessionError> {
        self.session.publish_telemetry(payload)
    }

    fn send_attribute(&mut self, name: &str, value: f32) -> Result<(), SessionError> {
        self.session.send_attribute(name, value)
    }

    fn send_firmware_info(&mut self, title: &str, version: &str) -> Result<(), SessionError> {
        self.session.send_firmware_info(title, version)
    }

    fn send_firmware_state(&mut self, state: FirmwareState) -> Result<(), SessionError> {
        self.session.send_firmware_state(state)
    }

    fn subscribe_firmware_update(&mut self, request: &UpdateRequest) -> Result<(), SessionError> {
        self.session.subscribe_firmware_update(request)
    }

    fn poll(&mut self, on_update: &mut dyn FnMut(UpdateEvent)) {
        self.session.poll(on_update);
    }
}
