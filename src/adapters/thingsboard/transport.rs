//! MQTT transport under the ThingsBoard session.
//!
//! [`MqttTransport`] is the narrow surface the session needs: open with a
//! device token, publish, subscribe, and an [`Inbox`] of inbound events.
//!
//! - **`target_os = "espidf"`**: [`EspMqttTransport`] over `EspMqttClient`.
//! - **all other targets**: [`LoopbackTransport`], which records outbound
//!   traffic and lets tests inject broker messages.

#[cfg(not(target_os = "espidf"))]
use std::sync::Arc;

use crate::error::SessionError;

use super::inbox::Inbox;
#[cfg(target_os = "espidf")]
use super::inbox::InboundEvent;

pub trait MqttTransport {
    /// Open (or re-confirm) the broker connection.  ThingsBoard
    /// authenticates with the device token as the MQTT username.
    fn open(
        &mut self,
        server: &str,
        port: u16,
        client_id: &str,
        token: &str,
    ) -> Result<(), SessionError>;

    /// Connected, and not dropped since the last successful `open`.
    fn is_open(&self) -> bool;

    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), SessionError>;

    fn subscribe(&mut self, topic: &str) -> Result<(), SessionError>;

    fn inbox(&self) -> &Inbox;
}

// ───────────────────────────────────────────────────────────────
// ESP-IDF transport
// ───────────────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
mod esp {
    use core::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use esp_idf_hal::delay::FreeRtos;
    use esp_idf_svc::mqtt::client::{
        Details, EspMqttClient, EventPayload, MqttClientConfiguration, QoS,
    };
    use log::{info, warn};

    use super::{InboundEvent, Inbox, MqttTransport};
    use crate::error::SessionError;

    const CONNECT_POLL_MS: u32 = 50;

    #[derive(Default)]
    struct Flags {
        up: AtomicBool,
        dropped: AtomicBool,
    }

    pub struct EspMqttTransport {
        client: Option<EspMqttClient<'static>>,
        inbox: Arc<Inbox>,
        flags: Arc<Flags>,
        buffer_size: usize,
        connect_timeout_ms: u32,
    }

    impl EspMqttTransport {
        pub fn new(inbox: Arc<Inbox>, buffer_size: usize, connect_timeout_ms: u32) -> Self {
            Self {
                client: None,
                inbox,
                flags: Arc::new(Flags::default()),
                buffer_size,
                connect_timeout_ms,
            }
        }

        fn create_client(
            &mut self,
            server: &str,
            port: u16,
            client_id: &str,
            token: &str,
        ) -> Result<(), SessionError> {
            let url = format!("mqtt://{}:{}", server, port);
            let conf = MqttClientConfiguration {
                client_id: Some(client_id),
                username: Some(token),
                buffer_size: self.buffer_size,
                out_buffer_size: self.buffer_size,
                ..Default::default()
            };

            let inbox = Arc::clone(&self.inbox);
            let flags = Arc::clone(&self.flags);
            let client = EspMqttClient::new_cb(&url, &conf, move |event| match event.payload() {
                EventPayload::Connected(_) => {
                    flags.up.store(true, Ordering::Release);
                    inbox.push(InboundEvent::Connected);
                }
                EventPayload::Disconnected => {
                    flags.up.store(false, Ordering::Release);
                    flags.dropped.store(true, Ordering::Release);
                    inbox.push(InboundEvent::Disconnected);
                }
                EventPayload::Received {
                    topic: Some(topic),
                    data,
                    details: Details::Complete,
                    ..
                } => {
                    if !inbox.push(InboundEvent::Message {
                        topic: topic.to_string(),
                        payload: data.to_vec(),
                    }) {
                        warn!("MQTT: inbox full, dropped message on {}", topic);
                    }
                }
                EventPayload::Received { topic, .. } => {
                    warn!("MQTT: fragmented message on {:?} dropped", topic);
                }
                _ => {}
            })
            .map_err(|e| {
                warn!("MQTT: client init failed: {:?}", e);
                SessionError::ConnectFailed
            })?;

            info!("MQTT: client created for {}", url);
            self.client = Some(client);
            Ok(())
        }
    }

    impl MqttTransport for EspMqttTransport {
        fn open(
            &mut self,
            server: &str,
            port: u16,
            client_id: &str,
            token: &str,
        ) -> Result<(), SessionError> {
            if self.client.is_none() {
                self.create_client(server, port, client_id, token)?;
            }

            // The client reconnects in the background; wait for its ack.
            let mut waited = 0;
            while !self.flags.up.load(Ordering::Acquire) {
                if waited >= self.connect_timeout_ms {
                    // A late ack must not count as an open session.
                    self.flags.dropped.store(true, Ordering::Release);
                    return Err(SessionError::ConnectFailed);
                }
                FreeRtos::delay_ms(CONNECT_POLL_MS);
                waited += CONNECT_POLL_MS;
            }
            self.flags.dropped.store(false, Ordering::Release);
            Ok(())
        }

        fn is_open(&self) -> bool {
            self.flags.up.load(Ordering::Acquire) && !self.flags.dropped.load(Ordering::Acquire)
        }

        fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), SessionError> {
            let client = self.client.as_mut().ok_or(SessionError::NotConnected)?;
            client
                .enqueue(topic, QoS::AtMostOnce, false, payload)
                .map(|_| ())
                .map_err(|e| {
                    warn!("MQTT: publish to {} failed: {:?}", topic, e);
                    SessionError::PublishFailed
                })
        }

        fn subscribe(&mut self, topic: &str) -> Result<(), SessionError> {
            let client = self.client.as_mut().ok_or(SessionError::NotConnected)?;
            client
                .subscribe(topic, QoS::AtMostOnce)
                .map(|_| ())
                .map_err(|e| {
                    warn!("MQTT: subscribe to {} failed: {:?}", topic, e);
                    SessionError::SubscribeFailed
                })
        }

        fn inbox(&self) -> &Inbox {
            &self.inbox
        }
    }
}

#[cfg(target_os = "espidf")]
pub use esp::EspMqttTransport;

// ───────────────────────────────────────────────────────────────
// Loopback transport (host)
// ───────────────────────────────────────────────────────────────

/// In-memory broker stand-in.
#[cfg(not(target_os = "espidf"))]
pub struct LoopbackTransport {
    inbox: Arc<Inbox>,
    open: bool,
    accept: bool,
    opens: u32,
    published: Vec<(String, Vec<u8>)>,
    subscriptions: Vec<String>,
    last_username: String,
    last_client_id: String,
}

#[cfg(not(target_os = "espidf"))]
impl LoopbackTransport {
    pub fn new() -> Self {
        Self {
            inbox: Arc::new(Inbox::new()),
            open: false,
            accept: true,
            opens: 0,
            published: Vec::new(),
            subscriptions: Vec::new(),
            last_username: String::new(),
            last_client_id: String::new(),
        }
    }

    /// Whether the next `open` succeeds.
    pub fn set_accept(&mut self, accept: bool) {
        self.accept = accept;
    }

    /// Simulate a broker-side disconnect.
    pub fn drop_connection(&mut self) {
        self.open = false;
    }

    /// Queue an inbound message as if the broker had sent it.
    pub fn inject(&self, topic: &str, payload: &[u8]) -> bool {
        self.inbox.push(super::inbox::InboundEvent::Message {
            topic: topic.to_string(),
            payload: payload.to_vec(),
        })
    }

    pub fn opens(&self) -> u32 {
        self.opens
    }

    pub fn published(&self) -> &[(String, Vec<u8>)] {
        &self.published
    }

    /// Published payloads on `topic`, as UTF-8 text.
    pub fn published_on(&self, topic: &str) -> Vec<String> {
        self.published
            .iter()
            .filter(|(t, _)| t == topic)
            .map(|(_, p)| String::from_utf8_lossy(p).into_owned())
            .collect()
    }

    pub fn take_published(&mut self) -> Vec<(String, Vec<u8>)> {
        core::mem::take(&mut self.published)
    }

    pub fn subscriptions(&self) -> &[String] {
        &self.subscriptions
    }

    pub fn last_username(&self) -> &str {
        &self.last_username
    }

    pub fn last_client_id(&self) -> &str {
        &self.last_client_id
    }
}

#[cfg(not(target_os = "espidf"))]
impl Default for LoopbackTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(not(target_os = "espidf"))]
impl MqttTransport for LoopbackTransport {
    fn open(
        &mut self,
        _server: &str,
        _port: u16,
        client_id: &str,
        token: &str,
    ) -> Result<(), SessionError> {
        self.opens += 1;
        self.last_client_id = client_id.to_string();
        self.last_username = token.to_string();
        if !self.accept {
            return Err(SessionError::ConnectFailed);
        }
        self.open = true;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), SessionError> {
        if !self.open {
            return Err(SessionError::NotConnected);
        }
        self.published.push((topic.to_string(), payload.to_vec()));
        Ok(())
    }

    fn subscribe(&mut self, topic: &str) -> Result<(), SessionError> {
        if !self.open {
            return Err(SessionError::NotConnected);
        }
        self.subscriptions.push(topic.to_string());
        Ok(())
    }

    fn inbox(&self) -> &Inbox {
        &self.inbox
    }
}
