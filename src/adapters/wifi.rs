//! WiFi station-mode adapter.
//!
//! Implements [`LinkPort`]: `begin` pushes the station configuration and
//! issues a non-blocking association request, `link_up` reports whether
//! the station is associated with an address.  Waiting is the
//! orchestrator's job.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: real ESP-IDF WiFi driver via `esp_idf_svc::wifi`.
//! - **all other targets**: simulation stub for host-side tests.

use log::info;

use crate::app::credentials::NetworkCredentials;
use crate::app::ports::LinkPort;
use crate::error::LinkError;

#[cfg(target_os = "espidf")]
use esp_idf_svc::wifi::{AuthMethod, ClientConfiguration, Configuration, EspWifi};
#[cfg(target_os = "espidf")]
use log::warn;

// ───────────────────────────────────────────────────────────────
// Validation
// ───────────────────────────────────────────────────────────────

fn is_printable_ascii(s: &str) -> bool {
    s.bytes().all(|b| (0x20..=0x7E).contains(&b))
}

/// SSID 1-32 printable bytes; password empty (open) or 8-64 bytes (WPA2).
pub fn validate(credentials: &NetworkCredentials) -> Result<(), LinkError> {
    let ssid = credentials.ssid.as_str();
    if ssid.is_empty() || ssid.len() > 32 || !is_printable_ascii(ssid) {
        return Err(LinkError::InvalidConfig);
    }
    let pw = credentials.password.len();
    if pw != 0 && !(8..=64).contains(&pw) {
        return Err(LinkError::InvalidConfig);
    }
    Ok(())
}

// ───────────────────────────────────────────────────────────────
// WiFi adapter
// ───────────────────────────────────────────────────────────────

pub struct WifiLink {
    #[cfg(target_os = "espidf")]
    wifi: EspWifi<'static>,
    begins: u32,
    #[cfg(not(target_os = "espidf"))]
    sim_up: bool,
    #[cfg(not(target_os = "espidf"))]
    sim_accept: bool,
}

impl WifiLink {
    #[cfg(target_os = "espidf")]
    pub fn new(wifi: EspWifi<'static>) -> Self {
        Self { wifi, begins: 0 }
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn new() -> Self {
        Self {
            begins: 0,
            sim_up: false,
            sim_accept: true,
        }
    }

    /// Number of association requests issued so far.
    pub fn begins(&self) -> u32 {
        self.begins
    }

    // ── Platform-specific ─────────────────────────────────────

    #[cfg(target_os = "espidf")]
    fn platform_begin(&mut self, credentials: &NetworkCredentials) -> Result<(), LinkError> {
        let config = ClientConfiguration {
            ssid: credentials
                .ssid
                .as_str()
                .try_into()
                .map_err(|_| LinkError::InvalidConfig)?,
            password: credentials
                .password
                .as_str()
                .try_into()
                .map_err(|_| LinkError::InvalidConfig)?,
            bssid: credentials.bssid,
            channel: credentials.channel,
            auth_method: if credentials.password.is_empty() {
                AuthMethod::None
            } else {
                AuthMethod::WPA2Personal
            },
            ..Default::default()
        };

        if self.wifi.is_started().unwrap_or(false) {
            // A pending association must be dropped before reconfiguring.
            let _ = self.wifi.disconnect();
        }
        self.wifi
            .set_configuration(&Configuration::Client(config))
            .map_err(|e| {
                warn!("WiFi: set_configuration failed: {:?}", e);
                LinkError::InvalidConfig
            })?;
        if !self.wifi.is_started().unwrap_or(false) {
            self.wifi.start().map_err(|e| {
                warn!("WiFi: start failed: {:?}", e);
                LinkError::InitFailed
            })?;
        }
        self.wifi.connect().map_err(|e| {
            warn!("WiFi: connect request failed: {:?}", e);
            LinkError::BeginFailed
        })
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_begin(&mut self, _credentials: &NetworkCredentials) -> Result<(), LinkError> {
        self.sim_up = self.sim_accept;
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn platform_link_up(&self) -> bool {
        self.wifi.is_up().unwrap_or(false)
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_link_up(&self) -> bool {
        self.sim_up
    }
}

#[cfg(not(target_os = "espidf"))]
impl Default for WifiLink {
    fn default() -> Self {
        Self::new()
    }
}

// ── Simulation controls ───────────────────────────────────────

#[cfg(not(target_os = "espidf"))]
impl WifiLink {
    /// Whether the next `begin` brings the simulated link up.
    pub fn sim_set_accept(&mut self, accept: bool) {
        self.sim_accept = accept;
    }

    /// Force the simulated link state (e.g. to model an AP drop).
    pub fn sim_set_up(&mut self, up: bool) {
        self.sim_up = up;
    }
}

// ───────────────────────────────────────────────────────────────
// LinkPort
// ───────────────────────────────────────────────────────────────

impl LinkPort for WifiLink {
    fn begin(&mut self, credentials: &NetworkCredentials) -> Result<(), LinkError> {
        self.begins = self.begins.wrapping_add(1);
        validate(credentials)?;
        info!(
            "WiFi: connecting to '{}' (bssid pinned: {}, channel: {:?})",
            credentials.ssid,
            credentials.bssid.is_some(),
            credentials.channel
        );
        self.platform_begin(credentials)
    }

    fn link_up(&self) -> bool {
        self.platform_link_up()
    }
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────
