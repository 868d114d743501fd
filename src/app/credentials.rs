//! Network credentials and session token, loaded once at boot.
//!
//! Missing keys are not fatal: each field falls back to its default and the
//! connectivity supervisor simply keeps failing to connect until the store
//! is provisioned.

use log::warn;

use super::ports::CredentialStore;

pub const KEY_SSID: &str = "ssid";
pub const KEY_PASSWORD: &str = "password";
pub const KEY_MAC: &str = "mac";
pub const KEY_CHANNEL: &str = "channel";
pub const KEY_TOKEN: &str = "mqtt_token";

pub type Ssid = heapless::String<32>;
pub type Passphrase = heapless::String<64>;
pub type SessionToken = heapless::String<128>;

/// Station configuration for the link layer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkCredentials {
    pub ssid: Ssid,
    pub password: Passphrase,
    /// Access point BSSID to pin to.  An all-zero stored MAC means "any".
    pub bssid: Option<[u8; 6]>,
    /// Radio channel to pin to.  Zero or out of range means "scan".
    pub channel: Option<u8>,
}

impl NetworkCredentials {
    pub fn load(store: &impl CredentialStore) -> Self {
        let ssid = read_string(store, KEY_SSID);
        let password = read_string(store, KEY_PASSWORD);

        let mut mac = [0u8; 6];
        let bssid = match store.read_bytes(KEY_MAC, &mut mac) {
            Ok(6) if mac != [0u8; 6] => Some(mac),
            Ok(6) => None,
            Ok(n) => {
                warn!("Credentials: '{}' has {} bytes, expected 6; not pinning BSSID", KEY_MAC, n);
                None
            }
            Err(e) => {
                warn!("Credentials: '{}' unavailable ({}); not pinning BSSID", KEY_MAC, e);
                None
            }
        };

        let channel = match store.read_i32(KEY_CHANNEL) {
            Ok(ch) => u8::try_from(ch).ok().filter(|c| (1..=14).contains(c)),
            Err(e) => {
                warn!("Credentials: '{}' unavailable ({}); scanning all channels", KEY_CHANNEL, e);
                None
            }
        };

        Self {
            ssid,
            password,
            bssid,
            channel,
        }
    }
}

/// Load the backend session token.
pub fn load_token(store: &impl CredentialStore) -> SessionToken {
    read_string(store, KEY_TOKEN)
}

/// Read a bounded string, defaulting to empty on any failure.
fn read_string<const N: usize>(store: &impl CredentialStore, key: &str) -> heapless::String<N> {
    let mut buf = [0u8; N];
    let mut out = heapless::String::new();
    match store.read_str(key, &mut buf) {
        Ok(len) => match core::str::from_utf8(&buf[..len.min(N)]) {
            Ok(s) => {
                // `s` is at most N bytes long, so this cannot overflow.
                let _ = out.push_str(s);
            }
            Err(_) => warn!("Credentials: '{}' is not valid UTF-8; using empty value", key),
        },
        Err(e) => warn!("Credentials: '{}' unavailable ({}); using empty value", key, e),
    }
    out
}
