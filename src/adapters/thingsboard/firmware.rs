//! ThingsBoard firmware download: shared-attribute descriptor in,
//! sequential chunks into the [`OtaManager`], lifecycle events out.
//!
//! ```text
//!   arm ──▶ request shared fw_* keys
//!             │
//!   descriptor (same title, new version, SHA256)
//!             │
//!   DOWNLOADING ──chunk n──▶ write ──▶ Progress ──▶ request n+1
//!             │                 ▲
//!             │        timeout: re-request (≤ retry_limit)
//!             ▼
//!   DOWNLOADED ──▶ VERIFIED ──▶ UPDATING ──▶ Completed { success: true }
//!
//!   any failure ──▶ FAILED ──▶ Completed { success: false }
//! ```
//!
//! The subscription stays armed after a failure: a later change to the
//! fw_* attributes starts a fresh download.

use log::{debug, info, warn};
use serde::Deserialize;

use crate::app::ports::FirmwareState;
use crate::app::update::{UpdateEvent, UpdateRequest};
use crate::config::OTA_CHUNK_TIMEOUT_MS;
use crate::error::SessionError;
use crate::ota::{self, OtaManager};

use super::transport::MqttTransport;
use super::{
    ATTRIBUTES_TOPIC, ATTRIBUTE_REQUEST_PREFIX, ATTRIBUTE_RESPONSE_PREFIX,
    ATTRIBUTE_RESPONSE_SUBSCRIBE, FIRMWARE_RESPONSE_PREFIX, FIRMWARE_RESPONSE_SUBSCRIBE,
    TELEMETRY_TOPIC, firmware_state_payload,
};

/// Shared attribute keys describing the assigned firmware package.
pub const FIRMWARE_SHARED_KEYS: &str =
    "fw_title,fw_version,fw_size,fw_checksum,fw_checksum_algorithm";

/// Firmware package descriptor as pushed by the server.  Updates may carry
/// only a subset of keys; they are merged into the last known values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FirmwareDescriptor {
    pub fw_title: Option<String>,
    pub fw_version: Option<String>,
    pub fw_size: Option<u32>,
    pub fw_checksum: Option<String>,
    pub fw_checksum_algorithm: Option<String>,
}

impl FirmwareDescriptor {
    /// Overlay the keys present in `other`.  Returns whether anything changed.
    fn merge(&mut self, other: FirmwareDescriptor) -> bool {
        let before = self.clone();
        if other.fw_title.is_some() {
            self.fw_title = other.fw_title;
        }
        if other.fw_version.is_some() {
            self.fw_version = other.fw_version;
        }
        if other.fw_size.is_some() {
            self.fw_size = other.fw_size;
        }
        if other.fw_checksum.is_some() {
            self.fw_checksum = other.fw_checksum;
        }
        if other.fw_checksum_algorithm.is_some() {
            self.fw_checksum_algorithm = other.fw_checksum_algorithm;
        }
        *self != before
    }
}

#[derive(Deserialize)]
struct AttributeResponse {
    #[serde(default)]
    shared: Option<FirmwareDescriptor>,
}

/// Result of comparing a descriptor against the running firmware.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Assessment {
    /// Title or version missing; wait for more attributes.
    Incomplete,
    UpToDate,
    /// Package is for another device class.
    ForeignTitle,
    /// Size or checksum missing or unusable.
    Invalid(&'static str),
    Start { size: u32, sha256: [u8; 32] },
}

pub fn assess(descriptor: &FirmwareDescriptor, request: &UpdateRequest) -> Assessment {
    let (Some(title), Some(version)) = (&descriptor.fw_title, &descriptor.fw_version) else {
        return Assessment::Incomplete;
    };
    if title.trim() != request.title {
        return Assessment::ForeignTitle;
    }
    if version.trim() == request.version {
        return Assessment::UpToDate;
    }
    let Some(size) = descriptor.fw_size.filter(|s| *s > 0) else {
        return Assessment::Invalid("missing fw_size");
    };
    let algorithm = descriptor.fw_checksum_algorithm.as_deref().unwrap_or("");
    if !(algorithm.eq_ignore_ascii_case("SHA256") || algorithm.eq_ignore_ascii_case("SHA-256")) {
        return Assessment::Invalid("unsupported checksum algorithm");
    }
    let Some(sha256) = descriptor
        .fw_checksum
        .as_deref()
        .and_then(|c| ota::parse_sha256_hex(c).ok())
    else {
        return Assessment::Invalid("malformed fw_checksum");
    };
    Assessment::Start { size, sha256 }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Download {
    request_id: u32,
    chunk: u32,
    size: u32,
    requested_at_ms: u64,
    retries: u8,
}

pub struct FirmwareUpdater {
    request: Option<UpdateRequest>,
    descriptor: FirmwareDescriptor,
    download: Option<Download>,
    ota: OtaManager,
    next_request_id: u32,
}

impl FirmwareUpdater {
    pub fn new() -> Self {
        Self {
            request: None,
            descriptor: FirmwareDescriptor::default(),
            download: None,
            ota: OtaManager::new(),
            next_request_id: 1,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.request.is_some()
    }

    pub fn is_downloading(&self) -> bool {
        self.download.is_some()
    }

    pub fn ota(&self) -> &OtaManager {
        &self.ota
    }

    fn next_id(&mut self) -> u32 {
        let id = self.next_request_id;
        self.next_request_id = self.next_request_id.wrapping_add(1).max(1);
        id
    }

    /// Register parameters, subscribe and ask for the shared fw_* keys.
    /// Any download in flight is abandoned.
    pub fn arm(
        &mut self,
        request: UpdateRequest,
        tx: &mut impl MqttTransport,
    ) -> Result<(), SessionError> {
        if self.download.take().is_some() {
            warn!("FW: re-armed during download, abandoning it");
            self.ota.abort();
        }
        self.request = Some(request);

        tx.subscribe(ATTRIBUTES_TOPIC)?;
        tx.subscribe(ATTRIBUTE_RESPONSE_SUBSCRIBE)?;
        tx.subscribe(FIRMWARE_RESPONSE_SUBSCRIBE)?;

        let id = self.next_id();
        let topic = format!("{}{}", ATTRIBUTE_REQUEST_PREFIX, id);
        let body = format!(r#"{{"sharedKeys":"{}"}}"#, FIRMWARE_SHARED_KEYS);
        tx.publish(&topic, body.as_bytes())?;
        info!(
            "FW: armed for {} v{} (retries {}, chunk {} B)",
            request.title, request.version, request.retry_limit, request.chunk_size
        );
        Ok(())
    }

    /// Route one inbound message.  Returns `false` if the topic is not a
    /// firmware-related one.
    pub fn on_message(
        &mut self,
        topic: &str,
        payload: &[u8],
        now_ms: u64,
        tx: &mut impl MqttTransport,
        emit: &mut dyn FnMut(UpdateEvent),
    ) -> bool {
        if topic == ATTRIBUTES_TOPIC {
            match serde_json::from_slice::<FirmwareDescriptor>(payload) {
                Ok(update) => self.on_descriptor(update, false, now_ms, tx, emit),
                Err(e) => warn!("FW: bad attribute update: {}", e),
            }
            return true;
        }
        if topic.starts_with(ATTRIBUTE_RESPONSE_PREFIX) {
            match serde_json::from_slice::<AttributeResponse>(payload) {
                Ok(AttributeResponse { shared: Some(d) }) => {
                    self.on_descriptor(d, true, now_ms, tx, emit);
                }
                Ok(_) => info!("FW: no firmware assigned"),
                Err(e) => warn!("FW: bad attribute response: {}", e),
            }
            return true;
        }
        if let Some((request_id, chunk)) = parse_chunk_topic(topic) {
            self.on_chunk(request_id, chunk, payload, now_ms, tx, emit);
            return true;
        }
        false
    }

    /// Merge a descriptor update and act on it.  Pushes that leave the
    /// descriptor unchanged are ignored; a `requested` response is always
    /// assessed.
    fn on_descriptor(
        &mut self,
        update: FirmwareDescriptor,
        requested: bool,
        now_ms: u64,
        tx: &mut impl MqttTransport,
        emit: &mut dyn FnMut(UpdateEvent),
    ) {
        let changed = self.descriptor.merge(update);
        let Some(request) = self.request else {
            return;
        };
        if !changed && !requested {
            debug!("FW: attribute update without firmware changes");
            return;
        }
        if self.download.is_some() {
            info!("FW: descriptor changed during download, ignoring until done");
            return;
        }

        match assess(&self.descriptor, &request) {
            Assessment::Incomplete => {}
            Assessment::UpToDate => info!("FW: {} v{} is up to date", request.title, request.version),
            Assessment::ForeignTitle => {
                warn!("FW: package title {:?} is not for this device", self.descriptor.fw_title);
                send_state(tx, FirmwareState::Failed);
            }
            Assessment::Invalid(why) => {
                warn!("FW: descriptor rejected: {}", why);
                self.fail(tx, emit);
            }
            Assessment::Start { size, sha256 } => {
                if let Err(e) = self.ota.begin(size, &sha256) {
                    warn!("FW: OTA begin failed: {}", e);
                    self.fail(tx, emit);
                    return;
                }
                let request_id = self.next_id();
                info!(
                    "FW: downloading {:?} v{:?} ({} B), request {}",
                    self.descriptor.fw_title, self.descriptor.fw_version, size, request_id
                );
                send_state(tx, FirmwareState::Downloading);
                self.download = Some(Download {
                    request_id,
                    chunk: 0,
                    size,
                    requested_at_ms: now_ms,
                    retries: 0,
                });
                self.request_current_chunk(tx);
            }
        }
    }

    fn on_chunk(
        &mut self,
        request_id: u32,
        chunk: u32,
        data: &[u8],
        now_ms: u64,
        tx: &mut impl MqttTransport,
        emit: &mut dyn FnMut(UpdateEvent),
    ) {
        let Some(dl) = self.download else {
            return;
        };
        if request_id != dl.request_id || chunk != dl.chunk {
            info!("FW: stale chunk {}/{} ignored", request_id, chunk);
            return;
        }

        let offset = self.ota.bytes_written();
        if data.is_empty() {
            warn!("FW: empty chunk {} at offset {} of {}", chunk, offset, dl.size);
            self.fail(tx, emit);
            return;
        }
        let written = match self.ota.write_chunk(offset, data) {
            Ok(n) => n,
            Err(e) => {
                warn!("FW: chunk {} rejected: {}", chunk, e);
                self.fail(tx, emit);
                return;
            }
        };
        emit(UpdateEvent::Progress {
            current: written,
            total: dl.size,
        });

        if written < dl.size {
            self.download = Some(Download {
                chunk: chunk + 1,
                requested_at_ms: now_ms,
                retries: 0,
                ..dl
            });
            self.request_current_chunk(tx);
            return;
        }

        self.download = None;
        send_state(tx, FirmwareState::Downloaded);
        match self.ota.finalize() {
            Ok(()) => {
                send_state(tx, FirmwareState::Verified);
                send_state(tx, FirmwareState::Updating);
                info!("FW: image verified ({} B)", written);
                emit(UpdateEvent::Completed { success: true });
            }
            Err(e) => {
                warn!("FW: finalize failed: {}", e);
                self.fail(tx, emit);
            }
        }
    }

    /// Re-request an overdue chunk, or give up after `retry_limit` tries.
    pub fn on_tick(
        &mut self,
        now_ms: u64,
        tx: &mut impl MqttTransport,
        emit: &mut dyn FnMut(UpdateEvent),
    ) {
        let (Some(dl), Some(request)) = (self.download, self.request) else {
            return;
        };
        if now_ms.saturating_sub(dl.requested_at_ms) < OTA_CHUNK_TIMEOUT_MS {
            return;
        }
        if dl.retries >= request.retry_limit {
            warn!("FW: chunk {} timed out {} times, giving up", dl.chunk, dl.retries);
            self.fail(tx, emit);
            return;
        }
        self.download = Some(Download {
            retries: dl.retries + 1,
            requested_at_ms: now_ms,
            ..dl
        });
        warn!("FW: chunk {} timed out, retry {}", dl.chunk, dl.retries + 1);
        self.request_current_chunk(tx);
    }

    fn request_current_chunk(&self, tx: &mut impl MqttTransport) {
        let (Some(dl), Some(request)) = (self.download, self.request) else {
            return;
        };
        let topic = format!("v2/fw/request/{}/chunk/{}", dl.request_id, dl.chunk);
        let body = request.chunk_size.to_string();
        if let Err(e) = tx.publish(&topic, body.as_bytes()) {
            // Counted as a timeout: the retry window covers it.
            warn!("FW: chunk request {} not sent: {}", dl.chunk, e);
        }
    }

    fn fail(&mut self, tx: &mut impl MqttTransport, emit: &mut dyn FnMut(UpdateEvent)) {
        self.download = None;
        self.ota.abort();
        send_state(tx, FirmwareState::Failed);
        emit(UpdateEvent::Completed { success: false });
    }
}

impl Default for FirmwareUpdater {
    fn default() -> Self {
        Self::new()
    }
}

fn send_state(tx: &mut impl MqttTransport, state: FirmwareState) {
    if let Err(e) = tx.publish(TELEMETRY_TOPIC, firmware_state_payload(state).as_bytes()) {
        warn!("FW: state {} not reported: {}", state.as_str(), e);
    }
}

/// `v2/fw/response/{request}/chunk/{n}` → `(request, n)`.
pub fn parse_chunk_topic(topic: &str) -> Option<(u32, u32)> {
    let rest = topic.strip_prefix(FIRMWARE_RESPONSE_PREFIX)?;
    let (request, chunk) = rest.split_once("/chunk/")?;
    Some((request.parse().ok()?, chunk.parse().ok()?))
}
