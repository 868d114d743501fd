//! Firmware image staging into the inactive OTA partition, backed by `esp-ota`.
//!
//! Flow: begin(size, sha256) → N × write_chunk → finalize → restart
//!
//! ```text
//!   Idle ──begin──▶ Receiving ──finalize──▶ Verifying ──▶ ReadyToReboot
//!                      │                        │
//!                    abort                  digest/flash
//!                      ▼                     mismatch
//!                    Idle                       ▼
//!                                             Failed
//! ```
//!
//! The image digest is accumulated while chunks are written, so the flash
//! never has to be read back for verification.

use core::fmt;

use hmac_sha256::Hash;
use log::{info, warn};

const MAX_FIRMWARE_SIZE: u32 = 4 * 1024 * 1024; // 4 MB

// ── Error type ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtaError {
    AlreadyInProgress,
    InvalidSize,
    InvalidSha,
    BeginFailed,
    WriteFailed,
    ChecksumMismatch,
    VerifyFailed,
    BootSetFailed,
    IncompleteTransfer,
    NotReceiving,
    NonSequential,
    Overflow,
}

impl fmt::Display for OtaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyInProgress => write!(f, "OTA session already in progress"),
            Self::InvalidSize => write!(f, "firmware size out of range (max 4 MB)"),
            Self::InvalidSha => write!(f, "SHA-256 must be exactly 32 bytes"),
            Self::BeginFailed => write!(f, "OTA begin failed"),
            Self::WriteFailed => write!(f, "OTA write failed"),
            Self::ChecksumMismatch => write!(f, "image SHA-256 does not match descriptor"),
            Self::VerifyFailed => write!(f, "OTA image validation failed"),
            Self::BootSetFailed => write!(f, "set boot partition failed"),
            Self::IncompleteTransfer => write!(f, "finalize called before all bytes written"),
            Self::NotReceiving => write!(f, "operation requires active Receiving state"),
            Self::NonSequential => write!(f, "chunk offset does not match expected offset"),
            Self::Overflow => write!(f, "chunk would exceed declared firmware size"),
        }
    }
}

impl std::error::Error for OtaError {}

// ── State machine ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtaState {
    Idle,
    Receiving {
        expected_size: u32,
        bytes_written: u32,
    },
    Verifying,
    ReadyToReboot,
    Failed,
}

/// Parse a 64-character hex SHA-256 string (either case).
pub fn parse_sha256_hex(hex: &str) -> Result<[u8; 32], OtaError> {
    let bytes = hex.trim().as_bytes();
    if bytes.len() != 64 {
        return Err(OtaError::InvalidSha);
    }
    let mut out = [0u8; 32];
    for (i, pair) in bytes.chunks_exact(2).enumerate() {
        let hi = hex_nibble(pair[0]).ok_or(OtaError::InvalidSha)?;
        let lo = hex_nibble(pair[1]).ok_or(OtaError::InvalidSha)?;
        out[i] = (hi << 4) | lo;
    }
    Ok(out)
}

fn hex_nibble(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

// ── Manager ───────────────────────────────────────────────────

/// OTA partition writer.
///
/// On ESP-IDF targets the image goes through `esp_ota::OtaUpdate`.  On
/// simulation targets only the bookkeeping and the digest are kept.
pub struct OtaManager {
    state: OtaState,
    expected_sha256: [u8; 32],
    hasher: Hash,
    #[cfg(target_os = "espidf")]
    ota_update: Option<esp_ota::OtaUpdate>,
}

impl OtaManager {
    pub fn new() -> Self {
        Self {
            state: OtaState::Idle,
            expected_sha256: [0u8; 32],
            hasher: Hash::new(),
            #[cfg(target_os = "espidf")]
            ota_update: None,
        }
    }

    pub fn state(&self) -> OtaState {
        self.state
    }

    /// Bytes accepted so far in the current session (0 when not receiving).
    pub fn bytes_written(&self) -> u32 {
        match self.state {
            OtaState::Receiving { bytes_written, .. } => bytes_written,
            _ => 0,
        }
    }

    /// Begin an OTA session. Validates size and opens the inactive partition.
    pub fn begin(&mut self, firmware_size: u32, sha256: &[u8]) -> Result<(), OtaError> {
        if matches!(self.state, OtaState::Receiving { .. } | OtaState::Verifying) {
            return Err(OtaError::AlreadyInProgress);
        }
        if firmware_size == 0 || firmware_size > MAX_FIRMWARE_SIZE {
            return Err(OtaError::InvalidSize);
        }
        if sha256.len() != 32 {
            return Err(OtaError::InvalidSha);
        }

        self.expected_sha256.copy_from_slice(sha256);
        self.hasher = Hash::new();

        #[cfg(target_os = "espidf")]
        {
            let update = esp_ota::OtaUpdate::begin().map_err(|e| {
                warn!("esp-ota begin failed: {:?}", e);
                OtaError::BeginFailed
            })?;
            self.ota_update = Some(update);
        }

        self.state = OtaState::Receiving {
            expected_size: firmware_size,
            bytes_written: 0,
        };
        info!("OTA: begin ({} bytes)", firmware_size);
        Ok(())
    }

    /// Write a chunk at the given byte offset. Returns total bytes written.
    pub fn write_chunk(&mut self, offset: u32, data: &[u8]) -> Result<u32, OtaError> {
        let OtaState::Receiving {
            expected_size,
            bytes_written,
        } = self.state
        else {
            return Err(OtaError::NotReceiving);
        };

        if offset != bytes_written {
            return Err(OtaError::NonSequential);
        }
        let len = u32::try_from(data.len()).map_err(|_| OtaError::Overflow)?;
        let new_written = bytes_written
            .checked_add(len)
            .filter(|n| *n <= expected_size)
            .ok_or(OtaError::Overflow)?;

        #[cfg(target_os = "espidf")]
        {
            let Some(update) = self.ota_update.as_mut() else {
                return Err(OtaError::NotReceiving);
            };
            if let Err(e) = update.write(data) {
                warn!("esp-ota write failed: {:?}", e);
                self.abort();
                return Err(OtaError::WriteFailed);
            }
        }

        self.hasher.update(data);
        self.state = OtaState::Receiving {
            expected_size,
            bytes_written: new_written,
        };
        Ok(new_written)
    }

    /// Verify the digest, validate the image and mark it bootable.
    pub fn finalize(&mut self) -> Result<(), OtaError> {
        match self.state {
            OtaState::Receiving {
                expected_size,
                bytes_written,
            } if bytes_written == expected_size => {}
            OtaState::Receiving { .. } => return Err(OtaError::IncompleteTransfer),
            _ => return Err(OtaError::NotReceiving),
        }

        self.state = OtaState::Verifying;

        let digest = core::mem::replace(&mut self.hasher, Hash::new()).finalize();
        if digest != self.expected_sha256 {
            warn!("OTA: SHA-256 mismatch, discarding image");
            #[cfg(target_os = "espidf")]
            {
                // Dropping the handle aborts the esp-ota session.
                self.ota_update.take();
            }
            self.state = OtaState::Failed;
            return Err(OtaError::ChecksumMismatch);
        }

        #[cfg(target_os = "espidf")]
        {
            let Some(update) = self.ota_update.take() else {
                self.state = OtaState::Failed;
                return Err(OtaError::NotReceiving);
            };
            let mut completed = update.finalize().map_err(|e| {
                warn!("esp-ota finalize failed: {:?}", e);
                self.state = OtaState::Failed;
                OtaError::VerifyFailed
            })?;
            completed.set_as_boot_partition().map_err(|e| {
                warn!("esp-ota set_as_boot_partition failed: {:?}", e);
                self.state = OtaState::Failed;
                OtaError::BootSetFailed
            })?;
        }

        self.state = OtaState::ReadyToReboot;
        info!("OTA: image verified, ready to reboot");
        Ok(())
    }

    /// Abort the current OTA session; resets to Idle.
    pub fn abort(&mut self) {
        #[cfg(target_os = "espidf")]
        {
            self.ota_update.take();
        }
        self.hasher = Hash::new();
        self.state = OtaState::Idle;
        warn!("OTA: aborted");
    }
}

impl Default for OtaManager {
    fn default() -> Self {
        Self::new()
    }
}

// ── Boot validation ───────────────────────────────────────────

/// Mark the running firmware as valid so the bootloader does not roll back.
#[cfg(target_os = "espidf")]
pub fn check_rollback() {
    match esp_ota::mark_app_valid() {
        Ok(()) => info!("OTA: firmware marked valid (rollback cancelled)"),
        Err(e) => warn!("OTA: mark_app_valid failed: {:?}", e),
    }
}

#[cfg(not(target_os = "espidf"))]
pub fn check_rollback() {
    info!("OTA rollback check (simulation): skipped");
}

// ── Tests ─────────────────────────────────────────────────────
