//! NVS (Non-Volatile Storage) credential adapter.
//!
//! Implements [`CredentialStore`] over the `credentials` namespace.  The
//! gateway only ever reads: the namespace is opened read-only, and values
//! are written by a separate provisioning step.
//!
//! On ESP-IDF the raw `nvs_*` API is used; on host targets a seedable
//! in-memory map stands in for flash.

use log::info;
#[cfg(target_os = "espidf")]
use log::warn;

use crate::app::ports::CredentialStore;
use crate::error::StorageError;

#[cfg(not(target_os = "espidf"))]
use std::collections::HashMap;

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

pub const CREDENTIALS_NAMESPACE: &str = "credentials";

/// NVS keys and namespaces are limited to 15 characters plus NUL.
const NVS_NAME_MAX: usize = 15;

#[cfg(not(target_os = "espidf"))]
#[derive(Debug, Clone)]
enum SimValue {
    Bytes(Vec<u8>),
    I32(i32),
}

pub struct NvsCredentialStore {
    namespace: &'static str,
    #[cfg(not(target_os = "espidf"))]
    store: HashMap<String, SimValue>,
}

impl NvsCredentialStore {
    /// Initialise NVS flash and bind to the credentials namespace.
    ///
    /// On first boot or after a version mismatch the partition is erased
    /// and re-initialised, which leaves every key absent.
    pub fn new() -> Result<Self, StorageError> {
        #[cfg(target_os = "espidf")]
        {
            // SAFETY: nvs_flash_init / nvs_flash_erase are called from the
            // single main-task context before any concurrent NVS access.
            let ret = unsafe { nvs_flash_init() };
            if ret == ESP_ERR_NVS_NO_FREE_PAGES as i32 || ret == ESP_ERR_NVS_NEW_VERSION_FOUND as i32 {
                warn!("NVS: erasing and re-initialising flash partition");
                let ret2 = unsafe { nvs_flash_erase() };
                if ret2 != ESP_OK {
                    return Err(StorageError::IoError);
                }
                let ret3 = unsafe { nvs_flash_init() };
                if ret3 != ESP_OK {
                    return Err(StorageError::IoError);
                }
            } else if ret != ESP_OK {
                return Err(StorageError::IoError);
            }
            info!("NvsCredentialStore: ESP-IDF NVS initialised");
        }

        #[cfg(not(target_os = "espidf"))]
        info!("NvsCredentialStore: simulation backend");

        Ok(Self {
            namespace: CREDENTIALS_NAMESPACE,
            #[cfg(not(target_os = "espidf"))]
            store: HashMap::new(),
        })
    }

    pub fn namespace(&self) -> &'static str {
        self.namespace
    }

    /// Copy `name` into a NUL-terminated buffer, rejecting over-long names.
    fn c_name(name: &str) -> Result<[u8; NVS_NAME_MAX + 1], StorageError> {
        let bytes = name.as_bytes();
        if bytes.is_empty() || bytes.len() > NVS_NAME_MAX {
            return Err(StorageError::InvalidLength);
        }
        let mut out = [0u8; NVS_NAME_MAX + 1];
        out[..bytes.len()].copy_from_slice(bytes);
        Ok(out)
    }

    /// Open the namespace read-only, execute a closure with the handle, then close.
    #[cfg(target_os = "espidf")]
    fn with_nvs_handle<F, T>(&self, f: F) -> Result<T, StorageError>
    where
        F: FnOnce(nvs_handle_t) -> Result<T, i32>,
    {
        let ns = Self::c_name(self.namespace)?;
        let mut handle: nvs_handle_t = 0;
        let ret = unsafe {
            nvs_open(
                ns.as_ptr() as *const _,
                nvs_open_mode_t_NVS_READONLY,
                &mut handle,
            )
        };
        if ret == ESP_ERR_NVS_NOT_FOUND as i32 {
            // Namespace never written: every key is absent.
            return Err(StorageError::NotFound);
        }
        if ret != ESP_OK {
            warn!("NVS: open '{}' failed ({})", self.namespace, ret);
            return Err(StorageError::IoError);
        }

        let result = f(handle);
        unsafe {
            nvs_close(handle);
        }
        result.map_err(map_nvs_err)
    }
}

#[cfg(target_os = "espidf")]
fn map_nvs_err(code: i32) -> StorageError {
    if code == ESP_ERR_NVS_NOT_FOUND as i32 {
        StorageError::NotFound
    } else if code == ESP_ERR_NVS_INVALID_LENGTH as i32 {
        StorageError::InvalidLength
    } else {
        StorageError::IoError
    }
}

// ── Simulation seeding ────────────────────────────────────────

#[cfg(not(target_os = "espidf"))]
impl NvsCredentialStore {
    pub fn seed_str(&mut self, key: &str, value: &str) {
        self.store
            .insert(key.to_string(), SimValue::Bytes(value.as_bytes().to_vec()));
    }

    pub fn seed_bytes(&mut self, key: &str, value: &[u8]) {
        self.store
            .insert(key.to_string(), SimValue::Bytes(value.to_vec()));
    }

    pub fn seed_i32(&mut self, key: &str, value: i32) {
        self.store.insert(key.to_string(), SimValue::I32(value));
    }

    fn sim_bytes(&self, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        Self::c_name(key)?;
        match self.store.get(key) {
            Some(SimValue::Bytes(data)) if data.len() <= buf.len() => {
                buf[..data.len()].copy_from_slice(data);
                Ok(data.len())
            }
            Some(SimValue::Bytes(_)) => Err(StorageError::InvalidLength),
            Some(SimValue::I32(_)) => Err(StorageError::InvalidLength),
            None => Err(StorageError::NotFound),
        }
    }
}

// ── CredentialStore ───────────────────────────────────────────

impl CredentialStore for NvsCredentialStore {
    fn read_str(&self, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        #[cfg(not(target_os = "espidf"))]
        {
            self.sim_bytes(key, buf)
        }

        #[cfg(target_os = "espidf")]
        {
            let key_c = Self::c_name(key)?;
            self.with_nvs_handle(|handle| {
                // First call: size including the NUL terminator.
                let mut size: usize = 0;
                let ret = unsafe {
                    nvs_get_str(
                        handle,
                        key_c.as_ptr() as *const _,
                        core::ptr::null_mut(),
                        &mut size,
                    )
                };
                if ret != ESP_OK {
                    return Err(ret);
                }
                let len = size.saturating_sub(1);
                if len > buf.len() {
                    return Err(ESP_ERR_NVS_INVALID_LENGTH as i32);
                }

                let mut tmp = vec![0u8; size];
                let ret = unsafe {
                    nvs_get_str(
                        handle,
                        key_c.as_ptr() as *const _,
                        tmp.as_mut_ptr() as *mut _,
                        &mut size,
                    )
                };
                if ret != ESP_OK {
                    return Err(ret);
                }
                buf[..len].copy_from_slice(&tmp[..len]);
                Ok(len)
            })
        }
    }

    fn read_bytes(&self, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        #[cfg(not(target_os = "espidf"))]
        {
            self.sim_bytes(key, buf)
        }

        #[cfg(target_os = "espidf")]
        {
            let key_c = Self::c_name(key)?;
            self.with_nvs_handle(|handle| {
                let mut size = buf.len();
                let ret = unsafe {
                    nvs_get_blob(
                        handle,
                        key_c.as_ptr() as *const _,
                        buf.as_mut_ptr() as *mut _,
                        &mut size,
                    )
                };
                if ret != ESP_OK {
                    return Err(ret);
                }
                Ok(size)
            })
        }
    }

    fn read_i32(&self, key: &str) -> Result<i32, StorageError> {
        #[cfg(not(target_os = "espidf"))]
        {
            Self::c_name(key)?;
            match self.store.get(key) {
                Some(SimValue::I32(v)) => Ok(*v),
                Some(SimValue::Bytes(_)) => Err(StorageError::InvalidLength),
                None => Err(StorageError::NotFound),
            }
        }

        #[cfg(target_os = "espidf")]
        {
            let key_c = Self::c_name(key)?;
            self.with_nvs_handle(|handle| {
                let mut value: i32 = 0;
                let ret = unsafe { nvs_get_i32(handle, key_c.as_ptr() as *const _, &mut value) };
                if ret != ESP_OK {
                    return Err(ret);
                }
                Ok(value)
            })
        }
    }
}
