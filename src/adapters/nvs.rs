//! NVS-backed storage for the sensor configuration blob.
//!
//! The blob is the postcard encoding of [`SensorConfig`].  On ESP32 it
//! lives in the `presence` namespace of the default NVS partition; the
//! simulation backend keeps it in memory.

use std::sync::{Mutex, PoisonError};

use log::info;
#[cfg(target_os = "espidf")]
use log::warn;

use crate::config::SensorConfig;
use crate::error::ConfigError;

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

#[cfg(target_os = "espidf")]
const NAMESPACE: &[u8] = b"presence\0";
#[cfg(target_os = "espidf")]
const CONFIG_KEY: &[u8] = b"sensorcfg\0";

const MAX_BLOB_SIZE: usize = 256;

pub struct NvsConfigStore {
    #[cfg(not(target_os = "espidf"))]
    blob: Mutex<Option<Vec<u8>>>,
    #[cfg(target_os = "espidf")]
    lock: Mutex<()>,
}

impl NvsConfigStore {
    /// Initialise NVS flash.  A full or version-mismatched partition is
    /// erased and re-initialised.
    pub fn new() -> Result<Self, ConfigError> {
        #[cfg(target_os = "espidf")]
        {
            // SAFETY: called once from the main task before any NVS access.
            let ret = unsafe { nvs_flash_init() };
            if ret == ESP_ERR_NVS_NO_FREE_PAGES as i32 || ret == ESP_ERR_NVS_NEW_VERSION_FOUND as i32 {
                warn!("nvs: erasing and re-initialising flash partition");
                let ret = unsafe { nvs_flash_erase() };
                if ret != ESP_OK as i32 {
                    return Err(ConfigError::Storage(ret));
                }
                let ret = unsafe { nvs_flash_init() };
                if ret != ESP_OK as i32 {
                    return Err(ConfigError::Storage(ret));
                }
            } else if ret != ESP_OK as i32 {
                return Err(ConfigError::Storage(ret));
            }
            info!("nvs: flash initialised");
            Ok(Self { lock: Mutex::new(()) })
        }

        #[cfg(not(target_os = "espidf"))]
        {
            info!("nvs: simulation backend");
            Ok(Self { blob: Mutex::new(None) })
        }
    }

    /// Open the namespace, run `f` with the handle, close.
    #[cfg(target_os = "espidf")]
    fn with_handle<T>(
        &self,
        write: bool,
        f: impl FnOnce(nvs_handle_t) -> Result<T, i32>,
    ) -> Result<T, i32> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mode = if write {
            nvs_open_mode_t_NVS_READWRITE
        } else {
            nvs_open_mode_t_NVS_READONLY
        };
        let mut handle: nvs_handle_t = 0;
        // SAFETY: NUL-terminated namespace; handle closed below.
        let ret = unsafe { nvs_open(NAMESPACE.as_ptr().cast(), mode, &mut handle) };
        if ret != ESP_OK as i32 {
            return Err(ret);
        }
        let result = f(handle);
        unsafe { nvs_close(handle) };
        result
    }

    /// Raw stored blob, `Ok(None)` if nothing was ever saved.
    pub fn load_blob(&self) -> Result<Option<Vec<u8>>, ConfigError> {
        #[cfg(target_os = "espidf")]
        {
            let result = self.with_handle(false, |handle| {
                let mut size: usize = 0;
                // SAFETY: size query with a null buffer.
                let ret = unsafe {
                    nvs_get_blob(handle, CONFIG_KEY.as_ptr().cast(), core::ptr::null_mut(), &mut size)
                };
                if ret != ESP_OK as i32 {
                    return Err(ret);
                }
                if size == 0 || size > MAX_BLOB_SIZE {
                    return Err(ESP_ERR_NVS_INVALID_LENGTH as i32);
                }
                let mut buf = vec![0u8; size];
                // SAFETY: `buf` holds exactly `size` bytes.
                let ret = unsafe {
                    nvs_get_blob(handle, CONFIG_KEY.as_ptr().cast(), buf.as_mut_ptr().cast(), &mut size)
                };
                if ret != ESP_OK as i32 {
                    return Err(ret);
                }
                Ok(buf)
            });
            match result {
                Ok(bytes) => Ok(Some(bytes)),
                Err(e) if e == ESP_ERR_NVS_NOT_FOUND as i32 => Ok(None),
                Err(e) => Err(ConfigError::Storage(e)),
            }
        }

        #[cfg(not(target_os = "espidf"))]
        Ok(self.blob.lock().unwrap_or_else(PoisonError::into_inner).clone())
    }

    /// Validate, encode and persist `config`.
    pub fn save(&self, config: &SensorConfig) -> Result<(), ConfigError> {
        config.validate()?;
        let bytes = config.to_blob()?;
        if bytes.len() > MAX_BLOB_SIZE {
            return Err(ConfigError::Corrupted);
        }

        #[cfg(target_os = "espidf")]
        self.with_handle(true, |handle| {
            // SAFETY: `bytes` outlives the call.
            let ret = unsafe {
                nvs_set_blob(handle, CONFIG_KEY.as_ptr().cast(), bytes.as_ptr().cast(), bytes.len())
            };
            if ret != ESP_OK as i32 {
                return Err(ret);
            }
            let ret = unsafe { nvs_commit(handle) };
            if ret != ESP_OK as i32 { Err(ret) } else { Ok(()) }
        })
        .map_err(ConfigError::Storage)?;

        #[cfg(not(target_os = "espidf"))]
        {
            *self.blob.lock().unwrap_or_else(PoisonError::into_inner) = Some(bytes);
        }

        info!("nvs: sensor config saved");
        Ok(())
    }

    /// Stored config, or defaults when absent, unreadable or invalid.
    pub fn load_or_default(&self) -> SensorConfig {
        match self.load_blob() {
            Ok(blob) => SensorConfig::load_or_default(blob.as_deref()),
            Err(e) => {
                log::warn!("nvs: read failed ({}), using defaults", e);
                SensorConfig::default()
            }
        }
    }
}
