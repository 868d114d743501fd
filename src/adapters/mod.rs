//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter        | Implements         | Connects to                   |
//! |----------------|--------------------|-------------------------------|
//! | `log_sink`     | EventSink          | Serial log output             |
//! | `network`      | LinkPort           | `wifi` + `thingsboard` pair   |
//! |                | SessionPort        |                               |
//! | `nvs`          | CredentialStore    | NVS / in-memory store         |
//! | `system`       | SystemPort         | FreeRTOS delay, `esp_restart` |
//! | `thingsboard`  | SessionPort        | ThingsBoard MQTT API          |
//! | `time`         | MonotonicClock     | ESP32 system timer            |
//! | `wifi`         | LinkPort           | ESP-IDF WiFi STA              |
//!
//! The PT100 front-end (`SensorPort`) lives in [`crate::sensors`].

pub mod device_id;
pub mod log_sink;
pub mod network;
pub mod nvs;
pub mod system;
pub mod thingsboard;
pub mod time;
pub mod wifi;
