//! Device identity derived from the ESP32 factory MAC address.
//!
//! Produces a stable, human-readable device ID in the form `PT-XXYYZZ`
//! (last 3 bytes of the 6-byte MAC in uppercase hex).  It is used as the
//! MQTT client id and printed in the boot banner.

use core::fmt::Write;

/// Fixed-size device ID string: "PT-XXYYZZ".
pub type DeviceIdString = heapless::String<16>;

/// Full 6-byte MAC address.
pub type MacAddress = [u8; 6];

/// Read the factory MAC address from eFuse.
#[cfg(target_os = "espidf")]
pub fn read_mac() -> MacAddress {
    let mut mac: MacAddress = [0u8; 6];
    unsafe {
        esp_idf_svc::sys::esp_efuse_mac_get_default(mac.as_mut_ptr());
    }
    mac
}

/// Simulation: returns a deterministic fake MAC.
#[cfg(not(target_os = "espidf"))]
pub fn read_mac() -> MacAddress {
    [0x24, 0x6F, 0x28, 0x10, 0x0C, 0x7E]
}

/// Derive the short device ID from the last 3 MAC bytes.
pub fn device_id(mac: &MacAddress) -> DeviceIdString {
    let mut id = DeviceIdString::new();
    let _ = write!(id, "PT-{:02X}{:02X}{:02X}", mac[3], mac[4], mac[5]);
    id
}
