//! SoC delay and restart.
//!
//! On ESP-IDF the delay yields to FreeRTOS and `restart` calls
//! `esp_restart()`.  On host targets the delay is recorded rather than
//! slept, and restart requests are counted.

use embedded_hal::delay::DelayNs;
use log::warn;

use crate::app::ports::SystemPort;

#[derive(Default)]
pub struct EspSystem {
    #[cfg(not(target_os = "espidf"))]
    slept_ns: u64,
    #[cfg(not(target_os = "espidf"))]
    restarts: u32,
}

impl EspSystem {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(not(target_os = "espidf"))]
impl EspSystem {
    /// Total simulated delay.
    pub fn slept_ms(&self) -> u64 {
        self.slept_ns / 1_000_000
    }

    pub fn restarts(&self) -> u32 {
        self.restarts
    }
}

impl DelayNs for EspSystem {
    #[cfg(target_os = "espidf")]
    fn delay_ns(&mut self, ns: u32) {
        esp_idf_hal::delay::Delay::new_default().delay_ns(ns);
    }

    #[cfg(target_os = "espidf")]
    fn delay_ms(&mut self, ms: u32) {
        esp_idf_hal::delay::FreeRtos::delay_ms(ms);
    }

    #[cfg(not(target_os = "espidf"))]
    fn delay_ns(&mut self, ns: u32) {
        self.slept_ns += u64::from(ns);
    }
}

impl SystemPort for EspSystem {
    #[cfg(target_os = "espidf")]
    fn restart(&mut self) {
        warn!("System: restarting");
        unsafe { esp_idf_svc::sys::esp_restart() };
    }

    #[cfg(not(target_os = "espidf"))]
    fn restart(&mut self) {
        warn!("System: restart requested (simulation)");
        self.restarts += 1;
    }
}
