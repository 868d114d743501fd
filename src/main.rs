//! PT100 Gateway Firmware: main entry point
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     Adapters (outer ring)                    │
//! │                                                              │
//! │  WifiLink + ThingsBoardSession   Max31865      NvsCredential │
//! │  (GatewayNetwork: Link+Session)  (SensorPort)  (Credentials) │
//! │  EspSystem (delay, restart)      LogEventSink  Esp32Time     │
//! │                                                              │
//! │  ──────────────── Port Trait Boundary ─────────────────      │
//! │                                                              │
//! │  ┌────────────────────────────────────────────────────────┐  │
//! │  │            GatewayService (pure logic)                 │  │
//! │  │  supervisor · telemetry pacing · OTA lifecycle         │  │
//! │  └────────────────────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use std::sync::Arc;

use anyhow::Result;
use esp_idf_hal::delay::FreeRtos;
use esp_idf_hal::gpio::{AnyInputPin, AnyOutputPin};
use esp_idf_hal::peripherals::Peripherals;
use esp_idf_hal::spi::config::{Config as SpiConfig, DriverConfig};
use esp_idf_hal::spi::{SpiDeviceDriver, SpiDriver};
use esp_idf_hal::units::Hertz;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_svc::wifi::EspWifi;
use log::{info, warn};

use pt100_gateway::adapters::device_id;
use pt100_gateway::adapters::log_sink::LogEventSink;
use pt100_gateway::adapters::network::GatewayNetwork;
use pt100_gateway::adapters::nvs::NvsCredentialStore;
use pt100_gateway::adapters::system::EspSystem;
use pt100_gateway::adapters::thingsboard::ThingsBoardSession;
use pt100_gateway::adapters::thingsboard::inbox::Inbox;
use pt100_gateway::adapters::thingsboard::transport::EspMqttTransport;
use pt100_gateway::adapters::time::Esp32TimeAdapter;
use pt100_gateway::adapters::wifi::WifiLink;
use pt100_gateway::app::service::GatewayService;
use pt100_gateway::config::{DeviceIdentity, GatewayConfig, MQTT_CONNECT_TIMEOUT_MS};
use pt100_gateway::ota;
use pt100_gateway::pins;
use pt100_gateway::sensors::{Max31865, Wires};

/// Idle time between loop iterations.
const LOOP_IDLE_MS: u32 = 10;

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    let identity = DeviceIdentity::current();
    info!("PT100 gateway {} v{}", identity.title, identity.version);

    // ── 1b. OTA rollback check ─────────────────────────────────
    ota::check_rollback();

    let config = GatewayConfig::default();
    let peripherals = Peripherals::take()?;
    let sysloop = EspSystemEventLoop::take()?;
    let nvs_partition = EspDefaultNvsPartition::take()?;

    // ── 2. Credentials ────────────────────────────────────────
    let store = NvsCredentialStore::new().map_err(pt100_gateway::error::Error::from)?;

    // ── 3. PT100 front-end on SPI2 ────────────────────────────
    // SAFETY: these GPIOs are used by nothing else on this board.
    let (sclk, mosi, miso, cs) = unsafe {
        (
            AnyOutputPin::new(pins::PT100_SCLK_GPIO),
            AnyOutputPin::new(pins::PT100_MOSI_GPIO),
            AnyInputPin::new(pins::PT100_MISO_GPIO),
            AnyOutputPin::new(pins::PT100_CS_GPIO),
        )
    };
    let spi_bus = SpiDriver::new(peripherals.spi2, sclk, mosi, Some(miso), &DriverConfig::new())?;
    let spi_config = SpiConfig::new()
        .baudrate(Hertz(pins::PT100_SPI_BAUD_HZ))
        .data_mode(embedded_hal::spi::MODE_1);
    let spi = SpiDeviceDriver::new(spi_bus, Some(cs), &spi_config)?;
    let mut sensor = Max31865::new(spi, config.pt100, Wires::Three).with_50hz_filter();

    // ── 4. Network: WiFi link + ThingsBoard session ───────────
    let wifi = EspWifi::new(peripherals.modem, sysloop, Some(nvs_partition))?;
    let client_id = device_id::device_id(&device_id::read_mac());
    info!("Device ID: {}", client_id);

    // Chunks must fit one MQTT frame to arrive unfragmented.
    let buffer_size = usize::from(config.backend.buffer_size)
        .max(usize::from(config.ota.chunk_size) + 512);
    let transport =
        EspMqttTransport::new(Arc::new(Inbox::new()), buffer_size, MQTT_CONNECT_TIMEOUT_MS);
    let session = ThingsBoardSession::new(transport, Esp32TimeAdapter::new(), &client_id);
    let mut network = GatewayNetwork::new(WifiLink::new(wifi), session);

    let mut system = EspSystem::new();
    let mut sink = LogEventSink::new();
    let clock = Esp32TimeAdapter::new();

    // ── 5. Boot sequence (blocks until the link is up) ────────
    let mut service = GatewayService::boot(
        config,
        identity,
        &store,
        &mut network,
        &mut sensor,
        &mut system,
        &mut sink,
    );
    if sensor.last_fault_status() != 0 {
        warn!("PT100: fault status 0x{:02X} at boot", sensor.last_fault_status());
    }

    info!("System ready. Entering main loop.");

    // ── 6. Main loop ──────────────────────────────────────────
    loop {
        service.tick(
            clock.uptime_ms(),
            &mut network,
            &mut sensor,
            &mut system,
            &mut sink,
        );
        FreeRtos::delay_ms(LOOP_IDLE_MS);
    }
}
