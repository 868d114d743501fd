//! Integration test driver for `tests/integration/` submodule.
//!
//! Each `mod` below maps to a file that exercises the gateway loop
//! against mock ports (or the host-simulated adapters).  All tests run on
//! the host with no radio, broker or SPI bus required.

mod boot_tests;
mod mock_ports;
mod telemetry_tests;
mod update_tests;
