//! GPIO / peripheral pin assignments for the PT100 gateway board.
//!
//! Single source of truth: the SPI bus for the MAX31865 front-end is built
//! from these numbers in `main`.

// ---------------------------------------------------------------------------
// MAX31865 RTD converter (SPI2, mode 1)
// ---------------------------------------------------------------------------

/// Chip select, active LOW.
pub const PT100_CS_GPIO: i32 = 18;
pub const PT100_MOSI_GPIO: i32 = 17;
pub const PT100_MISO_GPIO: i32 = 16;
pub const PT100_SCLK_GPIO: i32 = 4;

/// SPI clock for the converter (max 5 MHz per datasheet).
pub const PT100_SPI_BAUD_HZ: u32 = 1_000_000;
