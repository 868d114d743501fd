//! PT100 RTD front-end: MAX31865 over SPI.
//!
//! The converter runs in continuous (auto-convert) mode with the bias
//! voltage permanently on, so a read is a single register fetch.  The
//! ratio is converted with the Callendar–Van Dusen equation; below 0 °C
//! the fifth-order polynomial approximation is used instead.
//!
//! ## Dual-target design
//!
//! The driver is generic over [`embedded_hal::spi::SpiDevice`]: on
//! ESP-IDF it is handed an `esp-idf-hal` SPI device driver, on host tests a
//! register-file mock.

use embedded_hal::spi::{Operation, SpiDevice};
use log::warn;

use crate::app::ports::{SensorPort, TemperatureReading};
use crate::config::Pt100Calibration;
use crate::error::SensorError;

// ── Register map ──────────────────────────────────────────────

const REG_CONFIG: u8 = 0x00;
const REG_RTD_MSB: u8 = 0x01;
const REG_HIGH_FAULT_MSB: u8 = 0x03;
const REG_FAULT_STATUS: u8 = 0x07;
const WRITE_BIT: u8 = 0x80;

const CFG_BIAS: u8 = 0x80;
const CFG_AUTO_CONVERT: u8 = 0x40;
const CFG_3WIRE: u8 = 0x10;
const CFG_FAULT_CLEAR: u8 = 0x02;
const CFG_FILTER_50HZ: u8 = 0x01;

// ── Callendar–Van Dusen coefficients (IEC 60751) ──────────────

const CVD_A: f32 = 3.9083e-3;
const CVD_B: f32 = -5.775e-7;

/// RTD wiring scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wires {
    Two,
    Three,
    Four,
}

pub struct Max31865<SPI> {
    spi: SPI,
    calibration: Pt100Calibration,
    wires: Wires,
    filter_50hz: bool,
    last_fault_status: u8,
}

impl<SPI: SpiDevice> Max31865<SPI> {
    pub fn new(spi: SPI, calibration: Pt100Calibration, wires: Wires) -> Self {
        Self {
            spi,
            calibration,
            wires,
            filter_50hz: false,
            last_fault_status: 0,
        }
    }

    /// Reject 50 Hz mains instead of 60 Hz.  Applied at the next `begin`.
    pub fn with_50hz_filter(mut self) -> Self {
        self.filter_50hz = true;
        self
    }

    /// Fault status register captured on the most recent faulted read.
    pub fn last_fault_status(&self) -> u8 {
        self.last_fault_status
    }

    pub fn release(self) -> SPI {
        self.spi
    }

    fn config_byte(&self) -> u8 {
        let mut cfg = CFG_BIAS | CFG_AUTO_CONVERT;
        if self.wires == Wires::Three {
            cfg |= CFG_3WIRE;
        }
        if self.filter_50hz {
            cfg |= CFG_FILTER_50HZ;
        }
        cfg
    }

    fn write_reg(&mut self, reg: u8, value: u8) -> Result<(), SensorError> {
        self.spi
            .write(&[reg | WRITE_BIT, value])
            .map_err(|_| SensorError::BusFailed)
    }

    fn read_regs(&mut self, reg: u8, buf: &mut [u8]) -> Result<(), SensorError> {
        self.spi
            .transaction(&mut [Operation::Write(&[reg & !WRITE_BIT]), Operation::Read(buf)])
            .map_err(|_| SensorError::BusFailed)
    }

    /// Raw 15-bit RTD code and the RTD fault bit.
    fn read_rtd(&mut self) -> Result<(u16, bool), SensorError> {
        let mut buf = [0u8; 2];
        self.read_regs(REG_RTD_MSB, &mut buf)?;
        let word = u16::from_be_bytes(buf);
        Ok((word >> 1, word & 0x0001 != 0))
    }

    fn read_and_clear_fault(&mut self) -> Result<u8, SensorError> {
        let mut status = [0u8; 1];
        self.read_regs(REG_FAULT_STATUS, &mut status)?;
        let cfg = self.config_byte() | CFG_FAULT_CLEAR;
        self.write_reg(REG_CONFIG, cfg)?;
        Ok(status[0])
    }
}

impl<SPI: SpiDevice> SensorPort for Max31865<SPI> {
    fn begin(&mut self) -> Result<(), SensorError> {
        // Widest fault window: only open/short conditions trip.
        self.spi
            .write(&[REG_HIGH_FAULT_MSB | WRITE_BIT, 0xFF, 0xFF, 0x00, 0x00])
            .map_err(|_| SensorError::BusFailed)?;
        let cfg = self.config_byte() | CFG_FAULT_CLEAR;
        self.write_reg(REG_CONFIG, cfg)
    }

    fn read_temperature(&mut self) -> TemperatureReading {
        let (code, rtd_fault) = match self.read_rtd() {
            Ok(r) => r,
            Err(e) => {
                warn!("PT100: {}", e);
                return TemperatureReading {
                    celsius: f32::NAN,
                    fault: true,
                };
            }
        };

        let mut fault = rtd_fault;
        if rtd_fault {
            match self.read_and_clear_fault() {
                Ok(status) => {
                    self.last_fault_status = status;
                    warn!("PT100: fault status 0x{:02X}", status);
                }
                Err(e) => warn!("PT100: fault read failed: {}", e),
            }
        }

        let celsius = code_to_celsius(
            code,
            self.calibration.nominal_ohms,
            self.calibration.reference_ohms,
        );
        if !celsius.is_finite() {
            fault = true;
        }
        TemperatureReading { celsius, fault }
    }
}

// ── Conversion ────────────────────────────────────────────────

/// RTD resistance from the 15-bit ratio code.
pub fn code_to_ohms(code: u16, reference_ohms: f32) -> f32 {
    f32::from(code) / 32768.0 * reference_ohms
}

/// Temperature in °C from the 15-bit ratio code.
pub fn code_to_celsius(code: u16, nominal_ohms: f32, reference_ohms: f32) -> f32 {
    let rt = code_to_ohms(code, reference_ohms);
    resistance_to_celsius(rt, nominal_ohms)
}

/// Callendar–Van Dusen inversion, with a polynomial fit below 0 °C.
pub fn resistance_to_celsius(rt: f32, nominal_ohms: f32) -> f32 {
    let z1 = -CVD_A;
    let z2 = CVD_A * CVD_A - 4.0 * CVD_B;
    let z3 = (4.0 * CVD_B) / nominal_ohms;
    let z4 = 2.0 * CVD_B;

    let temp = ((z2 + z3 * rt).sqrt() + z1) / z4;
    if temp >= 0.0 {
        return temp;
    }

    // Normalise to a 100 Ω element for the polynomial.
    let r = rt / nominal_ohms * 100.0;
    let r2 = r * r;
    let r3 = r2 * r;
    let r4 = r3 * r;
    let r5 = r4 * r;
    -242.02 + 2.2228 * r + 2.5859e-3 * r2 - 4.8260e-6 * r3 - 2.8183e-8 * r4 + 1.5243e-10 * r5
}
