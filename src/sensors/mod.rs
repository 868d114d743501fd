//! Sensor front-ends.
//!
//! The gateway has a single probe: a PT100 read through a MAX31865
//! converter.  The driver implements [`SensorPort`](crate::app::ports::SensorPort)
//! directly; no aggregation layer is needed.

pub mod pt100;

pub use pt100::{Max31865, Wires};
