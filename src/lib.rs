//! Environmental sensor drivers for the smart clock
//!
//! Provides an `embedded-hal` driver for the Bosch BME280 pressure / temperature /
//! humidity sensor and the Sensirion SCD40 NDIR CO2 sensor, along with a
//! mutex-arbitrated bus handle so both can share one I2C peripheral.
//!
//! Copyright 2019 Ryan Kurte

#[macro_use]
extern crate log;

extern crate embedded_hal;

pub mod base;
pub mod bme280;
pub mod bus;
pub mod poll;
pub mod record;
pub mod scd40;

pub use bme280::Bme280;
pub use bus::{BusError, SharedBus};
pub use scd40::Scd40;

/// Sensor error object, generic over the underlying connection error
#[derive(Debug)]
pub enum Error<ConnErr> {
    /// Bus communication error
    Conn(ConnErr),
    /// CRC mismatch (computed, received)
    Crc(u8, u8),
    /// Device identified itself with an unexpected chip ID
    UnexpectedId(u8),
    /// Device returned an empty identity
    NoDevice,
    /// Device did not become ready within the polling budget
    Timeout,
    /// Argument outside the range the device can represent
    OutOfRange,
}

impl <ConnErr> From<ConnErr> for Error<ConnErr> {
    fn from(conn_err: ConnErr) -> Self {
        Error::Conn(conn_err)
    }
}
