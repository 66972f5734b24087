//! Scd40 device definitions
//!
//! Copyright 2019 Ryan Kurte

/// Scd40 default I2C address
pub const DEFAULT_ADDRESS: u8 = 0x62;

/// Data ready status, the measurement is ready when any of these bits are set
pub const DATA_READY_MASK: u16 = 0x07FF;

/// Minimum time between starting periodic measurement and the first valid reading
pub const FIRST_MEASUREMENT_MS: u32 = 5000;

/// Temperature offset limits in degrees celsius, the extremes of the signed offset word
pub const TEMPERATURE_OFFSET_MIN: f32 = -87.5;
pub const TEMPERATURE_OFFSET_MAX: f32 = 87.49;

/// Scd40 I2C Command
/// Command and data are big endian 16-bit unsigned integers, all data words are followed by a CRC-8 checksum
#[derive(PartialEq, Clone, Copy, Debug)]
pub enum Command {
    /// Start periodic measurement, new data every 5 seconds
    /// No associated data or CRC
    StartPeriodicMeasurement = 0x21b1,

    /// Read a measurement from the buffer
    /// Returns CO2 (ppm), temperature and relative humidity words
    ReadMeasurement = 0xec05,

    /// Stop periodic measurement
    /// Required before most configuration commands are accepted
    StopPeriodicMeasurement = 0x3f86,

    /// Set temperature offset
    /// Data is a u16 of offset * 2^16 / 175
    SetTemperatureOffset = 0x241d,

    /// Get temperature offset, same encoding as above
    GetTemperatureOffset = 0x2318,

    /// Set ambient pressure for CO2 compensation
    /// Data is a u16 in hPa, accepted during periodic measurement
    SetAmbientPressure = 0xe000,

    /// Fetch data ready status
    GetDataReadyStatus = 0xe4b8,

    /// Fetch the 48-bit serial number as three words
    GetSerialNumber = 0x3682,
}

impl Command {
    /// Time required for the device to process the command, in milliseconds
    pub fn execution_ms(&self) -> u32 {
        match self {
            Command::StartPeriodicMeasurement => 0,
            Command::StopPeriodicMeasurement => 500,
            _ => 1,
        }
    }
}
