//! Bme280 device definitions
//!
//! Copyright 2019 Ryan Kurte

/// Bme280 default I2C address (SDO pulled low)
pub const DEFAULT_ADDRESS: u8 = 0x76;
/// Bme280 alternate I2C address (SDO pulled high)
pub const ALTERNATE_ADDRESS: u8 = 0x77;

/// Chip ID reported by a BME280
pub const CHIP_ID: u8 = 0x60;

/// Value written to the reset register to trigger a power-on-reset
pub const SOFT_RESET: u8 = 0xB6;

/// Bme280 registers
#[derive(PartialEq, Clone, Copy, Debug)]
pub enum Register {
    /// Start of the temperature and pressure calibration block (0x88..=0x9F)
    Calib00 = 0x88,
    /// dig_H1
    Calib25 = 0xA1,
    /// Chip identification
    Id = 0xD0,
    /// Soft reset
    Reset = 0xE0,
    /// Start of the humidity calibration block (0xE1..=0xE7)
    Calib26 = 0xE1,
    /// Humidity oversampling, only applied after a write to CTRL_MEAS
    CtrlHum = 0xF2,
    /// Device status
    Status = 0xF3,
    /// Temperature / pressure oversampling and mode
    CtrlMeas = 0xF4,
    /// Standby, IIR filter and SPI 3-wire enable
    Config = 0xF5,
    /// Start of the measurement burst (press_msb .. hum_lsb)
    PressMsb = 0xF7,
}

/// Temperature / pressure calibration block length
pub const CALIB_TP_LEN: usize = 24;
/// Humidity calibration block length
pub const CALIB_H_LEN: usize = 7;
/// Measurement burst length
pub const DATA_LEN: usize = 8;

/// Status: conversion running
pub const STATUS_MEASURING: u8 = 1 << 3;
/// Status: NVM data being copied to image registers
pub const STATUS_IM_UPDATE: u8 = 1 << 0;

/// CTRL_MEAS field positions and masks
pub const OSRS_T_SHIFT: u8 = 5;
pub const OSRS_T_MASK: u8 = 0xE0;
pub const OSRS_P_SHIFT: u8 = 2;
pub const OSRS_P_MASK: u8 = 0x1C;
pub const MODE_MASK: u8 = 0x03;

/// CTRL_HUM field mask
pub const OSRS_H_MASK: u8 = 0x07;

/// CONFIG field positions and masks
pub const STANDBY_SHIFT: u8 = 5;
pub const STANDBY_MASK: u8 = 0xE0;
pub const FILTER_SHIFT: u8 = 2;
pub const FILTER_MASK: u8 = 0x1C;

/// Oversampling selector, shared by all three measurements
#[derive(PartialEq, Clone, Copy, Debug)]
pub enum Oversampling {
    /// Measurement skipped
    Skipped = 0x00,
    X1 = 0x01,
    X2 = 0x02,
    X4 = 0x03,
    X8 = 0x04,
    X16 = 0x05,
}

impl Oversampling {
    /// Decode a 3-bit field, reserved values map to 16x as per the datasheet
    pub fn from_bits(v: u8) -> Self {
        match v & 0x07 {
            0x00 => Oversampling::Skipped,
            0x01 => Oversampling::X1,
            0x02 => Oversampling::X2,
            0x03 => Oversampling::X4,
            0x04 => Oversampling::X8,
            _ => Oversampling::X16,
        }
    }
}

/// Sensor operating mode
#[derive(PartialEq, Clone, Copy, Debug)]
pub enum Mode {
    Sleep = 0x00,
    /// Single conversion then return to sleep
    Forced = 0x01,
    /// Continuous conversion with standby between cycles
    Normal = 0x03,
}

impl Mode {
    pub fn from_bits(v: u8) -> Self {
        match v & MODE_MASK {
            0x00 => Mode::Sleep,
            0x03 => Mode::Normal,
            // 0b01 and 0b10 both select forced mode
            _ => Mode::Forced,
        }
    }
}

/// Inactive duration between conversions in normal mode
#[derive(PartialEq, Clone, Copy, Debug)]
pub enum Standby {
    Ms0_5 = 0x00,
    Ms62_5 = 0x01,
    Ms125 = 0x02,
    Ms250 = 0x03,
    Ms500 = 0x04,
    Ms1000 = 0x05,
    Ms10 = 0x06,
    Ms20 = 0x07,
}

/// IIR filter coefficient
#[derive(PartialEq, Clone, Copy, Debug)]
pub enum Filter {
    Off = 0x00,
    X2 = 0x01,
    X4 = 0x02,
    X8 = 0x03,
    X16 = 0x04,
}

/// Device configuration applied at initialisation
#[derive(PartialEq, Clone, Copy, Debug)]
pub struct Settings {
    pub humidity: Oversampling,
    pub temperature: Oversampling,
    pub pressure: Oversampling,
    pub mode: Mode,
    pub standby: Standby,
    pub filter: Filter,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            humidity: Oversampling::X1,
            temperature: Oversampling::X1,
            pressure: Oversampling::X1,
            mode: Mode::Forced,
            standby: Standby::Ms500,
            filter: Filter::Off,
        }
    }
}

impl Settings {
    /// CONFIG register value (SPI 3-wire always disabled)
    pub fn config(&self) -> u8 {
        (self.standby as u8) << STANDBY_SHIFT | (self.filter as u8) << FILTER_SHIFT
    }

    /// CTRL_MEAS register value
    pub fn ctrl_meas(&self) -> u8 {
        (self.temperature as u8) << OSRS_T_SHIFT | (self.pressure as u8) << OSRS_P_SHIFT | self.mode as u8
    }

    /// CTRL_HUM register value
    pub fn ctrl_hum(&self) -> u8 {
        self.humidity as u8 & OSRS_H_MASK
    }
}
