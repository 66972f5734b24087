//! Bme280 factory calibration and compensation
//!
//! Compensation follows the integer (temperature, pressure) and floating point
//! (humidity) formulas from the Bosch reference driver, including the points at
//! which intermediate values are truncated.
//!
//! Copyright 2019 Ryan Kurte

use super::device::{CALIB_H_LEN, CALIB_TP_LEN};

/// Temperature limits in 1/100 degC
pub const TEMPERATURE_MIN: i32 = -4000;
pub const TEMPERATURE_MAX: i32 = 8500;

/// Pressure limits in 1/100 Pa (300.00 hPa and 1100.00 hPa)
pub const PRESSURE_MIN: u32 = 3_000_000;
pub const PRESSURE_MAX: u32 = 11_000_000;

/// Humidity limits in %RH
pub const HUMIDITY_MIN: f64 = 0.0;
pub const HUMIDITY_MAX: f64 = 100.0;

/// Fine resolution temperature produced by temperature compensation,
/// required to compensate pressure and humidity from the same sample
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub struct FineTemperature(pub i32);

/// Raw ADC sample from one measurement burst
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub struct RawSample {
    /// 20-bit pressure
    pub pressure: u32,
    /// 20-bit temperature
    pub temperature: u32,
    /// 16-bit humidity
    pub humidity: u32,
}

impl RawSample {
    /// Unpack the 8 byte burst starting at press_msb
    pub fn from_bytes(b: &[u8; 8]) -> Self {
        let pressure = (b[0] as u32) << 12 | (b[1] as u32) << 4 | (b[2] as u32) >> 4;
        let temperature = (b[3] as u32) << 12 | (b[4] as u32) << 4 | (b[5] as u32) >> 4;
        let humidity = (b[6] as u32) << 8 | b[7] as u32;

        Self{ pressure, temperature, humidity }
    }
}

/// Factory calibration coefficients, read once at initialisation
#[derive(PartialEq, Eq, Clone, Debug, Default)]
pub struct Calibration {
    pub dig_t1: u16,
    pub dig_t2: i16,
    pub dig_t3: i16,

    pub dig_p1: u16,
    pub dig_p2: i16,
    pub dig_p3: i16,
    pub dig_p4: i16,
    pub dig_p5: i16,
    pub dig_p6: i16,
    pub dig_p7: i16,
    pub dig_p8: i16,
    pub dig_p9: i16,

    pub dig_h1: u8,
    pub dig_h2: i16,
    pub dig_h3: u8,
    pub dig_h4: i16,
    pub dig_h5: i16,
    pub dig_h6: i8,
}

impl Calibration {
    /// Decode calibration from the three register blocks
    ///
    /// `tp` is 0x88..=0x9F, `h1` is 0xA1 and `h` is 0xE1..=0xE7
    pub fn from_registers(tp: &[u8; CALIB_TP_LEN], h1: u8, h: &[u8; CALIB_H_LEN]) -> Self {
        let u16_at = |i: usize| u16::from_le_bytes([tp[i], tp[i + 1]]);
        let i16_at = |i: usize| i16::from_le_bytes([tp[i], tp[i + 1]]);

        // dig_H4 and dig_H5 share the nibbles of 0xE5, with signed MSBs
        let dig_h4 = (h[3] as i8 as i16) << 4 | (h[4] & 0x0F) as i16;
        let dig_h5 = (h[5] as i8 as i16) << 4 | (h[4] >> 4) as i16;

        Self {
            dig_t1: u16_at(0),
            dig_t2: i16_at(2),
            dig_t3: i16_at(4),

            dig_p1: u16_at(6),
            dig_p2: i16_at(8),
            dig_p3: i16_at(10),
            dig_p4: i16_at(12),
            dig_p5: i16_at(14),
            dig_p6: i16_at(16),
            dig_p7: i16_at(18),
            dig_p8: i16_at(20),
            dig_p9: i16_at(22),

            dig_h1: h1,
            dig_h2: i16::from_le_bytes([h[0], h[1]]),
            dig_h3: h[2],
            dig_h4,
            dig_h5,
            dig_h6: h[6] as i8,
        }
    }

    /// Compensate raw temperature, returning degC and the fine temperature
    pub fn compensate_temperature(&self, adc_t: u32) -> (f32, FineTemperature) {
        let adc_t = adc_t as i32;
        let t1 = self.dig_t1 as i32;

        let var1 = (adc_t / 8).wrapping_sub(t1 * 2);
        let var1 = var1.wrapping_mul(self.dig_t2 as i32) / 2048;

        let var2 = (adc_t / 16).wrapping_sub(t1);
        let var2 = (var2.wrapping_mul(var2) / 4096).wrapping_mul(self.dig_t3 as i32) / 16384;

        let t_fine = var1.wrapping_add(var2);

        let temperature = (t_fine.wrapping_mul(5).wrapping_add(128) / 256)
            .clamp(TEMPERATURE_MIN, TEMPERATURE_MAX);

        (temperature as f32 / 100.0, FineTemperature(t_fine))
    }

    /// Compensate raw pressure in 1/100 Pa
    ///
    /// Intermediate values wrap as in the reference integer driver, the result
    /// is clamped before narrowing so that negative outputs land on the floor.
    pub fn compensate_pressure_raw(&self, adc_p: u32, t_fine: FineTemperature) -> u32 {
        let mut var1 = (t_fine.0 as i64).wrapping_sub(128000);
        let mut var2 = var1.wrapping_mul(var1).wrapping_mul(self.dig_p6 as i64);
        var2 = var2.wrapping_add(var1.wrapping_mul(self.dig_p5 as i64).wrapping_mul(131072));
        var2 = var2.wrapping_add((self.dig_p4 as i64).wrapping_mul(34359738368));
        var1 = (var1.wrapping_mul(var1).wrapping_mul(self.dig_p3 as i64) / 256)
            .wrapping_add(var1.wrapping_mul(self.dig_p2 as i64).wrapping_mul(4096));
        let var3: i64 = 140737488355328;
        var1 = var3.wrapping_add(var1).wrapping_mul(self.dig_p1 as i64) / 8589934592;

        // Avoid division by zero
        if var1 == 0 {
            return PRESSURE_MIN;
        }

        let mut var4: i64 = 1048576 - adc_p as i64;
        var4 = var4.wrapping_mul(2147483648).wrapping_sub(var2).wrapping_mul(3125).wrapping_div(var1);
        var1 = (self.dig_p9 as i64).wrapping_mul(var4 / 8192).wrapping_mul(var4 / 8192) / 33554432;
        var2 = (self.dig_p8 as i64).wrapping_mul(var4) / 524288;
        var4 = (var4.wrapping_add(var1).wrapping_add(var2) / 256).wrapping_add(self.dig_p7 as i64 * 16);

        let pressure = (var4 / 2).wrapping_mul(100) / 128;

        pressure.clamp(PRESSURE_MIN as i64, PRESSURE_MAX as i64) as u32
    }

    /// Compensate raw pressure in hPa
    pub fn compensate_pressure(&self, adc_p: u32, t_fine: FineTemperature) -> f32 {
        self.compensate_pressure_raw(adc_p, t_fine) as f32 / 10000.0
    }

    /// Compensate raw humidity in %RH
    pub fn compensate_humidity(&self, adc_h: u32, t_fine: FineTemperature) -> f64 {
        let h1 = self.dig_h1 as f64;
        let h2 = self.dig_h2 as f64;
        let h3 = self.dig_h3 as f64;
        let h4 = self.dig_h4 as f64;
        let h5 = self.dig_h5 as f64;
        let h6 = self.dig_h6 as f64;

        let mut humidity = t_fine.0 as f64 - 76800.0;
        humidity = (adc_h as f64 - (h4 * 64.0 + h5 / 16384.0 * humidity))
            * (h2 / 65536.0 * (1.0 + h6 / 67108864.0 * humidity * (1.0 + h3 / 67108864.0 * humidity)));
        humidity *= 1.0 - h1 * humidity / 524288.0;

        humidity.clamp(HUMIDITY_MIN, HUMIDITY_MAX)
    }
}
