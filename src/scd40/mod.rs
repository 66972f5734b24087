//! Scd40 NDIR CO2 sensor driver
//!
//! Copyright 2019 Ryan Kurte

use core::fmt::Debug;
use core::marker::PhantomData;

use embedded_hal::blocking::delay::DelayMs;
use embedded_hal::blocking::i2c;

use crate::base::{decode_words, Base, WORD_LEN};
use crate::poll::Poll;
use crate::Error;

pub mod device;

pub use device::*;

/// Scd40 sensor object
/// This is generic over an I2C connector, a delay provider and the associated error type
pub struct Scd40<Conn, Delay, Err> {
    conn: Conn,
    delay: Delay,
    _err: PhantomData<Err>,
}

/// Scd40 measurement object
#[derive(PartialEq, Clone, Debug)]
pub struct Measurement {
    /// CO2 concentration in parts-per-million (PPM)
    /// Range: 0 - 40,000
    pub co2: u16,
    /// Temperature in degrees celsius
    /// Range: -10 - 60 C
    pub temperature: f64,
    /// Relative Humidity (%)
    /// Range: 0 - 100
    pub humidity: f64,
}

impl <Conn, Delay, Err> Scd40<Conn, Delay, Err> where
    Conn: i2c::Read<Error=Err> + i2c::Write<Error=Err> + i2c::WriteRead<Error=Err>,
    Delay: DelayMs<u32>,
    Err: Debug,
{
    /// Create a new Scd40 sensor instance
    ///
    /// The serial number is read as a communication check. A device left in periodic
    /// measurement mode will not respond, so on failure periodic measurement is
    /// stopped and the check retried once.
    pub fn new(conn: Conn, delay: Delay) -> Result<Self, Error<Err>> {
        // Create sensor object
        let mut s = Scd40{ conn, delay, _err: PhantomData };

        // Check communication
        let serial = s.stop_and_retry(|s| s.check_serial_number())
            .map_err(|e| {
                error!("Failed to connect to SCD40: {:?}", e);
                e
            })?;

        debug!("Connected to SCD40, serial: 0x{:012x}", serial);

        // Return sensor
        Ok(s)
    }

    /// Start periodic measurement
    /// The first measurement is available after ~5 s (see [`FIRST_MEASUREMENT_MS`])
    pub fn start_periodic_measurement(&mut self) -> Result<(), Error<Err>> {
        self.write_command(Command::StartPeriodicMeasurement, None)
    }

    /// Stop periodic measurement
    pub fn stop_periodic_measurement(&mut self) -> Result<(), Error<Err>> {
        self.write_command(Command::StopPeriodicMeasurement, None)
    }

    /// Read the 48-bit serial number
    pub fn get_serial_number(&mut self) -> Result<u64, Error<Err>> {
        let [w0, w1, w2] = self.read_words::<3>(Command::GetSerialNumber)?;

        Ok((w0 as u64) << 32 | (w1 as u64) << 16 | w2 as u64)
    }

    fn check_serial_number(&mut self) -> Result<u64, Error<Err>> {
        match self.get_serial_number()? {
            0 => Err(Error::NoDevice),
            serial => Ok(serial),
        }
    }

    /// Check whether measurement data is available in the buffer
    pub fn data_ready(&mut self) -> Result<bool, Error<Err>> {
        let [status] = self.read_words::<1>(Command::GetDataReadyStatus)?;

        Ok(status & DATA_READY_MASK != 0)
    }

    /// Poll the data ready status until a measurement is available
    ///
    /// Returns [`Error::Timeout`] if no measurement is ready within the polling budget
    pub fn wait_data_ready(&mut self, poll: &Poll) -> Result<(), Error<Err>> {
        for i in 0..poll.max_attempts {
            if self.data_ready()? {
                return Ok(());
            }

            if i + 1 < poll.max_attempts {
                self.delay.delay_ms(poll.interval_ms);
            }
        }

        warn!("SCD40 data not ready after {} polls", poll.max_attempts);

        Err(Error::Timeout)
    }

    /// Read CO2, temperature and humidity
    ///
    /// On a bus or CRC failure periodic measurement is stopped and the read retried once
    pub fn get_sensor_data(&mut self) -> Result<Measurement, Error<Err>> {
        let [co2, temperature, humidity] = self.read_measurement()?;

        let m = Measurement {
            co2,
            temperature: convert_temperature(temperature),
            humidity: convert_humidity(humidity),
        };

        debug!("CO2: {} ppm, Temperature: {:.2} C, Humidity: {:.2} %", m.co2, m.temperature, m.humidity);

        Ok(m)
    }

    /// Read the CO2 concentration only
    pub fn get_co2_data(&mut self) -> Result<u16, Error<Err>> {
        let [co2, _, _] = self.read_measurement()?;
        Ok(co2)
    }

    fn read_measurement(&mut self) -> Result<[u16; 3], Error<Err>> {
        self.stop_and_retry(|s| s.read_words::<3>(Command::ReadMeasurement))
    }

    /// Set the temperature offset in degrees celsius
    ///
    /// Periodic measurement must be stopped. Offsets outside
    /// [`TEMPERATURE_OFFSET_MIN`]..=[`TEMPERATURE_OFFSET_MAX`] are rejected with
    /// [`Error::OutOfRange`] without touching the bus.
    pub fn set_temperature_offset(&mut self, offset: f32) -> Result<(), Error<Err>> {
        if !(TEMPERATURE_OFFSET_MIN..=TEMPERATURE_OFFSET_MAX).contains(&offset) {
            error!("Temperature offset {} C outside supported range", offset);
            return Err(Error::OutOfRange);
        }

        // Two's complement so that negative offsets survive a read back
        let raw = (offset * 65536.0 / 175.0) as i16 as u16;

        debug!("Setting temperature offset {:.2} C (0x{:04x})", offset, raw);

        self.write_command(Command::SetTemperatureOffset, Some(raw))
    }

    /// Read the temperature offset in degrees celsius, rounded to 0.1 C
    /// Periodic measurement must be stopped
    pub fn get_temperature_offset(&mut self) -> Result<f32, Error<Err>> {
        let [raw] = self.read_words::<1>(Command::GetTemperatureOffset)?;
        let raw = raw as i16;
        let offset = 175.0 * raw as f32 / 65536.0;

        Ok((offset * 10.0).round() / 10.0)
    }

    /// Set ambient pressure in hPa for CO2 compensation
    pub fn set_ambient_pressure(&mut self, pressure: u16) -> Result<(), Error<Err>> {
        self.write_command(Command::SetAmbientPressure, Some(pressure))
    }

    /// Release the underlying connector and delay
    pub fn release(self) -> (Conn, Delay) {
        (self.conn, self.delay)
    }

    /// Run an operation, stopping periodic measurement and retrying once on failure
    fn stop_and_retry<T, F>(&mut self, mut f: F) -> Result<T, Error<Err>>
    where
        F: FnMut(&mut Self) -> Result<T, Error<Err>>,
    {
        match f(self) {
            Ok(v) => Ok(v),
            Err(e) => {
                warn!("SCD40 command failed ({:?}), stopping periodic measurement and retrying", e);

                // Report the command failure rather than the stop failure
                if let Err(stop_err) = self.stop_periodic_measurement() {
                    error!("Failed to stop SCD40 periodic measurement: {:?}", stop_err);
                    return Err(e);
                }

                f(self)
            },
        }
    }

    fn write_command(&mut self, command: Command, data: Option<u16>) -> Result<(), Error<Err>> {
        self.conn.write_command(DEFAULT_ADDRESS, command as u16, data)?;

        // Wait for the command to be processed
        match command.execution_ms() {
            0 => (),
            ms => self.delay.delay_ms(ms),
        }

        Ok(())
    }

    fn read_command(&mut self, command: Command, data: &mut [u8]) -> Result<(), Error<Err>> {
        // Note: command, execution delay, then read, as specified in the datasheet
        self.write_command(command, None)?;

        self.conn.read_response(DEFAULT_ADDRESS, data)
    }

    /// Issue a command and decode the CRC checked words of the response
    fn read_words<const N: usize>(&mut self, command: Command) -> Result<[u16; N], Error<Err>> {
        let mut buff = [[0u8; WORD_LEN]; N];

        self.read_command(command, buff.as_flattened_mut())?;

        decode_words(&buff)
    }
}

/// Convert a raw temperature word to degrees celsius
pub fn convert_temperature(raw: u16) -> f64 {
    175.0 * (raw as f64 / 65535.0) - 45.0
}

/// Convert a raw humidity word to relative humidity (%)
pub fn convert_humidity(raw: u16) -> f64 {
    100.0 * (raw as f64 / 65535.0)
}
