//! Bme280 pressure / temperature / humidity sensor driver
//!
//! Copyright 2019 Ryan Kurte

use core::fmt::Debug;
use core::marker::PhantomData;

use embedded_hal::blocking::delay::DelayMs;
use embedded_hal::blocking::i2c;

use crate::base::Base;
use crate::poll::Poll;
use crate::Error;

pub mod calibration;
pub mod device;

pub use calibration::{Calibration, FineTemperature, RawSample};
pub use device::*;

/// Interval between status polls while a forced conversion runs
pub const BUSY_POLL_INTERVAL_MS: u32 = 50;
/// Status polls before a forced conversion is considered stuck
pub const BUSY_POLL_ATTEMPTS: u32 = 40;

/// Bme280 sensor object
/// This is generic over an I2C connector, a delay provider and the associated error type
pub struct Bme280<Conn, Delay, Err> {
    conn: Conn,
    delay: Delay,
    address: u8,
    calibration: Calibration,
    settings: Settings,
    poll: Poll,
    _err: PhantomData<Err>,
}

/// Bme280 compensated measurement
#[derive(PartialEq, Clone, Debug)]
pub struct Measurement {
    /// Temperature in degrees celsius
    /// Range: -40 - 85 C
    pub temperature: f32,
    /// Pressure in hectopascal
    /// Range: 300 - 1100 hPa
    pub pressure: f32,
    /// Relative humidity (%)
    /// Range: 0 - 100
    pub humidity: f64,
}

impl <Conn, Delay, Err> Bme280<Conn, Delay, Err> where
    Conn: i2c::Read<Error=Err> + i2c::Write<Error=Err> + i2c::WriteRead<Error=Err>,
    Delay: DelayMs<u32>,
    Err: Debug,
{
    /// Create and initialise a Bme280 at the default address
    pub fn new(conn: Conn, delay: Delay, settings: Settings) -> Result<Self, Error<Err>> {
        Self::with_address(conn, delay, DEFAULT_ADDRESS, settings)
    }

    /// Create and initialise a Bme280 at the provided address
    pub fn with_address(conn: Conn, delay: Delay, address: u8, settings: Settings) -> Result<Self, Error<Err>> {
        let mut s = Bme280 {
            conn,
            delay,
            address,
            calibration: Calibration::default(),
            settings,
            poll: Poll::new(BUSY_POLL_INTERVAL_MS, BUSY_POLL_ATTEMPTS),
            _err: PhantomData,
        };

        if let Err(e) = s.configure() {
            error!("Failed to initialise BME280 (addr 0x{:02x}): {:?}", address, e);
            return Err(e);
        }

        Ok(s)
    }

    fn configure(&mut self) -> Result<(), Error<Err>> {
        debug!("Configuring BME280: {:?}", self.settings);

        self.conn.write_register(self.address, Register::Config as u8, self.settings.config())?;

        self.calibration = self.read_calibration()?;

        // CTRL_HUM only takes effect after the following CTRL_MEAS write
        self.conn.write_register(self.address, Register::CtrlHum as u8, self.settings.ctrl_hum())?;
        self.conn.write_register(self.address, Register::CtrlMeas as u8, self.settings.ctrl_meas())?;

        Ok(())
    }

    fn read_calibration(&mut self) -> Result<Calibration, Error<Err>> {
        let mut tp = [0u8; CALIB_TP_LEN];
        self.conn.read_registers(self.address, Register::Calib00 as u8, &mut tp)?;

        let h1 = self.conn.read_register(self.address, Register::Calib25 as u8)?;

        let mut h = [0u8; CALIB_H_LEN];
        self.conn.read_registers(self.address, Register::Calib26 as u8, &mut h)?;

        let c = Calibration::from_registers(&tp, h1, &h);

        debug!("Calibration: {:?}", c);

        Ok(c)
    }

    /// Fetch factory calibration read at initialisation
    pub fn calibration(&self) -> &Calibration {
        &self.calibration
    }

    /// Fetch the current (shadowed) device settings
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Override the busy polling budget used in forced mode
    pub fn set_poll(&mut self, poll: Poll) {
        self.poll = poll;
    }

    /// Acquire and compensate a full measurement
    pub fn get_all_results(&mut self) -> Result<Measurement, Error<Err>> {
        let raw = self.get_sensor_data()?;

        // Temperature first, the fine temperature feeds the others
        let (temperature, t_fine) = self.calibration.compensate_temperature(raw.temperature);
        let pressure = self.calibration.compensate_pressure(raw.pressure, t_fine);
        let humidity = self.calibration.compensate_humidity(raw.humidity, t_fine);

        debug!("Temperature: {:.2} C, Pressure: {:.2} hPa, Humidity: {:.2} %", temperature, pressure, humidity);

        Ok(Measurement{ temperature, pressure, humidity })
    }

    /// Acquire a raw sample, triggering and awaiting a conversion in forced mode
    pub fn get_sensor_data(&mut self) -> Result<RawSample, Error<Err>> {
        if self.settings.mode == Mode::Forced {
            self.set_mode(Mode::Forced)?;
            self.wait_for_measurement()?;
        }

        let mut buff = [0u8; DATA_LEN];
        self.conn.read_registers(self.address, Register::PressMsb as u8, &mut buff)?;

        let raw = RawSample::from_bytes(&buff);

        trace!("Raw sample: {:?}", raw);

        Ok(raw)
    }

    /// Poll status until both the measuring and NVM update flags clear
    fn wait_for_measurement(&mut self) -> Result<(), Error<Err>> {
        let Self { conn, delay, address, poll, .. } = self;
        let address = *address;

        // The bus is only held for each status read, not across the delay
        let ready = poll.until(delay, || -> Result<bool, Error<Err>> {
            let status = conn.read_register(address, Register::Status as u8)?;
            Ok((status & (STATUS_MEASURING | STATUS_IM_UPDATE)) == 0)
        })?;

        if !ready {
            error!("BME280 still busy after {} polls", poll.max_attempts);
            return Err(Error::Timeout);
        }

        Ok(())
    }

    /// Read the status register
    pub fn status(&mut self) -> Result<u8, Error<Err>> {
        self.conn.read_register(self.address, Register::Status as u8)
    }

    /// Check whether a conversion is running
    pub fn is_measuring(&mut self) -> Result<bool, Error<Err>> {
        Ok(self.status()? & STATUS_MEASURING != 0)
    }

    /// Check whether NVM data is being copied to the image registers
    pub fn is_updating(&mut self) -> Result<bool, Error<Err>> {
        Ok(self.status()? & STATUS_IM_UPDATE != 0)
    }

    /// Read the chip ID register
    pub fn get_device_id(&mut self) -> Result<u8, Error<Err>> {
        self.conn.read_register(self.address, Register::Id as u8)
    }

    /// Check the chip ID matches a BME280
    pub fn check_device_id(&mut self) -> Result<(), Error<Err>> {
        match self.get_device_id()? {
            CHIP_ID => Ok(()),
            id => {
                warn!("Unexpected BME280 chip ID: 0x{:02x}", id);
                Err(Error::UnexpectedId(id))
            },
        }
    }

    /// Soft reset the underlying device
    pub fn reset(&mut self) -> Result<(), Error<Err>> {
        self.conn.write_register(self.address, Register::Reset as u8, SOFT_RESET)
    }

    /// Set operating mode, preserving oversampling settings
    pub fn set_mode(&mut self, mode: Mode) -> Result<(), Error<Err>> {
        self.update_register(Register::CtrlMeas, MODE_MASK, mode as u8)?;
        self.settings.mode = mode;
        Ok(())
    }

    /// Set standby duration for normal mode
    pub fn set_config_standby_time(&mut self, standby: Standby) -> Result<(), Error<Err>> {
        self.update_register(Register::Config, STANDBY_MASK, (standby as u8) << STANDBY_SHIFT)?;
        self.settings.standby = standby;
        Ok(())
    }

    /// Set IIR filter coefficient
    pub fn set_config_filter(&mut self, filter: Filter) -> Result<(), Error<Err>> {
        self.update_register(Register::Config, FILTER_MASK, (filter as u8) << FILTER_SHIFT)?;
        self.settings.filter = filter;
        Ok(())
    }

    /// Set temperature oversampling
    pub fn set_temperature_oversampling(&mut self, os: Oversampling) -> Result<(), Error<Err>> {
        self.update_register(Register::CtrlMeas, OSRS_T_MASK, (os as u8) << OSRS_T_SHIFT)?;
        self.settings.temperature = os;
        Ok(())
    }

    /// Set pressure oversampling
    pub fn set_pressure_oversampling(&mut self, os: Oversampling) -> Result<(), Error<Err>> {
        self.update_register(Register::CtrlMeas, OSRS_P_MASK, (os as u8) << OSRS_P_SHIFT)?;
        self.settings.pressure = os;
        Ok(())
    }

    /// Set temperature and pressure oversampling together with the current mode
    pub fn set_oversampling(&mut self, temperature: Oversampling, pressure: Oversampling) -> Result<(), Error<Err>> {
        let settings = Settings{ temperature, pressure, ..self.settings };

        self.conn.write_register(self.address, Register::CtrlMeas as u8, settings.ctrl_meas())?;
        self.settings = settings;
        Ok(())
    }

    /// Set humidity oversampling
    pub fn set_humidity_oversampling(&mut self, os: Oversampling) -> Result<(), Error<Err>> {
        self.update_register(Register::CtrlHum, OSRS_H_MASK, os as u8)?;
        self.settings.humidity = os;

        // Rewrite CTRL_MEAS so the new humidity setting is latched
        let ctrl_meas = self.conn.read_register(self.address, Register::CtrlMeas as u8)?;
        self.conn.write_register(self.address, Register::CtrlMeas as u8, ctrl_meas)
    }

    /// Read-modify-write the bits of a register selected by `mask`
    fn update_register(&mut self, register: Register, mask: u8, value: u8) -> Result<(), Error<Err>> {
        let current = self.conn.read_register(self.address, register as u8)?;
        let updated = (current & !mask) | (value & mask);

        self.conn.write_register(self.address, register as u8, updated)
    }

    /// Release the underlying connector and delay
    pub fn release(self) -> (Conn, Delay) {
        (self.conn, self.delay)
    }
}

#[cfg(test)]
mod test {
    use std::io::ErrorKind;

    use embedded_hal_mock::MockError;
    use embedded_hal_mock::i2c::{Mock as I2cMock, Transaction as I2cTransaction};

    use assert_approx_eq::assert_approx_eq;

    use super::*;
    use super::calibration::test::{calibration, CALIB_H, CALIB_H1, CALIB_TP, DATA};
    use crate::mock::FakeDelay;

    const ADDR: u8 = DEFAULT_ADDRESS;

    /// Sensor object without running initialisation
    fn sensor(i2c: &I2cMock, settings: Settings) -> Bme280<I2cMock, FakeDelay, MockError> {
        Bme280 {
            conn: i2c.clone(),
            delay: FakeDelay::default(),
            address: ADDR,
            calibration: calibration(),
            settings,
            poll: Poll::new(BUSY_POLL_INTERVAL_MS, BUSY_POLL_ATTEMPTS),
            _err: PhantomData,
        }
    }

    fn init_transactions() -> Vec<I2cTransaction> {
        vec![
            I2cTransaction::write(ADDR, vec![0xF5, 0x80]),
            I2cTransaction::write_read(ADDR, vec![0x88], CALIB_TP.to_vec()),
            I2cTransaction::write_read(ADDR, vec![0xA1], vec![CALIB_H1]),
            I2cTransaction::write_read(ADDR, vec![0xE1], CALIB_H.to_vec()),
            I2cTransaction::write(ADDR, vec![0xF2, 0x01]),
            I2cTransaction::write(ADDR, vec![0xF4, 0x25]),
        ]
    }

    #[test]
    fn test_cold_start_forced() {
        let mut expectations = init_transactions();
        expectations.extend_from_slice(&[
            // Trigger forced conversion
            I2cTransaction::write_read(ADDR, vec![0xF4], vec![0x24]),
            I2cTransaction::write(ADDR, vec![0xF4, 0x25]),
            // Busy, then NVM update, then done
            I2cTransaction::write_read(ADDR, vec![0xF3], vec![STATUS_MEASURING]),
            I2cTransaction::write_read(ADDR, vec![0xF3], vec![STATUS_IM_UPDATE]),
            I2cTransaction::write_read(ADDR, vec![0xF3], vec![0x00]),
            I2cTransaction::write_read(ADDR, vec![0xF7], DATA.to_vec()),
        ]);
        let mut i2c = I2cMock::new(&expectations);

        let mut sensor = Bme280::new(i2c.clone(), FakeDelay::default(), Settings::default()).unwrap();
        assert_eq!(sensor.calibration(), &calibration());

        let m = sensor.get_all_results().unwrap();
        assert_approx_eq!(m.temperature, 25.08, 0.001);
        assert_approx_eq!(m.pressure, 1006.53, 0.01);
        assert_approx_eq!(m.humidity, 55.0, 0.01);
        assert!(m.pressure >= 300.0 && m.pressure <= 1100.0);
        assert!(m.humidity >= 0.0 && m.humidity <= 100.0);

        let (_, delay) = sensor.release();
        assert_eq!(delay.calls, vec![BUSY_POLL_INTERVAL_MS, BUSY_POLL_INTERVAL_MS]);

        i2c.done();
    }

    #[test]
    fn test_init_settings() {
        let settings = Settings {
            humidity: Oversampling::X4,
            temperature: Oversampling::X2,
            pressure: Oversampling::X16,
            mode: Mode::Normal,
            standby: Standby::Ms1000,
            filter: Filter::X4,
        };

        let expectations = [
            I2cTransaction::write(ALTERNATE_ADDRESS, vec![0xF5, 0xA8]),
            I2cTransaction::write_read(ALTERNATE_ADDRESS, vec![0x88], CALIB_TP.to_vec()),
            I2cTransaction::write_read(ALTERNATE_ADDRESS, vec![0xA1], vec![CALIB_H1]),
            I2cTransaction::write_read(ALTERNATE_ADDRESS, vec![0xE1], CALIB_H.to_vec()),
            I2cTransaction::write(ALTERNATE_ADDRESS, vec![0xF2, 0x03]),
            I2cTransaction::write(ALTERNATE_ADDRESS, vec![0xF4, 0x57]),
        ];
        let mut i2c = I2cMock::new(&expectations);

        let sensor = Bme280::with_address(i2c.clone(), FakeDelay::default(), ALTERNATE_ADDRESS, settings).unwrap();
        assert_eq!(sensor.settings(), &settings);

        i2c.done();
    }

    #[test]
    fn test_init_calibration_error() {
        let expectations = [
            I2cTransaction::write(ADDR, vec![0xF5, 0x80]),
            I2cTransaction::write_read(ADDR, vec![0x88], vec![0u8; CALIB_TP_LEN])
                .with_error(MockError::Io(ErrorKind::Other)),
        ];
        let mut i2c = I2cMock::new(&expectations);

        match Bme280::new(i2c.clone(), FakeDelay::default(), Settings::default()) {
            Err(Error::Conn(_)) => (),
            Err(e) => panic!("unexpected error: {:?}", e),
            Ok(_) => panic!("initialisation should fail"),
        }

        i2c.done();
    }

    #[test]
    fn test_normal_mode_read() {
        let expectations = [
            I2cTransaction::write_read(ADDR, vec![0xF7], DATA.to_vec()),
        ];
        let mut i2c = I2cMock::new(&expectations);

        let settings = Settings{ mode: Mode::Normal, ..Settings::default() };
        let mut sensor = sensor(&i2c, settings);

        let raw = sensor.get_sensor_data().unwrap();
        assert_eq!(raw, RawSample{ pressure: 415148, temperature: 519888, humidity: 30000 });

        i2c.done();
    }

    #[test]
    fn test_forced_timeout() {
        let expectations = [
            I2cTransaction::write_read(ADDR, vec![0xF4], vec![0x25]),
            I2cTransaction::write(ADDR, vec![0xF4, 0x25]),
            I2cTransaction::write_read(ADDR, vec![0xF3], vec![0x09]),
            I2cTransaction::write_read(ADDR, vec![0xF3], vec![0x08]),
            I2cTransaction::write_read(ADDR, vec![0xF3], vec![0x01]),
        ];
        let mut i2c = I2cMock::new(&expectations);

        let mut sensor = sensor(&i2c, Settings::default());
        sensor.set_poll(Poll::new(10, 3));

        match sensor.get_all_results() {
            Err(Error::Timeout) => (),
            r => panic!("unexpected result: {:?}", r),
        }

        let (_, delay) = sensor.release();
        assert_eq!(delay.calls, vec![10, 10]);

        i2c.done();
    }

    #[test]
    fn test_device_id() {
        let expectations = [
            I2cTransaction::write_read(ADDR, vec![0xD0], vec![0x60]),
            I2cTransaction::write_read(ADDR, vec![0xD0], vec![0x58]),
        ];
        let mut i2c = I2cMock::new(&expectations);

        let mut sensor = sensor(&i2c, Settings::default());
        sensor.check_device_id().unwrap();

        match sensor.check_device_id() {
            Err(Error::UnexpectedId(0x58)) => (),
            r => panic!("unexpected result: {:?}", r),
        }

        i2c.done();
    }

    #[test]
    fn test_status() {
        let expectations = [
            I2cTransaction::write_read(ADDR, vec![0xF3], vec![0x08]),
            I2cTransaction::write_read(ADDR, vec![0xF3], vec![0x08]),
            I2cTransaction::write_read(ADDR, vec![0xF3], vec![0x01]),
            I2cTransaction::write_read(ADDR, vec![0xF3], vec![0x01]),
        ];
        let mut i2c = I2cMock::new(&expectations);

        let mut sensor = sensor(&i2c, Settings::default());
        assert!(sensor.is_measuring().unwrap());
        assert!(!sensor.is_updating().unwrap());
        assert!(!sensor.is_measuring().unwrap());
        assert!(sensor.is_updating().unwrap());

        i2c.done();
    }

    #[test]
    fn test_reset() {
        let expectations = [
            I2cTransaction::write(ADDR, vec![0xE0, 0xB6]),
        ];
        let mut i2c = I2cMock::new(&expectations);

        let mut sensor = sensor(&i2c, Settings::default());
        sensor.reset().unwrap();

        i2c.done();
    }

    #[test]
    fn test_set_mode_preserves_oversampling() {
        let expectations = [
            I2cTransaction::write_read(ADDR, vec![0xF4], vec![0b101_010_01]),
            I2cTransaction::write(ADDR, vec![0xF4, 0b101_010_11]),
        ];
        let mut i2c = I2cMock::new(&expectations);

        let mut sensor = sensor(&i2c, Settings::default());
        sensor.set_mode(Mode::Normal).unwrap();
        assert_eq!(sensor.settings().mode, Mode::Normal);

        i2c.done();
    }

    #[test]
    fn test_set_config_fields() {
        let expectations = [
            // Standby 250ms, keep filter x8
            I2cTransaction::write_read(ADDR, vec![0xF5], vec![0b100_011_00]),
            I2cTransaction::write(ADDR, vec![0xF5, 0b011_011_00]),
            // Filter x2, keep standby 250ms
            I2cTransaction::write_read(ADDR, vec![0xF5], vec![0b011_011_00]),
            I2cTransaction::write(ADDR, vec![0xF5, 0b011_001_00]),
        ];
        let mut i2c = I2cMock::new(&expectations);

        let mut sensor = sensor(&i2c, Settings::default());
        sensor.set_config_standby_time(Standby::Ms250).unwrap();
        sensor.set_config_filter(Filter::X2).unwrap();

        assert_eq!(sensor.settings().standby, Standby::Ms250);
        assert_eq!(sensor.settings().filter, Filter::X2);

        i2c.done();
    }

    #[test]
    fn test_set_oversampling() {
        let expectations = [
            // Individual, read-modify-write
            I2cTransaction::write_read(ADDR, vec![0xF4], vec![0x25]),
            I2cTransaction::write(ADDR, vec![0xF4, 0x85]),
            I2cTransaction::write_read(ADDR, vec![0xF4], vec![0x85]),
            I2cTransaction::write(ADDR, vec![0xF4, 0x89]),
            // Combined, written from shadowed mode
            I2cTransaction::write(ADDR, vec![0xF4, 0x4D]),
        ];
        let mut i2c = I2cMock::new(&expectations);

        let mut sensor = sensor(&i2c, Settings::default());
        sensor.set_temperature_oversampling(Oversampling::X8).unwrap();
        sensor.set_pressure_oversampling(Oversampling::X2).unwrap();
        assert_eq!(sensor.settings().temperature, Oversampling::X8);
        assert_eq!(sensor.settings().pressure, Oversampling::X2);

        sensor.set_oversampling(Oversampling::X2, Oversampling::X4).unwrap();
        assert_eq!(sensor.settings().temperature, Oversampling::X2);
        assert_eq!(sensor.settings().pressure, Oversampling::X4);

        i2c.done();
    }

    #[test]
    fn test_set_humidity_oversampling() {
        let expectations = [
            I2cTransaction::write_read(ADDR, vec![0xF2], vec![0x01]),
            I2cTransaction::write(ADDR, vec![0xF2, 0x05]),
            I2cTransaction::write_read(ADDR, vec![0xF4], vec![0x25]),
            I2cTransaction::write(ADDR, vec![0xF4, 0x25]),
        ];
        let mut i2c = I2cMock::new(&expectations);

        let mut sensor = sensor(&i2c, Settings::default());
        sensor.set_humidity_oversampling(Oversampling::X16).unwrap();
        assert_eq!(sensor.settings().humidity, Oversampling::X16);

        i2c.done();
    }

    #[test]
    fn test_setter_error_keeps_shadow() {
        let expectations = [
            I2cTransaction::write_read(ADDR, vec![0xF4], vec![0x25]),
            I2cTransaction::write(ADDR, vec![0xF4, 0x27])
                .with_error(MockError::Io(ErrorKind::Other)),
        ];
        let mut i2c = I2cMock::new(&expectations);

        let mut sensor = sensor(&i2c, Settings::default());
        assert!(sensor.set_mode(Mode::Normal).is_err());
        assert_eq!(sensor.settings().mode, Mode::Forced);

        i2c.done();
    }
}
