//! Smart clock command-line utility
//!
//! Periodically samples a Bme280 and an Scd40 sharing one I2C bus and
//! appends the combined readings to a CSV log.
//!
//! Copyright 2019 Ryan Kurte

extern crate embedded_hal;
use embedded_hal::blocking::{delay::DelayMs, i2c};
extern crate linux_embedded_hal;
use linux_embedded_hal::{Delay, I2cdev};

extern crate structopt;
use structopt::StructOpt;

extern crate humantime;
use humantime::{Duration as HumanDuration};

extern crate chrono;
use chrono::{Datelike, Local, Timelike, Weekday};

#[macro_use] extern crate log;
extern crate simplelog;
use simplelog::{TermLogger, LevelFilter};

use std::io::Write;
use std::time::Duration;

extern crate sensor_smart_clock;
use sensor_smart_clock::{Bme280, Error, Scd40, SharedBus};
use sensor_smart_clock::bme280::{self, Settings};
use sensor_smart_clock::poll::Poll;
use sensor_smart_clock::record::{self, Record, Stamp};

/// Scd40 data ready polling after the warm-up period
const DATA_READY_POLL: Poll = Poll::new(50, 40);

#[derive(StructOpt)]
#[structopt(name = "smart-clock-util")]
/// A Command Line Interface (CLI) for logging Bme280 and Scd40 environmental readings over I2C
pub struct Options {

    /// Specify the i2c interface shared by both sensors
    #[structopt(short="d", long = "i2c", default_value = "/dev/i2c-1", env = "SMART_CLOCK_I2C")]
    i2c: String,

    /// Use the alternate Bme280 address (0x77)
    #[structopt(long = "bme280-alternate")]
    bme280_alternate: bool,

    /// Specify period for taking measurements
    #[structopt(short = "p", long = "sample-period", default_value="60s")]
    pub period: HumanDuration,

    /// Time allowed for the Scd40 to produce a measurement after starting
    #[structopt(long = "warm-up", default_value="5s")]
    pub warm_up: HumanDuration,

    /// CSV file to append measurements to
    #[structopt(short = "o", long = "output", default_value = "smart-clock.csv", env = "SMART_CLOCK_LOG")]
    pub output: String,

    /// Scd40 temperature offset in degrees celsius
    #[structopt(long = "temperature-offset")]
    pub temperature_offset: Option<f32>,

    /// Number of allowed I2C errors (per measurement attempt) prior to exiting
    #[structopt(long = "allowed-errors", default_value="3")]
    pub allowed_errors: usize,

    /// Enable verbose logging
    #[structopt(long = "log-level", default_value = "info")]
    level: LevelFilter,
}

fn weekday_name(w: Weekday) -> &'static str {
    match w {
        Weekday::Mon => "Mon",
        Weekday::Tue => "Tue",
        Weekday::Wed => "Wed",
        Weekday::Thu => "Thu",
        Weekday::Fri => "Fri",
        Weekday::Sat => "Sat",
        Weekday::Sun => "Sun",
    }
}

fn now() -> Stamp {
    let t = Local::now();

    Stamp {
        year: t.year(),
        month: t.month(),
        day: t.day(),
        weekday: weekday_name(t.weekday()),
        hour: t.hour(),
        minute: t.minute(),
        second: t.second(),
    }
}

/// Attempt an operation until it succeeds or the error budget is exhausted
fn attempt<T, E: std::fmt::Debug, F: FnMut() -> Result<T, E>>(name: &str, errors: &mut usize, allowed: usize, mut f: F) -> Option<T> {
    loop {
        match f() {
            Ok(v) => return Some(v),
            Err(e) => {
                warn!("Error {}: {:?}", name, e);
                *errors += 1;
            }
        }

        if *errors > allowed {
            return None;
        }
    }
}

/// Apply and read back the Scd40 temperature offset, periodic measurement must be stopped first
fn configure_offset<C, D, E>(co2: &mut Scd40<C, D, E>, offset: f32) -> Result<f32, Error<E>> where
    C: i2c::Read<Error=E> + i2c::Write<Error=E> + i2c::WriteRead<Error=E>,
    D: DelayMs<u32>,
    E: std::fmt::Debug,
{
    co2.stop_periodic_measurement()?;
    co2.set_temperature_offset(offset)?;
    co2.get_temperature_offset()
}

/// Run one Scd40 measurement: start, warm up, wait for data, read, stop
///
/// Periodic measurement is stopped on failure so the next attempt starts from idle
fn acquire_co2<C, D, E>(co2: &mut Scd40<C, D, E>, warm_up: Duration) -> Result<u16, Error<E>> where
    C: i2c::Read<Error=E> + i2c::Write<Error=E> + i2c::WriteRead<Error=E>,
    D: DelayMs<u32>,
    E: std::fmt::Debug,
{
    co2.start_periodic_measurement()?;

    debug!("Waiting for SCD40 measurement");
    std::thread::sleep(warm_up);

    let r = co2.wait_data_ready(&DATA_READY_POLL).and_then(|_| co2.get_co2_data());

    if let Err(e) = co2.stop_periodic_measurement() {
        warn!("Error stopping SCD40 measurement: {:?}", e);
    }

    r
}

fn main() {
    // Load options
    let opts = Options::from_args();

    // Setup logging
    if let Err(e) = TermLogger::init(opts.level, simplelog::Config::default()) {
        eprintln!("Error initialising logger: {:?}", e);
    }

    debug!("Connecting to I2C device");
    let i2c = match I2cdev::new(&opts.i2c) {
        Ok(v) => v,
        Err(e) => {
            error!("Error opening I2C device '{}': {:?}", &opts.i2c, e);
            std::process::exit(-1);
        }
    };
    let bus = SharedBus::new(i2c);

    debug!("Connecting to BME280");
    let address = match opts.bme280_alternate {
        true => bme280::ALTERNATE_ADDRESS,
        false => bme280::DEFAULT_ADDRESS,
    };
    let mut pth = match Bme280::with_address(bus.clone(), Delay, address, Settings::default()) {
        Ok(v) => v,
        Err(e) => {
            error!("Error connecting to BME280: {:?}", e);
            std::process::exit(-2);
        }
    };

    if let Err(e) = pth.check_device_id() {
        warn!("BME280 identity check failed: {:?}", e);
    }

    debug!("Connecting to SCD40");
    let mut co2 = match Scd40::new(bus.clone(), Delay) {
        Ok(v) => v,
        Err(e) => {
            error!("Error connecting to SCD40: {:?}", e);
            std::process::exit(-3);
        }
    };

    if let Some(offset) = opts.temperature_offset {
        debug!("Setting SCD40 temperature offset");
        match configure_offset(&mut co2, offset) {
            Ok(v) => info!("SCD40 temperature offset: {:.1} C", v),
            Err(e) => {
                error!("Error setting SCD40 temperature offset: {:?}", e);
                std::process::exit(-4);
            }
        }
    }

    debug!("Opening log file '{}'", opts.output);
    let mut log_file = match record::open_log(&opts.output) {
        Ok(v) => v,
        Err(e) => {
            error!("Error opening log file '{}': {:?}", opts.output, e);
            std::process::exit(-5);
        }
    };

    loop {
        debug!("Starting sensor read cycle");

        let mut errors = 0;

        // Pressure / temperature / humidity
        let env = match attempt("reading BME280", &mut errors, opts.allowed_errors, || pth.get_all_results()) {
            Some(v) => v,
            None => {
                error!("Exceeded maximum allowed I2C errors");
                std::process::exit(-6);
            }
        };

        // Feed pressure to CO2 compensation, best effort
        if let Err(e) = co2.set_ambient_pressure(env.pressure.round() as u16) {
            warn!("Error setting SCD40 ambient pressure: {:?}", e);
        }

        // CO2, restarted from idle on each attempt
        let warm_up = *opts.warm_up;
        let ppm = match attempt("reading SCD40", &mut errors, opts.allowed_errors, || acquire_co2(&mut co2, warm_up)) {
            Some(v) => v,
            None => {
                error!("Exceeded maximum allowed I2C errors");
                std::process::exit(-6);
            }
        };

        let record = Record {
            stamp: now(),
            co2: ppm,
            temperature: env.temperature as f64,
            humidity: env.humidity,
            pressure: env.pressure as f64,
        };

        info!("CO2: {} ppm, Temperature: {:.2} C, Humidity: {:.2} %, Pressure: {:.2} hPa",
            record.co2, record.temperature, record.humidity, record.pressure);

        if let Err(e) = writeln!(log_file, "{}", record) {
            warn!("Error writing log record: {:?}", e);
        }

        // Wait for the next sample
        std::thread::sleep(*opts.period);
    }
}
