//! CSV log records
//!
//! One row is written per acquisition cycle, combining the CO2 concentration
//! from the Scd40 with temperature, humidity and pressure from the Bme280.
//!
//! Copyright 2019 Ryan Kurte

use core::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

/// Header line written when a log file is opened
pub const HEADER: &str = "YYYY/MM/DD, week, HH:MM:SS, CO2[ppm], Temperature[C], Humidity[%RH], Pressure[hPa]";

/// Local wall-clock time of a record
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub struct Stamp {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    /// Abbreviated day name, ie. `Mon`
    pub weekday: &'static str,
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
}

/// Combined acquisition record
#[derive(PartialEq, Clone, Debug)]
pub struct Record {
    pub stamp: Stamp,
    /// CO2 in ppm
    pub co2: u16,
    /// Temperature in degrees celsius
    pub temperature: f64,
    /// Relative humidity in %
    pub humidity: f64,
    /// Pressure in hPa
    pub pressure: f64,
}

impl fmt::Display for Stamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}/{:02}/{:02}, {}, {:02}:{:02}:{:02}",
            self.year, self.month, self.day, self.weekday, self.hour, self.minute, self.second)
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {}, {:.2}, {:.2}, {:.2}",
            self.stamp, self.co2, self.temperature, self.humidity, self.pressure)
    }
}

/// Open a log file for appending, writing the [`HEADER`] only if the file is empty
pub fn open_log<P: AsRef<Path>>(path: P) -> io::Result<File> {
    let mut f = OpenOptions::new().create(true).append(true).open(path)?;

    if f.metadata()?.len() == 0 {
        writeln!(f, "{}", HEADER)?;
    }

    Ok(f)
}
