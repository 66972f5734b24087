//! Base communication implementation shared by the sensor drivers
//!
//! The BME280 addresses single-byte registers, the SCD40 addresses 16-bit
//! commands with CRC protected data words. Both are expressed here over the
//! blocking `embedded-hal` I2C traits.
//!
//! Copyright 2019 Ryan Kurte

use core::fmt::Debug;

use embedded_hal::blocking::i2c;

use crate::Error;

pub const CRC_POLY: u8 = 0x31;
pub const CRC_INIT: u8 = 0xff;
pub const CRC_XOR: u8 = 0x00;

/// Length of a data word followed by its CRC byte
pub const WORD_LEN: usize = 3;

/// Base API for reading and writing to the devices
/// This should not be required by consumers, but is exposed to support alternate use
pub trait Base<Err> {
    /// Read a single register
    fn read_register(&mut self, address: u8, register: u8) -> Result<u8, Error<Err>>;
    /// Write a single register
    fn write_register(&mut self, address: u8, register: u8, value: u8) -> Result<(), Error<Err>>;
    /// Burst read contiguous registers starting at `register`
    fn read_registers(&mut self, address: u8, register: u8, data: &mut [u8]) -> Result<(), Error<Err>>;
    /// Write a 16-bit command to the device with optional data word (and CRC)
    fn write_command(&mut self, address: u8, command: u16, data: Option<u16>) -> Result<(), Error<Err>>;
    /// Read a command response from the device
    fn read_response(&mut self, address: u8, data: &mut [u8]) -> Result<(), Error<Err>>;
}

/// Helper for device CRC-8 calculation
pub fn crc8(data: &[u8]) -> u8 {
    let mut crc = CRC_INIT;

    // For each byte
    for v in data {
        // XOR with current byte
        crc ^= v;

        // MSB first
        for _bit in 0..8 {
            if crc & 0x80 != 0 {
                crc = (crc << 1) ^ CRC_POLY;
            } else {
                crc <<= 1;
            }
        }
    }

    // Apply final xor
    crc ^ CRC_XOR
}

/// Decode a (MSB, LSB, CRC) triplet into a 16-bit word, checking the CRC
pub fn decode_word<Err>(triplet: &[u8; WORD_LEN]) -> Result<u16, Error<Err>> {
    let crc = crc8(&triplet[..2]);
    if crc != triplet[2] {
        return Err(Error::Crc(crc, triplet[2]));
    }

    Ok(u16::from_be_bytes([triplet[0], triplet[1]]))
}

/// Decode a full response of word triplets, failing on the first CRC mismatch
pub fn decode_words<Err, const N: usize>(data: &[[u8; WORD_LEN]; N]) -> Result<[u16; N], Error<Err>> {
    let mut words = [0u16; N];
    for (w, triplet) in words.iter_mut().zip(data.iter()) {
        *w = decode_word(triplet)?;
    }

    Ok(words)
}

/// Base implementation for I2C devices
impl <Conn, Err> Base<Err> for Conn where
    Conn: i2c::Read<Error=Err> + i2c::Write<Error=Err> + i2c::WriteRead<Error=Err>,
    Err: Debug,
{
    fn read_register(&mut self, address: u8, register: u8) -> Result<u8, Error<Err>> {
        let mut buff = [0u8; 1];
        self.read_registers(address, register, &mut buff)?;
        Ok(buff[0])
    }

    fn write_register(&mut self, address: u8, register: u8, value: u8) -> Result<(), Error<Err>> {
        trace!("Writing register 0x{:02x} (addr 0x{:02x}): 0x{:02x}", register, address, value);

        self.write(address, &[register, value]).map_err(Error::Conn)
    }

    fn read_registers(&mut self, address: u8, register: u8, data: &mut [u8]) -> Result<(), Error<Err>> {
        // Register select and burst read in one transaction
        self.write_read(address, &[register], data).map_err(Error::Conn)?;

        trace!("Read registers from 0x{:02x} (addr 0x{:02x}): {:x?}", register, address, data);

        Ok(())
    }

    fn write_command(&mut self, address: u8, command: u16, data: Option<u16>) -> Result<(), Error<Err>> {
        let mut buff: [u8; 5] = [
            (command >> 8) as u8,
            (command & 0xFF) as u8,
            0,
            0,
            0,
        ];

        let len = match data {
            Some(d) => {
                buff[2] = (d >> 8) as u8;
                buff[3] = (d & 0xFF) as u8;
                buff[4] = crc8(&buff[2..4]);
                5
            },
            None => 2,
        };

        trace!("Writing command: 0x{:04x} data: {:?}", command, data);

        self.write(address, &buff[..len]).map_err(Error::Conn)
    }

    fn read_response(&mut self, address: u8, data: &mut [u8]) -> Result<(), Error<Err>> {
        self.read(address, data).map_err(Error::Conn)?;

        trace!("Read data: {:x?}", data);

        Ok(())
    }
}
