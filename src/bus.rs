//! Mutex-arbitrated I2C bus shared between drivers
//!
//! Each driver owns a clone of the [`SharedBus`]; every transaction takes the
//! lock for the duration of that transaction only. Acquiring the lock is bounded
//! by a timeout so a stuck holder surfaces as an error rather than a deadlock.
//!
//! Copyright 2019 Ryan Kurte

use std::sync::{Arc, Mutex, TryLockError};
use std::time::{Duration, Instant};

use embedded_hal::blocking::i2c;

/// Default bound on waiting for the bus lock
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_millis(1000);

/// Sleep between lock attempts
const LOCK_RETRY: Duration = Duration::from_millis(1);

/// Shared bus error object
#[derive(Debug, Clone, PartialEq)]
pub enum BusError<E> {
    /// Error from the underlying bus
    Conn(E),
    /// Lock could not be acquired within the timeout
    LockTimeout,
    /// A previous holder panicked while holding the lock
    Poisoned,
}

/// Cloneable handle to an I2C bus guarded by a mutex
#[derive(Debug)]
pub struct SharedBus<I2C> {
    inner: Arc<Mutex<I2C>>,
    timeout: Duration,
}

impl <I2C> Clone for SharedBus<I2C> {
    fn clone(&self) -> Self {
        Self{ inner: self.inner.clone(), timeout: self.timeout }
    }
}

impl <I2C> SharedBus<I2C> {
    /// Wrap a bus using the default lock timeout
    pub fn new(i2c: I2C) -> Self {
        Self::with_timeout(i2c, DEFAULT_LOCK_TIMEOUT)
    }

    /// Wrap a bus with a custom lock timeout
    pub fn with_timeout(i2c: I2C, timeout: Duration) -> Self {
        Self{ inner: Arc::new(Mutex::new(i2c)), timeout }
    }

    /// Run a single transaction with exclusive access to the bus
    pub fn transaction<R, E, F>(&self, f: F) -> Result<R, BusError<E>>
    where
        F: FnOnce(&mut I2C) -> Result<R, E>,
    {
        let deadline = Instant::now() + self.timeout;

        loop {
            match self.inner.try_lock() {
                Ok(mut bus) => return f(&mut bus).map_err(BusError::Conn),
                Err(TryLockError::Poisoned(_)) => return Err(BusError::Poisoned),
                Err(TryLockError::WouldBlock) => {
                    if Instant::now() >= deadline {
                        warn!("Timeout waiting for bus lock ({:?})", self.timeout);
                        return Err(BusError::LockTimeout);
                    }
                    std::thread::sleep(LOCK_RETRY);
                }
            }
        }
    }
}

impl <I2C, E> i2c::Write for SharedBus<I2C> where
    I2C: i2c::Write<Error=E>,
{
    type Error = BusError<E>;

    fn write(&mut self, address: u8, bytes: &[u8]) -> Result<(), Self::Error> {
        self.transaction(|bus| bus.write(address, bytes))
    }
}

impl <I2C, E> i2c::Read for SharedBus<I2C> where
    I2C: i2c::Read<Error=E>,
{
    type Error = BusError<E>;

    fn read(&mut self, address: u8, buffer: &mut [u8]) -> Result<(), Self::Error> {
        self.transaction(|bus| bus.read(address, buffer))
    }
}

impl <I2C, E> i2c::WriteRead for SharedBus<I2C> where
    I2C: i2c::WriteRead<Error=E>,
{
    type Error = BusError<E>;

    fn write_read(&mut self, address: u8, bytes: &[u8], buffer: &mut [u8]) -> Result<(), Self::Error> {
        self.transaction(|bus| bus.write_read(address, bytes, buffer))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use std::io::ErrorKind;
    use std::sync::mpsc;
    use std::thread;

    use embedded_hal::blocking::i2c::{Write, WriteRead};
    use embedded_hal_mock::MockError;
    use embedded_hal_mock::i2c::{Mock as I2cMock, Transaction as I2cTransaction};

    #[test]
    fn test_passthrough() {
        let expectations = [
            I2cTransaction::write(0x76, vec![0xF4, 0x25]),
            I2cTransaction::write_read(0x76, vec![0xD0], vec![0x60]),
        ];
        let mut i2c = I2cMock::new(&expectations);

        let mut bus = SharedBus::new(i2c.clone());
        let mut other = bus.clone();

        bus.write(0x76, &[0xF4, 0x25]).unwrap();

        let mut id = [0u8; 1];
        other.write_read(0x76, &[0xD0], &mut id).unwrap();
        assert_eq!(id[0], 0x60);

        i2c.done();
    }

    #[test]
    fn test_conn_error() {
        let expectations = [
            I2cTransaction::write(0x62, vec![0x3f, 0x86])
                .with_error(MockError::Io(ErrorKind::Other)),
        ];
        let mut i2c = I2cMock::new(&expectations);

        let mut bus = SharedBus::new(i2c.clone());
        match bus.write(0x62, &[0x3f, 0x86]) {
            Err(BusError::Conn(_)) => (),
            r => panic!("unexpected result: {:?}", r),
        }

        i2c.done();
    }

    #[test]
    fn test_lock_timeout() {
        let bus = SharedBus::with_timeout(I2cMock::new(&[]), Duration::from_millis(20));
        let mut contender = bus.clone();

        let (locked_tx, locked_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();

        // Hold the bus from another thread until told to release
        let holder = bus.clone();
        let handle = thread::spawn(move || {
            let _guard = holder.inner.lock().unwrap();
            locked_tx.send(()).unwrap();
            release_rx.recv().unwrap();
        });
        locked_rx.recv().unwrap();

        let started = Instant::now();
        let r = contender.write(0x76, &[0x00]);
        assert!(matches!(r, Err(BusError::LockTimeout)));
        assert!(started.elapsed() >= Duration::from_millis(20));

        release_tx.send(()).unwrap();
        handle.join().unwrap();

        // The bus is usable again once released
        let r: Result<(), BusError<MockError>> = bus.transaction(|_| Ok(()));
        assert!(r.is_ok());
    }
}
