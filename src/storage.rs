// SPDX-License-Identifier: Apache-2.0

//! Byte-addressed persistent storage, and a driver for 24Cxx-style I2C EEPROMs.

use embedded_hal::i2c::I2c;

use crate::clock::Clock;

/// Byte-addressed non-volatile memory.
pub trait ByteStore {
    /// Error reported by the underlying device
    type Error;

    /// Fill `buffer` with the bytes stored from `address` onward.
    fn read(&mut self, address: u16, buffer: &mut [u8]) -> Result<(), Self::Error>;

    /// Store `data` from `address` onward.
    fn write(&mut self, address: u16, data: &[u8]) -> Result<(), Self::Error>;
}

/// Failure of an [`Eeprom24`] access
#[derive(Debug, PartialEq, Eq)]
pub enum EepromError<E> {
    /// The I2C transfer failed
    Bus(E),
    /// The access would run past the end of the memory
    OutOfRange {
        /// First byte requested
        address: u16,
        /// Number of bytes requested
        len: usize,
    },
}

/// 24C02-compatible EEPROM: 256 bytes, one address byte, byte writes with a fixed write cycle.
pub struct Eeprom24<I, C> {
    /// Bus the memory is attached to
    i2c: I,
    /// Used to wait out the internal write cycle
    clock: C,
    /// 7-bit device address
    device_address: u8,
}

impl<I: I2c, C: Clock> Eeprom24<I, C> {
    /// Device address with A0..A2 tied low
    pub const DEFAULT_ADDRESS: u8 = 0x50;
    /// Memory size in bytes
    pub const SIZE: usize = 256;
    /// Maximum internal write cycle time
    pub const WRITE_CYCLE_MS: u32 = 5;

    /// Attach to the EEPROM at [`Self::DEFAULT_ADDRESS`]
    pub fn new(i2c: I, clock: C) -> Self {
        Self::with_address(i2c, clock, Self::DEFAULT_ADDRESS)
    }

    /// Attach to the EEPROM at `device_address`
    pub fn with_address(i2c: I, clock: C, device_address: u8) -> Self {
        Self {
            i2c,
            clock,
            device_address,
        }
    }

    /// Release the bus
    pub fn release(self) -> I {
        self.i2c
    }

    /// Reject accesses that do not fit in the memory.
    fn check_range(address: u16, len: usize) -> Result<(), EepromError<I::Error>> {
        if address as usize + len > Self::SIZE {
            return Err(EepromError::OutOfRange { address, len });
        }
        Ok(())
    }
}

impl<I: I2c, C: Clock> ByteStore for Eeprom24<I, C> {
    type Error = EepromError<I::Error>;

    fn read(&mut self, address: u16, buffer: &mut [u8]) -> Result<(), Self::Error> {
        Self::check_range(address, buffer.len())?;
        // Range check above keeps the address below 256
        self.i2c
            .write_read(self.device_address, &[address as u8], buffer)
            .map_err(EepromError::Bus)
    }

    fn write(&mut self, address: u16, data: &[u8]) -> Result<(), Self::Error> {
        Self::check_range(address, data.len())?;
        for (offset, &byte) in data.iter().enumerate() {
            let target = address as usize + offset;
            self.i2c
                .write(self.device_address, &[target as u8, byte])
                .map_err(EepromError::Bus)?;
            self.clock.delay_ms(Self::WRITE_CYCLE_MS);
        }
        Ok(())
    }
}
