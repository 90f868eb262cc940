// SPDX-License-Identifier: Apache-2.0

//! Settings that survive power loss: the selected display mode and the tachometer calibration.
//!
//! Each record is a value plus an initialization flag byte. Erased memory reads as
//! [`UNINITIALIZED`]; the flag is written after the value, so an interrupted save leaves the record
//! marked as missing.
//!
//! | Record | Flag | Value |
//! |--------|------|-------|
//! | Display mode (1 byte) | `0x00` | `0x01` |
//! | Max-speed pulse time (2 bytes, LE) | `0x10` | `0x11` |
//! | Min-speed pulse time (2 bytes, LE) | `0x20` | `0x21` |

use crate::{display::DisplayMode, error::Fault, storage::ByteStore};

/// Flag value of a record that was never written
pub const UNINITIALIZED: u8 = 0xFF;
/// Flag value of a record holding valid data
pub const INITIALIZED: u8 = 0x00;
/// Display mode used until the user selects one
pub const DEFAULT_DISPLAY_MODE: DisplayMode = DisplayMode::Setpoint;

/// Location of one persisted value
#[derive(Debug, Copy, Clone)]
struct Record {
    /// Address of the initialization flag
    flag: u16,
    /// Address of the first value byte
    value: u16,
}

/// Selected display mode
const DISPLAY_MODE: Record = Record {
    flag: 0x00,
    value: 0x01,
};
/// Pulse time at maximum commanded speed
const MAX_PULSE_TIME: Record = Record {
    flag: 0x10,
    value: 0x11,
};
/// Pulse time at minimum commanded speed
const MIN_PULSE_TIME: Record = Record {
    flag: 0x20,
    value: 0x21,
};

/// Tachometer pulse widths measured at both ends of the commanded speed range, in
/// [`PULSE_TICK_US`](crate::speed::PULSE_TICK_US) ticks.
///
/// Longer pulses mean a slower fan, so a healthy record has `min_pulse_time > max_pulse_time`.
#[derive(Default, Debug, Eq, PartialEq, Copy, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CalibrationRecord {
    /// Pulse width with the fan commanded to speed 0
    pub min_pulse_time: u16,
    /// Pulse width with the fan commanded to speed 255
    pub max_pulse_time: u16,
}

/// Typed access to the persisted records
pub struct Settings<S> {
    /// Backing memory
    store: S,
}

impl<S: ByteStore> Settings<S> {
    /// Wrap a byte store
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Release the byte store
    pub fn release(self) -> S {
        self.store
    }

    /// Load the saved display mode.
    ///
    /// A missing or unusable record is replaced by [`DEFAULT_DISPLAY_MODE`], which is saved
    /// immediately.
    pub fn load_display_mode(&mut self) -> Result<DisplayMode, Fault> {
        if self.is_initialized(DISPLAY_MODE)? {
            let mut code = [0u8];
            self.read(DISPLAY_MODE.value, &mut code)?;
            match DisplayMode::try_from(code[0]) {
                Ok(mode) if mode.is_standard() => return Ok(mode),
                _ => warn!("Saved display mode {} is not usable, restoring default", code[0]),
            }
        }
        self.save_display_mode(DEFAULT_DISPLAY_MODE)?;
        Ok(DEFAULT_DISPLAY_MODE)
    }

    /// Save a display mode. Only standard modes are persisted.
    pub fn save_display_mode(&mut self, mode: DisplayMode) -> Result<(), Fault> {
        if !mode.is_standard() {
            return Err(Fault::UnknownDisplayMode(mode.code()));
        }
        self.save(DISPLAY_MODE, &[mode.code()])
    }

    /// Load the calibration, or [`None`] if either pulse time has never been saved.
    pub fn load_calibration(&mut self) -> Result<Option<CalibrationRecord>, Fault> {
        if !self.is_initialized(MIN_PULSE_TIME)? || !self.is_initialized(MAX_PULSE_TIME)? {
            return Ok(None);
        }
        Ok(Some(CalibrationRecord {
            min_pulse_time: self.read_u16(MIN_PULSE_TIME)?,
            max_pulse_time: self.read_u16(MAX_PULSE_TIME)?,
        }))
    }

    /// Save the pulse width measured at minimum speed
    pub fn save_min_pulse_time(&mut self, pulse_time: u16) -> Result<(), Fault> {
        self.save(MIN_PULSE_TIME, &pulse_time.to_le_bytes())
    }

    /// Save the pulse width measured at maximum speed
    pub fn save_max_pulse_time(&mut self, pulse_time: u16) -> Result<(), Fault> {
        self.save(MAX_PULSE_TIME, &pulse_time.to_le_bytes())
    }

    /// Whether the record's flag marks it as written.
    fn is_initialized(&mut self, record: Record) -> Result<bool, Fault> {
        let mut flag = [UNINITIALIZED];
        self.read(record.flag, &mut flag)?;
        Ok(flag[0] != UNINITIALIZED)
    }

    /// Read a little-endian word from the record's value bytes.
    fn read_u16(&mut self, record: Record) -> Result<u16, Fault> {
        let mut bytes = [0u8; 2];
        self.read(record.value, &mut bytes)?;
        Ok(u16::from_le_bytes(bytes))
    }

    /// Write the value, then mark the record as initialized.
    fn save(&mut self, record: Record, data: &[u8]) -> Result<(), Fault> {
        self.write(record.value, data)?;
        self.write(record.flag, &[INITIALIZED])
    }

    /// Read from the store, reporting failures as [`Fault::Storage`].
    fn read(&mut self, address: u16, buffer: &mut [u8]) -> Result<(), Fault> {
        self.store.read(address, buffer).map_err(|_| {
            error!("Unable to read settings at address {}", address);
            Fault::Storage
        })
    }

    /// Write to the store, reporting failures as [`Fault::Storage`].
    fn write(&mut self, address: u16, data: &[u8]) -> Result<(), Fault> {
        self.store.write(address, data).map_err(|_| {
            error!("Unable to write settings at address {}", address);
            Fault::Storage
        })
    }
}
