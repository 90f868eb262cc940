// SPDX-License-Identifier: Apache-2.0

//! Potentiometer setpoint: filtered ADC readings and the full speed override.

use crate::{buffer::MedianBuffer, error::Fault};

/// Capacity of the setpoint filter
pub const SETPOINT_SAMPLE_COUNT: u8 = 5;

/// Foreground access to the setpoint, which is owned by the conversion interrupt.
pub trait SetpointControl {
    /// Filtered potentiometer position, 0-255. Not affected by an override.
    fn current(&self) -> u8;
    /// Command `value` to the fan regardless of the potentiometer
    fn set_override(&self, value: u8);
    /// Let the fan follow the potentiometer again
    fn clear_override(&self);
}

/// Filtered setpoint and the override state.
#[derive(Debug, Clone)]
pub struct SetpointSensor {
    /// Most recent 8-bit conversions
    filter: MedianBuffer,
    /// Median of `filter`
    current: u8,
    /// Speed commanded instead of `current` while set
    override_value: Option<u8>,
}

impl SetpointSensor {
    /// Create a sensor reading 0, with the filter seeded with zeros
    pub fn new() -> Result<Self, Fault> {
        let mut filter = MedianBuffer::new(SETPOINT_SAMPLE_COUNT)?;
        for _ in 0..SETPOINT_SAMPLE_COUNT {
            filter.insert(0);
        }
        Ok(Self {
            filter,
            current: 0,
            override_value: None,
        })
    }

    /// Record one conversion and return the speed to command.
    pub fn record(&mut self, sample: u8) -> u8 {
        self.filter.insert(u16::from(sample));
        if let Some(median) = self.filter.median() {
            // Samples are 8-bit, so is their median
            self.current = median as u8;
        }
        #[cfg(feature = "trace_setpoint_samples")]
        trace!("Setpoint sample {}, median {}", sample, self.current);
        self.commanded()
    }

    /// Filtered potentiometer position
    pub fn current(&self) -> u8 {
        self.current
    }

    /// Speed the fan should run at
    pub fn commanded(&self) -> u8 {
        self.override_value.unwrap_or(self.current)
    }

    /// Command `value` until [`SetpointSensor::clear_override`]
    pub fn set_override(&mut self, value: u8) {
        self.override_value = Some(value);
    }

    /// Follow the potentiometer again
    pub fn clear_override(&mut self) {
        self.override_value = None;
    }

    /// Whether an override is active
    pub fn is_overridden(&self) -> bool {
        self.override_value.is_some()
    }
}
