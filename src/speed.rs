// SPDX-License-Identifier: Apache-2.0

//! Fan speed from the tachometer: pulse width measurement, one-time calibration and the
//! normalized 0-255 speed reading.

use core::convert::Infallible;

use embedded_hal::digital::InputPin;

use crate::{
    buffer::MedianBuffer,
    clock::{Clock, PulseCounter},
    components::{infallible, Indicators, SpeedCommand, BAR_LED_COUNT},
    config::{CalibrationRecord, Settings},
    display::Display,
    error::Fault,
    storage::ByteStore,
};

/// Capacity of the tachometer filters
pub const PULSE_SAMPLE_COUNT: u8 = 7;
/// Resolution of reported pulse widths
pub const PULSE_TICK_US: u32 = 64;
/// A measurement taking longer than this means the fan has stalled (16 000 ticks)
pub const STALL_TIMEOUT_US: u32 = 1_024_000;
/// Settling time after each calibration speed change
pub const STABILIZATION_MS: u32 = 10_000;
/// Bar LEDs lit while waiting at one calibration speed
const CALIBRATION_STEPS: u8 = (BAR_LED_COUNT / 2) as u8;

/// Map a pulse width onto 0 (slowest) to 255 (fastest) using a calibration record.
///
/// Widths outside the calibrated range saturate. The linear position within the range goes
/// through `x -> log10(9x + 1)` twice to straighten out the tachometer's response. A record with
/// `min_pulse_time <= max_pulse_time` has no usable range and always reads as full speed.
pub fn normalize(width: u16, record: CalibrationRecord) -> u8 {
    let CalibrationRecord {
        min_pulse_time: slowest,
        max_pulse_time: fastest,
    } = record;
    if slowest <= fastest {
        return u8::MAX;
    }

    let clamped = width.clamp(fastest, slowest);
    let mut ratio = f32::from(clamped - fastest) / f32::from(slowest - fastest);
    for _ in 0..2 {
        ratio = libm::log10f(ratio * 9.0 + 1.0);
    }
    let ratio = ratio.clamp(0.0, 1.0);
    u8::MAX - libm::roundf(f32::from(u8::MAX) * ratio) as u8
}

/// Tachometer input, its timing counter and the live speed filter
pub struct SpeedSensor<T, P> {
    /// Tachometer line, high during the measured half of each pulse
    tach: T,
    /// Free-running microsecond counter
    counter: P,
    /// Recent pulse widths for [`SpeedSensor::normalized_speed`]
    filter: MedianBuffer,
    /// Pulse widths at both ends of the speed range
    calibration: CalibrationRecord,
}

impl<T, P> SpeedSensor<T, P>
where
    T: InputPin<Error = Infallible>,
    P: PulseCounter,
{
    /// Create an uncalibrated sensor. Install a calibration with
    /// [`SpeedSensor::set_calibration`] before reading speeds.
    pub fn new(tach: T, counter: P) -> Result<Self, Fault> {
        Ok(Self {
            tach,
            counter,
            filter: MedianBuffer::new(PULSE_SAMPLE_COUNT)?,
            calibration: CalibrationRecord::default(),
        })
    }

    /// Installed calibration
    pub fn calibration(&self) -> CalibrationRecord {
        self.calibration
    }

    /// Install a calibration and refill the speed filter with fresh measurements.
    pub fn set_calibration(&mut self, record: CalibrationRecord) -> Result<(), Fault> {
        self.calibration = record;
        for _ in 0..self.filter.capacity() {
            let width = self.measure_pulse_width()?;
            self.filter.insert(width);
        }
        debug!("Speed filter seeded, median {:?}", self.filter.median());
        Ok(())
    }

    /// Width of the next complete high phase on the tachometer line, in [`PULSE_TICK_US`] ticks.
    ///
    /// Waits for a falling, a rising and another falling edge. Fails with [`Fault::Stall`] if the
    /// sequence does not complete within [`STALL_TIMEOUT_US`] of the call.
    pub fn measure_pulse_width(&mut self) -> Result<u16, Fault> {
        let start = self.counter.micros();
        self.wait_for_level(false, start)?;
        self.wait_for_level(true, start)?;
        let rising = self.counter.micros();
        self.wait_for_level(false, start)?;

        let ticks = self.counter.micros().wrapping_sub(rising) / PULSE_TICK_US;
        let width = u16::try_from(ticks).unwrap_or(u16::MAX);
        #[cfg(feature = "trace_pulse_samples")]
        trace!("Tachometer pulse {} ticks", width);
        Ok(width)
    }

    /// Median of `samples` fresh measurements, which must be a valid filter capacity.
    pub fn measure_pulse_width_median(&mut self, samples: u8) -> Result<u16, Fault> {
        let mut filter = MedianBuffer::new(samples)?;
        for _ in 0..samples {
            filter.insert(self.measure_pulse_width()?);
        }
        // At least MIN_CAPACITY samples were inserted
        Ok(filter.median().unwrap_or_default())
    }

    /// Current fan speed, 0-255, from one fresh measurement filtered with the recent ones.
    pub fn normalized_speed(&mut self) -> Result<u8, Fault> {
        let width = self.measure_pulse_width()?;
        self.filter.insert(width);
        let median = self.filter.median().unwrap_or(width);
        Ok(normalize(median, self.calibration))
    }

    /// Measure and persist the pulse widths at speed 0 and at speed 255.
    ///
    /// Takes two [`STABILIZATION_MS`] waits, shown as a bar filling one LED at a time with the
    /// alert indicator on. The fan is left at speed 0.
    pub fn calibrate<F, I, C, S>(
        &mut self,
        fan: &mut F,
        display: &mut Display<I>,
        clock: &C,
        settings: &mut Settings<S>,
    ) -> Result<CalibrationRecord, Fault>
    where
        F: SpeedCommand,
        I: Indicators,
        C: Clock,
        S: ByteStore,
    {
        info!("Calibrating tachometer");
        display.set_alert(true);
        display.show_mask(0);

        fan.set_speed(0)?;
        Self::settle(display, clock, 0);
        let min_pulse_time = self.measure_pulse_width_median(PULSE_SAMPLE_COUNT)?;
        settings.save_min_pulse_time(min_pulse_time)?;

        fan.set_speed(u8::MAX)?;
        Self::settle(display, clock, CALIBRATION_STEPS);
        let max_pulse_time = self.measure_pulse_width_median(PULSE_SAMPLE_COUNT)?;
        settings.save_max_pulse_time(max_pulse_time)?;

        fan.set_speed(0)?;
        display.set_alert(false);
        display.show_mask(0);

        info!(
            "Calibration done: {} ticks at minimum speed, {} ticks at maximum speed",
            min_pulse_time, max_pulse_time
        );
        if min_pulse_time <= max_pulse_time {
            warn!("Calibrated pulse widths do not span a range, speed will read as maximum");
        }
        Ok(CalibrationRecord {
            min_pulse_time,
            max_pulse_time,
        })
    }

    /// Wait out [`STABILIZATION_MS`], adding one lit LED after `already_lit` per step.
    fn settle<I: Indicators, C: Clock>(display: &mut Display<I>, clock: &C, already_lit: u8) {
        let step_ms = STABILIZATION_MS / u32::from(CALIBRATION_STEPS);
        for step in 1..=CALIBRATION_STEPS {
            clock.delay_ms(step_ms);
            display.show_progress(already_lit + step);
        }
    }

    /// Poll until the tachometer reads `high`, or fail once the stall timeout has passed.
    fn wait_for_level(&mut self, high: bool, start: u32) -> Result<(), Fault> {
        while infallible(self.tach.is_high()) != high {
            if self.counter.micros().wrapping_sub(start) > STALL_TIMEOUT_US {
                return Err(Fault::Stall);
            }
        }
        Ok(())
    }
}
