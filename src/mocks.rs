// SPDX-License-Identifier: Apache-2.0

//! Test doubles for the hardware seams.

use core::{
    cell::{Cell, RefCell},
    convert::Infallible,
};
use std::{collections::VecDeque, rc::Rc};

use embedded_hal::{digital, pwm};

use crate::{
    clock::{Clock, PulseCounter, Ticks},
    components::{Indicators, SpeedCommand},
    error::Fault,
    setpoint::SetpointControl,
    storage::ByteStore,
};

/// Millisecond clock that only moves when told to, or when delayed on.
#[derive(Clone, Default)]
pub struct TestClock {
    /// Shared between clones
    millis: Rc<Cell<u32>>,
}

impl TestClock {
    /// Clock at instant 0
    pub fn new() -> Self {
        Self::default()
    }

    /// Move time forward
    pub fn advance(&self, millis: u32) {
        self.millis.set(self.millis.get().wrapping_add(millis));
    }
}

impl Clock for TestClock {
    fn now(&self) -> Ticks {
        Ticks::from_millis(self.millis.get())
    }

    fn delay_ms(&self, millis: u32) {
        self.advance(millis + 1);
    }
}

/// 256 bytes of RAM that read as erased EEPROM.
pub struct MemoryStore {
    /// Contents
    bytes: [u8; 256],
    /// Reject every access
    failing: bool,
}

impl MemoryStore {
    /// Erased store
    pub fn new() -> Self {
        Self {
            bytes: [0xFF; 256],
            failing: false,
        }
    }

    /// Every access fails
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::new()
        }
    }

    /// Raw contents
    pub fn bytes(&self) -> &[u8; 256] {
        &self.bytes
    }

    /// Raw contents, for planting corrupt data
    pub fn bytes_mut(&mut self) -> &mut [u8; 256] {
        &mut self.bytes
    }
}

impl ByteStore for MemoryStore {
    type Error = ();

    fn read(&mut self, address: u16, buffer: &mut [u8]) -> Result<(), Self::Error> {
        if self.failing {
            return Err(());
        }
        let start = address as usize;
        buffer.copy_from_slice(&self.bytes[start..start + buffer.len()]);
        Ok(())
    }

    fn write(&mut self, address: u16, data: &[u8]) -> Result<(), Self::Error> {
        if self.failing {
            return Err(());
        }
        let start = address as usize;
        self.bytes[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }
}

/// Output pin remembering its level
#[derive(Clone, Default)]
pub struct RecordingPin {
    /// Level, shared between clones
    high: Rc<Cell<bool>>,
}

impl RecordingPin {
    /// Last level set
    pub fn is_high(&self) -> bool {
        self.high.get()
    }
}

impl digital::ErrorType for RecordingPin {
    type Error = Infallible;
}

impl digital::OutputPin for RecordingPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.high.set(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.high.set(true);
        Ok(())
    }
}

/// PWM channel remembering the last duty cycle as a `(numerator, denominator)` fraction
#[derive(Clone, Default)]
pub struct RecordingPwm {
    /// Shared between clones
    last: Rc<Cell<Option<(u16, u16)>>>,
}

impl RecordingPwm {
    /// Channel that has not been set yet
    pub fn new() -> Self {
        Self::default()
    }

    /// Last duty cycle set
    pub fn last(&self) -> Option<(u16, u16)> {
        self.last.get()
    }
}

impl pwm::ErrorType for RecordingPwm {
    type Error = Infallible;
}

impl pwm::SetDutyCycle for RecordingPwm {
    fn max_duty_cycle(&self) -> u16 {
        u16::MAX
    }

    fn set_duty_cycle(&mut self, duty: u16) -> Result<(), Self::Error> {
        self.last.set(Some((duty, u16::MAX)));
        Ok(())
    }

    fn set_duty_cycle_fully_off(&mut self) -> Result<(), Self::Error> {
        self.last.set(Some((0, 1)));
        Ok(())
    }

    fn set_duty_cycle_fraction(&mut self, num: u16, denom: u16) -> Result<(), Self::Error> {
        self.last.set(Some((num, denom)));
        Ok(())
    }
}

/// Indicators keeping their current state and the history of bar and alert updates
#[derive(Default, Debug)]
pub struct RecordingIndicators {
    /// Current bar mask
    pub bar: u8,
    /// Current power indicator intensity
    pub power: u8,
    /// Current alert LED state
    pub alert: bool,
    /// Every bar mask set, in order
    pub bar_history: Vec<u8>,
    /// Every alert state set, in order
    pub alert_history: Vec<bool>,
}

impl Indicators for RecordingIndicators {
    fn set_bar(&mut self, mask: u8) {
        self.bar = mask;
        self.bar_history.push(mask);
    }

    fn set_power(&mut self, intensity: u8) {
        self.power = intensity;
    }

    fn set_alert(&mut self, on: bool) {
        self.alert = on;
        self.alert_history.push(on);
    }
}

/// Active-low push button. Scripted samples are consumed first, then the held state applies.
#[derive(Clone, Default)]
pub struct ButtonPin {
    /// Held state
    pressed: Rc<Cell<bool>>,
    /// Samples returned before the held state
    script: Rc<RefCell<VecDeque<bool>>>,
}

impl ButtonPin {
    /// Released button
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold the button down
    pub fn press(&self) {
        self.pressed.set(true);
    }

    /// Let go
    pub fn release(&self) {
        self.pressed.set(false);
    }

    /// Queue raw pressed/not pressed samples, e.g. contact bounce
    pub fn script(&self, samples: &[bool]) {
        self.script.borrow_mut().extend(samples.iter().copied());
    }

    /// Next raw sample
    fn sample_pressed(&self) -> bool {
        self.script
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| self.pressed.get())
    }
}

impl digital::ErrorType for ButtonPin {
    type Error = Infallible;
}

impl digital::InputPin for ButtonPin {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.sample_pressed())
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        Ok(self.sample_pressed())
    }
}

/// Fan whose tachometer output is a square wave with a half period set by the commanded speed.
///
/// Polling the tachometer advances simulated time by [`SimFan::POLL_US`], so blocking
/// measurements terminate.
#[derive(Clone)]
pub struct SimFan {
    /// Simulated time
    micros: Rc<Cell<u32>>,
    /// Tachometer half period, 0 when stalled
    half_period_us: Rc<Cell<u32>>,
    /// Every commanded speed, in order
    speeds: Rc<RefCell<Vec<u8>>>,
}

impl SimFan {
    /// Simulated time taken by one tachometer poll
    pub const POLL_US: u32 = 10;

    /// Fan at speed 0
    pub fn new() -> Self {
        Self {
            micros: Rc::default(),
            half_period_us: Rc::new(Cell::new(Self::half_period_for_speed(0))),
            speeds: Rc::default(),
        }
    }

    /// 12.8 ms (200 ticks) at speed 0 down to 3.2 ms (50 ticks) at speed 255
    pub fn half_period_for_speed(speed: u8) -> u32 {
        12_800 - 9_600 * u32::from(speed) / 255
    }

    /// Override the half period independently of the commanded speed
    pub fn set_half_period_us(&self, half_period_us: u32) {
        self.half_period_us.set(half_period_us);
    }

    /// Tachometer stuck high
    pub fn stall(&self) {
        self.half_period_us.set(0);
    }

    /// Speeds commanded so far
    pub fn speeds(&self) -> Vec<u8> {
        self.speeds.borrow().clone()
    }

    /// Tachometer input sharing this fan's state
    pub fn tach(&self) -> SimTach {
        SimTach { fan: self.clone() }
    }

    /// Microsecond counter sharing this fan's simulated time
    pub fn counter(&self) -> SimPulseCounter {
        SimPulseCounter { fan: self.clone() }
    }
}

impl SpeedCommand for SimFan {
    fn set_speed(&mut self, speed: u8) -> Result<(), Fault> {
        self.speeds.borrow_mut().push(speed);
        self.half_period_us.set(Self::half_period_for_speed(speed));
        Ok(())
    }
}

/// Tachometer input of a [`SimFan`]
pub struct SimTach {
    /// Simulated fan
    fan: SimFan,
}

impl SimTach {
    /// Poll the output, advancing simulated time
    fn level(&mut self) -> bool {
        let now = self.fan.micros.get().wrapping_add(SimFan::POLL_US);
        self.fan.micros.set(now);
        match self.fan.half_period_us.get() {
            0 => true,
            half_period => (now / half_period) % 2 == 0,
        }
    }
}

impl digital::ErrorType for SimTach {
    type Error = Infallible;
}

impl digital::InputPin for SimTach {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        Ok(self.level())
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.level())
    }
}

/// Microsecond counter of a [`SimFan`]
pub struct SimPulseCounter {
    /// Simulated fan
    fan: SimFan,
}

impl PulseCounter for SimPulseCounter {
    fn micros(&self) -> u32 {
        self.fan.micros.get()
    }
}

/// Setpoint with a fixed potentiometer reading
#[derive(Default)]
pub struct MockSetpoint {
    /// Filtered potentiometer reading
    pub value: Cell<u8>,
    /// Override requested by the controller
    pub override_value: Cell<Option<u8>>,
}

impl SetpointControl for MockSetpoint {
    fn current(&self) -> u8 {
        self.value.get()
    }

    fn set_override(&self, value: u8) {
        self.override_value.set(Some(value));
    }

    fn clear_override(&self) {
        self.override_value.set(None);
    }
}
