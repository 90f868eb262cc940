// SPDX-License-Identifier: Apache-2.0

//! Basic component structs: the indicator LEDs and the fan PWM drive.
//!
//! Pins and PWM channels on the target board cannot fail, so drivers here require
//! `Error = Infallible` instead of threading driver errors through every display update.

use core::convert::Infallible;

use embedded_hal::{
    digital::{OutputPin, PinState},
    pwm::SetDutyCycle,
};

use crate::error::Fault;

/// Number of LEDs in the bar
pub const BAR_LED_COUNT: usize = 8;

/// Lowest raw PWM compare value used for the fan
pub const PWM_LEVEL_MIN: u16 = 1;
/// Number of distinct fan PWM levels
pub const PWM_LEVEL_COUNT: u8 = 79;
/// PWM period in raw compare steps. Level `n` drives the fan at `(PWM_LEVEL_MIN + n) / PWM_PERIOD`.
pub const PWM_PERIOD: u16 = 80;

/// Everything the user can see.
pub trait Indicators {
    /// Light bar LED `i` when bit `i` of `mask` is set
    fn set_bar(&mut self, mask: u8);
    /// Brightness of the power indicator, 0 (off) to 255 (full)
    fn set_power(&mut self, intensity: u8);
    /// Switch the red alert indicator
    fn set_alert(&mut self, on: bool);
}

/// Unwrap a result that cannot hold an error.
pub(crate) fn infallible<T>(result: Result<T, Infallible>) -> T {
    match result {
        Ok(value) => value,
        Err(never) => match never {},
    }
}

/// LED bar, a dimmable power LED and an alert LED, driven by GPIO and PWM.
pub struct LedBar<P, D, A> {
    /// Bar LEDs, bit 0 first
    bar: [P; BAR_LED_COUNT],
    /// Power indicator, dimmed through PWM
    power: D,
    /// Red alert indicator
    alert: A,
}

impl<P, D, A> LedBar<P, D, A>
where
    P: OutputPin<Error = Infallible>,
    D: SetDutyCycle<Error = Infallible>,
    A: OutputPin<Error = Infallible>,
{
    /// Take ownership of the LEDs and switch everything off
    pub fn new(bar: [P; BAR_LED_COUNT], power: D, alert: A) -> Self {
        let mut leds = Self { bar, power, alert };
        leds.set_bar(0);
        leds.set_power(0);
        leds.set_alert(false);
        leds
    }
}

impl<P, D, A> Indicators for LedBar<P, D, A>
where
    P: OutputPin<Error = Infallible>,
    D: SetDutyCycle<Error = Infallible>,
    A: OutputPin<Error = Infallible>,
{
    fn set_bar(&mut self, mask: u8) {
        for (bit, led) in self.bar.iter_mut().enumerate() {
            infallible(led.set_state(PinState::from(mask & (1 << bit) != 0)));
        }
    }

    fn set_power(&mut self, intensity: u8) {
        infallible(
            self.power
                .set_duty_cycle_fraction(u16::from(intensity), u16::from(u8::MAX)),
        );
    }

    fn set_alert(&mut self, on: bool) {
        infallible(self.alert.set_state(PinState::from(on)));
    }
}

/// Anything that accepts a 0-255 fan speed command.
pub trait SpeedCommand {
    /// Command a speed, 0 being the slowest
    fn set_speed(&mut self, speed: u8) -> Result<(), Fault>;
}

/// Fan speed control through a ~25 kHz PWM channel.
pub struct FanDrive<P> {
    /// PWM channel wired to the fan's control input
    pwm: P,
    /// Cleared by [`FanDrive::disable`]; a disabled drive ignores further commands
    enabled: bool,
}

impl<P: SetDutyCycle> FanDrive<P> {
    /// Take the PWM channel and start at the lowest speed
    pub fn new(pwm: P) -> Result<Self, Fault> {
        let mut fan = Self { pwm, enabled: true };
        fan.set_level(0)?;
        Ok(fan)
    }

    /// Raw PWM level for a 0-255 speed
    pub fn level_for_speed(speed: u8) -> u8 {
        let level = u32::from(PWM_LEVEL_COUNT - 1) * u32::from(speed) / u32::from(u8::MAX);
        level.min(u32::from(PWM_LEVEL_COUNT - 1)) as u8
    }

    /// Drive the fan at raw PWM `level`, which must be below [`PWM_LEVEL_COUNT`].
    pub fn set_level(&mut self, level: u8) -> Result<(), Fault> {
        if level >= PWM_LEVEL_COUNT {
            return Err(Fault::PwmLevelOutOfRange(level));
        }
        if !self.enabled {
            return Ok(());
        }
        self.pwm
            .set_duty_cycle_fraction(PWM_LEVEL_MIN + u16::from(level), PWM_PERIOD)
            .map_err(|_| Fault::FanDrive)
    }

    /// Stop driving the fan for good
    pub fn disable(&mut self) {
        self.enabled = false;
        if self.pwm.set_duty_cycle_fully_off().is_err() {
            error!("Unable to switch off fan PWM output");
        }
    }

    /// Whether [`FanDrive::disable`] has been called
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

impl<P: SetDutyCycle> SpeedCommand for FanDrive<P> {
    fn set_speed(&mut self, speed: u8) -> Result<(), Fault> {
        self.set_level(Self::level_for_speed(speed))
    }
}
