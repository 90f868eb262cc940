// SPDX-License-Identifier: Apache-2.0

//! What the LED bar shows: display modes, value bucketization, mode change confirmation, the
//! auto-off policy and the fatal blink.

use crate::{
    clock::{Clock, Ticks},
    components::Indicators,
    error::Fault,
};

/// Bar LED `i` lights when the shown value is strictly above `BAR_THRESHOLDS[i]`
pub const BAR_THRESHOLDS: [u8; 8] = [16, 48, 80, 112, 144, 176, 208, 240];
/// Bar pattern while the fan is forced to [`OVERRIDE_SPEED`]
pub const OVERRIDE_BAR_MASK: u8 = 0xAA;
/// Fan speed commanded in [`DisplayMode::Override`]
pub const OVERRIDE_SPEED: u8 = u8::MAX;
/// Power indicator intensity while an auto-off display is dimmed
pub const DIMMED_POWER_INTENSITY: u8 = 90;
/// Time without a bar change before an auto-off display dims
pub const AUTO_OFF_MS: u32 = 4000;
/// How long the previous mode is shown when confirming a mode change
pub const MODE_PREVIOUS_MS: u32 = 400;
/// How long the new mode is shown when confirming a mode change
pub const MODE_CURRENT_MS: u32 = 1200;
/// Full on/off period of the fatal blink
pub const FAULT_BLINK_PERIOD_MS: u32 = 1000;

/// Bar mask for a 0-255 value: one more LED for every threshold passed, filling from bit 0.
pub fn bar_mask_for_value(value: u8) -> u8 {
    let passed = BAR_THRESHOLDS
        .iter()
        .take_while(|&&threshold| value > threshold)
        .count();
    ((1u16 << passed) - 1) as u8
}

/// What the bar shows, and whether the fan follows the potentiometer.
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DisplayMode {
    /// Potentiometer setpoint
    Setpoint = 0,
    /// Measured fan speed
    RealSpeed = 1,
    /// Potentiometer setpoint, dimmed after a while without change
    SetpointAutoOff = 2,
    /// Measured fan speed, dimmed after a while without change
    RealSpeedAutoOff = 3,
    /// Fan forced to full speed. Entered with a long press; never persisted.
    Override = 5,
}

impl DisplayMode {
    /// Code stored in the persistent settings
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Standard modes are part of the short press cycle and can be persisted.
    pub const fn is_standard(self) -> bool {
        !matches!(self, Self::Override)
    }

    /// Next mode in the short press cycle. [`DisplayMode::Override`] is not part of the cycle and
    /// returns itself.
    pub const fn next(self) -> Self {
        match self {
            Self::Setpoint => Self::RealSpeed,
            Self::RealSpeed => Self::SetpointAutoOff,
            Self::SetpointAutoOff => Self::RealSpeedAutoOff,
            Self::RealSpeedAutoOff => Self::Setpoint,
            Self::Override => Self::Override,
        }
    }

    /// Single bar LED identifying a standard mode, counted from the top of the bar.
    pub const fn indicator_mask(self) -> Option<u8> {
        if self.is_standard() {
            Some(0x80 >> self.code())
        } else {
            None
        }
    }
}

impl TryFrom<u8> for DisplayMode {
    type Error = Fault;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Self::Setpoint),
            1 => Ok(Self::RealSpeed),
            2 => Ok(Self::SetpointAutoOff),
            3 => Ok(Self::RealSpeedAutoOff),
            5 => Ok(Self::Override),
            _ => Err(Fault::UnknownDisplayMode(code)),
        }
    }
}

/// Indicators plus the bar bucket last shown by value.
pub struct Display<I> {
    /// Underlying LEDs
    indicators: I,
    /// Mask of the last [`Display::show_value`], used to detect bucket changes
    last_value_mask: u8,
}

impl<I: Indicators> Display<I> {
    /// Wrap the indicators
    pub fn new(indicators: I) -> Self {
        Self {
            indicators,
            last_value_mask: 0,
        }
    }

    /// Borrow the underlying indicators
    pub fn indicators(&self) -> &I {
        &self.indicators
    }

    /// Light the bar with a raw mask. Does not count as showing a value.
    pub fn show_mask(&mut self, mask: u8) {
        self.indicators.set_bar(mask);
    }

    /// Show a 0-255 value as a bar of [`bar_mask_for_value`] LEDs
    pub fn show_value(&mut self, value: u8) {
        let mask = bar_mask_for_value(value);
        self.indicators.set_bar(mask);
        self.last_value_mask = mask;
    }

    /// Whether showing `value` would light a different number of LEDs than the last shown value
    pub fn would_change(&self, value: u8) -> bool {
        bar_mask_for_value(value) != self.last_value_mask
    }

    /// Power indicator at full brightness
    pub fn power_on(&mut self) {
        self.indicators.set_power(u8::MAX);
    }

    /// Power indicator off
    pub fn power_off(&mut self) {
        self.indicators.set_power(0);
    }

    /// Power indicator at `intensity`
    pub fn set_power(&mut self, intensity: u8) {
        self.indicators.set_power(intensity);
    }

    /// Switch the alert indicator
    pub fn set_alert(&mut self, on: bool) {
        self.indicators.set_alert(on);
    }

    /// Light `lit` bar LEDs from bit 0, used as a progress bar.
    pub fn show_progress(&mut self, lit: u8) {
        let mask = match lit {
            0 => 0,
            1..=7 => (1u8 << lit) - 1,
            _ => u8::MAX,
        };
        self.indicators.set_bar(mask);
    }

    /// Confirm a mode change: the previous mode's LED for [`MODE_PREVIOUS_MS`] (when there is one),
    /// then the new mode's LED for [`MODE_CURRENT_MS`]. The alert indicator is on and the power
    /// indicator off for the whole sequence; the bar is blank afterwards.
    pub fn show_mode_change<C: Clock>(
        &mut self,
        previous: Option<DisplayMode>,
        current: DisplayMode,
        clock: &C,
    ) -> Result<(), Fault> {
        let current_mask = current
            .indicator_mask()
            .ok_or(Fault::UnknownDisplayMode(current.code()))?;

        self.power_off();
        self.set_alert(true);
        if let Some(previous_mask) = previous.and_then(DisplayMode::indicator_mask) {
            self.show_mask(previous_mask);
            clock.delay_ms(MODE_PREVIOUS_MS);
        }
        self.show_mask(current_mask);
        clock.delay_ms(MODE_CURRENT_MS);

        self.show_mask(0);
        self.set_alert(false);
        Ok(())
    }

    /// Blink every indicator forever. Callers stop the fan first.
    pub fn blink_forever<C: Clock>(&mut self, clock: &C) -> ! {
        loop {
            self.show_mask(u8::MAX);
            self.power_on();
            self.set_alert(true);
            clock.delay_ms(FAULT_BLINK_PERIOD_MS / 2);

            self.show_mask(0);
            self.power_off();
            self.set_alert(false);
            clock.delay_ms(FAULT_BLINK_PERIOD_MS / 2);
        }
    }
}

/// Display side effect requested by an [`AutoOffState`] transition
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AutoOffAction {
    /// Full power indicator, bar shows the value
    Show,
    /// Dimmed power indicator, blank bar
    Dim,
}

/// States of the auto-off display policy
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AutoOffState {
    /// Render the value at full intensity
    Showing,
    /// Dim the display
    Dimmed,
    /// Value shown; dim at `deadline` unless the bar bucket changes first
    WaitingForChangeOrDeadline {
        /// When the display dims
        deadline: Ticks,
    },
    /// Display dimmed; wake up on a bar bucket change
    WaitingForChange,
}

impl AutoOffState {
    /// Advance by one step.
    ///
    /// `would_change` tells whether the current value falls in a different bar bucket than the last
    /// value shown.
    pub fn transition(self, now: Ticks, would_change: bool) -> (Self, Option<AutoOffAction>) {
        match self {
            Self::Showing => (
                Self::WaitingForChangeOrDeadline {
                    deadline: now.wrapping_add_ms(AUTO_OFF_MS),
                },
                Some(AutoOffAction::Show),
            ),
            Self::Dimmed => (Self::WaitingForChange, Some(AutoOffAction::Dim)),
            Self::WaitingForChangeOrDeadline { deadline } if deadline.has_passed(now) => {
                (Self::Dimmed, None)
            }
            Self::WaitingForChangeOrDeadline { .. } | Self::WaitingForChange if would_change => {
                (Self::Showing, None)
            }
            state => (state, None),
        }
    }

    /// Waiting states hand control back to the main loop
    pub fn is_waiting(&self) -> bool {
        matches!(
            self,
            Self::WaitingForChangeOrDeadline { .. } | Self::WaitingForChange
        )
    }
}

/// Auto-off policy shared by both auto-off display modes
#[derive(Debug)]
pub struct AutoOff {
    /// Current state
    state: AutoOffState,
}

impl Default for AutoOff {
    fn default() -> Self {
        Self::new()
    }
}

impl AutoOff {
    /// Start in [`AutoOffState::Showing`]
    pub const fn new() -> Self {
        Self {
            state: AutoOffState::Showing,
        }
    }

    /// Return to [`AutoOffState::Showing`], done whenever an auto-off mode is entered
    pub fn reset(&mut self) {
        self.state = AutoOffState::Showing;
    }

    /// Current state
    pub fn state(&self) -> AutoOffState {
        self.state
    }

    /// Run transitions for `value` until the policy is waiting again.
    pub fn run<I: Indicators, C: Clock>(&mut self, value: u8, display: &mut Display<I>, clock: &C) {
        loop {
            let (next, action) = self
                .state
                .transition(clock.now(), display.would_change(value));
            match action {
                Some(AutoOffAction::Show) => {
                    display.power_on();
                    display.show_value(value);
                }
                Some(AutoOffAction::Dim) => {
                    display.set_power(DIMMED_POWER_INTENSITY);
                    display.show_mask(0);
                }
                None => {}
            }
            if next != self.state {
                debug!("Auto-off: {:?} -> {:?}", self.state, next);
            }
            self.state = next;
            if self.state.is_waiting() {
                break;
            }
        }
    }
}
