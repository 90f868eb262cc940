// SPDX-License-Identifier: Apache-2.0

//! Debounced push button and the short/long press gesture states.

use embedded_hal::digital::InputPin;

use crate::{
    clock::{Clock, Ticks},
    components::infallible,
};

/// Time between the two samples of a debounced read
pub const DEBOUNCE_MS: u32 = 20;
/// Hold time after which a press counts as long
pub const LONG_PRESS_MS: u32 = 1500;

/// Active-low push button with double-sample debouncing
pub struct Button<P, C> {
    /// Input pin, low while pressed
    pin: P,
    /// Timing for the debounce delay
    clock: C,
}

impl<P, C> Button<P, C>
where
    P: InputPin<Error = core::convert::Infallible>,
    C: Clock,
{
    /// Take the pin. It must already be configured as an input with pull-up.
    pub fn new(pin: P, clock: C) -> Self {
        Self { pin, clock }
    }

    /// Pressed in two samples taken [`DEBOUNCE_MS`] apart. Disagreeing samples are bounce and read
    /// as not pressed.
    pub fn is_pressed(&mut self) -> bool {
        let first = infallible(self.pin.is_low());
        self.clock.delay_ms(DEBOUNCE_MS);
        let second = infallible(self.pin.is_low());
        first && second
    }

    /// Negation of [`Button::is_pressed`]
    pub fn is_released(&mut self) -> bool {
        !self.is_pressed()
    }
}

/// Gesture recognition states, advanced once per main loop iteration
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ButtonState {
    /// Button must be let go before the next gesture
    WaitingForRelease,
    /// Idle
    WaitingForPress,
    /// Held down; becomes a long press at `long_press_at`
    Pressed {
        /// Deadline for a long press
        long_press_at: Ticks,
    },
    /// Released before the long press deadline. Handled by the controller.
    ShortPress,
    /// Held past the long press deadline. Handled by the controller.
    LongPress,
}

impl ButtonState {
    /// Whether [`ButtonState::transition`] needs a fresh debounced sample at `now`.
    ///
    /// An expired long press deadline wins over the button level, so no sample is taken then.
    pub fn needs_sample(&self, now: Ticks) -> bool {
        match self {
            Self::WaitingForRelease | Self::WaitingForPress => true,
            Self::Pressed { long_press_at } => !long_press_at.has_passed(now),
            Self::ShortPress | Self::LongPress => false,
        }
    }

    /// Advance with the debounced button level. Gesture states are left unchanged.
    pub fn transition(self, now: Ticks, pressed: bool) -> Self {
        match self {
            Self::WaitingForRelease if !pressed => Self::WaitingForPress,
            Self::WaitingForPress if pressed => Self::Pressed {
                long_press_at: now.wrapping_add_ms(LONG_PRESS_MS),
            },
            Self::Pressed { long_press_at } if long_press_at.has_passed(now) => Self::LongPress,
            Self::Pressed { .. } if !pressed => Self::ShortPress,
            state => state,
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::mocks::{ButtonPin, TestClock};

    #[rstest]
    #[case(&[true, false])]
    #[case(&[false, true])]
    #[case(&[false, false])]
    fn disagreeing_samples_are_not_a_press(#[case] samples: &[bool]) {
        let pin = ButtonPin::new();
        pin.script(samples);
        let mut button = Button::new(pin, TestClock::new());
        assert!(!button.is_pressed());
    }

    #[test]
    fn steady_press_is_detected_after_debounce() {
        let pin = ButtonPin::new();
        let clock = TestClock::new();
        let mut button = Button::new(pin.clone(), clock.clone());
        pin.press();
        assert!(button.is_pressed());
        assert!(clock.now().get() >= DEBOUNCE_MS);
        pin.release();
        assert!(button.is_released());
    }

    #[test]
    fn short_press_gesture() {
        let start = Ticks::from_millis(0);
        let state = ButtonState::WaitingForRelease.transition(start, true);
        assert_eq!(state, ButtonState::WaitingForRelease);
        let state = state.transition(start, false);
        assert_eq!(state, ButtonState::WaitingForPress);
        let state = state.transition(start, true);
        assert_eq!(
            state,
            ButtonState::Pressed {
                long_press_at: Ticks::from_millis(LONG_PRESS_MS)
            }
        );
        let later = Ticks::from_millis(LONG_PRESS_MS);
        assert!(state.needs_sample(later));
        assert_eq!(state.transition(later, true), state);
        assert_eq!(state.transition(later, false), ButtonState::ShortPress);
    }

    #[test]
    fn held_past_deadline_is_long_press_even_if_released() {
        let state = ButtonState::Pressed {
            long_press_at: Ticks::from_millis(LONG_PRESS_MS),
        };
        let expired = Ticks::from_millis(LONG_PRESS_MS + 1);
        assert!(!state.needs_sample(expired));
        assert_eq!(state.transition(expired, false), ButtonState::LongPress);
    }

    #[rstest]
    #[case(ButtonState::ShortPress)]
    #[case(ButtonState::LongPress)]
    fn gestures_wait_for_controller(#[case] state: ButtonState) {
        let now = Ticks::from_millis(10);
        assert!(!state.needs_sample(now));
        assert_eq!(state.transition(now, true), state);
        assert_eq!(state.transition(now, false), state);
    }
}
