// SPDX-License-Identifier: Apache-2.0

//! Main loop state machine: renders the active display mode and turns button gestures into mode
//! changes and the full speed override.

use core::convert::Infallible;

use embedded_hal::digital::InputPin;

use crate::{
    button::{Button, ButtonState},
    clock::Clock,
    components::Indicators,
    config::Settings,
    display::{AutoOff, Display, DisplayMode, OVERRIDE_BAR_MASK, OVERRIDE_SPEED},
    error::Fault,
    setpoint::SetpointControl,
    storage::ByteStore,
};

/// Display mode, button gesture and auto-off state of the running regulator
pub struct Controller<P, S, C> {
    /// Mode cycling button
    button: Button<P, C>,
    /// Where the selected mode is persisted
    settings: Settings<S>,
    /// Deadline source
    clock: C,
    /// Mode to render on the next step
    mode: DisplayMode,
    /// Mode rendered on the previous step. A different `mode` runs its entry actions.
    rendered: Option<DisplayMode>,
    /// Standard mode to restore when the override ends
    overridden: DisplayMode,
    /// Gesture recognition
    button_state: ButtonState,
    /// Shared by both auto-off modes, reset on entry
    auto_off: AutoOff,
}

impl<P, S, C> Controller<P, S, C>
where
    P: InputPin<Error = Infallible>,
    S: ByteStore,
    C: Clock,
{
    /// Start in `mode`, which should be the one loaded from `settings`.
    ///
    /// The button must be released before the first gesture counts, so a button held through boot
    /// is ignored.
    pub fn new(button: Button<P, C>, settings: Settings<S>, clock: C, mode: DisplayMode) -> Self {
        Self {
            button,
            settings,
            clock,
            mode,
            rendered: None,
            overridden: mode,
            button_state: ButtonState::WaitingForRelease,
            auto_off: AutoOff::new(),
        }
    }

    /// Active display mode
    pub fn mode(&self) -> DisplayMode {
        self.mode
    }

    /// Gesture recognition state
    pub fn button_state(&self) -> ButtonState {
        self.button_state
    }

    /// Confirm the starting mode on the display
    pub fn start<I: Indicators>(&mut self, display: &mut Display<I>) -> Result<(), Fault> {
        info!("Starting in display mode {:?}", self.mode);
        display.show_mode_change(None, self.mode, &self.clock)
    }

    /// One main loop iteration: render the mode, then advance the button.
    ///
    /// `real_speed` is the latest normalized tachometer reading.
    pub fn step<I, T>(
        &mut self,
        real_speed: u8,
        display: &mut Display<I>,
        setpoint: &T,
    ) -> Result<(), Fault>
    where
        I: Indicators,
        T: SetpointControl,
    {
        self.render(real_speed, display, setpoint);
        self.handle_button(display)
    }

    /// Run the active mode, with its entry actions if it changed since the last step.
    fn render<I: Indicators, T: SetpointControl>(
        &mut self,
        real_speed: u8,
        display: &mut Display<I>,
        setpoint: &T,
    ) {
        let entering = self.rendered != Some(self.mode);
        if entering {
            debug!("Entering display mode {:?}", self.mode);
        }

        match self.mode {
            DisplayMode::Setpoint | DisplayMode::RealSpeed => {
                if entering {
                    setpoint.clear_override();
                    display.power_on();
                }
                let value = match self.mode {
                    DisplayMode::Setpoint => setpoint.current(),
                    _ => real_speed,
                };
                display.show_value(value);
            }
            DisplayMode::SetpointAutoOff | DisplayMode::RealSpeedAutoOff => {
                if entering {
                    setpoint.clear_override();
                    self.auto_off.reset();
                }
                let value = match self.mode {
                    DisplayMode::SetpointAutoOff => setpoint.current(),
                    _ => real_speed,
                };
                self.auto_off.run(value, display, &self.clock);
            }
            DisplayMode::Override => {
                if entering {
                    setpoint.set_override(OVERRIDE_SPEED);
                    display.power_on();
                    display.show_mask(OVERRIDE_BAR_MASK);
                }
            }
        }
        self.rendered = Some(self.mode);
    }

    /// Advance the gesture state, acting on a completed gesture.
    fn handle_button<I: Indicators>(&mut self, display: &mut Display<I>) -> Result<(), Fault> {
        match self.button_state {
            ButtonState::ShortPress => {
                if self.mode == DisplayMode::Override {
                    self.mode = self.overridden;
                    self.rendered = None;
                    info!("Override ended, back to {:?}", self.mode);
                    display.show_mode_change(None, self.mode, &self.clock)?;
                } else {
                    let previous = self.mode;
                    self.mode = previous.next();
                    info!("Display mode {:?} -> {:?}", previous, self.mode);
                    self.settings.save_display_mode(self.mode)?;
                    display.show_mode_change(Some(previous), self.mode, &self.clock)?;
                }
                self.button_state = ButtonState::WaitingForPress;
            }
            ButtonState::LongPress => {
                if self.mode.is_standard() {
                    self.overridden = self.mode;
                }
                self.mode = DisplayMode::Override;
                info!("Override to full speed");
                self.button_state = ButtonState::WaitingForRelease;
            }
            state => {
                // Deadline is judged at the instant sampling starts, not after the debounce delay
                let now = self.clock.now();
                let pressed = state.needs_sample(now) && self.button.is_pressed();
                let next = state.transition(now, pressed);
                if next != state {
                    debug!("Button: {:?} -> {:?}", state, next);
                }
                self.button_state = next;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        button::LONG_PRESS_MS,
        display::{AUTO_OFF_MS, DIMMED_POWER_INTENSITY},
        mocks::{ButtonPin, MemoryStore, MockSetpoint, RecordingIndicators, TestClock},
    };

    struct Rig {
        pin: ButtonPin,
        clock: TestClock,
        display: Display<RecordingIndicators>,
        setpoint: MockSetpoint,
        controller: Controller<ButtonPin, MemoryStore, TestClock>,
    }

    impl Rig {
        fn new(mode: DisplayMode) -> Self {
            let pin = ButtonPin::new();
            let clock = TestClock::new();
            let button = Button::new(pin.clone(), clock.clone());
            let mut settings = Settings::new(MemoryStore::new());
            settings.save_display_mode(mode).unwrap();
            let controller = Controller::new(button, settings, clock.clone(), mode);
            let mut rig = Self {
                pin,
                clock,
                display: Display::new(RecordingIndicators::default()),
                setpoint: MockSetpoint::default(),
                controller,
            };
            rig.controller.start(&mut rig.display).unwrap();
            // Released button arms gesture recognition
            rig.step();
            assert_eq!(rig.controller.button_state(), ButtonState::WaitingForPress);
            rig
        }

        fn step(&mut self) {
            self.step_at(200);
        }

        fn step_at(&mut self, real_speed: u8) {
            self.controller
                .step(real_speed, &mut self.display, &self.setpoint)
                .unwrap();
        }

        fn short_press(&mut self) {
            self.pin.press();
            self.step();
            self.pin.release();
            self.step();
            assert_eq!(self.controller.button_state(), ButtonState::ShortPress);
            self.step();
        }

        fn long_press(&mut self) {
            self.pin.press();
            self.step();
            self.clock.advance(LONG_PRESS_MS + 1);
            self.step();
            assert_eq!(self.controller.button_state(), ButtonState::LongPress);
            self.step();
            self.pin.release();
            self.step();
        }

        fn saved_mode(&mut self) -> Result<DisplayMode, Fault> {
            self.controller.settings.load_display_mode()
        }
    }

    #[test]
    fn four_short_presses_cycle_back() {
        let mut rig = Rig::new(DisplayMode::Setpoint);
        let expected = [
            DisplayMode::RealSpeed,
            DisplayMode::SetpointAutoOff,
            DisplayMode::RealSpeedAutoOff,
            DisplayMode::Setpoint,
        ];
        for mode in expected {
            rig.short_press();
            assert_eq!(rig.controller.mode(), mode);
            assert_eq!(rig.saved_mode(), Ok(mode));
        }
    }

    #[test]
    fn short_press_confirms_previous_and_new_mode() {
        let mut rig = Rig::new(DisplayMode::Setpoint);
        rig.display = Display::new(RecordingIndicators::default());
        rig.short_press();
        let leds = rig.display.indicators();
        assert!(leds.bar_history.ends_with(&[0x80, 0x40, 0x00]));
        assert_eq!(leds.alert_history, [true, false]);
    }

    #[test]
    fn long_press_overrides_and_short_press_restores() {
        let mut rig = Rig::new(DisplayMode::RealSpeed);
        rig.setpoint.value.set(40);

        rig.long_press();
        assert_eq!(rig.controller.mode(), DisplayMode::Override);
        assert_eq!(rig.setpoint.override_value.get(), Some(255));
        assert_eq!(rig.display.indicators().bar, OVERRIDE_BAR_MASK);
        assert_eq!(rig.display.indicators().power, u8::MAX);

        rig.short_press();
        assert_eq!(rig.controller.mode(), DisplayMode::RealSpeed);
        rig.step();
        assert_eq!(rig.setpoint.override_value.get(), None);
        assert_eq!(rig.saved_mode(), Ok(DisplayMode::RealSpeed));
    }

    #[test]
    fn release_just_before_deadline_is_short_press() {
        let mut rig = Rig::new(DisplayMode::Setpoint);
        rig.pin.press();
        rig.step();
        let ButtonState::Pressed { long_press_at } = rig.controller.button_state() else {
            panic!("press not registered: {:?}", rig.controller.button_state());
        };

        let remaining = long_press_at.wrapping_elapsed_since(rig.clock.now());
        rig.clock.advance(remaining - 10);
        rig.pin.release();
        rig.step();
        assert_eq!(rig.controller.button_state(), ButtonState::ShortPress);
        rig.step();
        assert_eq!(rig.controller.mode(), DisplayMode::RealSpeed);
    }

    #[test]
    fn repeated_long_press_keeps_restore_mode() {
        let mut rig = Rig::new(DisplayMode::Setpoint);
        rig.long_press();

        // A second long press keeps the mode saved by the first one
        rig.pin.press();
        rig.step();
        assert!(matches!(
            rig.controller.button_state(),
            ButtonState::Pressed { .. }
        ));
        rig.clock.advance(LONG_PRESS_MS + 1);
        rig.step();
        rig.step();
        assert_eq!(rig.controller.mode(), DisplayMode::Override);
        assert_eq!(rig.controller.button_state(), ButtonState::WaitingForRelease);

        rig.pin.release();
        rig.step();
        rig.short_press();
        assert_eq!(rig.controller.mode(), DisplayMode::Setpoint);
    }

    #[test]
    fn setpoint_mode_shows_potentiometer() {
        let mut rig = Rig::new(DisplayMode::Setpoint);
        rig.setpoint.value.set(100);
        rig.step();
        assert_eq!(rig.display.indicators().bar, 0x07);
        assert_eq!(rig.display.indicators().power, u8::MAX);
    }

    #[test]
    fn real_speed_mode_shows_tachometer() {
        let mut rig = Rig::new(DisplayMode::RealSpeed);
        rig.setpoint.value.set(100);
        rig.step_at(200);
        assert_eq!(rig.display.indicators().bar, 0x3F);
        rig.step_at(20);
        assert_eq!(rig.display.indicators().bar, 0x01);
    }

    #[test]
    fn real_speed_auto_off_follows_tachometer() {
        let mut rig = Rig::new(DisplayMode::RealSpeedAutoOff);
        rig.setpoint.value.set(100);
        rig.step_at(200);
        assert_eq!(rig.display.indicators().bar, 0x3F);

        rig.clock.advance(AUTO_OFF_MS);
        rig.step_at(200);
        assert_eq!(rig.display.indicators().bar, 0);
        assert_eq!(rig.display.indicators().power, DIMMED_POWER_INTENSITY);

        // Potentiometer changes do not wake a real speed display
        rig.setpoint.value.set(250);
        rig.step_at(200);
        assert_eq!(rig.display.indicators().bar, 0);

        rig.step_at(250);
        assert_eq!(rig.display.indicators().bar, 0xFF);
        assert_eq!(rig.display.indicators().power, u8::MAX);
    }

    #[test]
    fn auto_off_mode_dims_then_wakes() {
        let mut rig = Rig::new(DisplayMode::SetpointAutoOff);
        rig.setpoint.value.set(100);
        rig.step();
        assert_eq!(rig.display.indicators().bar, 0x07);

        rig.clock.advance(AUTO_OFF_MS);
        rig.step();
        assert_eq!(rig.display.indicators().bar, 0);
        assert_eq!(rig.display.indicators().power, DIMMED_POWER_INTENSITY);

        rig.setpoint.value.set(250);
        rig.step();
        assert_eq!(rig.display.indicators().bar, 0xFF);
        assert_eq!(rig.display.indicators().power, u8::MAX);
    }
}
