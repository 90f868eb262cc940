//! Fan regulator with tachometer feedback for [RP2040](https://docs.rs/rp2040-hal). A
//! potentiometer sets the fan speed, an 8-LED bar shows either the setpoint or the measured speed,
//! and a single button cycles display modes or forces full speed.
//!
//! The library is hardware independent: every peripheral is reached through
//! [`embedded-hal`](embedded_hal) traits or the small traits in [`clock`], [`components`],
//! [`setpoint`] and [`storage`], so all of the logic runs in host tests. The firmware binary
//! (`src/main.rs`) wires it to RP2040 pins and interrupts.
//!
//! ## Crate features
//!
//! - `firmware`: Builds the RP2040 binary and pulls in the Cortex-M runtime, `rp2040-hal`,
//!   `defmt-rtt` and `panic-probe`. Build with `cargo firmware`.
//! - `defmt`: Logs through [`defmt`](https://docs.rs/defmt) instead of the [`log`] facade, and
//!   derives `defmt::Format` for public types. Enabled by `firmware`.
//! - `trace_pulse_samples`: Logs every tachometer pulse width measured. See
//!   [`speed::SpeedSensor::measure_pulse_width`].
//! - `trace_setpoint_samples`: Logs every potentiometer conversion and the filtered setpoint. Very
//!   noisy! See [`setpoint::SetpointSensor::record`].
//!
//! ## Display modes
//!
//! A short press cycles [`Setpoint`](display::DisplayMode::Setpoint),
//! [`RealSpeed`](display::DisplayMode::RealSpeed),
//! [`SetpointAutoOff`](display::DisplayMode::SetpointAutoOff) and
//! [`RealSpeedAutoOff`](display::DisplayMode::RealSpeedAutoOff); the selection survives power
//! loss. A long press forces full speed until the next short press. Holding the button at power on
//! recalibrates the tachometer.
//!
//! ## Demo
//!
//! The main loop of the firmware, simplified:
//!
//! ```no_run
//! # use core::convert::Infallible;
//! # use embedded_hal::{digital::InputPin, i2c::I2c};
//! use fan_regulator::{
//!     button::Button,
//!     clock::PulseCounter,
//!     components::{Indicators, SpeedCommand},
//!     config::Settings,
//!     control::Controller,
//!     display::Display,
//!     error::Fault,
//!     interrupt::{self, SharedSetpoint, TickClock},
//!     speed::SpeedSensor,
//!     storage::Eeprom24,
//! };
//!
//! fn run<I, B, T, P, E, F>(
//!     display: &mut Display<I>,
//!     button: B,
//!     tach: T,
//!     counter: P,
//!     i2c: E,
//!     fan: &mut F,
//! ) -> Result<Infallible, Fault>
//! where
//!     I: Indicators,
//!     B: InputPin<Error = Infallible>,
//!     T: InputPin<Error = Infallible>,
//!     P: PulseCounter,
//!     E: I2c,
//!     F: SpeedCommand,
//! {
//!     let clock = TickClock;
//!     let mut settings = Settings::new(Eeprom24::new(i2c, clock));
//!     let mut speed = SpeedSensor::new(tach, counter)?;
//!     let calibration = match settings.load_calibration()? {
//!         Some(record) => record,
//!         None => speed.calibrate(fan, display, &clock, &mut settings)?,
//!     };
//!     speed.set_calibration(calibration)?;
//!     critical_section::with(|cs| interrupt::init_setpoint(cs))?;
//!
//!     let mode = settings.load_display_mode()?;
//!     let mut controller = Controller::new(Button::new(button, clock), settings, clock, mode);
//!     controller.start(display)?;
//!     loop {
//!         if let Some(fault) = interrupt::take_fault() {
//!             return Err(fault);
//!         }
//!         let real_speed = speed.normalized_speed()?;
//!         controller.step(real_speed, display, &SharedSetpoint)?;
//!     }
//! }
//! ```

// Copyright 2024 The fan_regulator authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg), feature(doc_auto_cfg), feature(doc_cfg_hide))]

#[macro_use]
mod fmt;

pub mod buffer;
pub mod button;
pub mod clock;
pub mod components;
pub mod config;
pub mod control;
pub mod display;
pub mod error;
pub mod interrupt;
pub mod setpoint;
pub mod speed;
pub mod storage;

#[cfg(test)]
mod mocks;
