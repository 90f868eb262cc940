// SPDX-License-Identifier: Apache-2.0

//! Fatal faults. Every one of them ends in [`Display::blink_forever`](crate::display::Display::blink_forever)
//! once it reaches the firmware's main loop.

use thiserror::Error;

/// Conditions under which the regulator stops driving the fan.
///
/// There is no recovery path: the fan output is disabled and all indicators blink until the board
/// is power cycled.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Fault {
    /// A [`MedianBuffer`](crate::buffer::MedianBuffer) was requested with an unsupported capacity.
    #[error("median filter capacity {0} is outside of 3..=16")]
    FilterCapacity(u8),
    /// A display mode code does not name any known mode.
    #[error("unknown display mode code {0}")]
    UnknownDisplayMode(u8),
    /// A raw PWM level above [`PWM_LEVEL_COUNT`](crate::components::PWM_LEVEL_COUNT) was commanded.
    #[error("fan PWM level {0} is out of range")]
    PwmLevelOutOfRange(u8),
    /// No tachometer pulse completed within [`STALL_TIMEOUT_US`](crate::speed::STALL_TIMEOUT_US).
    #[error("fan stalled, no tachometer pulse within the stall timeout")]
    Stall,
    /// The persistent store could not be read or written.
    #[error("persistent settings could not be accessed")]
    Storage,
    /// The PWM peripheral rejected a duty cycle update.
    #[error("fan PWM output could not be updated")]
    FanDrive,
}

impl Fault {
    /// Appended to every fault report.
    pub const RESET_MSG: &'static str = "\nSystem must be power cycled to restore normal operation.";
}

/// Log a fault at error level, together with the reset hint.
pub fn report(fault: Fault) {
    error!(
        "Error encountered during operation:\n{}{}",
        fault,
        Fault::RESET_MSG
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn faults_print_their_payload() {
        assert_eq!(
            Fault::FilterCapacity(17).to_string(),
            "median filter capacity 17 is outside of 3..=16"
        );
        assert_eq!(Fault::PwmLevelOutOfRange(80).to_string(), "fan PWM level 80 is out of range");
    }
}
