// SPDX-License-Identifier: Apache-2.0

//! Monotonic time: millisecond [`Ticks`] for deadlines, and a microsecond [`PulseCounter`] for
//! tachometer timing.

/// Milliseconds since boot, as counted by the tick interrupt.
///
/// The counter wraps after roughly 49.7 days, so instants are compared with wrapping arithmetic
/// and are only meaningful within half of that range of each other.
#[derive(Default, Debug, Eq, PartialEq, Copy, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Ticks(u32);

impl Ticks {
    /// Wrap a raw millisecond count
    pub const fn from_millis(millis: u32) -> Self {
        Self(millis)
    }

    /// Get current counter value
    pub const fn get(&self) -> u32 {
        self.0
    }

    /// The instant `millis` milliseconds after this one, with defined wrapping.
    pub const fn wrapping_add_ms(self, millis: u32) -> Self {
        Self(self.0.wrapping_add(millis))
    }

    /// Milliseconds elapsed between `earlier` and this instant.
    pub const fn wrapping_elapsed_since(self, earlier: Ticks) -> u32 {
        self.0.wrapping_sub(earlier.0)
    }

    /// Treating `self` as a deadline, whether `now` is strictly past it.
    pub const fn has_passed(self, now: Ticks) -> bool {
        (now.0.wrapping_sub(self.0) as i32) > 0
    }
}

/// Source of [`Ticks`], plus deadline helpers built on it.
pub trait Clock {
    /// Current instant
    fn now(&self) -> Ticks;

    /// The instant `millis` milliseconds from now
    fn deadline(&self, millis: u32) -> Ticks {
        self.now().wrapping_add_ms(millis)
    }

    /// Whether `deadline` (from [`Clock::deadline`]) has been exceeded
    fn has_expired(&self, deadline: Ticks) -> bool {
        deadline.has_passed(self.now())
    }

    /// Busy-wait for at least `millis` milliseconds.
    fn delay_ms(&self, millis: u32) {
        let deadline = self.deadline(millis);
        while !self.has_expired(deadline) {
            core::hint::spin_loop();
        }
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> Ticks {
        (**self).now()
    }

    fn delay_ms(&self, millis: u32) {
        (**self).delay_ms(millis)
    }
}

/// Free-running hardware counter with 1 us resolution, used to time tachometer pulses.
pub trait PulseCounter {
    /// Current counter value in microseconds, wrapping at [`u32::MAX`]
    fn micros(&self) -> u32;
}
