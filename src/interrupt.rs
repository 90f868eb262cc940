// SPDX-License-Identifier: Apache-2.0

//! State shared with interrupt handlers, plus the handler bodies that do not touch hardware.
//!
//! Every static is a [`Mutex`] and is only reached through the functions here, which take the
//! critical section themselves or require the caller to hold one.

use core::cell::{Cell, RefCell};

use critical_section::{CriticalSection, Mutex};

use crate::{
    clock::{Clock, Ticks},
    components::SpeedCommand,
    error::Fault,
    setpoint::{SetpointControl, SetpointSensor},
};

/// Milliseconds since boot, incremented by [`on_tick`]
pub static TICKS: Mutex<Cell<u32>> = Mutex::new(Cell::new(0));

/// Setpoint filter and override, fed by the conversion interrupt
pub static SETPOINT: Mutex<RefCell<Option<SetpointSensor>>> = Mutex::new(RefCell::new(None));

/// First fault raised in interrupt context, waiting for the main loop
pub static PENDING_FAULT: Mutex<Cell<Option<Fault>>> = Mutex::new(Cell::new(None));

/// Tick interrupt body: advance the millisecond counter.
pub fn on_tick() {
    critical_section::with(|cs| {
        let ticks = TICKS.borrow(cs);
        ticks.set(ticks.get().wrapping_add(1));
    });
}

/// Install a fresh setpoint sensor. Conversions recorded before this are dropped.
pub fn init_setpoint(cs: CriticalSection) -> Result<(), Fault> {
    SETPOINT.replace(cs, Some(SetpointSensor::new()?));
    Ok(())
}

/// Feed one conversion to the setpoint sensor and return the speed to command, or [`None`] if no
/// sensor is installed.
pub fn record_conversion(cs: CriticalSection, sample: u8) -> Option<u8> {
    SETPOINT
        .borrow_ref_mut(cs)
        .as_mut()
        .map(|sensor| sensor.record(sample))
}

/// Conversion interrupt body: record the sample and command the fan in one critical section.
///
/// A failing fan command is latched with [`raise`].
pub fn on_conversion<F: SpeedCommand>(cs: CriticalSection, sample: u8, fan: &mut F) {
    if let Some(speed) = record_conversion(cs, sample) {
        if let Err(fault) = fan.set_speed(speed) {
            raise(cs, fault);
        }
    }
}

/// Latch a fault for [`take_fault`]. Only the first one is kept.
pub fn raise(cs: CriticalSection, fault: Fault) {
    let pending = PENDING_FAULT.borrow(cs);
    if pending.get().is_none() {
        pending.set(Some(fault));
    }
}

/// Collect the fault latched by an interrupt, if any.
pub fn take_fault() -> Option<Fault> {
    critical_section::with(|cs| PENDING_FAULT.borrow(cs).take())
}

/// [`Clock`] backed by [`TICKS`]
#[derive(Default, Debug, Copy, Clone)]
pub struct TickClock;

impl Clock for TickClock {
    fn now(&self) -> Ticks {
        critical_section::with(|cs| Ticks::from_millis(TICKS.borrow(cs).get()))
    }
}

/// [`SetpointControl`] backed by [`SETPOINT`]. Reads 0 until [`init_setpoint`] has run.
#[derive(Default, Debug, Copy, Clone)]
pub struct SharedSetpoint;

impl SetpointControl for SharedSetpoint {
    fn current(&self) -> u8 {
        critical_section::with(|cs| {
            SETPOINT
                .borrow_ref(cs)
                .as_ref()
                .map_or(0, SetpointSensor::current)
        })
    }

    fn set_override(&self, value: u8) {
        critical_section::with(|cs| {
            if let Some(sensor) = SETPOINT.borrow_ref_mut(cs).as_mut() {
                sensor.set_override(value);
            }
        });
    }

    fn clear_override(&self) {
        critical_section::with(|cs| {
            if let Some(sensor) = SETPOINT.borrow_ref_mut(cs).as_mut() {
                sensor.clear_override();
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::SimFan;

    /// Fan drive whose PWM peripheral has failed
    struct BrokenFan;

    impl SpeedCommand for BrokenFan {
        fn set_speed(&mut self, _speed: u8) -> Result<(), Fault> {
            Err(Fault::FanDrive)
        }
    }

    #[test]
    fn tick_clock_follows_tick_interrupt() {
        let clock = TickClock;
        let start = clock.now();
        for _ in 0..5 {
            on_tick();
        }
        assert_eq!(clock.now().wrapping_elapsed_since(start), 5);
    }

    // SETPOINT and PENDING_FAULT are process-wide, so everything touching them is one test
    #[test]
    fn conversions_drive_fan_and_latch_faults() {
        let setpoint = SharedSetpoint;
        let mut fan = SimFan::new();
        critical_section::with(|cs| {
            assert_eq!(record_conversion(cs, 10), None);
            init_setpoint(cs).unwrap();
            for _ in 0..3 {
                on_conversion(cs, 120, &mut fan);
            }
        });
        assert_eq!(setpoint.current(), 120);

        setpoint.set_override(255);
        critical_section::with(|cs| on_conversion(cs, 130, &mut fan));
        assert_eq!(setpoint.current(), 120);
        setpoint.clear_override();
        critical_section::with(|cs| on_conversion(cs, 130, &mut fan));
        assert_eq!(fan.speeds(), [0, 0, 120, 255, 120]);

        assert_eq!(take_fault(), None);
        critical_section::with(|cs| {
            on_conversion(cs, 140, &mut BrokenFan);
            raise(cs, Fault::Stall);
        });
        assert_eq!(take_fault(), Some(Fault::FanDrive));
        assert_eq!(take_fault(), None);
    }
}
