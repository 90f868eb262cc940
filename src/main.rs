//! RP2040 firmware: regulates a fan from a potentiometer and shows its speed on an LED bar.
#![no_std]
#![no_main]
#![doc(html_playground_url = "https://play.rust-lang.org/")]
#![warn(missing_docs)]

use core::{cell::RefCell, convert::Infallible};

use cortex_m::{peripheral::syst::SystClkSource, singleton};
use cortex_m_rt::exception;
use critical_section::Mutex;
use defmt::{debug, info};
#[allow(unused_imports)]
use defmt_rtt as _;
use fan_regulator::{
    button::Button,
    clock::PulseCounter,
    components::{FanDrive, LedBar, SpeedCommand},
    config::Settings,
    control::Controller,
    display::Display,
    error::{self, Fault},
    interrupt::{self, SharedSetpoint, TickClock},
    speed::SpeedSensor,
    storage::Eeprom24,
};
#[allow(unused_imports)]
use panic_probe as _;
use rp2040_hal::{
    adc::{AdcFifo, AdcPin},
    clocks::init_clocks_and_plls,
    entry,
    fugit::RateExtU32,
    gpio::{
        bank0::{Gpio11, Gpio12, Gpio13, Gpio16, Gpio17},
        DynPinId, FunctionI2C, FunctionSio, Pin, Pins, PullDown, PullUp, SioInput, SioOutput,
    },
    pac::{self, interrupt},
    pwm::{Channel, FreeRunning, Pwm5, Pwm7, Slice, Slices, A},
    Adc, Clock, Sio, Timer, Watchdog, I2C,
};

/// Second-stage bootloader, from [rp2040-boot2](https://docs.rs/rp2040-boot2)
#[link_section = ".boot2"]
#[used]
pub static BOOT2: [u8; 256] = rp2040_boot2::BOOT_LOADER_W25Q080;
/// External high-speed crystal on the pico board is 12Mhz
pub const XOSC_FREQ_HZ: u32 = 12_000_000;
/// Fan PWM carrier, as recommended for 4-pin fans
pub const FAN_PWM_FREQ_HZ: u32 = 25_000;
/// SysTick rate backing [`TickClock`]
pub const TICK_FREQ_HZ: u32 = 1_000;
/// ADC clock divider: 48 MHz / (47 999 + 1) = one potentiometer conversion per millisecond
pub const ADC_CLOCK_DIVIDER: u16 = 47_999;

/// Bar LEDs on GPIO2..=GPIO9
type BarPin = Pin<DynPinId, FunctionSio<SioOutput>, PullDown>;
/// Dimmable power LED on GPIO10
type PowerPwm = Channel<Slice<Pwm5, FreeRunning>, A>;
/// Red alert LED
type AlertPin = Pin<Gpio11, FunctionSio<SioOutput>, PullDown>;
/// Mode button, active low
type ButtonPin = Pin<Gpio12, FunctionSio<SioInput>, PullUp>;
/// Open-collector tachometer output of the fan
type TachPin = Pin<Gpio13, FunctionSio<SioInput>, PullUp>;
/// Fan speed control on GPIO14
type FanPwm = Channel<Slice<Pwm7, FreeRunning>, A>;
/// Bus to the settings EEPROM
type EepromBus = I2C<pac::I2C0, (Pin<Gpio16, FunctionI2C, PullUp>, Pin<Gpio17, FunctionI2C, PullUp>)>;
/// All board indicators
type Leds = LedBar<BarPin, PowerPwm, AlertPin>;

/// Fan drive, commanded by the conversion interrupt once the potentiometer is live
static FAN: Mutex<RefCell<Option<FanDrive<FanPwm>>>> = Mutex::new(RefCell::new(None));
/// Free-running potentiometer conversions
static ADC_FIFO: Mutex<RefCell<Option<AdcFifo<'static, u8>>>> = Mutex::new(RefCell::new(None));

/// Microsecond counter for tachometer timing
struct HalTimer(Timer);

impl PulseCounter for HalTimer {
    fn micros(&self) -> u32 {
        self.0.get_counter_low()
    }
}

/// Foreground access to [`FAN`]
struct SharedFan;

impl SpeedCommand for SharedFan {
    fn set_speed(&mut self, speed: u8) -> Result<(), Fault> {
        critical_section::with(|cs| match FAN.borrow_ref_mut(cs).as_mut() {
            Some(fan) => fan.set_speed(speed),
            None => Err(Fault::FanDrive),
        })
    }
}

/// Peripherals handed from bring-up to [`run`]
struct Board {
    /// Mode button
    button: ButtonPin,
    /// Tachometer input
    tach: TachPin,
    /// Pulse timing
    timer: HalTimer,
    /// Persistent settings
    eeprom: Eeprom24<EepromBus, TickClock>,
    /// Potentiometer conversions, paused
    adc_fifo: AdcFifo<'static, u8>,
}

/// Main operation loop
#[entry]
fn main() -> ! {
    info!("Fan regulator startup");
    let mut pac = pac::Peripherals::take().unwrap();
    let core = pac::CorePeripherals::take().unwrap();
    let mut watchdog = Watchdog::new(pac.WATCHDOG);
    let sio = Sio::new(pac.SIO);

    let clocks = init_clocks_and_plls(
        XOSC_FREQ_HZ,
        pac.XOSC,
        pac.CLOCKS,
        pac.PLL_SYS,
        pac.PLL_USB,
        &mut pac.RESETS,
        &mut watchdog,
    )
    .ok()
    .unwrap();
    let sys_freq = clocks.system_clock.freq().to_Hz();
    let pins = Pins::new(
        pac.IO_BANK0,
        pac.PADS_BANK0,
        sio.gpio_bank0,
        &mut pac.RESETS,
    );

    // 1 ms tick for every deadline
    let mut syst = core.SYST;
    syst.set_clock_source(SystClkSource::Core);
    syst.set_reload(sys_freq / TICK_FREQ_HZ - 1);
    syst.clear_current();
    syst.enable_counter();
    syst.enable_interrupt();

    // Indicators
    let mut pwm_slices = Slices::new(pac.PWM, &mut pac.RESETS);
    pwm_slices.pwm5.enable();
    let mut power = pwm_slices.pwm5.channel_a;
    power.output_to(pins.gpio10);
    let bar = [
        pins.gpio2.into_push_pull_output().into_dyn_pin(),
        pins.gpio3.into_push_pull_output().into_dyn_pin(),
        pins.gpio4.into_push_pull_output().into_dyn_pin(),
        pins.gpio5.into_push_pull_output().into_dyn_pin(),
        pins.gpio6.into_push_pull_output().into_dyn_pin(),
        pins.gpio7.into_push_pull_output().into_dyn_pin(),
        pins.gpio8.into_push_pull_output().into_dyn_pin(),
        pins.gpio9.into_push_pull_output().into_dyn_pin(),
    ];
    let mut display = Display::new(LedBar::new(bar, power, pins.gpio11.into_push_pull_output()));
    display.power_on();

    // Fan PWM, e.g. 125 MHz / 25 kHz -> 5000 clk cycles per PWM cycle (`top`)
    pwm_slices
        .pwm7
        .set_top((sys_freq / FAN_PWM_FREQ_HZ - 1) as u16);
    pwm_slices.pwm7.enable();
    let mut fan_pwm = pwm_slices.pwm7.channel_a;
    fan_pwm.output_to(pins.gpio14);
    match FanDrive::new(fan_pwm) {
        Ok(fan) => critical_section::with(|cs| {
            FAN.replace(cs, Some(fan));
        }),
        Err(fault) => halt(&mut display, fault),
    }

    // Settings EEPROM
    let i2c = I2C::i2c0(
        pac.I2C0,
        pins.gpio16.reconfigure(),
        pins.gpio17.reconfigure(),
        400.kHz(),
        &mut pac.RESETS,
        &clocks.system_clock,
    );

    // Potentiometer conversions, started once the fan is calibrated
    let adc = singleton!(: Adc = Adc::new(pac.ADC, &mut pac.RESETS)).unwrap();
    let mut pot_pin = AdcPin::new(pins.gpio26.into_floating_input()).unwrap();
    let adc_fifo = adc
        .build_fifo()
        .set_channel(&mut pot_pin)
        .clock_divider(ADC_CLOCK_DIVIDER, 0)
        .shift_8bit()
        .enable_interrupt(1)
        .start_paused();

    let board = Board {
        button: pins.gpio12.into_pull_up_input(),
        tach: pins.gpio13.into_pull_up_input(),
        timer: HalTimer(Timer::new(pac.TIMER, &mut pac.RESETS, &clocks)),
        eeprom: Eeprom24::new(i2c, TickClock),
        adc_fifo,
    };
    debug!("Peripherals initialized");

    match run(&mut display, board) {
        Ok(never) => match never {},
        Err(fault) => halt(&mut display, fault),
    }
}

/// Calibrate if needed, start potentiometer control and run the display state machine.
fn run(display: &mut Display<Leds>, board: Board) -> Result<Infallible, Fault> {
    let clock = TickClock;
    let mut button = Button::new(board.button, clock);
    let mut settings = Settings::new(board.eeprom);
    let mut speed = SpeedSensor::new(board.tach, board.timer)?;

    let calibration = match settings.load_calibration()? {
        Some(record) if !button.is_pressed() => record,
        saved => {
            if saved.is_some() {
                info!("Calibration requested with the button");
            }
            speed.calibrate(&mut SharedFan, display, &clock, &mut settings)?
        }
    };
    info!(
        "Calibration: {} ticks at minimum speed, {} at maximum",
        calibration.min_pulse_time, calibration.max_pulse_time
    );
    speed.set_calibration(calibration)?;

    critical_section::with(|cs| {
        interrupt::init_setpoint(cs)?;
        ADC_FIFO.replace(cs, Some(board.adc_fifo));
        Ok::<_, Fault>(())
    })?;
    // SAFETY: the handler only touches state installed above, inside critical sections
    unsafe { pac::NVIC::unmask(pac::Interrupt::ADC_IRQ_FIFO) }
    critical_section::with(|cs| {
        if let Some(fifo) = ADC_FIFO.borrow_ref_mut(cs).as_mut() {
            fifo.resume();
        }
    });

    let mode = settings.load_display_mode()?;
    let mut controller = Controller::new(button, settings, clock, mode);
    controller.start(display)?;
    loop {
        if let Some(fault) = interrupt::take_fault() {
            return Err(fault);
        }
        let real_speed = speed.normalized_speed()?;
        controller.step(real_speed, display, &SharedSetpoint)?;
    }
}

/// Stop the fan and blink until power cycled.
fn halt(display: &mut Display<Leds>, fault: Fault) -> ! {
    pac::NVIC::mask(pac::Interrupt::ADC_IRQ_FIFO);
    critical_section::with(|cs| {
        if let Some(fan) = FAN.borrow_ref_mut(cs).as_mut() {
            fan.disable();
        }
    });
    error::report(fault);
    display.blink_forever(&TickClock)
}

/// Millisecond tick
#[exception]
fn SysTick() {
    interrupt::on_tick();
}

/// Potentiometer conversion(s) complete: update the setpoint and command the fan.
#[interrupt]
fn ADC_IRQ_FIFO() {
    critical_section::with(|cs| {
        let mut fifo = ADC_FIFO.borrow_ref_mut(cs);
        let mut fan = FAN.borrow_ref_mut(cs);
        if let (Some(fifo), Some(fan)) = (fifo.as_mut(), fan.as_mut()) {
            while fifo.len() > 0 {
                let sample = fifo.read();
                interrupt::on_conversion(cs, sample, fan);
            }
        }
    });
}
