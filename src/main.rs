//! Battery powered LiPo pack tester: plug a 1S-6S pack into the divider and read the cell
//! count and charge off the display.

#![no_std]
#![no_main]
#![warn(rust_2018_idioms)]
#![warn(clippy::all)]

/// How long each page of a reading stays up
const PAGE_MS: u32 = 750;
/// How long the boot pages stay up
const BOOT_PAGE_MS: u32 = 1_000;

use panic_semihosting as _; // Panic handler

use lipo_tester_rs::{
    battery::BatteryAnalyzer,
    config::BoardConfig,
    display::{battery_pages, boot_pages, error_pages, show_pages},
    ht16k33,
    logger::{DebugLevel, DebugLogger},
    voltage::{raw_to_volts, VoltageReader},
};

use core::sync::atomic;
use cortex_m::peripheral::NVIC;
use feather_m0 as hal;
use hal::adc::Adc;
use hal::clock::{enable_internal_32kosc, ClockGenId, ClockSource, GenericClockController};
use hal::entry;
use hal::pac::{adc, interrupt, CorePeripherals, Peripherals, TC4};
use hal::prelude::*;

#[cfg(feature = "usbserial")]
fn log_sink() -> lipo_tester_rs::usbserial::UsbSerialWriter {
    lipo_tester_rs::usbserial::UsbSerialWriter
}

#[cfg(not(feature = "usbserial"))]
fn log_sink() -> lipo_tester_rs::logger::Discard {
    lipo_tester_rs::logger::Discard
}

/// boolean indicating if our timer interrupt has fired
#[allow(unused)]
static INTERRUPT_FIRED: atomic::AtomicBool = atomic::AtomicBool::new(false);

/// Main function, controlling all of our logic
#[entry]
fn main() -> ! {
    let board = BoardConfig::FEATHER_M0;
    let analyzer = BatteryAnalyzer::lipo();

    #[allow(unused_mut)] // Only used when usbserial is enabled
    let mut core = CorePeripherals::take().unwrap();
    let mut peripherals = Peripherals::take().unwrap();
    let mut pins = hal::Pins::new(peripherals.PORT);

    // just 8 MHz for lower power consumption
    #[cfg(not(feature = "usbserial"))]
    let mut clocks = GenericClockController::with_internal_8mhz(
        peripherals.GCLK,
        &mut peripherals.PM,
        &mut peripherals.SYSCTRL,
        &mut peripherals.NVMCTRL,
    );

    // 48 MHz needed for USB
    #[cfg(feature = "usbserial")]
    let mut clocks = GenericClockController::with_external_32kosc(
        peripherals.GCLK,
        &mut peripherals.PM,
        &mut peripherals.SYSCTRL,
        &mut peripherals.NVMCTRL,
    );

    #[cfg(feature = "usbserial")]
    lipo_tester_rs::usbserial::init(
        &mut peripherals.PM,
        peripherals.USB,
        &mut core.NVIC,
        &mut clocks,
        pins.usb_dm,
        pins.usb_dp,
        &mut pins.port,
    );

    let mut logger = DebugLogger::new(log_sink(), DebugLevel::default());
    let _ = logger.begin();
    let _ = logger.log("Starting LiPo Battery Tester...");

    let mut i2c = hal::i2c_master(
        &mut clocks,
        400.khz(),
        peripherals.SERCOM3,
        &mut peripherals.PM,
        pins.sda,
        pins.scl,
        &mut pins.port,
    );

    let mut red_led = pins.d13.into_open_drain_output(&mut pins.port);
    red_led.set_high().ok();

    #[cfg(feature = "sleeping-delay")]
    let mut runner_delay = {
        use hal::sleeping_delay::SleepingDelay;
        use hal::timer;

        // Get a clock & make a sleeping delay object. use internal 32k clock that runs
        // in standby
        enable_internal_32kosc(&mut peripherals.SYSCTRL);
        let timer_clock = clocks
            .configure_gclk_divider_and_source(ClockGenId::GCLK1, 1, ClockSource::OSC32K, false)
            .unwrap();
        clocks.configure_standby(ClockGenId::GCLK1, true);
        let tc45 = &clocks.tc4_tc5(&timer_clock).unwrap();
        let timer = timer::TimerCounter::tc4_(tc45, peripherals.TC4, &mut peripherals.PM);
        core.SCB.set_sleepdeep();

        unsafe {
            // enable interrupts
            core.NVIC.set_priority(interrupt::TC4, 2);
            NVIC::unmask(interrupt::TC4);
        }

        SleepingDelay::new(timer, &INTERRUPT_FIRED)
    };

    #[cfg(not(feature = "sleeping-delay"))]
    let mut runner_delay = {
        use hal::delay::Delay;

        Delay::new(core.SYST, &mut clocks)
    };

    // VDDA / 2 with digital gain 1/2 gives a ~3.3V reference. Averaging is done in
    // VoltageReader so the ADC runs single shot.
    let mut adc = Adc::adc(peripherals.ADC, &mut peripherals.PM, &mut clocks);
    adc.gain(adc::inputctrl::GAIN_A::DIV2);
    adc.reference(adc::refctrl::REFSEL_A::INTVCC1);
    adc.samples(adc::avgctrl::SAMPLENUM_A::_1);
    let divider_in = pins.a1.into_function_b(&mut pins.port);
    let mut reader: VoltageReader<hal::pac::ADC, _> =
        VoltageReader::new(divider_in, board.adc, board.divider);
    let _ = logger.log("Voltage reader initialized");

    // wait here until the display is plugged in and communicating
    let mut display = loop {
        match ht16k33::HT16K33::init(board.display_addr, &mut i2c) {
            Ok(disp) => break disp,
            _ => {
                let _ = logger.log("ERROR: Display initialization failed!");
                runner_delay.delay_ms(1_000_u32);
            }
        };
    };
    let _ = logger.log("Display initialized");

    let boot = boot_pages();
    if show_pages(&boot, BOOT_PAGE_MS, &mut i2c, &mut display, &mut runner_delay)
        .is_err()
    {
        error(&mut red_led, &mut runner_delay);
    }
    red_led.set_low().ok();
    let _ = logger.log("System ready!\r\n");

    loop {
        let raw = match reader.read_raw(&mut adc, &mut runner_delay, board.adc.samples) {
            Ok(raw) => raw,
            Err(_) => {
                let _ = logger.log("ERROR: ADC read failed");
                let pages = error_pages("ADC");
                if show_pages(&pages, PAGE_MS, &mut i2c, &mut display, &mut runner_delay)
                    .is_err()
                {
                    error(&mut red_led, &mut runner_delay);
                }
                continue;
            }
        };
        let adc_voltage = raw_to_volts(raw, reader.adc_config());
        let _ = logger.log_raw_adc(raw, adc_voltage);

        let battery_voltage = reader.battery_voltage(adc_voltage);
        let analysis = analyzer.analyze(battery_voltage);
        let _ = logger.log_calculated(battery_voltage, &analysis);

        let pages = battery_pages(&analysis);
        if show_pages(&pages, PAGE_MS, &mut i2c, &mut display, &mut runner_delay).is_err()
        {
            error(&mut red_led, &mut runner_delay);
        }
        let _ = logger.log_display(&analysis);

        runner_delay.delay_ms(board.measurement_period_ms);
    }
}

/// Blinks an SOS pattern indicating an error
///
/// # Parameters
/// * `red_led`: The LED pin to blink
/// * `delay`: The `Delay` instance to wait
fn error<PIN, T>(red_led: &mut PIN, delay: &mut T)
where
    PIN: embedded_hal::digital::v2::OutputPin,
    T: embedded_hal::blocking::delay::DelayMs<u32>,
{
    const SHORT_BLIP_MS: u32 = 250;
    const LONG_BLIP_MS: u32 = 500;
    const SOS: [u32; 9] = [
        SHORT_BLIP_MS,
        SHORT_BLIP_MS,
        SHORT_BLIP_MS,
        LONG_BLIP_MS,
        LONG_BLIP_MS,
        LONG_BLIP_MS,
        SHORT_BLIP_MS,
        SHORT_BLIP_MS,
        SHORT_BLIP_MS,
    ];

    for blip_ms in SOS.iter() {
        red_led.set_high().ok();
        delay.delay_ms(*blip_ms);
        red_led.set_low().ok();
        delay.delay_ms(*blip_ms);
    }

    delay.delay_ms(2 * LONG_BLIP_MS);
}

/// The sleeping timer interrupt that wakes us up
#[interrupt]
fn TC4() {
    // Let the sleepingtimer know that the interrupt fired, and clear it
    INTERRUPT_FIRED.store(true, atomic::Ordering::Relaxed);
    unsafe {
        TC4::ptr()
            .as_ref()
            .unwrap()
            .count16()
            .intflag
            .modify(|_, w| w.ovf().set_bit());
    }
}
