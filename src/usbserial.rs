//! USB CDC serial port used as the debug log sink.
//!
//! The device lives in a global so the USB interrupt can poll it; everything else goes
//! through [`UsbSerialWriter`].

extern crate feather_m0 as hal;

use core::cell::RefCell;

use cortex_m::interrupt::{self as cs, Mutex};
use cortex_m::peripheral::NVIC;
use hal::clock::GenericClockController;
use hal::gpio::{Floating, Input, Port};
use hal::pac::{interrupt, PM, USB};
use hal::usb::UsbBus;
use usb_device::bus::UsbBusAllocator;
use usb_device::prelude::*;
use usbd_serial::{SerialPort, USB_CLASS_CDC};

struct UsbSerial {
    usb_bus: UsbDevice<'static, UsbBus>,
    usb_serial: SerialPort<'static, UsbBus>,
}

static USB_SERIAL: Mutex<RefCell<Option<UsbSerial>>> = Mutex::new(RefCell::new(None));

/// Brings up the USB device and unmasks its interrupt. Later calls do nothing.
///
/// # Arguments
///  * pm_perph: The power management peripheral
///  * usb_perph: The USB peripheral
///  * nvic: For the USB interrupt priority
///  * clocks: The clocks instance for USB peripheral clocking
///  * dm: The d- GPIO pad
///  * dp: The d+ GPIO pad
///  * port: the GPIO port
pub fn init(
    pm_perph: &mut PM,
    usb_perph: USB,
    nvic: &mut NVIC,
    clocks: &mut GenericClockController,
    dm: hal::gpio::Pa24<Input<Floating>>,
    dp: hal::gpio::Pa25<Input<Floating>>,
    port: &mut Port,
) {
    let bus_allocator: &'static UsbBusAllocator<UsbBus> = match cortex_m::singleton!(
        : UsbBusAllocator<UsbBus> = hal::usb_allocator(usb_perph, clocks, pm_perph, dm, dp, port)
    ) {
        Some(allocator) => allocator,
        None => return,
    };

    let serial = UsbSerial {
        usb_serial: SerialPort::new(bus_allocator),
        usb_bus: UsbDeviceBuilder::new(bus_allocator, UsbVidPid(0x16c0, 0x27dd))
            .manufacturer("Holmes Engineering")
            .product("LiPo tester")
            .serial_number("LIPO")
            .device_class(USB_CLASS_CDC)
            .build(),
    };
    cs::free(|cs| USB_SERIAL.borrow(cs).replace(Some(serial)));

    unsafe {
        nvic.set_priority(interrupt::USB, 1);
        NVIC::unmask(interrupt::USB);
    }
}

/// Log sink writing to the serial port. Output is dropped while no host is listening.
pub struct UsbSerialWriter;

impl ufmt::uWrite for UsbSerialWriter {
    type Error = core::convert::Infallible;

    fn write_str(&mut self, message: &str) -> Result<(), Self::Error> {
        cs::free(|cs| {
            if let Some(serial) = USB_SERIAL.borrow(cs).borrow_mut().as_mut() {
                // a full endpoint buffer just loses the line
                let _ = serial.usb_serial.write(message.as_bytes());
            }
        });
        Ok(())
    }
}

/// Services the USB peripheral, echoing back whatever the host sent
fn poll_usb(read_buffer: &mut [u8]) -> usize {
    cs::free(|cs| {
        let mut cell = USB_SERIAL.borrow(cs).borrow_mut();
        let serial = match cell.as_mut() {
            Some(serial) => serial,
            None => return 0,
        };
        serial.usb_bus.poll(&mut [&mut serial.usb_serial]);

        match serial.usb_serial.read(read_buffer) {
            Ok(bytes_read) => {
                let _ = serial.usb_serial.write(&read_buffer[..bytes_read]);
                bytes_read
            }
            Err(_) => 0,
        }
    })
}

#[interrupt]
fn USB() {
    let mut read_buf: [u8; 64] = [0u8; 64];
    poll_usb(&mut read_buf);
}
