//! The abstracted components for the lipo-tester binary.

#![cfg_attr(not(test), no_std)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all)]

pub mod battery;
pub mod config;
pub mod display;
pub mod ht16k33;
pub mod logger;
#[cfg(all(target_arch = "arm", feature = "usbserial"))]
pub mod usbserial;
pub mod voltage;
