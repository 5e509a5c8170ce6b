//! PN533-family NFC controllers over raw USB
//!
//! Covers the NXP PN533, SCM SCL3711 and Sony RC-S956 without going through
//! PC/SC. The layers are:
//!
//! - [`frame`]: the normal, extended and ACK frame codec
//! - [`BulkIo`]: a byte pipe to the chip, implemented over `nusb` by [`UsbBulk`]
//! - [`Pn533`]: typed chip commands, target activation and device setup
//! - [`Pn533Transceiver`]: an ISO-DEP [`farecard_apdu_core::Transceiver`] over
//!   InDataExchange
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod bulk;
mod config;
mod device;
mod error;
pub mod frame;
mod target;
mod transceiver;
mod usb;

pub use bulk::BulkIo;
#[cfg(any(test, feature = "mock"))]
pub use bulk::mock::MockBulk;
pub use config::Pn533Config;
pub use device::{BaudRate, FirmwareVersion, Pn533};
pub use error::{Pn533Error, Result};
pub use target::{FelicaTarget, Target, TypeATarget};
pub use transceiver::Pn533Transceiver;
pub use usb::{KNOWN_DEVICES, UsbBulk, UsbDeviceInfo};
