//! PC/SC transport for contactless readers
//!
//! [`PcscDeviceManager`] lists readers and opens a [`PcscTransport`] on one of
//! them. The transport is a [`farecard_apdu_core::Transceiver`] and can also
//! block, with a timeout, until a card arrives or leaves, which is all a
//! polling loop needs.
//!
//! Contactless readers describe the card in the field through a synthetic ATR;
//! [`classify_atr`] turns that into a [`CardKind`].
//!
//! ```no_run
//! use std::time::Duration;
//! use farecard_apdu_transport_pcsc::{PcscConfig, PcscDeviceManager, classify_atr};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = PcscDeviceManager::new()?;
//! let readers = manager.list_readers()?;
//! let reader = &readers[0];
//! let mut transport = manager.open_reader(reader.name(), PcscConfig::default())?;
//!
//! if transport.wait_for_card(Duration::from_secs(5))? {
//!     transport.connect()?;
//!     println!("{} {}", classify_atr(&transport.atr()?), hex::encode(transport.uid()?));
//! }
//! # Ok(())
//! # }
//! ```
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod atr;
mod config;
mod error;
mod manager;
mod reader;
mod transport;

pub use atr::{CardKind, classify_atr, historical_bytes};
pub use config::{PcscConfig, ShareMode};
pub use error::PcscError;
pub use manager::PcscDeviceManager;
pub use reader::PcscReader;
pub use transport::PcscTransport;

// Re-export some pcsc types for convenience
pub use pcsc::{Protocol, Protocols};
