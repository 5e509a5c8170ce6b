//! Card data model and card-family readers
//!
//! A read produces a [`RawCard`]: an immutable capture of exactly what came off
//! the card, serializable for later offline decoding. [`RawCard::parse`] turns
//! it into a [`ParsedCard`] and never fails, even for partial captures.
//!
//! Readers for each card family live in their own module and talk to the card
//! through the technology traits in [`technology`], so the same reader works
//! behind any hardware backend:
//!
//! - [`classic`]: MIFARE Classic sector reads with key search
//! - [`ultralight`]: MIFARE Ultralight / NTAG page reads with model detection
//! - [`felica`]: FeliCa systems, services and blocks
//! - [`desfire`]: MIFARE DESFire native commands
//! - [`cepas`]: CEPAS purses and transaction history
//! - [`iso7816`]: ISO 7816 application discovery and the ISO-DEP dispatcher
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![forbid(unsafe_code)]
#![warn(missing_docs, rustdoc::missing_crate_level_docs)]

pub mod cepas;
pub mod classic;
pub mod desfire;
pub mod felica;
pub mod iso7816;
pub mod keys;
pub mod parsed;
pub mod technology;
pub mod ultralight;

mod error;
mod raw;
mod serde_hex;

pub use error::{ReadError, Result};
pub use keys::{CardKeys, ClassicKey, ClassicSectorKey, KeyFile, KeyProvider, KeyType};
pub use parsed::ParsedCard;
pub use raw::{CardType, RawCard, RawPayload};

/// Prelude module containing commonly used traits and types
pub mod prelude {
    pub use crate::technology::{ClassicTechnology, FelicaChannel, UltralightTechnology};
    pub use crate::{CardType, KeyProvider, ParsedCard, RawCard, RawPayload, ReadError};
}
