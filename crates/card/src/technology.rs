//! Hardware-facing seams for the card-family readers
//!
//! Each backend (PC/SC, PN533, ...) implements the traits for the families it
//! can talk to. Readers only ever see these traits.

use bytes::Bytes;
use farecard_apdu_core::Result;

use crate::keys::{ClassicKey, KeyType};
use crate::ultralight::UltralightModel;

/// Sector-level access to a MIFARE Classic card
pub trait ClassicTechnology {
    /// Number of sectors on the card
    fn sector_count(&self) -> usize;

    /// Authenticate a sector, returning `false` if the key was rejected
    fn authenticate(&mut self, sector: usize, key: &ClassicKey, key_type: KeyType) -> Result<bool>;

    /// Read one 16-byte block
    ///
    /// A one-byte answer means the card NAKed the read.
    fn read_block(&mut self, block: usize) -> Result<Bytes>;

    /// First block of a sector
    fn sector_to_block(&self, sector: usize) -> usize {
        if sector < 32 {
            sector * 4
        } else {
            128 + (sector - 32) * 16
        }
    }

    /// Blocks in a sector
    fn blocks_in_sector(&self, sector: usize) -> usize {
        if sector < 32 { 4 } else { 16 }
    }
}

/// Raw NFC-A frame access to a MIFARE Ultralight family card
pub trait UltralightTechnology {
    /// Send a native command (for example `30 <page>`) and return the answer
    fn transceive(&mut self, command: &[u8]) -> Result<Bytes>;

    /// Re-activate the card after a command it did not understand
    fn reconnect(&mut self) -> Result<()>;

    /// A model already known from the activation data, skipping detection
    fn model_hint(&self) -> Option<UltralightModel> {
        None
    }
}

/// FeliCa command channel
///
/// Frames are `LEN CMD [IDm] DATA` without the preamble or CRC. The answer is
/// returned the same way, starting at its length byte.
pub trait FelicaChannel {
    /// Exchange one FeliCa frame
    fn transceive(&mut self, frame: &[u8]) -> Result<Bytes>;

    /// IDm reported at activation
    fn idm(&self) -> Bytes;

    /// PMm reported at activation, when the backend knows it
    fn pmm(&self) -> Option<Bytes> {
        None
    }
}
