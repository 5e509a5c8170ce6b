//! MIFARE Classic key material
//!
//! Keys come from a [`KeyProvider`]. The bundled [`KeyFile`] reads a JSON
//! document of the form:
//!
//! ```json
//! {
//!   "cards": {
//!     "04a1b2c3": [{ "key_a": "a0a1a2a3a4a5", "key_b": "b0b1b2b3b4b5" }]
//!   },
//!   "global": ["d3f7d3f7d3f7"]
//! }
//! ```
//!
//! Card entries are indexed by sector; tag ids are matched case-insensitively.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// A 6-byte Crypto-1 key
pub type ClassicKey = [u8; 6];

/// Well-known keys
pub mod well_known {
    use super::ClassicKey;

    /// Transport key
    pub const DEFAULT: ClassicKey = [0xFF; 6];
    /// All-zero key, used by some sector 0 preambles
    pub const ZERO: ClassicKey = [0x00; 6];
    /// MIFARE Application Directory key A
    pub const MAD: ClassicKey = [0xA0, 0xA1, 0xA2, 0xA3, 0xA4, 0xA5];
    /// NFC Forum NDEF key A
    pub const NFC_FORUM: ClassicKey = [0xD3, 0xF7, 0xD3, 0xF7, 0xD3, 0xF7];
}

/// Which key slot of a sector trailer to authenticate against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display)]
pub enum KeyType {
    /// Key A
    #[display("A")]
    A,
    /// Key B
    #[display("B")]
    B,
}

impl KeyType {
    /// Authentication command code (60 for key A, 61 for key B)
    pub const fn auth_code(self) -> u8 {
        match self {
            Self::A => 0x60,
            Self::B => 0x61,
        }
    }
}

/// Key pair for one sector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassicSectorKey {
    /// Key A
    #[serde(with = "hex::serde")]
    pub key_a: ClassicKey,
    /// Key B
    #[serde(with = "hex::serde")]
    pub key_b: ClassicKey,
}

/// Per-sector keys for one card
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CardKeys {
    sectors: Vec<ClassicSectorKey>,
}

impl CardKeys {
    /// Keys indexed by sector
    pub const fn new(sectors: Vec<ClassicSectorKey>) -> Self {
        Self { sectors }
    }

    /// The same key pair for every sector
    pub fn uniform(sector_count: usize, key: ClassicSectorKey) -> Self {
        Self::new(vec![key; sector_count])
    }

    /// Parse a Proxmark3 binary key dump
    ///
    /// The dump holds every sector's key A followed by every sector's key B.
    pub fn from_proxmark3(dump: &[u8]) -> Result<Self, KeyFileError> {
        if dump.is_empty() || dump.len() % 12 != 0 {
            return Err(KeyFileError::InvalidDump(dump.len()));
        }

        let (a, b) = dump.split_at(dump.len() / 2);
        let sectors = a
            .chunks_exact(6)
            .zip(b.chunks_exact(6))
            .map(|(key_a, key_b)| {
                let mut pair = ClassicSectorKey {
                    key_a: [0; 6],
                    key_b: [0; 6],
                };
                pair.key_a.copy_from_slice(key_a);
                pair.key_b.copy_from_slice(key_b);
                pair
            })
            .collect();
        Ok(Self::new(sectors))
    }

    /// Keys for one sector
    pub fn key_for_sector(&self, sector: usize) -> Option<&ClassicSectorKey> {
        self.sectors.get(sector)
    }

    /// All sector keys, in sector order
    pub fn keys(&self) -> &[ClassicSectorKey] {
        &self.sectors
    }
}

/// Source of key material for sector-authenticated cards
///
/// Returning `None` means "only try the default and well-known keys".
pub trait KeyProvider: Send + Sync + fmt::Debug {
    /// Keys recorded for a specific card, looked up by lowercase hex tag id
    fn keys_for_tag(&self, tag_id_hex: &str) -> Option<CardKeys>;

    /// Keys tried on every card after the card's own keys
    fn global_keys(&self) -> Option<Vec<ClassicKey>>;
}

/// Errors loading key material
#[derive(Debug, thiserror::Error)]
pub enum KeyFileError {
    /// Reading the file failed
    #[error("Failed to read key file: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not valid key JSON
    #[error("Invalid key file: {0}")]
    Json(#[from] serde_json::Error),

    /// A binary dump has the wrong size
    #[error("Invalid key dump length: {0} bytes")]
    InvalidDump(usize),
}

/// JSON key file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyFile {
    /// Per-card keys by hex tag id
    #[serde(default)]
    pub cards: BTreeMap<String, CardKeys>,
    /// Keys tried on every card
    #[serde(default, with = "hex_keys")]
    pub global: Vec<ClassicKey>,
}

impl KeyFile {
    /// Parse key JSON
    pub fn from_json(json: &str) -> Result<Self, KeyFileError> {
        let mut file: Self = serde_json::from_str(json)?;
        file.cards = std::mem::take(&mut file.cards)
            .into_iter()
            .map(|(tag, keys)| (tag.to_ascii_lowercase(), keys))
            .collect();
        Ok(file)
    }

    /// Load key JSON from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self, KeyFileError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}

impl KeyProvider for KeyFile {
    fn keys_for_tag(&self, tag_id_hex: &str) -> Option<CardKeys> {
        self.cards.get(&tag_id_hex.to_ascii_lowercase()).cloned()
    }

    fn global_keys(&self) -> Option<Vec<ClassicKey>> {
        if self.global.is_empty() {
            None
        } else {
            Some(self.global.clone())
        }
    }
}

mod hex_keys {
    use hex::FromHex;
    use serde::{Deserialize, Deserializer, Serializer, de::Error as _};

    use super::ClassicKey;

    pub(super) fn serialize<S: Serializer>(
        keys: &[ClassicKey],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(keys.iter().map(hex::encode))
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<ClassicKey>, D::Error> {
        Vec::<String>::deserialize(deserializer)?
            .iter()
            .map(|s| ClassicKey::from_hex(s).map_err(D::Error::custom))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn test_key_file_lookup() {
        let file = KeyFile::from_json(
            r#"{
                "cards": {
                    "04A1B2C3": [
                        { "key_a": "a0a1a2a3a4a5", "key_b": "b0b1b2b3b4b5" },
                        { "key_a": "ffffffffffff", "key_b": "ffffffffffff" }
                    ]
                },
                "global": ["d3f7d3f7d3f7"]
            }"#,
        )
        .unwrap();

        let keys = file.keys_for_tag("04a1b2c3").unwrap();
        assert_eq!(keys.keys().len(), 2);
        assert_eq!(keys.key_for_sector(0).unwrap().key_a, well_known::MAD);
        assert_eq!(keys.key_for_sector(0).unwrap().key_b, hex!("b0b1b2b3b4b5"));
        assert!(keys.key_for_sector(2).is_none());

        assert!(file.keys_for_tag("deadbeef").is_none());
        assert_eq!(file.global_keys(), Some(vec![well_known::NFC_FORUM]));
    }

    #[test]
    fn test_empty_key_file() {
        let file = KeyFile::from_json("{}").unwrap();
        assert_eq!(file.global_keys(), None);
        assert!(KeyFile::from_json(r#"{"global": ["abc"]}"#).is_err());
    }

    #[test]
    fn test_from_proxmark3() {
        let mut dump = Vec::new();
        dump.extend_from_slice(&well_known::ZERO);
        dump.extend_from_slice(&well_known::DEFAULT);
        dump.extend_from_slice(&hex!("112233445566"));
        dump.extend_from_slice(&hex!("aabbccddeeff"));

        let keys = CardKeys::from_proxmark3(&dump).unwrap();
        assert_eq!(keys.keys().len(), 2);
        assert_eq!(keys.key_for_sector(0).unwrap().key_a, well_known::ZERO);
        assert_eq!(keys.key_for_sector(0).unwrap().key_b, hex!("112233445566"));
        assert_eq!(keys.key_for_sector(1).unwrap().key_b, hex!("aabbccddeeff"));

        assert!(matches!(
            CardKeys::from_proxmark3(&[0; 7]),
            Err(KeyFileError::InvalidDump(7))
        ));
    }
}
