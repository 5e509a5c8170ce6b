//! ISO 7816 application and file captures

use std::collections::BTreeMap;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// One elementary file
///
/// A file is only ever built when it has content; see [`File::new`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct File {
    /// READ BINARY result
    #[serde(default, with = "crate::serde_hex::option")]
    pub binary: Option<Bytes>,
    /// Records by 1-based record number
    #[serde(default, with = "crate::serde_hex::map")]
    pub records: BTreeMap<u8, Bytes>,
    /// FCI returned when the file was selected
    #[serde(default, with = "crate::serde_hex::option")]
    pub fci: Option<Bytes>,
}

impl File {
    /// Build a file, or `None` if neither records nor binary data were read
    ///
    /// Zero-length binary data counts as no data.
    pub fn new(binary: Option<Bytes>, records: BTreeMap<u8, Bytes>, fci: Option<Bytes>) -> Option<Self> {
        let binary = binary.filter(|b| !b.is_empty());
        if binary.is_none() && records.is_empty() {
            return None;
        }
        Some(Self {
            binary,
            records,
            fci,
        })
    }

    /// A synthetic file holding one proprietary answer
    pub fn from_binary(data: Bytes) -> Self {
        Self {
            binary: Some(data),
            ..Self::default()
        }
    }
}

/// One selected application
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    /// AID that answered SELECT
    #[serde(with = "crate::serde_hex")]
    pub aid: Bytes,
    /// FCI returned by SELECT
    #[serde(with = "crate::serde_hex")]
    pub fci: Bytes,
    /// Files by selector key, plus `balance/<n>` and reader-chosen keys
    #[serde(default)]
    pub files: BTreeMap<String, File>,
    /// Files by short file identifier
    #[serde(default)]
    pub sfi_files: BTreeMap<u8, File>,
    /// Application family, for example `china` or `ksx6924`
    #[serde(rename = "type")]
    pub type_tag: String,
}

impl Application {
    /// Look up a file by selector key
    pub fn file(&self, key: &str) -> Option<&File> {
        self.files.get(key)
    }

    /// Look up a file by SFI
    pub fn sfi_file(&self, sfi: u8) -> Option<&File> {
        self.sfi_files.get(&sfi)
    }
}

/// Captured ISO 7816 card
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Iso7816Capture {
    /// Applications that answered, in configuration order
    pub applications: Vec<Application>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_files_are_dropped() {
        assert!(File::new(None, BTreeMap::new(), Some(Bytes::from_static(b"\x6f\x00"))).is_none());
        assert!(File::new(Some(Bytes::new()), BTreeMap::new(), None).is_none());

        let file = File::new(Some(Bytes::from_static(b"\x01")), BTreeMap::new(), None).unwrap();
        assert_eq!(file.binary.as_deref(), Some(&b"\x01"[..]));
    }

    #[test]
    fn test_serialized_shape() {
        let mut records = BTreeMap::new();
        records.insert(1, Bytes::from_static(&[0xAB, 0xCD]));
        let app = Application {
            aid: Bytes::from_static(&[0xA0, 0x00]),
            fci: Bytes::from_static(&[0x6F, 0x00]),
            files: BTreeMap::new(),
            sfi_files: BTreeMap::from([(3, File::new(None, records, None).unwrap())]),
            type_tag: "china".into(),
        };

        let json = serde_json::to_value(&app).unwrap();
        assert_eq!(json["aid"], "a000");
        assert_eq!(json["type"], "china");
        assert_eq!(json["sfi_files"]["3"]["records"]["1"], "abcd");

        let back: Application = serde_json::from_str(&json.to_string()).unwrap();
        assert_eq!(back, app);
    }
}
