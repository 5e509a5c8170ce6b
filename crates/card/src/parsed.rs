//! Decoded view of a [`RawCard`]
//!
//! Decoding is total. Regions that could not be read, or that do not decode,
//! come out as their own variants instead of errors.

use std::collections::BTreeMap;

use bytes::Bytes;
use farecard_tlv::TlvNode;
use serde::Serialize;

use crate::cepas::{CepasCapture, CepasPurseInfo, CepasTransaction, RECORD_SIZE};
use crate::classic::{ClassicCapture, ClassicSector};
use crate::desfire::{DesfireCapture, DesfireFile, DesfireFileContent, FileSettings};
use crate::felica::FelicaSystem;
use crate::iso7816::{Application, File, china, ksx6924};
use crate::raw::{RawCard, RawPayload};
use crate::ultralight::UltralightModel;

/// Decoded card
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum ParsedCard {
    /// MIFARE Classic
    Classic {
        /// UID, hex
        tag_id: String,
        /// Sectors in card order
        sectors: Vec<ParsedSector>,
        /// The card left before every sector was read
        partial_read: bool,
    },
    /// MIFARE Ultralight / NTAG
    Ultralight {
        /// UID, hex
        tag_id: String,
        /// Detected model
        model: UltralightModel,
        /// Pages, hex
        pages: Vec<String>,
    },
    /// MIFARE DESFire
    Desfire {
        /// UID, hex
        tag_id: String,
        /// GetVersion answer, hex
        manufacturing_data: String,
        /// Applications
        applications: Vec<ParsedDesfireApplication>,
    },
    /// FeliCa
    Felica {
        /// IDm, hex
        idm: String,
        /// PMm, hex
        pmm: String,
        /// Systems with their services and blocks
        systems: Vec<FelicaSystem>,
    },
    /// CEPAS
    Cepas {
        /// UID, hex
        tag_id: String,
        /// Purses that decoded
        purses: Vec<ParsedPurse>,
        /// Transaction logs
        histories: Vec<ParsedHistory>,
    },
    /// ISO 7816 applications
    Iso7816 {
        /// UID, hex
        tag_id: String,
        /// Applications in discovery order
        applications: Vec<ParsedApplication>,
    },
}

/// One Classic sector
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParsedSector {
    /// Blocks, hex
    Data {
        /// Sector number
        index: usize,
        /// Blocks, trailer included
        blocks: Vec<String>,
    },
    /// Locked
    Unauthorized {
        /// Sector number
        index: usize,
    },
    /// Unreadable
    Invalid {
        /// Sector number
        index: usize,
        /// What went wrong
        reason: String,
    },
}

/// One DESFire application
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedDesfireApplication {
    /// 24-bit application id, hex
    pub id: String,
    /// Files in id order
    pub files: Vec<ParsedDesfireFile>,
}

/// One DESFire file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedDesfireFile {
    /// File id
    pub id: u8,
    /// Decoded settings, if readable
    pub settings: Option<FileSettings>,
    /// Contents
    #[serde(flatten)]
    pub content: ParsedFileContent,
}

/// Contents of a DESFire file, by file type
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParsedFileContent {
    /// Standard or backup data file, also used when settings were locked
    Standard {
        /// Contents, hex
        data: String,
    },
    /// Linear or cyclic record file
    Record {
        /// Records, hex
        records: Vec<String>,
    },
    /// Value file
    Value {
        /// Current value
        value: i32,
    },
    /// Locked
    Unauthorized {
        /// Card's reason
        reason: String,
    },
    /// Unreadable or undecodable
    Invalid {
        /// What went wrong
        reason: String,
    },
}

/// One decoded CEPAS purse
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedPurse {
    /// Slot number
    pub id: u8,
    /// Decoded purse
    #[serde(flatten)]
    pub info: CepasPurseInfo,
}

/// One CEPAS transaction log
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedHistory {
    /// Slot number
    pub id: u8,
    /// Transactions, newest first
    pub transactions: Vec<CepasTransaction>,
}

/// One ISO 7816 application
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedApplication {
    /// AID, hex
    pub aid: String,
    /// Application family
    #[serde(rename = "type")]
    pub type_tag: String,
    /// Decoded FCI
    pub fci: Vec<TlvNode>,
    /// Contents of the A5 proprietary template
    pub proprietary: Vec<TlvNode>,
    /// Balances decoded by the application family
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub balances: BTreeMap<usize, i64>,
    /// Files by selector key
    pub files: BTreeMap<String, ParsedFile>,
    /// Files by SFI
    pub sfi_files: BTreeMap<u8, ParsedFile>,
}

/// One ISO 7816 file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedFile {
    /// Binary contents, hex
    #[serde(skip_serializing_if = "Option::is_none")]
    pub binary: Option<String>,
    /// Records by number, hex
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub records: BTreeMap<u8, String>,
    /// Decoded FCI from selection
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fci: Vec<TlvNode>,
}

fn hexes(items: &[Bytes]) -> Vec<String> {
    items.iter().map(hex::encode).collect()
}

fn parse_classic(tag_id: String, capture: &ClassicCapture) -> ParsedCard {
    let sectors = capture
        .sectors
        .iter()
        .map(|sector| match sector {
            ClassicSector::Data { index, blocks } => ParsedSector::Data {
                index: *index,
                blocks: hexes(blocks),
            },
            ClassicSector::Unauthorized { index } => ParsedSector::Unauthorized { index: *index },
            ClassicSector::Invalid { index, reason } => ParsedSector::Invalid {
                index: *index,
                reason: reason.clone(),
            },
        })
        .collect();
    ParsedCard::Classic {
        tag_id,
        sectors,
        partial_read: capture.partial_read,
    }
}

fn parse_desfire_file(file: &DesfireFile) -> ParsedDesfireFile {
    let settings = file.settings.as_deref().and_then(FileSettings::parse);
    let content = match (&file.content, settings) {
        (DesfireFileContent::Unauthorized { reason }, _) => ParsedFileContent::Unauthorized {
            reason: reason.clone(),
        },
        (DesfireFileContent::Invalid { reason }, _) => ParsedFileContent::Invalid {
            reason: reason.clone(),
        },
        (DesfireFileContent::Data { data }, Some(FileSettings::Value { .. })) => {
            match data.get(..4) {
                Some(v) => ParsedFileContent::Value {
                    value: i32::from_le_bytes([v[0], v[1], v[2], v[3]]),
                },
                None => ParsedFileContent::Invalid {
                    reason: format!("value file holds {} bytes", data.len()),
                },
            }
        }
        (DesfireFileContent::Data { data }, Some(FileSettings::Record { record_size, .. }))
            if record_size > 0 =>
        {
            ParsedFileContent::Record {
                records: data.chunks(record_size as usize).map(hex::encode).collect(),
            }
        }
        (DesfireFileContent::Data { data }, _) => ParsedFileContent::Standard {
            data: hex::encode(data),
        },
    };
    ParsedDesfireFile {
        id: file.id,
        settings,
        content,
    }
}

fn parse_desfire(tag_id: String, capture: &DesfireCapture) -> ParsedCard {
    let applications = capture
        .applications
        .iter()
        .map(|app| ParsedDesfireApplication {
            id: format!("{:06x}", app.id),
            files: app.files.iter().map(parse_desfire_file).collect(),
        })
        .collect();
    ParsedCard::Desfire {
        tag_id,
        manufacturing_data: hex::encode(&capture.manufacturing_data),
        applications,
    }
}

fn parse_cepas(tag_id: String, capture: &CepasCapture) -> ParsedCard {
    let purses = capture
        .purses
        .iter()
        .filter_map(|purse| {
            let info = CepasPurseInfo::parse(purse.record.data()?)?;
            Some(ParsedPurse { id: purse.id, info })
        })
        .collect();
    let histories = capture
        .histories
        .iter()
        .filter_map(|history| {
            let data = history.record.data()?;
            Some(ParsedHistory {
                id: history.id,
                transactions: data
                    .chunks(RECORD_SIZE)
                    .filter_map(CepasTransaction::parse)
                    .collect(),
            })
        })
        .collect();
    ParsedCard::Cepas {
        tag_id,
        purses,
        histories,
    }
}

fn parse_file(file: &File) -> ParsedFile {
    ParsedFile {
        binary: file.binary.as_ref().map(hex::encode),
        records: file
            .records
            .iter()
            .map(|(number, record)| (*number, hex::encode(record)))
            .collect(),
        fci: file.fci.as_deref().map(farecard_tlv::tree).unwrap_or_default(),
    }
}

fn decode_balances(app: &Application) -> BTreeMap<usize, i64> {
    let decode: fn(&[u8]) -> Option<i64> = match app.type_tag.as_str() {
        china::TYPE => china::decode_balance,
        ksx6924::TYPE => |data: &[u8]| ksx6924::decode_balance(data).map(i64::from),
        _ => return BTreeMap::new(),
    };
    app.files
        .iter()
        .filter_map(|(key, file)| {
            let index = key.strip_prefix("balance/")?.parse().ok()?;
            Some((index, decode(file.binary.as_deref()?)?))
        })
        .collect()
}

/// Decode one discovered application
pub fn parse_application(app: &Application) -> ParsedApplication {
    let proprietary = farecard_tlv::find_hex(&app.fci, "a5", true)
        .map(farecard_tlv::tree)
        .unwrap_or_default();
    ParsedApplication {
        aid: hex::encode(&app.aid),
        type_tag: app.type_tag.clone(),
        fci: farecard_tlv::tree(&app.fci),
        proprietary,
        balances: decode_balances(app),
        files: app
            .files
            .iter()
            .map(|(key, file)| (key.clone(), parse_file(file)))
            .collect(),
        sfi_files: app
            .sfi_files
            .iter()
            .map(|(sfi, file)| (*sfi, parse_file(file)))
            .collect(),
    }
}

impl ParsedCard {
    pub(crate) fn from_raw(card: &RawCard) -> Self {
        let tag_id = hex::encode(&card.tag_id);
        match &card.payload {
            RawPayload::Classic(capture) => parse_classic(tag_id, capture),
            RawPayload::Ultralight(capture) => Self::Ultralight {
                tag_id,
                model: capture.model,
                pages: hexes(&capture.pages),
            },
            RawPayload::Desfire(capture) => parse_desfire(tag_id, capture),
            RawPayload::Felica(capture) => Self::Felica {
                idm: hex::encode(&capture.idm),
                pmm: hex::encode(&capture.pmm),
                systems: capture.systems.clone(),
            },
            RawPayload::Cepas(capture) => parse_cepas(tag_id, capture),
            RawPayload::Iso7816(capture) => Self::Iso7816 {
                tag_id,
                applications: capture.applications.iter().map(parse_application).collect(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cepas::{CepasHistory, CepasPurse, CepasRecord};
    use crate::desfire::DesfireApplication;
    use crate::iso7816::Iso7816Capture;
    use hex_literal::hex;

    fn bytes(data: &[u8]) -> Bytes {
        Bytes::copy_from_slice(data)
    }

    #[test]
    fn test_desfire_files_by_type() {
        let capture = DesfireCapture {
            manufacturing_data: bytes(&[0x04; 28]),
            applications: vec![DesfireApplication {
                id: 0x00_12_34,
                files: vec![
                    DesfireFile {
                        id: 1,
                        settings: Some(bytes(&hex!("02 00 0000 00000000 10270000 00000000 00"))),
                        content: DesfireFileContent::Data {
                            data: bytes(&hex!("e8030000")),
                        },
                    },
                    DesfireFile {
                        id: 2,
                        settings: Some(bytes(&hex!("04 00 0000 040000 030000 020000"))),
                        content: DesfireFileContent::Data {
                            data: bytes(&hex!("01010101 02020202")),
                        },
                    },
                    DesfireFile {
                        id: 3,
                        settings: None,
                        content: DesfireFileContent::Unauthorized {
                            reason: "Permission denied".into(),
                        },
                    },
                    DesfireFile {
                        id: 4,
                        settings: None,
                        content: DesfireFileContent::Data { data: bytes(&[0xAA]) },
                    },
                ],
                dir_list_locked: false,
            }],
            app_list_locked: false,
        };
        let card = RawCard::new(bytes(&[1, 2, 3, 4, 5, 6, 7]), RawPayload::Desfire(capture));

        let ParsedCard::Desfire { applications, .. } = card.parse() else {
            panic!("expected DESFire");
        };
        let files = &applications[0].files;
        assert_eq!(applications[0].id, "001234");
        assert_eq!(files[0].content, ParsedFileContent::Value { value: 1000 });
        assert_eq!(
            files[1].content,
            ParsedFileContent::Record {
                records: vec!["01010101".into(), "02020202".into()]
            }
        );
        assert!(matches!(files[2].content, ParsedFileContent::Unauthorized { .. }));
        assert_eq!(
            files[3].content,
            ParsedFileContent::Standard { data: "aa".into() }
        );
    }

    #[test]
    fn test_cepas_skips_broken_purses() {
        let mut purse = vec![0u8; 62];
        purse[2..5].copy_from_slice(&hex!("0003e8"));
        let capture = CepasCapture {
            purses: vec![
                CepasPurse {
                    id: 3,
                    record: CepasRecord::Data { data: bytes(&purse) },
                },
                CepasPurse {
                    id: 4,
                    record: CepasRecord::Data { data: bytes(&[0; 10]) },
                },
                CepasPurse {
                    id: 5,
                    record: CepasRecord::Unauthorized {
                        reason: "90 9D".into(),
                    },
                },
            ],
            histories: vec![CepasHistory {
                id: 3,
                record: CepasRecord::Data {
                    data: bytes(&[0x30; 40]),
                },
            }],
        };
        let card = RawCard::new(bytes(&[1, 2, 3, 4]), RawPayload::Cepas(capture));

        let ParsedCard::Cepas { purses, histories, .. } = card.parse() else {
            panic!("expected CEPAS");
        };
        assert_eq!(purses.len(), 1);
        assert_eq!(purses[0].info.balance, 1000);
        // 40 bytes hold two whole records
        assert_eq!(histories[0].transactions.len(), 2);
    }

    #[test]
    fn test_iso7816_fci_and_balances() {
        let mut files = BTreeMap::new();
        files.insert("balance/0".to_owned(), File::from_binary(bytes(&hex!("000003e8"))));
        files.insert(
            "15".to_owned(),
            File::new(Some(bytes(&[0x11; 8])), BTreeMap::new(), Some(bytes(&hex!("6f03 800108"))))
                .unwrap(),
        );
        let app = Application {
            aid: bytes(&hex!("d4100000030001")),
            fci: bytes(&hex!("6f0f 8407d4100000030001 a504 500254 4d")),
            files,
            sfi_files: BTreeMap::new(),
            type_tag: ksx6924::TYPE.into(),
        };
        let card = RawCard::new(
            bytes(&[1, 2, 3, 4]),
            RawPayload::Iso7816(Iso7816Capture { applications: vec![app] }),
        );

        let ParsedCard::Iso7816 { applications, .. } = card.parse() else {
            panic!("expected ISO 7816");
        };
        let app = &applications[0];
        assert_eq!(app.fci.len(), 2);
        assert_eq!(app.proprietary.len(), 1);
        assert_eq!(app.proprietary[0].value, b"TM");
        assert_eq!(app.balances[&0], 1000);
        assert_eq!(app.files["15"].binary.as_deref(), Some("1111111111111111"));
        assert_eq!(app.files["15"].fci[0].tag, hex!("80"));
    }

    #[test]
    fn test_unreadable_classic_sectors_survive() {
        let card = RawCard::new(
            bytes(&[1, 2, 3, 4]),
            RawPayload::Classic(ClassicCapture {
                sectors: vec![
                    ClassicSector::Unauthorized { index: 0 },
                    ClassicSector::Invalid {
                        index: 1,
                        reason: "Card lost".into(),
                    },
                ],
                partial_read: true,
            }),
        );
        let ParsedCard::Classic {
            sectors,
            partial_read,
            ..
        } = card.parse()
        else {
            panic!("expected Classic");
        };
        assert!(partial_read);
        assert_eq!(sectors[0], ParsedSector::Unauthorized { index: 0 });
        assert!(matches!(&sectors[1], ParsedSector::Invalid { reason, .. } if reason == "Card lost"));
    }
}
