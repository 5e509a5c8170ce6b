//! MIFARE DESFire reader
//!
//! Locked directories are worked around rather than reported: a locked
//! application list yields no applications, a locked file list is replaced by
//! a scan of file ids 0 to 31, and locked file settings are replaced by trying
//! each read command in turn.

pub mod protocol;

use bytes::Bytes;
use farecard_apdu_core::Transceiver;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::Result;
use crate::raw::{RawCard, RawPayload};

pub use protocol::{DesfireError, DesfireProtocol};

/// File ids probed when the file list is locked
const SCANNED_FILE_IDS: u8 = 0x20;

/// Standard data file
pub const STANDARD_DATA_FILE: u8 = 0x00;
/// Backup data file
pub const BACKUP_DATA_FILE: u8 = 0x01;
/// Value file
pub const VALUE_FILE: u8 = 0x02;
/// Linear record file
pub const LINEAR_RECORD_FILE: u8 = 0x03;
/// Cyclic record file
pub const CYCLIC_RECORD_FILE: u8 = 0x04;

/// Decoded file settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FileSettings {
    /// Standard or backup data file
    Standard {
        /// Raw file type
        file_type: u8,
        /// Communication settings
        comm_setting: u8,
        /// Access rights
        access_rights: u16,
        /// File size in bytes
        size: u32,
    },
    /// Value file
    Value {
        /// Communication settings
        comm_setting: u8,
        /// Access rights
        access_rights: u16,
        /// Lowest allowed value
        lower_limit: i32,
        /// Highest allowed value
        upper_limit: i32,
        /// Limited credit value
        limited_credit_value: i32,
        /// Limited credit is enabled
        limited_credit_enabled: bool,
    },
    /// Linear or cyclic record file
    Record {
        /// Raw file type
        file_type: u8,
        /// Communication settings
        comm_setting: u8,
        /// Access rights
        access_rights: u16,
        /// Size of one record
        record_size: u32,
        /// Capacity in records
        max_records: u32,
        /// Records written so far
        current_records: u32,
    },
}

fn u24_le(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], 0])
}

fn i32_le(bytes: &[u8]) -> i32 {
    i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

impl FileSettings {
    /// Decode a GetFileSettings answer
    pub fn parse(data: &[u8]) -> Option<Self> {
        let (&file_type, rest) = data.split_first()?;
        let (&comm_setting, rest) = rest.split_first()?;
        let access_rights = u16::from_le_bytes([*rest.first()?, *rest.get(1)?]);
        let body = &rest[2..];

        match file_type {
            STANDARD_DATA_FILE | BACKUP_DATA_FILE if body.len() >= 3 => Some(Self::Standard {
                file_type,
                comm_setting,
                access_rights,
                size: u24_le(body),
            }),
            VALUE_FILE if body.len() >= 13 => Some(Self::Value {
                comm_setting,
                access_rights,
                lower_limit: i32_le(&body[0..4]),
                upper_limit: i32_le(&body[4..8]),
                limited_credit_value: i32_le(&body[8..12]),
                limited_credit_enabled: body[12] != 0,
            }),
            LINEAR_RECORD_FILE | CYCLIC_RECORD_FILE if body.len() >= 9 => Some(Self::Record {
                file_type,
                comm_setting,
                access_rights,
                record_size: u24_le(&body[0..3]),
                max_records: u24_le(&body[3..6]),
                current_records: u24_le(&body[6..9]),
            }),
            _ => None,
        }
    }
}

/// What was read from one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DesfireFileContent {
    /// File contents
    Data {
        /// Raw contents
        #[serde(with = "crate::serde_hex")]
        data: Bytes,
    },
    /// The card wants authentication
    Unauthorized {
        /// Card's reason
        reason: String,
    },
    /// The read failed
    Invalid {
        /// What went wrong
        reason: String,
    },
}

/// One file of an application
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesfireFile {
    /// File id
    pub id: u8,
    /// Raw settings, absent when they were locked
    #[serde(default, with = "crate::serde_hex::option")]
    pub settings: Option<Bytes>,
    /// Contents
    pub content: DesfireFileContent,
}

/// One application
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesfireApplication {
    /// 24-bit application id
    pub id: u32,
    /// Files in id order
    pub files: Vec<DesfireFile>,
    /// File ids came from a scan rather than the card's list
    #[serde(default)]
    pub dir_list_locked: bool,
}

/// Captured DESFire card
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesfireCapture {
    /// GetVersion answer
    #[serde(with = "crate::serde_hex")]
    pub manufacturing_data: Bytes,
    /// Readable applications
    pub applications: Vec<DesfireApplication>,
    /// The application list was locked
    #[serde(default)]
    pub app_list_locked: bool,
}

impl DesfireCapture {
    /// Check if anything on the card stayed locked
    pub fn is_partially_unauthorized(&self) -> bool {
        self.app_list_locked
            || self.applications.iter().any(|app| {
                app.files
                    .iter()
                    .any(|f| matches!(f.content, DesfireFileContent::Unauthorized { .. }))
            })
    }
}

fn file_failure(error: DesfireError) -> protocol::Result<DesfireFileContent> {
    match error {
        DesfireError::Transport(_) => Err(error),
        e if e.is_unauthorized() => Ok(DesfireFileContent::Unauthorized {
            reason: e.to_string(),
        }),
        e => Ok(DesfireFileContent::Invalid {
            reason: e.to_string(),
        }),
    }
}

fn read_with_settings<T: Transceiver>(
    desfire: &mut DesfireProtocol<T>,
    file_id: u8,
    settings: &[u8],
) -> protocol::Result<DesfireFileContent> {
    let file_type = settings.first().copied().unwrap_or(0xFF);
    let data = match file_type {
        STANDARD_DATA_FILE | BACKUP_DATA_FILE => desfire.read_data(file_id),
        VALUE_FILE => desfire.get_value(file_id),
        LINEAR_RECORD_FILE | CYCLIC_RECORD_FILE => desfire.read_record(file_id),
        other => Err(DesfireError::UnknownFileType(other)),
    };
    match data {
        Ok(data) => Ok(DesfireFileContent::Data { data }),
        Err(e) => file_failure(e),
    }
}

fn read_without_settings<T: Transceiver>(
    desfire: &mut DesfireProtocol<T>,
    file_id: u8,
) -> protocol::Result<DesfireFileContent> {
    let attempts: [fn(&mut DesfireProtocol<T>, u8) -> protocol::Result<Bytes>; 3] = [
        DesfireProtocol::read_data,
        DesfireProtocol::get_value,
        DesfireProtocol::read_record,
    ];

    let mut last = DesfireError::InvalidResponse;
    for attempt in attempts {
        match attempt(desfire, file_id) {
            Ok(data) => return Ok(DesfireFileContent::Data { data }),
            Err(e @ DesfireError::Transport(_)) => return Err(e),
            Err(e) => last = e,
        }
    }
    file_failure(last)
}

fn read_files<T: Transceiver>(
    desfire: &mut DesfireProtocol<T>,
) -> protocol::Result<(Vec<DesfireFile>, bool)> {
    let (file_ids, locked) = match desfire.file_ids() {
        Ok(ids) => (ids, false),
        Err(e) if e.is_unauthorized() => {
            debug!("File list locked, scanning file ids");
            ((0..SCANNED_FILE_IDS).collect(), true)
        }
        Err(e) => return Err(e),
    };

    let mut files = Vec::with_capacity(file_ids.len());
    for id in file_ids {
        let file = match desfire.file_settings(id) {
            Ok(settings) => {
                let content = read_with_settings(desfire, id, &settings)?;
                DesfireFile {
                    id,
                    settings: Some(settings),
                    content,
                }
            }
            Err(e) if e.is_not_found() => continue,
            Err(e) if e.is_unauthorized() => DesfireFile {
                id,
                settings: None,
                content: read_without_settings(desfire, id)?,
            },
            Err(e) => return Err(e),
        };
        files.push(file);
    }
    Ok((files, locked))
}

/// Read all applications and files of a DESFire card
///
/// Fails when the card does not answer GetVersion like a DESFire.
#[instrument(skip_all, fields(tag_id = %hex::encode(&tag_id)))]
pub fn read_card<T: Transceiver>(
    tag_id: Bytes,
    transceiver: T,
    progress: &mut dyn FnMut(usize, usize),
) -> Result<RawCard> {
    let mut desfire = DesfireProtocol::new(transceiver);
    let manufacturing_data = desfire.manufacturing_data()?;

    let (app_ids, app_list_locked) = match desfire.application_ids() {
        Ok(ids) => (ids, false),
        Err(e) if e.is_unauthorized() => {
            warn!("Application list locked");
            (Vec::new(), true)
        }
        Err(e) => return Err(e.into()),
    };

    let mut applications = Vec::with_capacity(app_ids.len());
    for (index, &id) in app_ids.iter().enumerate() {
        progress(index, app_ids.len());
        match desfire.select_application(id) {
            Ok(()) => {}
            Err(e) if e.is_not_found() => continue,
            Err(e) => return Err(e.into()),
        }

        let (files, dir_list_locked) = read_files(&mut desfire)?;
        debug!(app = format_args!("{id:06x}"), files = files.len(), "Application read");
        applications.push(DesfireApplication {
            id,
            files,
            dir_list_locked,
        });
    }

    Ok(RawCard::new(
        tag_id,
        RawPayload::Desfire(DesfireCapture {
            manufacturing_data,
            applications,
            app_list_locked,
        }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use farecard_apdu_core::MockTransceiver;
    use hex_literal::hex;

    #[test]
    fn test_parse_settings() {
        assert_eq!(
            FileSettings::parse(&hex!("00 00 1000 200000")),
            Some(FileSettings::Standard {
                file_type: 0,
                comm_setting: 0,
                access_rights: 0x0010,
                size: 0x20,
            })
        );
        assert_eq!(
            FileSettings::parse(&hex!("04 03 eeee 100000 0a0000 050000")),
            Some(FileSettings::Record {
                file_type: 4,
                comm_setting: 3,
                access_rights: 0xEEEE,
                record_size: 16,
                max_records: 10,
                current_records: 5,
            })
        );
        assert_eq!(
            FileSettings::parse(&hex!("02 00 0000 9cffffff e8030000 00000000 01")),
            Some(FileSettings::Value {
                comm_setting: 0,
                access_rights: 0,
                lower_limit: -100,
                upper_limit: 1000,
                limited_credit_value: 0,
                limited_credit_enabled: true,
            })
        );
        assert_eq!(FileSettings::parse(&hex!("00 00 10")), None);
        assert_eq!(FileSettings::parse(&hex!("07 00 0000 000000")), None);
    }

    /// One application 0x010203 with a readable data file 1 and locked settings on file 2
    fn card(command: &[u8]) -> Vec<u8> {
        let mut response = match command {
            [0x90, 0x60, ..] => vec![0x04; 28],
            [0x90, 0x6A, ..] => hex!("010203 ffffff").to_vec(),
            [0x90, 0x5A, 0, 0, 3, 0x01, 0x02, 0x03, 0] => Vec::new(),
            [0x90, 0x5A, ..] => return hex!("91a0").to_vec(),
            [0x90, 0x6F, ..] => vec![1, 2],
            [0x90, 0xF5, 0, 0, 1, 1, 0] => hex!("00 00 0000 040000").to_vec(),
            [0x90, 0xF5, ..] => return hex!("919d").to_vec(),
            [0x90, 0xBD, 0, 0, 7, 1, ..] => vec![0xAA; 4],
            [0x90, 0xBB, 0, 0, 7, 2, ..] => vec![0xBB; 16],
            _ => return hex!("919d").to_vec(),
        };
        response.extend_from_slice(&hex!("9100"));
        response
    }

    #[test]
    fn test_read_card() {
        let mut mock = MockTransceiver::with_handler(|command| Ok(card(command).into()));
        let raw = read_card(Bytes::from_static(&[4, 1, 2, 3, 4, 5, 6]), &mut mock, &mut |_, _| {})
            .unwrap();
        let RawPayload::Desfire(capture) = &raw.payload else {
            panic!("unexpected payload {:?}", raw.payload);
        };

        assert!(!capture.app_list_locked);
        assert_eq!(capture.applications.len(), 1);
        let app = &capture.applications[0];
        assert_eq!(app.id, 0x010203);
        assert_eq!(app.files.len(), 2);

        assert_eq!(
            app.files[0].content,
            DesfireFileContent::Data {
                data: Bytes::from_static(&[0xAA; 4])
            }
        );
        assert!(app.files[1].settings.is_none());
        assert_eq!(
            app.files[1].content,
            DesfireFileContent::Data {
                data: Bytes::from_static(&[0xBB; 16])
            }
        );
        assert!(!capture.is_partially_unauthorized());
    }

    #[test]
    fn test_not_desfire() {
        let mut mock = MockTransceiver::new([hex!("6d00").to_vec()]);
        let err = read_card(Bytes::new(), &mut mock, &mut |_, _| {}).unwrap_err();
        assert!(matches!(
            err,
            crate::ReadError::Desfire(DesfireError::InvalidResponse)
        ));
    }
}
