//! CEPAS (Singapore e-purse) reader and record layouts

use bytes::{Bytes, BytesMut};
use chrono::{DateTime, TimeDelta, Utc};
use farecard_apdu_core::command::CLASS_90;
use farecard_apdu_core::utils::extract_status_and_payload;
use farecard_apdu_core::{Command, StatusWord, Transceiver};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::raw::{RawCard, RawPayload};
use crate::{ReadError, Result};

/// Purse slots on a card
pub const PURSE_COUNT: u8 = 16;
/// History records returned by one READ PURSE RECORD
const RECORDS_PER_READ: u8 = 15;
/// Size of one history record
pub const RECORD_SIZE: usize = 16;

const INS_READ_PURSE: u8 = 0x32;
const SELECT_PURSE_DF: [u8; 7] = [0x00, 0xA4, 0x00, 0x00, 0x02, 0x40, 0x00];

/// Status returned when a purse needs authentication
const PERMISSION_DENIED: StatusWord = StatusWord::new(0x90, 0x9D);

/// Offset of the log record count in a purse
const LOG_COUNT_OFFSET: usize = 40;

/// Seconds from the Unix epoch to 1995-01-01 00:00 SGT
pub const CEPAS_EPOCH: i64 = 788_947_200 - 8 * 3600;

/// One purse or history read
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CepasRecord {
    /// Raw answer
    Data {
        /// Data as returned
        #[serde(with = "crate::serde_hex")]
        data: Bytes,
    },
    /// The card wants authentication first
    Unauthorized {
        /// Status word returned
        reason: String,
    },
    /// The slot did not answer
    Invalid {
        /// What went wrong
        reason: String,
    },
}

impl CepasRecord {
    /// Raw data, if the read worked
    pub const fn data(&self) -> Option<&Bytes> {
        match self {
            Self::Data { data } => Some(data),
            Self::Unauthorized { .. } | Self::Invalid { .. } => None,
        }
    }
}

/// A purse slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CepasPurse {
    /// Slot number
    pub id: u8,
    /// Purse contents
    #[serde(flatten)]
    pub record: CepasRecord,
}

/// Transaction log of a purse slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CepasHistory {
    /// Slot number
    pub id: u8,
    /// Concatenated 16-byte records
    #[serde(flatten)]
    pub record: CepasRecord,
}

/// Captured CEPAS card
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CepasCapture {
    /// All purse slots
    pub purses: Vec<CepasPurse>,
    /// Histories of the valid purses
    pub histories: Vec<CepasHistory>,
}

impl CepasCapture {
    /// Check if any purse or history refused with a permission error
    pub fn is_partially_unauthorized(&self) -> bool {
        let locked = |r: &CepasRecord| matches!(r, CepasRecord::Unauthorized { .. });
        self.purses.iter().any(|p| locked(&p.record))
            || self.histories.iter().any(|h| locked(&h.record))
    }
}

/// CEPAS purse commands
#[derive(Debug)]
pub struct CepasProtocol<T: Transceiver> {
    transceiver: T,
}

impl<T: Transceiver> CepasProtocol<T> {
    /// Wrap a transceiver
    pub const fn new(transceiver: T) -> Self {
        Self { transceiver }
    }

    /// Select DF 4000, which holds the purses
    pub fn select_purse_df(&mut self) -> Result<()> {
        self.transceiver.transceive(&SELECT_PURSE_DF)?;
        Ok(())
    }

    fn request(&mut self, apdu: &[u8]) -> Result<Bytes> {
        let response = self.transceiver.transceive(apdu)?;
        let (status, payload) = extract_status_and_payload(&response)?;
        if status != StatusWord::new(0x90, 0x00) {
            return Err(ReadError::Cepas(status));
        }
        Ok(response.slice_ref(payload))
    }

    /// Read a purse slot
    pub fn purse(&mut self, id: u8) -> Result<Bytes> {
        self.select_purse_df()?;
        self.request(&[CLASS_90, INS_READ_PURSE, id, 0x00, 0x01, 0x00])
    }

    /// Read up to `count` history records of a purse
    ///
    /// Records past the first 15 need a second command; its failure keeps
    /// the first 15. At most 30 records are read.
    pub fn history(&mut self, id: u8, count: u8) -> Result<Bytes> {
        let first = count.min(RECORDS_PER_READ);
        let mut history = BytesMut::from(self.read_records(id, 0, first)?.as_ref());

        if count > RECORDS_PER_READ {
            let rest = (count - RECORDS_PER_READ).min(RECORDS_PER_READ);
            match self.read_records(id, RECORDS_PER_READ, rest) {
                Ok(rest) => history.extend_from_slice(&rest),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => debug!(purse = id, error = %e, "Second history chunk failed"),
            }
        }
        Ok(history.freeze())
    }

    fn read_records(&mut self, id: u8, start: u8, count: u8) -> Result<Bytes> {
        let le = (count as usize * RECORD_SIZE) as u8;
        let command = Command::new(CLASS_90, INS_READ_PURSE, id, 0x00)
            .with_data(vec![start])
            .with_le(le);
        self.request(&command.to_bytes())
    }
}

fn invalid(error: &ReadError) -> CepasRecord {
    match error {
        ReadError::Cepas(PERMISSION_DENIED) => CepasRecord::Unauthorized {
            reason: error.to_string(),
        },
        _ => CepasRecord::Invalid {
            reason: error.to_string(),
        },
    }
}

/// Read every purse and the history of each valid one
///
/// Fails with [`ReadError::UnsupportedCard`] if no slot holds a purse.
#[instrument(skip_all, fields(tag_id = %hex::encode(&tag_id)))]
pub fn read_card<T: Transceiver>(
    tag_id: Bytes,
    transceiver: T,
    progress: &mut dyn FnMut(usize, usize),
) -> Result<RawCard> {
    let mut cepas = CepasProtocol::new(transceiver);
    let mut purses = Vec::with_capacity(PURSE_COUNT as usize);
    let mut histories = Vec::new();

    for id in 0..PURSE_COUNT {
        progress(id as usize, PURSE_COUNT as usize);
        let data = match cepas.purse(id) {
            Ok(data) => data,
            Err(e) if e.transport().is_some() => return Err(e),
            Err(e) => {
                purses.push(CepasPurse {
                    id,
                    record: invalid(&e),
                });
                continue;
            }
        };

        let count = data.get(LOG_COUNT_OFFSET).copied().unwrap_or(0);
        purses.push(CepasPurse {
            id,
            record: CepasRecord::Data { data },
        });
        if count == 0 {
            continue;
        }

        let record = match cepas.history(id, count) {
            Ok(data) => CepasRecord::Data { data },
            Err(e) if e.transport().is_some() => return Err(e),
            Err(e) => invalid(&e),
        };
        histories.push(CepasHistory { id, record });
    }

    if purses.iter().all(|p| p.record.data().is_none()) {
        return Err(ReadError::UnsupportedCard);
    }

    Ok(RawCard::new(
        tag_id,
        RawPayload::Cepas(CepasCapture { purses, histories }),
    ))
}

/// Sign-extend a 24-bit big-endian value
fn i24_be(bytes: &[u8]) -> i32 {
    i32::from_be_bytes([bytes[0], bytes[1], bytes[2], 0]) >> 8
}

fn cepas_time(seconds: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(CEPAS_EPOCH + seconds, 0)
}

fn cepas_date(bytes: &[u8]) -> Option<DateTime<Utc>> {
    let days = u16::from_be_bytes([bytes[0], bytes[1]]);
    cepas_time(TimeDelta::days(days.into()).num_seconds())
}

/// One history record
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CepasTransaction {
    /// Transaction type
    pub kind: u8,
    /// Signed amount in cents
    pub amount: i32,
    /// Time of the transaction
    pub date: Option<DateTime<Utc>>,
    /// Terminal-provided text
    pub user_data: String,
}

impl CepasTransaction {
    /// Decode one 16-byte record
    pub fn parse(record: &[u8]) -> Option<Self> {
        if record.len() < RECORD_SIZE {
            return None;
        }
        let seconds = u32::from_be_bytes([record[4], record[5], record[6], record[7]]);
        let user_data = String::from_utf8_lossy(&record[8..16])
            .trim_end_matches(['\0', ' '])
            .to_owned();
        Some(Self {
            kind: record[0],
            amount: i24_be(&record[1..4]),
            date: cepas_time(seconds.into()),
            user_data,
        })
    }
}

/// Decoded purse
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CepasPurseInfo {
    /// CEPAS version
    pub version: u8,
    /// Purse status byte
    pub status: u8,
    /// Balance in cents
    pub balance: i32,
    /// Auto-load amount in cents
    pub auto_load_amount: i32,
    /// Card application number, hex
    pub can: String,
    /// Card serial number, hex
    pub csn: String,
    /// Purse expiry date
    pub expiry: Option<DateTime<Utc>>,
    /// Purse creation date
    pub created: Option<DateTime<Utc>>,
    /// Records in the transaction log
    pub log_record_count: u8,
    /// Last transaction recorded in the purse
    pub last_transaction: Option<CepasTransaction>,
}

impl CepasPurseInfo {
    /// Decode a purse slot
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < 62 {
            return None;
        }
        Some(Self {
            version: data[0],
            status: data[1],
            balance: i24_be(&data[2..5]),
            auto_load_amount: i24_be(&data[5..8]),
            can: hex::encode(&data[8..16]),
            csn: hex::encode(&data[16..24]),
            expiry: cepas_date(&data[24..26]),
            created: cepas_date(&data[26..28]),
            log_record_count: data[LOG_COUNT_OFFSET],
            last_transaction: CepasTransaction::parse(&data[46..62]),
        })
    }
}
