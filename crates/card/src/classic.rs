//! MIFARE Classic sector reader
//!
//! Every sector is authenticated with the first key that works, in this order:
//! the all-zero preamble key (sector 0 only), the transport key, the card's own
//! key pair for the sector, the card's other key pairs, then the global keys.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::keys::{CardKeys, ClassicKey, KeyType, well_known};
use crate::raw::{RawCard, RawPayload};
use crate::technology::ClassicTechnology;
use crate::Result;

/// Attempts at re-authenticating a sector when a block read is NAKed
const REAUTH_ATTEMPTS: usize = 3;

/// One sector as captured
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClassicSector {
    /// Sector read with a working key
    Data {
        /// Sector number
        index: usize,
        /// Blocks in sector order, trailer included
        #[serde(with = "crate::serde_hex::seq")]
        blocks: Vec<Bytes>,
    },
    /// No key authenticated the sector
    Unauthorized {
        /// Sector number
        index: usize,
    },
    /// The sector could not be read
    Invalid {
        /// Sector number
        index: usize,
        /// What went wrong
        reason: String,
    },
}

impl ClassicSector {
    /// Sector number
    pub const fn index(&self) -> usize {
        match self {
            Self::Data { index, .. } | Self::Unauthorized { index } | Self::Invalid { index, .. } => {
                *index
            }
        }
    }
}

/// Captured MIFARE Classic card
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassicCapture {
    /// Sectors in card order
    pub sectors: Vec<ClassicSector>,
    /// The card left the field before every sector was read
    #[serde(default)]
    pub partial_read: bool,
}

impl ClassicCapture {
    /// Check if any sector stayed locked
    pub fn is_partially_unauthorized(&self) -> bool {
        self.sectors
            .iter()
            .any(|s| matches!(s, ClassicSector::Unauthorized { .. }))
    }
}

/// Keys to try on one sector, in order
fn candidate_keys(
    sector: usize,
    card_keys: Option<&CardKeys>,
    global_keys: &[ClassicKey],
) -> Vec<(ClassicKey, KeyType)> {
    let mut candidates = Vec::new();
    if sector == 0 {
        candidates.push((well_known::ZERO, KeyType::A));
    }
    candidates.push((well_known::DEFAULT, KeyType::A));

    if let Some(card_keys) = card_keys {
        if let Some(own) = card_keys.key_for_sector(sector) {
            candidates.push((own.key_a, KeyType::A));
            candidates.push((own.key_b, KeyType::B));
        }
        for (index, pair) in card_keys.keys().iter().enumerate() {
            if index == sector {
                continue;
            }
            candidates.push((pair.key_a, KeyType::A));
            candidates.push((pair.key_b, KeyType::B));
        }
    }

    for key in global_keys {
        candidates.push((*key, KeyType::A));
        candidates.push((*key, KeyType::B));
    }
    candidates
}

fn authenticate<T: ClassicTechnology + ?Sized>(
    tech: &mut T,
    sector: usize,
    candidates: &[(ClassicKey, KeyType)],
) -> Result<Option<(ClassicKey, KeyType)>> {
    for &(key, key_type) in candidates {
        if tech.authenticate(sector, &key, key_type)? {
            debug!(sector, %key_type, "Sector authenticated");
            return Ok(Some((key, key_type)));
        }
    }
    Ok(None)
}

fn read_sector<T: ClassicTechnology + ?Sized>(
    tech: &mut T,
    sector: usize,
    key: &ClassicKey,
    key_type: KeyType,
) -> Result<Vec<Bytes>> {
    let first = tech.sector_to_block(sector);
    let mut blocks = Vec::with_capacity(tech.blocks_in_sector(sector));

    for block in first..first + tech.blocks_in_sector(sector) {
        let mut data = tech.read_block(block)?;
        // Some readers answer a lone NAK byte until the sector is re-authenticated
        for _ in 0..REAUTH_ATTEMPTS {
            if data.len() != 1 {
                break;
            }
            debug!(sector, block, nak = data[0], "Block read NAKed, re-authenticating");
            tech.authenticate(sector, key, key_type)?;
            data = tech.read_block(block)?;
        }
        blocks.push(data);
    }
    Ok(blocks)
}

/// Read every sector of a MIFARE Classic card
///
/// Locked sectors become [`ClassicSector::Unauthorized`] and failed sectors
/// [`ClassicSector::Invalid`]; neither aborts the read. Losing the card stops
/// the read and returns what was captured so far. Only fatal transport errors
/// are returned as errors.
#[instrument(skip_all, fields(tag_id = %hex::encode(&tag_id)))]
pub fn read_card<T: ClassicTechnology + ?Sized>(
    tag_id: Bytes,
    tech: &mut T,
    card_keys: Option<&CardKeys>,
    global_keys: &[ClassicKey],
    progress: &mut dyn FnMut(usize, usize),
) -> Result<RawCard> {
    let sector_count = tech.sector_count();
    let mut sectors = Vec::with_capacity(sector_count);
    let mut partial_read = false;

    for index in 0..sector_count {
        progress(index, sector_count);
        let candidates = candidate_keys(index, card_keys, global_keys);

        let outcome = authenticate(tech, index, &candidates).and_then(|key| match key {
            Some((key, key_type)) => read_sector(tech, index, &key, key_type).map(Some),
            None => Ok(None),
        });

        match outcome {
            Ok(Some(blocks)) => sectors.push(ClassicSector::Data { index, blocks }),
            Ok(None) => {
                debug!(sector = index, "No key for sector");
                sectors.push(ClassicSector::Unauthorized { index });
            }
            Err(e) if e.is_card_lost() => {
                warn!(sector = index, "Card lost, returning partial read");
                sectors.push(ClassicSector::Invalid {
                    index,
                    reason: e.to_string(),
                });
                partial_read = true;
                break;
            }
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                debug!(sector = index, error = %e, "Sector read failed");
                sectors.push(ClassicSector::Invalid {
                    index,
                    reason: e.to_string(),
                });
            }
        }
    }

    let capture = ClassicCapture {
        sectors,
        partial_read,
    };
    if capture.is_partially_unauthorized() {
        warn!("Some sectors could not be authenticated");
    }
    Ok(RawCard::new(tag_id, RawPayload::Classic(capture)))
}
