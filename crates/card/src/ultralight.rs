//! MIFARE Ultralight and NTAG page reader

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::raw::{RawCard, RawPayload};
use crate::technology::UltralightTechnology;
use crate::Result;

const GET_VERSION: u8 = 0x60;
const AUTH_1: u8 = 0x1A;
const HALT: u8 = 0x50;
const READ: u8 = 0x30;

/// Pages returned by one READ command
const PAGES_PER_READ: usize = 4;
/// Bytes per page
pub const PAGE_SIZE: usize = 4;
/// Upper bound when the page count is unknown
const MAX_PAGES: usize = 256;

/// Ultralight family member
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display,
)]
#[serde(rename_all = "snake_case")]
pub enum UltralightModel {
    /// MF0ICU1, the original Ultralight
    #[display("MIFARE Ultralight")]
    Mf0icu1,
    /// MF0ICU2, Ultralight C
    #[display("MIFARE Ultralight C")]
    Mf0icu2,
    /// MF0UL11, Ultralight EV1 with 48 bytes of user memory
    #[display("MIFARE Ultralight EV1 (MF0UL11)")]
    Mf0ul11,
    /// MF0UL21, Ultralight EV1 with 128 bytes of user memory
    #[display("MIFARE Ultralight EV1 (MF0UL21)")]
    Mf0ul21,
    /// NTAG213
    #[display("NTAG213")]
    Ntag213,
    /// NTAG215
    #[display("NTAG215")]
    Ntag215,
    /// NTAG216
    #[display("NTAG216")]
    Ntag216,
    /// Answered GET_VERSION with something unrecognised
    #[display("Unknown Ultralight")]
    Unknown,
}

impl UltralightModel {
    /// Model named by a GET_VERSION answer
    pub fn from_version(version: &[u8]) -> Self {
        match (version.get(2), version.get(6)) {
            (Some(0x04), Some(0x0F)) => Self::Ntag213,
            (Some(0x04), Some(0x11)) => Self::Ntag215,
            (Some(0x04), Some(0x13)) => Self::Ntag216,
            (Some(0x03), Some(0x0B)) => Self::Mf0ul11,
            (Some(0x03), Some(0x0E)) => Self::Mf0ul21,
            _ => Self::Unknown,
        }
    }

    /// Total pages, or `None` when unknown
    pub const fn page_count(self) -> Option<usize> {
        match self {
            Self::Mf0icu1 => Some(16),
            Self::Mf0icu2 => Some(44),
            Self::Mf0ul11 => Some(20),
            Self::Mf0ul21 => Some(41),
            Self::Ntag213 => Some(45),
            Self::Ntag215 => Some(135),
            Self::Ntag216 => Some(231),
            Self::Unknown => None,
        }
    }
}

/// Captured Ultralight card
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UltralightCapture {
    /// Detected model
    pub model: UltralightModel,
    /// Pages from page 0
    #[serde(with = "crate::serde_hex::seq")]
    pub pages: Vec<Bytes>,
}

/// Work out which model is in the field
///
/// Cards that do not know a command drop off the field, so every probe that
/// fails is followed by a reconnect.
pub fn detect_model<T: UltralightTechnology + ?Sized>(tech: &mut T) -> Result<UltralightModel> {
    if let Some(model) = tech.model_hint() {
        return Ok(model);
    }

    match tech.transceive(&[GET_VERSION]) {
        Ok(version) => {
            debug!(version = %hex::encode(&version), "GET_VERSION answered");
            return Ok(UltralightModel::from_version(&version));
        }
        Err(e) if e.is_fatal() => return Err(e.into()),
        Err(e) => debug!(error = %e, "GET_VERSION unsupported, not EV1"),
    }
    tech.reconnect()?;

    match tech.transceive(&[AUTH_1, 0x00]) {
        Ok(_) => {
            // Abandon the 3DES handshake
            if let Err(e) = tech.transceive(&[HALT, 0x00]) {
                debug!(error = %e, "Discarding HALT error");
            }
            tech.reconnect()?;
            Ok(UltralightModel::Mf0icu2)
        }
        Err(e) if e.is_fatal() => Err(e.into()),
        Err(e) => {
            debug!(error = %e, "AUTH_1 unsupported, not Ultralight C");
            tech.reconnect()?;
            Ok(UltralightModel::Mf0icu1)
        }
    }
}

/// Read all pages of an Ultralight family card
///
/// Reading stops early at the first page the card refuses. `progress` is
/// called with `(page, page_count)` before each READ.
#[instrument(skip_all, fields(tag_id = %hex::encode(&tag_id)))]
pub fn read_card<T: UltralightTechnology + ?Sized>(
    tag_id: Bytes,
    tech: &mut T,
    progress: &mut dyn FnMut(usize, usize),
) -> Result<RawCard> {
    let model = detect_model(tech)?;
    let page_count = model.page_count().unwrap_or(MAX_PAGES);
    debug!(%model, page_count, "Reading pages");

    let mut pages = Vec::with_capacity(page_count);
    let mut page = 0;
    while page < page_count {
        progress(page, page_count);
        let data = match tech.transceive(&[READ, page as u8]) {
            Ok(data) if data.len() >= PAGE_SIZE => data,
            Ok(data) => {
                debug!(page, len = data.len(), "Short READ answer, stopping");
                break;
            }
            Err(e) if e.is_fatal() => return Err(e.into()),
            Err(e) => {
                debug!(page, error = %e, "READ failed, stopping");
                break;
            }
        };

        let wanted = PAGES_PER_READ.min(page_count - page);
        for chunk in data.chunks_exact(PAGE_SIZE).take(wanted) {
            pages.push(data.slice_ref(chunk));
        }
        page += wanted;
    }

    Ok(RawCard::new(
        tag_id,
        RawPayload::Ultralight(UltralightCapture { model, pages }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use farecard_apdu_core::Error as ApduError;
    use hex_literal::hex;

    #[derive(Debug, Default)]
    struct FakeUltralight {
        version: Option<Vec<u8>>,
        auth: bool,
        pages: usize,
        reconnects: usize,
        sent: Vec<Vec<u8>>,
    }

    impl UltralightTechnology for FakeUltralight {
        fn transceive(&mut self, command: &[u8]) -> farecard_apdu_core::Result<Bytes> {
            self.sent.push(command.to_vec());
            let refuse = || ApduError::InstructionNotSupported;
            match command {
                [GET_VERSION] => self.version.clone().map(Bytes::from).ok_or_else(refuse),
                [AUTH_1, 0] if self.auth => Ok(Bytes::from_static(&[0xAF; 9])),
                [HALT, 0] => Err(refuse()),
                [READ, page] if (*page as usize) < self.pages => {
                    let mut data = Vec::new();
                    for p in *page..page + 4 {
                        data.extend_from_slice(&[p; 4]);
                    }
                    Ok(Bytes::from(data))
                }
                _ => Err(refuse()),
            }
        }

        fn reconnect(&mut self) -> farecard_apdu_core::Result<()> {
            self.reconnects += 1;
            Ok(())
        }
    }

    fn capture(card: &RawCard) -> &UltralightCapture {
        match &card.payload {
            RawPayload::Ultralight(c) => c,
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn test_models_from_version() {
        assert_eq!(
            UltralightModel::from_version(&hex!("0004040201000f03")),
            UltralightModel::Ntag213
        );
        assert_eq!(
            UltralightModel::from_version(&hex!("0004030101000e03")),
            UltralightModel::Mf0ul21
        );
        assert_eq!(UltralightModel::from_version(&[0x00]), UltralightModel::Unknown);
    }

    #[test]
    fn test_ev1_read() {
        let mut tech = FakeUltralight {
            version: Some(hex!("0004030101000b03").to_vec()),
            pages: 20,
            ..Default::default()
        };
        let mut seen = Vec::new();
        let card = read_card(Bytes::new(), &mut tech, &mut |i, n| seen.push((i, n))).unwrap();
        let capture = capture(&card);

        assert_eq!(capture.model, UltralightModel::Mf0ul11);
        assert_eq!(seen, [(0, 20), (4, 20), (8, 20), (12, 20), (16, 20)]);
        assert_eq!(capture.pages.len(), 20);
        assert_eq!(capture.pages[19].as_ref(), &[19; 4]);
        assert_eq!(tech.reconnects, 0);
    }

    #[test]
    fn test_ultralight_c_detection() {
        let mut tech = FakeUltralight {
            auth: true,
            pages: 44,
            ..Default::default()
        };
        assert_eq!(detect_model(&mut tech).unwrap(), UltralightModel::Mf0icu2);
        assert_eq!(tech.reconnects, 2);
        assert_eq!(tech.sent[2], vec![HALT, 0x00]);
    }

    #[test]
    fn test_plain_ultralight_detection_and_short_card() {
        let mut tech = FakeUltralight {
            pages: 8,
            ..Default::default()
        };
        let mut reads = 0;
        let card = read_card(Bytes::new(), &mut tech, &mut |_, _| reads += 1).unwrap();
        let capture = capture(&card);

        assert_eq!(capture.model, UltralightModel::Mf0icu1);
        assert_eq!(reads, 3);
        assert_eq!(tech.reconnects, 2);
        // Only pages 0..8 answer; the third READ fails
        assert_eq!(capture.pages.len(), 8);
    }
}
