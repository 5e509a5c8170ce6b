//! Raw card captures

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cepas::CepasCapture;
use crate::classic::ClassicCapture;
use crate::desfire::DesfireCapture;
use crate::felica::FelicaCapture;
use crate::iso7816::Iso7816Capture;
use crate::parsed::ParsedCard;
use crate::ultralight::UltralightCapture;

/// Card family
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display,
)]
#[serde(rename_all = "snake_case")]
pub enum CardType {
    /// MIFARE Classic 1K/4K/Mini
    #[display("MIFARE Classic")]
    Classic,
    /// MIFARE Ultralight and NTAG
    #[display("MIFARE Ultralight")]
    Ultralight,
    /// MIFARE DESFire
    #[display("MIFARE DESFire")]
    Desfire,
    /// Sony FeliCa
    #[display("FeliCa")]
    Felica,
    /// CEPAS (Singapore)
    #[display("CEPAS")]
    Cepas,
    /// ISO 7816-4 applications over ISO-DEP
    #[display("ISO 7816")]
    Iso7816,
}

/// Family-specific capture
///
/// Must stay externally tagged: integer map keys in ISO 7816 captures do not
/// deserialize through serde's buffered (internally tagged) representation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RawPayload {
    /// MIFARE Classic sectors
    Classic(ClassicCapture),
    /// Ultralight pages
    Ultralight(UltralightCapture),
    /// DESFire applications
    Desfire(DesfireCapture),
    /// FeliCa systems
    Felica(FelicaCapture),
    /// CEPAS purses and histories
    Cepas(CepasCapture),
    /// ISO 7816 applications
    Iso7816(Iso7816Capture),
}

/// Everything read from one card
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawCard {
    /// UID as reported at anticollision
    #[serde(with = "crate::serde_hex")]
    pub tag_id: Bytes,
    /// When the read finished
    pub scanned_at: DateTime<Utc>,
    /// Captured data
    pub payload: RawPayload,
}

impl RawCard {
    /// Stamp a capture with the current time
    pub fn new(tag_id: Bytes, payload: RawPayload) -> Self {
        Self {
            tag_id,
            scanned_at: Utc::now(),
            payload,
        }
    }

    /// Family of the capture
    pub const fn card_type(&self) -> CardType {
        match self.payload {
            RawPayload::Classic(_) => CardType::Classic,
            RawPayload::Ultralight(_) => CardType::Ultralight,
            RawPayload::Desfire(_) => CardType::Desfire,
            RawPayload::Felica(_) => CardType::Felica,
            RawPayload::Cepas(_) => CardType::Cepas,
            RawPayload::Iso7816(_) => CardType::Iso7816,
        }
    }

    /// Check if some of the card stayed locked
    ///
    /// Only families with access control can be partially unauthorized.
    pub fn is_partially_unauthorized(&self) -> bool {
        match &self.payload {
            RawPayload::Classic(c) => c.is_partially_unauthorized(),
            RawPayload::Desfire(c) => c.is_partially_unauthorized(),
            RawPayload::Cepas(c) => c.is_partially_unauthorized(),
            RawPayload::Ultralight(_) | RawPayload::Felica(_) | RawPayload::Iso7816(_) => false,
        }
    }

    /// Decode the capture
    pub fn parse(&self) -> ParsedCard {
        ParsedCard::from_raw(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classic::ClassicSector;
    use crate::ultralight::UltralightModel;

    #[test]
    fn test_json_layout() {
        let card = RawCard::new(
            Bytes::from_static(&[0x04, 0xA1, 0xB2, 0xC3]),
            RawPayload::Ultralight(UltralightCapture {
                model: UltralightModel::Ntag213,
                pages: vec![Bytes::from_static(&[1, 2, 3, 4])],
            }),
        );
        let json = serde_json::to_value(&card).unwrap();
        assert_eq!(json["tag_id"], "04a1b2c3");
        assert_eq!(json["payload"]["ultralight"]["model"], "ntag213");
        assert_eq!(json["payload"]["ultralight"]["pages"][0], "01020304");

        let back: RawCard = serde_json::from_str(&json.to_string()).unwrap();
        assert_eq!(back, card);
        assert_eq!(back.card_type().to_string(), "MIFARE Ultralight");
    }

    #[test]
    fn test_partially_unauthorized_flag() {
        let card = RawCard::new(
            Bytes::from_static(&[1, 2, 3, 4]),
            RawPayload::Classic(ClassicCapture {
                sectors: vec![
                    ClassicSector::Data {
                        index: 0,
                        blocks: vec![Bytes::from_static(&[0; 16]); 4],
                    },
                    ClassicSector::Unauthorized { index: 1 },
                ],
                partial_read: false,
            }),
        );
        assert!(card.is_partially_unauthorized());
        assert_eq!(card.card_type(), CardType::Classic);
    }
}
