//! Events the scanner publishes

use bytes::Bytes;
use crossbeam_channel::{Receiver, Sender};
use farecard_apdu_transport_pcsc::CardKind;
use farecard_card::RawCard;

use crate::error::ScanError;

/// Coarse card family, known as soon as a target is activated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
pub enum TargetFamily {
    /// MIFARE Classic with this many sectors
    #[display("MIFARE Classic ({sectors} sectors)")]
    Classic {
        /// 5, 16, 32 or 40
        sectors: usize,
    },
    /// MIFARE Ultralight or NTAG
    #[display("MIFARE Ultralight")]
    Ultralight {
        /// Known to be an Ultralight C
        ultralight_c: bool,
    },
    /// ISO 14443-4: DESFire, CEPAS or ISO 7816 applications
    #[display("ISO-DEP")]
    IsoDep,
    /// FeliCa
    #[display("FeliCa")]
    Felica,
}

impl TargetFamily {
    /// Family implied by a type A select acknowledge
    pub const fn from_sak(sak: u8) -> Self {
        if sak & 0x20 != 0 {
            return Self::IsoDep;
        }
        match sak {
            0x00 => Self::Ultralight {
                ultralight_c: false,
            },
            0x09 => Self::Classic { sectors: 5 },
            0x08 | 0x88 => Self::Classic { sectors: 16 },
            0x10 => Self::Classic { sectors: 32 },
            0x11 | 0x18 | 0x98 => Self::Classic { sectors: 40 },
            _ => Self::IsoDep,
        }
    }
}

impl From<CardKind> for TargetFamily {
    fn from(kind: CardKind) -> Self {
        match kind {
            CardKind::Classic { sectors } => Self::Classic { sectors },
            CardKind::Ultralight { ultralight_c } => Self::Ultralight { ultralight_c },
            CardKind::Desfire | CardKind::IsoDep => Self::IsoDep,
            CardKind::Felica => Self::Felica,
        }
    }
}

/// One thing that happened on one backend
#[derive(Debug, Clone, PartialEq)]
pub enum ScanEvent {
    /// A card entered the field; sent before any data is read
    Detected {
        /// Backend that saw the card
        backend: String,
        /// UID or IDm
        tag_id: Bytes,
        /// Coarse family
        family: TargetFamily,
    },
    /// A card was read, possibly with unauthorized sectors
    Read(RawCard),
    /// A read or backend failed
    Error(ScanError),
}

/// Sender for scan events
pub type ScanEventSender = Sender<ScanEvent>;
/// Receiver for scan events
pub type ScanEventReceiver = Receiver<ScanEvent>;

/// Sender for read progress, `None` once a read is over
pub type ProgressSender = Sender<Option<(usize, usize)>>;
/// Receiver for read progress
pub type ProgressReceiver = Receiver<Option<(usize, usize)>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_family_from_sak() {
        assert_eq!(TargetFamily::from_sak(0x08), TargetFamily::Classic { sectors: 16 });
        assert_eq!(TargetFamily::from_sak(0x18), TargetFamily::Classic { sectors: 40 });
        assert_eq!(TargetFamily::from_sak(0x09), TargetFamily::Classic { sectors: 5 });
        assert_eq!(
            TargetFamily::from_sak(0x00),
            TargetFamily::Ultralight {
                ultralight_c: false
            }
        );
        assert_eq!(TargetFamily::from_sak(0x20), TargetFamily::IsoDep);
        // Classic with ISO-DEP (SmartMX) reads as ISO-DEP
        assert_eq!(TargetFamily::from_sak(0x28), TargetFamily::IsoDep);
    }

    #[test]
    fn test_family_display() {
        assert_eq!(
            TargetFamily::Classic { sectors: 16 }.to_string(),
            "MIFARE Classic (16 sectors)"
        );
        assert_eq!(TargetFamily::from(CardKind::Desfire).to_string(), "ISO-DEP");
    }
}
