//! Card identification from contactless ATRs
//!
//! Contactless readers synthesize an ATR whose historical bytes follow PC/SC
//! part 3: the RID `A0 00 00 03 06`, a standard byte SS, then a two-byte card
//! name NN. ISO-DEP cards instead carry their ATS historical bytes, so
//! anything without the RID is treated as ISO-DEP.

use std::fmt;

const PCSC_RID: [u8; 5] = [0xA0, 0x00, 0x00, 0x03, 0x06];

const SS_FELICA_212: u8 = 0x11;
const SS_FELICA_424: u8 = 0x12;

const NN_CLASSIC_1K: u16 = 0x0001;
const NN_CLASSIC_4K: u16 = 0x0002;
const NN_ULTRALIGHT: u16 = 0x0003;
const NN_CLASSIC_MINI: u16 = 0x0026;
const NN_ULTRALIGHT_C: u16 = 0x003A;
const NN_NTAG: u16 = 0x0044;
const NN_DESFIRE: [u16; 3] = [0x0306, 0x0308, 0x030A];

/// What the reader says is in the field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CardKind {
    /// MIFARE Classic with this many sectors
    Classic {
        /// 5 (Mini), 16 (1K) or 40 (4K)
        sectors: usize,
    },
    /// MIFARE Ultralight or NTAG
    Ultralight {
        /// Named as Ultralight C by the reader
        ultralight_c: bool,
    },
    /// MIFARE DESFire named by the reader
    Desfire,
    /// FeliCa
    Felica,
    /// Any other ISO 14443-4 card
    IsoDep,
}

impl fmt::Display for CardKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Classic { sectors: 5 } => f.write_str("MIFARE Classic Mini"),
            Self::Classic { sectors: 40 } => f.write_str("MIFARE Classic 4K"),
            Self::Classic { .. } => f.write_str("MIFARE Classic 1K"),
            Self::Ultralight { ultralight_c: true } => f.write_str("MIFARE Ultralight C"),
            Self::Ultralight { .. } => f.write_str("MIFARE Ultralight"),
            Self::Desfire => f.write_str("MIFARE DESFire"),
            Self::Felica => f.write_str("FeliCa"),
            Self::IsoDep => f.write_str("ISO-DEP"),
        }
    }
}

/// Historical bytes of an ATR
///
/// Walks the TDi chain to skip the interface bytes. Returns `None` when the
/// ATR is shorter than its format byte claims.
pub fn historical_bytes(atr: &[u8]) -> Option<&[u8]> {
    let &t0 = atr.get(1)?;
    let count = (t0 & 0x0F) as usize;

    let mut offset = 2;
    let mut indicator = t0;
    loop {
        // TAi, TBi, TCi presence bits
        offset += (indicator & 0x70).count_ones() as usize;
        if indicator & 0x80 == 0 {
            break;
        }
        indicator = *atr.get(offset)?;
        offset += 1;
    }

    atr.get(offset..offset + count)
}

/// Classify the card behind a contactless ATR
pub fn classify_atr(atr: &[u8]) -> CardKind {
    let Some(historical) = historical_bytes(atr) else {
        return CardKind::IsoDep;
    };
    let Some(rid) = historical
        .windows(PCSC_RID.len())
        .position(|w| w == PCSC_RID)
    else {
        return CardKind::IsoDep;
    };

    let Some(&standard) = historical.get(rid + 5) else {
        return CardKind::IsoDep;
    };
    if matches!(standard, SS_FELICA_212 | SS_FELICA_424) {
        return CardKind::Felica;
    }

    let name = match historical.get(rid + 6..rid + 8) {
        Some(&[hi, lo]) => u16::from_be_bytes([hi, lo]),
        _ => return CardKind::IsoDep,
    };
    match name {
        NN_CLASSIC_1K => CardKind::Classic { sectors: 16 },
        NN_CLASSIC_4K => CardKind::Classic { sectors: 40 },
        NN_CLASSIC_MINI => CardKind::Classic { sectors: 5 },
        NN_ULTRALIGHT | NN_NTAG => CardKind::Ultralight {
            ultralight_c: false,
        },
        NN_ULTRALIGHT_C => CardKind::Ultralight { ultralight_c: true },
        n if NN_DESFIRE.contains(&n) => CardKind::Desfire,
        _ => CardKind::IsoDep,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn test_historical_bytes_skip_interface_bytes() {
        let atr = hex!("3b8f8001804f0ca000000306030001000000006a");
        assert_eq!(
            historical_bytes(&atr).unwrap(),
            hex!("804f0ca0 00000306 030001 00000000")
        );

        // TA1 present without TD1
        assert_eq!(historical_bytes(&hex!("3b12960102")).unwrap(), hex!("0102"));
        assert_eq!(historical_bytes(&hex!("3b8f80")), None);
    }

    #[test]
    fn test_classify_storage_cards() {
        assert_eq!(
            classify_atr(&hex!("3b8f8001804f0ca000000306030001000000006a")),
            CardKind::Classic { sectors: 16 }
        );
        assert_eq!(
            classify_atr(&hex!("3b8f8001804f0ca0000003060300020000000069")),
            CardKind::Classic { sectors: 40 }
        );
        assert_eq!(
            classify_atr(&hex!("3b8f8001804f0ca0000003060300030000000068")),
            CardKind::Ultralight { ultralight_c: false }
        );
        assert_eq!(
            classify_atr(&hex!("3b8f8001804f0ca00000030603003a0000000051")),
            CardKind::Ultralight { ultralight_c: true }
        );
        assert_eq!(
            classify_atr(&hex!("3b8f8001804f0ca00000030611003b0000000042")),
            CardKind::Felica
        );
    }

    #[test]
    fn test_classify_iso_dep() {
        assert_eq!(classify_atr(&hex!("3b8180018080")), CardKind::IsoDep);
        assert_eq!(classify_atr(&[]), CardKind::IsoDep);
        assert_eq!(CardKind::Classic { sectors: 5 }.to_string(), "MIFARE Classic Mini");
    }
}
