//! Targets reported by InListPassiveTarget

use bytes::Bytes;

use crate::device::BaudRate;
use crate::error::{Pn533Error, Result};

/// An ISO 14443 type A target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeATarget {
    /// Logical target number assigned by the chip
    pub tg: u8,
    /// ATQA, as sent on the air
    pub atqa: [u8; 2],
    /// Select acknowledge
    pub sak: u8,
    /// UID (4, 7 or 10 bytes)
    pub uid: Bytes,
    /// ATS, when the target is ISO-DEP
    pub ats: Option<Bytes>,
}

/// A FeliCa target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FelicaTarget {
    /// Logical target number assigned by the chip
    pub tg: u8,
    /// Manufacture id
    pub idm: [u8; 8],
    /// Manufacture parameters
    pub pmm: [u8; 8],
}

/// A target activated by the chip
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// ISO 14443 type A
    TypeA(TypeATarget),
    /// FeliCa at 212 or 424 kbps
    Felica(FelicaTarget),
}

impl Target {
    /// Logical target number
    pub const fn tg(&self) -> u8 {
        match self {
            Self::TypeA(target) => target.tg,
            Self::Felica(target) => target.tg,
        }
    }

    /// Tag identifier: the UID for type A, the IDm for FeliCa
    pub fn id(&self) -> Bytes {
        match self {
            Self::TypeA(target) => target.uid.clone(),
            Self::Felica(target) => Bytes::copy_from_slice(&target.idm),
        }
    }

    /// Parse InListPassiveTarget response data, `None` when no target was found
    pub(crate) fn parse(baud: BaudRate, data: &[u8]) -> Result<Option<Self>> {
        let (&count, rest) = data
            .split_first()
            .ok_or(Pn533Error::InvalidFrame("empty target list"))?;
        if count == 0 {
            return Ok(None);
        }

        match baud {
            BaudRate::TypeA106 => parse_type_a(rest).map(|target| Some(Self::TypeA(target))),
            BaudRate::Felica212 | BaudRate::Felica424 => {
                parse_felica(rest).map(|target| Some(Self::Felica(target)))
            }
        }
    }
}

// [Tg][ATQA 2][SAK][NFCIDLength][NFCID][ATS..]
fn parse_type_a(data: &[u8]) -> Result<TypeATarget> {
    let [tg, atqa0, atqa1, sak, uid_len, rest @ ..] = data else {
        return Err(Pn533Error::InvalidFrame("short type A target"));
    };
    let uid = rest
        .get(..*uid_len as usize)
        .ok_or(Pn533Error::InvalidFrame("truncated UID"))?;
    let ats = rest
        .get(*uid_len as usize..)
        .filter(|ats| !ats.is_empty())
        .map(Bytes::copy_from_slice);

    Ok(TypeATarget {
        tg: *tg,
        atqa: [*atqa0, *atqa1],
        sak: *sak,
        uid: Bytes::copy_from_slice(uid),
        ats,
    })
}

// [Tg][POL_RES length][01][IDm 8][PMm 8][system code 2]?
fn parse_felica(data: &[u8]) -> Result<FelicaTarget> {
    let [tg, _len, _code, rest @ ..] = data else {
        return Err(Pn533Error::InvalidFrame("short FeliCa target"));
    };
    if rest.len() < 16 {
        return Err(Pn533Error::InvalidFrame("short FeliCa target"));
    }
    let mut idm = [0u8; 8];
    let mut pmm = [0u8; 8];
    idm.copy_from_slice(&rest[..8]);
    pmm.copy_from_slice(&rest[8..16]);

    Ok(FelicaTarget { tg: *tg, idm, pmm })
}
