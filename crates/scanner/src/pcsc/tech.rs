//! Card technologies over PC/SC part 3 pseudo-APDUs
//!
//! Contactless PC/SC readers expose MIFARE Classic and Ultralight memory
//! through `FF xx` commands handled by the reader itself. FeliCa frames are
//! passed through with the Sony encapsulation `FF C2 00 01`.

use bytes::Bytes;
use farecard_apdu_core::{Error, Response, Result, Transceiver};
use farecard_card::keys::{ClassicKey, KeyType};
use farecard_card::technology::{ClassicTechnology, FelicaChannel, UltralightTechnology};
use farecard_card::ultralight::UltralightModel;
use tracing::trace;

const CLA_PSEUDO: u8 = 0xFF;
const INS_LOAD_KEY: u8 = 0x82;
const INS_GENERAL_AUTHENTICATE: u8 = 0x86;
const INS_READ_BINARY: u8 = 0xB0;
const INS_FELICA_THRU: u8 = 0xC2;

/// Volatile key slot used for every authentication
const KEY_SLOT: u8 = 0x00;

const ULTRALIGHT_READ: u8 = 0x30;

fn exchange<T: Transceiver>(transceiver: &mut T, apdu: &[u8]) -> Result<Response> {
    let raw = transceiver.transceive(apdu)?;
    Response::from_bytes(&raw)
}

fn read_binary<T: Transceiver>(transceiver: &mut T, block: u8) -> Result<Bytes> {
    let response = exchange(
        transceiver,
        &[CLA_PSEUDO, INS_READ_BINARY, 0x00, block, 0x10],
    )?;
    if response.status().is_success() {
        Ok(response.into_payload())
    } else {
        Err(Error::from_status(response.status()))
    }
}

/// MIFARE Classic through load key, general authenticate and read binary
#[derive(Debug)]
pub struct PcscClassic<T> {
    transceiver: T,
    sectors: usize,
}

impl<T: Transceiver> PcscClassic<T> {
    /// Wrap a connected card with `sectors` sectors
    pub const fn new(transceiver: T, sectors: usize) -> Self {
        Self {
            transceiver,
            sectors,
        }
    }
}

impl<T: Transceiver> ClassicTechnology for PcscClassic<T> {
    fn sector_count(&self) -> usize {
        self.sectors
    }

    fn authenticate(&mut self, sector: usize, key: &ClassicKey, key_type: KeyType) -> Result<bool> {
        let mut load = vec![CLA_PSEUDO, INS_LOAD_KEY, 0x00, KEY_SLOT, key.len() as u8];
        load.extend_from_slice(key);
        let loaded = exchange(&mut self.transceiver, &load)?;
        if !loaded.status().is_success() {
            return Err(Error::from_status(loaded.status()));
        }

        let block = self.sector_to_block(sector) as u8;
        let authenticate = [
            CLA_PSEUDO,
            INS_GENERAL_AUTHENTICATE,
            0x00,
            0x00,
            0x05,
            0x01,
            0x00,
            block,
            key_type.auth_code(),
            KEY_SLOT,
        ];
        let response = exchange(&mut self.transceiver, &authenticate)?;
        trace!(sector, %key_type, status = %response.status(), "General authenticate");
        Ok(response.status().is_success())
    }

    fn read_block(&mut self, block: usize) -> Result<Bytes> {
        read_binary(&mut self.transceiver, block as u8)
    }
}

/// MIFARE Ultralight through read binary
///
/// Only READ has a pseudo-APDU, so the model comes from the ATR rather than
/// GET_VERSION. Unknown models are read until the reader refuses a page.
#[derive(Debug)]
pub struct PcscUltralight<T> {
    transceiver: T,
    ultralight_c: bool,
}

impl<T: Transceiver> PcscUltralight<T> {
    /// Wrap a connected card
    pub const fn new(transceiver: T, ultralight_c: bool) -> Self {
        Self {
            transceiver,
            ultralight_c,
        }
    }
}

impl<T: Transceiver> UltralightTechnology for PcscUltralight<T> {
    fn transceive(&mut self, command: &[u8]) -> Result<Bytes> {
        match command {
            [ULTRALIGHT_READ, page] => read_binary(&mut self.transceiver, *page),
            _ => Err(Error::InstructionNotSupported),
        }
    }

    fn reconnect(&mut self) -> Result<()> {
        Ok(())
    }

    fn model_hint(&self) -> Option<UltralightModel> {
        Some(if self.ultralight_c {
            UltralightModel::Mf0icu2
        } else {
            UltralightModel::Unknown
        })
    }
}

/// FeliCa frames through the Sony encapsulation pseudo-APDU
#[derive(Debug)]
pub struct PcscFelica<T> {
    transceiver: T,
    idm: Bytes,
}

impl<T: Transceiver> PcscFelica<T> {
    /// Wrap a connected card whose IDm the reader reported as its UID
    pub const fn new(transceiver: T, idm: Bytes) -> Self {
        Self { transceiver, idm }
    }
}

impl<T: Transceiver> FelicaChannel for PcscFelica<T> {
    fn transceive(&mut self, frame: &[u8]) -> Result<Bytes> {
        let mut apdu = Vec::with_capacity(frame.len() + 6);
        apdu.extend_from_slice(&[CLA_PSEUDO, INS_FELICA_THRU, 0x00, 0x01, frame.len() as u8]);
        apdu.extend_from_slice(frame);
        apdu.push(0x00);

        let response = exchange(&mut self.transceiver, &apdu)?;
        if response.status().is_success() {
            Ok(response.into_payload())
        } else {
            Err(Error::from_status(response.status()))
        }
    }

    fn idm(&self) -> Bytes {
        self.idm.clone()
    }
}
