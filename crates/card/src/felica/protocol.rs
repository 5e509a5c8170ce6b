//! FeliCa command set over a [`FelicaChannel`]

use bytes::{BufMut, Bytes, BytesMut};
use tracing::debug;

use crate::Result;
use crate::technology::FelicaChannel;

/// Polling
pub const COMMAND_POLLING: u8 = 0x00;
/// Read Without Encryption
pub const COMMAND_READ_WO_ENCRYPTION: u8 = 0x06;
/// Search Service Code
pub const COMMAND_SEARCH_SERVICE_CODE: u8 = 0x0A;
/// Search Service Code response code
pub const RESPONSE_SEARCH_SERVICE_CODE: u8 = 0x0B;
/// Request System Code
pub const COMMAND_REQUEST_SYSTEM_CODE: u8 = 0x0C;

/// Wildcard system code for polling
pub const SYSTEM_CODE_ANY: u16 = 0xFFFF;
/// Octopus, which hides its system code
pub const SYSTEM_CODE_OCTOPUS: u16 = 0x8008;
/// Shenzhen Tong, which hides its system code
pub const SYSTEM_CODE_SZT: u16 = 0x8005;
/// Octopus purse service
pub const SERVICE_OCTOPUS: u16 = 0x0117;
/// Shenzhen Tong purse service
pub const SERVICE_SZT: u16 = 0x0118;

/// Size of a FeliCa block
pub const BLOCK_SIZE: usize = 16;

/// Build `LEN CMD IDm DATA`
pub fn frame(command: u8, idm: &[u8], data: &[u8]) -> Bytes {
    let mut frame = BytesMut::with_capacity(2 + idm.len() + data.len());
    frame.put_u8((2 + idm.len() + data.len()) as u8);
    frame.put_u8(command);
    frame.put_slice(idm);
    frame.put_slice(data);
    frame.freeze()
}

/// FeliCa commands addressed to the card currently in the field
///
/// Every command answers `None` when the card rejects it or the exchange
/// fails. Only fatal transport errors are returned as errors.
#[derive(Debug)]
pub struct FelicaProtocol<'a, C: FelicaChannel + ?Sized> {
    channel: &'a mut C,
    idm: Bytes,
}

impl<'a, C: FelicaChannel + ?Sized> FelicaProtocol<'a, C> {
    /// Start talking to the card whose IDm the channel reported at activation
    pub fn new(channel: &'a mut C) -> Self {
        let idm = channel.idm();
        Self { channel, idm }
    }

    /// IDm of the currently selected system
    pub fn idm(&self) -> &Bytes {
        &self.idm
    }

    fn exchange(&mut self, frame: &[u8]) -> Result<Option<Bytes>> {
        match self.channel.transceive(frame) {
            Ok(response) => Ok(Some(response)),
            Err(e) if e.is_fatal() => Err(e.into()),
            Err(e) => {
                debug!(command = ?frame.get(1), error = %e, "FeliCa command failed");
                Ok(None)
            }
        }
    }

    /// Systems the card advertises
    pub fn request_system_codes(&mut self) -> Result<Vec<u16>> {
        let frame = frame(COMMAND_REQUEST_SYSTEM_CODE, &self.idm, &[]);
        let Some(response) = self.exchange(&frame)? else {
            return Ok(Vec::new());
        };
        let Some(&count) = response.get(10) else {
            return Ok(Vec::new());
        };

        Ok(response[11..]
            .chunks_exact(2)
            .take(count as usize)
            .map(|code| u16::from_le_bytes([code[0], code[1]]))
            .collect())
    }

    /// Poll for a system, making it current
    ///
    /// Returns the PMm and switches the IDm to the one the system answered with.
    pub fn select_system(&mut self, system_code: u16) -> Result<Option<Bytes>> {
        let [hi, lo] = system_code.to_be_bytes();
        let frame = frame(COMMAND_POLLING, &[], &[hi, lo, 0x01, 0x00]);
        let Some(response) = self.exchange(&frame)? else {
            return Ok(None);
        };
        if response.len() < 18 {
            debug!(system_code, len = response.len(), "Short polling response");
            return Ok(None);
        }

        self.idm = response.slice(2..10);
        Ok(Some(response.slice(10..18)))
    }

    /// Service codes of the current system, areas excluded
    pub fn search_service_codes(&mut self) -> Result<Vec<u16>> {
        let mut codes = Vec::new();

        for index in 1..=u16::MAX {
            let frame = frame(
                COMMAND_SEARCH_SERVICE_CODE,
                &self.idm,
                &index.to_le_bytes(),
            );
            let Some(response) = self.exchange(&frame)? else {
                break;
            };
            if response.get(1) != Some(&RESPONSE_SEARCH_SERVICE_CODE) || response.len() < 10 {
                break;
            }

            match &response[10..] {
                [0xFF, 0xFF] => break,
                [lo, hi] => codes.push(u16::from_le_bytes([*lo, *hi])),
                // Area code plus end service code
                [_, _, _, _] => {}
                _ => break,
            }
        }
        Ok(codes)
    }

    /// Read one block of a service that needs no authentication
    pub fn read_block(&mut self, service_code: u16, block: u8) -> Result<Option<Bytes>> {
        let [lo, hi] = service_code.to_le_bytes();
        let frame = frame(
            COMMAND_READ_WO_ENCRYPTION,
            &self.idm,
            &[0x01, lo, hi, 0x01, 0x80, block],
        );
        let Some(response) = self.exchange(&frame)? else {
            return Ok(None);
        };

        if response.len() < 12 || response[10] != 0x00 {
            return Ok(None);
        }
        if response.len() < 14 {
            return Ok(None);
        }
        let count = response[12] as usize;
        if count < 1 || response.len() < 13 + count * BLOCK_SIZE {
            return Ok(None);
        }
        Ok(Some(response.slice(13..13 + BLOCK_SIZE)))
    }
}
