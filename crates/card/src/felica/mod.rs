//! FeliCa system, service and block reader
//!
//! Cards are walked system by system. Each service is re-selected before its
//! blocks are read and blocks are read from address 0 until the card refuses.

pub mod protocol;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::raw::{RawCard, RawPayload};
use crate::technology::FelicaChannel;
use crate::{ReadError, Result};

pub use protocol::FelicaProtocol;
use protocol::{SERVICE_OCTOPUS, SERVICE_SZT, SYSTEM_CODE_ANY, SYSTEM_CODE_OCTOPUS, SYSTEM_CODE_SZT};

/// Most blocks read from one service
pub const MAX_BLOCKS_PER_SERVICE: usize = 128;

/// One readable service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FelicaService {
    /// Service code
    pub code: u16,
    /// Blocks from address 0
    #[serde(with = "crate::serde_hex::seq")]
    pub blocks: Vec<Bytes>,
}

/// One system on the card
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FelicaSystem {
    /// System code
    pub code: u16,
    /// Every service code found, readable or not
    #[serde(default)]
    pub service_codes: Vec<u16>,
    /// Services that produced at least one block
    pub services: Vec<FelicaService>,
}

/// Captured FeliCa card
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FelicaCapture {
    /// IDm from activation
    #[serde(with = "crate::serde_hex")]
    pub idm: Bytes,
    /// PMm of the first system
    #[serde(with = "crate::serde_hex")]
    pub pmm: Bytes,
    /// Systems in the order the card listed them
    pub systems: Vec<FelicaSystem>,
}

/// Read all systems of a FeliCa card
#[instrument(skip_all, fields(tag_id = %hex::encode(&tag_id)))]
pub fn read_card<C: FelicaChannel + ?Sized>(
    tag_id: Bytes,
    channel: &mut C,
    progress: &mut dyn FnMut(usize, usize),
) -> Result<RawCard> {
    let mut felica = FelicaProtocol::new(channel);
    let idm = felica.idm().clone();

    let mut system_codes = felica.request_system_codes()?;
    let mut octopus = false;
    let mut szt = false;
    if system_codes.is_empty() {
        // Some transit cards only answer polling for their own code
        if felica.select_system(SYSTEM_CODE_OCTOPUS)?.is_some() {
            system_codes.push(SYSTEM_CODE_OCTOPUS);
            octopus = true;
        }
        if felica.select_system(SYSTEM_CODE_SZT)?.is_some() {
            system_codes.push(SYSTEM_CODE_SZT);
            szt = true;
        }
    }
    debug!(?system_codes, "Systems found");

    let first = system_codes.first().copied().unwrap_or(SYSTEM_CODE_ANY);
    let pmm = felica
        .select_system(first)?
        .ok_or_else(|| ReadError::Felica("Failed to poll for PMm".into()))?;

    let mut systems = Vec::with_capacity(system_codes.len());
    for (index, &code) in system_codes.iter().enumerate() {
        progress(index, system_codes.len());
        felica.select_system(code)?;

        let service_codes = match code {
            SYSTEM_CODE_OCTOPUS if octopus => vec![SERVICE_OCTOPUS],
            SYSTEM_CODE_SZT if szt => vec![SERVICE_SZT],
            _ => felica.search_service_codes()?,
        };

        let mut services = Vec::new();
        for &service in &service_codes {
            felica.select_system(code)?;

            let mut blocks = Vec::new();
            while blocks.len() < MAX_BLOCKS_PER_SERVICE {
                match felica.read_block(service, blocks.len() as u8)? {
                    Some(block) => blocks.push(block),
                    None => break,
                }
            }
            if !blocks.is_empty() {
                debug!(system = code, service, blocks = blocks.len(), "Service read");
                services.push(FelicaService {
                    code: service,
                    blocks,
                });
            }
        }

        systems.push(FelicaSystem {
            code,
            service_codes,
            services,
        });
    }

    Ok(RawCard::new(
        tag_id,
        RawPayload::Felica(FelicaCapture { idm, pmm, systems }),
    ))
}
