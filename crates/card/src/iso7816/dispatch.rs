//! Reader for ISO-DEP cards of unknown kind

use bytes::Bytes;
use farecard_apdu_core::Transceiver;
use tracing::{debug, info, instrument};

use super::discovery::{AppConfig, discover};
use crate::raw::{RawCard, RawPayload};
use crate::{ReadError, Result, cepas, desfire};

/// Tries ISO 7816 discovery, then DESFire, then CEPAS
#[derive(Debug, Clone)]
pub struct Iso7816Dispatcher {
    configs: Vec<AppConfig>,
}

impl Default for Iso7816Dispatcher {
    fn default() -> Self {
        Self::new(super::builtin_configs())
    }
}

impl Iso7816Dispatcher {
    /// Dispatcher probing the given application configurations
    pub const fn new(configs: Vec<AppConfig>) -> Self {
        Self { configs }
    }

    /// Configurations probed during discovery
    pub fn configs(&self) -> &[AppConfig] {
        &self.configs
    }

    /// Read the card with the first reader that recognises it
    ///
    /// Transport failures, a lost card included, end the read immediately.
    /// Any other failure moves on to the next reader.
    #[instrument(skip_all, fields(tag_id = %hex::encode(&tag_id)))]
    pub fn read_card(
        &self,
        tag_id: Bytes,
        transceiver: &mut dyn Transceiver,
        progress: &mut dyn FnMut(usize, usize),
    ) -> Result<RawCard> {
        if let Some(capture) = discover(&self.configs, transceiver, progress)? {
            info!(applications = capture.applications.len(), "ISO 7816 applications found");
            return Ok(RawCard::new(tag_id, RawPayload::Iso7816(capture)));
        }
        debug!("No known ISO 7816 application, trying DESFire");

        match desfire::read_card(tag_id.clone(), &mut *transceiver, progress) {
            Ok(card) => return Ok(card),
            Err(e) if e.transport().is_some() => return Err(e),
            Err(e) => debug!(error = %e, "Not a DESFire card, trying CEPAS"),
        }

        match cepas::read_card(tag_id, &mut *transceiver, progress) {
            Ok(card) => Ok(card),
            Err(e) if e.transport().is_some() => Err(e),
            Err(e) => {
                debug!(error = %e, "Not a CEPAS card");
                Err(ReadError::UnsupportedCard)
            }
        }
    }
}
