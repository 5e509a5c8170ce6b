//! PC/SC transport implementation

use std::ffi::CString;
use std::fmt;
use std::time::Duration;

use bytes::Bytes;
use farecard_apdu_core::{StatusWord, Transceiver, TransportError};
use pcsc::{Card, Context, Disposition, ReaderState, State};
use tracing::{debug, trace};

use crate::config::PcscConfig;
use crate::error::PcscError;
use crate::reader::card_present;

/// GET DATA for the UID, a PC/SC part 3 pseudo-APDU
const GET_UID: [u8; 5] = [0xFF, 0xCA, 0x00, 0x00, 0x00];

/// Transport implementation using PC/SC
pub struct PcscTransport {
    /// PC/SC context
    context: Context,
    /// Card connection, if established
    card: Option<Card>,
    /// Reader name
    reader_name: CString,
    /// Configuration
    config: PcscConfig,
}

impl fmt::Debug for PcscTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PcscTransport")
            .field("reader_name", &self.reader_name)
            .field("has_card", &self.card.is_some())
            .field("config", &self.config)
            .finish()
    }
}

impl PcscTransport {
    pub(crate) fn new(
        context: Context,
        reader_name: &str,
        config: PcscConfig,
    ) -> Result<Self, PcscError> {
        let reader_name = CString::new(reader_name)
            .map_err(|_| PcscError::ReaderNotFound(reader_name.to_owned()))?;
        Ok(Self {
            context,
            card: None,
            reader_name,
            config,
        })
    }

    /// Get the reader name
    pub fn reader_name(&self) -> String {
        self.reader_name.to_string_lossy().into_owned()
    }

    /// Configuration the transport was opened with
    pub const fn config(&self) -> &PcscConfig {
        &self.config
    }

    /// Check if the transport is connected to a card
    pub const fn has_card(&self) -> bool {
        self.card.is_some()
    }

    /// Wait up to `timeout` for the reader state to match `present`
    fn wait_for(&self, present: bool, timeout: Duration) -> Result<bool, PcscError> {
        let mut states = [ReaderState::new(self.reader_name.clone(), State::UNAWARE)];
        self.context.get_status_change(None, &mut states)?;
        if card_present(states[0].event_state()) == present {
            return Ok(true);
        }

        states[0].sync_current_state();
        match self.context.get_status_change(Some(timeout), &mut states) {
            Ok(()) => Ok(card_present(states[0].event_state()) == present),
            Err(pcsc::Error::Timeout) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Wait for a card to enter the field
    ///
    /// Returns `false` if none arrived within `timeout`.
    pub fn wait_for_card(&self, timeout: Duration) -> Result<bool, PcscError> {
        self.wait_for(true, timeout)
    }

    /// Wait for the field to be empty
    ///
    /// Returns `false` if the card is still there after `timeout`.
    pub fn wait_for_removal(&self, timeout: Duration) -> Result<bool, PcscError> {
        self.wait_for(false, timeout)
    }

    /// Connect to the card in the field
    pub fn connect(&mut self) -> Result<(), PcscError> {
        if self.card.is_some() {
            return Ok(());
        }

        match self.context.connect(
            &self.reader_name,
            self.config.share_mode.into(),
            self.config.protocols,
        ) {
            Ok(card) => {
                self.card = Some(card);
                Ok(())
            }
            Err(pcsc::Error::NoSmartcard | pcsc::Error::RemovedCard) => {
                Err(PcscError::NoCard(self.reader_name()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Release the card, leaving it powered
    ///
    /// The handle is dropped even when the reader refuses the disconnect.
    pub fn disconnect(&mut self) -> Result<(), PcscError> {
        if let Some(card) = self.card.take() {
            card.disconnect(Disposition::LeaveCard).map_err(|(_, e)| e)?;
        }
        Ok(())
    }

    /// Get the ATR of the current card
    pub fn atr(&self) -> Result<Vec<u8>, PcscError> {
        let card = self
            .card
            .as_ref()
            .ok_or_else(|| PcscError::NoCard(self.reader_name()))?;
        Ok(card.get_attribute_owned(pcsc::Attribute::AtrString)?)
    }

    /// Read the card UID with GET DATA
    pub fn uid(&mut self) -> Result<Bytes, PcscError> {
        let response = self.transmit_command(&GET_UID)?;
        let [.., sw1, sw2] = response.as_ref() else {
            return Err(PcscError::Other("short GET DATA response".into()));
        };
        let status = StatusWord::new(*sw1, *sw2);
        if !status.is_success() {
            return Err(PcscError::UidUnavailable(status));
        }
        Ok(response.slice(..response.len() - 2))
    }

    fn transmit_command(&mut self, command: &[u8]) -> Result<Bytes, PcscError> {
        let card = self
            .card
            .as_mut()
            .ok_or_else(|| PcscError::NoCard(self.reader_name.to_string_lossy().into_owned()))?;

        let mut response_buffer = [0u8; pcsc::MAX_BUFFER_SIZE_EXTENDED];
        match card.transmit(command, &mut response_buffer) {
            Ok(response) => Ok(Bytes::copy_from_slice(response)),
            Err(e @ (pcsc::Error::ResetCard | pcsc::Error::RemovedCard)) => {
                trace!(error = %e, "Card left the field");
                self.card = None;
                Err(PcscError::CardRemoved)
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl Transceiver for PcscTransport {
    fn do_transceive(&mut self, command: &[u8]) -> Result<Bytes, TransportError> {
        self.transmit_command(command).map_err(TransportError::from)
    }
}

impl Drop for PcscTransport {
    fn drop(&mut self) {
        if let Err(e) = self.disconnect() {
            debug!(error = %e, "Disconnect failed");
        }
    }
}
