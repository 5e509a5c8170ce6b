//! PC/SC reader backend

mod tech;

pub use tech::{PcscClassic, PcscFelica, PcscUltralight};

use bytes::Bytes;
use farecard_apdu_transport_pcsc::{
    CardKind, PcscConfig, PcscDeviceManager, PcscError, PcscTransport, classify_atr,
};
use farecard_card::iso7816::Iso7816Dispatcher;
use farecard_card::{KeyProvider, RawCard, ReadError, felica, ultralight};
use tracing::{debug, info};

use crate::backend::ReaderBackend;
use crate::driver::{ScanContext, TargetDriver, read_classic, run_poll_loop};
use crate::error::Result;
use crate::event::TargetFamily;

/// A card connected through PC/SC
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PcscTarget {
    /// UID from GET DATA, empty if the reader has none
    pub tag_id: Bytes,
    /// Card kind from the ATR
    pub kind: CardKind,
}

/// Poll loop steps for one PC/SC reader
#[derive(Debug)]
pub struct PcscDriver<'a> {
    transport: PcscTransport,
    dispatcher: &'a Iso7816Dispatcher,
}

impl<'a> PcscDriver<'a> {
    /// Drive an open transport
    pub const fn new(transport: PcscTransport, dispatcher: &'a Iso7816Dispatcher) -> Self {
        Self {
            transport,
            dispatcher,
        }
    }
}

impl TargetDriver for PcscDriver<'_> {
    type Target = PcscTarget;

    fn poll(&mut self) -> Result<Option<PcscTarget>> {
        let timeout = self.transport.config().presence_timeout;
        if !self.transport.wait_for_card(timeout)? {
            return Ok(None);
        }
        match self.transport.connect() {
            Ok(()) => {}
            // Gone again before we could connect
            Err(PcscError::NoCard(_)) => return Ok(None),
            Err(e) => return Err(e.into()),
        }

        let atr = self.transport.atr()?;
        let kind = classify_atr(&atr);
        let tag_id = match self.transport.uid() {
            Ok(uid) => uid,
            Err(PcscError::UidUnavailable(status)) => {
                debug!(%status, "Reader has no UID for this card");
                Bytes::new()
            }
            Err(e) => return Err(e.into()),
        };
        debug!(atr = %hex::encode(&atr), %kind, "Card connected");

        Ok(Some(PcscTarget { tag_id, kind }))
    }

    fn identify(&self, target: &PcscTarget) -> (Bytes, TargetFamily) {
        (target.tag_id.clone(), target.kind.into())
    }

    fn read(
        &mut self,
        target: &PcscTarget,
        keys: Option<&dyn KeyProvider>,
        progress: &mut dyn FnMut(usize, usize),
    ) -> std::result::Result<RawCard, ReadError> {
        let tag_id = target.tag_id.clone();
        match TargetFamily::from(target.kind) {
            TargetFamily::Classic { sectors } => read_classic(
                tag_id,
                &mut PcscClassic::new(&mut self.transport, sectors),
                keys,
                progress,
            ),
            TargetFamily::Ultralight { ultralight_c } => ultralight::read_card(
                tag_id,
                &mut PcscUltralight::new(&mut self.transport, ultralight_c),
                progress,
            ),
            TargetFamily::Felica => felica::read_card(
                tag_id.clone(),
                &mut PcscFelica::new(&mut self.transport, tag_id),
                progress,
            ),
            TargetFamily::IsoDep => self
                .dispatcher
                .read_card(tag_id, &mut self.transport, progress),
        }
    }

    fn release(&mut self, _target: &PcscTarget) -> Result<()> {
        Ok(self.transport.disconnect()?)
    }
}

/// Backend for one PC/SC reader
#[derive(Debug)]
pub struct PcscBackend {
    name: String,
    reader: String,
    config: PcscConfig,
    dispatcher: Iso7816Dispatcher,
}

impl PcscBackend {
    /// Backend for the named reader
    pub fn new(reader: impl Into<String>, config: PcscConfig) -> Self {
        let reader = reader.into();
        Self {
            name: format!("PC/SC {reader}"),
            reader,
            config,
            dispatcher: Iso7816Dispatcher::default(),
        }
    }

    /// One backend per reader whose name contains `filter`
    pub fn discover(filter: Option<&str>) -> std::result::Result<Vec<Self>, PcscError> {
        let manager = PcscDeviceManager::new()?;
        let backends: Vec<_> = manager
            .list_readers()?
            .into_iter()
            .filter(|reader| filter.is_none_or(|filter| reader.name().contains(filter)))
            .map(|reader| Self::new(reader.name(), PcscConfig::default()))
            .collect();

        match (backends.is_empty(), filter) {
            (true, Some(filter)) => Err(PcscError::ReaderNotFound(filter.to_owned())),
            _ => Ok(backends),
        }
    }
}

impl ReaderBackend for PcscBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&mut self, ctx: &ScanContext) -> Result<()> {
        let manager = PcscDeviceManager::new()?;
        let transport = manager.open_reader(&self.reader, self.config)?;
        info!(reader = %self.reader, "Using PC/SC reader");

        let mut driver = PcscDriver::new(transport, &self.dispatcher);
        run_poll_loop(&mut driver, ctx)
    }
}
