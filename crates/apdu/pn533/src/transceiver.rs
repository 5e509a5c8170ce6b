//! ISO-DEP transceiver over InDataExchange

use bytes::Bytes;
use farecard_apdu_core::{Transceiver, TransportError};

use crate::bulk::BulkIo;
use crate::device::Pn533;

/// APDU channel to an activated ISO-DEP target
///
/// The chip handles ISO 14443-4 framing, so APDUs go through unchanged.
#[derive(Debug)]
pub struct Pn533Transceiver<'a, B> {
    pn533: &'a mut Pn533<B>,
    tg: u8,
}

impl<'a, B: BulkIo> Pn533Transceiver<'a, B> {
    /// Talk to target `tg`
    pub const fn new(pn533: &'a mut Pn533<B>, tg: u8) -> Self {
        Self { pn533, tg }
    }
}

impl<B: BulkIo> Transceiver for Pn533Transceiver<'_, B> {
    fn do_transceive(&mut self, command: &[u8]) -> Result<Bytes, TransportError> {
        self.pn533
            .in_data_exchange(self.tg, command)
            .map_err(TransportError::from)
    }
}
