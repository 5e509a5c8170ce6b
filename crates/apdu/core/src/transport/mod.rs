//! Transport traits for APDU communication with cards
//!
//! A [`Transceiver`] is bound to one card on one hardware channel. It is
//! owned exclusively by whoever is reading that card, so the trait takes
//! `&mut self` and never needs internal locking.

pub mod error;
#[cfg(any(test, feature = "mock"))]
pub mod mock;

use std::fmt;

use bytes::Bytes;
pub use error::TransportError;
use tracing::{debug, trace};

/// Sends one command buffer to a card and returns one response buffer
pub trait Transceiver: Send + fmt::Debug {
    /// Send raw bytes to the card and return the raw response
    ///
    /// This logs both directions at trace level and delegates to
    /// [`Transceiver::do_transceive`].
    fn transceive(&mut self, command: &[u8]) -> Result<Bytes, TransportError> {
        trace!(command = %hex::encode(command), "Transmitting raw command");
        let result = self.do_transceive(command);
        match &result {
            Ok(response) => {
                trace!(response = %hex::encode(response), "Received raw response");
            }
            Err(e) => {
                debug!(error = ?e, "Transport error during transmission");
            }
        }
        result
    }

    /// Internal implementation of transceive
    /// This is the method that concrete implementations should override
    fn do_transceive(&mut self, command: &[u8]) -> Result<Bytes, TransportError>;
}

impl<T: Transceiver + ?Sized> Transceiver for &mut T {
    fn transceive(&mut self, command: &[u8]) -> Result<Bytes, TransportError> {
        (**self).transceive(command)
    }

    fn do_transceive(&mut self, command: &[u8]) -> Result<Bytes, TransportError> {
        (**self).do_transceive(command)
    }
}

impl<T: Transceiver + ?Sized> Transceiver for Box<T> {
    fn transceive(&mut self, command: &[u8]) -> Result<Bytes, TransportError> {
        (**self).transceive(command)
    }

    fn do_transceive(&mut self, command: &[u8]) -> Result<Bytes, TransportError> {
        (**self).do_transceive(command)
    }
}
