//! Error types for PC/SC transport

use farecard_apdu_core::{StatusWord, TransportError};

/// PC/SC-specific errors
#[derive(Debug, thiserror::Error)]
pub enum PcscError {
    /// PC/SC error
    #[error("PC/SC error: {0}")]
    Pcsc(#[from] pcsc::Error),

    /// No readers available
    #[error("No readers available")]
    NoReadersAvailable,

    /// Reader not found
    #[error("Reader not found: {0}")]
    ReaderNotFound(String),

    /// No card present in reader
    #[error("No card present in reader: {0}")]
    NoCard(String),

    /// Card was reset or removed mid-exchange
    #[error("Card was removed")]
    CardRemoved,

    /// The reader would not report the UID
    #[error("GET DATA (UID) refused with {0}")]
    UidUnavailable(StatusWord),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl From<PcscError> for TransportError {
    fn from(error: PcscError) -> Self {
        match error {
            PcscError::Pcsc(e) => match e {
                pcsc::Error::ResetCard
                | pcsc::Error::RemovedCard
                | pcsc::Error::NoSmartcard
                | pcsc::Error::UnpoweredCard
                | pcsc::Error::UnresponsiveCard => Self::CardLost,
                pcsc::Error::Timeout => Self::Timeout,
                pcsc::Error::Cancelled => Self::Cancelled,
                pcsc::Error::InsufficientBuffer => Self::BufferTooSmall,
                pcsc::Error::NoReadersAvailable
                | pcsc::Error::UnknownReader
                | pcsc::Error::ReaderUnavailable
                | pcsc::Error::NoService
                | pcsc::Error::ServiceStopped => Self::Device,
                pcsc::Error::CommError => Self::Transmission,
                other => Self::Other(other.to_string()),
            },
            PcscError::NoReadersAvailable | PcscError::ReaderNotFound(_) => Self::Device,
            PcscError::NoCard(_) | PcscError::CardRemoved => Self::CardLost,
            PcscError::UidUnavailable(sw) => Self::Other(format!("UID unavailable: {sw}")),
            PcscError::Other(message) => Self::Other(message),
        }
    }
}
