//! Error type for card-family reads

use farecard_apdu_core::{Error as ApduError, StatusWord, TransportError};

/// A read of one card failed
///
/// Only [`ReadError::Transport`] with a fatal cause should stop a reader
/// loop; everything else describes this card alone.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReadError {
    /// The physical channel failed
    #[error(transparent)]
    Transport(TransportError),

    /// The card refused an ISO 7816 command
    #[error("APDU error: {0}")]
    Apdu(ApduError),

    /// A FeliCa command was answered with something unusable
    #[error("FeliCa error: {0}")]
    Felica(String),

    /// A DESFire native command failed
    #[error("DESFire error: {0}")]
    Desfire(#[from] crate::desfire::DesfireError),

    /// A CEPAS command failed
    #[error("CEPAS error: {0}")]
    Cepas(StatusWord),

    /// No reader recognised the card
    #[error("Unsupported card")]
    UnsupportedCard,

    /// Other error with message
    #[error("{0}")]
    Other(String),
}

impl ReadError {
    /// Create a general other error
    pub fn other<S: Into<String>>(message: S) -> Self {
        Self::Other(message.into())
    }

    /// The transport failure behind this error, if any
    pub const fn transport(&self) -> Option<&TransportError> {
        match self {
            Self::Transport(e) => Some(e),
            Self::Desfire(crate::desfire::DesfireError::Transport(e)) => Some(e),
            _ => None,
        }
    }

    /// Check if the reader, not just this card, is unusable
    pub fn is_fatal(&self) -> bool {
        self.transport().is_some_and(TransportError::is_fatal)
    }

    /// Check if the card left the field during the read
    pub fn is_card_lost(&self) -> bool {
        self.transport().is_some_and(TransportError::is_card_lost)
    }
}

impl From<ApduError> for ReadError {
    fn from(error: ApduError) -> Self {
        match error {
            ApduError::Transport(e) => Self::Transport(e),
            other => Self::Apdu(other),
        }
    }
}

impl From<TransportError> for ReadError {
    fn from(error: TransportError) -> Self {
        Self::Transport(error)
    }
}

/// Result type for card reads
pub type Result<T> = std::result::Result<T, ReadError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_errors_are_unwrapped() {
        let err: ReadError = ApduError::Transport(TransportError::Device).into();
        assert_eq!(err, ReadError::Transport(TransportError::Device));
        assert!(err.is_fatal());

        let lost: ReadError = TransportError::CardLost.into();
        assert!(!lost.is_fatal());
        assert!(lost.is_card_lost());

        let refused: ReadError = ApduError::FileNotFound.into();
        assert!(!refused.is_fatal());
        assert_eq!(refused.transport(), None);
    }
}
