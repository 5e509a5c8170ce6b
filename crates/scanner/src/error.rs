//! Errors reported on the scan event stream

use farecard_apdu_core::TransportError;
use farecard_apdu_transport_pcsc::PcscError;
use farecard_apdu_transport_pn533::Pn533Error;
use farecard_card::ReadError;

/// Something went wrong while scanning
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScanError {
    /// Reading one card failed; the backend keeps polling
    #[error("Read failed: {0}")]
    Read(#[from] ReadError),

    /// The reader channel failed
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Every backend exited while the scan was still running
    #[error("No reader hardware found")]
    NoBackendAvailable,

    /// A backend could not start or stopped with an error
    #[error("{backend}: {reason}")]
    Backend {
        /// Backend name
        backend: String,
        /// What happened
        reason: String,
    },
}

impl ScanError {
    /// Create a backend error
    pub fn backend(backend: impl Into<String>, reason: impl ToString) -> Self {
        Self::Backend {
            backend: backend.into(),
            reason: reason.to_string(),
        }
    }

    /// Check if the backend that produced this error must stop
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Read(e) => e.is_fatal(),
            Self::Transport(e) => e.is_fatal(),
            Self::NoBackendAvailable => false,
            Self::Backend { .. } => true,
        }
    }
}

impl From<PcscError> for ScanError {
    fn from(error: PcscError) -> Self {
        Self::Transport(error.into())
    }
}

impl From<Pn533Error> for ScanError {
    fn from(error: Pn533Error) -> Self {
        Self::Transport(error.into())
    }
}

/// Result type for scanner operations
pub type Result<T> = std::result::Result<T, ScanError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatality() {
        assert!(!ScanError::from(TransportError::CardLost).is_fatal());
        assert!(ScanError::from(TransportError::Device).is_fatal());
        assert!(!ScanError::Read(ReadError::UnsupportedCard).is_fatal());
        assert!(ScanError::backend("PN533", "device not found").is_fatal());
        assert!(!ScanError::from(Pn533Error::Status(0x01)).is_fatal());
    }
}
