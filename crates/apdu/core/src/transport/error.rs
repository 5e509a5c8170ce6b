//! Error types specific to card transport

use thiserror::Error;

/// Transport error type
///
/// Any of these means the physical channel is gone or out of sync. Callers
/// do not retry; the owning reader loop unwinds.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Connection error
    #[error("Failed to connect to device")]
    Connection,

    /// Transmission error
    #[error("Failed to transmit data")]
    Transmission,

    /// Device error
    #[error("Device error")]
    Device,

    /// Buffer too small
    #[error("Buffer too small")]
    BufferTooSmall,

    /// The card left the field or was reset mid-exchange
    #[error("Card lost")]
    CardLost,

    /// Timeout error
    #[error("Operation timed out")]
    Timeout,

    /// Cancelled operation
    #[error("Operation cancelled")]
    Cancelled,

    /// Other error with message
    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// Create a general other error
    pub fn other<S: Into<String>>(message: S) -> Self {
        Self::Other(message.into())
    }

    /// Check if the card rather than the reader went away
    pub const fn is_card_lost(&self) -> bool {
        matches!(self, Self::CardLost)
    }

    /// Check if the reader itself is unusable
    ///
    /// A lost card ends the current read but leaves the reader able to poll
    /// for the next one.
    pub const fn is_fatal(&self) -> bool {
        !self.is_card_lost()
    }
}
