//! Error types for the PN533 transport

use bytes::Bytes;
use farecard_apdu_core::TransportError;

/// PN533 failure
#[derive(Debug, thiserror::Error)]
pub enum Pn533Error {
    /// USB device could not be opened or claimed
    #[error("USB error: {0}")]
    Usb(#[from] std::io::Error),

    /// A bulk transfer failed
    #[error("USB transfer failed: {0}")]
    Transfer(#[from] nusb::transfer::TransferError),

    /// No answer within the timeout
    #[error("Timed out waiting for the chip")]
    Timeout,

    /// No supported device is plugged in
    #[error("No PN533 device found")]
    DeviceNotFound,

    /// Bytes from the chip that do not form a frame
    #[error("Invalid frame: {0}")]
    InvalidFrame(&'static str),

    /// Something other than an ACK arrived after a command
    #[error("Expected ACK, got {}", hex::encode(.0))]
    UnexpectedAck(Bytes),

    /// The chip rejected the command (one-byte error frame)
    #[error("Chip command error 0x{0:02x}")]
    Command(u8),

    /// The chip answered a different command
    #[error("Response to 0x{got:02x}, expected 0x{expected:02x}")]
    UnexpectedResponse {
        /// Response code expected
        expected: u8,
        /// Response code received
        got: u8,
    },

    /// InDataExchange / InCommunicateThru reported an RF error
    #[error("RF status error 0x{0:02x}")]
    Status(u8),
}

/// Status byte the chip reports when a MIFARE authentication fails
pub const STATUS_MIFARE_AUTH: u8 = 0x14;

impl Pn533Error {
    /// Check if the USB link, not the card, failed
    pub const fn is_link_failure(&self) -> bool {
        matches!(
            self,
            Self::Usb(_) | Self::Transfer(_) | Self::Timeout | Self::DeviceNotFound
        )
    }
}

impl From<Pn533Error> for TransportError {
    fn from(error: Pn533Error) -> Self {
        match error {
            Pn533Error::Usb(_) | Pn533Error::Transfer(_) | Pn533Error::DeviceNotFound => {
                Self::Device
            }
            Pn533Error::Timeout => Self::Timeout,
            Pn533Error::InvalidFrame(_)
            | Pn533Error::UnexpectedAck(_)
            | Pn533Error::UnexpectedResponse { .. } => Self::Transmission,
            // The RF exchange failed: the card went away or never answered
            Pn533Error::Status(_) => Self::CardLost,
            Pn533Error::Command(code) => Self::Other(format!("chip command error 0x{code:02x}")),
        }
    }
}

/// Result type for PN533 operations
pub type Result<T> = std::result::Result<T, Pn533Error>;
