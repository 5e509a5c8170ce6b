//! Core error type for all APDU operations
//!
//! The variants mirror the ISO 7816-4 status-word taxonomy. Only
//! [`Error::Transport`] is fatal; every other variant describes how a single
//! command was refused by the card and is recoverable at the call site.

use crate::response::status::StatusWord;
use crate::transport::TransportError;

/// Core error type that encompasses all possible errors in the crate
#[derive(Debug, Clone, Eq, PartialEq, thiserror::Error)]
pub enum Error {
    //
    // Transport related errors
    //
    /// The physical channel failed
    #[error(transparent)]
    Transport(#[from] TransportError),

    //
    // Response related errors
    //
    /// The card answered with fewer than two bytes
    #[error("Malformed response: got {0} byte(s), expected at least a status word")]
    MalformedResponse(usize),

    //
    // Status word errors
    //
    /// Command not allowed (69 XX)
    #[error("Command not allowed: {0}")]
    CommandNotAllowed(StatusWord),

    /// Command not allowed, no current elementary file (69 86)
    #[error("No current elementary file")]
    NoCurrentElementaryFile,

    /// Command not allowed, security status not satisfied (69 82)
    #[error("Security status not satisfied")]
    SecurityStatusNotSatisfied,

    /// Wrong parameters (6A XX)
    #[error("Wrong parameters: {0}")]
    WrongParameters(StatusWord),

    /// Wrong parameters, file not found (6A 82)
    #[error("File not found")]
    FileNotFound,

    /// Wrong parameters, record not found (6A 83)
    #[error("End of file")]
    EndOfFile,

    /// Instruction code not supported (6D 00)
    #[error("Instruction not supported")]
    InstructionNotSupported,

    /// Class not supported (6E 00)
    #[error("Class not supported")]
    ClassNotSupported,

    /// Any other non-success status word
    #[error("Protocol error {0}: {desc}", desc = .0.description())]
    Protocol(StatusWord),
}

impl Error {
    /// Map a non-success status word to its error kind
    pub const fn from_status(status: StatusWord) -> Self {
        match (status.sw1, status.sw2) {
            (0x69, 0x86) => Self::NoCurrentElementaryFile,
            (0x69, 0x82) => Self::SecurityStatusNotSatisfied,
            (0x69, _) => Self::CommandNotAllowed(status),
            (0x6A, 0x82) => Self::FileNotFound,
            (0x6A, 0x83) => Self::EndOfFile,
            (0x6A, _) => Self::WrongParameters(status),
            (0x6D, 0x00) => Self::InstructionNotSupported,
            (0x6E, 0x00) => Self::ClassNotSupported,
            _ => Self::Protocol(status),
        }
    }

    /// Check if this error came from the transport and must unwind the caller
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// Check if the reader, not just the card, is unusable
    pub const fn is_fatal(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_fatal(),
            _ => false,
        }
    }

    /// Check if this error is the record-scan terminator
    pub const fn is_end_of_file(&self) -> bool {
        matches!(self, Self::EndOfFile)
    }

    /// The status word behind this error, when the card sent one
    pub const fn status(&self) -> Option<StatusWord> {
        match self {
            Self::Transport(_) | Self::MalformedResponse(_) => None,
            Self::CommandNotAllowed(sw) | Self::WrongParameters(sw) | Self::Protocol(sw) => {
                Some(*sw)
            }
            Self::NoCurrentElementaryFile => Some(StatusWord::new(0x69, 0x86)),
            Self::SecurityStatusNotSatisfied => Some(StatusWord::new(0x69, 0x82)),
            Self::FileNotFound => Some(StatusWord::new(0x6A, 0x82)),
            Self::EndOfFile => Some(StatusWord::new(0x6A, 0x83)),
            Self::InstructionNotSupported => Some(StatusWord::new(0x6D, 0x00)),
            Self::ClassNotSupported => Some(StatusWord::new(0x6E, 0x00)),
        }
    }
}

/// Result type for APDU operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status_refinements() {
        let cases = [
            ((0x69, 0x86), Error::NoCurrentElementaryFile),
            ((0x69, 0x82), Error::SecurityStatusNotSatisfied),
            ((0x6A, 0x82), Error::FileNotFound),
            ((0x6A, 0x83), Error::EndOfFile),
            ((0x6D, 0x00), Error::InstructionNotSupported),
            ((0x6E, 0x00), Error::ClassNotSupported),
        ];
        for ((sw1, sw2), expected) in cases {
            let status = StatusWord::new(sw1, sw2);
            assert_eq!(Error::from_status(status), expected);
            assert_eq!(expected.status(), Some(status));
        }
    }

    #[test]
    fn test_from_status_fallbacks() {
        let sw = StatusWord::new(0x69, 0x85);
        assert_eq!(Error::from_status(sw), Error::CommandNotAllowed(sw));

        let sw = StatusWord::new(0x6A, 0x86);
        assert_eq!(Error::from_status(sw), Error::WrongParameters(sw));

        // 6D/6E only refine with a zero SW2
        let sw = StatusWord::new(0x6D, 0x01);
        assert_eq!(Error::from_status(sw), Error::Protocol(sw));
        let sw = StatusWord::new(0x6E, 0x10);
        assert_eq!(Error::from_status(sw), Error::Protocol(sw));

        let sw = StatusWord::new(0x65, 0x81);
        let err = Error::from_status(sw);
        assert_eq!(err, Error::Protocol(sw));
        assert_eq!(err.to_string(), "Protocol error 65 81: Memory failure");
    }

    #[test]
    fn test_transport_is_fatal() {
        let err: Error = TransportError::CardLost.into();
        assert!(err.is_transport());
        assert!(!Error::EndOfFile.is_transport());
        assert!(Error::EndOfFile.is_end_of_file());
        assert_eq!(err.status(), None);
    }
}
