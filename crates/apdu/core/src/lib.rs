//! Core traits and types for APDU (Application Protocol Data Unit) exchange
//!
//! This crate provides the foundational types for talking to contactless smart cards
//! according to ISO/IEC 7816-4.
//!
//! ## Overview
//!
//! - [`Transceiver`]: one command buffer in, one response buffer out, for a single
//!   physical card on a single hardware channel
//! - [`Command`]: APDU framing (`CLA INS P1 P2 [Lc data] Le`)
//! - [`StatusWord`]: interpretation of the trailing SW1/SW2 bytes
//! - [`Iso7816Protocol`]: status-word policy, wrong-length retry and the derived
//!   SELECT / READ RECORD / READ BINARY operations
//!
//! Errors are split into fatal [`TransportError`]s and recoverable status-driven
//! [`Error`] variants so that callers can treat "no data here" and "end of file"
//! as ordinary control flow.
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![forbid(unsafe_code)]
#![warn(missing_docs, rustdoc::missing_crate_level_docs)]

// Re-export bytes for convenience
pub use bytes::{Bytes, BytesMut};

// Main modules
pub mod command;
pub mod protocol;
pub mod response;
pub mod transport;

// Core error types
mod error;
pub use error::{Error, Result};

// Re-exports for common types
pub use command::Command;
pub use protocol::Iso7816Protocol;
pub use response::status::StatusWord;
pub use response::{Response, utils};
pub use transport::{Transceiver, TransportError};

#[cfg(any(test, feature = "mock"))]
pub use transport::mock::MockTransceiver;

/// Prelude module containing commonly used traits and types
pub mod prelude {
    pub use crate::{
        Bytes, BytesMut, Command, Error, Iso7816Protocol, Response, Result, StatusWord,
        Transceiver, TransportError,
    };
}
