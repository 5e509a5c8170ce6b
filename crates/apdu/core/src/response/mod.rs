//! APDU response parsing
//!
//! A response is `body || SW1 || SW2`.

pub mod status;
pub mod utils;

use bytes::Bytes;

use crate::error::Error;
use status::StatusWord;

/// A parsed APDU response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    payload: Bytes,
    status: StatusWord,
}

impl Response {
    /// Create a response from its parts
    pub fn new(payload: impl Into<Bytes>, status: impl Into<StatusWord>) -> Self {
        Self {
            payload: payload.into(),
            status: status.into(),
        }
    }

    /// Split raw response bytes into body and status word
    pub fn from_bytes(data: &[u8]) -> Result<Self, Error> {
        let (status, payload) = utils::extract_status_and_payload(data)?;
        Ok(Self {
            payload: Bytes::copy_from_slice(payload),
            status,
        })
    }

    /// Response body without the status word
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Status word
    pub const fn status(&self) -> StatusWord {
        self.status
    }

    /// Consume the response, returning the body
    pub fn into_payload(self) -> Bytes {
        self.payload
    }
}

impl TryFrom<&[u8]> for Response {
    type Error = Error;

    fn try_from(data: &[u8]) -> Result<Self, Self::Error> {
        Self::from_bytes(data)
    }
}
