//! Utility functions for APDU response handling

use tracing::debug;

use crate::error::Error;
use crate::response::status::StatusWord;

/// Extract status word (SW1, SW2) and payload from raw APDU response data
///
/// # Errors
/// Returns [`Error::MalformedResponse`] if the data is too short to contain a status word.
pub fn extract_response_parts(data: &[u8]) -> Result<((u8, u8), &[u8]), Error> {
    if data.len() < 2 {
        debug!("Response too short: {} bytes", data.len());
        return Err(Error::MalformedResponse(data.len()));
    }

    let len = data.len();
    let sw1 = data[len - 2];
    let sw2 = data[len - 1];

    Ok(((sw1, sw2), &data[..len - 2]))
}

/// Extract status word as a StatusWord object and payload from raw APDU response data
pub fn extract_status_and_payload(data: &[u8]) -> Result<(StatusWord, &[u8]), Error> {
    let ((sw1, sw2), payload) = extract_response_parts(data)?;
    Ok((StatusWord::new(sw1, sw2), payload))
}
