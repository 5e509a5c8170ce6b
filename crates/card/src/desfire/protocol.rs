//! MIFARE DESFire native commands wrapped in ISO 7816 APDUs

use bytes::{Bytes, BytesMut};
use farecard_apdu_core::command::CLASS_90;
use farecard_apdu_core::{Command, Transceiver, TransportError};
use tracing::trace;

const GET_MANUFACTURING_DATA: u8 = 0x60;
const GET_APPLICATION_DIRECTORY: u8 = 0x6A;
const GET_ADDITIONAL_FRAME: u8 = 0xAF;
const SELECT_APPLICATION: u8 = 0x5A;
const READ_DATA: u8 = 0xBD;
const READ_RECORD: u8 = 0xBB;
const GET_VALUE: u8 = 0x6C;
const GET_FILES: u8 = 0x6F;
const GET_FILE_SETTINGS: u8 = 0xF5;

const OPERATION_OK: u8 = 0x00;
const PERMISSION_DENIED: u8 = 0x9D;
const AID_NOT_FOUND: u8 = 0xA0;
const AUTHENTICATION_ERROR: u8 = 0xAE;
const ADDITIONAL_FRAME: u8 = 0xAF;
const FILE_NOT_FOUND: u8 = 0xF0;

/// Wrapped responses carry this SW1
const SW1_DESFIRE: u8 = 0x91;

/// Size of the GetVersion answer
const MANUFACTURING_DATA_LEN: usize = 28;

/// DESFire command errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DesfireError {
    /// The physical channel failed
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The answer was not a DESFire status frame
    #[error("Invalid response")]
    InvalidResponse,

    /// Status 9D
    #[error("Permission denied")]
    PermissionDenied,

    /// Status AE
    #[error("Authentication error")]
    AuthenticationError,

    /// Status A0
    #[error("AID not found")]
    AidNotFound,

    /// Status F0
    #[error("File not found")]
    FileNotFound,

    /// Any other status
    #[error("Unknown status code: {0:02x}")]
    UnknownStatus(u8),

    /// File settings name a type this reader does not know
    #[error("Unknown file type: {0}")]
    UnknownFileType(u8),
}

impl DesfireError {
    /// Check if the card wants authentication first
    pub const fn is_unauthorized(&self) -> bool {
        matches!(self, Self::PermissionDenied | Self::AuthenticationError)
    }

    /// Check if the application or file does not exist
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::AidNotFound | Self::FileNotFound)
    }
}

/// Result type for DESFire commands
pub type Result<T> = std::result::Result<T, DesfireError>;

/// DESFire native command channel
#[derive(Debug)]
pub struct DesfireProtocol<T: Transceiver> {
    transceiver: T,
}

impl<T: Transceiver> DesfireProtocol<T> {
    /// Wrap a transceiver
    pub const fn new(transceiver: T) -> Self {
        Self { transceiver }
    }

    /// Send one native command, following additional frames
    pub fn send(&mut self, command: u8, params: &[u8]) -> Result<Bytes> {
        let mut output = BytesMut::new();
        let mut apdu = Command::new(CLASS_90, command, 0x00, 0x00)
            .with_data(Bytes::copy_from_slice(params))
            .to_bytes();

        loop {
            let response = self.transceiver.transceive(&apdu)?;
            let [body @ .., sw1, status] = response.as_ref() else {
                return Err(DesfireError::InvalidResponse);
            };
            if *sw1 != SW1_DESFIRE {
                return Err(DesfireError::InvalidResponse);
            }
            output.extend_from_slice(body);

            match *status {
                OPERATION_OK => return Ok(output.freeze()),
                ADDITIONAL_FRAME => {
                    trace!(command, received = output.len(), "Fetching additional frame");
                    apdu = Command::new(CLASS_90, GET_ADDITIONAL_FRAME, 0x00, 0x00).to_bytes();
                }
                PERMISSION_DENIED => return Err(DesfireError::PermissionDenied),
                AUTHENTICATION_ERROR => return Err(DesfireError::AuthenticationError),
                AID_NOT_FOUND => return Err(DesfireError::AidNotFound),
                FILE_NOT_FOUND => return Err(DesfireError::FileNotFound),
                other => return Err(DesfireError::UnknownStatus(other)),
            }
        }
    }

    /// GetVersion: hardware, software and production data
    pub fn manufacturing_data(&mut self) -> Result<Bytes> {
        let data = self.send(GET_MANUFACTURING_DATA, &[])?;
        if data.len() != MANUFACTURING_DATA_LEN {
            return Err(DesfireError::InvalidResponse);
        }
        Ok(data)
    }

    /// Application ids on the card
    pub fn application_ids(&mut self) -> Result<Vec<u32>> {
        let data = self.send(GET_APPLICATION_DIRECTORY, &[])?;
        Ok(data
            .chunks_exact(3)
            .map(|id| u32::from_be_bytes([0, id[0], id[1], id[2]]))
            .collect())
    }

    /// Select an application by id
    pub fn select_application(&mut self, app_id: u32) -> Result<()> {
        let [_, a, b, c] = app_id.to_be_bytes();
        self.send(SELECT_APPLICATION, &[a, b, c]).map(|_| ())
    }

    /// File ids of the selected application
    pub fn file_ids(&mut self) -> Result<Vec<u8>> {
        Ok(self.send(GET_FILES, &[])?.to_vec())
    }

    /// Raw file settings
    pub fn file_settings(&mut self, file_id: u8) -> Result<Bytes> {
        self.send(GET_FILE_SETTINGS, &[file_id])
    }

    /// Whole contents of a standard or backup data file
    pub fn read_data(&mut self, file_id: u8) -> Result<Bytes> {
        self.send(READ_DATA, &[file_id, 0, 0, 0, 0, 0, 0])
    }

    /// All records of a linear or cyclic record file
    pub fn read_record(&mut self, file_id: u8) -> Result<Bytes> {
        self.send(READ_RECORD, &[file_id, 0, 0, 0, 0, 0, 0])
    }

    /// Current value of a value file
    pub fn get_value(&mut self, file_id: u8) -> Result<Bytes> {
        self.send(GET_VALUE, &[file_id])
    }
}
