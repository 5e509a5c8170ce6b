//! APDU command definitions
//!
//! Commands are always sent with an Le byte. An Le of 0 asks the card for
//! as much as it has (up to 256 bytes).

use bytes::{BufMut, Bytes, BytesMut};

/// ISO 7816 inter-industry class
pub const CLASS_ISO7816: u8 = 0x00;
/// Proprietary class used by Chinese transit cards
pub const CLASS_80: u8 = 0x80;
/// Proprietary class used by KS X 6924, DESFire and CEPAS wrapping
pub const CLASS_90: u8 = 0x90;

/// SELECT
pub const INS_SELECT: u8 = 0xA4;
/// READ BINARY
pub const INS_READ_BINARY: u8 = 0xB0;
/// READ RECORD
pub const INS_READ_RECORD: u8 = 0xB2;

/// Generic APDU command structure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Command class byte
    pub cla: u8,
    /// Instruction byte
    pub ins: u8,
    /// Parameter 1
    pub p1: u8,
    /// Parameter 2
    pub p2: u8,
    /// Command data, empty when there is none
    pub data: Bytes,
    /// Expected length
    pub le: u8,
}

impl Command {
    /// Create a new command with just the header bytes and Le = 0
    pub const fn new(cla: u8, ins: u8, p1: u8, p2: u8) -> Self {
        Self {
            cla,
            ins,
            p1,
            p2,
            data: Bytes::new(),
            le: 0,
        }
    }

    /// Set the data field
    pub fn with_data<T: Into<Bytes>>(mut self, data: T) -> Self {
        self.data = data.into();
        self
    }

    /// Set the expected length field
    pub const fn with_le(mut self, le: u8) -> Self {
        self.le = le;
        self
    }

    /// Calculate length of serialized command
    pub fn command_length(&self) -> usize {
        let lc = if self.data.is_empty() {
            0
        } else {
            1 + self.data.len()
        };
        4 + lc + 1
    }

    /// Convert to raw APDU bytes
    pub fn to_bytes(&self) -> Bytes {
        let mut buffer = BytesMut::with_capacity(self.command_length());

        // Header: CLA, INS, P1, P2
        buffer.put_u8(self.cla);
        buffer.put_u8(self.ins);
        buffer.put_u8(self.p1);
        buffer.put_u8(self.p2);

        // Lc and data only when there is data
        if !self.data.is_empty() {
            buffer.put_u8(self.data.len() as u8);
            buffer.put_slice(&self.data);
        }

        buffer.put_u8(self.le);

        buffer.freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn test_header_only_command() {
        let cmd = Command::new(CLASS_ISO7816, INS_SELECT, 0x00, 0x00);
        assert_eq!(cmd.to_bytes().as_ref(), &hex!("00A4000000"));
        assert_eq!(cmd.command_length(), 5);
    }

    #[test]
    fn test_command_with_data() {
        let cmd = Command::new(CLASS_ISO7816, INS_SELECT, 0x04, 0x00)
            .with_data(Bytes::from_static(&hex!("D4100000030001")));
        assert_eq!(cmd.to_bytes().as_ref(), &hex!("00A4040007D410000003000100"));
    }

    #[test]
    fn test_command_with_le() {
        let cmd = Command::new(CLASS_80, 0x5C, 0x01, 0x02).with_le(4);
        assert_eq!(cmd.to_bytes().as_ref(), &hex!("805C010204"));
    }
}
