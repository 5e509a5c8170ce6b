//! PN533 host frame codec
//!
//! - normal: `00 00 FF LEN LCS TFI CMD DATA.. DCS 00`
//! - extended: `00 00 FF FF FF LENH LENL LCS TFI CMD DATA.. DCS 00`
//! - ACK: `00 00 FF 00 FF 00`
//!
//! A payload of one byte is an error frame.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Pn533Error, Result};

/// Frame identifier, host to chip
pub const TFI_HOST: u8 = 0xD4;
/// Frame identifier, chip to host
pub const TFI_CHIP: u8 = 0xD5;

/// ACK frame, sent both ways
pub const ACK: [u8; 6] = [0x00, 0x00, 0xFF, 0x00, 0xFF, 0x00];

/// Largest frame the chip sends or accepts
pub const MAX_FRAME_SIZE: usize = 265;

const START: [u8; 3] = [0x00, 0x00, 0xFF];

/// Largest payload a normal frame carries
const NORMAL_MAX: usize = 254;

/// A decoded frame from the chip
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Command acknowledged
    Ack,
    /// Error frame with the chip's error code
    Error(u8),
    /// Response: command code plus data
    Response {
        /// Response code, command code + 1
        code: u8,
        /// Data after the response code
        data: Bytes,
    },
}

fn checksum(bytes: &[u8]) -> u8 {
    bytes
        .iter()
        .fold(0u8, |acc, b| acc.wrapping_add(*b))
        .wrapping_neg()
}

fn wrap(payload: &[&[u8]]) -> Bytes {
    let len: usize = payload.iter().map(|part| part.len()).sum();
    let mut frame = BytesMut::with_capacity(len + 10);
    frame.put_slice(&START);

    if len <= NORMAL_MAX {
        frame.put_u8(len as u8);
        frame.put_u8((len as u8).wrapping_neg());
    } else {
        let [hi, lo] = (len as u16).to_be_bytes();
        frame.put_slice(&[0xFF, 0xFF, hi, lo, checksum(&[hi, lo])]);
    }

    let body_start = frame.len();
    for part in payload {
        frame.put_slice(part);
    }
    let dcs = checksum(&frame[body_start..]);
    frame.put_u8(dcs);
    frame.put_u8(0x00);
    frame.freeze()
}

/// Frame a command for the chip
pub fn encode(command: u8, data: &[u8]) -> Bytes {
    wrap(&[&[TFI_HOST, command], data])
}

/// Frame a response as the chip would send it
pub fn encode_response(code: u8, data: &[u8]) -> Bytes {
    wrap(&[&[TFI_CHIP, code], data])
}

/// Frame a chip error code
pub fn encode_error(code: u8) -> Bytes {
    wrap(&[&[code]])
}

/// Checked payload of a normal or extended frame
fn payload(buf: &[u8]) -> Result<&[u8]> {
    if buf.len() < 6 || buf[..3] != START {
        return Err(Pn533Error::InvalidFrame("bad preamble"));
    }

    let (len, body_start) = if buf[3] == 0xFF && buf[4] == 0xFF {
        let header = buf
            .get(5..8)
            .ok_or(Pn533Error::InvalidFrame("short extended header"))?;
        if checksum(&header[..2]) != header[2] {
            return Err(Pn533Error::InvalidFrame("bad length checksum"));
        }
        (u16::from_be_bytes([header[0], header[1]]) as usize, 8)
    } else {
        if buf[3].wrapping_add(buf[4]) != 0 {
            return Err(Pn533Error::InvalidFrame("bad length checksum"));
        }
        (buf[3] as usize, 5)
    };

    let payload = buf
        .get(body_start..body_start + len)
        .ok_or(Pn533Error::InvalidFrame("truncated"))?;
    let &dcs = buf
        .get(body_start + len)
        .ok_or(Pn533Error::InvalidFrame("missing data checksum"))?;
    if checksum(payload) != dcs {
        return Err(Pn533Error::InvalidFrame("bad data checksum"));
    }
    Ok(payload)
}

/// Decode one frame read from the chip
pub fn decode(buf: &[u8]) -> Result<Frame> {
    if buf.starts_with(&ACK) {
        return Ok(Frame::Ack);
    }

    match payload(buf)? {
        [code] => Ok(Frame::Error(*code)),
        [TFI_CHIP, code, data @ ..] => Ok(Frame::Response {
            code: *code,
            data: Bytes::copy_from_slice(data),
        }),
        _ => Err(Pn533Error::InvalidFrame("bad frame identifier")),
    }
}

/// Decode a host command frame into its command code and data
pub fn decode_command(buf: &[u8]) -> Result<(u8, Bytes)> {
    match payload(buf)? {
        [TFI_HOST, code, data @ ..] => Ok((*code, Bytes::copy_from_slice(data))),
        _ => Err(Pn533Error::InvalidFrame("bad frame identifier")),
    }
}
