//! BER-TLV iteration
//!
//! Iteration follows the layout of file control information: the first
//! top-level tag is treated as a container and its children are yielded.
//! Multi-head mode moves on to the next top-level container afterwards.

use tracing::trace;

/// Largest content length accepted
const MAX_FIELD_LENGTH: u64 = 0xFFFF;

/// One decoded BER-TLV element, borrowing from the source buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tlv<'a> {
    id: &'a [u8],
    header_len: usize,
    raw: &'a [u8],
}

impl<'a> Tlv<'a> {
    /// Tag identifier octets
    pub const fn id(&self) -> &'a [u8] {
        self.id
    }

    /// Identifier and length octets
    pub fn header(&self) -> &'a [u8] {
        &self.raw[..self.header_len]
    }

    /// Contents octets
    pub fn data(&self) -> &'a [u8] {
        &self.raw[self.header_len..]
    }

    /// Header followed by data, as it appears in the buffer
    pub const fn raw(&self) -> &'a [u8] {
        self.raw
    }

    /// Check if the tag is a constructed template (A0..BF)
    pub fn is_constructed(&self) -> bool {
        is_constructed(self.id)
    }
}

/// Check if a tag identifier names a constructed template (A0..BF)
pub fn is_constructed(id: &[u8]) -> bool {
    id.first().is_some_and(|b| b & 0xE0 == 0xA0)
}

/// Number of identifier octets for the tag starting at `p`
///
/// A truncated multi-byte tag reports a length running past the buffer end.
fn id_len(buf: &[u8], p: usize) -> usize {
    if buf[p] & 0x1F != 0x1F {
        return 1;
    }

    let mut len = 1;
    loop {
        let Some(b) = buf.get(p + len) else {
            return len + 1;
        };
        len += 1;
        if b & 0x80 == 0 {
            return len;
        }
    }
}

/// Decoded length octets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Length {
    /// Number of length octets
    octets: usize,
    /// Number of contents octets
    content: usize,
    /// Number of end-of-contents octets
    eoc: usize,
}

fn decode_len(buf: &[u8], p: usize) -> Option<Length> {
    let head = *buf.get(p)?;
    if head & 0x80 == 0 {
        return Some(Length {
            octets: 1,
            content: (head & 0x7F) as usize,
            eoc: 0,
        });
    }

    let following = (head & 0x7F) as usize;
    if following == 0 {
        // Indefinite form, terminated by 00 00
        let start = p + 1;
        let end = buf
            .get(start..)?
            .windows(2)
            .position(|w| w == [0, 0])?
            + start;
        return Some(Length {
            octets: 1,
            content: end - p - 1,
            eoc: 2,
        });
    }

    let octets = buf.get(p + 1..p + 1 + following)?;
    if following >= 8 {
        // Everything above the low 8 bytes must be zero, and so must the top
        // bit of the 8th-to-last byte.
        let (top, low) = octets.split_at(following - 8);
        if top.iter().any(|&b| b != 0) || low.get(1).is_some_and(|b| b & 0x80 != 0) {
            return None;
        }
    }

    let mut content: u64 = 0;
    for &b in octets {
        content = (content << 8) | b as u64;
        if content > MAX_FIELD_LENGTH {
            trace!(offset = p, "TLV length exceeds limit");
            return None;
        }
    }

    Some(Length {
        octets: 1 + following,
        content: content as usize,
        eoc: 0,
    })
}

/// Slice that is truncated at the buffer end instead of failing
///
/// Only an offset past the end yields `None`.
fn slice_safe(buf: &[u8], offset: usize, len: usize) -> Option<&[u8]> {
    if offset > buf.len() {
        return None;
    }
    let end = offset.saturating_add(len).min(buf.len());
    Some(&buf[offset..end])
}

/// Lazy BER-TLV iterator
///
/// Cloning the iterator, or building a new one over the same buffer, restarts
/// from the beginning.
#[derive(Debug, Clone)]
pub struct BerTlv<'a> {
    buf: &'a [u8],
    multihead: bool,
    pos: usize,
    /// End of the container currently being walked
    container_end: Option<usize>,
    done: bool,
}

impl<'a> BerTlv<'a> {
    /// Iterate the children of the first top-level container
    pub const fn new(buf: &'a [u8]) -> Self {
        Self::with_multihead(buf, false)
    }

    /// Iterate the children of every top-level container in turn
    pub const fn multihead(buf: &'a [u8]) -> Self {
        Self::with_multihead(buf, true)
    }

    /// Choose single or multi-head iteration
    pub const fn with_multihead(buf: &'a [u8], multihead: bool) -> Self {
        Self {
            buf,
            multihead,
            pos: 0,
            container_end: None,
            done: false,
        }
    }

    /// Enter the next top-level container, skipping its header
    fn open_container(&mut self) -> bool {
        let buf = self.buf;
        let Some(start) = buf[self.pos..].iter().position(|&b| b != 0) else {
            return false;
        };
        let mut p = self.pos + start;

        p += id_len(buf, p);
        let Some(len) = decode_len(buf, p) else {
            return false;
        };
        p += len.octets;

        self.pos = p;
        self.container_end = Some(p + len.content);
        true
    }
}

impl<'a> Iterator for BerTlv<'a> {
    type Item = Tlv<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let buf = self.buf;
        while !self.done {
            let Some(end) = self.container_end else {
                if self.pos >= buf.len() || !self.open_container() {
                    self.done = true;
                }
                continue;
            };

            if self.pos >= end {
                self.container_end = None;
                if !self.multihead {
                    self.done = true;
                }
                continue;
            }

            let p = self.pos;
            if buf.get(p).is_none_or(|&b| b == 0) {
                if p >= buf.len() {
                    self.done = true;
                } else {
                    self.pos += 1;
                }
                continue;
            }

            let idlen = id_len(buf, p);
            if p + idlen >= buf.len() {
                self.done = true;
                continue;
            }

            let Some(len) = decode_len(buf, p + idlen) else {
                // Malformed child: leave the container and let multi-head
                // mode resume from here.
                self.container_end = None;
                if !self.multihead {
                    self.done = true;
                }
                continue;
            };

            let header_len = idlen + len.octets;
            let Some(raw) = slice_safe(buf, p, header_len + len.content) else {
                self.done = true;
                continue;
            };
            if raw.len() < header_len {
                self.done = true;
                continue;
            }

            self.pos = p + header_len + len.content + len.eoc;
            return Some(Tlv {
                id: &buf[p..p + idlen],
                header_len,
                raw,
            });
        }
        None
    }
}

/// Find the first element with the given tag
///
/// With `keep_header` the identifier and length octets are returned along with
/// the contents.
pub fn find<'a>(
    buf: &'a [u8],
    tag: &[u8],
    keep_header: bool,
    multihead: bool,
) -> Option<&'a [u8]> {
    BerTlv::with_multihead(buf, multihead)
        .find(|t| t.id() == tag)
        .map(|t| if keep_header { t.raw() } else { t.data() })
}

/// [`find`] with the tag given as a hex literal such as `"a5"` or `"bf0c"`
pub fn find_hex<'a>(buf: &'a [u8], tag: &str, keep_header: bool) -> Option<&'a [u8]> {
    let tag = hex::decode(tag).ok()?;
    find(buf, &tag, keep_header, false)
}

/// Every element with the given tag, in document order
pub fn find_repeated<'a, 't>(
    buf: &'a [u8],
    tag: &'t [u8],
    keep_header: bool,
) -> impl Iterator<Item = &'a [u8]> {
    BerTlv::new(buf)
        .filter(move |t| t.id() == tag)
        .map(move |t| if keep_header { t.raw() } else { t.data() })
}

/// Strip the identifier and length octets of the leading element
///
/// Returns an empty slice when the length cannot be decoded.
pub fn remove_header(buf: &[u8]) -> &[u8] {
    if buf.is_empty() {
        return buf;
    }
    let p = id_len(buf, 0);
    decode_len(buf, p)
        .and_then(|len| slice_safe(buf, p + len.octets, len.content))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn test_id_len() {
        assert_eq!(id_len(&hex!("50"), 0), 1);
        assert_eq!(id_len(&hex!("9f08"), 0), 2);
        assert_eq!(id_len(&hex!("bf8c01"), 0), 3);
        // Truncated multi-byte tag runs past the end
        assert!(id_len(&hex!("9f"), 0) > 1);
    }

    #[test]
    fn test_decode_len_forms() {
        let short = decode_len(&hex!("0e"), 0).unwrap();
        assert_eq!((short.octets, short.content, short.eoc), (1, 14, 0));

        let long = decode_len(&hex!("82010a"), 0).unwrap();
        assert_eq!((long.octets, long.content), (3, 0x10a));

        let indefinite = decode_len(&hex!("80aabb0000"), 0).unwrap();
        assert_eq!((indefinite.octets, indefinite.content, indefinite.eoc), (1, 2, 2));

        assert_eq!(decode_len(&hex!("80aabb"), 0), None);
        assert_eq!(decode_len(&hex!("83010000"), 0), None);
        assert_eq!(decode_len(&hex!("82ff"), 0), None);
    }

    #[test]
    fn test_slice_safe() {
        let buf = hex!("010203");
        assert_eq!(slice_safe(&buf, 1, 10), Some(&buf[1..]));
        assert_eq!(slice_safe(&buf, 3, 1), Some(&[][..]));
        assert_eq!(slice_safe(&buf, 4, 1), None);
    }

    #[test]
    fn test_remove_header() {
        assert_eq!(remove_header(&hex!("a503010203")), &hex!("010203"));
        assert_eq!(remove_header(&hex!("a58201")), &[] as &[u8]);
        assert_eq!(remove_header(&[]), &[] as &[u8]);
    }

    #[test]
    fn test_find_hex() {
        let fci = hex!("6f07840201028801ff");
        assert_eq!(find_hex(&fci, "84", false), Some(&hex!("0102")[..]));
        assert_eq!(find_hex(&fci, "88", true), Some(&hex!("8801ff")[..]));
        assert_eq!(find_hex(&fci, "a5", false), None);
        assert_eq!(find_hex(&fci, "zz", false), None);
    }
}
