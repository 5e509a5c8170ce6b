//! ISO 7816-4 simple-TLV

/// Lazy simple-TLV iterator yielding `(tag, value)` pairs
///
/// The length is one byte, or `FF` followed by a 2-byte big-endian length.
/// Zero-length entries are skipped and a value running past the end of the
/// buffer is truncated.
#[derive(Debug, Clone)]
pub struct SimpleTlv<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> SimpleTlv<'a> {
    /// Iterate over `buf`, skipping leading null padding
    pub fn new(buf: &'a [u8]) -> Self {
        let pos = buf.iter().position(|&b| b != 0).unwrap_or(buf.len());
        Self { buf, pos }
    }
}

impl<'a> Iterator for SimpleTlv<'a> {
    type Item = (u8, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let buf = self.buf;
            let tag = *buf.get(self.pos)?;
            let mut len = *buf.get(self.pos + 1)? as usize;
            self.pos += 2;

            if len == 0xFF {
                let hi = *buf.get(self.pos)?;
                let lo = *buf.get(self.pos + 1)?;
                len = u16::from_be_bytes([hi, lo]) as usize;
                self.pos += 2;
            }

            if len == 0 {
                continue;
            }

            let start = self.pos.min(buf.len());
            let end = (self.pos + len).min(buf.len());
            self.pos += len;
            return Some((tag, &buf[start..end]));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn test_simple_tlv() {
        let buf = hex!("0000 01020a0b 0200 03ff0003aabbcc 0405ff");
        let items: Vec<_> = SimpleTlv::new(&buf).collect();
        assert_eq!(
            items,
            vec![
                (0x01, &hex!("0a0b")[..]),
                (0x03, &hex!("aabbcc")[..]),
                (0x04, &hex!("ff")[..]),
            ]
        );
    }

    #[test]
    fn test_simple_tlv_all_padding() {
        assert_eq!(SimpleTlv::new(&[0, 0, 0]).count(), 0);
    }
}
