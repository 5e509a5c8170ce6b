//! Compact-TLV, as used in ATR historical bytes

/// Lazy compact-TLV iterator yielding `(tag, value)` pairs
///
/// Each header byte carries the tag in its high nibble and the length in its
/// low nibble.
#[derive(Debug, Clone)]
pub struct CompactTlv<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> CompactTlv<'a> {
    /// Iterate over `buf`, skipping leading null padding
    pub fn new(buf: &'a [u8]) -> Self {
        let pos = buf.iter().position(|&b| b != 0).unwrap_or(buf.len());
        Self { buf, pos }
    }
}

impl<'a> Iterator for CompactTlv<'a> {
    type Item = (u8, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let head = *self.buf.get(self.pos)?;
            self.pos += 1;

            let len = (head & 0x0F) as usize;
            if len == 0 {
                continue;
            }

            let start = self.pos.min(self.buf.len());
            let end = (self.pos + len).min(self.buf.len());
            self.pos += len;
            return Some((head >> 4, &self.buf[start..end]));
        }
    }
}
