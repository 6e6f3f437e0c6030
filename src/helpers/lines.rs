//! Newline framing over an arbitrarily chunked byte stream.
//!
//! Bytes are buffered as bytes, not text: a `\n` byte never occurs inside a
//! multi-byte UTF-8 sequence, so splitting on it before decoding keeps
//! characters that straddle two reads intact.

/// Accumulates bytes across reads and yields only newline-terminated lines.
#[derive(Debug, Default)]
pub struct LineDecoder {
    pending: Vec<u8>,
    /// Leading bytes of `pending` already known to hold no `\n`.
    scanned: usize,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `chunk` and drains every complete line, without its terminator
    /// (`\n` or `\r\n`). Lines that are not valid UTF-8 are decoded lossily.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);

        let mut lines = Vec::new();
        let mut start = 0;
        let mut from = self.scanned;
        while let Some(offset) = self.pending[from..].iter().position(|&b| b == b'\n') {
            let end = from + offset;
            let mut line = &self.pending[start..end];
            if let Some(stripped) = line.strip_suffix(b"\r") {
                line = stripped;
            }
            lines.push(String::from_utf8_lossy(line).into_owned());
            start = end + 1;
            from = start;
        }
        self.pending.drain(..start);
        self.scanned = self.pending.len();
        lines
    }

    /// Bytes of the unterminated trailing line.
    pub fn pending(&self) -> &[u8] {
        &self.pending
    }

    /// Drops the unterminated trailing line, returning how many bytes were lost.
    pub fn finish(&mut self) -> usize {
        let dropped = self.pending.len();
        self.pending.clear();
        self.scanned = 0;
        dropped
    }
}
