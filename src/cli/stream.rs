//! Incremental decoder for the agent's newline-delimited stdout.
//!
//! Output arrives in arbitrarily sized chunks, so a single JSON record may be
//! split across any number of reads. The decoder keeps the trailing partial
//! record buffered until its terminating newline shows up.

/// Splits a byte stream into newline-terminated records.
///
/// Records are split on raw bytes before UTF-8 decoding, which keeps a
/// multi-byte character intact even when a read boundary falls inside it.
#[derive(Debug, Clone, Default)]
pub struct StreamDecoder {
    pending: Vec<u8>,
}

impl StreamDecoder {
    /// Create an empty decoder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every record it completed, in order.
    ///
    /// Empty and whitespace-only records are dropped.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);

        let mut records = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.pending[start..].iter().position(|&b| b == b'\n') {
            let end = start + offset;
            if let Some(record) = decode_record(&self.pending[start..end]) {
                records.push(record);
            }
            start = end + 1;
        }
        self.pending.drain(..start);

        records
    }

    /// Convenience wrapper around [`push`](Self::push) for text input.
    pub fn push_str(&mut self, chunk: &str) -> Vec<String> {
        self.push(chunk.as_bytes())
    }

    /// Interpret whatever remains buffered as a final record.
    ///
    /// Used at end of stream, where the last record may lack a newline.
    pub fn flush(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.pending);
        decode_record(&rest)
    }

    /// Discard any buffered partial record.
    pub fn reset(&mut self) {
        self.pending.clear();
    }

    /// Number of bytes waiting for a newline.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

fn decode_record(bytes: &[u8]) -> Option<String> {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    let text = String::from_utf8_lossy(bytes);
    if text.trim().is_empty() {
        None
    } else {
        Some(text.into_owned())
    }
}
