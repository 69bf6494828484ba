//! Cuts the decompressed byte stream into candidate JSON record lines.
//!
//! The dump is one record per line, wrapped in `[` / `]` with `,`
//! separators. Lines shorter than the guard below are framing or
//! entity-less noise and are skipped without touching the tokenizer.

use std::ops::Range;

/// A record line must close its object brace beyond this offset; the
/// dump's header/footer lines and empty records are all far smaller.
const MIN_RECORD_END: usize = 662;

/// A batch of record lines cut from the decompressed stream.
///
/// The batch owns the scanned bytes so it can move across the queue to a
/// parser worker while the decompressor keeps filling a fresh buffer;
/// [`LineBatch::take_lines`] swaps buffer ownership instead of copying
/// the bulk of the data.
#[derive(Debug, Default)]
pub struct LineBatch {
    buf: Vec<u8>,
    ranges: Vec<Range<usize>>,
}

impl LineBatch {
    /// Scans `buf` for newline-terminated records, keeping each range
    /// that ends in a `}` beyond the noise guard. Consumed bytes move
    /// into the batch; the unfinished tail (no trailing newline yet)
    /// stays in `buf` for the next append. Returns the number of lines
    /// kept.
    ///
    /// Callers must append a synthetic `\n` at end of stream so the
    /// final record is extracted.
    pub fn take_lines(&mut self, buf: &mut Vec<u8>) -> usize {
        self.ranges.clear();
        self.buf.clear();

        let mut base = 0usize;
        while let Some(nl) = find_byte(&buf[base..], b'\n') {
            if nl > MIN_RECORD_END + 1 {
                if let Some(ep) = rfind_byte(&buf[base..base + nl], b'}') {
                    if ep > MIN_RECORD_END {
                        self.ranges.push(base..base + ep + 1);
                    }
                }
            }

            // Skip framing between records (`,`, `]`, whitespace) up to
            // the next object opener.
            let advance = find_byte(&buf[base + nl..], b'{').map_or(nl + 1, |np| nl + np);
            base += advance;
        }

        if base > 0 {
            std::mem::swap(&mut self.buf, buf);
            buf.extend_from_slice(&self.buf[base..]);
            self.buf.truncate(base);
        }

        self.ranges.len()
    }

    /// Number of lines in the batch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    /// Returns `true` when the batch holds no lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Mutable access to one line; the tokenizer parses it in place.
    ///
    /// # Panics
    ///
    /// Panics if `idx` is out of bounds.
    #[must_use]
    pub fn line_mut(&mut self, idx: usize) -> &mut [u8] {
        let range = self.ranges[idx].clone();
        &mut self.buf[range]
    }
}

fn find_byte(haystack: &[u8], needle: u8) -> Option<usize> {
    haystack.iter().position(|&b| b == needle)
}

fn rfind_byte(haystack: &[u8], needle: u8) -> Option<usize> {
    haystack.iter().rposition(|&b| b == needle)
}
