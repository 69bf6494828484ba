//! Push-style decompression with codec auto-detection.
//!
//! The reader hands over raw chunks without knowing the codec; the
//! first bytes of the stream identify it by magic number. Decoded
//! output accumulates in a byte buffer the line extractor then cuts up
//! in place.

use std::fmt;
use std::io::{self, Write as _};

use flate2::write::MultiGzDecoder;

/// Bytes of stream prefix needed to identify the codec.
pub const MAGIC_LEN: usize = 4;

/// Supported input compression formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    Gzip,
    Zstd,
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gzip => f.write_str("gzip"),
            Self::Zstd => f.write_str("zstd"),
        }
    }
}

/// Checks for a magic number at the start of the content and returns
/// the matching codec, if any.
#[must_use]
pub fn detect_codec(prefix: &[u8]) -> Option<Codec> {
    if prefix.starts_with(&[0x1f, 0x8b]) {
        Some(Codec::Gzip)
    } else if prefix.starts_with(&[0x28, 0xB5, 0x2F, 0xFD]) {
        Some(Codec::Zstd)
    } else {
        None
    }
}

enum Inner {
    Gzip(MultiGzDecoder<Vec<u8>>),
    Zstd(zstd::stream::write::Decoder<'static, Vec<u8>>),
}

/// A write-side decoder producing into a growable byte buffer.
///
/// Gzip streams may be multi-member (the dump is sometimes produced
/// that way), hence the multi-member decoder.
pub struct StreamDecoder {
    inner: Inner,
}

impl StreamDecoder {
    /// Creates a decoder for the detected codec.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the decoder context cannot be set up.
    pub fn new(codec: Codec) -> io::Result<Self> {
        let inner = match codec {
            Codec::Gzip => Inner::Gzip(MultiGzDecoder::new(Vec::new())),
            Codec::Zstd => Inner::Zstd(zstd::stream::write::Decoder::new(Vec::new())?),
        };
        Ok(Self { inner })
    }

    /// Feeds one compressed chunk through the decoder.
    ///
    /// # Errors
    ///
    /// Returns the underlying codec error; these are fatal for the run.
    pub fn write(&mut self, chunk: &[u8]) -> io::Result<()> {
        match &mut self.inner {
            Inner::Gzip(d) => d.write_all(chunk),
            Inner::Zstd(d) => d.write_all(chunk),
        }
    }

    /// The accumulated decoded output. The line extractor consumes from
    /// this buffer in place.
    pub fn buffer_mut(&mut self) -> &mut Vec<u8> {
        match &mut self.inner {
            Inner::Gzip(d) => d.get_mut(),
            Inner::Zstd(d) => d.get_mut(),
        }
    }

    /// Flushes any buffered output at end of stream.
    ///
    /// # Errors
    ///
    /// Returns the codec error for a truncated or corrupt trailing
    /// frame.
    pub fn finish(&mut self) -> io::Result<()> {
        match &mut self.inner {
            Inner::Gzip(d) => d.try_finish(),
            Inner::Zstd(d) => d.flush(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;

    #[test]
    fn detects_codecs_by_magic() {
        assert_eq!(detect_codec(&[0x1f, 0x8b, 0x08, 0x00]), Some(Codec::Gzip));
        assert_eq!(detect_codec(&[0x28, 0xB5, 0x2F, 0xFD]), Some(Codec::Zstd));
        assert_eq!(detect_codec(b"{\"ty"), None);
        assert_eq!(detect_codec(&[]), None);
    }

    fn feed_in_chunks(decoder: &mut StreamDecoder, data: &[u8], chunk: usize) {
        for part in data.chunks(chunk) {
            decoder.write(part).unwrap();
        }
        decoder.finish().unwrap();
    }

    #[test]
    fn decodes_gzip_stream_incrementally() {
        let payload = b"one record\nanother record\n".repeat(100);
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(&payload).unwrap();
        let compressed = enc.finish().unwrap();

        let mut dec = StreamDecoder::new(Codec::Gzip).unwrap();
        feed_in_chunks(&mut dec, &compressed, 7);
        assert_eq!(dec.buffer_mut().as_slice(), payload.as_slice());
    }

    #[test]
    fn decodes_zstd_stream_incrementally() {
        let payload = b"one record\nanother record\n".repeat(100);
        let compressed = zstd::encode_all(payload.as_slice(), 3).unwrap();

        let mut dec = StreamDecoder::new(Codec::Zstd).unwrap();
        feed_in_chunks(&mut dec, &compressed, 7);
        assert_eq!(dec.buffer_mut().as_slice(), payload.as_slice());
    }

    #[test]
    fn output_buffer_can_be_drained_between_writes() {
        let payload = b"x".repeat(10_000);
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(&payload).unwrap();
        let compressed = enc.finish().unwrap();

        let mut dec = StreamDecoder::new(Codec::Gzip).unwrap();
        let mut total = 0;
        for part in compressed.chunks(64) {
            dec.write(part).unwrap();
            total += dec.buffer_mut().len();
            dec.buffer_mut().clear();
        }
        dec.finish().unwrap();
        total += dec.buffer_mut().len();
        assert_eq!(total, payload.len());
    }
}
