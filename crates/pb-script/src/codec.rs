//! Tokio codec for remote output lines

use bytes::{Buf, BufMut, BytesMut};
use std::io;
use tokio_util::codec::{Decoder, Encoder};

/// Longest line delivered before it is split
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

/// Splits remote output into text lines and writes lines back out.
///
/// Invalid UTF-8 is replaced rather than rejected, and a trailing `\r` is
/// dropped. A line longer than [`MAX_LINE_LENGTH`] is delivered in pieces.
#[derive(Debug, Default)]
pub struct LogLineCodec {
    /// Bytes already scanned for a newline
    scanned: usize,
}

impl LogLineCodec {
    /// Create a new codec
    pub fn new() -> Self {
        Self { scanned: 0 }
    }

    fn take_line(&mut self, src: &mut BytesMut, len: usize, skip: usize) -> String {
        let raw = src.split_to(len);
        src.advance(skip);
        self.scanned = 0;
        let text = raw.strip_suffix(b"\r").unwrap_or(&raw[..]);
        String::from_utf8_lossy(text).into_owned()
    }
}

impl Decoder for LogLineCodec {
    type Item = String;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let window = src.len().min(MAX_LINE_LENGTH);
        if let Some(offset) = src[self.scanned..window].iter().position(|b| *b == b'\n') {
            let len = self.scanned + offset;
            return Ok(Some(self.take_line(src, len, 1)));
        }

        if src.len() >= MAX_LINE_LENGTH {
            return Ok(Some(self.take_line(src, MAX_LINE_LENGTH, 0)));
        }

        self.scanned = src.len();
        Ok(None)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(line) => Ok(Some(line)),
            None if src.is_empty() => Ok(None),
            None => {
                let len = src.len();
                Ok(Some(self.take_line(src, len, 0)))
            }
        }
    }
}

impl Encoder<String> for LogLineCodec {
    type Error = io::Error;

    fn encode(&mut self, line: String, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.reserve(line.len() + 1);
        dst.put_slice(line.as_bytes());
        dst.put_u8(b'\n');
        Ok(())
    }
}
