use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::serial::error::SerialPortError;

/// Frames a raw byte stream into newline delimited text lines.
///
/// Incoming bytes are buffered until a `\n` arrives; everything before
/// it (minus one trailing `\r`, if present) is yielded as one line.
/// The delimiter is never part of a yielded line. Bad UTF-8 is replaced
/// rather than rejected.
///
/// When the stream ends, a trailing unterminated fragment is discarded,
/// not flushed. A device disappearing mid-line therefore loses that
/// partial line.
///
/// Encoding writes the payload bytes followed by exactly one `\n`.
#[derive(Debug, Clone)]
pub struct LinesCodec {
    /// How far into the buffer we have already scanned for a delimiter.
    cursor: usize,
}

impl LinesCodec {
    /// Create a new codec.
    pub fn new() -> Self {
        Self { cursor: 0 }
    }
}

impl Default for LinesCodec {
    fn default() -> Self {
        Self::new()
    }
}

fn into_line(bytes: &[u8]) -> String {
    let bytes = match bytes.split_last() {
        Some((b'\r', rest)) => rest,
        _ => bytes,
    };

    String::from_utf8_lossy(bytes).to_string()
}

impl Decoder for LinesCodec {
    type Item = String;
    type Error = SerialPortError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let read_to = src.len();

        let look_at = &src[self.cursor..read_to];

        if let Some(position) = look_at.iter().position(|&byte| byte == b'\n') {
            // Since we might "start late" in the buffer (from the cursor),
            // the "global" position within the buffer has to be calculated.
            let actual_position = self.cursor + position;

            // Next time we need to start over.
            self.cursor = 0;

            // Split at the delimiter, getting the bytes before it.
            let line = src.split_to(actual_position);

            // Discard the newline by advancing the source buffer beyond it.
            src.advance(1);

            Ok(Some(into_line(&line)))
        } else {
            // We did not find a full frame.
            // The next time we are called the same buffer `src` will be provided to us,
            // but possibly with more data.
            // Since our job is to find the delimiter, we don't need to re-scan
            // the bytes we have already looked at.
            self.cursor = read_to;

            Ok(None)
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(line) => Ok(Some(line)),
            None => {
                // Stream over: drop any unterminated fragment.
                src.clear();
                self.cursor = 0;
                Ok(None)
            }
        }
    }
}

impl Encoder<String> for LinesCodec {
    type Error = SerialPortError;

    fn encode(&mut self, item: String, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.extend_from_slice(item.as_bytes());
        dst.extend_from_slice(b"\n");
        Ok(())
    }
}
