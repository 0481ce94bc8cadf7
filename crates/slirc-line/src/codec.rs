//! Line-based codec for tokio.
//!
//! Reads newline-terminated lines and hands them up with the CRLF
//! already stripped; encodes outbound lines by appending CRLF. Lines
//! are limited to 512 bytes per RFC1459.

use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::LineError;
use crate::MAX_LINE_LEN;

/// CRLF line codec with the IRC length limit.
///
/// Oversized and non-UTF-8 lines are consumed before the error is
/// returned, so a decode error other than I/O leaves the stream in a
/// usable state and the caller may skip the line and continue.
pub struct LineCodec {
    /// Index of next byte to check for newline.
    next_index: usize,
    /// Maximum line length in bytes, including CRLF.
    max_len: usize,
}

impl LineCodec {
    /// Create a codec with the standard 512-byte limit.
    pub fn new() -> Self {
        Self {
            next_index: 0,
            max_len: MAX_LINE_LEN,
        }
    }

    /// Create a codec with a custom line length limit.
    pub fn with_max_len(max_len: usize) -> Self {
        Self {
            next_index: 0,
            max_len,
        }
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for LineCodec {
    type Item = String;
    type Error = LineError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<String>, LineError> {
        if let Some(offset) = src[self.next_index..].iter().position(|b| *b == b'\n') {
            // Complete line: take it off the buffer before any checks so
            // that errors below are recoverable.
            let line = src.split_to(self.next_index + offset + 1);
            self.next_index = 0;

            if line.len() > self.max_len {
                return Err(LineError::TooLong {
                    actual: line.len(),
                    limit: self.max_len,
                });
            }

            let data = std::str::from_utf8(&line).map_err(|e| LineError::InvalidUtf8 {
                byte_pos: e.valid_up_to(),
            })?;

            Ok(Some(data.trim_end_matches(['\r', '\n']).to_owned()))
        } else {
            // No complete line yet. A partial line past the limit is
            // discarded wholesale; the remainder will surface as one
            // malformed line once its newline arrives.
            if src.len() > self.max_len {
                let actual = src.len();
                src.clear();
                self.next_index = 0;
                return Err(LineError::TooLong {
                    actual,
                    limit: self.max_len,
                });
            }

            self.next_index = src.len();
            Ok(None)
        }
    }
}

impl Encoder<String> for LineCodec {
    type Error = LineError;

    fn encode(&mut self, line: String, dst: &mut BytesMut) -> Result<(), LineError> {
        dst.reserve(line.len() + 2);
        dst.put(line.as_bytes());
        dst.put_slice(b"\r\n");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_strips_crlf() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from("PING :test\r\n");

        let line = codec.decode(&mut buf).unwrap();
        assert_eq!(line.as_deref(), Some("PING :test"));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_bare_newline() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from("NOTICE * :lf only\n");

        let line = codec.decode(&mut buf).unwrap();
        assert_eq!(line.as_deref(), Some("NOTICE * :lf only"));
    }

    #[test]
    fn test_decode_partial_line() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from("PING :");

        assert_eq!(codec.decode(&mut buf).unwrap(), None);

        buf.extend_from_slice(b"late\r\n");
        let line = codec.decode(&mut buf).unwrap();
        assert_eq!(line.as_deref(), Some("PING :late"));
    }

    #[test]
    fn test_decode_multiple_lines() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from("PING :a\r\nPING :b\r\n");

        assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some("PING :a"));
        assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some("PING :b"));
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
    }

    #[test]
    fn test_too_long_line_is_recoverable() {
        let mut codec = LineCodec::with_max_len(10);
        let mut buf = BytesMut::from("this line is way past the limit\r\nPING :ok\r\n");

        assert!(matches!(
            codec.decode(&mut buf),
            Err(LineError::TooLong { .. })
        ));
        // The stream keeps going after the oversized line.
        assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some("PING :ok"));
    }

    #[test]
    fn test_oversized_partial_discarded() {
        let mut codec = LineCodec::with_max_len(8);
        let mut buf = BytesMut::from("aaaaaaaaaaaaaaaa");

        assert!(matches!(
            codec.decode(&mut buf),
            Err(LineError::TooLong { .. })
        ));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_invalid_utf8_is_recoverable() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from(&b"PING \xff\xfe\r\nPING :ok\r\n"[..]);

        assert!(matches!(
            codec.decode(&mut buf),
            Err(LineError::InvalidUtf8 { .. })
        ));
        assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some("PING :ok"));
    }

    #[test]
    fn test_encode_appends_crlf() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::new();

        codec.encode("JOIN #test".to_string(), &mut buf).unwrap();
        assert_eq!(&buf[..], b"JOIN #test\r\n");
    }
}
