//! Content-Length framing for the LSP base protocol
//!
//! Each message is `Content-Length: <N>\r\n\r\n<body>` where N counts the
//! UTF-8 bytes of the JSON body. Other headers are accepted and ignored.

use crate::error::FramingError;
use serde::Serialize;
use serde_json::Value;

const HEADER_DELIMITER: &[u8] = b"\r\n\r\n";
const CONTENT_LENGTH: &str = "content-length";

/// Serialize a message and prepend its Content-Length header
pub fn encode<T: Serialize + ?Sized>(message: &T) -> Result<Vec<u8>, FramingError> {
    let body = serde_json::to_vec(message).map_err(|e| FramingError::Encode {
        message: e.to_string(),
    })?;
    let mut frame = format!("Content-Length: {}\r\n\r\n", body.len()).into_bytes();
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Accumulates bytes read from a server and yields complete messages.
///
/// Bytes are only ever removed from the front, and only once a whole frame
/// (or a malformed header block) has been consumed.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    buf: Vec<u8>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append freshly read bytes
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Number of buffered bytes not yet consumed
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Decode the next complete frame.
    ///
    /// Returns `None` while the header or body is still incomplete. Call in a
    /// loop after each read: one chunk may carry several messages.
    pub fn next_frame(&mut self) -> Option<Result<Value, FramingError>> {
        let header_end = find_delimiter(&self.buf)?;
        let body_start = header_end + HEADER_DELIMITER.len();

        let content_length = match parse_content_length(&self.buf[..header_end]) {
            Ok(length) => length,
            Err(e) => {
                self.buf.drain(..body_start);
                return Some(Err(e));
            }
        };

        let Some(body_end) = body_start.checked_add(content_length) else {
            self.buf.drain(..body_start);
            return Some(Err(FramingError::InvalidContentLength {
                value: content_length.to_string(),
            }));
        };

        if self.buf.len() < body_end {
            return None;
        }

        let body: Vec<u8> = self.buf.drain(..body_end).skip(body_start).collect();
        Some(
            serde_json::from_slice(&body).map_err(|e| FramingError::InvalidJson {
                message: e.to_string(),
            }),
        )
    }
}

fn find_delimiter(buf: &[u8]) -> Option<usize> {
    buf.windows(HEADER_DELIMITER.len())
        .position(|window| window == HEADER_DELIMITER)
}

fn parse_content_length(header: &[u8]) -> Result<usize, FramingError> {
    let header = String::from_utf8_lossy(header);
    for line in header.split("\r\n") {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        if name.trim().eq_ignore_ascii_case(CONTENT_LENGTH) {
            let value = value.trim();
            return value
                .parse()
                .map_err(|_| FramingError::InvalidContentLength {
                    value: value.to_string(),
                });
        }
    }
    Err(FramingError::MissingContentLength)
}
