//! Peek-then-read message framing.

use std::time::Duration;

use les_types::MessageKind;

use super::codec::{frame_length, parse_header, PEEK_LEN};
use super::transport::Connection;
use crate::error::ProtocolError;

/// One complete, classified message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub kind: MessageKind,
    pub content_length: usize,
    /// The whole frame, header included.
    pub bytes: Vec<u8>,
}

impl Frame {
    /// The content following the header.
    pub fn body(&self) -> &[u8] {
        &self.bytes[self.bytes.len() - self.content_length..]
    }
}

/// Classify a message by its first four bytes.
pub fn classify(bytes: &[u8]) -> Result<MessageKind, ProtocolError> {
    if bytes.len() < 4 {
        return Err(ProtocolError::Truncated(bytes.len()));
    }
    MessageKind::from_tag(bytes)
        .ok_or_else(|| ProtocolError::UnknownTag(String::from_utf8_lossy(&bytes[..4]).into_owned()))
}

/// Reads exactly one message at a time from a [`Connection`].
///
/// The header is peeked first, so nothing is consumed until the frame
/// length is known. On a classification or header error the pending data
/// is left in place; the caller decides whether to discard it.
#[derive(Debug, Clone)]
pub struct MessageFramer {
    peek_len: usize,
    timeout: Duration,
}

impl MessageFramer {
    /// Framer whose peek waits at most `timeout` for data.
    pub fn new(timeout: Duration) -> Self {
        Self {
            peek_len: PEEK_LEN,
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Receive the next message.
    pub fn receive<C: Connection + ?Sized>(&self, conn: &mut C) -> Result<Frame, ProtocolError> {
        let mut head = vec![0u8; self.peek_len];
        let peeked = conn.peek(&mut head, self.timeout)?;
        let head = &head[..peeked];

        let kind = classify(head)?;
        let content_length = parse_header(head)?;
        let expected = frame_length(content_length)
            .ok_or_else(|| ProtocolError::MalformedLength(content_length.to_string()))?;

        let mut bytes = vec![0u8; expected];
        let actual = conn.read_frame(&mut bytes)?;
        if actual < expected {
            return Err(ProtocolError::ShortRead { expected, actual });
        }

        Ok(Frame {
            kind,
            content_length,
            bytes,
        })
    }
}
