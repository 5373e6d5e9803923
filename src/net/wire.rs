// CLASSIFICATION: COMMUNITY
// Filename: wire.rs v0.1
// Author: Lukas Bower
// Date Modified: 2027-09-02

//! Coherence protocol frames.
//!
//! A frame is a fixed 18-byte little-endian header followed by exactly
//! `payload_len` raw page bytes:
//!
//! ```text
//! +------+--------+----------------+-----------------+---------------+
//! | kind | intent | page_index i64 | payload_len u64 | payload ...   |
//! +------+--------+----------------+-----------------+---------------+
//! ```
//!
//! Receivers read the header, validate it, then read the payload. There is
//! no delimiter, checksum or version field; both peers run the same codec.

use std::fmt;

use thiserror::Error;

/// Encoded header size in bytes.
pub const HEADER_LEN: usize = 18;

/// Wire value of the "all pages" target.
pub const ALL_PAGES: i64 = -1;

/// Errors produced while encoding or decoding protocol frames.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("unknown message kind {0}")]
    UnknownKind(u8),
    #[error("unknown intent {0}")]
    UnknownIntent(u8),
    #[error("invalid page index {0}")]
    InvalidPageIndex(i64),
    #[error("payload of {len} bytes exceeds page size {max}")]
    PayloadTooLarge { len: u64, max: usize },
}

/// Whether a frame asks for something or answers a previous ask.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Request = 0,
    Response = 1,
}

impl TryFrom<u8> for MessageKind {
    type Error = CodecError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(MessageKind::Request),
            1 => Ok(MessageKind::Response),
            other => Err(CodecError::UnknownKind(other)),
        }
    }
}

/// Coherence intent carried by a frame.
///
/// On a request, `Modified` means "I am writing this page, drop yours" and
/// `Shared` means "my copy is invalid, send me yours". On a response,
/// `Modified` acknowledges an invalidation and `Shared` carries page data.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Modified = 1,
    Shared = 2,
}

impl TryFrom<u8> for Intent {
    type Error = CodecError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Intent::Modified),
            2 => Ok(Intent::Shared),
            other => Err(CodecError::UnknownIntent(other)),
        }
    }
}

/// Page addressed by a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageTarget {
    Page(usize),
    All,
}

impl PageTarget {
    fn to_wire(self) -> i64 {
        match self {
            PageTarget::Page(index) => index as i64,
            PageTarget::All => ALL_PAGES,
        }
    }

    fn from_wire(raw: i64) -> Result<Self, CodecError> {
        match raw {
            ALL_PAGES => Ok(PageTarget::All),
            index if index >= 0 => usize::try_from(index)
                .map(PageTarget::Page)
                .map_err(|_| CodecError::InvalidPageIndex(raw)),
            _ => Err(CodecError::InvalidPageIndex(raw)),
        }
    }
}

impl fmt::Display for PageTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageTarget::Page(index) => write!(f, "page {index}"),
            PageTarget::All => f.write_str("all pages"),
        }
    }
}

/// Decoded frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub kind: MessageKind,
    pub intent: Intent,
    pub target: PageTarget,
    pub payload_len: usize,
}

impl FrameHeader {
    /// Serialise into the fixed header layout.
    #[must_use]
    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[0] = self.kind as u8;
        out[1] = self.intent as u8;
        out[2..10].copy_from_slice(&self.target.to_wire().to_le_bytes());
        out[10..18].copy_from_slice(&(self.payload_len as u64).to_le_bytes());
        out
    }

    /// Parse a header, rejecting payloads larger than `max_payload`.
    pub fn decode(bytes: &[u8; HEADER_LEN], max_payload: usize) -> Result<Self, CodecError> {
        let kind = MessageKind::try_from(bytes[0])?;
        let intent = Intent::try_from(bytes[1])?;
        let mut index = [0u8; 8];
        index.copy_from_slice(&bytes[2..10]);
        let target = PageTarget::from_wire(i64::from_le_bytes(index))?;
        let mut len = [0u8; 8];
        len.copy_from_slice(&bytes[10..18]);
        let raw_len = u64::from_le_bytes(len);
        let payload_len = usize::try_from(raw_len)
            .ok()
            .filter(|len| *len <= max_payload)
            .ok_or(CodecError::PayloadTooLarge {
                len: raw_len,
                max: max_payload,
            })?;
        Ok(Self {
            kind,
            intent,
            target,
            payload_len,
        })
    }
}

/// A single coherence message exchanged between peers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolMessage {
    pub kind: MessageKind,
    pub intent: Intent,
    pub target: PageTarget,
    pub payload: Vec<u8>,
}

impl ProtocolMessage {
    /// Build a payload-free request.
    #[must_use]
    pub fn request(intent: Intent, target: PageTarget) -> Self {
        Self {
            kind: MessageKind::Request,
            intent,
            target,
            payload: Vec::new(),
        }
    }

    /// Build a response, optionally carrying page bytes.
    #[must_use]
    pub fn response(intent: Intent, target: PageTarget, payload: Vec<u8>) -> Self {
        Self {
            kind: MessageKind::Response,
            intent,
            target,
            payload,
        }
    }

    /// Header describing this message.
    #[must_use]
    pub fn header(&self) -> FrameHeader {
        FrameHeader {
            kind: self.kind,
            intent: self.intent,
            target: self.target,
            payload_len: self.payload.len(),
        }
    }

    /// Encode header and payload into one contiguous frame.
    pub fn encode(&self, max_payload: usize) -> Result<Vec<u8>, CodecError> {
        if self.payload.len() > max_payload {
            return Err(CodecError::PayloadTooLarge {
                len: self.payload.len() as u64,
                max: max_payload,
            });
        }
        let mut frame = Vec::with_capacity(HEADER_LEN + self.payload.len());
        frame.extend_from_slice(&self.header().encode());
        frame.extend_from_slice(&self.payload);
        Ok(frame)
    }

    /// Rebuild a message from a decoded header and its payload.
    #[must_use]
    pub fn from_parts(header: FrameHeader, payload: Vec<u8>) -> Self {
        Self {
            kind: header.kind,
            intent: header.intent,
            target: header.target,
            payload,
        }
    }
}
