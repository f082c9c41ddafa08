//! Stream selection types
//!
//! The client tells the peripheral which mix of streams it wants by sending a
//! 4-byte magic value on the interrupt-out endpoint before any framed data
//! flows. Both the magic and the logical stream kind are derived from a single
//! [`StreamKind`], so an empty selection cannot be represented.

use crate::error::{ProtocolError, Result};
use std::fmt;

/// Length of every handshake magic value
pub const MAGIC_LEN: usize = 4;

/// Handshake magic requesting video only
pub const MAGIC_REQUEST_VIDEO: [u8; MAGIC_LEN] = [0xBB; MAGIC_LEN];

/// Handshake magic requesting audio only
pub const MAGIC_REQUEST_AUDIO: [u8; MAGIC_LEN] = [0xCC; MAGIC_LEN];

/// Handshake magic requesting both video and audio
pub const MAGIC_REQUEST_BOTH: [u8; MAGIC_LEN] = [0xAA; MAGIC_LEN];

/// Logical mix of streams carried by one session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    Video,
    Audio,
    Both,
}

impl StreamKind {
    /// Magic bytes sent to the peripheral to request this mix
    pub const fn magic(self) -> [u8; MAGIC_LEN] {
        match self {
            StreamKind::Video => MAGIC_REQUEST_VIDEO,
            StreamKind::Audio => MAGIC_REQUEST_AUDIO,
            StreamKind::Both => MAGIC_REQUEST_BOTH,
        }
    }

    pub const fn has_video(self) -> bool {
        matches!(self, StreamKind::Video | StreamKind::Both)
    }

    pub const fn has_audio(self) -> bool {
        matches!(self, StreamKind::Audio | StreamKind::Both)
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamKind::Video => write!(f, "video"),
            StreamKind::Audio => write!(f, "audio"),
            StreamKind::Both => write!(f, "video+audio"),
        }
    }
}

/// Immutable stream selection fixed when a streaming source is built
///
/// # Example
/// ```
/// use protocol::{StreamKind, StreamRequest};
///
/// let request = StreamRequest::new(true, false).unwrap();
/// assert_eq!(request.kind(), StreamKind::Video);
/// assert_eq!(request.magic(), [0xBB; 4]);
///
/// assert!(StreamRequest::new(false, false).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamRequest {
    kind: StreamKind,
}

impl StreamRequest {
    /// Build a request from the two selection flags
    ///
    /// Returns [`ProtocolError::EmptyStreamRequest`] when neither flag is set.
    pub fn new(wants_video: bool, wants_audio: bool) -> Result<Self> {
        let kind = match (wants_video, wants_audio) {
            (true, true) => StreamKind::Both,
            (true, false) => StreamKind::Video,
            (false, true) => StreamKind::Audio,
            (false, false) => return Err(ProtocolError::EmptyStreamRequest),
        };

        Ok(Self { kind })
    }

    pub fn kind(&self) -> StreamKind {
        self.kind
    }

    pub fn magic(&self) -> [u8; MAGIC_LEN] {
        self.kind.magic()
    }

    pub fn wants_video(&self) -> bool {
        self.kind.has_video()
    }

    pub fn wants_audio(&self) -> bool {
        self.kind.has_audio()
    }
}

impl From<StreamKind> for StreamRequest {
    fn from(kind: StreamKind) -> Self {
        Self { kind }
    }
}
