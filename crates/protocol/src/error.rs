//! Protocol error types

use thiserror::Error;

/// Protocol-level errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// A stream request must select at least one of video or audio
    #[error("Stream request must select video, audio, or both")]
    EmptyStreamRequest,

    /// Buffer too short to hold a packet header
    #[error("Header too short: needed {needed} bytes, got {available}")]
    HeaderTooShort { needed: usize, available: usize },

    /// Header magic is neither the video nor the audio marker
    #[error("Unknown packet magic: {0:#010x}")]
    UnknownMagic(u32),

    /// Declared payload size exceeds what the peripheral can send for that kind
    #[error("Payload too large: {size} bytes (max: {max})")]
    PayloadTooLarge { size: usize, max: usize },
}

/// Type alias for protocol results
pub type Result<T> = std::result::Result<T, ProtocolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ProtocolError::UnknownMagic(0x1234_5678);
        let msg = format!("{}", err);
        assert!(msg.contains("Unknown packet magic"));
        assert!(msg.contains("0x12345678"));
    }

    #[test]
    fn test_payload_too_large_error() {
        let err = ProtocolError::PayloadTooLarge {
            size: 0x60000,
            max: 0x50000,
        };
        let msg = format!("{}", err);
        assert!(msg.contains("Payload too large"));
        assert!(msg.contains("393216"));
    }
}
