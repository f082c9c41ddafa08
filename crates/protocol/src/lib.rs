//! Protocol library for sysdvr-usb
//!
//! This crate defines the wire-level facts shared by the USB streaming client:
//! the peripheral's identity and endpoint addressing, the handshake magic
//! values that select a stream mix, and the frame layout on the bulk endpoint.
//!
//! # Example
//!
//! ```
//! use protocol::{StreamRequest, StreamKind, parse_serial_identifier};
//!
//! // Ask for both streams
//! let request = StreamRequest::new(true, true).unwrap();
//! assert_eq!(request.kind(), StreamKind::Both);
//! assert_eq!(request.magic(), [0xAA; 4]);
//!
//! // Recognise a peripheral by its serial descriptor
//! assert_eq!(parse_serial_identifier("sysdvr:ABC123").as_deref(), Some("ABC123"));
//! ```

pub mod error;
pub mod framing;
pub mod identity;
pub mod types;

pub use error::{ProtocolError, Result};
pub use framing::{
    HEADER_LEN, MAX_AUDIO_PAYLOAD, MAX_TRANSFER_SIZE, MAX_VIDEO_PAYLOAD, PACKET_MAGIC_AUDIO,
    PACKET_MAGIC_VIDEO, PacketHeader, PacketKind,
};
pub use identity::{
    BULK_IN_ENDPOINT, INTERRUPT_OUT_ENDPOINT, SERIAL_PREFIX, STREAM_INTERFACE, USB_PRODUCT_ID,
    USB_VENDOR_ID, matches_identity, parse_serial_identifier,
};
pub use types::{
    MAGIC_LEN, MAGIC_REQUEST_AUDIO, MAGIC_REQUEST_BOTH, MAGIC_REQUEST_VIDEO, StreamKind,
    StreamRequest,
};
