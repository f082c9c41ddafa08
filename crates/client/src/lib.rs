//! USB streaming client for sysdvr-usb
//!
//! Finds a console running the streaming sysmodule on the USB bus, opens it
//! and exposes its A/V frames through the [`stream::StreamingSource`] trait.
//!
//! ```no_run
//! use client::stream::{StreamOptions, StreamingSource};
//! use client::usb::{DeviceContext, UsbLogLevel};
//! use protocol::StreamRequest;
//!
//! # fn main() -> anyhow::Result<()> {
//! let context = DeviceContext::new(UsbLogLevel::Error)?;
//! let candidate = context.find_candidate(None)?;
//! let session = context.open(&candidate)?;
//!
//! let request = StreamRequest::new(true, true)?;
//! let mut source =
//!     context.create_streaming_source(session, request, StreamOptions::for_host(false))?;
//!
//! if source.connect().is_connected() {
//!     let mut header = [0u8; protocol::HEADER_LEN];
//!     let _ = source.read_header(&mut header);
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod probe;
pub mod stream;
pub mod usb;

pub use error::SetupError;
pub use probe::{FrameProbe, ProbeEnd, ProbeSettings, ProbeStats};
pub use stream::{
    BackendKind, ConnectOutcome, HandshakeStats, SourceState, StreamOptions, StreamTimings,
    StreamingSource, UsbStreamingSource,
};
pub use usb::{DeviceCandidate, DeviceContext, DeviceSession, UsbLogLevel};
