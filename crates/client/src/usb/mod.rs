//! USB device access
//!
//! Enumeration, exclusive device sessions and the rusb-backed endpoints the
//! streaming source reads from and writes to.

pub mod context;
pub mod endpoint;
pub mod session;

pub use context::{DeviceCandidate, DeviceContext, UsbLogLevel};
pub use endpoint::{UsbEndpointReader, UsbEndpointWriter};
pub use session::DeviceSession;
