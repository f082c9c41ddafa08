//! Common utilities for sysdvr-usb
//!
//! This crate provides the pieces the streaming client shares with its tests:
//! the endpoint abstractions the streaming source reads and writes through,
//! the cooperative stop signal, logging setup, and error handling.

pub mod endpoint;
pub mod error;
pub mod logging;
pub mod stop;
pub mod test_utils;

pub use endpoint::{EndpointRead, EndpointWrite, LinkControl};
pub use error::{Error, Result};
pub use logging::{LogFormat, setup_logging};
pub use stop::StopSignal;
