//! Setup errors
//!
//! Everything here is fatal for the current attempt: it means the device
//! could not be found or opened, or is held by another process. Transient
//! link problems never surface as a `SetupError`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SetupError {
    #[error("Unable to list USB devices: {0}")]
    Enumerate(#[source] rusb::Error),

    #[error("No streaming device was found")]
    DeviceNotFound,

    #[error("No streaming device with identifier '{0}' was found")]
    IdentifierNotFound(String),

    #[error("A device is already open on this USB context")]
    DeviceAlreadyOpen,

    #[error("Unable to open device: {0}")]
    Open(#[source] rusb::Error),

    #[error("Unable to claim interface {interface}: {source}")]
    InterfaceClaim {
        interface: u8,
        #[source]
        source: rusb::Error,
    },

    #[error("Endpoints are already open for this device")]
    EndpointsAlreadyOpen,

    #[error("Device has been closed")]
    DeviceClosed,

    #[error("USB context error: {0}")]
    Context(#[source] rusb::Error),
}

impl SetupError {
    /// Hint for the user when the error is usually caused by something outside this process
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            SetupError::DeviceNotFound | SetupError::IdentifierNotFound(_) => {
                Some("Make sure the console is connected and USB streaming is enabled.")
            }
            SetupError::Open(rusb::Error::Access)
            | SetupError::InterfaceClaim {
                source: rusb::Error::Access,
                ..
            } => Some("Permission denied. Check the udev rules or run with elevated rights."),
            SetupError::InterfaceClaim {
                source: rusb::Error::Busy,
                ..
            } => Some("The device is in use by another application."),
            _ => None,
        }
    }
}
