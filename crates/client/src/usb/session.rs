//! Device session
//!
//! Exclusive owner of one opened streaming device. The session claims the
//! stream interface, hands out the endpoint pair, and releases everything on
//! [`DeviceSession::close`] or drop.

use crate::error::SetupError;
use crate::usb::endpoint::{UsbEndpointReader, UsbEndpointWriter};
use common::LinkControl;
use protocol::{BULK_IN_ENDPOINT, INTERRUPT_OUT_ENDPOINT, STREAM_INTERFACE};
use rusb::{Context, DeviceHandle};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

pub struct DeviceSession {
    /// Device handle, `None` once closed
    handle: Option<Arc<DeviceHandle<Context>>>,
    /// Identifier extracted from the serial descriptor
    identifier: String,
    /// Whether the stream interface is claimed
    claimed: bool,
    /// Shared with the owning context, cleared on close
    device_open: Arc<AtomicBool>,
}

impl DeviceSession {
    pub(crate) fn new(
        handle: DeviceHandle<Context>,
        identifier: String,
        device_open: Arc<AtomicBool>,
    ) -> Self {
        Self {
            handle: Some(Arc::new(handle)),
            identifier,
            claimed: false,
            device_open,
        }
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Claim the stream interface and open the bulk reader / interrupt writer
    ///
    /// Fails if the interface is held by another process or session. Can only
    /// be called once per session.
    pub fn open_endpoint_pair(
        &mut self,
    ) -> Result<(UsbEndpointReader, UsbEndpointWriter), SetupError> {
        if self.claimed {
            return Err(SetupError::EndpointsAlreadyOpen);
        }

        let handle = self.handle.as_mut().ok_or(SetupError::DeviceClosed)?;
        let exclusive = Arc::get_mut(handle).ok_or(SetupError::EndpointsAlreadyOpen)?;

        match exclusive.set_auto_detach_kernel_driver(true) {
            Ok(()) => debug!("Kernel driver auto-detach enabled"),
            Err(rusb::Error::NotSupported) => {
                debug!("Kernel driver auto-detach not supported on this platform")
            }
            Err(e) => warn!("Failed to enable kernel driver auto-detach: {}", e),
        }

        exclusive
            .claim_interface(STREAM_INTERFACE)
            .map_err(|source| {
                warn!("Failed to claim interface {}: {}", STREAM_INTERFACE, source);
                SetupError::InterfaceClaim {
                    interface: STREAM_INTERFACE,
                    source,
                }
            })?;

        debug!(
            "Claimed interface {} on device {}",
            STREAM_INTERFACE, self.identifier
        );

        let weak = Arc::downgrade(handle);
        self.claimed = true;

        Ok((
            UsbEndpointReader::new(weak.clone(), BULK_IN_ENDPOINT),
            UsbEndpointWriter::new(weak, INTERRUPT_OUT_ENDPOINT),
        ))
    }

    /// Release the interface and close the device
    ///
    /// Safe to call repeatedly and after a partially failed setup.
    pub fn close(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };

        match Arc::try_unwrap(handle) {
            Ok(mut handle) => {
                if self.claimed
                    && let Err(e) = handle.release_interface(STREAM_INTERFACE)
                {
                    debug!(
                        "Failed to release interface {} (device may be gone): {}",
                        STREAM_INTERFACE, e
                    );
                }
            }
            Err(_) => {
                warn!("Device handle still in use while closing, it will be released on last use");
            }
        }

        self.claimed = false;
        self.device_open.store(false, Ordering::SeqCst);
        info!("Closed device {}", self.identifier);
    }

    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }
}

impl LinkControl for DeviceSession {
    fn close(&mut self) {
        DeviceSession::close(self);
    }

    fn is_open(&self) -> bool {
        DeviceSession::is_open(self)
    }
}

impl Drop for DeviceSession {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for DeviceSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceSession")
            .field("identifier", &self.identifier)
            .field("open", &self.is_open())
            .field("claimed", &self.claimed)
            .finish()
    }
}
