//! rusb-backed endpoints
//!
//! Both endpoints hold a weak reference to the session's device handle. Once
//! the session is closed every transfer fails with `rusb::Error::NoDevice`.

use common::{EndpointRead, EndpointWrite};
use rusb::{Context, DeviceHandle};
use std::sync::Weak;
use std::time::Duration;

/// Bulk IN reader for streamed data
#[derive(Debug)]
pub struct UsbEndpointReader {
    handle: Weak<DeviceHandle<Context>>,
    endpoint: u8,
}

impl UsbEndpointReader {
    pub(crate) fn new(handle: Weak<DeviceHandle<Context>>, endpoint: u8) -> Self {
        Self { handle, endpoint }
    }

    pub fn endpoint(&self) -> u8 {
        self.endpoint
    }
}

impl EndpointRead for UsbEndpointReader {
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> rusb::Result<usize> {
        let handle = self.handle.upgrade().ok_or(rusb::Error::NoDevice)?;
        handle.read_bulk(self.endpoint, buf, timeout)
    }
}

/// Interrupt OUT writer for handshake requests
#[derive(Debug)]
pub struct UsbEndpointWriter {
    handle: Weak<DeviceHandle<Context>>,
    endpoint: u8,
}

impl UsbEndpointWriter {
    pub(crate) fn new(handle: Weak<DeviceHandle<Context>>, endpoint: u8) -> Self {
        Self { handle, endpoint }
    }

    pub fn endpoint(&self) -> u8 {
        self.endpoint
    }
}

impl EndpointWrite for UsbEndpointWriter {
    fn write(&mut self, buf: &[u8], timeout: Duration) -> rusb::Result<usize> {
        let handle = self.handle.upgrade().ok_or(rusb::Error::NoDevice)?;
        handle.write_interrupt(self.endpoint, buf, timeout)
    }
}
