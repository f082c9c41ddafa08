//! Endpoint abstractions for the streaming link
//!
//! The streaming source never talks to libusb directly. It reads through an
//! [`EndpointRead`], writes handshake requests through an [`EndpointWrite`] and
//! tears the device down through a [`LinkControl`]. The client crate implements
//! these over `rusb`; [`crate::test_utils`] provides scripted versions.

use std::time::Duration;

/// Inbound (device to host) endpoint
pub trait EndpointRead: Send {
    /// Read up to `buf.len()` bytes, blocking for at most `timeout`
    ///
    /// Returns the number of bytes actually transferred.
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> rusb::Result<usize>;
}

/// Outbound (host to device) endpoint
pub trait EndpointWrite: Send {
    /// Write `buf`, blocking for at most `timeout`
    fn write(&mut self, buf: &[u8], timeout: Duration) -> rusb::Result<usize>;
}

/// Ownership of the device behind a pair of endpoints
pub trait LinkControl: Send {
    /// Release the device. Must be safe to call more than once.
    fn close(&mut self);

    fn is_open(&self) -> bool;
}

impl<T: EndpointRead + ?Sized> EndpointRead for Box<T> {
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> rusb::Result<usize> {
        (**self).read(buf, timeout)
    }
}

impl<T: EndpointWrite + ?Sized> EndpointWrite for Box<T> {
    fn write(&mut self, buf: &[u8], timeout: Duration) -> rusb::Result<usize> {
        (**self).write(buf, timeout)
    }
}
