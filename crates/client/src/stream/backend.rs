//! Read backends
//!
//! The peripheral writes each frame as a header followed by its payload. How
//! those bytes are pulled off the bulk endpoint depends on the host driver:
//! WinUSB copes with exact-size reads, libusb wants one large read per frame.

use common::EndpointRead;
use protocol::{HEADER_LEN, MAX_TRANSFER_SIZE};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Read strategy, chosen once per source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// One exact-size read for the header, one for the payload
    Sequential,
    /// One large read per frame, payload served from the staged bytes
    BulkCapture,
}

impl BackendKind {
    /// Backend for the current host
    ///
    /// Windows uses sequential reads unless libusb is forced.
    pub fn for_host(force_libusb: bool) -> Self {
        Self::select(cfg!(windows), force_libusb)
    }

    pub(crate) fn select(windows: bool, force_libusb: bool) -> Self {
        if windows && !force_libusb {
            BackendKind::Sequential
        } else {
            BackendKind::BulkCapture
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Sequential => write!(f, "sequential"),
            BackendKind::BulkCapture => write!(f, "bulk-capture"),
        }
    }
}

/// Why a read produced no usable data
///
/// Never shown to a consumer as an error; reads just report `false`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ReadFailure {
    #[error("USB transfer failed: {0}")]
    Usb(rusb::Error),

    #[error("Short read: expected {expected} bytes, got {actual}")]
    ShortRead { expected: usize, actual: usize },

    #[error("No frame is staged")]
    NotStaged,

    #[error("Payload of {requested} bytes exceeds the {available} staged bytes")]
    Overrun { requested: usize, available: usize },

    #[error("Buffer too small: need {needed} bytes, have {actual}")]
    BufferTooSmall { needed: usize, actual: usize },

    #[error("Source is not connected")]
    NotConnected,
}

impl From<rusb::Error> for ReadFailure {
    fn from(err: rusb::Error) -> Self {
        ReadFailure::Usb(err)
    }
}

pub trait ReadBackend: Send {
    fn kind(&self) -> BackendKind;

    /// Fill `buf[..HEADER_LEN]` with the next frame header
    fn read_header(&mut self, buf: &mut [u8]) -> Result<(), ReadFailure>;

    /// Fill `buf[..len]` with the payload of the last header read
    fn read_payload(&mut self, buf: &mut [u8], len: usize) -> Result<(), ReadFailure>;

    /// Drop anything staged from a previous read
    fn discard(&mut self);
}

fn check_buffer(buf: &[u8], needed: usize) -> Result<(), ReadFailure> {
    if buf.len() < needed {
        return Err(ReadFailure::BufferTooSmall {
            needed,
            actual: buf.len(),
        });
    }
    Ok(())
}

pub struct SequentialReads<R> {
    reader: R,
    timeout: Duration,
}

impl<R: EndpointRead> SequentialReads<R> {
    pub fn new(reader: R, timeout: Duration) -> Self {
        Self { reader, timeout }
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), ReadFailure> {
        let actual = self.reader.read(buf, self.timeout)?;
        if actual != buf.len() {
            return Err(ReadFailure::ShortRead {
                expected: buf.len(),
                actual,
            });
        }
        Ok(())
    }
}

impl<R: EndpointRead> ReadBackend for SequentialReads<R> {
    fn kind(&self) -> BackendKind {
        BackendKind::Sequential
    }

    fn read_header(&mut self, buf: &mut [u8]) -> Result<(), ReadFailure> {
        check_buffer(buf, HEADER_LEN)?;
        self.read_exact(&mut buf[..HEADER_LEN])
    }

    fn read_payload(&mut self, buf: &mut [u8], len: usize) -> Result<(), ReadFailure> {
        check_buffer(buf, len)?;
        if len == 0 {
            return Ok(());
        }
        self.read_exact(&mut buf[..len])
    }

    fn discard(&mut self) {}
}

pub struct BulkCaptureReads<R> {
    reader: R,
    timeout: Duration,
    staging: Vec<u8>,
    /// Bytes received by the last capture, 0 when nothing is staged
    ///
    /// Only a header read or `discard` changes it.
    available: usize,
}

impl<R: EndpointRead> BulkCaptureReads<R> {
    pub fn new(reader: R, timeout: Duration) -> Self {
        Self {
            reader,
            timeout,
            staging: vec![0u8; MAX_TRANSFER_SIZE],
            available: 0,
        }
    }

    pub fn available(&self) -> usize {
        self.available
    }
}

impl<R: EndpointRead> ReadBackend for BulkCaptureReads<R> {
    fn kind(&self) -> BackendKind {
        BackendKind::BulkCapture
    }

    fn read_header(&mut self, buf: &mut [u8]) -> Result<(), ReadFailure> {
        check_buffer(buf, HEADER_LEN)?;

        self.available = 0;
        let received = self.reader.read(&mut self.staging, self.timeout)?;
        if received < HEADER_LEN {
            return Err(ReadFailure::ShortRead {
                expected: HEADER_LEN,
                actual: received,
            });
        }

        self.available = received;
        buf[..HEADER_LEN].copy_from_slice(&self.staging[..HEADER_LEN]);
        Ok(())
    }

    fn read_payload(&mut self, buf: &mut [u8], len: usize) -> Result<(), ReadFailure> {
        check_buffer(buf, len)?;

        if self.available < HEADER_LEN {
            return Err(ReadFailure::NotStaged);
        }

        let staged = self.available - HEADER_LEN;
        if len > staged {
            return Err(ReadFailure::Overrun {
                requested: len,
                available: staged,
            });
        }

        buf[..len].copy_from_slice(&self.staging[HEADER_LEN..HEADER_LEN + len]);
        Ok(())
    }

    fn discard(&mut self) {
        self.available = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::test_utils::{ReadStep, ScriptedReader, build_frame, random_payload};
    use protocol::PacketKind;

    const TIMEOUT: Duration = Duration::from_millis(400);

    #[test]
    fn test_backend_selection() {
        assert_eq!(BackendKind::select(true, false), BackendKind::Sequential);
        assert_eq!(BackendKind::select(true, true), BackendKind::BulkCapture);
        assert_eq!(BackendKind::select(false, false), BackendKind::BulkCapture);
        assert_eq!(BackendKind::select(false, true), BackendKind::BulkCapture);
    }

    #[test]
    fn test_bulk_payload_bounded_by_staged_bytes() {
        let payload = random_payload(100);
        let frame = build_frame(PacketKind::Video, &payload, 7);
        let reader = ScriptedReader::new(vec![ReadStep::Data(frame.clone())]);
        let mut backend = BulkCaptureReads::new(reader.clone(), TIMEOUT);

        let mut header = [0u8; HEADER_LEN];
        backend.read_header(&mut header).unwrap();
        assert_eq!(&header[..], &frame[..HEADER_LEN]);
        assert_eq!(backend.available(), frame.len());
        assert_eq!(reader.calls(), 1);

        let mut buf = vec![0u8; 200];
        assert_eq!(
            backend.read_payload(&mut buf, 101),
            Err(ReadFailure::Overrun {
                requested: 101,
                available: 100
            })
        );
        assert_eq!(reader.calls(), 1);

        backend.read_payload(&mut buf, 100).unwrap();
        assert_eq!(&buf[..100], &payload[..]);
        assert_eq!(reader.calls(), 1);
    }

    #[test]
    fn test_bulk_reads_whole_transfer() {
        let reader = ScriptedReader::new(vec![ReadStep::Data(vec![0u8; HEADER_LEN])]);
        let mut backend = BulkCaptureReads::new(reader.clone(), TIMEOUT);

        let mut header = [0u8; HEADER_LEN];
        backend.read_header(&mut header).unwrap();

        let call = reader.call_log()[0];
        assert_eq!(call.requested, MAX_TRANSFER_SIZE);
        assert_eq!(call.timeout, TIMEOUT);
    }

    #[test]
    fn test_bulk_payload_reads_keep_staged_frame() {
        let frame = build_frame(PacketKind::Audio, &[1, 2, 3, 4, 5], 0);
        let reader = ScriptedReader::new(vec![ReadStep::Data(frame.clone())]);
        let mut backend = BulkCaptureReads::new(reader.clone(), TIMEOUT);

        let mut header = [0u8; HEADER_LEN];
        backend.read_header(&mut header).unwrap();

        let mut buf = [0u8; 5];
        backend.read_payload(&mut buf, 2).unwrap();
        assert_eq!(&buf[..2], &[1, 2]);
        assert_eq!(backend.available(), frame.len());

        backend.read_payload(&mut buf, 3).unwrap();
        assert_eq!(&buf[..3], &[1, 2, 3]);

        backend.read_payload(&mut buf, 5).unwrap();
        assert_eq!(buf, [1, 2, 3, 4, 5]);
        assert_eq!(backend.available(), frame.len());
        assert_eq!(reader.calls(), 1);
    }

    #[test]
    fn test_bulk_short_capture_fails() {
        let reader = ScriptedReader::new(vec![ReadStep::Data(vec![0xDD; 10])]);
        let mut backend = BulkCaptureReads::new(reader, TIMEOUT);

        let mut header = [0u8; HEADER_LEN];
        assert_eq!(
            backend.read_header(&mut header),
            Err(ReadFailure::ShortRead {
                expected: HEADER_LEN,
                actual: 10
            })
        );
        assert_eq!(backend.available(), 0);
    }

    #[test]
    fn test_bulk_driver_error_clears_staging() {
        let frame = build_frame(PacketKind::Video, &[5; 8], 0);
        let reader = ScriptedReader::new(vec![
            ReadStep::Data(frame),
            ReadStep::Error(rusb::Error::Pipe),
        ]);
        let mut backend = BulkCaptureReads::new(reader, TIMEOUT);

        let mut header = [0u8; HEADER_LEN];
        backend.read_header(&mut header).unwrap();
        assert_eq!(
            backend.read_header(&mut header),
            Err(ReadFailure::Usb(rusb::Error::Pipe))
        );
        assert_eq!(backend.available(), 0);

        let mut buf = [0u8; 8];
        assert_eq!(backend.read_payload(&mut buf, 8), Err(ReadFailure::NotStaged));
    }

    #[test]
    fn test_bulk_discard() {
        let frame = build_frame(PacketKind::Video, &[5; 8], 0);
        let reader = ScriptedReader::new(vec![ReadStep::Data(frame)]);
        let mut backend = BulkCaptureReads::new(reader, TIMEOUT);

        let mut header = [0u8; HEADER_LEN];
        backend.read_header(&mut header).unwrap();
        backend.discard();

        let mut buf = [0u8; 8];
        assert_eq!(backend.read_payload(&mut buf, 8), Err(ReadFailure::NotStaged));
    }

    #[test]
    fn test_bulk_header_buffer_too_small() {
        let reader = ScriptedReader::new(vec![]);
        let mut backend = BulkCaptureReads::new(reader.clone(), TIMEOUT);

        let mut header = [0u8; 8];
        assert_eq!(
            backend.read_header(&mut header),
            Err(ReadFailure::BufferTooSmall {
                needed: HEADER_LEN,
                actual: 8
            })
        );
        assert_eq!(reader.calls(), 0);
    }

    #[test]
    fn test_sequential_short_payload_fails_without_driver_error() {
        let reader = ScriptedReader::new(vec![ReadStep::Data(vec![1, 2, 3])]);
        let mut backend = SequentialReads::new(reader, Duration::from_millis(200));

        let mut buf = [0u8; 10];
        assert_eq!(
            backend.read_payload(&mut buf, 10),
            Err(ReadFailure::ShortRead {
                expected: 10,
                actual: 3
            })
        );
    }

    #[test]
    fn test_sequential_exact_reads() {
        let payload = random_payload(32);
        let frame = build_frame(PacketKind::Audio, &payload, 99);
        let reader = ScriptedReader::new(vec![
            ReadStep::Data(frame[..HEADER_LEN].to_vec()),
            ReadStep::Data(payload.clone()),
        ]);
        let mut backend = SequentialReads::new(reader.clone(), Duration::from_millis(200));

        let mut header = [0u8; HEADER_LEN];
        backend.read_header(&mut header).unwrap();
        let mut buf = vec![0u8; 64];
        backend.read_payload(&mut buf, 32).unwrap();
        assert_eq!(&buf[..32], &payload[..]);

        let log = reader.call_log();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].requested, HEADER_LEN);
        assert_eq!(log[1].requested, 32);
        assert!(log.iter().all(|c| c.timeout == Duration::from_millis(200)));
    }

    #[test]
    fn test_sequential_short_header_fails() {
        let reader = ScriptedReader::new(vec![ReadStep::Data(vec![0xEE; 12])]);
        let mut backend = SequentialReads::new(reader, Duration::from_millis(200));

        let mut header = [0u8; HEADER_LEN];
        assert!(matches!(
            backend.read_header(&mut header),
            Err(ReadFailure::ShortRead { actual: 12, .. })
        ));
    }

    #[test]
    fn test_sequential_empty_payload() {
        let reader = ScriptedReader::new(vec![]);
        let mut backend = SequentialReads::new(reader.clone(), Duration::from_millis(200));

        let mut buf = [0u8; 0];
        backend.read_payload(&mut buf, 0).unwrap();
        assert_eq!(reader.calls(), 0);
    }
}
