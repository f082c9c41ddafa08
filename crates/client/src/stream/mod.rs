//! Streaming source
//!
//! [`UsbStreamingSource`] turns an opened device session into a stream of
//! frames. It sends the handshake magic until the peripheral accepts it, then
//! hands header and payload reads to the backend picked for this host.
//!
//! The source is synchronous and owned by one thread. Cancellation goes
//! through a [`StopSignal`], which is checked before every handshake attempt
//! and cuts the backoff and flush waits short.

pub mod backend;

pub use backend::{BackendKind, BulkCaptureReads, ReadBackend, ReadFailure, SequentialReads};

use crate::error::SetupError;
use crate::usb::DeviceSession;
use common::{EndpointRead, EndpointWrite, LinkControl, StopSignal};
use protocol::{StreamKind, StreamRequest};
use std::time::Duration;
use tracing::{debug, info, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceState {
    Disconnected,
    Handshaking,
    Connected,
}

/// Result of a handshake loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// The peripheral accepted the request after `attempts` writes
    Connected { attempts: u32 },
    /// The stop signal fired first
    Cancelled,
}

impl ConnectOutcome {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectOutcome::Connected { .. })
    }
}

/// Handshake counters over the lifetime of a source
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HandshakeStats {
    /// Handshake writes issued
    pub attempts: u32,
    /// Warnings logged; one per change of failure kind
    pub warnings: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamTimings {
    pub handshake_timeout: Duration,
    pub handshake_backoff: Duration,
    /// Time the peripheral needs to notice the host went quiet
    pub flush_settle: Duration,
    pub sequential_read_timeout: Duration,
    pub bulk_read_timeout: Duration,
}

impl Default for StreamTimings {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(1),
            handshake_backoff: Duration::from_secs(3),
            flush_settle: Duration::from_secs(3),
            sequential_read_timeout: Duration::from_millis(200),
            bulk_read_timeout: Duration::from_millis(400),
        }
    }
}

impl StreamTimings {
    fn read_timeout(&self, backend: BackendKind) -> Duration {
        match backend {
            BackendKind::Sequential => self.sequential_read_timeout,
            BackendKind::BulkCapture => self.bulk_read_timeout,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StreamOptions {
    pub backend: BackendKind,
    pub timings: StreamTimings,
    pub stop: StopSignal,
    /// Log every read failure at warn level instead of trace
    pub logging: bool,
}

impl StreamOptions {
    pub fn for_host(force_libusb: bool) -> Self {
        Self {
            backend: BackendKind::for_host(force_libusb),
            timings: StreamTimings::default(),
            stop: StopSignal::new(),
            logging: false,
        }
    }
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self::for_host(false)
    }
}

/// A source of framed A/V data, as seen by a demuxer
///
/// Reads return `false` when no valid data was produced; the buffer contents
/// are then meaningless.
pub trait StreamingSource: Send {
    fn connect(&mut self) -> ConnectOutcome;
    fn read_header(&mut self, buf: &mut [u8]) -> bool;
    fn read_payload(&mut self, buf: &mut [u8], len: usize) -> bool;
    /// Drop the current session state and handshake again
    fn flush(&mut self) -> ConnectOutcome;
    fn stop(&mut self);
    fn kind(&self) -> StreamKind;
    fn logging(&self) -> bool;
    fn set_logging(&mut self, enabled: bool);
}

pub struct UsbStreamingSource {
    request: StreamRequest,
    state: SourceState,
    backend: Box<dyn ReadBackend>,
    writer: Box<dyn EndpointWrite>,
    link: Box<dyn LinkControl>,
    timings: StreamTimings,
    stop: StopSignal,
    logging: bool,
    stats: HandshakeStats,
    /// Last handshake failure, used to avoid repeating the same warning
    last_error: Option<rusb::Error>,
}

impl UsbStreamingSource {
    /// Open the endpoints of `session` and build a source over them
    pub fn open(
        mut session: DeviceSession,
        request: StreamRequest,
        options: StreamOptions,
    ) -> Result<Self, SetupError> {
        let (reader, writer) = session.open_endpoint_pair()?;
        info!(
            "Streaming {} from device {} using {} reads",
            request.kind(),
            session.identifier(),
            options.backend
        );
        Ok(Self::from_parts(request, reader, writer, session, options))
    }

    /// Build a source over arbitrary endpoints
    pub fn from_parts<R, W, L>(
        request: StreamRequest,
        reader: R,
        writer: W,
        link: L,
        options: StreamOptions,
    ) -> Self
    where
        R: EndpointRead + 'static,
        W: EndpointWrite + 'static,
        L: LinkControl + 'static,
    {
        let timeout = options.timings.read_timeout(options.backend);
        let backend: Box<dyn ReadBackend> = match options.backend {
            BackendKind::Sequential => Box::new(SequentialReads::new(reader, timeout)),
            BackendKind::BulkCapture => Box::new(BulkCaptureReads::new(reader, timeout)),
        };

        Self {
            request,
            state: SourceState::Disconnected,
            backend,
            writer: Box::new(writer),
            link: Box::new(link),
            timings: options.timings,
            stop: options.stop,
            logging: options.logging,
            stats: HandshakeStats::default(),
            last_error: None,
        }
    }

    pub fn state(&self) -> SourceState {
        self.state
    }

    pub fn request(&self) -> StreamRequest {
        self.request
    }

    pub fn backend(&self) -> BackendKind {
        self.backend.kind()
    }

    pub fn handshake_stats(&self) -> HandshakeStats {
        self.stats
    }

    pub fn stop_signal(&self) -> &StopSignal {
        &self.stop
    }

    fn report(&self, what: &str, failure: ReadFailure) {
        if self.logging {
            warn!("{} read failed: {}", what, failure);
        } else {
            trace!("{} read failed: {}", what, failure);
        }
    }

    fn handshake_failed(&mut self, err: rusb::Error) {
        if self.last_error == Some(err) {
            debug!("Handshake attempt {} failed: {}", self.stats.attempts, err);
            return;
        }

        warn!(
            "Handshake failed: {}, retrying every {:?}",
            err, self.timings.handshake_backoff
        );
        self.stats.warnings += 1;
        self.last_error = Some(err);
    }
}

impl StreamingSource for UsbStreamingSource {
    fn connect(&mut self) -> ConnectOutcome {
        if !self.link.is_open() {
            debug!("Connect requested on a stopped source");
            return ConnectOutcome::Cancelled;
        }

        self.state = SourceState::Handshaking;
        let magic = self.request.magic();
        let mut attempts = 0u32;

        loop {
            if self.stop.is_stopped() {
                debug!("Handshake cancelled after {} attempt(s)", attempts);
                return ConnectOutcome::Cancelled;
            }

            attempts += 1;
            self.stats.attempts += 1;

            match self.writer.write(&magic, self.timings.handshake_timeout) {
                Ok(_) => {
                    self.last_error = None;
                    self.state = SourceState::Connected;
                    info!(
                        "Connected, requested {} after {} attempt(s)",
                        self.request.kind(),
                        attempts
                    );
                    return ConnectOutcome::Connected { attempts };
                }
                Err(e) => {
                    self.handshake_failed(e);
                    if self.stop.wait_timeout(self.timings.handshake_backoff) {
                        debug!("Handshake cancelled during backoff");
                        return ConnectOutcome::Cancelled;
                    }
                }
            }
        }
    }

    fn read_header(&mut self, buf: &mut [u8]) -> bool {
        if self.state != SourceState::Connected {
            self.report("Header", ReadFailure::NotConnected);
            return false;
        }

        match self.backend.read_header(buf) {
            Ok(()) => true,
            Err(failure) => {
                self.report("Header", failure);
                false
            }
        }
    }

    fn read_payload(&mut self, buf: &mut [u8], len: usize) -> bool {
        if self.state != SourceState::Connected {
            self.report("Payload", ReadFailure::NotConnected);
            return false;
        }

        match self.backend.read_payload(buf, len) {
            Ok(()) => true,
            Err(failure) => {
                self.report("Payload", failure);
                false
            }
        }
    }

    fn flush(&mut self) -> ConnectOutcome {
        if !self.link.is_open() {
            debug!("Flush requested on a stopped source");
            return ConnectOutcome::Cancelled;
        }

        self.state = SourceState::Handshaking;
        info!(
            "Flushing stream, waiting {:?} for the device to reset",
            self.timings.flush_settle
        );

        let stopped = self.stop.wait_timeout(self.timings.flush_settle);
        self.backend.discard();
        if stopped {
            debug!("Flush cancelled");
            return ConnectOutcome::Cancelled;
        }

        self.connect()
    }

    fn stop(&mut self) {
        if self.link.is_open() {
            self.link.close();
        }
        self.backend.discard();

        if self.state != SourceState::Disconnected {
            info!("Stream stopped");
            self.state = SourceState::Disconnected;
        }
    }

    fn kind(&self) -> StreamKind {
        self.request.kind()
    }

    fn logging(&self) -> bool {
        self.logging
    }

    fn set_logging(&mut self, enabled: bool) {
        self.logging = enabled;
    }
}

impl Drop for UsbStreamingSource {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for UsbStreamingSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UsbStreamingSource")
            .field("kind", &self.request.kind())
            .field("state", &self.state)
            .field("backend", &self.backend.kind())
            .field("stats", &self.stats)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::test_utils::{CountingLink, ScriptedReader, ScriptedWriter};

    fn quick_options(backend: BackendKind) -> StreamOptions {
        StreamOptions {
            backend,
            timings: StreamTimings {
                handshake_timeout: Duration::from_millis(5),
                handshake_backoff: Duration::from_millis(5),
                flush_settle: Duration::from_millis(5),
                sequential_read_timeout: Duration::from_millis(5),
                bulk_read_timeout: Duration::from_millis(5),
            },
            stop: StopSignal::new(),
            logging: false,
        }
    }

    #[test]
    fn test_default_timings() {
        let timings = StreamTimings::default();
        assert_eq!(timings.handshake_timeout, Duration::from_secs(1));
        assert_eq!(timings.handshake_backoff, Duration::from_secs(3));
        assert_eq!(timings.flush_settle, Duration::from_secs(3));
        assert_eq!(timings.sequential_read_timeout, Duration::from_millis(200));
        assert_eq!(timings.bulk_read_timeout, Duration::from_millis(400));
    }

    #[test]
    fn test_new_source_is_disconnected() {
        let source = UsbStreamingSource::from_parts(
            StreamRequest::new(true, false).unwrap(),
            ScriptedReader::default(),
            ScriptedWriter::default(),
            CountingLink::new(),
            quick_options(BackendKind::Sequential),
        );
        assert_eq!(source.state(), SourceState::Disconnected);
        assert_eq!(source.kind(), StreamKind::Video);
        assert_eq!(source.backend(), BackendKind::Sequential);
        assert!(!source.logging());
    }

    #[test]
    fn test_connect_sends_magic() {
        let writer = ScriptedWriter::default();
        let mut source = UsbStreamingSource::from_parts(
            StreamRequest::new(false, true).unwrap(),
            ScriptedReader::default(),
            writer.clone(),
            CountingLink::new(),
            quick_options(BackendKind::BulkCapture),
        );

        assert_eq!(source.connect(), ConnectOutcome::Connected { attempts: 1 });
        assert_eq!(source.state(), SourceState::Connected);

        let log = writer.call_log();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].data, vec![0xCC; 4]);
        assert_eq!(log[0].timeout, Duration::from_millis(5));
    }

    #[test]
    fn test_stop_is_idempotent() {
        let link = CountingLink::new();
        let mut source = UsbStreamingSource::from_parts(
            StreamRequest::new(true, true).unwrap(),
            ScriptedReader::default(),
            ScriptedWriter::default(),
            link.clone(),
            quick_options(BackendKind::BulkCapture),
        );

        source.connect();
        source.stop();
        source.stop();
        assert_eq!(source.state(), SourceState::Disconnected);
        assert_eq!(link.closes(), 1);

        drop(source);
        assert_eq!(link.closes(), 1);
    }

    #[test]
    fn test_drop_stops_source() {
        let link = CountingLink::new();
        let source = UsbStreamingSource::from_parts(
            StreamRequest::new(true, true).unwrap(),
            ScriptedReader::default(),
            ScriptedWriter::default(),
            link.clone(),
            quick_options(BackendKind::Sequential),
        );

        drop(source);
        assert_eq!(link.closes(), 1);
    }

    #[test]
    fn test_set_logging() {
        let mut source = UsbStreamingSource::from_parts(
            StreamRequest::new(true, true).unwrap(),
            ScriptedReader::default(),
            ScriptedWriter::default(),
            CountingLink::new(),
            quick_options(BackendKind::Sequential),
        );
        source.set_logging(true);
        assert!(source.logging());
    }
}
