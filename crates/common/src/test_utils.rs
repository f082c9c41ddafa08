//! Test utilities for sysdvr-usb
//!
//! Scripted endpoints and frame builders for exercising the streaming source
//! without hardware.
//!
//! # Example
//!
//! ```
//! use common::test_utils::{ReadStep, ScriptedReader, build_frame};
//! use common::EndpointRead;
//! use protocol::PacketKind;
//! use std::time::Duration;
//!
//! let frame = build_frame(PacketKind::Audio, &[1, 2, 3], 0);
//! let mut reader = ScriptedReader::new(vec![ReadStep::Data(frame.clone())]);
//! let mut buf = vec![0u8; 64];
//! let n = reader.read(&mut buf, Duration::from_millis(10)).unwrap();
//! assert_eq!(&buf[..n], &frame[..]);
//! assert_eq!(reader.calls(), 1);
//! ```

use crate::endpoint::{EndpointRead, EndpointWrite, LinkControl};
use crate::stop::StopSignal;
use protocol::{HEADER_LEN, PacketHeader, PacketKind};
use rand::Rng;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// One scripted outcome of a read call
#[derive(Debug, Clone)]
pub enum ReadStep {
    /// Deliver these bytes (truncated to the caller's buffer)
    Data(Vec<u8>),
    /// Fail with this driver error
    Error(rusb::Error),
}

/// A read call as observed by a [`ScriptedReader`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadCall {
    pub requested: usize,
    pub timeout: Duration,
}

#[derive(Debug, Default)]
struct ReaderState {
    steps: VecDeque<ReadStep>,
    calls: Vec<ReadCall>,
}

/// Inbound endpoint replaying a fixed script
///
/// Clones share the script and the call log, so a test can hand one clone to
/// the code under test and inspect the other. Once the script runs out every
/// read times out.
#[derive(Debug, Clone, Default)]
pub struct ScriptedReader {
    state: Arc<Mutex<ReaderState>>,
}

impl ScriptedReader {
    pub fn new(steps: Vec<ReadStep>) -> Self {
        Self {
            state: Arc::new(Mutex::new(ReaderState {
                steps: steps.into(),
                calls: Vec::new(),
            })),
        }
    }

    /// Append more steps to the script
    pub fn push(&self, step: ReadStep) {
        self.state.lock().unwrap().steps.push_back(step);
    }

    /// Number of read calls issued so far
    pub fn calls(&self) -> usize {
        self.state.lock().unwrap().calls.len()
    }

    pub fn call_log(&self) -> Vec<ReadCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn remaining(&self) -> usize {
        self.state.lock().unwrap().steps.len()
    }
}

impl EndpointRead for ScriptedReader {
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> rusb::Result<usize> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(ReadCall {
            requested: buf.len(),
            timeout,
        });

        match state.steps.pop_front() {
            Some(ReadStep::Data(data)) => {
                let n = data.len().min(buf.len());
                buf[..n].copy_from_slice(&data[..n]);
                Ok(n)
            }
            Some(ReadStep::Error(err)) => Err(err),
            None => Err(rusb::Error::Timeout),
        }
    }
}

/// A write call as observed by a [`ScriptedWriter`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteCall {
    pub data: Vec<u8>,
    pub timeout: Duration,
    pub at: Instant,
}

#[derive(Debug, Default)]
struct WriterState {
    results: VecDeque<rusb::Result<()>>,
    calls: Vec<WriteCall>,
    stop_after: Option<(usize, StopSignal)>,
}

/// Outbound endpoint replaying a fixed list of results
///
/// Writes succeed once the script runs out. With [`ScriptedWriter::stop_after`]
/// the writer fires a [`StopSignal`] after a given number of writes, which is
/// how tests cancel a handshake mid-loop.
#[derive(Debug, Clone, Default)]
pub struct ScriptedWriter {
    state: Arc<Mutex<WriterState>>,
}

impl ScriptedWriter {
    pub fn new(results: Vec<rusb::Result<()>>) -> Self {
        Self {
            state: Arc::new(Mutex::new(WriterState {
                results: results.into(),
                ..Default::default()
            })),
        }
    }

    /// A writer whose every call fails with `err`
    pub fn always_failing(err: rusb::Error, count: usize) -> Self {
        Self::new(vec![Err(err); count])
    }

    /// Fire `signal` once `writes` calls have been made
    pub fn stop_after(self, writes: usize, signal: StopSignal) -> Self {
        self.state.lock().unwrap().stop_after = Some((writes, signal));
        self
    }

    pub fn calls(&self) -> usize {
        self.state.lock().unwrap().calls.len()
    }

    pub fn call_log(&self) -> Vec<WriteCall> {
        self.state.lock().unwrap().calls.clone()
    }
}

impl EndpointWrite for ScriptedWriter {
    fn write(&mut self, buf: &[u8], timeout: Duration) -> rusb::Result<usize> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(WriteCall {
            data: buf.to_vec(),
            timeout,
            at: Instant::now(),
        });

        let made = state.calls.len();
        if let Some((limit, signal)) = &state.stop_after
            && made >= *limit
        {
            signal.stop();
        }

        match state.results.pop_front() {
            Some(Ok(())) | None => Ok(buf.len()),
            Some(Err(err)) => Err(err),
        }
    }
}

/// Link that only counts how often it was closed
#[derive(Debug, Clone)]
pub struct CountingLink {
    closes: Arc<AtomicUsize>,
    open: Arc<AtomicBool>,
}

impl Default for CountingLink {
    fn default() -> Self {
        Self {
            closes: Arc::new(AtomicUsize::new(0)),
            open: Arc::new(AtomicBool::new(true)),
        }
    }
}

impl CountingLink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

impl LinkControl for CountingLink {
    fn close(&mut self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.open.store(false, Ordering::SeqCst);
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

/// Build a header followed by `payload`, as the peripheral would send it
pub fn build_frame(kind: PacketKind, payload: &[u8], timestamp_us: u64) -> Vec<u8> {
    let header = PacketHeader {
        kind,
        data_size: payload.len() as u32,
        timestamp_us,
    };

    let mut frame = vec![0u8; HEADER_LEN + payload.len()];
    header.write(&mut frame);
    frame[HEADER_LEN..].copy_from_slice(payload);
    frame
}

/// Random payload bytes of the given length
pub fn random_payload(len: usize) -> Vec<u8> {
    let mut rng = rand::rng();
    (0..len).map(|_| rng.random()).collect()
}
