//! Frame probe
//!
//! A minimal consumer for a [`StreamingSource`]: it pulls frames, checks their
//! headers and counts what arrives. The CLI uses it to verify that a device
//! streams, and it doubles as the reference for how a demuxer should drive a
//! source (header, then payload, flushing when the stream loses sync).

use crate::stream::StreamingSource;
use common::StopSignal;
use protocol::{HEADER_LEN, MAX_VIDEO_PAYLOAD, PacketHeader, PacketKind};
use std::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeSettings {
    /// Stop after this many frames, 0 to run until stopped
    pub max_frames: u64,
    /// Failed frames in a row before the source is flushed
    pub max_consecutive_failures: u32,
    /// Log a progress line every N frames, 0 to disable
    pub report_interval: u64,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            max_frames: 0,
            max_consecutive_failures: 3,
            report_interval: 100,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProbeStats {
    pub video_frames: u64,
    pub audio_frames: u64,
    pub video_bytes: u64,
    pub audio_bytes: u64,
    /// Frames lost to read failures or invalid headers
    pub failures: u64,
    pub flushes: u64,
}

impl ProbeStats {
    pub fn frames(&self) -> u64 {
        self.video_frames + self.audio_frames
    }

    fn record(&mut self, header: &PacketHeader) {
        let bytes = header.payload_len() as u64;
        match header.kind {
            PacketKind::Video => {
                self.video_frames += 1;
                self.video_bytes += bytes;
            }
            PacketKind::Audio => {
                self.audio_frames += 1;
                self.audio_bytes += bytes;
            }
        }
    }
}

/// Why a probe run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeEnd {
    /// The requested number of frames arrived
    FrameLimit,
    /// The stop signal fired between frames
    Stopped,
    /// A connect or flush handshake was cancelled
    Cancelled,
}

pub struct FrameProbe<S> {
    source: S,
    settings: ProbeSettings,
    stop: StopSignal,
    stats: ProbeStats,
    header: [u8; HEADER_LEN],
    payload: Vec<u8>,
}

impl<S: StreamingSource> FrameProbe<S> {
    pub fn new(source: S, settings: ProbeSettings, stop: StopSignal) -> Self {
        Self {
            source,
            settings,
            stop,
            stats: ProbeStats::default(),
            header: [0u8; HEADER_LEN],
            payload: vec![0u8; MAX_VIDEO_PAYLOAD],
        }
    }

    pub fn stats(&self) -> &ProbeStats {
        &self.stats
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn into_source(self) -> S {
        self.source
    }

    /// Connect and read frames until the budget is spent or the probe is stopped
    pub fn run(&mut self) -> ProbeEnd {
        if !self.source.connect().is_connected() {
            return ProbeEnd::Cancelled;
        }

        let started = Instant::now();
        let mut consecutive_failures = 0u32;

        loop {
            if self.stop.is_stopped() {
                return ProbeEnd::Stopped;
            }
            if self.settings.max_frames > 0 && self.stats.frames() >= self.settings.max_frames {
                return ProbeEnd::FrameLimit;
            }

            match self.next_frame() {
                Some(header) => {
                    consecutive_failures = 0;
                    self.stats.record(&header);

                    let frames = self.stats.frames();
                    if self.settings.report_interval > 0
                        && frames % self.settings.report_interval == 0
                    {
                        info!(
                            "{} frames in {:.1}s (video: {}, audio: {})",
                            frames,
                            started.elapsed().as_secs_f64(),
                            self.stats.video_frames,
                            self.stats.audio_frames
                        );
                    }
                }
                None => {
                    self.stats.failures += 1;
                    consecutive_failures += 1;

                    if consecutive_failures >= self.settings.max_consecutive_failures {
                        warn!(
                            "{} failed frames in a row, flushing the stream",
                            consecutive_failures
                        );
                        consecutive_failures = 0;
                        self.stats.flushes += 1;
                        if !self.source.flush().is_connected() {
                            return ProbeEnd::Cancelled;
                        }
                    }
                }
            }
        }
    }

    fn next_frame(&mut self) -> Option<PacketHeader> {
        if !self.source.read_header(&mut self.header) {
            return None;
        }

        let header = match PacketHeader::parse(&self.header) {
            Ok(header) => header,
            Err(e) => {
                debug!("Discarding frame: {}", e);
                return None;
            }
        };

        if !self
            .source
            .read_payload(&mut self.payload, header.payload_len())
        {
            return None;
        }

        Some(header)
    }
}
