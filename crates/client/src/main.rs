//! sysdvr-usb
//!
//! Command line client that finds a console streaming over USB, performs the
//! stream handshake and reports the frames it receives.

use anyhow::{Context, Result};
use clap::Parser;
use client::config::{self, ClientConfig};
use client::{DeviceContext, FrameProbe, ProbeEnd, SetupError, StreamingSource, UsbLogLevel};
use common::{StopSignal, setup_logging};
use tokio::signal;
use tracing::{debug, info};

#[derive(Parser, Debug)]
#[command(name = "sysdvr-usb")]
#[command(author, version, about = "Receive console A/V streams over USB")]
#[command(long_about = "
Connects to a console running the streaming sysmodule in USB mode, requests
the selected streams and reports the frames that arrive.

EXAMPLES:
    # List attached streaming devices
    sysdvr-usb --list-devices

    # Stream video and audio from the first device until Ctrl+C
    sysdvr-usb

    # Read 500 audio frames from a specific console
    sysdvr-usb --serial ABC123 --no-video --frames 500

CONFIGURATION:
    The client looks for configuration files in the following order:
    1. Path specified with --config
    2. ~/.config/sysdvr-usb/client.toml
    3. /etc/sysdvr-usb/client.toml
    4. Built-in defaults
")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<String>,

    /// Save default configuration to default location and exit
    #[arg(long)]
    save_config: bool,

    /// List attached streaming devices and exit
    #[arg(long)]
    list_devices: bool,

    /// Identifier of the device to open (serial without the "sysdvr:" prefix)
    #[arg(short, long, value_name = "ID")]
    serial: Option<String>,

    /// Do not request the video stream
    #[arg(long)]
    no_video: bool,

    /// Do not request the audio stream
    #[arg(long)]
    no_audio: bool,

    /// Use libusb bulk-capture reads even on Windows
    #[arg(long)]
    force_libusb: bool,

    /// Stop after this many frames (0 = until Ctrl+C)
    #[arg(short, long, value_name = "N", default_value_t = 0)]
    frames: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// libusb log level
    #[arg(long, value_enum, value_name = "LEVEL")]
    usb_log_level: Option<UsbLogLevel>,
}

impl Args {
    /// Command line flags take precedence over the configuration file
    fn apply(&self, config: &mut ClientConfig) {
        if let Some(serial) = &self.serial {
            config.stream.serial = Some(serial.clone());
        }
        if self.no_video {
            config.stream.video = false;
        }
        if self.no_audio {
            config.stream.audio = false;
        }
        if self.force_libusb {
            config.stream.force_libusb = true;
        }
        if let Some(level) = &self.log_level {
            config.client.log_level = level.clone();
        }
        if let Some(level) = self.usb_log_level {
            config.client.usb_log_level = level;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Handle --save-config flag early (before loading config)
    if args.save_config {
        let config = ClientConfig::default();
        let path = ClientConfig::default_path();
        config.save(&path).context("Failed to save configuration")?;
        println!("Configuration saved to: {}", path.display());
        return Ok(());
    }

    let mut config = if let Some(ref path) = args.config {
        config::load_config(path).context("Failed to load configuration")?
    } else {
        ClientConfig::load_or_default()
    };

    args.apply(&mut config);
    config.validate().context("Invalid configuration")?;

    setup_logging(&config.client.log_level, config.client.log_format)
        .context("Failed to setup logging")?;

    info!("sysdvr-usb v{}", env!("CARGO_PKG_VERSION"));
    debug!("Log level: {}", config.client.log_level);

    if args.list_devices {
        return tokio::task::spawn_blocking(move || list_devices(&config))
            .await
            .context("Device scan task failed")?;
    }

    let stop = StopSignal::new();
    let probe_stop = stop.clone();
    let frames = args.frames;
    let mut probe_task = tokio::task::spawn_blocking(move || run_probe(&config, probe_stop, frames));

    let result = tokio::select! {
        result = &mut probe_task => result,
        _ = signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
            stop.stop();
            probe_task.await
        }
    };

    result.context("Streaming task failed")?
}

/// Turn a setup failure into a CLI error, printing a hint when one applies
fn setup_failure(err: SetupError, what: &'static str) -> anyhow::Error {
    if let Some(hint) = err.hint() {
        eprintln!("Hint: {}", hint);
    }
    anyhow::Error::new(err).context(what)
}

fn list_devices(config: &ClientConfig) -> Result<()> {
    let context = DeviceContext::new(config.client.usb_log_level)
        .map_err(|e| setup_failure(e, "Failed to initialise USB"))?;
    let candidates = context
        .find_candidates()
        .map_err(|e| setup_failure(e, "Failed to scan for devices"))?;

    if candidates.is_empty() {
        println!("No streaming devices found");
        return Ok(());
    }

    println!("{:<24} {:>4} {:>8}", "IDENTIFIER", "BUS", "ADDRESS");
    for candidate in &candidates {
        println!(
            "{:<24} {:>4} {:>8}",
            candidate.identifier(),
            candidate.bus_number(),
            candidate.address()
        );
    }
    Ok(())
}

fn run_probe(config: &ClientConfig, stop: StopSignal, frames: u64) -> Result<()> {
    let request = config.stream_request()?;

    let context = DeviceContext::new(config.client.usb_log_level)
        .map_err(|e| setup_failure(e, "Failed to initialise USB"))?;
    let candidate = context
        .find_candidate(config.stream.serial.as_deref())
        .map_err(|e| setup_failure(e, "Failed to find a streaming device"))?;
    let session = context
        .open(&candidate)
        .map_err(|e| setup_failure(e, "Failed to open device"))?;

    let mut options = config.stream_options(stop.clone());
    // Per-read diagnostics only when someone is looking at debug output
    options.logging = matches!(config.client.log_level.as_str(), "debug" | "trace");

    let source = context
        .create_streaming_source(session, request, options)
        .map_err(|e| setup_failure(e, "Failed to start streaming"))?;

    info!(
        "Waiting for device {} to accept the {} stream request",
        candidate.identifier(),
        source.kind()
    );

    let mut probe = FrameProbe::new(source, config.probe_settings(frames), stop);
    let end = probe.run();

    let stats = *probe.stats();
    let handshake = probe.source().handshake_stats();
    let reason = match end {
        ProbeEnd::FrameLimit => "frame limit reached",
        ProbeEnd::Stopped => "stopped",
        ProbeEnd::Cancelled => "cancelled",
    };

    println!("Stream ended ({})", reason);
    println!(
        "  video: {} frames, {} bytes",
        stats.video_frames, stats.video_bytes
    );
    println!(
        "  audio: {} frames, {} bytes",
        stats.audio_frames, stats.audio_bytes
    );
    println!(
        "  failures: {}, flushes: {}, handshake attempts: {}",
        stats.failures, stats.flushes, handshake.attempts
    );

    Ok(())
}
