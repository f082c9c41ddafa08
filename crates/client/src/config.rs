//! Client configuration management

use crate::probe::ProbeSettings;
use crate::stream::{BackendKind, StreamOptions, StreamTimings};
use crate::usb::UsbLogLevel;
use anyhow::{Context, Result, anyhow};
use common::{LogFormat, StopSignal};
use protocol::StreamRequest;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub client: ClientSettings,
    pub stream: StreamSettings,
    pub timings: TimingSettings,
    pub probe: ProbeConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    pub log_level: String,
    pub log_format: LogFormat,
    /// Verbosity of libusb's own diagnostics
    pub usb_log_level: UsbLogLevel,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::default(),
            usb_log_level: UsbLogLevel::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamSettings {
    pub video: bool,
    pub audio: bool,
    /// Use libusb bulk-capture reads even where WinUSB is available
    pub force_libusb: bool,
    /// Identifier of the device to open, the first one found if unset
    pub serial: Option<String>,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            video: true,
            audio: true,
            force_libusb: false,
            serial: None,
        }
    }
}

/// Stream timings in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingSettings {
    pub handshake_timeout_ms: u64,
    pub handshake_backoff_ms: u64,
    pub flush_settle_ms: u64,
    pub sequential_read_timeout_ms: u64,
    pub bulk_read_timeout_ms: u64,
}

impl Default for TimingSettings {
    fn default() -> Self {
        let defaults = StreamTimings::default();
        Self {
            handshake_timeout_ms: defaults.handshake_timeout.as_millis() as u64,
            handshake_backoff_ms: defaults.handshake_backoff.as_millis() as u64,
            flush_settle_ms: defaults.flush_settle.as_millis() as u64,
            sequential_read_timeout_ms: defaults.sequential_read_timeout.as_millis() as u64,
            bulk_read_timeout_ms: defaults.bulk_read_timeout.as_millis() as u64,
        }
    }
}

impl TimingSettings {
    fn fields(&self) -> [(&'static str, u64); 5] {
        [
            ("handshake_timeout_ms", self.handshake_timeout_ms),
            ("handshake_backoff_ms", self.handshake_backoff_ms),
            ("flush_settle_ms", self.flush_settle_ms),
            ("sequential_read_timeout_ms", self.sequential_read_timeout_ms),
            ("bulk_read_timeout_ms", self.bulk_read_timeout_ms),
        ]
    }
}

impl From<TimingSettings> for StreamTimings {
    fn from(t: TimingSettings) -> Self {
        Self {
            handshake_timeout: Duration::from_millis(t.handshake_timeout_ms),
            handshake_backoff: Duration::from_millis(t.handshake_backoff_ms),
            flush_settle: Duration::from_millis(t.flush_settle_ms),
            sequential_read_timeout: Duration::from_millis(t.sequential_read_timeout_ms),
            bulk_read_timeout: Duration::from_millis(t.bulk_read_timeout_ms),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    pub max_consecutive_failures: u32,
    /// Frames between progress lines, 0 to disable
    pub report_interval: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        let defaults = ProbeSettings::default();
        Self {
            max_consecutive_failures: defaults.max_consecutive_failures,
            report_interval: defaults.report_interval,
        }
    }
}

impl ClientConfig {
    /// Stream mix selected by the `[stream]` section
    pub fn stream_request(&self) -> Result<StreamRequest> {
        StreamRequest::new(self.stream.video, self.stream.audio)
            .map_err(|e| anyhow!("Invalid stream selection: {}", e))
    }

    pub fn stream_options(&self, stop: StopSignal) -> StreamOptions {
        StreamOptions {
            backend: BackendKind::for_host(self.stream.force_libusb),
            timings: self.timings.into(),
            stop,
            logging: false,
        }
    }

    pub fn probe_settings(&self, max_frames: u64) -> ProbeSettings {
        ProbeSettings {
            max_frames,
            max_consecutive_failures: self.probe.max_consecutive_failures,
            report_interval: self.probe.report_interval,
        }
    }
}

impl ClientConfig {
    /// Load configuration from the specified path
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = if let Some(p) = path {
            p
        } else {
            // Try standard locations in order
            let candidates = vec![
                Self::default_path(),
                PathBuf::from("/etc/sysdvr-usb/client.toml"),
            ];

            candidates
                .into_iter()
                .find(|p| p.exists())
                .ok_or_else(|| anyhow!("No configuration file found, using defaults"))?
        };

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: ClientConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;

        config.validate()?;

        tracing::info!("Loaded configuration from: {}", config_path.display());
        tracing::debug!(
            "Config: video={}, audio={}, force_libusb={}, serial={:?}",
            config.stream.video,
            config.stream.audio,
            config.stream.force_libusb,
            config.stream.serial
        );
        Ok(config)
    }

    /// Load configuration or return defaults if not found
    pub fn load_or_default() -> Self {
        match Self::load(None) {
            Ok(config) => config,
            Err(e) => {
                // Print to stderr since logging might not be initialized yet
                eprintln!("Config: {}", e);
                Self::default()
            }
        }
    }

    /// Save configuration to the specified path
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::info!("Saved configuration to: {}", path.display());
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("sysdvr-usb").join("client.toml")
        } else {
            PathBuf::from(".config/sysdvr-usb/client.toml")
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.client.log_level.as_str()) {
            return Err(anyhow!(
                "Invalid log level '{}', must be one of: {}",
                self.client.log_level,
                valid_levels.join(", ")
            ));
        }

        self.stream_request()?;

        if let Some(serial) = &self.stream.serial
            && serial.trim().is_empty()
        {
            return Err(anyhow!("Device serial must not be empty"));
        }

        for (name, value) in self.timings.fields() {
            if value == 0 {
                return Err(anyhow!("Timing '{}' must be greater than zero", name));
            }
        }

        if self.probe.max_consecutive_failures == 0 {
            return Err(anyhow!("probe.max_consecutive_failures must be at least 1"));
        }

        Ok(())
    }
}

/// Load a configuration file, expanding `~` in the path
pub fn load_config(path: &str) -> Result<ClientConfig> {
    let path_buf = PathBuf::from(shellexpand::tilde(path).as_ref());
    ClientConfig::load(Some(path_buf))
}
