//! USB context and device enumeration
//!
//! [`DeviceContext`] owns the libusb context, finds streaming peripherals and
//! opens at most one of them at a time.

use crate::error::SetupError;
use crate::stream::{StreamOptions, UsbStreamingSource};
use crate::usb::session::DeviceSession;
use protocol::{StreamRequest, matches_identity, parse_serial_identifier};
use rusb::{Context, Device, DeviceDescriptor, UsbContext as _};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

/// libusb diagnostic verbosity
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum UsbLogLevel {
    None,
    #[default]
    Error,
    Warning,
    Info,
    Debug,
}

impl UsbLogLevel {
    fn to_rusb(self) -> rusb::LogLevel {
        match self {
            UsbLogLevel::None => rusb::LogLevel::None,
            UsbLogLevel::Error => rusb::LogLevel::Error,
            UsbLogLevel::Warning => rusb::LogLevel::Warning,
            UsbLogLevel::Info => rusb::LogLevel::Info,
            UsbLogLevel::Debug => rusb::LogLevel::Debug,
        }
    }
}

/// Something whose native log level can be changed
trait NativeLogLevel {
    fn apply_log_level(&mut self, level: UsbLogLevel);
}

impl NativeLogLevel for Context {
    fn apply_log_level(&mut self, level: UsbLogLevel) {
        self.set_log_level(level.to_rusb());
    }
}

/// Silences native logging until dropped, then restores the saved level
///
/// Probing a device that another process already holds makes libusb print
/// errors of its own, which are expected during a scan.
struct LogLevelGuard<T: NativeLogLevel> {
    target: T,
    restore: UsbLogLevel,
}

impl<T: NativeLogLevel> LogLevelGuard<T> {
    fn silence(mut target: T, restore: UsbLogLevel) -> Self {
        target.apply_log_level(UsbLogLevel::None);
        Self { target, restore }
    }
}

impl<T: NativeLogLevel> Drop for LogLevelGuard<T> {
    fn drop(&mut self) {
        self.target.apply_log_level(self.restore);
    }
}

/// A streaming peripheral found during enumeration
pub struct DeviceCandidate {
    device: Device<Context>,
    identifier: String,
}

impl DeviceCandidate {
    /// Identifier from the serial descriptor, without the reserved prefix
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn bus_number(&self) -> u8 {
        self.device.bus_number()
    }

    pub fn address(&self) -> u8 {
        self.device.address()
    }
}

impl std::fmt::Debug for DeviceCandidate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceCandidate")
            .field("identifier", &self.identifier)
            .field("bus", &self.bus_number())
            .field("address", &self.address())
            .finish()
    }
}

pub struct DeviceContext {
    context: Context,
    log_level: UsbLogLevel,
    /// Set while a session opened from this context is alive
    device_open: Arc<AtomicBool>,
}

impl DeviceContext {
    pub fn new(log_level: UsbLogLevel) -> Result<Self, SetupError> {
        let mut context = Context::new().map_err(SetupError::Context)?;
        context.apply_log_level(log_level);

        Ok(Self {
            context,
            log_level,
            device_open: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn log_level(&self) -> UsbLogLevel {
        self.log_level
    }

    pub fn set_log_level(&mut self, level: UsbLogLevel) {
        self.log_level = level;
        self.context.apply_log_level(level);
    }

    pub fn has_open_device(&self) -> bool {
        self.device_open.load(Ordering::SeqCst)
    }

    /// Scan the bus for streaming peripherals
    ///
    /// Devices that cannot be opened, have no serial descriptor, or whose
    /// serial lacks the reserved prefix are skipped. Only a failure to list
    /// the bus is an error.
    pub fn find_candidates(&self) -> Result<Vec<DeviceCandidate>, SetupError> {
        if self.has_open_device() {
            return Err(SetupError::DeviceAlreadyOpen);
        }

        let _quiet = LogLevelGuard::silence(self.context.clone(), self.log_level);

        let devices = self.context.devices().map_err(SetupError::Enumerate)?;
        let mut candidates = Vec::new();

        for device in devices.iter() {
            let descriptor = match device.device_descriptor() {
                Ok(descriptor) => descriptor,
                Err(e) => {
                    debug!(
                        "Failed to read descriptor: bus={}, addr={}: {}",
                        device.bus_number(),
                        device.address(),
                        e
                    );
                    continue;
                }
            };

            if !matches_identity(descriptor.vendor_id(), descriptor.product_id()) {
                continue;
            }

            if let Some(identifier) = read_identifier(&device, &descriptor) {
                debug!(
                    "Found streaming device '{}': bus={}, addr={}",
                    identifier,
                    device.bus_number(),
                    device.address()
                );
                candidates.push(DeviceCandidate { device, identifier });
            }
        }

        debug!("Enumerated {} streaming device(s)", candidates.len());
        Ok(candidates)
    }

    /// Pick the candidate with the given identifier, or the first one found
    pub fn find_candidate(&self, identifier: Option<&str>) -> Result<DeviceCandidate, SetupError> {
        let candidates = self.find_candidates()?;

        match identifier {
            Some(wanted) => candidates
                .into_iter()
                .find(|c| c.identifier.eq_ignore_ascii_case(wanted))
                .ok_or_else(|| SetupError::IdentifierNotFound(wanted.to_string())),
            None => candidates
                .into_iter()
                .next()
                .ok_or(SetupError::DeviceNotFound),
        }
    }

    /// Open a candidate for streaming
    ///
    /// Only one device may be open per context; the slot frees up when the
    /// returned session is closed.
    pub fn open(&self, candidate: &DeviceCandidate) -> Result<DeviceSession, SetupError> {
        if self
            .device_open
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(SetupError::DeviceAlreadyOpen);
        }

        match candidate.device.open() {
            Ok(handle) => {
                info!(
                    "Opened device '{}' at bus {:03} address {:03}",
                    candidate.identifier,
                    candidate.bus_number(),
                    candidate.address()
                );
                Ok(DeviceSession::new(
                    handle,
                    candidate.identifier.clone(),
                    self.device_open.clone(),
                ))
            }
            Err(e) => {
                self.device_open.store(false, Ordering::SeqCst);
                Err(SetupError::Open(e))
            }
        }
    }

    /// Build a streaming source over an opened session
    pub fn create_streaming_source(
        &self,
        session: DeviceSession,
        request: StreamRequest,
        options: StreamOptions,
    ) -> Result<UsbStreamingSource, SetupError> {
        UsbStreamingSource::open(session, request, options)
    }
}

impl std::fmt::Debug for DeviceContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceContext")
            .field("log_level", &self.log_level)
            .field("device_open", &self.has_open_device())
            .finish()
    }
}

/// Briefly open a device to read its identifier from the serial descriptor
fn read_identifier(device: &Device<Context>, descriptor: &DeviceDescriptor) -> Option<String> {
    let handle = match device.open() {
        Ok(handle) => handle,
        Err(e) => {
            debug!(
                "Skipping device at bus={}, addr={}: unable to open ({})",
                device.bus_number(),
                device.address(),
                e
            );
            return None;
        }
    };

    let serial = match handle.read_serial_number_string_ascii(descriptor) {
        Ok(serial) => serial,
        Err(e) => {
            debug!(
                "Skipping device at bus={}, addr={}: no serial descriptor ({})",
                device.bus_number(),
                device.address(),
                e
            );
            return None;
        }
    };

    let identifier = parse_serial_identifier(&serial);
    if identifier.is_none() {
        debug!(
            "Skipping device at bus={}, addr={}: serial '{}' is not a streaming device",
            device.bus_number(),
            device.address(),
            serial
        );
    }

    identifier
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Clone, Default)]
    struct Recorder(Arc<Mutex<Vec<UsbLogLevel>>>);

    impl NativeLogLevel for Recorder {
        fn apply_log_level(&mut self, level: UsbLogLevel) {
            self.0.lock().unwrap().push(level);
        }
    }

    #[test]
    fn test_guard_silences_then_restores() {
        let recorder = Recorder::default();
        {
            let _quiet = LogLevelGuard::silence(recorder.clone(), UsbLogLevel::Warning);
            assert_eq!(*recorder.0.lock().unwrap(), vec![UsbLogLevel::None]);
        }
        assert_eq!(
            *recorder.0.lock().unwrap(),
            vec![UsbLogLevel::None, UsbLogLevel::Warning]
        );
    }

    #[test]
    fn test_guard_restores_on_early_return() {
        fn scan(recorder: Recorder, bus_available: bool) -> Result<(), &'static str> {
            let _quiet = LogLevelGuard::silence(recorder, UsbLogLevel::Debug);
            if !bus_available {
                return Err("bus unavailable");
            }
            Ok(())
        }

        let recorder = Recorder::default();
        assert!(scan(recorder.clone(), false).is_err());
        assert_eq!(
            recorder.0.lock().unwrap().last(),
            Some(&UsbLogLevel::Debug)
        );
    }

    #[test]
    fn test_guard_restores_on_panic() {
        let recorder = Recorder::default();
        let inner = recorder.clone();
        let result = std::panic::catch_unwind(move || {
            let _quiet = LogLevelGuard::silence(inner, UsbLogLevel::Info);
            panic!("probe failed");
        });

        assert!(result.is_err());
        assert_eq!(recorder.0.lock().unwrap().last(), Some(&UsbLogLevel::Info));
    }

    #[test]
    fn test_log_level_mapping() {
        assert!(matches!(
            UsbLogLevel::None.to_rusb(),
            rusb::LogLevel::None
        ));
        assert!(matches!(
            UsbLogLevel::Warning.to_rusb(),
            rusb::LogLevel::Warning
        ));
        assert_eq!(UsbLogLevel::default(), UsbLogLevel::Error);
    }
}
