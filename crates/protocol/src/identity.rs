//! Peripheral identity and endpoint addressing
//!
//! The console exposes a fixed vendor/product pair and advertises its
//! user-facing identifier through the serial number string descriptor,
//! formatted as `sysdvr:<identifier>`.

/// USB vendor ID of the streaming peripheral
pub const USB_VENDOR_ID: u16 = 0x18D1;

/// USB product ID of the streaming peripheral
pub const USB_PRODUCT_ID: u16 = 0x4EE0;

/// Reserved prefix of the serial number descriptor
pub const SERIAL_PREFIX: &str = "sysdvr:";

/// Interface carrying both stream endpoints
pub const STREAM_INTERFACE: u8 = 0;

/// Bulk IN endpoint for streamed data (EP1 IN)
pub const BULK_IN_ENDPOINT: u8 = 0x81;

/// Interrupt OUT endpoint for handshake requests (EP1 OUT)
pub const INTERRUPT_OUT_ENDPOINT: u8 = 0x01;

/// Check whether a vendor/product pair belongs to the streaming peripheral
pub fn matches_identity(vendor_id: u16, product_id: u16) -> bool {
    vendor_id == USB_VENDOR_ID && product_id == USB_PRODUCT_ID
}

/// Extract the device identifier from a serial number descriptor
///
/// Surrounding whitespace is ignored and the prefix is matched without regard
/// to case. The identifier keeps its original case and must not be empty.
///
/// # Example
/// ```
/// use protocol::parse_serial_identifier;
///
/// assert_eq!(parse_serial_identifier("sysdvr:ABC123").as_deref(), Some("ABC123"));
/// assert_eq!(parse_serial_identifier("0123456789"), None);
/// ```
pub fn parse_serial_identifier(serial: &str) -> Option<String> {
    let serial = serial.trim();
    let prefix = serial.get(..SERIAL_PREFIX.len())?;
    if !prefix.eq_ignore_ascii_case(SERIAL_PREFIX) {
        return None;
    }

    let identifier = &serial[SERIAL_PREFIX.len()..];
    if identifier.is_empty() {
        return None;
    }

    Some(identifier.to_string())
}
