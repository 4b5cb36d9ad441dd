//! Enumerating serial devices and picking a startup candidate.
//!
//! The selection order is a best-effort heuristic for "most likely the
//! intended microcontroller", not a correctness guarantee.

use serde::{Deserialize, Serialize};
use tracing::warn;

/// The USB vendor id of the target microcontroller family
/// (Raspberry Pi), as 4-digit lowercase hex.
pub const TARGET_VENDOR_ID: &str = "2e8a";

/// Device paths a UART commonly shows up under, in preference order.
const COMMON_UART_PATHS: &[&str] = &[
    "/dev/ttyACM0",
    "/dev/ttyACM1",
    "/dev/ttyUSB0",
    "/dev/ttyUSB1",
    "/dev/cu.usbmodem0",
    "/dev/cu.usbserial-0",
];

/// Metadata describing one discoverable serial device.
///
/// Produced fresh on every enumeration; `path` is the only identity.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DeviceDescriptor {
    /// The OS-assigned device path, e.g. `/dev/ttyACM0` or `COM3`.
    pub path: String,

    /// USB manufacturer string, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,

    /// USB serial number, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,

    /// USB vendor id as 4-digit lowercase hex, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor_id: Option<String>,

    /// USB product id as 4-digit lowercase hex, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_id: Option<String>,

    /// Bus location, if the platform exposes one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location_id: Option<String>,
}

impl DeviceDescriptor {
    fn from_port_info(info: tokio_serial::SerialPortInfo) -> Self {
        match info.port_type {
            tokio_serial::SerialPortType::UsbPort(usb) => Self {
                path: info.port_name,
                manufacturer: usb.manufacturer,
                serial_number: usb.serial_number,
                vendor_id: Some(format!("{:04x}", usb.vid)),
                product_id: Some(format!("{:04x}", usb.pid)),
                // Not exposed by the enumeration backend.
                location_id: None,
            },
            _ => Self {
                path: info.port_name,
                ..Self::default()
            },
        }
    }
}

/// Enumerate available serial devices.
///
/// Enumeration failure is an expected condition (not every host has
/// serial support); it is logged and reported as no devices.
pub fn list_ports() -> Vec<DeviceDescriptor> {
    let ports = match tokio_serial::available_ports() {
        Ok(ports) => ports,
        Err(e) => {
            warn!(?e, "Could not enumerate serial ports");
            return vec![];
        }
    };

    ports
        .into_iter()
        .map(DeviceDescriptor::from_port_info)
        .collect()
}

/// Pick the device most likely to be the intended microcontroller.
///
/// Preference order:
/// 1. any device with the target vendor id,
/// 2. the first match against conventional UART paths, in list order,
/// 3. on COM-style platforms, the highest numbered COM port,
/// 4. none.
pub fn select_candidate(descriptors: &[DeviceDescriptor]) -> Option<&DeviceDescriptor> {
    if let Some(descriptor) = descriptors.iter().find(|d| {
        d.vendor_id
            .as_deref()
            .map(|vid| vid.eq_ignore_ascii_case(TARGET_VENDOR_ID))
            .unwrap_or(false)
    }) {
        return Some(descriptor);
    }

    for path in COMMON_UART_PATHS {
        if let Some(descriptor) = descriptors.iter().find(|d| d.path == *path) {
            return Some(descriptor);
        }
    }

    descriptors
        .iter()
        .filter_map(|d| com_port_number(&d.path).map(|n| (n, d)))
        .max_by_key(|(n, _)| *n)
        .map(|(_, d)| d)
}

fn com_port_number(path: &str) -> Option<u32> {
    let prefix = path.get(..3)?;
    let number = path.get(3..)?;

    if prefix.eq_ignore_ascii_case("COM") {
        number.parse().ok()
    } else {
        None
    }
}
