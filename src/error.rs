use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that may occur in this library.
#[derive(Debug, Error, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub enum Error {
    /// The device does not exist (or no longer exists).
    #[error("The device `{0}` was not found")]
    DeviceNotFound(String),

    /// Something else holds the device.
    #[error("The device is busy: {0}")]
    DeviceBusy(String),

    /// We may not open the device.
    #[error("Permission to the device was denied: {0}")]
    PermissionDenied(String),

    /// An operation which requires an open session was attempted
    /// while no session is open.
    #[error("No serial session is open")]
    NotOpen,

    /// Reading from or writing to the device failed.
    #[error("Device IO failed: {0}")]
    Io(String),

    /// The device went away while a session was open.
    #[error("The device was removed: {0}")]
    DeviceRemoved(String),

    /// The configuration is not usable.
    #[error("Bad configuration: {0}")]
    BadConfig(String),
}

impl Error {
    /// Classify a failed attempt at acquiring a device handle.
    ///
    /// The underlying errors are platform specific and often only
    /// distinguishable by their message, so after the structured kinds
    /// we fall back to sniffing it.
    pub fn from_open_failure(error: &tokio_serial::Error) -> Self {
        let description = error.to_string();

        match error.kind() {
            tokio_serial::ErrorKind::NoDevice => return Self::DeviceNotFound(description),
            tokio_serial::ErrorKind::Io(std::io::ErrorKind::PermissionDenied) => {
                return Self::PermissionDenied(description)
            }
            _ => {}
        }

        let lowercase = description.to_lowercase();

        if lowercase.contains("busy") {
            Self::DeviceBusy(description)
        } else if lowercase.contains("denied") || lowercase.contains("permission") {
            Self::PermissionDenied(description)
        } else if lowercase.contains("no such file") {
            Self::DeviceNotFound(description)
        } else {
            Self::Io(description)
        }
    }

    /// Get the bad configuration message, else self.
    pub fn try_into_bad_config(self) -> Result<String, Self> {
        if let Self::BadConfig(message) = self {
            Ok(message)
        } else {
            Err(self)
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use tokio_serial::ErrorKind;

    use super::*;

    fn open_failure(kind: ErrorKind, description: &str) -> Error {
        Error::from_open_failure(&tokio_serial::Error::new(kind, description))
    }

    #[test]
    fn no_device_means_not_found() {
        assert_eq!(
            open_failure(ErrorKind::NoDevice, "gone"),
            Error::DeviceNotFound("gone".into())
        );
    }

    #[test]
    fn permission_denied_io_is_structured() {
        assert_eq!(
            open_failure(
                ErrorKind::Io(std::io::ErrorKind::PermissionDenied),
                "/dev/ttyACM0"
            ),
            Error::PermissionDenied("/dev/ttyACM0".into())
        );
    }

    #[test]
    fn busy_messages_are_sniffed() {
        assert_eq!(
            open_failure(ErrorKind::Unknown, "Device or resource busy"),
            Error::DeviceBusy("Device or resource busy".into())
        );
    }

    #[test]
    fn denied_messages_are_sniffed() {
        assert_eq!(
            open_failure(ErrorKind::Unknown, "Access denied"),
            Error::PermissionDenied("Access denied".into())
        );
    }

    #[test]
    fn missing_file_messages_are_sniffed() {
        assert_eq!(
            open_failure(
                ErrorKind::Io(std::io::ErrorKind::NotFound),
                "No such file or directory"
            ),
            Error::DeviceNotFound("No such file or directory".into())
        );
    }

    #[test]
    fn anything_else_is_io() {
        assert_eq!(
            open_failure(ErrorKind::Unknown, "something odd"),
            Error::Io("something odd".into())
        );
    }

    #[test]
    fn bad_config_unwraps_to_its_message() {
        let message = Error::BadConfig("nope".into()).try_into_bad_config().unwrap();
        assert_eq!(message, "nope");

        assert!(Error::NotOpen.try_into_bad_config().is_err());
    }
}
