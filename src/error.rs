//! Error and result types used across the crate.
//!
//! A handful of small, composable `thiserror::Error` enums joined by
//! one top-level `Error`, covering the error families this driver
//! actually needs: USB transport, device initialization, protocol
//! parsing, profile I/O, and host-sink delivery.
//!
//! Most of this crate's fallible operations return [`Result`]. A few
//! operations are intentionally infallible by design (parsing a malformed
//! report yields an *empty* event batch rather than an error, see
//! [`ParseError`]).

use std::fmt;

use crate::device_id::DeviceId;

/// USB transport-level failures (`UsbPort` contract, §4.2).
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum UsbError {
    #[error("access denied")]
    AccessDenied,
    #[error("device disconnected")]
    DeviceDisconnected,
    #[error("device busy")]
    Busy,
    #[error("operation timed out")]
    Timeout,
    #[error("broken pipe")]
    Pipe,
    #[error("operation not supported")]
    NotSupported,
    #[error("I/O error: {0}")]
    Io(String),
}

/// Failures during a session's open/initialize procedure (§4.3).
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum InitError {
    #[error("failed to claim interface")]
    InterfaceClaimFailed,
    #[error("failed to detach kernel driver")]
    KernelDetachFailed,
    #[error("initialization step {index} failed")]
    InitStepFailed { index: usize },
    #[error("configuration error: {0}")]
    ConfigurationError(String),
}

/// Parse-time failures. These never abort a session; the read loop treats
/// them as "this report produced no events" and continues (§7).
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("invalid report size: expected {expected}, got {actual}")]
    InvalidReportSize { expected: usize, actual: usize },
    /// A configured `reportDescriptor` (§6) names an axis or button
    /// identifier this core doesn't recognize. Raised at configuration
    /// load time, not per-report, since the descriptor is immutable
    /// once loaded (§7: not retryable without editing the file).
    #[error("invalid report descriptor: {0}")]
    InvalidReportDescriptor(String),
}

/// Profile load/save failures. All non-fatal: callers fall back to
/// `Profile::default()` (§7).
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ProfileError {
    #[error("profile not found")]
    NotFound,
    #[error("invalid profile format: {0}")]
    InvalidFormat(String),
    #[error("profile version mismatch: {0}")]
    VersionMismatch(String),
}

/// Failures reported by the host `EventSink`.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SinkError {
    #[error("permission denied")]
    PermissionDenied,
    #[error("event creation failed: {0}")]
    EventCreationFailed(String),
}

/// `ConfigStore` load-time failures (§4.1).
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("configuration schema mismatch: {0}")]
    SchemaMismatch(String),
    #[error("configuration file not found: {0}")]
    FileNotFound(String),
    #[error("invalid JSON: {0}")]
    InvalidJson(String),
    #[error("no configurations found")]
    NoConfigurations,
    /// A discovered device matched no loaded configuration at all (as
    /// opposed to `NoConfigurations`, where the store itself is empty).
    /// Not retryable in place: nothing changes until a configuration
    /// for this device is added and the store is reloaded (§7).
    #[error("no configuration matches device {0}")]
    UnsupportedDevice(DeviceId),
}

/// Crate-wide error type. Each family above composes into this one via
/// `#[from]`, so call sites can use `?` regardless of which subsystem
/// raised the error.
#[derive(thiserror::Error, Debug, Clone)]
pub enum Error {
    #[error(transparent)]
    Usb(#[from] UsbError),
    #[error(transparent)]
    Init(#[from] InitError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Profile(#[from] ProfileError),
    #[error(transparent)]
    Sink(#[from] SinkError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Opaque failure surfaced as a message, for backend-specific detail
    /// that doesn't warrant its own variant.
    #[error("{0}")]
    Other(String),
}

/// Crate-wide result alias.
pub type Result<T> = core::result::Result<T, Error>;

/// User-facing rendering of an [`Error`]: a title, a human message, a
/// recovery suggestion, and whether retrying is expected to help.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorReport {
    pub title: &'static str,
    pub message: String,
    pub suggestion: &'static str,
    pub is_retryable: bool,
}

impl fmt::Display for ErrorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.title, self.message)
    }
}

impl Error {
    /// Render this error for a human (title/message/suggestion/retryable),
    /// as distinct from `Display`, which stays terse and developer-facing.
    pub fn user_message(&self) -> ErrorReport {
        match self {
            Error::Usb(UsbError::AccessDenied) => ErrorReport {
                title: "Access denied",
                message: self.to_string(),
                suggestion: "Check OS permissions for raw USB access to this device.",
                is_retryable: false,
            },
            Error::Usb(UsbError::DeviceDisconnected) => ErrorReport {
                title: "Device disconnected",
                message: self.to_string(),
                suggestion: "Reconnect the device; it will be picked up on the next scan.",
                is_retryable: true,
            },
            Error::Usb(UsbError::Busy) => ErrorReport {
                title: "Device busy",
                message: self.to_string(),
                suggestion: "Close other applications that may be holding this device open.",
                is_retryable: true,
            },
            Error::Usb(UsbError::Timeout) => ErrorReport {
                title: "Device not responding",
                message: self.to_string(),
                suggestion: "The device may be asleep or disconnecting; this will retry automatically.",
                is_retryable: true,
            },
            Error::Usb(_) => ErrorReport {
                title: "USB transport error",
                message: self.to_string(),
                suggestion: "Try reconnecting the device.",
                is_retryable: true,
            },
            Error::Init(InitError::InterfaceClaimFailed) => ErrorReport {
                title: "Could not claim device interface",
                message: self.to_string(),
                suggestion: "Another process may already own this interface.",
                is_retryable: true,
            },
            Error::Init(InitError::KernelDetachFailed) => ErrorReport {
                title: "Could not detach kernel driver",
                message: self.to_string(),
                suggestion: "A kernel HID driver is holding this device; unbind it manually.",
                is_retryable: false,
            },
            Error::Init(_) => ErrorReport {
                title: "Device initialization failed",
                message: self.to_string(),
                suggestion: "The device will be retried on the next discovery scan.",
                is_retryable: true,
            },
            Error::Parse(ParseError::InvalidReportDescriptor(_)) => ErrorReport {
                title: "Invalid report descriptor",
                message: self.to_string(),
                suggestion: "Fix the device's reportDescriptor fields and reload configurations.",
                is_retryable: false,
            },
            Error::Parse(_) => ErrorReport {
                title: "Malformed input report",
                message: self.to_string(),
                suggestion: "This is usually transient; no action needed.",
                is_retryable: true,
            },
            Error::Profile(ProfileError::VersionMismatch(_)) => ErrorReport {
                title: "Profile version mismatch",
                message: self.to_string(),
                suggestion: "Recreate the profile with the current app version.",
                is_retryable: false,
            },
            Error::Profile(_) => ErrorReport {
                title: "Profile error",
                message: self.to_string(),
                suggestion: "Falling back to the default profile.",
                is_retryable: false,
            },
            Error::Sink(SinkError::PermissionDenied) => ErrorReport {
                title: "Permission denied",
                message: self.to_string(),
                suggestion: "Grant accessibility/input-injection permission to this app.",
                is_retryable: false,
            },
            Error::Sink(_) => ErrorReport {
                title: "Output error",
                message: self.to_string(),
                suggestion: "Check that the host input backend is available.",
                is_retryable: true,
            },
            Error::Config(ConfigError::SchemaMismatch(_)) => ErrorReport {
                title: "Unsupported configuration schema",
                message: self.to_string(),
                suggestion: "Update the configuration file to the current schema version.",
                is_retryable: false,
            },
            Error::Config(ConfigError::UnsupportedDevice(_)) => ErrorReport {
                title: "Unsupported device",
                message: self.to_string(),
                suggestion: "Add a configuration for this vendor/product ID and reload.",
                is_retryable: false,
            },
            Error::Config(_) => ErrorReport {
                title: "Configuration error",
                message: self.to_string(),
                suggestion: "Check the configuration file path and contents.",
                is_retryable: true,
            },
            Error::Other(_) => ErrorReport {
                title: "Unexpected error",
                message: self.to_string(),
                suggestion: "If this persists, file a bug report.",
                is_retryable: false,
            },
        }
    }

    /// Device identifiers not recognized by any loaded configuration are not
    /// retryable in place (a fresh scan is required), matching `isRetryable`
    /// semantics called out at the end of §7.
    pub fn is_unsupported_device(&self) -> bool {
        matches!(
            self,
            Error::Config(ConfigError::NoConfigurations | ConfigError::UnsupportedDevice(_))
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_non_retryable_kinds_are_not_retryable() {
        let version_mismatch = Error::Profile(ProfileError::VersionMismatch("0.1".to_string()));
        let unsupported_device = Error::Config(ConfigError::UnsupportedDevice(DeviceId::new(0xdead, 0xbeef)));
        let invalid_descriptor = Error::Parse(ParseError::InvalidReportDescriptor("bad axis".to_string()));

        assert!(!version_mismatch.user_message().is_retryable);
        assert!(!unsupported_device.user_message().is_retryable);
        assert!(!invalid_descriptor.user_message().is_retryable);
    }

    #[test]
    fn timeout_is_retryable() {
        let err = Error::Usb(UsbError::Timeout);
        assert!(err.user_message().is_retryable);
    }
}
