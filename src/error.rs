use std::fmt;
use std::time::Duration;

use crate::target::ShareCode;

/// Convenience alias for results produced by this crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// A device capability the AR view depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// The rear-facing camera stream.
    Camera,
    /// The device-orientation (compass) event stream.
    Orientation,
    /// The platform geolocation service.
    Geolocation,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::Camera => f.write_str("camera"),
            Capability::Orientation => f.write_str("device orientation"),
            Capability::Geolocation => f.write_str("geolocation"),
        }
    }
}

/// An opaque failure reported by a platform collaborator.
///
/// Platforms surface all sorts of exceptions when a camera or sensor misbehaves; the core does
/// not interpret them beyond carrying the message to whoever renders the error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct DeviceError {
    message: String,
}

impl DeviceError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Errors surfaced by the targeting engine and its collaborators.
///
/// None of these are retried automatically. Use [`Error::is_recoverable`] to decide whether to
/// offer the user a retry action or to disable the AR view outright.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// The user (or platform policy) refused access.
    #[error("access to {0} was denied")]
    PermissionDenied(Capability),

    /// An operation needs a permission that has not been granted yet.
    #[error("access to {0} has not been granted yet")]
    PermissionRequired(Capability),

    /// The device lacks a capability the AR view cannot work without.
    #[error("{0} is not supported on this device")]
    DeviceUnsupported(Capability),

    /// Geolocation did not produce a fix in time.
    #[error("position acquisition timed out after {}ms", .timeout.as_millis())]
    AcquisitionTimeout { timeout: Duration },

    /// Geolocation is available but could not determine a position.
    #[error("current position is unavailable")]
    PositionUnavailable,

    /// A position watch is already running.
    #[error("a position watch is already active")]
    WatchActive,

    /// The orientation subscription never delivered an event.
    #[error("no orientation event received within {}ms of subscribing", .waited.as_millis())]
    SensorUnavailable { waited: Duration },

    /// A camera session is already active for this view.
    #[error("a camera session is already active")]
    SessionActive,

    /// The camera session failed earlier and must be retried explicitly.
    #[error("the camera session failed and must be retried")]
    SessionFailed,

    /// No shared location exists for the given code.
    #[error("no shared location found for code {0}")]
    TargetNotFound(ShareCode),

    /// Any other platform failure.
    #[error(transparent)]
    Device(#[from] DeviceError),
}

impl Error {
    /// Returns `false` for errors that disable the AR feature outright.
    ///
    /// Everything else can be recovered from by re-invoking the failed acquisition step.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Error::DeviceUnsupported(_))
    }
}
