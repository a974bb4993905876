//! Tunables for the targeting engine.
//!
//! Every value defaults to the behaviour the AR view ships with. With the `serde` feature the
//! types deserialize from partial documents, filling the gaps with those defaults.

use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::camera::FacingMode;

/// All tunables of an AR session.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ArConfig {
    pub projection: ProjectionConfig,
    pub position: PositionOptions,
    pub orientation: OrientationConfig,
    pub camera: CameraConfig,
}

/// How relative bearings map onto the horizontal axis of the viewfinder.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ProjectionConfig {
    /// Relative bearing (either side of straight ahead) at which the marker reaches the edge of
    /// its travel; anything beyond is clamped.
    pub max_angle_degrees: f64,

    /// How far from the center, as a fraction of the screen width, the marker may travel.
    pub horizontal_spread: f64,

    /// Relative bearing beyond which the off-screen indicator is shown.
    ///
    /// Independent of `max_angle_degrees`; see [`project`](crate::projection::project).
    pub offscreen_threshold_degrees: f64,
}

impl ProjectionConfig {
    /// Checks that the values describe a usable mapping.
    ///
    /// The maximum angle must be positive and finite, and the spread must keep the marker on
    /// screen, ie be in (0, 0.5].
    pub fn validate(&self) -> Result<(), InvalidConfig> {
        if !(self.max_angle_degrees.is_finite() && self.max_angle_degrees > 0.) {
            return Err(InvalidConfig::MaxAngle(self.max_angle_degrees));
        }
        if !(self.horizontal_spread > 0. && self.horizontal_spread <= 0.5) {
            return Err(InvalidConfig::HorizontalSpread(self.horizontal_spread));
        }
        if !self.offscreen_threshold_degrees.is_finite() || self.offscreen_threshold_degrees < 0. {
            return Err(InvalidConfig::OffscreenThreshold(
                self.offscreen_threshold_degrees,
            ));
        }
        Ok(())
    }
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        Self {
            max_angle_degrees: 50.,
            horizontal_spread: 0.4,
            offscreen_threshold_degrees: 60.,
        }
    }
}

/// Returned by [`ProjectionConfig::validate`].
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum InvalidConfig {
    #[error("max angle must be a positive number of degrees, got {0}")]
    MaxAngle(f64),
    #[error("horizontal spread must be in (0, 0.5], got {0}")]
    HorizontalSpread(f64),
    #[error("offscreen threshold must be a non-negative number of degrees, got {0}")]
    OffscreenThreshold(f64),
}

/// Acquisition parameters handed to the [`PositionProvider`](crate::position::PositionProvider)
/// for both one-shot and watch requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PositionOptions {
    pub high_accuracy: bool,
    pub timeout_ms: u64,
    /// Maximum age of a cached fix the provider may return; zero forces a fresh fix.
    pub maximum_age_ms: u64,
}

impl PositionOptions {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    #[must_use]
    pub fn maximum_age(&self) -> Duration {
        Duration::from_millis(self.maximum_age_ms)
    }
}

impl Default for PositionOptions {
    fn default() -> Self {
        Self {
            high_accuracy: true,
            timeout_ms: 10_000,
            maximum_age_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct OrientationConfig {
    /// How long a subscription may stay silent before the sensor is reported unavailable.
    pub sensor_timeout_ms: u64,
}

impl OrientationConfig {
    #[must_use]
    pub fn sensor_timeout(&self) -> Duration {
        Duration::from_millis(self.sensor_timeout_ms)
    }
}

impl Default for OrientationConfig {
    fn default() -> Self {
        Self {
            sensor_timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct CameraConfig {
    pub facing: FacingMode,
}
