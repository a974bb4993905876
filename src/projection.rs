//! Placement of a geographic target on the camera viewfinder.
//!
//! The projection is crude: only the horizontal angle between where the device is
//! pointing and where the target lies matters. That angle slides the marker left or right and
//! the marker always sits at the vertical center of the screen. Pitch is never consulted.

use std::fmt;

use uom::si::angle::degree;
use uom::si::f64::{Angle, Length};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::config::{InvalidConfig, ProjectionConfig};
use crate::geodesy::{self, Bearing, GeoPoint};
use crate::orientation::OrientationSample;
use crate::target::TargetEvent;
use crate::util::BoundedAngle;

/// Wraps an angle into (-180°, 180°].
///
/// Positive values are clockwise. An angle pointing exactly behind comes out as +180°.
#[must_use]
pub fn normalize_relative(angle: Angle) -> Angle {
    Angle::new::<degree>(BoundedAngle::new(angle).to_relative_degrees())
}

/// Which way the user has to tilt to bring an out-of-view target into view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum OffscreenDirection {
    #[default]
    None,
    Up,
    Down,
}

/// Where to draw the target marker, as fractions of the viewfinder size.
///
/// `(0, 0)` is the top-left corner.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ProjectionResult {
    pub screen_x: f64,
    /// Always 0.5; the marker never moves vertically.
    pub screen_y: f64,
    pub offscreen: OffscreenDirection,
    /// Distance to the target, if both locations are known.
    pub distance: Option<Length>,
    /// How far the user must turn to face the target, if the heading is known.
    pub relative_bearing: Option<Angle>,
}

impl ProjectionResult {
    /// The placement used whenever there is not enough information to aim the marker.
    #[must_use]
    pub fn centered() -> Self {
        Self {
            screen_x: 0.5,
            screen_y: 0.5,
            offscreen: OffscreenDirection::None,
            distance: None,
            relative_bearing: None,
        }
    }

    /// Returns the distance formatted for display next to the marker.
    #[must_use]
    pub fn distance_label(&self) -> Option<String> {
        self.distance.map(geodesy::format_distance)
    }
}

impl Default for ProjectionResult {
    fn default() -> Self {
        Self::centered()
    }
}

impl fmt::Display for ProjectionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "marker at ({:.3}, {:.3})", self.screen_x, self.screen_y)?;
        match self.offscreen {
            OffscreenDirection::None => {}
            OffscreenDirection::Up => f.write_str(" [offscreen: up]")?,
            OffscreenDirection::Down => f.write_str(" [offscreen: down]")?,
        }
        if let Some(label) = self.distance_label() {
            write!(f, " {label}")?;
        }
        Ok(())
    }
}

/// Computes the marker placement from scratch.
///
/// Missing inputs never fail: without both locations there is no distance, and without a
/// heading (or either location) the marker is centered with no off-screen indicator.
///
/// `config` is expected to have passed [`ProjectionConfig::validate`]; [`ArProjector::new`]
/// checks this.
#[must_use]
pub fn project(
    config: &ProjectionConfig,
    current: Option<&GeoPoint>,
    target: Option<&GeoPoint>,
    heading: Option<Bearing>,
) -> ProjectionResult {
    let (Some(current), Some(target)) = (current, target) else {
        return ProjectionResult::centered();
    };
    let distance = Some(geodesy::distance(current, target));
    let Some(heading) = heading else {
        return ProjectionResult {
            distance,
            ..ProjectionResult::centered()
        };
    };

    let relative = geodesy::bearing(current, target).relative_to(heading.azimuth());
    let rel = relative.get::<degree>();

    let max_angle = config.max_angle_degrees;
    let clamped = rel.clamp(-max_angle, max_angle);
    let screen_x = 0.5 + clamped / max_angle * config.horizontal_spread;

    // NOTE: this threshold is independent of the clamp above, so targets between the clamp
    // angle and the threshold sit pinned at the edge without an indicator.
    let threshold = config.offscreen_threshold_degrees;
    let offscreen = if rel > threshold {
        OffscreenDirection::Up
    } else if rel < -threshold {
        OffscreenDirection::Down
    } else {
        OffscreenDirection::None
    };

    ProjectionResult {
        screen_x,
        screen_y: 0.5,
        offscreen,
        distance,
        relative_bearing: Some(relative),
    }
}

/// Computes where an arrow pointing at the target should point.
///
/// With a known heading this is the relative bearing (0° meaning straight ahead); otherwise it
/// falls back to the absolute bearing, as on a north-up map.
#[must_use]
pub fn pointer_angle(current: &GeoPoint, target: &GeoPoint, heading: Option<Bearing>) -> Angle {
    let to_target = geodesy::bearing(current, target);
    match heading {
        Some(heading) => to_target.relative_to(heading.azimuth()),
        None => to_target.azimuth(),
    }
}

/// Keeps the latest value from each input stream and re-projects whenever one changes.
///
/// Each setter returns the fresh [`ProjectionResult`]; the projector stores nothing derived.
#[derive(Debug, Clone, Default)]
pub struct ArProjector {
    config: ProjectionConfig,
    current: Option<GeoPoint>,
    target: Option<GeoPoint>,
    heading: Option<Bearing>,
}

impl ArProjector {
    /// Creates a projector with nothing known yet, rejecting configs that fail
    /// [`ProjectionConfig::validate`].
    pub fn new(config: ProjectionConfig) -> Result<Self, InvalidConfig> {
        config.validate()?;
        Ok(Self {
            config,
            current: None,
            target: None,
            heading: None,
        })
    }

    pub fn set_current_position(&mut self, position: GeoPoint) -> ProjectionResult {
        self.current = Some(position);
        self.projection()
    }

    pub fn set_target(&mut self, target: Option<GeoPoint>) -> ProjectionResult {
        self.target = target;
        self.projection()
    }

    /// Feeds in an orientation sample; the last sample wins.
    pub fn observe(&mut self, sample: &OrientationSample) -> ProjectionResult {
        self.heading = sample.heading;
        self.projection()
    }

    /// Forgets the heading, eg. after the orientation subscription ended.
    pub fn clear_heading(&mut self) -> ProjectionResult {
        self.heading = None;
        self.projection()
    }

    pub fn apply(&mut self, event: &TargetEvent) -> ProjectionResult {
        match event {
            TargetEvent::Selected(target) => self.set_target(Some(target.point)),
            TargetEvent::Cleared => self.set_target(None),
        }
    }

    #[must_use]
    pub fn heading(&self) -> Option<Bearing> {
        self.heading
    }

    #[must_use]
    pub fn projection(&self) -> ProjectionResult {
        project(
            &self.config,
            self.current.as_ref(),
            self.target.as_ref(),
            self.heading,
        )
    }
}
