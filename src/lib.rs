//! This library places a shared geographic location on top of a live camera feed, for people who
//! want to find a friend in a crowd rather than think about spherical trigonometry.
//!
//! The pieces, leaves first:
//!
//! - [`geodesy`] computes great-circle [`distance`] and initial [`bearing`] between
//!   [`GeoPoint`]s.
//! - [`orientation`] acquires access to the device compass and turns its events into
//!   [`OrientationSample`]s.
//! - [`projection`] fuses the bearing to the target with the device heading into a
//!   [`ProjectionResult`]: where on screen to draw the marker, and whether to show an off-screen
//!   indicator.
//! - [`camera`] owns the camera stream and the compass subscription of one AR view.
//! - [`position`] and [`target`] wrap the remaining collaborators: device geolocation and the
//!   store of shared locations.
//!
//! Everything touching the platform goes through a trait ([`OrientationSensor`],
//! [`CameraDevice`], [`PositionProvider`], [`TargetSource`]), so the whole engine runs without a
//! browser or a phone. The engine is single-threaded: the traits are `?Send` and state is shared
//! through `Rc`.
//!
//! # Examples
//!
//! Someone shared a location 100m north-east of Tokyo Station, and we are standing at the
//! station holding the phone facing north:
//!
//! ```
//! use sightline::{ArProjector, Bearing, GeoPoint, OffscreenDirection, OrientationSample};
//! use uom::si::f64::{Angle, Length};
//! use uom::si::{angle::degree, length::meter};
//!
//! let here = GeoPoint::from_degrees(35.6812, 139.7671).expect("latitude is in [-90, 90]");
//! let there = here
//!     .offset_by(Length::new::<meter>(70.7), Length::new::<meter>(70.7))
//!     .expect("still on the globe");
//!
//! // the bearing is measured clockwise from true north
//! let bearing = here.bearing_to(&there);
//! assert!((bearing.degrees() - 45.).abs() < 0.1);
//!
//! let mut projector = ArProjector::default();
//! projector.set_current_position(here);
//! projector.set_target(Some(there));
//!
//! // without a compass heading the marker just sits in the middle
//! let marker = projector.projection();
//! assert_eq!(marker.screen_x, 0.5);
//! assert_eq!(marker.distance_label().as_deref(), Some("100m"));
//!
//! // once the compass reports a heading, the marker moves towards the target
//! let marker = projector.observe(&OrientationSample {
//!     heading: Some(Bearing::new(Angle::new::<degree>(0.))),
//!     timestamp_ms: 0,
//!     is_absolute: true,
//! });
//! assert!(marker.screen_x > 0.8);
//! assert_eq!(marker.offscreen, OffscreenDirection::None);
//! ```
//!
//! Getting there from a share code goes through a [`TargetSource`] and a [`TargetChannel`]:
//! whoever resolves the code publishes it on the channel, and the AR view subscribes to it.
//!
//! ```
//! use sightline::{ArProjector, GeoPoint, ShareCode, SharedTarget, TargetChannel};
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! let channel = TargetChannel::new();
//! let projector = Rc::new(RefCell::new(ArProjector::default()));
//!
//! let view = Rc::clone(&projector);
//! let _subscription = channel.subscribe(move |event| {
//!     view.borrow_mut().apply(event);
//! });
//!
//! projector
//!     .borrow_mut()
//!     .set_current_position(GeoPoint::from_degrees(51.5074, -0.1278).unwrap());
//! channel.select(SharedTarget {
//!     code: "PARIS1".parse::<ShareCode>().unwrap(),
//!     name: "Notre-Dame".into(),
//!     point: GeoPoint::from_degrees(48.8530, 2.3499).unwrap(),
//! });
//!
//! let marker = projector.borrow().projection();
//! assert_eq!(marker.distance_label().as_deref(), Some("343.8km"));
//! ```

mod util;

pub mod camera;
pub mod config;
pub mod error;
pub mod geodesy;
pub mod orientation;
pub mod position;
pub mod projection;
pub mod target;

#[cfg(test)]
mod testing;

pub use camera::{ArSessionState, CameraDevice, CameraSession, Capabilities, VideoSink, Viewport};
pub use config::ArConfig;
pub use error::{Capability, DeviceError, Error, Result};
pub use geodesy::{bearing, distance, Bearing, CompassPoint, GeoPoint};
pub use orientation::{OrientationSample, OrientationSensor, OrientationTracker, PermissionState};
pub use position::{Geolocator, PositionProvider};
pub use projection::{ArProjector, OffscreenDirection, ProjectionResult};
pub use target::{ShareCode, SharedTarget, TargetChannel, TargetEvent, TargetSource};
