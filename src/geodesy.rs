//! Great-circle distance and forward bearing on a spherical Earth.
//!
//! Everything in this module is a pure function of its inputs. Altitude is carried along on
//! [`GeoPoint`] but ignored by [`distance`] and [`bearing`]: the targeting model is horizontal
//! only.

use crate::util::BoundedAngle;
use std::fmt;
use std::fmt::Display;
use std::marker::PhantomData;
use uom::si::f64::{Angle, Length};
use uom::si::{
    angle::{degree, radian},
    length::meter,
};
use uom::ConstZero;

#[cfg(any(test, feature = "approx"))]
use approx::{AbsDiffEq, RelativeEq};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Mean Earth radius used by the haversine formula, in meters.
#[doc(alias = "R")]
pub const EARTH_MEAN_RADIUS: f64 = 6_371_000.0;

/// Meters per degree of latitude in the flat-earth approximation used by
/// [`GeoPoint::offset_by`].
const METERS_PER_DEGREE: f64 = 111_111.0;

/// An Earth-bound location given by latitude, longitude and an optional altitude.
///
/// Construct one through [`GeoPoint::builder`], [`GeoPoint::build`] or
/// [`GeoPoint::from_degrees`]; all of them reject latitudes outside [-90°, 90°].
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GeoPoint {
    // NOTE: like uom itself we do not normalize these on the way in; the trigonometry does not
    // care, and the accessors normalize on the way out.
    latitude: Angle,
    longitude: Angle,
    altitude: Option<Length>,
}

impl GeoPoint {
    /// Constructs a location from its [`Components`].
    ///
    /// The latitude must be in [-90°,90°] % 360°. If it is not, this function returns `None`.
    #[must_use]
    pub fn build(
        Components {
            latitude,
            longitude,
            altitude,
        }: Components,
    ) -> Option<Self> {
        let builder = Self::builder().latitude(latitude)?.longitude(longitude);
        Some(match altitude {
            Some(altitude) => builder.altitude(altitude).build(),
            None => builder.build(),
        })
    }

    /// Provides a constructor for a [`GeoPoint`].
    pub fn builder() -> Builder<MissingLatitude, MissingLongitude> {
        Builder {
            under_construction: GeoPoint {
                latitude: Angle::ZERO,
                longitude: Angle::ZERO,
                altitude: None,
            },
            has: (PhantomData, PhantomData),
        }
    }

    /// Constructs a location from latitude and longitude in decimal degrees.
    ///
    /// This is the shape most positioning APIs hand out. Returns `None` if the latitude is out
    /// of range or not finite.
    #[must_use]
    pub fn from_degrees(latitude: f64, longitude: f64) -> Option<Self> {
        Self::build(Components {
            latitude: Angle::new::<degree>(latitude),
            longitude: Angle::new::<degree>(longitude),
            altitude: None,
        })
    }

    /// Returns the latitude, always in [-90°, 90°].
    #[must_use]
    pub fn latitude(&self) -> Angle {
        Angle::new::<radian>(BoundedAngle::new(self.latitude).to_signed_range())
    }

    /// Returns the longitude, always in [-180°, 180°).
    #[must_use]
    pub fn longitude(&self) -> Angle {
        Angle::new::<radian>(BoundedAngle::new(self.longitude).to_signed_range())
    }

    /// Returns the altitude, if the position source reported one.
    #[must_use]
    pub fn altitude(&self) -> Option<Length> {
        self.altitude
    }

    /// Returns a copy of this location at the given altitude.
    #[must_use]
    pub fn with_altitude(mut self, altitude: impl Into<Length>) -> Self {
        self.altitude = Some(altitude.into());
        self
    }

    /// Computes the [great-circle distance] to `other` on a sphere of radius
    /// [`EARTH_MEAN_RADIUS`].
    ///
    /// [great-circle distance]: https://en.wikipedia.org/wiki/Great-circle_distance
    #[doc(alias = "haversine")]
    #[must_use]
    pub fn distance_to(&self, other: &GeoPoint) -> Length {
        distance(self, other)
    }

    /// Computes the initial bearing of the great circle from this location to `other`.
    #[must_use]
    pub fn bearing_to(&self, other: &GeoPoint) -> Bearing {
        bearing(self, other)
    }

    /// Moves this location by the given distances north and east.
    ///
    /// This uses the flat-earth approximation of 111,111m per degree of latitude (and per
    /// degree of longitude at the equator), which is plenty for placing nearby markers but not
    /// for navigation. Returns `None` if the result would leave [-90°, 90°] latitude.
    #[must_use]
    pub fn offset_by(&self, north: Length, east: Length) -> Option<Self> {
        let latitude = self.latitude().get::<degree>();
        let longitude = self.longitude().get::<degree>();
        let delta_lat = north.get::<meter>() / METERS_PER_DEGREE;
        let delta_lon =
            east.get::<meter>() / (METERS_PER_DEGREE * latitude.to_radians().cos());

        let moved = Self::from_degrees(latitude + delta_lat, longitude + delta_lon)?;
        Some(Self {
            altitude: self.altitude,
            ..moved
        })
    }
}

impl Display for GeoPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lat = self.latitude();
        let ns = if lat.is_sign_negative() { 'S' } else { 'N' };
        let lat = lat.abs().get::<degree>();
        let lon = self.longitude();
        let ew = if lon.is_sign_negative() { 'W' } else { 'E' };
        let lon = lon.abs().get::<degree>();
        write!(f, "{lat:.6}°{ns}, {lon:.6}°{ew}")?;
        if let Some(alt) = self.altitude {
            write!(f, ", {:.1}m", alt.get::<meter>())?;
        }
        Ok(())
    }
}

/// A compass direction, measured clockwise from true north.
///
/// The azimuth is always in [0°, 360°). With the `serde` feature a bearing is (de)serialized as
/// its azimuth in degrees, wrapped the same way as [`Bearing::new`].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "f64", into = "f64"))]
pub struct Bearing {
    degrees: f64,
}

/// Returned when a bearing is built from a NaN or infinite number of degrees.
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
#[error("a bearing must be a finite number of degrees, got {0}")]
pub struct NonFiniteBearing(pub f64);

impl TryFrom<f64> for Bearing {
    type Error = NonFiniteBearing;

    fn try_from(degrees: f64) -> Result<Self, Self::Error> {
        if !degrees.is_finite() {
            return Err(NonFiniteBearing(degrees));
        }
        Ok(Self::new(Angle::new::<degree>(degrees)))
    }
}

impl From<Bearing> for f64 {
    fn from(bearing: Bearing) -> Self {
        bearing.degrees
    }
}

impl Bearing {
    /// Constructs a bearing from an arbitrary angle, wrapping it into [0°, 360°).
    #[must_use]
    pub fn new(azimuth: impl Into<Angle>) -> Self {
        Self {
            degrees: BoundedAngle::new(azimuth).to_compass_degrees(),
        }
    }

    /// The bearing pointing at true north.
    #[must_use]
    pub fn north() -> Self {
        Self { degrees: 0. }
    }

    /// Returns the azimuth of this bearing.
    #[must_use]
    pub fn azimuth(&self) -> Angle {
        Angle::new::<degree>(self.degrees)
    }

    /// Returns the azimuth in degrees, in [0, 360).
    #[must_use]
    pub fn degrees(&self) -> f64 {
        self.degrees
    }

    /// Returns the bearing pointing the opposite way.
    #[must_use]
    pub fn reversed(&self) -> Self {
        Self::new(Angle::new::<degree>(self.degrees + 180.))
    }

    /// Returns how far someone facing `heading` must turn to face along this bearing.
    ///
    /// Positive values are clockwise (to the right). The result is in (-180°, 180°].
    #[must_use]
    pub fn relative_to(&self, heading: Angle) -> Angle {
        crate::projection::normalize_relative(self.azimuth() - heading)
    }
}

impl Display for Bearing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bearing {:.1}°", self.degrees)
    }
}

#[cfg(any(feature = "approx", test))]
impl AbsDiffEq<Self> for Bearing {
    type Epsilon = <f64 as AbsDiffEq>::Epsilon;

    fn default_epsilon() -> Self::Epsilon {
        BoundedAngle::default_epsilon()
    }

    fn abs_diff_eq(&self, other: &Self, epsilon: Self::Epsilon) -> bool {
        BoundedAngle::abs_diff_eq(
            &BoundedAngle::new(self.azimuth()),
            &BoundedAngle::new(other.azimuth()),
            epsilon,
        )
    }
}

#[cfg(any(feature = "approx", test))]
impl RelativeEq for Bearing {
    fn default_max_relative() -> Self::Epsilon {
        BoundedAngle::default_max_relative()
    }

    fn relative_eq(
        &self,
        other: &Self,
        epsilon: Self::Epsilon,
        max_relative: Self::Epsilon,
    ) -> bool {
        BoundedAngle::relative_eq(
            &BoundedAngle::new(self.azimuth()),
            &BoundedAngle::new(other.azimuth()),
            epsilon,
            max_relative,
        )
    }
}

/// Computes the great-circle distance between two locations using the haversine formula.
///
/// Always non-negative, exactly zero for coincident points, and symmetric in its arguments.
#[must_use]
pub fn distance(a: &GeoPoint, b: &GeoPoint) -> Length {
    let central_angle =
        central_angle_by_inverse_haversine(a.latitude, b.latitude, a.longitude, b.longitude);
    Length::new::<meter>(central_angle.get::<radian>() * EARTH_MEAN_RADIUS)
}

/// Computes the forward azimuth (initial bearing) of the great circle from `from` to `to`.
///
/// For coincident points the direction is undefined and this returns north.
#[doc(alias = "forward_azimuth")]
#[must_use]
pub fn bearing(from: &GeoPoint, to: &GeoPoint) -> Bearing {
    let lat_a = from.latitude.get::<radian>(); // φ1
    let lat_b = to.latitude.get::<radian>(); // φ2
    let delta_lon = to.longitude.get::<radian>() - from.longitude.get::<radian>(); // Δλ

    let y = delta_lon.sin() * lat_b.cos();
    let x = lat_a.cos() * lat_b.sin() - lat_a.sin() * lat_b.cos() * delta_lon.cos();
    let theta = y.atan2(x).to_degrees();

    // theta is in [-180, 180], so this lands in [0, 360) without further wrapping
    Bearing {
        degrees: (theta + 360.) % 360.,
    }
}

/// Computes the height of `to` above `from`.
///
/// Returns `None` unless both locations carry an altitude.
#[must_use]
pub fn altitude_difference(from: &GeoPoint, to: &GeoPoint) -> Option<Length> {
    Some(to.altitude? - from.altitude?)
}

/// Formats a distance for display next to a marker.
///
/// Below one kilometer this is whole meters (rounded down), otherwise kilometers with one
/// decimal.
#[must_use]
pub fn format_distance(distance: Length) -> String {
    let meters = distance.get::<meter>();
    if meters < 1000. {
        format!("{:.0}m", meters.floor())
    } else {
        format!("{:.1}km", meters / 1000.)
    }
}

/// The 16 points of the compass rose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum CompassPoint {
    North,
    NorthNorthEast,
    NorthEast,
    EastNorthEast,
    East,
    EastSouthEast,
    SouthEast,
    SouthSouthEast,
    South,
    SouthSouthWest,
    SouthWest,
    WestSouthWest,
    West,
    WestNorthWest,
    NorthWest,
    NorthNorthWest,
}

impl CompassPoint {
    const ALL: [CompassPoint; 16] = [
        CompassPoint::North,
        CompassPoint::NorthNorthEast,
        CompassPoint::NorthEast,
        CompassPoint::EastNorthEast,
        CompassPoint::East,
        CompassPoint::EastSouthEast,
        CompassPoint::SouthEast,
        CompassPoint::SouthSouthEast,
        CompassPoint::South,
        CompassPoint::SouthSouthWest,
        CompassPoint::SouthWest,
        CompassPoint::WestSouthWest,
        CompassPoint::West,
        CompassPoint::WestNorthWest,
        CompassPoint::NorthWest,
        CompassPoint::NorthNorthWest,
    ];

    /// Returns the conventional abbreviation, eg `NNE`.
    #[must_use]
    pub fn abbreviation(&self) -> &'static str {
        match self {
            CompassPoint::North => "N",
            CompassPoint::NorthNorthEast => "NNE",
            CompassPoint::NorthEast => "NE",
            CompassPoint::EastNorthEast => "ENE",
            CompassPoint::East => "E",
            CompassPoint::EastSouthEast => "ESE",
            CompassPoint::SouthEast => "SE",
            CompassPoint::SouthSouthEast => "SSE",
            CompassPoint::South => "S",
            CompassPoint::SouthSouthWest => "SSW",
            CompassPoint::SouthWest => "SW",
            CompassPoint::WestSouthWest => "WSW",
            CompassPoint::West => "W",
            CompassPoint::WestNorthWest => "WNW",
            CompassPoint::NorthWest => "NW",
            CompassPoint::NorthNorthWest => "NNW",
        }
    }

    /// Returns the compass point nearest to `bearing`; each point covers 22.5°.
    #[must_use]
    pub fn from_bearing(bearing: Bearing) -> Self {
        let sector = (bearing.degrees() / 22.5).round() as usize % Self::ALL.len();
        Self::ALL[sector]
    }
}

impl Display for CompassPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.abbreviation())
    }
}

/// Computes the central angle between the given lat/lon points.
///
/// To turn this angle into [great-circle distance], multiply this value by the radius of the
/// sphere (ie, of the earth).
///
/// The current implementation computes this [using the archaversine] (inverse haversine).
///
/// [great-circle distance]: https://en.wikipedia.org/wiki/Great-circle_distance
/// [using the archaversine]: https://en.wikipedia.org/wiki/Haversine_formula#Formulation
pub(crate) fn central_angle_by_inverse_haversine(
    lat_a: Angle,
    lat_b: Angle,
    lon_a: Angle,
    lon_b: Angle,
) -> Angle {
    let lat_a = lat_a.get::<radian>(); // φ1
    let lat_b = lat_b.get::<radian>(); // φ2
    let lon_a = lon_a.get::<radian>(); // λ1
    let lon_b = lon_b.get::<radian>(); // λ2
    let delta_lat = lat_b - lat_a;
    let delta_lon = lon_b - lon_a;

    let inner = 1. - delta_lat.cos() + lat_a.cos() * lat_b.cos() * (1. - delta_lon.cos());
    // rounding can push near-antipodal points just past 1, where asin is undefined
    let haversine = (inner / 2.).clamp(0., 1.);
    Angle::new::<radian>(2. * haversine.sqrt().asin())
}

#[cfg(any(test, feature = "approx"))]
impl AbsDiffEq<Self> for GeoPoint {
    type Epsilon = Length;

    fn default_epsilon() -> Self::Epsilon {
        // consumer-grade positioning is nowhere near sub-centimeter
        Length::new::<meter>(0.01)
    }

    fn abs_diff_eq(&self, other: &Self, epsilon: Self::Epsilon) -> bool {
        let altitudes_match = match (self.altitude, other.altitude) {
            (Some(a), Some(b)) => a
                .get::<meter>()
                .abs_diff_eq(&b.get::<meter>(), epsilon.get::<meter>()),
            (None, None) => true,
            _ => false,
        };
        self.distance_to(other) <= epsilon && altitudes_match
    }
}

#[cfg(any(test, feature = "approx"))]
impl RelativeEq for GeoPoint {
    fn default_max_relative() -> Self::Epsilon {
        Length::new::<meter>(f64::default_max_relative())
    }

    fn relative_eq(
        &self,
        other: &Self,
        epsilon: Self::Epsilon,
        max_relative: Self::Epsilon,
    ) -> bool {
        let altitudes_match = match (self.altitude, other.altitude) {
            (Some(a), Some(b)) => a.get::<meter>().relative_eq(
                &b.get::<meter>(),
                epsilon.get::<meter>(),
                max_relative.get::<meter>(),
            ),
            (None, None) => true,
            _ => false,
        };
        self.distance_to(other)
            .get::<meter>()
            .abs_diff_eq(&0., epsilon.get::<meter>())
            && altitudes_match
    }
}

/// Argument type for [`GeoPoint::build`].
#[derive(Debug, Default)]
#[must_use]
pub struct Components {
    /// The latitude angle of the proposed [`GeoPoint`].
    ///
    /// The latitude must be in [-90°,90°] % 360°. If it is not, [`GeoPoint::build`] returns
    /// `None`.
    pub latitude: Angle,

    /// The longitude angle of the proposed [`GeoPoint`].
    pub longitude: Angle,

    /// The altitude of the proposed [`GeoPoint`], if known.
    pub altitude: Option<Length>,
}

/// Used to indicate that a partially-constructed [`GeoPoint`] is missing the latitude component.
pub struct MissingLatitude;
/// Used to indicate that a partially-constructed [`GeoPoint`] has the latitude component set.
pub struct HasLatitude;
/// Used to indicate that a partially-constructed [`GeoPoint`] is missing the longitude component.
pub struct MissingLongitude;
/// Used to indicate that a partially-constructed [`GeoPoint`] has the longitude component set.
pub struct HasLongitude;

/// [Builder] for a [`GeoPoint`].
///
/// Construct one through [`GeoPoint::builder`], and finalize with [`Builder::build`]. The
/// altitude is optional and may be set at any point.
///
/// [Builder]: https://rust-unofficial.github.io/patterns/patterns/creational/builder.html
#[derive(Debug)]
#[must_use]
pub struct Builder<Latitude, Longitude> {
    under_construction: GeoPoint,
    has: (PhantomData<Latitude>, PhantomData<Longitude>),
}

// manual impls of Clone and Copy to avoid requiring the markers to be Copy + Clone
impl<L1, L2> Clone for Builder<L1, L2> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<L1, L2> Copy for Builder<L1, L2> {}

impl<L1, L2> Builder<L1, L2> {
    /// Sets the latitude of the [`GeoPoint`]-to-be.
    ///
    /// The latitude must be in [-90°,90°] % 360°. If it is not, this function returns `None`.
    pub fn latitude(mut self, latitude: impl Into<Angle>) -> Option<Builder<HasLatitude, L2>> {
        let latitude = latitude.into();
        let latitude_in_signed_radians = BoundedAngle::new(latitude).to_signed_range();
        if !(-std::f64::consts::FRAC_PI_2..=std::f64::consts::FRAC_PI_2)
            .contains(&latitude_in_signed_radians)
        {
            None
        } else {
            self.under_construction.latitude = latitude;
            Some(Builder {
                under_construction: self.under_construction,
                has: (PhantomData::<HasLatitude>, self.has.1),
            })
        }
    }

    /// Sets the longitude of the [`GeoPoint`]-to-be.
    pub fn longitude(mut self, longitude: impl Into<Angle>) -> Builder<L1, HasLongitude> {
        self.under_construction.longitude = longitude.into();
        Builder {
            under_construction: self.under_construction,
            has: (self.has.0, PhantomData::<HasLongitude>),
        }
    }

    /// Sets the altitude of the [`GeoPoint`]-to-be.
    pub fn altitude(mut self, altitude: impl Into<Length>) -> Self {
        self.under_construction.altitude = Some(altitude.into());
        self
    }
}

impl Builder<HasLatitude, HasLongitude> {
    #[must_use]
    pub fn build(self) -> GeoPoint {
        self.under_construction
    }
}
