use uom::si::angle::{degree, radian};
use uom::si::f64::Angle;

#[cfg(any(test, feature = "approx"))]
use approx::{AbsDiffEq, RelativeEq};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub(crate) struct BoundedAngle {
    angle: Angle,
}

impl BoundedAngle {
    pub(crate) fn new(angle: impl Into<Angle>) -> Self {
        Self {
            // NOTE: uom may store the value differently-normalized, so we also normalize on
            // output.
            angle: Angle::new::<radian>(Self::into_bounds(angle.into())),
        }
    }

    /// Returns the angle in [0°, 360°) in radians.
    pub(crate) fn get_bounded(self) -> f64 {
        Self::into_bounds(self.angle)
    }

    /// Returns the angle in [0°, 360°) in degrees.
    pub(crate) fn to_compass_degrees(self) -> f64 {
        let degrees = self.get_bounded().to_degrees();
        // the radian -> degree conversion can round 359.999...° up to a full turn
        if degrees >= 360. {
            0.
        } else {
            degrees
        }
    }

    fn into_bounds(angle: Angle) -> f64 {
        let out_of_bounds: f64 = angle.get::<radian>();
        let bounded = out_of_bounds.rem_euclid(Angle::FULL_TURN.get::<radian>());
        // rem_euclid may return the divisor itself for tiny negative inputs
        if bounded >= Angle::FULL_TURN.get::<radian>() {
            0.
        } else {
            bounded
        }
    }

    /// Returns the angle in [-180°, 180°) in radians.
    pub(crate) fn to_signed_range(self) -> f64 {
        let angle = self.get_bounded();
        if angle < Angle::HALF_TURN.get::<radian>() {
            angle
        } else {
            angle - Angle::FULL_TURN.get::<radian>()
        }
    }

    /// Returns the angle in (-180°, 180°] in degrees.
    ///
    /// This is the "how far do I turn" view of an angle: exactly behind is reported as a right
    /// turn of 180° rather than a left turn of 180°.
    pub(crate) fn to_relative_degrees(self) -> f64 {
        let signed = self.to_signed_range().to_degrees();
        if signed <= -180. {
            signed + 360.
        } else {
            signed
        }
    }
}

/// Every value that can be converted into an [`Angle`] can be converted into [`BoundedAngle`].
impl<U: Into<Angle>> From<U> for BoundedAngle {
    fn from(value: U) -> Self {
        BoundedAngle::new(value)
    }
}

/// Shorthand used throughout the crate for degree-valued angles.
pub(crate) fn degrees(value: f64) -> Angle {
    Angle::new::<degree>(value)
}

#[cfg(any(test, feature = "approx"))]
impl RelativeEq for BoundedAngle {
    fn default_max_relative() -> Self::Epsilon {
        f64::default_max_relative()
    }

    fn relative_eq(
        &self,
        other: &Self,
        epsilon: Self::Epsilon,
        max_relative: Self::Epsilon,
    ) -> bool {
        let bounded = self.get_bounded();
        let other_bounded = other.get_bounded();

        let min = f64::min(bounded, other_bounded);
        let max = f64::max(bounded, other_bounded);

        f64::relative_eq(&min, &max, epsilon, max_relative)
            || f64::relative_eq(
                &(min + Angle::FULL_TURN.get::<radian>()),
                &max,
                epsilon,
                max_relative,
            )
    }
}

#[cfg(any(test, feature = "approx"))]
impl AbsDiffEq<Self> for BoundedAngle {
    type Epsilon = <f64 as AbsDiffEq>::Epsilon;

    fn default_epsilon() -> Self::Epsilon {
        // this is very accurate in radians
        0.000_000_001
    }

    fn abs_diff_eq(&self, other: &Self, epsilon: Self::Epsilon) -> bool {
        Self::new(self.angle - other.angle).to_signed_range().abs() <= epsilon
    }
}

#[cfg(test)]
mod tests {
    use crate::util::BoundedAngle;
    use approx::{assert_abs_diff_eq, assert_abs_diff_ne, assert_relative_eq, assert_relative_ne};
    use quickcheck::quickcheck;
    use rstest::rstest;
    use uom::si::angle::{degree, radian};
    use uom::si::f64::Angle;

    fn r(radians: f64) -> Angle {
        Angle::new::<radian>(radians)
    }
    fn d(degrees: f64) -> Angle {
        Angle::new::<degree>(degrees)
    }

    #[test]
    fn bounded_angle_negative_radians() {
        let out_of_bounds = -(0.5 * Angle::HALF_TURN);
        let sut = BoundedAngle::new(out_of_bounds);
        assert_eq!(sut.get_bounded(), 1.5 * Angle::HALF_TURN.get::<radian>());
    }

    #[test]
    fn bounded_angle_negative_degrees() {
        let sut = BoundedAngle::new(d(-390.));
        assert_relative_eq!(sut.get_bounded(), 330.0_f64.to_radians());
    }

    #[test]
    fn bounded_angle_positive_outside_bounds() {
        let out_of_bounds = Angle::FULL_TURN + r(0.9);
        let sut = BoundedAngle::new(out_of_bounds);
        assert_relative_eq!(sut.get_bounded(), 0.9, epsilon = 0.000_000_001);
    }

    #[test]
    fn tiny_negative_angle_stays_below_full_turn() {
        let sut = BoundedAngle::new(r(-1e-20));
        assert!(sut.get_bounded() < Angle::FULL_TURN.get::<radian>());
        assert!(sut.to_compass_degrees() < 360.);
    }

    #[rstest]
    #[case(d(0.), 0.)]
    #[case(d(180.), -180.)]
    #[case(d(359.), -1.)]
    #[case(d(270.), -90.)]
    #[case(d(-90.), -90.)]
    #[case(d(360.+340.), -20.)]
    fn bounded_angle_to_signed_range_converts_correctly(
        #[case] input: Angle,
        #[case] expected_result_in_degrees: f64,
    ) {
        assert_relative_eq!(
            BoundedAngle::new(input).to_signed_range(),
            expected_result_in_degrees.to_radians(),
            epsilon = f64::EPSILON * 1000.
        );
    }

    #[rstest]
    #[case(d(0.), 0.)]
    #[case(r(std::f64::consts::PI), 180.)]
    #[case(r(-std::f64::consts::PI), 180.)]
    #[case(d(190.), -170.)]
    #[case(d(-190.), 170.)]
    #[case(d(70.), 70.)]
    #[case(d(-725.), -5.)]
    fn bounded_angle_to_relative_degrees_converts_correctly(
        #[case] input: Angle,
        #[case] expected: f64,
    ) {
        assert_relative_eq!(
            BoundedAngle::new(input).to_relative_degrees(),
            expected,
            epsilon = 1e-9
        );
    }

    quickcheck! {
        fn relative_degrees_are_half_open(x: f64) -> bool {
            if !x.is_finite() {
                return true;
            }
            let rel = BoundedAngle::new(d(x)).to_relative_degrees();
            rel > -180. && rel <= 180.
        }

        fn compass_degrees_are_half_open(x: f64) -> bool {
            if !x.is_finite() {
                return true;
            }
            let deg = BoundedAngle::new(d(x)).to_compass_degrees();
            (0. ..360.).contains(&deg)
        }
    }

    #[rstest]
    #[case(0., 0. + f64::EPSILON, true)]
    #[case(10., 2., false)]
    #[case(360. - f64::EPSILON * 1e3, 0., true)]
    #[case(0. + f64::EPSILON * 1e2, 360. * 2. - f64::EPSILON * 1e2, true)]
    #[case(10., 2. + 360., false)]
    fn bounded_angle_comparison(#[case] a: f64, #[case] b: f64, #[case] expected: bool) {
        let a = BoundedAngle::new(d(a));
        let b = BoundedAngle::new(d(b));

        if expected {
            assert_relative_eq!(&a, &b, epsilon = f64::EPSILON * 1e3);
            assert_abs_diff_eq!(&a, &b, epsilon = f64::EPSILON * 1e3);
        } else {
            assert_relative_ne!(&a, &b, epsilon = f64::EPSILON * 1e3);
            assert_abs_diff_ne!(&a, &b, epsilon = f64::EPSILON * 1e3);
        }
    }
}
