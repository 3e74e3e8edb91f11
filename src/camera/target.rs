//! Target body geometry: orientation, shape and ray intersection.
use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};

use crate::{
    camera::rotation::{d_rot_x, d_rot_z, rot_x, rot_z},
    constants::{BodyFixed, RADEG},
    settings::target_body::TargetParameterKind,
};

const SECONDS_PER_DAY: f64 = 86_400.0;
const DAYS_PER_CENTURY: f64 = 36_525.0;

/// Pole and prime meridian model of a target body, angles in radians.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetBody {
    pub name: String,
    /// Triaxial radii `(a, b, c)`, meters.
    pub radii: [f64; 3],
    /// Mean radius, meters. When present the body is treated as a sphere.
    #[serde(default)]
    pub mean_radius: Option<f64>,
    /// `[α₀, α̇]`, radians and radians per century.
    pub pole_ra: [f64; 2],
    /// `[δ₀, δ̇]`, radians and radians per century.
    pub pole_dec: [f64; 2],
    /// `[W₀, Ẇ, Ẅ]`, radians, radians per day, radians per day².
    pub prime_meridian: [f64; 3],
}

impl TargetBody {
    /// Sphere whose body-fixed frame coincides with J2000.
    pub fn sphere(name: impl Into<String>, radius: f64) -> Self {
        Self {
            name: name.into(),
            radii: [radius; 3],
            mean_radius: Some(radius),
            pole_ra: [-90.0 * RADEG, 0.0],
            pole_dec: [90.0 * RADEG, 0.0],
            prime_meridian: [0.0; 3],
        }
    }

    fn centuries(et: f64) -> f64 {
        et / (SECONDS_PER_DAY * DAYS_PER_CENTURY)
    }

    fn days(et: f64) -> f64 {
        et / SECONDS_PER_DAY
    }

    fn angles(&self, et: f64) -> (f64, f64, f64) {
        let t = Self::centuries(et);
        let d = Self::days(et);
        let ra = self.pole_ra[0] + self.pole_ra[1] * t;
        let dec = self.pole_dec[0] + self.pole_dec[1] * t;
        let w = self.prime_meridian[0] + self.prime_meridian[1] * d + self.prime_meridian[2] * d * d;
        (ra, dec, w)
    }

    /// Rotation from J2000 to the body-fixed frame at `et`.
    pub fn body_rotation(&self, et: f64) -> Matrix3<f64> {
        use std::f64::consts::FRAC_PI_2;
        let (ra, dec, w) = self.angles(et);
        rot_z(w) * rot_x(FRAC_PI_2 - dec) * rot_z(FRAC_PI_2 + ra)
    }

    /// Derivative of [`Self::body_rotation`] with respect to an orientation parameter.
    /// Shape parameters return a zero matrix.
    pub fn body_rotation_partial(&self, et: f64, kind: TargetParameterKind) -> Matrix3<f64> {
        use std::f64::consts::FRAC_PI_2;
        use TargetParameterKind::*;
        let (ra, dec, w) = self.angles(et);
        let t = Self::centuries(et);
        let d = Self::days(et);
        let a = rot_z(FRAC_PI_2 + ra);
        let b = rot_x(FRAC_PI_2 - dec);
        let c = rot_z(w);
        match kind {
            PoleRa => c * b * d_rot_z(FRAC_PI_2 + ra),
            PoleRaVelocity => c * b * d_rot_z(FRAC_PI_2 + ra) * t,
            PoleDec => -(c * d_rot_x(FRAC_PI_2 - dec) * a),
            PoleDecVelocity => -(c * d_rot_x(FRAC_PI_2 - dec) * a) * t,
            PrimeMeridian => d_rot_z(w) * b * a,
            PrimeMeridianVelocity => d_rot_z(w) * b * a * d,
            PrimeMeridianAcceleration => d_rot_z(w) * b * a * (d * d),
            _ => Matrix3::zeros(),
        }
    }

    /// Local radius of the body surface at a planetocentric latitude/longitude.
    pub fn local_radius(&self, lat: f64, lon: f64) -> f64 {
        if let Some(r) = self.mean_radius {
            return r;
        }
        let [a, b, c] = self.radii;
        let (sl, cl) = lat.sin_cos();
        let (so, co) = lon.sin_cos();
        let den = b * b * c * c * cl * cl * co * co
            + a * a * c * c * cl * cl * so * so
            + a * a * b * b * sl * sl;
        a * b * c / den.sqrt()
    }

    /// Partial derivative of [`Self::local_radius`] with respect to a shape parameter.
    pub fn local_radius_partial(&self, lat: f64, lon: f64, kind: TargetParameterKind) -> f64 {
        use TargetParameterKind::*;
        match kind {
            MeanRadius => 1.0,
            TriaxialRadiusA | TriaxialRadiusB | TriaxialRadiusC => {
                let [a, b, c] = self.radii;
                let (sl, cl) = lat.sin_cos();
                let (so, co) = lon.sin_cos();
                let (c2l, c2o, s2o, s2l) = (cl * cl, co * co, so * so, sl * sl);
                let den = b * b * c * c * c2l * c2o + a * a * c * c * c2l * s2o + a * a * b * b * s2l;
                let r = a * b * c / den.sqrt();
                match kind {
                    TriaxialRadiusA => r / a - r * (a * c * c * c2l * s2o + a * b * b * s2l) / den,
                    TriaxialRadiusB => r / b - r * (b * c * c * c2l * c2o + a * a * b * s2l) / den,
                    _ => r / c - r * (c * b * b * c2l * c2o + c * a * a * c2l * s2o) / den,
                }
            }
            _ => 0.0,
        }
    }

    /// First intersection of a body-fixed ray with the ellipsoid.
    pub fn intersect(&self, origin: &BodyFixed, direction: &Vector3<f64>) -> Option<BodyFixed> {
        let [a, b, c] = match self.mean_radius {
            Some(r) => [r; 3],
            None => self.radii,
        };
        let scale = Vector3::new(1.0 / a, 1.0 / b, 1.0 / c);
        let o = origin.component_mul(&scale);
        let d = direction.component_mul(&scale);
        let qa = d.dot(&d);
        let qb = 2.0 * o.dot(&d);
        let qc = o.dot(&o) - 1.0;
        let disc = qb * qb - 4.0 * qa * qc;
        if qa <= 0.0 || disc < 0.0 {
            return None;
        }
        let t = (-qb - disc.sqrt()) / (2.0 * qa);
        if t < 0.0 {
            return None;
        }
        Some(origin + direction * t)
    }

    /// Current value of a target parameter, internal units.
    pub fn parameter_value(&self, kind: TargetParameterKind) -> f64 {
        use TargetParameterKind::*;
        match kind {
            PoleRa => self.pole_ra[0],
            PoleRaVelocity => self.pole_ra[1],
            PoleDec => self.pole_dec[0],
            PoleDecVelocity => self.pole_dec[1],
            PrimeMeridian => self.prime_meridian[0],
            PrimeMeridianVelocity => self.prime_meridian[1],
            PrimeMeridianAcceleration => self.prime_meridian[2],
            TriaxialRadiusA => self.radii[0],
            TriaxialRadiusB => self.radii[1],
            TriaxialRadiusC => self.radii[2],
            MeanRadius => self.mean_radius.unwrap_or((self.radii[0] + self.radii[1] + self.radii[2]) / 3.0),
        }
    }

    pub fn set_parameter_value(&mut self, kind: TargetParameterKind, value: f64) {
        use TargetParameterKind::*;
        match kind {
            PoleRa => self.pole_ra[0] = value,
            PoleRaVelocity => self.pole_ra[1] = value,
            PoleDec => self.pole_dec[0] = value,
            PoleDecVelocity => self.pole_dec[1] = value,
            PrimeMeridian => self.prime_meridian[0] = value,
            PrimeMeridianVelocity => self.prime_meridian[1] = value,
            PrimeMeridianAcceleration => self.prime_meridian[2] = value,
            TriaxialRadiusA => self.radii[0] = value,
            TriaxialRadiusB => self.radii[1] = value,
            TriaxialRadiusC => self.radii[2] = value,
            MeanRadius => self.mean_radius = Some(value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_sphere_frame_is_identity() {
        let moon = TargetBody::sphere("Moon", 1_737_400.0);
        assert_relative_eq!(moon.body_rotation(1.0e8), Matrix3::identity(), epsilon = 1e-12);
    }

    #[test]
    fn test_intersection_from_orbit() {
        let moon = TargetBody::sphere("Moon", 1_737_400.0);
        let origin = Vector3::new(1_837_400.0, 0.0, 0.0);
        let hit = moon.intersect(&origin, &Vector3::new(-1.0, 0.0, 0.0)).unwrap();
        assert_relative_eq!(hit, Vector3::new(1_737_400.0, 0.0, 0.0), epsilon = 1e-6);
        assert!(moon.intersect(&origin, &Vector3::new(1.0, 0.0, 0.0)).is_none());
    }

    #[test]
    fn test_triaxial_radius_partials() {
        let mut body = TargetBody::sphere("Mars", 3_396_190.0);
        body.mean_radius = None;
        body.radii = [3_396_190.0, 3_390_000.0, 3_376_200.0];
        let (lat, lon) = (0.4, 1.2);
        let h = 1.0;
        for (k, kind) in [
            TargetParameterKind::TriaxialRadiusA,
            TargetParameterKind::TriaxialRadiusB,
            TargetParameterKind::TriaxialRadiusC,
        ]
        .into_iter()
        .enumerate()
        {
            let mut plus = body.clone();
            plus.radii[k] += h;
            let mut minus = body.clone();
            minus.radii[k] -= h;
            let numeric = (plus.local_radius(lat, lon) - minus.local_radius(lat, lon)) / (2.0 * h);
            assert_relative_eq!(body.local_radius_partial(lat, lon, kind), numeric, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_rotation_partial_matches_finite_difference() {
        let mut body = TargetBody::sphere("Moon", 1_737_400.0);
        body.prime_meridian = [0.3, 0.2, 0.0];
        let et = 86_400.0 * 3.0;
        let analytic = body.body_rotation_partial(et, TargetParameterKind::PrimeMeridianVelocity);
        let h = 1e-7;
        let mut plus = body.clone();
        plus.prime_meridian[1] += h;
        let mut minus = body.clone();
        minus.prime_meridian[1] -= h;
        let numeric = (plus.body_rotation(et) - minus.body_rotation(et)) / (2.0 * h);
        assert_relative_eq!(analytic, numeric, epsilon = 1e-6);
    }
}
