//! # Surface points
//!
//! A [`SurfacePoint`] stores a body-fixed Cartesian position (meters) and an optional 3×3
//! rectangular covariance (m²). The solver parameterises points either in rectangular
//! coordinates `(x, y, z)` or in latitudinal coordinates `(lat, lon, radius)` with planetocentric
//! latitude and east-positive longitude, both in radians.
//!
//! ## Conversions
//!
//! ```text
//! x = r cos(lat) cos(lon)
//! y = r cos(lat) sin(lon)
//! z = r sin(lat)
//! ```
//!
//! [`coordinate_partials`] is `J = ∂(x, y, z)/∂(c₁, c₂, c₃)` and covariances move between the
//! two parameterisations as `Σ_rect = J Σ_c Jᵀ`.
use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};

use crate::{
    constants::{BodyFixed, Covariance3, DPI},
    settings::CoordinateType,
};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SurfacePoint {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    /// Rectangular covariance, row-major, m².
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub covariance: Option<[[f64; 3]; 3]>,
}

impl SurfacePoint {
    pub fn from_rectangular(position: &BodyFixed) -> Self {
        Self {
            x: position.x,
            y: position.y,
            z: position.z,
            covariance: None,
        }
    }

    pub fn from_latitudinal(lat: f64, lon: f64, radius: f64) -> Self {
        let (sl, cl) = lat.sin_cos();
        let (so, co) = lon.sin_cos();
        Self::from_rectangular(&Vector3::new(
            radius * cl * co,
            radius * cl * so,
            radius * sl,
        ))
    }

    pub fn position(&self) -> BodyFixed {
        Vector3::new(self.x, self.y, self.z)
    }

    /// `(lat, lon, radius)`, longitude in `[0, 2π)`.
    pub fn latitudinal(&self) -> (f64, f64, f64) {
        let r = self.position().norm();
        if r == 0.0 {
            return (0.0, 0.0, 0.0);
        }
        let lat = (self.z / r).clamp(-1.0, 1.0).asin();
        let lon = self.y.atan2(self.x).rem_euclid(DPI);
        (lat, lon, r)
    }

    /// Coordinates in the requested parameterisation.
    pub fn coordinates(&self, coordinate_type: CoordinateType) -> Vector3<f64> {
        match coordinate_type {
            CoordinateType::Rectangular => self.position(),
            CoordinateType::Latitudinal => {
                let (lat, lon, r) = self.latitudinal();
                Vector3::new(lat, lon, r)
            }
        }
    }

    pub fn covariance_matrix(&self) -> Option<Covariance3> {
        self.covariance.map(|c| {
            Matrix3::new(
                c[0][0], c[0][1], c[0][2], c[1][0], c[1][1], c[1][2], c[2][0], c[2][1], c[2][2],
            )
        })
    }

    pub fn set_covariance_matrix(&mut self, cov: Option<&Covariance3>) {
        self.covariance = cov.map(|m| {
            [
                [m[(0, 0)], m[(0, 1)], m[(0, 2)]],
                [m[(1, 0)], m[(1, 1)], m[(1, 2)]],
                [m[(2, 0)], m[(2, 1)], m[(2, 2)]],
            ]
        });
    }

    /// True when a covariance is present and carries at least one positive variance.
    pub fn has_covariance(&self) -> bool {
        self.covariance
            .map(|c| (0..3).any(|i| c[i][i] > 0.0))
            .unwrap_or(false)
    }

    /// Covariance expressed in the requested parameterisation.
    pub fn coordinate_covariance(&self, coordinate_type: CoordinateType) -> Option<Covariance3> {
        let rect = self.covariance_matrix()?;
        match coordinate_type {
            CoordinateType::Rectangular => Some(rect),
            CoordinateType::Latitudinal => {
                let j = coordinate_partials(self, coordinate_type);
                let j_inv = j.try_inverse()?;
                Some(j_inv * rect * j_inv.transpose())
            }
        }
    }

    /// Store a covariance given in the requested parameterisation.
    pub fn set_coordinate_covariance(&mut self, coordinate_type: CoordinateType, cov: &Covariance3) {
        let rect = match coordinate_type {
            CoordinateType::Rectangular => *cov,
            CoordinateType::Latitudinal => {
                let j = coordinate_partials(self, coordinate_type);
                j * cov * j.transpose()
            }
        };
        self.set_covariance_matrix(Some(&rect));
    }

    /// One-sigma uncertainties in meters along the requested coordinates.
    ///
    /// Latitudinal sigmas are converted to ground distances (`σ_lat · r`,
    /// `σ_lon · r cos(lat)`).
    pub fn sigmas_m(&self, coordinate_type: CoordinateType) -> Option<[f64; 3]> {
        let cov = self.coordinate_covariance(coordinate_type)?;
        let s = |i: usize| cov[(i, i)].max(0.0).sqrt();
        Some(match coordinate_type {
            CoordinateType::Rectangular => [s(0), s(1), s(2)],
            CoordinateType::Latitudinal => {
                let (lat, _, r) = self.latitudinal();
                [s(0) * r, s(1) * r * lat.cos(), s(2)]
            }
        })
    }
}

/// Build a point from coordinates in the requested parameterisation.
pub fn from_coordinates(coordinate_type: CoordinateType, c: &Vector3<f64>) -> SurfacePoint {
    match coordinate_type {
        CoordinateType::Rectangular => SurfacePoint::from_rectangular(c),
        CoordinateType::Latitudinal => SurfacePoint::from_latitudinal(c[0], c[1], c[2]),
    }
}

/// `∂(x, y, z)/∂(c₁, c₂, c₃)` at a point.
pub fn coordinate_partials(point: &SurfacePoint, coordinate_type: CoordinateType) -> Matrix3<f64> {
    match coordinate_type {
        CoordinateType::Rectangular => Matrix3::identity(),
        CoordinateType::Latitudinal => {
            let (lat, lon, r) = point.latitudinal();
            let (sl, cl) = lat.sin_cos();
            let (so, co) = lon.sin_cos();
            Matrix3::new(
                -r * sl * co,
                -r * cl * so,
                cl * co,
                -r * sl * so,
                r * cl * co,
                cl * so,
                r * cl,
                0.0,
                sl,
            )
        }
    }
}

/// Convert per-coordinate sigmas given in meters to parameter units at a point.
///
/// Rectangular sigmas are returned unchanged; latitudinal latitude/longitude sigmas become
/// angles (`σ / r`, `σ / (r cos(lat))`).
pub fn sigmas_to_parameter_units(
    point: &SurfacePoint,
    coordinate_type: CoordinateType,
    sigmas_m: [Option<f64>; 3],
) -> [Option<f64>; 3] {
    match coordinate_type {
        CoordinateType::Rectangular => sigmas_m,
        CoordinateType::Latitudinal => {
            let (lat, _, r) = point.latitudinal();
            let lon_scale = (r * lat.cos()).abs().max(f64::MIN_POSITIVE);
            [
                sigmas_m[0].map(|s| s / r),
                sigmas_m[1].map(|s| s / lon_scale),
                sigmas_m[2],
            ]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::RADEG;
    use approx::assert_relative_eq;

    #[test]
    fn test_latitudinal_conversion() {
        let p = SurfacePoint::from_latitudinal(10.0 * RADEG, 200.0 * RADEG, 1_737_400.0);
        let (lat, lon, r) = p.latitudinal();
        assert_relative_eq!(lat, 10.0 * RADEG, epsilon = 1e-12);
        assert_relative_eq!(lon, 200.0 * RADEG, epsilon = 1e-12);
        assert_relative_eq!(r, 1_737_400.0, epsilon = 1e-6);
    }

    #[test]
    fn test_coordinate_partials_match_finite_differences() {
        let p = SurfacePoint::from_latitudinal(0.3, 1.1, 1_737_400.0);
        let j = coordinate_partials(&p, CoordinateType::Latitudinal);
        let c = p.coordinates(CoordinateType::Latitudinal);
        for k in 0..3 {
            let h = if k == 2 { 1.0 } else { 1e-6 };
            let mut plus = c;
            plus[k] += h;
            let mut minus = c;
            minus[k] -= h;
            let numeric = (from_coordinates(CoordinateType::Latitudinal, &plus).position()
                - from_coordinates(CoordinateType::Latitudinal, &minus).position())
                / (2.0 * h);
            assert_relative_eq!(j.column(k).into_owned(), numeric, epsilon = 1e-6, max_relative = 1e-6);
        }
    }

    #[test]
    fn test_covariance_conversion_is_reversible() {
        let mut p = SurfacePoint::from_latitudinal(-0.4, 2.0, 1_737_400.0);
        let lat_cov = Matrix3::from_diagonal(&Vector3::new(1e-10, 4e-10, 25.0));
        p.set_coordinate_covariance(CoordinateType::Latitudinal, &lat_cov);
        let back = p.coordinate_covariance(CoordinateType::Latitudinal).unwrap();
        assert_relative_eq!(back, lat_cov, epsilon = 1e-12, max_relative = 1e-8);

        let sigmas = p.sigmas_m(CoordinateType::Latitudinal).unwrap();
        assert_relative_eq!(sigmas[0], 1e-5 * 1_737_400.0, max_relative = 1e-8);
        assert_relative_eq!(sigmas[2], 5.0, max_relative = 1e-8);
    }

    #[test]
    fn test_sigmas_to_parameter_units() {
        let p = SurfacePoint::from_latitudinal(0.0, 0.0, 1_000.0);
        let s = sigmas_to_parameter_units(
            &p,
            CoordinateType::Latitudinal,
            [Some(10.0), Some(20.0), None],
        );
        assert_relative_eq!(s[0].unwrap(), 0.01);
        assert_relative_eq!(s[1].unwrap(), 0.02);
        assert!(s[2].is_none());
    }
}
