//! Elementary frame rotations and their derivatives.
//!
//! All matrices are *frame* rotations: `rot_z(θ) · v` expresses `v` in a frame rotated by `θ`
//! about the z axis. Composite attitudes are built as `Rz(γ) · Rx(β) · Rz(α)`.
use nalgebra::{Matrix3, Rotation3, UnitQuaternion};

#[inline]
pub fn rot_x(theta: f64) -> Matrix3<f64> {
    let (s, c) = theta.sin_cos();
    Matrix3::new(1.0, 0.0, 0.0, 0.0, c, s, 0.0, -s, c)
}

#[inline]
pub fn rot_y(theta: f64) -> Matrix3<f64> {
    let (s, c) = theta.sin_cos();
    Matrix3::new(c, 0.0, -s, 0.0, 1.0, 0.0, s, 0.0, c)
}

#[inline]
pub fn rot_z(theta: f64) -> Matrix3<f64> {
    let (s, c) = theta.sin_cos();
    Matrix3::new(c, s, 0.0, -s, c, 0.0, 0.0, 0.0, 1.0)
}

/// d rot_x / dθ
#[inline]
pub fn d_rot_x(theta: f64) -> Matrix3<f64> {
    let (s, c) = theta.sin_cos();
    Matrix3::new(0.0, 0.0, 0.0, 0.0, -s, c, 0.0, -c, -s)
}

/// d rot_y / dθ
#[inline]
pub fn d_rot_y(theta: f64) -> Matrix3<f64> {
    let (s, c) = theta.sin_cos();
    Matrix3::new(-s, 0.0, -c, 0.0, 0.0, 0.0, c, 0.0, -s)
}

/// d rot_z / dθ
#[inline]
pub fn d_rot_z(theta: f64) -> Matrix3<f64> {
    let (s, c) = theta.sin_cos();
    Matrix3::new(-s, c, 0.0, -c, -s, 0.0, 0.0, 0.0, 0.0)
}

/// Attitude matrix of a frame whose z axis points to `(ra, dec)` and is twisted by `twist`
/// about that axis, together with its partial derivatives with respect to `(ra, dec, twist)`.
///
/// `M = Rz(twist) · Rx(π/2 − dec) · Rz(π/2 + ra)` maps inertial vectors into the frame.
pub fn euler_attitude(ra: f64, dec: f64, twist: f64) -> (Matrix3<f64>, [Matrix3<f64>; 3]) {
    use std::f64::consts::FRAC_PI_2;
    let a = rot_z(FRAC_PI_2 + ra);
    let b = rot_x(FRAC_PI_2 - dec);
    let c = rot_z(twist);
    let m = c * b * a;
    let d_ra = c * b * d_rot_z(FRAC_PI_2 + ra);
    let d_dec = -(c * d_rot_x(FRAC_PI_2 - dec) * a);
    let d_twist = d_rot_z(twist) * b * a;
    (m, [d_ra, d_dec, d_twist])
}

/// Inverse of [`euler_attitude`]: recover `(ra, dec, twist)` from an attitude matrix.
pub fn euler_angles(m: &Matrix3<f64>) -> (f64, f64, f64) {
    // Row 2 is the frame z axis expressed in the inertial frame.
    let dec = m[(2, 2)].clamp(-1.0, 1.0).asin();
    let ra = m[(2, 1)].atan2(m[(2, 0)]);
    // Column 2 carries sin(twist), cos(twist) through the x/y rows.
    let twist = m[(0, 2)].atan2(m[(1, 2)]);
    (ra, dec, twist)
}

/// Unit quaternion of a rotation matrix, used for pointing caches.
pub fn to_quaternion(m: &Matrix3<f64>) -> UnitQuaternion<f64> {
    UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(*m))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    #[test]
    fn test_attitude_points_z_axis() {
        let (ra, dec) = (0.7, -0.3);
        let (m, _) = euler_attitude(ra, dec, 0.4);
        let boresight = Vector3::new(dec.cos() * ra.cos(), dec.cos() * ra.sin(), dec.sin());
        let in_frame = m * boresight;
        assert_relative_eq!(in_frame, Vector3::z(), epsilon = 1e-12);
        assert_relative_eq!(m * m.transpose(), Matrix3::identity(), epsilon = 1e-12);
    }

    #[test]
    fn test_euler_round_trip() {
        let (m, _) = euler_attitude(1.1, 0.2, -0.5);
        let (ra, dec, twist) = euler_angles(&m);
        assert_relative_eq!(ra, 1.1, epsilon = 1e-12);
        assert_relative_eq!(dec, 0.2, epsilon = 1e-12);
        assert_relative_eq!(twist, -0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_partials_match_finite_differences() {
        let (ra, dec, twist) = (0.3, 0.8, -1.2);
        let (_, d) = euler_attitude(ra, dec, twist);
        let h = 1e-7;
        let num = [
            (euler_attitude(ra + h, dec, twist).0 - euler_attitude(ra - h, dec, twist).0)
                / (2.0 * h),
            (euler_attitude(ra, dec + h, twist).0 - euler_attitude(ra, dec - h, twist).0)
                / (2.0 * h),
            (euler_attitude(ra, dec, twist + h).0 - euler_attitude(ra, dec, twist - h).0)
                / (2.0 * h),
        ];
        for k in 0..3 {
            assert_relative_eq!(d[k], num[k], epsilon = 1e-7);
        }
        assert_relative_eq!(
            d_rot_y(0.4),
            (rot_y(0.4 + h) - rot_y(0.4 - h)) / (2.0 * h),
            epsilon = 1e-7
        );
    }
}
