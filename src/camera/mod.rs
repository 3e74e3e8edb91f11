//! # Camera models
//!
//! The solver only needs three capabilities from a camera:
//!
//! 1. project a body-fixed surface point to `(sample, line)` ([`Camera::ground_to_image`]),
//! 2. intersect the line of sight of a pixel with the target shape ([`Camera::image_to_ground`]),
//! 3. give the partial derivatives of the projection ([`Camera::projection_partials`],
//!    [`Camera::parameter_partials`]).
//!
//! They are gathered in the object-safe [`Camera`] trait. Concrete kinds are variants of
//! [`CameraModel`], the serialized form found in image records.
//!
//! ## Geometry
//!
//! Exterior orientation at the exposure time is an [`ExteriorOrientation`]:
//!
//! * `pointing` `C` rotates J2000 vectors into the camera frame,
//! * `position` `S` is the spacecraft position in J2000 (meters),
//! * `body` `M` rotates J2000 vectors into the body-fixed frame.
//!
//! The camera-frame look vector to a body-fixed point `P` is `v = C (Mᵀ P − S)` and the
//! focal plane coordinates are `x = f·vx/vz`, `y = f·vy/vz` (millimeters). Which of `x`/`y`
//! maps to the sample axis is the camera's [`XDependency`].
pub mod csm;
pub mod framing;
pub mod polynomial;
pub mod rotation;
pub mod target;

use std::fmt;

use nalgebra::{DMatrix, Matrix2x3, Matrix3, Vector2, Vector3};
use serde::{Deserialize, Serialize};

use crate::{
    camera::{csm::CsmCamera, framing::FramingCamera, target::TargetBody},
    constants::BodyFixed,
};

/// Sub-pixel image coordinate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageCoordinate {
    pub sample: f64,
    pub line: f64,
}

impl ImageCoordinate {
    pub fn new(sample: f64, line: f64) -> Self {
        Self { sample, line }
    }

    pub fn as_vector(&self) -> Vector2<f64> {
        Vector2::new(self.sample, self.line)
    }
}

/// Which image axis the focal plane `x` coordinate depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum XDependency {
    Sample,
    Line,
}

/// Pose of a camera at one exposure time.
#[derive(Debug, Clone, PartialEq)]
pub struct ExteriorOrientation {
    pub time: f64,
    pub pointing: Matrix3<f64>,
    /// `∂C/∂ra`, `∂C/∂dec`, `∂C/∂twist`.
    pub pointing_partials: [Matrix3<f64>; 3],
    pub position: Vector3<f64>,
    pub body: Matrix3<f64>,
}

impl ExteriorOrientation {
    /// J2000 vector from the spacecraft to a body-fixed point.
    #[inline]
    pub fn inertial_look(&self, point: &BodyFixed) -> Vector3<f64> {
        self.body.transpose() * point - self.position
    }

    /// Spacecraft position in the body-fixed frame.
    #[inline]
    pub fn body_fixed_position(&self) -> BodyFixed {
        self.body * self.position
    }
}

/// Capability interface of a sensor model.
pub trait Camera: Send + Sync + fmt::Debug {
    fn x_dependency(&self) -> XDependency;

    /// Effective focal length, millimeters.
    fn focal_length(&self) -> f64;

    /// Pixel pitch, millimeters per pixel.
    fn pixel_pitch(&self) -> f64;

    /// Boresight location on the detector, `(sample, line)`.
    fn boresight(&self) -> ImageCoordinate;

    /// Rotation from J2000 to the frame the focal plane projection is applied in.
    fn look_rotation(&self, eo: &ExteriorOrientation) -> Matrix3<f64> {
        eo.pointing
    }

    /// J2000 look vector, after any position adjustment carried by the camera.
    fn adjusted_inertial_look(&self, eo: &ExteriorOrientation, point: &BodyFixed) -> Vector3<f64> {
        eo.inertial_look(point)
    }

    /// Camera-frame look vector to a body-fixed point.
    fn camera_look(&self, eo: &ExteriorOrientation, point: &BodyFixed) -> Vector3<f64> {
        self.look_rotation(eo) * self.adjusted_inertial_look(eo, point)
    }

    /// Focal plane coordinates `(x, y)` of a camera-frame look vector, or `None` when the
    /// point is behind the camera.
    fn focal_plane(&self, look: &Vector3<f64>) -> Option<(f64, f64)> {
        if look.z <= 0.0 {
            return None;
        }
        let f = self.focal_length();
        Some((f * look.x / look.z, f * look.y / look.z))
    }

    /// Detector coordinate of focal plane `(x, y)`.
    fn focal_plane_to_image(&self, x: f64, y: f64) -> ImageCoordinate {
        let p = self.pixel_pitch();
        let b = self.boresight();
        match self.x_dependency() {
            XDependency::Sample => ImageCoordinate::new(b.sample + x / p, b.line + y / p),
            XDependency::Line => ImageCoordinate::new(b.sample + y / p, b.line + x / p),
        }
    }

    /// Focal plane `(x, y)` of a detector coordinate.
    fn image_to_focal_plane(&self, coord: &ImageCoordinate) -> (f64, f64) {
        let p = self.pixel_pitch();
        let b = self.boresight();
        let ds = (coord.sample - b.sample) * p;
        let dl = (coord.line - b.line) * p;
        match self.x_dependency() {
            XDependency::Sample => (ds, dl),
            XDependency::Line => (dl, ds),
        }
    }

    /// Project a body-fixed point.
    fn ground_to_image(&self, eo: &ExteriorOrientation, point: &BodyFixed) -> Option<ImageCoordinate> {
        let look = self.camera_look(eo, point);
        let (x, y) = self.focal_plane(&look)?;
        Some(self.focal_plane_to_image(x, y))
    }

    /// Intersect the line of sight of a pixel with the target shape.
    fn image_to_ground(
        &self,
        eo: &ExteriorOrientation,
        coord: &ImageCoordinate,
        target: &TargetBody,
    ) -> Option<BodyFixed> {
        let (x, y) = self.image_to_focal_plane(coord);
        let look_camera = Vector3::new(x, y, self.focal_length());
        let look_inertial = self.look_rotation(eo).transpose() * look_camera;
        let direction = eo.body * look_inertial;
        let origin = eo.body_fixed_position();
        target.intersect(&origin, &direction)
    }

    /// `∂(sample, line)/∂v` for a camera-frame look vector `v`.
    ///
    /// Rows follow the image axes, so for cameras whose `x` depends on the line the focal plane
    /// rows are swapped.
    fn projection_partials(&self, look: &Vector3<f64>) -> Matrix2x3<f64> {
        let f = self.focal_length() / self.pixel_pitch();
        let iz = 1.0 / look.z;
        let dx = Vector3::new(f * iz, 0.0, -f * look.x * iz * iz);
        let dy = Vector3::new(0.0, f * iz, -f * look.y * iz * iz);
        match self.x_dependency() {
            XDependency::Sample => Matrix2x3::from_rows(&[dx.transpose(), dy.transpose()]),
            XDependency::Line => Matrix2x3::from_rows(&[dy.transpose(), dx.transpose()]),
        }
    }

    /// Number of camera model parameters that can be adjusted.
    fn parameter_count(&self) -> usize {
        0
    }

    /// `∂(sample, line)/∂q` for every camera model parameter `q` (2 × [`Self::parameter_count`]).
    fn parameter_partials(&self, _eo: &ExteriorOrientation, _point: &BodyFixed) -> DMatrix<f64> {
        DMatrix::zeros(2, 0)
    }
}

/// Serialized camera of an image record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum CameraModel {
    Framing(FramingCamera),
    Csm(CsmCamera),
}

impl CameraModel {
    pub fn as_camera(&self) -> &dyn Camera {
        match self {
            CameraModel::Framing(c) => c as &dyn Camera,
            CameraModel::Csm(c) => c as &dyn Camera,
        }
    }

    pub fn as_csm(&self) -> Option<&CsmCamera> {
        match self {
            CameraModel::Csm(c) => Some(c),
            CameraModel::Framing(_) => None,
        }
    }

    pub fn as_csm_mut(&mut self) -> Option<&mut CsmCamera> {
        match self {
            CameraModel::Csm(c) => Some(c),
            CameraModel::Framing(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::rotation::euler_attitude;
    use approx::assert_relative_eq;

    fn nadir_setup() -> (FramingCamera, ExteriorOrientation, TargetBody) {
        let moon = TargetBody::sphere("Moon", 1_737_400.0);
        let position = Vector3::new(1_837_400.0, 0.0, 0.0);
        // look straight down -x
        let (pointing, pointing_partials) = euler_attitude(std::f64::consts::PI, 0.0, 0.0);
        let eo = ExteriorOrientation {
            time: 0.0,
            pointing,
            pointing_partials,
            position,
            body: moon.body_rotation(0.0),
        };
        (FramingCamera::new(500.0, 0.01, 512.5, 512.5), eo, moon)
    }

    #[test]
    fn test_boresight_projects_to_center() {
        let (cam, eo, _) = nadir_setup();
        let c = cam
            .ground_to_image(&eo, &Vector3::new(1_737_400.0, 0.0, 0.0))
            .unwrap();
        assert_relative_eq!(c.sample, 512.5, epsilon = 1e-9);
        assert_relative_eq!(c.line, 512.5, epsilon = 1e-9);
    }

    #[test]
    fn test_image_to_ground_inverts_projection() {
        let (cam, eo, moon) = nadir_setup();
        let coord = ImageCoordinate::new(600.25, 410.75);
        let ground = cam.image_to_ground(&eo, &coord, &moon).unwrap();
        assert_relative_eq!(ground.norm(), 1_737_400.0, epsilon = 1e-6);
        let back = cam.ground_to_image(&eo, &ground).unwrap();
        assert_relative_eq!(back.sample, coord.sample, epsilon = 1e-6);
        assert_relative_eq!(back.line, coord.line, epsilon = 1e-6);
    }

    #[test]
    fn test_point_behind_camera_is_rejected() {
        let (cam, eo, _) = nadir_setup();
        assert!(cam
            .ground_to_image(&eo, &Vector3::new(3_000_000.0, 0.0, 0.0))
            .is_none());
    }

    #[test]
    fn test_line_dependency_swaps_axes() {
        let (mut cam, eo, _) = nadir_setup();
        let point = Vector3::new(1_737_000.0, 2_000.0, -1_000.0);
        let a = cam.ground_to_image(&eo, &point).unwrap();
        cam.x_dependency = XDependency::Line;
        let b = cam.ground_to_image(&eo, &point).unwrap();
        assert_relative_eq!(a.sample - 512.5, b.line - 512.5, epsilon = 1e-9);
        assert_relative_eq!(a.line - 512.5, b.sample - 512.5, epsilon = 1e-9);

        let look = cam.camera_look(&eo, &point);
        let swapped = cam.projection_partials(&look);
        cam.x_dependency = XDependency::Sample;
        let plain = cam.projection_partials(&look);
        assert_eq!(swapped.row(0), plain.row(1));
    }
}
