//! CSM-style sensor with named model parameters.
//!
//! The sensor is a framing geometry refined by a small set of named corrections:
//!
//! | index | name                  | type        | set        |
//! |-------|-----------------------|-------------|------------|
//! | 0..3  | position bias x, y, z | Real        | Adjustable |
//! | 3..6  | omega, phi, kappa     | Real        | Adjustable |
//! | 6     | focal length bias     | Fixed       | Hard       |
//! | 7, 8  | principal point x, y  | Fictitious  | Hard       |
//!
//! The look vector becomes `v = R(ω, φ, κ) · C · (Mᵀ P − S − b)` and the focal plane uses
//! `f + δf` with the principal point shifted by `(px, py)`. Parameter selection for the bundle
//! is done by set, by type, or by explicit name list.
use std::{fmt, str::FromStr};

use nalgebra::{DMatrix, Matrix3, Vector3};
use serde::{Deserialize, Serialize};

use crate::{
    camera::{
        rotation::{d_rot_x, d_rot_y, d_rot_z, rot_x, rot_y, rot_z},
        Camera, ExteriorOrientation, ImageCoordinate, XDependency,
    },
    constants::BodyFixed,
    jigsaw_errors::JigsawError,
    settings::observation_solve::CsmParameterSelection,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CsmParameterSet {
    Adjustable,
    Hard,
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CsmParameterType {
    None,
    Fictitious,
    Real,
    Fixed,
}

impl FromStr for CsmParameterSet {
    type Err = JigsawError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "adjustable" | "valid" => Ok(Self::Adjustable),
            "hard" | "non_adjustable" => Ok(Self::Hard),
            "all" => Ok(Self::All),
            other => Err(JigsawError::InvalidSetting(format!("unknown CSM parameter set '{other}'"))),
        }
    }
}

impl FromStr for CsmParameterType {
    type Err = JigsawError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "fictitious" => Ok(Self::Fictitious),
            "real" => Ok(Self::Real),
            "fixed" => Ok(Self::Fixed),
            other => Err(JigsawError::InvalidSetting(format!("unknown CSM parameter type '{other}'"))),
        }
    }
}

impl fmt::Display for CsmParameterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CsmParameter {
    pub name: String,
    pub kind: CsmParameterType,
    pub adjustable: bool,
    pub value: f64,
    /// Model-supplied a priori sigma (parameter units).
    #[serde(default)]
    pub sigma: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CsmCamera {
    pub focal_length: f64,
    pub pixel_pitch: f64,
    pub boresight_sample: f64,
    pub boresight_line: f64,
    #[serde(default = "default_x_dependency")]
    pub x_dependency: XDependency,
    pub parameters: Vec<CsmParameter>,
}

fn default_x_dependency() -> XDependency {
    XDependency::Sample
}

const POSITION_BIAS: usize = 0;
const ANGLE_BIAS: usize = 3;
const FOCAL_BIAS: usize = 6;
const PRINCIPAL_POINT: usize = 7;

impl CsmCamera {
    /// Camera with the standard parameter list, all corrections zero.
    pub fn new(focal_length: f64, pixel_pitch: f64, boresight_sample: f64, boresight_line: f64) -> Self {
        let param = |name: &str, kind, adjustable, sigma| CsmParameter {
            name: name.to_string(),
            kind,
            adjustable,
            value: 0.0,
            sigma,
        };
        use CsmParameterType::*;
        Self {
            focal_length,
            pixel_pitch,
            boresight_sample,
            boresight_line,
            x_dependency: XDependency::Sample,
            parameters: vec![
                param("position bias x", Real, true, Some(100.0)),
                param("position bias y", Real, true, Some(100.0)),
                param("position bias z", Real, true, Some(100.0)),
                param("omega", Real, true, Some(1.0e-3)),
                param("phi", Real, true, Some(1.0e-3)),
                param("kappa", Real, true, Some(1.0e-3)),
                param("focal length bias", Fixed, false, Some(1.0e-2)),
                param("principal point x", Fictitious, false, Some(1.0e-2)),
                param("principal point y", Fictitious, false, Some(1.0e-2)),
            ],
        }
    }

    fn value(&self, index: usize) -> f64 {
        self.parameters.get(index).map_or(0.0, |p| p.value)
    }

    fn bias_rotation(&self) -> (Matrix3<f64>, [Matrix3<f64>; 3]) {
        let (w, p, k) = (
            self.value(ANGLE_BIAS),
            self.value(ANGLE_BIAS + 1),
            self.value(ANGLE_BIAS + 2),
        );
        let (rx, ry, rz) = (rot_x(w), rot_y(p), rot_z(k));
        (
            rx * ry * rz,
            [d_rot_x(w) * ry * rz, rx * d_rot_y(p) * rz, rx * ry * d_rot_z(k)],
        )
    }

    fn position_bias(&self) -> Vector3<f64> {
        Vector3::new(
            self.value(POSITION_BIAS),
            self.value(POSITION_BIAS + 1),
            self.value(POSITION_BIAS + 2),
        )
    }

    /// Indices of the parameters chosen by a selection.
    ///
    /// Return
    /// ----------
    /// * The indices in model order, or [`JigsawError::InvalidSetting`] when a listed name is
    ///   not a parameter of this model.
    pub fn select(&self, selection: &CsmParameterSelection) -> Result<Vec<usize>, JigsawError> {
        let indices = match selection {
            CsmParameterSelection::Set(CsmParameterSet::All) => (0..self.parameters.len()).collect(),
            CsmParameterSelection::Set(CsmParameterSet::Adjustable) => self
                .parameters
                .iter()
                .enumerate()
                .filter(|(_, p)| p.adjustable)
                .map(|(i, _)| i)
                .collect(),
            CsmParameterSelection::Set(CsmParameterSet::Hard) => self
                .parameters
                .iter()
                .enumerate()
                .filter(|(_, p)| !p.adjustable)
                .map(|(i, _)| i)
                .collect(),
            CsmParameterSelection::Type(kind) => self
                .parameters
                .iter()
                .enumerate()
                .filter(|(_, p)| p.kind == *kind)
                .map(|(i, _)| i)
                .collect(),
            CsmParameterSelection::List(names) => names
                .iter()
                .map(|name| {
                    self.parameters
                        .iter()
                        .position(|p| p.name.eq_ignore_ascii_case(name.trim()))
                        .ok_or_else(|| {
                            JigsawError::InvalidSetting(format!("unknown CSM parameter '{name}'"))
                        })
                })
                .collect::<Result<Vec<_>, _>>()?,
        };
        Ok(indices)
    }

    pub fn apply_correction(&mut self, index: usize, delta: f64) {
        if let Some(p) = self.parameters.get_mut(index) {
            p.value += delta;
        }
    }
}

impl Camera for CsmCamera {
    fn x_dependency(&self) -> XDependency {
        self.x_dependency
    }

    fn focal_length(&self) -> f64 {
        self.focal_length + self.value(FOCAL_BIAS)
    }

    fn pixel_pitch(&self) -> f64 {
        self.pixel_pitch
    }

    fn boresight(&self) -> ImageCoordinate {
        ImageCoordinate::new(
            self.boresight_sample + self.value(PRINCIPAL_POINT) / self.pixel_pitch,
            self.boresight_line + self.value(PRINCIPAL_POINT + 1) / self.pixel_pitch,
        )
    }

    fn look_rotation(&self, eo: &ExteriorOrientation) -> Matrix3<f64> {
        self.bias_rotation().0 * eo.pointing
    }

    fn adjusted_inertial_look(&self, eo: &ExteriorOrientation, point: &BodyFixed) -> Vector3<f64> {
        eo.inertial_look(point) - self.position_bias()
    }

    fn parameter_count(&self) -> usize {
        self.parameters.len()
    }

    fn parameter_partials(&self, eo: &ExteriorOrientation, point: &BodyFixed) -> DMatrix<f64> {
        let mut out = DMatrix::zeros(2, self.parameters.len());
        let look = self.camera_look(eo, point);
        if look.z <= 0.0 {
            return out;
        }
        let g = self.projection_partials(&look);
        let (bias, d_bias) = self.bias_rotation();
        let rotation = bias * eo.pointing;
        let inertial = self.adjusted_inertial_look(eo, point);
        let before_bias = eo.pointing * inertial;

        for k in 0..3 {
            let col = -(g * rotation.column(k));
            out.set_column(POSITION_BIAS + k, &col);
            let col = g * (d_bias[k] * before_bias);
            out.set_column(ANGLE_BIAS + k, &col);
        }

        let p = self.pixel_pitch;
        let (fx, fy) = (look.x / look.z / p, look.y / look.z / p);
        let (ds, dl) = match self.x_dependency {
            XDependency::Sample => (fx, fy),
            XDependency::Line => (fy, fx),
        };
        if self.parameters.len() > FOCAL_BIAS {
            out[(0, FOCAL_BIAS)] = ds;
            out[(1, FOCAL_BIAS)] = dl;
        }
        // principal point offsets shift sample and line directly
        if self.parameters.len() > PRINCIPAL_POINT + 1 {
            out[(0, PRINCIPAL_POINT)] = 1.0 / p;
            out[(1, PRINCIPAL_POINT + 1)] = 1.0 / p;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{rotation::euler_attitude, target::TargetBody};
    use approx::assert_relative_eq;

    fn setup() -> (CsmCamera, ExteriorOrientation) {
        let moon = TargetBody::sphere("Moon", 1_737_400.0);
        let (pointing, pointing_partials) = euler_attitude(std::f64::consts::PI, 0.0, 0.0);
        let eo = ExteriorOrientation {
            time: 0.0,
            pointing,
            pointing_partials,
            position: Vector3::new(1_837_400.0, 0.0, 0.0),
            body: moon.body_rotation(0.0),
        };
        (CsmCamera::new(500.0, 0.01, 512.5, 512.5), eo)
    }

    #[test]
    fn test_selection() {
        let (cam, _) = setup();
        let adjustable = cam
            .select(&CsmParameterSelection::Set(CsmParameterSet::Adjustable))
            .unwrap();
        assert_eq!(adjustable, vec![0, 1, 2, 3, 4, 5]);
        let fictitious = cam
            .select(&CsmParameterSelection::Type(CsmParameterType::Fictitious))
            .unwrap();
        assert_eq!(fictitious, vec![7, 8]);
        let listed = cam
            .select(&CsmParameterSelection::List(vec!["Kappa".into(), "focal length bias".into()]))
            .unwrap();
        assert_eq!(listed, vec![5, 6]);
        assert!(cam
            .select(&CsmParameterSelection::List(vec!["warp".into()]))
            .is_err());
    }

    #[test]
    fn test_parameter_partials_match_finite_differences() {
        let (cam, eo) = setup();
        let point = Vector3::new(1_737_000.0, 3_000.0, -2_000.0);
        let analytic = cam.parameter_partials(&eo, &point);
        for k in 0..cam.parameter_count() {
            let h = if k < 3 { 1.0 } else { 1e-7 };
            let mut plus = cam.clone();
            plus.apply_correction(k, h);
            let mut minus = cam.clone();
            minus.apply_correction(k, -h);
            let a = plus.ground_to_image(&eo, &point).unwrap();
            let b = minus.ground_to_image(&eo, &point).unwrap();
            assert_relative_eq!(analytic[(0, k)], (a.sample - b.sample) / (2.0 * h), epsilon = 1e-4, max_relative = 1e-4);
            assert_relative_eq!(analytic[(1, k)], (a.line - b.line) / (2.0 * h), epsilon = 1e-4, max_relative = 1e-4);
        }
    }
}
