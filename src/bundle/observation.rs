//! # Observation grouping and exterior orientation parameters
//!
//! A [`BundleObservation`] is the unit that owns exterior orientation parameters: one image in
//! image mode, every image sharing an observation number in observation mode. Each observation
//! is bound to exactly one [`ObservationSolveSettings`] through
//! [`BundleSettings::solve_settings_index`].
//!
//! ## Parameter layout
//!
//! The free parameters of an observation form one block of the reduced normal equations, in this
//! order:
//!
//! 1. position: `x`, `y`, `z`, each with `number_position_coefficients` coefficients,
//! 2. pointing: `ra`, `dec` and optionally `twist`, each with `number_angle_coefficients`
//!    coefficients,
//!
//! or, for CSM cameras, the selected model parameters only. A held observation has an empty
//! block.
//!
//! ## A priori sigmas
//!
//! Sigmas are configured per polynomial order in physical units (per second^k). Polynomial
//! coefficients multiply the normalised time `τ = (t − t₀)/s`, so the coefficient sigma is
//! `σₖ·sᵏ`.
use std::{collections::HashMap, fmt};

use ahash::RandomState;
use nalgebra::{DMatrix, DVector, Matrix2x3, Vector2, Vector3};
use tracing::debug;

use crate::{
    camera::{
        polynomial::{AxisTrajectory, Polynomial},
        rotation::euler_attitude,
        target::TargetBody,
        Camera, CameraModel, ExteriorOrientation,
    },
    constants::{BodyFixed, ObservationNumber, SerialNumber},
    control::ControlNetwork,
    images::{ImageList, ImageRecord},
    jigsaw_errors::JigsawError,
    settings::{observation_solve::ObservationSolveSettings, BundleSettings},
};

const POSITION_AXES: [&str; 3] = ["X", "Y", "Z"];
const POINTING_AXES: [&str; 3] = ["RA", "DEC", "TWIST"];

/// One free parameter of an observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObservationParameter {
    Position { axis: usize, coefficient: usize },
    Pointing { axis: usize, coefficient: usize },
    Csm { index: usize },
}

#[derive(Debug, Clone)]
pub struct BundleObservation {
    pub index: usize,
    pub observation_number: ObservationNumber,
    pub instrument_id: String,
    pub settings_index: usize,
    pub held: bool,
    /// Indices into the [`ImageList`] of the member images.
    pub image_indices: Vec<usize>,
    pub serial_numbers: Vec<SerialNumber>,
    /// Exposure times of the member images.
    pub times: Vec<f64>,
    pub pointing: [AxisTrajectory; 3],
    pub position: [AxisTrajectory; 3],
    /// Working copy of each member image's camera.
    pub cameras: Vec<CameraModel>,
    pub ck_degree: usize,
    pub spk_degree: usize,
    pub layout: Vec<ObservationParameter>,
    pub apriori_values: DVector<f64>,
    /// Cumulative corrections since the start of the run.
    pub corrections: DVector<f64>,
    pub apriori_sigmas: Vec<Option<f64>>,
    pub adjusted_sigmas: Option<Vec<f64>>,
}

impl BundleObservation {
    /// Build an observation from its member images.
    ///
    /// Arguments
    /// -----------------
    /// * `index`: position of the observation in the solve.
    /// * `observation_number`: grouping key.
    /// * `settings_index`, `settings`: the governing solve settings.
    /// * `members`: `(image index, record)` pairs; the trajectories are taken from the first one.
    ///
    /// Return
    /// ----------
    /// * The observation, or [`JigsawError::InvalidSetting`] when a CSM selection names an
    ///   unknown parameter.
    pub fn new(
        index: usize,
        observation_number: ObservationNumber,
        settings_index: usize,
        settings: &ObservationSolveSettings,
        members: &[(usize, &ImageRecord)],
    ) -> Result<Self, JigsawError> {
        let first = members
            .first()
            .map(|(_, r)| *r)
            .ok_or_else(|| JigsawError::MissingImage(observation_number.clone()))?;
        let times: Vec<f64> = members.iter().map(|(_, r)| r.time).collect();

        let n_angle = settings.number_angle_coefficients();
        let n_pos = settings.number_position_coefficients();
        let ck_degree = settings.ck_degree.max(n_angle.saturating_sub(1));
        let spk_degree = settings.spk_degree.max(n_pos.saturating_sub(1));

        let axis = |p: &Polynomial, degree: usize, over: bool| {
            AxisTrajectory::from_existing(p, degree, over, &times)
        };
        let [ra, dec, twist] = first.pointing.axes();
        let pointing = [
            axis(ra, ck_degree, settings.pointing_over_existing)?,
            axis(dec, ck_degree, settings.pointing_over_existing)?,
            axis(twist, ck_degree, settings.pointing_over_existing)?,
        ];
        let [x, y, z] = first.position.axes();
        let position = [
            axis(x, spk_degree, settings.position_over_existing)?,
            axis(y, spk_degree, settings.position_over_existing)?,
            axis(z, spk_degree, settings.position_over_existing)?,
        ];

        let cameras: Vec<CameraModel> = members.iter().map(|(_, r)| r.camera.clone()).collect();

        let mut layout = Vec::new();
        let mut apriori_sigmas = Vec::new();
        match cameras.first().and_then(CameraModel::as_csm) {
            Some(csm) => {
                if let Some(selection) = &settings.csm {
                    for index in csm.select(selection)? {
                        layout.push(ObservationParameter::Csm { index });
                        apriori_sigmas.push(csm.parameters[index].sigma);
                    }
                }
            }
            None => {
                if settings.number_position_parameters() > 0 {
                    for (a, traj) in position.iter().enumerate() {
                        for k in 0..n_pos {
                            layout.push(ObservationParameter::Position {
                                axis: a,
                                coefficient: k,
                            });
                            let scale = traj.correction.time_scale.powi(k as i32);
                            apriori_sigmas.push(
                                settings.position_sigmas.get(k).copied().flatten().map(|s| s * scale),
                            );
                        }
                    }
                }
                for (a, traj) in pointing.iter().enumerate().take(settings.number_angles()) {
                    for k in 0..n_angle {
                        layout.push(ObservationParameter::Pointing {
                            axis: a,
                            coefficient: k,
                        });
                        let scale = traj.correction.time_scale.powi(k as i32);
                        apriori_sigmas.push(
                            settings.angle_sigmas.get(k).copied().flatten().map(|s| s * scale),
                        );
                    }
                }
            }
        }

        let mut obs = Self {
            index,
            observation_number,
            instrument_id: first.instrument_id.clone(),
            settings_index,
            held: settings.held,
            image_indices: members.iter().map(|(i, _)| *i).collect(),
            serial_numbers: members.iter().map(|(_, r)| r.serial_number.clone()).collect(),
            times,
            pointing,
            position,
            cameras,
            ck_degree,
            spk_degree,
            corrections: DVector::zeros(layout.len()),
            apriori_values: DVector::zeros(layout.len()),
            layout,
            apriori_sigmas,
            adjusted_sigmas: None,
        };
        obs.apriori_values = DVector::from_iterator(
            obs.layout.len(),
            (0..obs.layout.len()).map(|k| obs.parameter_value(k)),
        );
        Ok(obs)
    }

    pub fn parameter_count(&self) -> usize {
        self.layout.len()
    }

    /// Current value of parameter `k`.
    pub fn parameter_value(&self, k: usize) -> f64 {
        match self.layout[k] {
            ObservationParameter::Position { axis, coefficient } => {
                self.position[axis].correction.coefficients[coefficient]
            }
            ObservationParameter::Pointing { axis, coefficient } => {
                self.pointing[axis].correction.coefficients[coefficient]
            }
            ObservationParameter::Csm { index } => self
                .cameras
                .first()
                .and_then(CameraModel::as_csm)
                .map_or(0.0, |c| c.parameters[index].value),
        }
    }

    /// Report label of parameter `k`, e.g. `RA(t1)` or `omega`.
    pub fn parameter_name(&self, k: usize) -> String {
        match self.layout[k] {
            ObservationParameter::Position { axis, coefficient } => {
                format!("{}(t{coefficient})", POSITION_AXES[axis])
            }
            ObservationParameter::Pointing { axis, coefficient } => {
                format!("{}(t{coefficient})", POINTING_AXES[axis])
            }
            ObservationParameter::Csm { index } => self
                .cameras
                .first()
                .and_then(CameraModel::as_csm)
                .map_or_else(|| format!("csm{index}"), |c| c.parameters[index].name.clone()),
        }
    }

    /// Add a correction to every free parameter.
    pub fn apply_corrections(&mut self, delta: &DVector<f64>) {
        for (k, d) in delta.iter().enumerate() {
            match self.layout[k] {
                ObservationParameter::Position { axis, coefficient } => {
                    self.position[axis].correction.coefficients[coefficient] += d;
                }
                ObservationParameter::Pointing { axis, coefficient } => {
                    self.pointing[axis].correction.coefficients[coefficient] += d;
                }
                ObservationParameter::Csm { index } => {
                    for cam in &mut self.cameras {
                        if let Some(csm) = cam.as_csm_mut() {
                            csm.apply_correction(index, *d);
                        }
                    }
                }
            }
        }
        self.corrections += delta;
    }

    pub fn camera(&self, member: usize) -> &dyn Camera {
        self.cameras[member].as_camera()
    }

    /// Exterior orientation of a member image at its exposure time.
    pub fn exterior_orientation(&self, member: usize, target: &TargetBody) -> ExteriorOrientation {
        let t = self.times[member];
        let (pointing, pointing_partials) = euler_attitude(
            self.pointing[0].evaluate(t),
            self.pointing[1].evaluate(t),
            self.pointing[2].evaluate(t),
        );
        ExteriorOrientation {
            time: t,
            pointing,
            pointing_partials,
            position: Vector3::new(
                self.position[0].evaluate(t),
                self.position[1].evaluate(t),
                self.position[2].evaluate(t),
            ),
            body: target.body_rotation(t),
        }
    }

    /// `∂(sample, line)/∂o` of a member image for a body-fixed point.
    ///
    /// Arguments
    /// -----------------
    /// * `g`: projection partials at the current look vector.
    pub fn partials(
        &self,
        member: usize,
        eo: &ExteriorOrientation,
        point: &BodyFixed,
        g: &Matrix2x3<f64>,
    ) -> DMatrix<f64> {
        let n = self.layout.len();
        let mut out = DMatrix::zeros(2, n);
        if n == 0 {
            return out;
        }
        let camera = self.camera(member);
        let t = self.times[member];
        let rotation = camera.look_rotation(eo);
        let inertial = camera.adjusted_inertial_look(eo, point);
        let mut csm_partials: Option<DMatrix<f64>> = None;

        for (k, p) in self.layout.iter().enumerate() {
            let col = match *p {
                ObservationParameter::Position { axis, coefficient } => {
                    let basis = self.position[axis].correction.basis(t, coefficient + 1)[coefficient];
                    -(g * rotation.column(axis)) * basis
                }
                ObservationParameter::Pointing { axis, coefficient } => {
                    let basis = self.pointing[axis].correction.basis(t, coefficient + 1)[coefficient];
                    g * (eo.pointing_partials[axis] * inertial) * basis
                }
                ObservationParameter::Csm { index } => {
                    let all = csm_partials.get_or_insert_with(|| camera.parameter_partials(eo, point));
                    Vector2::new(all[(0, index)], all[(1, index)])
                }
            };
            out.set_column(k, &col);
        }
        out
    }

    /// Largest absolute cumulative correction, used in reports.
    pub fn max_correction(&self) -> f64 {
        self.corrections.iter().fold(0.0, |m, c| m.max(c.abs()))
    }
}

impl fmt::Display for BundleObservation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] images={} parameters={}{}",
            self.observation_number,
            self.instrument_id,
            self.image_indices.len(),
            self.layout.len(),
            if self.held { " (held)" } else { "" }
        )
    }
}

/// Every observation of a solve and the image → (observation, member) map.
#[derive(Debug, Clone)]
pub struct ObservationSet {
    pub observations: Vec<BundleObservation>,
    image_map: Vec<Option<(usize, usize)>>,
}

impl ObservationSet {
    /// Group the images referenced by the network into observations.
    ///
    /// Only images referenced by a non-ignored measure of a non-ignored point take part.
    ///
    /// Return
    /// ----------
    /// * The grouped observations, or [`JigsawError::MissingSolveSettings`] when an
    ///   observation matches no solve settings.
    pub fn group(
        settings: &BundleSettings,
        network: &ControlNetwork,
        images: &ImageList,
    ) -> Result<Self, JigsawError> {
        let mut referenced = vec![false; images.len()];
        for point in network.points.iter().filter(|p| !p.ignore) {
            for m in point.measures.iter().filter(|m| !m.ignore) {
                if let Some(i) = images.index_of(&m.serial_number) {
                    referenced[i] = true;
                }
            }
        }

        let mut keys: Vec<ObservationNumber> = Vec::new();
        let mut members: Vec<Vec<(usize, &ImageRecord)>> = Vec::new();
        let mut by_key: HashMap<ObservationNumber, usize, RandomState> =
            HashMap::with_hasher(RandomState::new());
        for (i, record) in images.iter().enumerate() {
            if !referenced[i] {
                debug!(serial = %record.serial_number, "image has no measures and is not adjusted");
                continue;
            }
            let key = record.grouping_key(settings.solve_observation_mode);
            let slot = *by_key.entry(key.clone()).or_insert_with(|| {
                keys.push(key);
                members.push(Vec::new());
                members.len() - 1
            });
            members[slot].push((i, record));
        }

        let mut observations = Vec::with_capacity(keys.len());
        let mut image_map = vec![None; images.len()];
        for (index, (key, group)) in keys.into_iter().zip(members).enumerate() {
            let instrument = group.first().map_or("", |(_, r)| r.instrument_id.as_str());
            let settings_index = settings.solve_settings_index(&key, instrument)?;
            let obs = BundleObservation::new(
                index,
                key,
                settings_index,
                &settings.observation_solve_settings[settings_index],
                &group,
            )?;
            for (member, (image, _)) in group.iter().enumerate() {
                image_map[*image] = Some((index, member));
            }
            debug!(observation = %obs, "observation grouped");
            observations.push(obs);
        }
        Ok(Self {
            observations,
            image_map,
        })
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BundleObservation> {
        self.observations.iter()
    }

    /// `(observation, member)` of an image index.
    pub fn locate(&self, image_index: usize) -> Option<(usize, usize)> {
        self.image_map.get(image_index).copied().flatten()
    }

    /// Block sizes of the observations, in order.
    pub fn block_sizes(&self) -> Vec<usize> {
        self.observations.iter().map(|o| o.parameter_count()).collect()
    }

    pub fn parameter_count(&self) -> usize {
        self.observations.iter().map(|o| o.parameter_count()).sum()
    }

    pub fn by_number(&self, observation_number: &str) -> Option<&BundleObservation> {
        self.observations
            .iter()
            .find(|o| o.observation_number == observation_number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        camera::framing::FramingCamera,
        control::{ControlMeasure, ControlPoint, ControlPointType},
        images::{PointingTable, PositionTable},
        settings::observation_solve::{PointingSolveOption, PositionSolveOption},
    };
    use approx::assert_relative_eq;

    fn record(serial: &str, obs: &str, time: f64) -> ImageRecord {
        ImageRecord {
            serial_number: serial.into(),
            observation_number: Some(obs.into()),
            instrument_id: "NAC".into(),
            time,
            camera: CameraModel::Framing(FramingCamera::new(500.0, 0.01, 512.5, 512.5)),
            target: TargetBody::sphere("Moon", 1_737_400.0),
            pointing: PointingTable {
                ra: Polynomial::new(0.0, 10.0, vec![std::f64::consts::PI, 1e-4]),
                dec: Polynomial::constant(0.0, 0.0),
                twist: Polynomial::constant(0.0, 0.0),
            },
            position: PositionTable {
                x: Polynomial::new(0.0, 10.0, vec![1_837_400.0, 5.0]),
                y: Polynomial::new(0.0, 10.0, vec![0.0, 1_600.0]),
                z: Polynomial::constant(0.0, 0.0),
            },
            tables: None,
        }
    }

    fn network(serials: &[&str]) -> ControlNetwork {
        let mut net = ControlNetwork::new("test", "Moon");
        let mut p = ControlPoint::new("p1", ControlPointType::Free);
        for s in serials {
            p.measures.push(ControlMeasure::new(*s, 500.0, 500.0));
        }
        net.points.push(p);
        net
    }

    fn settings(observation_mode: bool) -> BundleSettings {
        BundleSettings::builder()
            .solve_observation_mode(observation_mode)
            .observation_solve_settings(
                ObservationSolveSettings::builder("NAC")
                    .pointing(PointingSolveOption::AnglesVelocity)
                    .solve_twist(false)
                    .position(PositionSolveOption::PositionOnly)
                    .angle_sigmas_deg(Some(0.1), Some(0.01), None)
                    .build()
                    .unwrap(),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn test_layout_and_sigmas() {
        let images = ImageList::new(vec![record("A", "O1", 5.0)]).unwrap();
        let set = ObservationSet::group(&settings(false), &network(&["A"]), &images).unwrap();
        let obs = &set.observations[0];
        // 3 position constants, then ra and dec with 2 coefficients each
        assert_eq!(obs.parameter_count(), 7);
        assert_eq!(
            obs.layout[3],
            ObservationParameter::Pointing {
                axis: 0,
                coefficient: 0
            }
        );
        assert_eq!(obs.parameter_name(4), "RA(t1)");
        assert!(obs.apriori_sigmas[0].is_none());
        assert_relative_eq!(obs.apriori_sigmas[3].unwrap(), 0.1_f64.to_radians());
        // velocity sigma scaled by the time scale of the polynomial
        assert_relative_eq!(obs.apriori_sigmas[4].unwrap(), 0.01_f64.to_radians() * 10.0);
    }

    #[test]
    fn test_observation_mode_groups_images() {
        let images = ImageList::new(vec![
            record("A", "O1", 0.0),
            record("B", "O1", 1.0),
            record("C", "O2", 2.0),
        ])
        .unwrap();
        let net = network(&["A", "B", "C"]);
        let grouped = ObservationSet::group(&settings(true), &net, &images).unwrap();
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped.locate(1), Some((0, 1)));
        assert_eq!(grouped.by_number("O2").unwrap().image_indices, vec![2]);

        let single = ObservationSet::group(&settings(false), &net, &images).unwrap();
        assert_eq!(single.len(), 3);
    }

    #[test]
    fn test_unreferenced_images_are_not_grouped() {
        let images = ImageList::new(vec![record("A", "O1", 0.0), record("B", "O2", 0.0)]).unwrap();
        let set = ObservationSet::group(&settings(false), &network(&["B"]), &images).unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set.locate(0), None);
    }

    #[test]
    fn test_missing_settings() {
        let images = ImageList::new(vec![record("A", "O1", 0.0)]).unwrap();
        let s = BundleSettings::builder().build().unwrap();
        assert!(matches!(
            ObservationSet::group(&s, &network(&["A"]), &images),
            Err(JigsawError::MissingSolveSettings(_))
        ));
    }

    #[test]
    fn test_partials_match_finite_differences() {
        let images = ImageList::new(vec![record("A", "O1", 5.0)]).unwrap();
        let set = ObservationSet::group(&settings(false), &network(&["A"]), &images).unwrap();
        let obs = set.observations[0].clone();
        let moon = TargetBody::sphere("Moon", 1_737_400.0);
        let eo = obs.exterior_orientation(0, &moon);
        let cam = obs.camera(0);
        let point = cam
            .image_to_ground(&eo, &crate::camera::ImageCoordinate::new(540.0, 470.0), &moon)
            .unwrap();
        let g = cam.projection_partials(&cam.camera_look(&eo, &point));
        let analytic = obs.partials(0, &eo, &point, &g);

        for k in 0..obs.parameter_count() {
            let h = if k < 3 { 1.0 } else { 1e-8 };
            let shifted = |d: f64| {
                let mut o = obs.clone();
                let mut delta = DVector::zeros(o.parameter_count());
                delta[k] = d;
                o.apply_corrections(&delta);
                let eo = o.exterior_orientation(0, &moon);
                o.camera(0).ground_to_image(&eo, &point).unwrap().as_vector()
            };
            let numeric = (shifted(h) - shifted(-h)) / (2.0 * h);
            assert_relative_eq!(analytic[(0, k)], numeric[0], epsilon = 1e-4, max_relative = 1e-4);
            assert_relative_eq!(analytic[(1, k)], numeric[1], epsilon = 1e-4, max_relative = 1e-4);
        }
    }
}
