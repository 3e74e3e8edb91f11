//! # Observation solve settings
//!
//! Per-instrument (or per observation group) policy describing which exterior orientation
//! parameters are free during the bundle:
//!
//! * the **pointing** option selects how many coefficients of each pointing angle polynomial
//!   (right ascension, declination and optionally twist) are solved,
//! * the **position** option does the same for the three spacecraft position polynomials,
//! * a priori sigmas are given per polynomial order (angles in degrees, positions in meters) and
//!   turn into pseudo-observation weights,
//! * CSM cameras replace both blocks by a selection of their named model parameters.
//!
//! A *held* group is synthesised for images listed in `HELDLIST`: it solves nothing, so those
//! images only contribute their measures.
use std::{collections::BTreeSet, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{
    camera::csm::{CsmParameterSet, CsmParameterType},
    constants::RADEG,
    jigsaw_errors::JigsawError,
};

/// Instrument id used by the synthesised held group.
pub const HELD_INSTRUMENT_ID: &str = "HELD";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PointingSolveOption {
    NoPointingFactors,
    AnglesOnly,
    AnglesVelocity,
    AnglesVelocityAcceleration,
    AllPolynomialCoefficients,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionSolveOption {
    NoPositionFactors,
    PositionOnly,
    PositionVelocity,
    PositionVelocityAcceleration,
    AllPolynomialCoefficients,
}

impl FromStr for PointingSolveOption {
    type Err = JigsawError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "nopointing" | "nopointingfactors" | "none" => Ok(Self::NoPointingFactors),
            "anglesonly" | "angles" => Ok(Self::AnglesOnly),
            "anglesvelocity" | "velocity" => Ok(Self::AnglesVelocity),
            "anglesvelocityacceleration" | "acceleration" => Ok(Self::AnglesVelocityAcceleration),
            "allpolynomialcoeffs" | "allpolynomialcoefficients" | "all" => {
                Ok(Self::AllPolynomialCoefficients)
            }
            other => Err(JigsawError::InvalidSetting(format!(
                "unknown pointing solve option '{other}'"
            ))),
        }
    }
}

impl FromStr for PositionSolveOption {
    type Err = JigsawError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            // `NoPointing` is accepted for symmetry with the pointing flag
            "noposition" | "nopositionfactors" | "nopointing" | "none" => {
                Ok(Self::NoPositionFactors)
            }
            "positiononly" | "position" => Ok(Self::PositionOnly),
            "positionvelocity" | "velocity" => Ok(Self::PositionVelocity),
            "positionvelocityacceleration" | "acceleration" => {
                Ok(Self::PositionVelocityAcceleration)
            }
            "allpolynomialcoeffs" | "allpolynomialcoefficients" | "all" => {
                Ok(Self::AllPolynomialCoefficients)
            }
            other => Err(JigsawError::InvalidSetting(format!(
                "unknown position solve option '{other}'"
            ))),
        }
    }
}

impl fmt::Display for PointingSolveOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NoPointingFactors => "None",
            Self::AnglesOnly => "AnglesOnly",
            Self::AnglesVelocity => "AnglesAndVelocity",
            Self::AnglesVelocityAcceleration => "AnglesVelocityAcceleration",
            Self::AllPolynomialCoefficients => "AllPolynomialCoefficients",
        };
        f.write_str(name)
    }
}

impl fmt::Display for PositionSolveOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NoPositionFactors => "None",
            Self::PositionOnly => "PositionOnly",
            Self::PositionVelocity => "PositionAndVelocity",
            Self::PositionVelocityAcceleration => "PositionVelocityAcceleration",
            Self::AllPolynomialCoefficients => "AllPolynomialCoefficients",
        };
        f.write_str(name)
    }
}

/// Number of solved coefficients per axis implied by an option, or `None` for "all up to the
/// solve degree".
fn coefficients_for(order: usize) -> Option<usize> {
    match order {
        0..=3 => Some(order),
        _ => None,
    }
}

impl PointingSolveOption {
    fn order(&self) -> usize {
        match self {
            Self::NoPointingFactors => 0,
            Self::AnglesOnly => 1,
            Self::AnglesVelocity => 2,
            Self::AnglesVelocityAcceleration => 3,
            Self::AllPolynomialCoefficients => 4,
        }
    }
}

impl PositionSolveOption {
    fn order(&self) -> usize {
        match self {
            Self::NoPositionFactors => 0,
            Self::PositionOnly => 1,
            Self::PositionVelocity => 2,
            Self::PositionVelocityAcceleration => 3,
            Self::AllPolynomialCoefficients => 4,
        }
    }
}

/// Selection of CSM model parameters. The three forms are mutually exclusive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CsmParameterSelection {
    Set(CsmParameterSet),
    Type(CsmParameterType),
    List(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationSolveSettings {
    pub instrument_id: String,
    pub observation_numbers: BTreeSet<String>,
    pub held: bool,

    pub pointing: PointingSolveOption,
    pub solve_twist: bool,
    pub ck_degree: usize,
    pub ck_solve_degree: usize,
    pub pointing_over_existing: bool,
    /// A priori sigma per angle order, in radians (per second^order).
    pub angle_sigmas: Vec<Option<f64>>,

    pub position: PositionSolveOption,
    pub spk_degree: usize,
    pub spk_solve_degree: usize,
    pub position_over_existing: bool,
    /// A priori sigma per position order, in meters (per second^order).
    pub position_sigmas: Vec<Option<f64>>,

    pub csm: Option<CsmParameterSelection>,
}

impl ObservationSolveSettings {
    pub fn builder(instrument_id: impl Into<String>) -> ObservationSolveSettingsBuilder {
        ObservationSolveSettingsBuilder::new(instrument_id.into())
    }

    /// Settings of the held group: no pointing and no position factors.
    pub fn held(observation_numbers: BTreeSet<String>) -> Self {
        Self {
            instrument_id: HELD_INSTRUMENT_ID.to_string(),
            observation_numbers,
            held: true,
            pointing: PointingSolveOption::NoPointingFactors,
            solve_twist: false,
            ck_degree: 2,
            ck_solve_degree: 0,
            pointing_over_existing: false,
            angle_sigmas: Vec::new(),
            position: PositionSolveOption::NoPositionFactors,
            spk_degree: 2,
            spk_solve_degree: 0,
            position_over_existing: false,
            position_sigmas: Vec::new(),
            csm: None,
        }
    }

    /// Number of solved angles: 0, 2 (ra, dec) or 3 (with twist).
    pub fn number_angles(&self) -> usize {
        match self.pointing {
            PointingSolveOption::NoPointingFactors => 0,
            _ if self.solve_twist => 3,
            _ => 2,
        }
    }

    /// Number of solved coefficients per pointing angle.
    pub fn number_angle_coefficients(&self) -> usize {
        coefficients_for(self.pointing.order()).unwrap_or(self.ck_solve_degree + 1)
    }

    /// Number of solved coefficients per position axis.
    pub fn number_position_coefficients(&self) -> usize {
        coefficients_for(self.position.order()).unwrap_or(self.spk_solve_degree + 1)
    }

    pub fn number_pointing_parameters(&self) -> usize {
        self.number_angles() * self.number_angle_coefficients()
    }

    pub fn number_position_parameters(&self) -> usize {
        match self.position {
            PositionSolveOption::NoPositionFactors => 0,
            _ => 3 * self.number_position_coefficients(),
        }
    }

    /// True when this group lists `observation_number` explicitly.
    pub fn contains(&self, observation_number: &str) -> bool {
        self.observation_numbers.contains(observation_number)
    }
}

/// Builder for [`ObservationSolveSettings`].
#[derive(Debug, Clone)]
pub struct ObservationSolveSettingsBuilder {
    settings: ObservationSolveSettings,
    angle_sigmas_deg: [Option<f64>; 3],
    position_sigmas_m: [Option<f64>; 3],
    csm_set: Option<CsmParameterSet>,
    csm_type: Option<CsmParameterType>,
    csm_list: Option<Vec<String>>,
}

impl ObservationSolveSettingsBuilder {
    fn new(instrument_id: String) -> Self {
        let mut settings = ObservationSolveSettings::held(BTreeSet::new());
        settings.instrument_id = instrument_id;
        settings.held = false;
        settings.pointing = PointingSolveOption::AnglesOnly;
        settings.solve_twist = true;
        settings.ck_solve_degree = 2;
        settings.spk_solve_degree = 2;
        Self {
            settings,
            angle_sigmas_deg: [None; 3],
            position_sigmas_m: [None; 3],
            csm_set: None,
            csm_type: None,
            csm_list: None,
        }
    }

    pub fn observation_numbers<I, S>(mut self, numbers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.settings
            .observation_numbers
            .extend(numbers.into_iter().map(Into::into));
        self
    }

    pub fn pointing(mut self, option: PointingSolveOption) -> Self {
        self.settings.pointing = option;
        self
    }

    pub fn solve_twist(mut self, v: bool) -> Self {
        self.settings.solve_twist = v;
        self
    }

    pub fn ck_degree(mut self, v: usize) -> Self {
        self.settings.ck_degree = v;
        self
    }

    pub fn ck_solve_degree(mut self, v: usize) -> Self {
        self.settings.ck_solve_degree = v;
        self
    }

    pub fn pointing_over_existing(mut self, v: bool) -> Self {
        self.settings.pointing_over_existing = v;
        self
    }

    /// A priori angle sigmas in degrees, degrees/s and degrees/s².
    pub fn angle_sigmas_deg(
        mut self,
        angles: Option<f64>,
        velocity: Option<f64>,
        acceleration: Option<f64>,
    ) -> Self {
        self.angle_sigmas_deg = [angles, velocity, acceleration];
        self
    }

    pub fn position(mut self, option: PositionSolveOption) -> Self {
        self.settings.position = option;
        self
    }

    pub fn spk_degree(mut self, v: usize) -> Self {
        self.settings.spk_degree = v;
        self
    }

    pub fn spk_solve_degree(mut self, v: usize) -> Self {
        self.settings.spk_solve_degree = v;
        self
    }

    pub fn position_over_existing(mut self, v: bool) -> Self {
        self.settings.position_over_existing = v;
        self
    }

    /// A priori position sigmas in meters, m/s and m/s².
    pub fn position_sigmas_m(
        mut self,
        position: Option<f64>,
        velocity: Option<f64>,
        acceleration: Option<f64>,
    ) -> Self {
        self.position_sigmas_m = [position, velocity, acceleration];
        self
    }

    pub fn csm_solve_set(mut self, set: CsmParameterSet) -> Self {
        self.csm_set = Some(set);
        self
    }

    pub fn csm_solve_type(mut self, kind: CsmParameterType) -> Self {
        self.csm_type = Some(kind);
        self
    }

    pub fn csm_solve_list<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.csm_list = Some(names.into_iter().map(Into::into).collect());
        self
    }

    fn sigmas_per_order(given: &[Option<f64>; 3], count: usize, scale: f64) -> Vec<Option<f64>> {
        (0..count)
            .map(|order| given.get(order).copied().flatten().map(|s| s * scale))
            .collect()
    }

    fn check_sigmas(given: &[Option<f64>; 3], what: &str) -> Result<(), JigsawError> {
        for sigma in given.iter().flatten() {
            if !(*sigma > 0.0) {
                return Err(JigsawError::InvalidSetting(format!(
                    "{what} sigmas must be > 0 (got {sigma})"
                )));
            }
        }
        Ok(())
    }

    /// Finalize the builder.
    ///
    /// Validation rules
    /// -----------------
    /// * `ck_solve_degree ≤ ck_degree` and `spk_solve_degree ≤ spk_degree`.
    /// * The number of solved coefficients never exceeds the polynomial degree + 1.
    /// * A priori sigmas are strictly positive when given.
    /// * At most one of the CSM set, type and list selections.
    ///
    /// Return
    /// ----------
    /// * The settings, or [`JigsawError::InvalidSetting`].
    pub fn build(self) -> Result<ObservationSolveSettings, JigsawError> {
        let mut s = self.settings;

        if s.ck_solve_degree > s.ck_degree {
            return Err(JigsawError::InvalidSetting(format!(
                "ck solve degree {} exceeds ck degree {}",
                s.ck_solve_degree, s.ck_degree
            )));
        }
        if s.spk_solve_degree > s.spk_degree {
            return Err(JigsawError::InvalidSetting(format!(
                "spk solve degree {} exceeds spk degree {}",
                s.spk_solve_degree, s.spk_degree
            )));
        }
        if s.number_angles() > 0 && s.number_angle_coefficients() > s.ck_degree + 1 {
            return Err(JigsawError::InvalidSetting(format!(
                "pointing option {} needs a ck degree of at least {}",
                s.pointing,
                s.number_angle_coefficients() - 1
            )));
        }
        if s.number_position_parameters() > 0
            && s.number_position_coefficients() > s.spk_degree + 1
        {
            return Err(JigsawError::InvalidSetting(format!(
                "position option {} needs an spk degree of at least {}",
                s.position,
                s.number_position_coefficients() - 1
            )));
        }
        Self::check_sigmas(&self.angle_sigmas_deg, "angle")?;
        Self::check_sigmas(&self.position_sigmas_m, "position")?;

        let selections = [
            self.csm_set.is_some(),
            self.csm_type.is_some(),
            self.csm_list.is_some(),
        ];
        if selections.iter().filter(|x| **x).count() > 1 {
            return Err(JigsawError::InvalidSetting(
                "CSMSOLVESET, CSMSOLVETYPE and CSMSOLVELIST are mutually exclusive".into(),
            ));
        }
        s.csm = match (self.csm_set, self.csm_type, self.csm_list) {
            (Some(set), _, _) => Some(CsmParameterSelection::Set(set)),
            (_, Some(kind), _) => Some(CsmParameterSelection::Type(kind)),
            (_, _, Some(list)) => Some(CsmParameterSelection::List(list)),
            _ => None,
        };

        s.angle_sigmas =
            Self::sigmas_per_order(&self.angle_sigmas_deg, s.number_angle_coefficients(), RADEG);
        s.position_sigmas =
            Self::sigmas_per_order(&self.position_sigmas_m, s.number_position_coefficients(), 1.0);
        Ok(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_parameter_counts() {
        let s = ObservationSolveSettings::builder("CAM")
            .pointing(PointingSolveOption::AnglesVelocity)
            .solve_twist(false)
            .position(PositionSolveOption::PositionOnly)
            .build()
            .unwrap();
        assert_eq!(s.number_angles(), 2);
        assert_eq!(s.number_pointing_parameters(), 4);
        assert_eq!(s.number_position_parameters(), 3);

        let all = ObservationSolveSettings::builder("CAM")
            .pointing(PointingSolveOption::AllPolynomialCoefficients)
            .ck_degree(4)
            .ck_solve_degree(4)
            .build()
            .unwrap();
        assert_eq!(all.number_angle_coefficients(), 5);
        assert_eq!(all.number_pointing_parameters(), 15);
        assert_eq!(all.angle_sigmas.len(), 5);
        assert!(all.angle_sigmas.iter().all(Option::is_none));
    }

    #[test]
    fn test_sigmas_are_converted() {
        let s = ObservationSolveSettings::builder("CAM")
            .angle_sigmas_deg(Some(1.0), None, None)
            .build()
            .unwrap();
        assert_eq!(s.angle_sigmas.len(), 1);
        assert_relative_eq!(s.angle_sigmas[0].unwrap(), RADEG);
    }

    #[test]
    fn test_degree_validation() {
        let err = ObservationSolveSettings::builder("CAM")
            .ck_degree(1)
            .ck_solve_degree(2)
            .build()
            .unwrap_err();
        assert!(matches!(err, JigsawError::InvalidSetting(_)));

        let err = ObservationSolveSettings::builder("CAM")
            .pointing(PointingSolveOption::AnglesVelocityAcceleration)
            .ck_degree(1)
            .ck_solve_degree(1)
            .build()
            .unwrap_err();
        assert!(matches!(err, JigsawError::InvalidSetting(_)));
    }

    #[test]
    fn test_csm_selections_are_exclusive() {
        let err = ObservationSolveSettings::builder("CSM")
            .csm_solve_set(CsmParameterSet::Adjustable)
            .csm_solve_type(CsmParameterType::Real)
            .build()
            .unwrap_err();
        assert!(matches!(err, JigsawError::InvalidSetting(_)));

        let ok = ObservationSolveSettings::builder("CSM")
            .csm_solve_list(["focal length bias"])
            .build()
            .unwrap();
        assert_eq!(
            ok.csm,
            Some(CsmParameterSelection::List(vec!["focal length bias".into()]))
        );
    }

    #[test]
    fn test_held_settings_solve_nothing() {
        let held = ObservationSolveSettings::held(["A".to_string()].into_iter().collect());
        assert!(held.held);
        assert_eq!(held.number_pointing_parameters(), 0);
        assert_eq!(held.number_position_parameters(), 0);
        assert!(held.contains("A"));
    }

    #[test]
    fn test_option_names() {
        assert_eq!(
            "AnglesOnly".parse::<PointingSolveOption>().unwrap(),
            PointingSolveOption::AnglesOnly
        );
        assert_eq!(
            "NoPointing".parse::<PositionSolveOption>().unwrap(),
            PositionSolveOption::NoPositionFactors
        );
        assert!("Sideways".parse::<PointingSolveOption>().is_err());
    }
}
