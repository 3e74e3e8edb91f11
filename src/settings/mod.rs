//! # Bundle settings
//!
//! This module defines [`BundleSettings`], the immutable configuration handed to the solver,
//! and its builder. It gathers:
//!
//! - network validation and coordinate types (bundle and reports),
//! - solve flags (observation mode, label update, error propagation, radius solve),
//! - global a priori point sigmas,
//! - outlier rejection policy,
//! - convergence criterion, threshold and iteration cap,
//! - the maximum-likelihood cascade,
//! - the per-instrument [`ObservationSolveSettings`] and the optional target body block,
//! - the output artifact prefix.
//!
//! ## Configuration surfaces
//!
//! Settings are built either through typed setters or through
//! [`BundleSettingsBuilder::option`], which accepts the keyword names of the command line
//! configuration (`validateNetwork`, `maxIterations`, …). Unknown keywords are rejected with
//! [`JigsawError::InvalidSetting`].
//!
//! ## Example
//!
//! ```rust,no_run
//! use jigsaw::settings::{BundleSettings, ConvergenceCriteria};
//!
//! let settings = BundleSettings::builder()
//!     .convergence_criteria(ConvergenceCriteria::Sigma0)
//!     .convergence_threshold(1e-8)
//!     .max_iterations(20)
//!     .option("outlierRejection", "true").unwrap()
//!     .build()
//!     .unwrap();
//! println!("{settings:#}");
//! ```
pub mod maximum_likelihood;
pub mod observation_solve;
pub mod options;
pub mod target_body;

use std::{
    cmp::Ordering::Greater,
    collections::BTreeSet,
    fmt,
    str::FromStr,
};

use serde::{Deserialize, Serialize};

use crate::{
    constants::MAX_LIKELIHOOD_MODELS,
    jigsaw_errors::JigsawError,
    settings::{
        maximum_likelihood::{parse_cascade, MaximumLikelihoodEntry},
        observation_solve::ObservationSolveSettings,
        options::{parse_bool, parse_f64, parse_sigma, parse_usize},
        target_body::TargetBodySettings,
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CoordinateType {
    Latitudinal,
    Rectangular,
}

impl FromStr for CoordinateType {
    type Err = JigsawError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "latitudinal" => Ok(Self::Latitudinal),
            "rectangular" => Ok(Self::Rectangular),
            other => Err(JigsawError::InvalidSetting(format!(
                "unknown coordinate type '{other}'"
            ))),
        }
    }
}

impl fmt::Display for CoordinateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Latitudinal => f.write_str("Latitudinal"),
            Self::Rectangular => f.write_str("Rectangular"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConvergenceCriteria {
    Sigma0,
    ParameterCorrections,
}

impl FromStr for ConvergenceCriteria {
    type Err = JigsawError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sigma0" => Ok(Self::Sigma0),
            "parametercorrections" => Ok(Self::ParameterCorrections),
            other => Err(JigsawError::InvalidSetting(format!(
                "unknown convergence criteria '{other}'"
            ))),
        }
    }
}

impl fmt::Display for ConvergenceCriteria {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sigma0 => f.write_str("Sigma0"),
            Self::ParameterCorrections => f.write_str("ParameterCorrections"),
        }
    }
}

/// Global configuration of a bundle adjustment run.
///
/// Point sigmas are in meters for every coordinate (latitude and longitude sigmas are ground
/// distances, converted to angles per point by the solver).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleSettings {
    pub validate_network: bool,
    pub coordinate_type_bundle: CoordinateType,
    pub coordinate_type_reports: CoordinateType,

    pub solve_observation_mode: bool,
    pub update_cube_label: bool,
    pub error_propagation: bool,
    pub solve_radius: bool,

    pub global_point_sigmas: [Option<f64>; 3],

    pub outlier_rejection: bool,
    pub rejection_multiplier: f64,

    pub convergence_criteria: ConvergenceCriteria,
    pub convergence_threshold: f64,
    pub max_iterations: usize,

    pub maximum_likelihood: Vec<MaximumLikelihoodEntry>,
    /// Weight given by the Chen model to residuals beyond the tweaking constant.
    pub chen_tail_weight: f64,

    pub observation_solve_settings: Vec<ObservationSolveSettings>,
    pub target_body: Option<TargetBodySettings>,

    pub output_prefix: String,
}

impl Default for BundleSettings {
    fn default() -> Self {
        BundleSettings {
            validate_network: true,
            coordinate_type_bundle: CoordinateType::Latitudinal,
            coordinate_type_reports: CoordinateType::Latitudinal,

            solve_observation_mode: false,
            update_cube_label: false,
            error_propagation: false,
            solve_radius: false,

            global_point_sigmas: [None; 3],

            outlier_rejection: false,
            rejection_multiplier: 3.0,

            convergence_criteria: ConvergenceCriteria::Sigma0,
            convergence_threshold: 1.0e-10,
            max_iterations: 50,

            maximum_likelihood: Vec::new(),
            chen_tail_weight: 0.0,

            observation_solve_settings: Vec::new(),
            target_body: None,

            output_prefix: String::new(),
        }
    }
}

impl BundleSettings {
    pub fn builder() -> BundleSettingsBuilder {
        BundleSettingsBuilder::new()
    }

    /// Index of the solve settings governing an observation.
    ///
    /// Explicit membership wins (this is how held observations are routed); otherwise the first
    /// non-held group whose instrument id matches is used.
    pub fn solve_settings_index(
        &self,
        observation_number: &str,
        instrument_id: &str,
    ) -> Result<usize, JigsawError> {
        self.observation_solve_settings
            .iter()
            .position(|s| s.contains(observation_number))
            .or_else(|| {
                self.observation_solve_settings
                    .iter()
                    .position(|s| !s.held && s.instrument_id == instrument_id)
            })
            .ok_or_else(|| {
                JigsawError::MissingSolveSettings(format!(
                    "observation '{observation_number}' (instrument '{instrument_id}')"
                ))
            })
    }

    /// Move held observations into a synthesised held group.
    ///
    /// The observation numbers are removed from every existing group and a group with no
    /// pointing and no position factors is appended, so each observation number keeps exactly
    /// one owner.
    pub fn with_held_observations(mut self, held: BTreeSet<String>) -> Self {
        if held.is_empty() {
            return self;
        }
        for group in &mut self.observation_solve_settings {
            group.observation_numbers.retain(|n| !held.contains(n));
        }
        self.observation_solve_settings
            .push(ObservationSolveSettings::held(held));
        self
    }

    pub fn solve_target_body(&self) -> bool {
        self.target_body.is_some()
    }
}

/// Builder for [`BundleSettings`].
#[derive(Debug, Clone, Default)]
pub struct BundleSettingsBuilder {
    params: BundleSettings,
}

impl BundleSettingsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn validate_network(mut self, v: bool) -> Self {
        self.params.validate_network = v;
        self
    }

    pub fn coordinate_type_bundle(mut self, v: CoordinateType) -> Self {
        self.params.coordinate_type_bundle = v;
        self
    }

    pub fn coordinate_type_reports(mut self, v: CoordinateType) -> Self {
        self.params.coordinate_type_reports = v;
        self
    }

    pub fn solve_observation_mode(mut self, v: bool) -> Self {
        self.params.solve_observation_mode = v;
        self
    }

    pub fn update_cube_label(mut self, v: bool) -> Self {
        self.params.update_cube_label = v;
        self
    }

    pub fn error_propagation(mut self, v: bool) -> Self {
        self.params.error_propagation = v;
        self
    }

    pub fn solve_radius(mut self, v: bool) -> Self {
        self.params.solve_radius = v;
        self
    }

    /// Global a priori point sigmas (meters), `None` meaning unconstrained. The third sigma is
    /// dropped by `build()` unless radii are solved.
    pub fn global_point_sigmas(
        mut self,
        coord1: Option<f64>,
        coord2: Option<f64>,
        coord3: Option<f64>,
    ) -> Self {
        self.params.global_point_sigmas = [coord1, coord2, coord3];
        self
    }

    pub fn outlier_rejection(mut self, v: bool) -> Self {
        self.params.outlier_rejection = v;
        self
    }

    pub fn rejection_multiplier(mut self, v: f64) -> Self {
        self.params.rejection_multiplier = v;
        self
    }

    pub fn convergence_criteria(mut self, v: ConvergenceCriteria) -> Self {
        self.params.convergence_criteria = v;
        self
    }

    pub fn convergence_threshold(mut self, v: f64) -> Self {
        self.params.convergence_threshold = v;
        self
    }

    pub fn max_iterations(mut self, v: usize) -> Self {
        self.params.max_iterations = v;
        self
    }

    pub fn maximum_likelihood(mut self, cascade: Vec<MaximumLikelihoodEntry>) -> Self {
        self.params.maximum_likelihood = cascade;
        self
    }

    pub fn chen_tail_weight(mut self, v: f64) -> Self {
        self.params.chen_tail_weight = v;
        self
    }

    pub fn observation_solve_settings(mut self, v: ObservationSolveSettings) -> Self {
        self.params.observation_solve_settings.push(v);
        self
    }

    pub fn target_body(mut self, v: TargetBodySettings) -> Self {
        self.params.target_body = Some(v);
        self
    }

    pub fn output_prefix(mut self, v: impl Into<String>) -> Self {
        self.params.output_prefix = v.into();
        self
    }

    /// Set one option from its keyword name and textual value.
    ///
    /// Arguments
    /// -----------------
    /// * `key`: keyword name, e.g. `solveRadius`, `globalPointCoord3AprioriSigma`,
    ///   `maximumLikelihoodCascade` (value `Huber:0.5,Welsch:0.9`).
    /// * `value`: textual value; sigmas accept `Null`.
    ///
    /// Return
    /// ----------
    /// * The updated builder, or [`JigsawError::InvalidSetting`] for an unknown key or a value
    ///   outside the key's domain.
    pub fn option(mut self, key: &str, value: &str) -> Result<Self, JigsawError> {
        let p = &mut self.params;
        match key {
            "validateNetwork" => p.validate_network = parse_bool(key, value)?,
            "coordinateTypeBundle" => p.coordinate_type_bundle = value.parse()?,
            "coordinateTypeReports" => p.coordinate_type_reports = value.parse()?,
            "solveObservationMode" => p.solve_observation_mode = parse_bool(key, value)?,
            "updateCubeLabel" => p.update_cube_label = parse_bool(key, value)?,
            "errorPropagation" => p.error_propagation = parse_bool(key, value)?,
            "solveRadius" => p.solve_radius = parse_bool(key, value)?,
            "globalPointCoord1AprioriSigma" => p.global_point_sigmas[0] = parse_sigma(key, value)?,
            "globalPointCoord2AprioriSigma" => p.global_point_sigmas[1] = parse_sigma(key, value)?,
            "globalPointCoord3AprioriSigma" => p.global_point_sigmas[2] = parse_sigma(key, value)?,
            "outlierRejection" => p.outlier_rejection = parse_bool(key, value)?,
            "rejectionMultiplier" => p.rejection_multiplier = parse_f64(key, value)?,
            "convergenceCriteria" => p.convergence_criteria = value.parse()?,
            "threshold" => p.convergence_threshold = parse_f64(key, value)?,
            "maxIterations" => p.max_iterations = parse_usize(key, value)?,
            "maximumLikelihoodCascade" => p.maximum_likelihood = parse_cascade(value)?,
            "chenTailWeight" => p.chen_tail_weight = parse_f64(key, value)?,
            "outputPrefix" => p.output_prefix = value.to_string(),
            other => {
                return Err(JigsawError::InvalidSetting(format!(
                    "unknown bundle option '{other}'"
                )))
            }
        }
        Ok(self)
    }

    /// Return true iff x > 0.0 and comparable (i.e., not NaN).
    #[inline]
    fn gt0(x: f64) -> bool {
        x.partial_cmp(&0.0) == Some(Greater)
    }

    /// Finalize the builder and produce a [`BundleSettings`] instance.
    ///
    /// Validation rules
    /// -----------------
    /// * `rejection_multiplier > 0` and `convergence_threshold > 0`.
    /// * Global point sigmas are strictly positive when given.
    /// * The coordinate-3 sigma is dropped (set to `Null`) for latitudinal bundles that do not
    ///   solve the radius.
    /// * The maximum-likelihood cascade has at most three entries, quantiles in `(0, 1)`, and
    ///   does not start with a redescending model (Welsch, Chen).
    /// * `chen_tail_weight ∈ [0, 1]`.
    /// * Radii solving requires latitudinal bundle coordinates.
    ///
    /// `max_iterations = 0` is accepted and runs the solver as a dry run: residuals are
    /// evaluated at the a priori state and no correction is applied.
    pub fn build(self) -> Result<BundleSettings, JigsawError> {
        let mut p = self.params;

        if !Self::gt0(p.rejection_multiplier) {
            return Err(JigsawError::InvalidSetting(
                "rejection_multiplier must be > 0".into(),
            ));
        }
        if !Self::gt0(p.convergence_threshold) {
            return Err(JigsawError::InvalidSetting(
                "convergence threshold must be > 0".into(),
            ));
        }
        for sigma in p.global_point_sigmas.iter().flatten() {
            if !Self::gt0(*sigma) {
                return Err(JigsawError::InvalidSetting(format!(
                    "global point sigmas must be > 0 (got {sigma})"
                )));
            }
        }
        if !p.solve_radius {
            p.global_point_sigmas[2] = None;
        }

        if p.maximum_likelihood.len() > MAX_LIKELIHOOD_MODELS {
            return Err(JigsawError::InvalidSetting(format!(
                "at most {MAX_LIKELIHOOD_MODELS} maximum likelihood models can be chained"
            )));
        }
        if let Some(first) = p.maximum_likelihood.first() {
            if first.model.is_redescending() {
                return Err(JigsawError::InvalidSetting(format!(
                    "the first maximum likelihood model may not be {}",
                    first.model
                )));
            }
        }
        for entry in &p.maximum_likelihood {
            if !(entry.quantile > 0.0 && entry.quantile < 1.0) {
                return Err(JigsawError::InvalidSetting(format!(
                    "maximum likelihood quantile must be in (0, 1) (got {})",
                    entry.quantile
                )));
            }
        }
        if !(0.0..=1.0).contains(&p.chen_tail_weight) {
            return Err(JigsawError::InvalidSetting(
                "chen_tail_weight must be in [0, 1]".into(),
            ));
        }

        if let Some(tb) = &p.target_body {
            if tb.solves_radii() && p.coordinate_type_bundle != CoordinateType::Latitudinal {
                return Err(JigsawError::InvalidSetting(
                    "solving target radii requires latitudinal bundle coordinates".into(),
                ));
            }
        }

        Ok(p)
    }
}

fn fmt_sigma(sigma: Option<f64>) -> String {
    sigma.map_or_else(|| "N/A".to_string(), |s| format!("{s}"))
}

impl fmt::Display for BundleSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            const PARAM_COL: usize = 50;
            writeln!(f, "Bundle Settings")?;
            writeln!(f, "---------------")?;

            macro_rules! line {
                ($fmt:expr, $val:expr, $comment:expr) => {{
                    let s = format!($fmt, $val);
                    let pad = if s.len() < PARAM_COL {
                        " ".repeat(PARAM_COL - s.len())
                    } else {
                        " ".to_string()
                    };
                    writeln!(f, "  {}{}# {}", s, pad, $comment)
                }};
            }

            writeln!(f, "[Network]")?;
            line!("validate_network        = {}", self.validate_network, "Check measures and images before solving")?;
            line!("coordinate_type_bundle  = {}", self.coordinate_type_bundle, "Point parameterisation in the bundle")?;
            line!("coordinate_type_reports = {}", self.coordinate_type_reports, "Point parameterisation in reports")?;

            writeln!(f, "[Solve options]")?;
            line!("observation_mode        = {}", self.solve_observation_mode, "Group images by observation number")?;
            line!("update_cube_label       = {}", self.update_cube_label, "Write adjusted tables on convergence")?;
            line!("error_propagation       = {}", self.error_propagation, "Compute parameter covariances")?;
            line!("solve_radius            = {}", self.solve_radius, "Solve point radii")?;
            line!("point_sigma_1           = {}", fmt_sigma(self.global_point_sigmas[0]), "A priori coord-1 sigma [m]")?;
            line!("point_sigma_2           = {}", fmt_sigma(self.global_point_sigmas[1]), "A priori coord-2 sigma [m]")?;
            line!("point_sigma_3           = {}", fmt_sigma(self.global_point_sigmas[2]), "A priori coord-3 sigma [m]")?;

            writeln!(f, "[Outlier rejection]")?;
            line!("outlier_rejection       = {}", self.outlier_rejection, "Median/MAD residual rejection")?;
            line!("rejection_multiplier    = {:.3}", self.rejection_multiplier, "Limit = median + k * MAD")?;

            writeln!(f, "[Convergence]")?;
            line!("convergence_criteria    = {}", self.convergence_criteria, "Stopping rule")?;
            line!("threshold               = {:e}", self.convergence_threshold, "Convergence threshold")?;
            line!("max_iterations          = {}", self.max_iterations, "Iteration cap")?;

            writeln!(f, "[Maximum likelihood]")?;
            if self.maximum_likelihood.is_empty() {
                line!("models                  = {}", "None", "No robust reweighting")?;
            }
            for (i, entry) in self.maximum_likelihood.iter().enumerate() {
                line!(
                    "{}",
                    format!("model_{}                 = {} (q = {:.3})", i + 1, entry.model, entry.quantile),
                    "Tier model and tweaking-constant quantile"
                )?;
            }
            line!("chen_tail_weight        = {:.3}", self.chen_tail_weight, "Chen weight beyond the tweaking constant")?;

            writeln!(f, "[Observation solve settings]")?;
            for s in &self.observation_solve_settings {
                line!(
                    "{}",
                    format!("{} ({} obs)", s.instrument_id, s.observation_numbers.len()),
                    if s.held { "Held images" } else { "Instrument group" }
                )?;
                line!("    pointing            = {}", s.pointing, format!("twist = {}, ck degree {} / solve {}", s.solve_twist, s.ck_degree, s.ck_solve_degree))?;
                line!("    position            = {}", s.position, format!("spk degree {} / solve {}", s.spk_degree, s.spk_solve_degree))?;
                if let Some(csm) = &s.csm {
                    line!("    csm                 = {:?}", csm, "CSM parameter selection")?;
                }
            }

            writeln!(f, "[Target body]")?;
            match &self.target_body {
                None => line!("solve_target_body       = {}", false, "Target body held")?,
                Some(tb) => {
                    for p in &tb.parameters {
                        line!(
                            "{}",
                            format!("{:<24}= {}", p.kind.keyword(), p.apriori_value.map_or("current".into(), |v| format!("{v}"))),
                            format!("sigma {}", fmt_sigma(p.apriori_sigma))
                        )?;
                    }
                }
            }
            line!("output_prefix           = {:?}", self.output_prefix, "Artifact prefix")?;
            Ok(())
        } else {
            write!(
                f,
                "BundleSettings(coords={}, criteria={} < {:e}, max_it={}, rejection={}, ml_models={}, groups={}, target_body={})",
                self.coordinate_type_bundle,
                self.convergence_criteria,
                self.convergence_threshold,
                self.max_iterations,
                self.outlier_rejection,
                self.maximum_likelihood.len(),
                self.observation_solve_settings.len(),
                self.solve_target_body()
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::maximum_likelihood::MaximumLikelihoodModel;

    #[test]
    fn test_defaults() {
        let s = BundleSettings::builder().build().unwrap();
        assert!(s.validate_network);
        assert_eq!(s.max_iterations, 50);
        assert_eq!(s.rejection_multiplier, 3.0);
        assert_eq!(s.convergence_criteria, ConvergenceCriteria::Sigma0);
    }

    #[test]
    fn test_unknown_option_is_rejected() {
        let err = BundleSettings::builder()
            .option("solveEverything", "true")
            .unwrap_err();
        assert_eq!(
            err,
            JigsawError::InvalidSetting("unknown bundle option 'solveEverything'".into())
        );
    }

    #[test]
    fn test_options_apply() {
        let s = BundleSettings::builder()
            .option("solveRadius", "true")
            .unwrap()
            .option("globalPointCoord3AprioriSigma", "100")
            .unwrap()
            .option("maxIterations", "7")
            .unwrap()
            .option("maximumLikelihoodCascade", "Huber:0.5,Chen:0.95")
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(s.global_point_sigmas[2], Some(100.0));
        assert_eq!(s.max_iterations, 7);
        assert_eq!(s.maximum_likelihood[1].model, MaximumLikelihoodModel::Chen);
    }

    #[test]
    fn test_radius_sigma_dropped_without_radius_solve() {
        let s = BundleSettings::builder()
            .global_point_sigmas(Some(10.0), Some(10.0), Some(5.0))
            .build()
            .unwrap();
        assert_eq!(s.global_point_sigmas, [Some(10.0), Some(10.0), None]);

        let rect = BundleSettings::builder()
            .coordinate_type_bundle(CoordinateType::Rectangular)
            .global_point_sigmas(Some(10.0), Some(10.0), Some(5.0))
            .build()
            .unwrap();
        assert_eq!(rect.global_point_sigmas, [Some(10.0), Some(10.0), None]);

        let rect_radius = BundleSettings::builder()
            .coordinate_type_bundle(CoordinateType::Rectangular)
            .solve_radius(true)
            .global_point_sigmas(Some(10.0), Some(10.0), Some(5.0))
            .build()
            .unwrap();
        assert_eq!(rect_radius.global_point_sigmas[2], Some(5.0));
    }

    #[test]
    fn test_cascade_validation() {
        let welsch_first = BundleSettings::builder()
            .maximum_likelihood(vec![MaximumLikelihoodEntry::new(
                MaximumLikelihoodModel::Welsch,
                0.5,
            )])
            .build();
        assert!(matches!(welsch_first, Err(JigsawError::InvalidSetting(_))));

        let too_long = BundleSettings::builder()
            .maximum_likelihood(vec![
                MaximumLikelihoodEntry::new(MaximumLikelihoodModel::Huber, 0.5);
                4
            ])
            .build();
        assert!(too_long.is_err());

        let bad_quantile = BundleSettings::builder()
            .maximum_likelihood(vec![MaximumLikelihoodEntry::new(
                MaximumLikelihoodModel::Huber,
                1.5,
            )])
            .build();
        assert!(bad_quantile.is_err());
    }

    #[test]
    fn test_threshold_must_be_positive() {
        assert!(BundleSettings::builder()
            .convergence_threshold(0.0)
            .build()
            .is_err());
        assert!(BundleSettings::builder()
            .rejection_multiplier(f64::NAN)
            .build()
            .is_err());
    }

    #[test]
    fn test_held_observations_have_one_owner() {
        let group = ObservationSolveSettings::builder("CAM")
            .observation_numbers(["A", "B", "C"])
            .build()
            .unwrap();
        let s = BundleSettings::builder()
            .observation_solve_settings(group)
            .build()
            .unwrap()
            .with_held_observations(["B".to_string()].into_iter().collect());

        assert_eq!(s.observation_solve_settings.len(), 2);
        assert!(!s.observation_solve_settings[0].contains("B"));
        assert_eq!(s.solve_settings_index("B", "CAM").unwrap(), 1);
        assert_eq!(s.solve_settings_index("A", "CAM").unwrap(), 0);
        assert_eq!(s.solve_settings_index("Z", "CAM").unwrap(), 0);
        assert!(matches!(
            s.solve_settings_index("Z", "OTHER"),
            Err(JigsawError::MissingSolveSettings(_))
        ));
    }

    #[test]
    fn test_display_snapshot() {
        let s = BundleSettings::builder().build().unwrap();
        let pretty = format!("{s:#}");
        assert!(pretty.contains("Bundle Settings"));
        assert!(pretty.contains("max_iterations"));
        assert!(format!("{s}").starts_with("BundleSettings("));
    }
}
