//! # Control network
//!
//! The control network is the measurement input of the bundle: a list of [`ControlPoint`]s,
//! each observed by one or more [`ControlMeasure`]s (one per image).
//!
//! ## Point types
//!
//! | Type          | Coordinates during the bundle                               |
//! |---------------|-------------------------------------------------------------|
//! | `Free`        | estimated, optionally weighted by the global a priori sigmas |
//! | `Constrained` | estimated, weighted by the a priori covariance               |
//! | `Fixed`       | held at the a priori coordinates                             |
//!
//! ## Mutation
//!
//! The solver writes the adjusted surface points, the measure residuals and the
//! `jigsaw_rejected` flags. User flags (`ignore`, `edit_lock`) are never changed by the solver.
//!
//! ## Serialization
//!
//! Networks are stored as JSON records. Reading goes through [`versioner`], which accepts every
//! historical layout and upgrades it in memory; writing always produces the current layout.
pub mod lidar;
pub mod surface_point;
pub mod versioner;

use std::fmt;

use camino::Utf8Path;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{
    constants::{SerialNumber, CONTROL_NET_VERSION, DEFAULT_MEASURE_SIGMA},
    control::surface_point::SurfacePoint,
    jigsaw_errors::JigsawError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlPointType {
    Free,
    Constrained,
    Fixed,
}

impl fmt::Display for ControlPointType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MeasureType {
    #[default]
    Candidate,
    Manual,
    RegisteredPixel,
    RegisteredSubPixel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MeasureLogKind {
    GoodnessOfFit,
    MinimumPixelZScore,
    MaximumPixelZScore,
    PixelShift,
    WholePixelCorrelation,
    SubPixelCorrelation,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MeasureLogEntry {
    pub kind: MeasureLogKind,
    pub value: f64,
}

fn default_sigma() -> f64 {
    DEFAULT_MEASURE_SIGMA
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlMeasure {
    pub serial_number: SerialNumber,
    #[serde(default)]
    pub measure_type: MeasureType,
    pub sample: f64,
    pub line: f64,
    #[serde(default = "default_sigma")]
    pub sample_sigma: f64,
    #[serde(default = "default_sigma")]
    pub line_sigma: f64,
    #[serde(default)]
    pub sample_residual: f64,
    #[serde(default)]
    pub line_residual: f64,
    #[serde(default)]
    pub ignore: bool,
    #[serde(default)]
    pub edit_lock: bool,
    #[serde(default)]
    pub jigsaw_rejected: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apriori_sample: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apriori_line: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub log: Vec<MeasureLogEntry>,
}

impl ControlMeasure {
    pub fn new(serial_number: impl Into<String>, sample: f64, line: f64) -> Self {
        Self {
            serial_number: serial_number.into(),
            measure_type: MeasureType::Candidate,
            sample,
            line,
            sample_sigma: DEFAULT_MEASURE_SIGMA,
            line_sigma: DEFAULT_MEASURE_SIGMA,
            sample_residual: 0.0,
            line_residual: 0.0,
            ignore: false,
            edit_lock: false,
            jigsaw_rejected: false,
            apriori_sample: None,
            apriori_line: None,
            log: Vec::new(),
        }
    }

    pub fn with_sigmas(mut self, sample_sigma: f64, line_sigma: f64) -> Self {
        self.sample_sigma = sample_sigma;
        self.line_sigma = line_sigma;
        self
    }

    /// Residual magnitude `√(sample² + line²)`, pixels.
    #[inline]
    pub fn residual_magnitude(&self) -> f64 {
        (self.sample_residual * self.sample_residual + self.line_residual * self.line_residual)
            .sqrt()
    }

    /// Measure contributes to the solve.
    #[inline]
    pub fn is_active(&self) -> bool {
        !self.ignore && !self.jigsaw_rejected
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlPoint {
    pub id: String,
    pub point_type: ControlPointType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apriori: Option<SurfacePoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adjusted: Option<SurfacePoint>,
    #[serde(default)]
    pub ignore: bool,
    #[serde(default)]
    pub edit_lock: bool,
    #[serde(default)]
    pub jigsaw_rejected: bool,
    pub measures: Vec<ControlMeasure>,
}

impl ControlPoint {
    pub fn new(id: impl Into<String>, point_type: ControlPointType) -> Self {
        Self {
            id: id.into(),
            point_type,
            apriori: None,
            adjusted: None,
            ignore: false,
            edit_lock: false,
            jigsaw_rejected: false,
            measures: Vec::new(),
        }
    }

    pub fn with_apriori(mut self, apriori: SurfacePoint) -> Self {
        self.apriori = Some(apriori);
        self
    }

    pub fn with_measure(mut self, measure: ControlMeasure) -> Self {
        self.measures.push(measure);
        self
    }

    /// Point contributes to the solve.
    #[inline]
    pub fn is_active(&self) -> bool {
        !self.ignore && !self.jigsaw_rejected
    }

    pub fn is_fixed(&self) -> bool {
        self.point_type == ControlPointType::Fixed
    }

    pub fn number_of_valid_measures(&self) -> usize {
        self.measures.iter().filter(|m| !m.ignore).count()
    }

    pub fn number_of_active_measures(&self) -> usize {
        self.measures.iter().filter(|m| m.is_active()).count()
    }

    /// Current best coordinates: adjusted when present, otherwise a priori.
    pub fn best_surface_point(&self) -> Option<SurfacePoint> {
        self.adjusted.or(self.apriori)
    }
}

/// Counts reported in the solution summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NetworkCounts {
    pub points: usize,
    pub ignored_points: usize,
    pub rejected_points: usize,
    pub fixed_points: usize,
    pub constrained_points: usize,
    pub free_points: usize,
    pub measures: usize,
    pub ignored_measures: usize,
    pub rejected_measures: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlNetwork {
    pub version: u32,
    pub network_id: String,
    pub target_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub created: String,
    #[serde(default)]
    pub modified: String,
    pub points: Vec<ControlPoint>,
}

impl ControlNetwork {
    pub fn new(network_id: impl Into<String>, target_name: impl Into<String>) -> Self {
        Self {
            version: CONTROL_NET_VERSION,
            network_id: network_id.into(),
            target_name: target_name.into(),
            description: String::new(),
            created: String::new(),
            modified: String::new(),
            points: Vec::new(),
        }
    }

    /// Read a network in any supported layout.
    pub fn from_file(path: &Utf8Path) -> Result<Self, JigsawError> {
        let content = std::fs::read_to_string(path)?;
        versioner::read_network(&content)
    }

    /// Write the network in the current layout.
    pub fn to_file(&self, path: &Utf8Path) -> Result<(), JigsawError> {
        std::fs::write(path, versioner::write_network(self)?)?;
        Ok(())
    }

    /// Iterate over non-ignored points.
    pub fn valid_points(&self) -> impl Iterator<Item = &ControlPoint> {
        self.points.iter().filter(|p| !p.ignore)
    }

    pub fn counts(&self) -> NetworkCounts {
        let mut c = NetworkCounts::default();
        for p in &self.points {
            c.points += 1;
            match p.point_type {
                ControlPointType::Fixed => c.fixed_points += 1,
                ControlPointType::Constrained => c.constrained_points += 1,
                ControlPointType::Free => c.free_points += 1,
            }
            if p.ignore {
                c.ignored_points += 1;
            } else if p.jigsaw_rejected {
                c.rejected_points += 1;
            }
            for m in &p.measures {
                c.measures += 1;
                if m.ignore {
                    c.ignored_measures += 1;
                } else if m.jigsaw_rejected {
                    c.rejected_measures += 1;
                }
            }
        }
        c
    }

    /// Distinct serial numbers referenced by non-ignored measures, sorted.
    pub fn serial_numbers(&self) -> Vec<SerialNumber> {
        let mut serials: Vec<SerialNumber> = self
            .valid_points()
            .flat_map(|p| p.measures.iter().filter(|m| !m.ignore))
            .map(|m| m.serial_number.clone())
            .collect();
        serials.sort();
        serials.dedup();
        serials
    }

    /// Check the network before solving.
    ///
    /// Always enforced:
    /// * measure sigmas are finite and strictly positive,
    /// * non-Free points carry an a priori surface point,
    /// * Constrained points carry a non-empty a priori covariance.
    ///
    /// With `full = true` additionally:
    /// * every non-ignored measure resolves to an image through `is_known`,
    /// * every non-ignored point has at least two non-ignored measures.
    ///
    /// Return
    /// ----------
    /// * `Ok(())`, or [`JigsawError::InvalidNetwork`] naming the offending point/measure.
    pub fn validate<F>(&self, full: bool, is_known: F) -> Result<(), JigsawError>
    where
        F: Fn(&str) -> bool,
    {
        for point in self.valid_points() {
            if point.point_type != ControlPointType::Free && point.apriori.is_none() {
                return Err(JigsawError::InvalidNetwork(format!(
                    "point {} is {} but has no a priori surface point",
                    point.id, point.point_type
                )));
            }
            if point.point_type == ControlPointType::Constrained
                && !point.apriori.is_some_and(|a| a.has_covariance())
            {
                return Err(JigsawError::InvalidNetwork(format!(
                    "point {} is Constrained but its a priori covariance is empty",
                    point.id
                )));
            }
            for m in point.measures.iter().filter(|m| !m.ignore) {
                let bad = |s: f64| !(s.is_finite() && s > 0.0);
                if bad(m.sample_sigma) || bad(m.line_sigma) {
                    return Err(JigsawError::InvalidNetwork(format!(
                        "measure {} of point {} has a non-positive sigma ({}, {})",
                        m.serial_number, point.id, m.sample_sigma, m.line_sigma
                    )));
                }
                if !is_known(&m.serial_number) {
                    if full {
                        return Err(JigsawError::InvalidNetwork(format!(
                            "measure {} of point {} does not resolve to an image",
                            m.serial_number, point.id
                        )));
                    }
                    warn!(
                        point = %point.id,
                        serial = %m.serial_number,
                        "measure does not resolve to an image and is skipped"
                    );
                }
            }
            if full && point.number_of_valid_measures() < 2 {
                return Err(JigsawError::InvalidNetwork(format!(
                    "point {} has {} valid measures (at least 2 required)",
                    point.id,
                    point.number_of_valid_measures()
                )));
            }
        }
        Ok(())
    }
}

impl fmt::Display for ControlNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = self.counts();
        write!(
            f,
            "ControlNetwork '{}' ({}): {} points, {} measures",
            self.network_id, self.target_name, c.points, c.measures
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector3;

    fn small_network() -> ControlNetwork {
        let mut net = ControlNetwork::new("test", "Moon");
        net.points.push(
            ControlPoint::new("p1", ControlPointType::Free)
                .with_measure(ControlMeasure::new("A", 10.0, 20.0))
                .with_measure(ControlMeasure::new("B", 11.0, 21.0)),
        );
        net
    }

    #[test]
    fn test_validate_accepts_well_formed_network() {
        let net = small_network();
        assert_eq!(net.validate(true, |_| true), Ok(()));
    }

    #[test]
    fn test_zero_sigma_is_rejected_even_without_full_validation() {
        let mut net = small_network();
        net.points[0].measures[1].line_sigma = 0.0;
        assert!(matches!(
            net.validate(false, |_| true),
            Err(JigsawError::InvalidNetwork(_))
        ));
    }

    #[test]
    fn test_single_measure_point_fails_full_validation_only() {
        let mut net = small_network();
        net.points[0].measures[1].ignore = true;
        assert!(net.validate(true, |_| true).is_err());
        assert!(net.validate(false, |_| true).is_ok());
    }

    #[test]
    fn test_unknown_serial_fails_full_validation() {
        let net = small_network();
        assert!(net.validate(true, |s| s == "A").is_err());
        assert!(net.validate(false, |s| s == "A").is_ok());
    }

    #[test]
    fn test_constrained_without_covariance_is_invalid() {
        let mut net = small_network();
        net.points[0].point_type = ControlPointType::Constrained;
        net.points[0].apriori = Some(SurfacePoint::from_rectangular(&Vector3::new(1.0, 2.0, 3.0)));
        assert!(net.validate(false, |_| true).is_err());
    }

    #[test]
    fn test_counts_and_serials() {
        let mut net = small_network();
        net.points[0].measures[0].jigsaw_rejected = true;
        let c = net.counts();
        assert_eq!(c.points, 1);
        assert_eq!(c.measures, 2);
        assert_eq!(c.rejected_measures, 1);
        assert_eq!(net.serial_numbers(), vec!["A".to_string(), "B".to_string()]);
    }
}
