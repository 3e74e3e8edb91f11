//! Outcome of a bundle run: final status and per-iteration statistics.
use std::fmt;

use serde::Serialize;

use crate::{jigsaw_errors::JigsawError, settings::maximum_likelihood::MaximumLikelihoodModel};

/// Why a run stopped without converging.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum DivergenceReason {
    MaxIterations,
    Sigma0Increase,
    NotPositiveDefinite { block: usize, pivot: f64 },
}

impl fmt::Display for DivergenceReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MaxIterations => f.write_str("maximum number of iterations reached"),
            Self::Sigma0Increase => f.write_str("sigma0 increased on consecutive iterations"),
            Self::NotPositiveDefinite { block, pivot } => write!(
                f,
                "reduced normal matrix not positive definite (block {block}, pivot {pivot:e})"
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum BundleStatus {
    Converged,
    Diverged(DivergenceReason),
    Cancelled,
}

impl BundleStatus {
    pub fn is_converged(&self) -> bool {
        matches!(self, Self::Converged)
    }

    /// Map a non-converged status to the error reported to callers.
    ///
    /// Arguments
    /// -----------------
    /// * `iterations`: number of completed iterations.
    /// * `sigma0`: last σ₀.
    pub fn into_result(self, iterations: usize, sigma0: f64) -> Result<(), JigsawError> {
        match self {
            Self::Converged => Ok(()),
            Self::Diverged(DivergenceReason::NotPositiveDefinite { block, pivot }) => {
                Err(JigsawError::NotPositiveDefinite { block, pivot })
            }
            Self::Diverged(_) => Err(JigsawError::Diverged { iterations, sigma0 }),
            Self::Cancelled => Err(JigsawError::Cancelled(iterations)),
        }
    }
}

impl fmt::Display for BundleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Converged => f.write_str("Converged"),
            Self::Diverged(reason) => write!(f, "Diverged ({reason})"),
            Self::Cancelled => f.write_str("Cancelled"),
        }
    }
}

/// Statistics of one completed iteration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IterationRecord {
    pub iteration: usize,
    pub sigma0: f64,
    pub vtpv: f64,
    pub dof: i64,
    pub active_measures: usize,
    pub rejected_measures: usize,
    pub ml_model: Option<MaximumLikelihoodModel>,
    pub tweaking_constant: Option<f64>,
    /// Largest absolute observation/target correction of the iteration.
    pub max_correction: f64,
    pub rejection_limit: Option<f64>,
}

/// Everything the solver reports besides the adjusted network and observations.
#[derive(Debug, Clone, PartialEq)]
pub struct BundleResults {
    pub status: BundleStatus,
    pub iterations: Vec<IterationRecord>,
    /// Final σ₀ (apriori residual scale for a dry run).
    pub sigma0: f64,
    pub dof: i64,
    /// `weights[p][m]`: maximum-likelihood weight multiplier of every measure.
    pub weights: Vec<Vec<f64>>,
    pub ill_conditioned_points: Vec<String>,
    pub error_propagation: bool,
}

impl BundleResults {
    pub fn iteration_count(&self) -> usize {
        self.iterations.len()
    }

    pub fn measure_weight(&self, point: usize, measure: usize) -> f64 {
        self.weights
            .get(point)
            .and_then(|w| w.get(measure))
            .copied()
            .unwrap_or(1.0)
    }

    /// Points skipped at least once for an ill-conditioned normal block, as
    /// [`JigsawError::IllConditionedPoint`]. These never abort the run.
    pub fn point_errors(&self) -> Vec<JigsawError> {
        self.ill_conditioned_points
            .iter()
            .cloned()
            .map(JigsawError::IllConditionedPoint)
            .collect()
    }

    pub fn sigma0_history(&self) -> Vec<f64> {
        self.iterations.iter().map(|r| r.sigma0).collect()
    }

    /// `Ok(())` on convergence, otherwise the error matching the status.
    pub fn check(&self) -> Result<(), JigsawError> {
        self.status.into_result(self.iteration_count(), self.sigma0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_errors() {
        assert!(BundleStatus::Converged.into_result(3, 0.5).is_ok());
        assert_eq!(
            BundleStatus::Diverged(DivergenceReason::MaxIterations).into_result(3, 0.5),
            Err(JigsawError::Diverged {
                iterations: 3,
                sigma0: 0.5
            })
        );
        assert_eq!(
            BundleStatus::Diverged(DivergenceReason::NotPositiveDefinite {
                block: 2,
                pivot: -1.0
            })
            .into_result(1, 0.0),
            Err(JigsawError::NotPositiveDefinite {
                block: 2,
                pivot: -1.0
            })
        );
        assert_eq!(
            BundleStatus::Cancelled.into_result(4, 1.0),
            Err(JigsawError::Cancelled(4))
        );
    }
}
