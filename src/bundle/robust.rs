//! # Maximum-likelihood cascade
//!
//! The cascade is a small state machine over the configured tiers:
//!
//! ```text
//! Inactive ──(end of iteration 2, or convergence)──▶ Tier(0) ──(convergence)──▶ Tier(1) … ──▶ Done
//! ```
//!
//! While a tier is active, the tweaking constant `c` is recomputed at the end of every iteration
//! as the tier's quantile of the normalised residuals `z` of that iteration, and the resulting
//! weights are used by the next iteration. Convergence of a tier advances to the next one; the
//! bundle only stops once the last tier has converged.
use tracing::info;

use crate::settings::maximum_likelihood::{MaximumLikelihoodEntry, MaximumLikelihoodModel};

/// Iteration at whose end reweighting starts.
const ACTIVATION_ITERATION: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq)]
enum CascadeState {
    Inactive,
    Tier(usize),
    Done,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RobustCascade {
    entries: Vec<MaximumLikelihoodEntry>,
    chen_tail_weight: f64,
    state: CascadeState,
    tweaking_constant: Option<f64>,
}

impl RobustCascade {
    pub fn new(entries: Vec<MaximumLikelihoodEntry>, chen_tail_weight: f64) -> Self {
        Self {
            entries,
            chen_tail_weight,
            state: CascadeState::Inactive,
            tweaking_constant: None,
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.entries.is_empty()
    }

    /// True while weights other than unity may be in effect.
    pub fn is_weighting(&self) -> bool {
        matches!(self.state, CascadeState::Tier(_))
    }

    pub fn active_model(&self) -> Option<MaximumLikelihoodModel> {
        match self.state {
            CascadeState::Tier(k) => Some(self.entries[k].model),
            _ => None,
        }
    }

    pub fn tier(&self) -> Option<usize> {
        match self.state {
            CascadeState::Tier(k) => Some(k),
            _ => None,
        }
    }

    pub fn tweaking_constant(&self) -> Option<f64> {
        self.tweaking_constant
    }

    fn activate(&mut self, tier: usize) {
        self.state = CascadeState::Tier(tier);
        let e = self.entries[tier];
        info!(
            tier = tier + 1,
            model = %e.model,
            quantile = e.quantile,
            "maximum likelihood tier activated"
        );
    }

    /// End-of-iteration hook. Starts the first tier after the activation iteration.
    pub fn end_of_iteration(&mut self, iteration: usize) {
        if self.is_configured()
            && self.state == CascadeState::Inactive
            && iteration >= ACTIVATION_ITERATION
        {
            self.activate(0);
        }
    }

    /// Convergence hook.
    ///
    /// Return
    /// ----------
    /// * `true` when the bundle should keep iterating with a new tier, `false` when it may stop.
    pub fn on_converged(&mut self) -> bool {
        match self.state {
            CascadeState::Inactive if self.is_configured() => {
                self.activate(0);
                true
            }
            CascadeState::Tier(k) if k + 1 < self.entries.len() => {
                self.activate(k + 1);
                true
            }
            CascadeState::Tier(_) => {
                self.state = CascadeState::Done;
                false
            }
            _ => false,
        }
    }

    /// Weights for the next iteration from the normalised residuals of this one.
    ///
    /// Arguments
    /// -----------------
    /// * `z`: normalised residuals of every measure (`None` for measures without a residual).
    ///
    /// Return
    /// ----------
    /// * One weight per entry of `z`, all unity when no tier is active.
    pub fn weights(&mut self, z: &[Option<f64>]) -> Vec<f64> {
        let CascadeState::Tier(k) = self.state else {
            // no active tier
            return vec![1.0; z.len()];
        };
        let entry = self.entries[k];
        let mut values: Vec<f64> = z.iter().flatten().copied().collect();
        let c = quantile(&mut values, entry.quantile);
        self.tweaking_constant = c;
        let c = c.unwrap_or(0.0);
        z.iter()
            .map(|zi| match zi {
                Some(v) => entry.model.weight(*v, c, self.chen_tail_weight),
                None => 1.0,
            })
            .collect()
    }
}

/// Linear-interpolated quantile of a sample, `None` when empty.
pub fn quantile(values: &mut [f64], q: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let pos = q.clamp(0.0, 1.0) * (values.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    Some(values[lo] + (values[hi] - values[lo]) * frac)
}

/// Normalised residual `√((vs/σs)² + (vl/σl)²) / √2`.
#[inline]
pub fn normalized_residual(sample_residual: f64, line_residual: f64, sample_sigma: f64, line_sigma: f64) -> f64 {
    let s = sample_residual / sample_sigma;
    let l = line_residual / line_sigma;
    (s * s + l * l).sqrt() / std::f64::consts::SQRT_2
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_quantile() {
        let mut v = vec![4.0, 1.0, 3.0, 2.0, 5.0];
        assert_eq!(quantile(&mut v, 0.5), Some(3.0));
        assert_relative_eq!(quantile(&mut v, 0.1).unwrap(), 1.4);
        assert_eq!(quantile(&mut [], 0.5), None);
    }

    #[test]
    fn test_cascade_transitions() {
        let mut c = RobustCascade::new(
            vec![
                MaximumLikelihoodEntry::new(MaximumLikelihoodModel::Huber, 0.5),
                MaximumLikelihoodEntry::new(MaximumLikelihoodModel::Welsch, 0.9),
            ],
            0.0,
        );
        c.end_of_iteration(1);
        assert!(!c.is_weighting());
        c.end_of_iteration(2);
        assert_eq!(c.active_model(), Some(MaximumLikelihoodModel::Huber));
        assert!(c.on_converged());
        assert_eq!(c.active_model(), Some(MaximumLikelihoodModel::Welsch));
        assert!(!c.on_converged());
        assert!(!c.is_weighting());
    }

    #[test]
    fn test_huber_weights_from_quantile() {
        let mut c = RobustCascade::new(
            vec![MaximumLikelihoodEntry::new(MaximumLikelihoodModel::Huber, 0.5)],
            0.0,
        );
        c.end_of_iteration(2);
        let z = vec![Some(1.0), Some(2.0), Some(3.0), None, Some(8.0)];
        let w = c.weights(&z);
        // median of [1, 2, 3, 8] is 2.5
        assert_relative_eq!(c.tweaking_constant().unwrap(), 2.5);
        assert_eq!(w[0], 1.0);
        assert_eq!(w[3], 1.0);
        assert_relative_eq!(w[4], 2.5 / 8.0);
    }

    #[test]
    fn test_unconfigured_cascade_never_weights() {
        let mut c = RobustCascade::new(Vec::new(), 0.0);
        c.end_of_iteration(5);
        assert!(!c.on_converged());
        assert_eq!(c.weights(&[Some(10.0)]), vec![1.0]);
    }
}
