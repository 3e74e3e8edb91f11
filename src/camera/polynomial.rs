//! Time polynomials for pointing (CK) and position (SPK) trajectories.
//!
//! A [`Polynomial`] evaluates `Σ cᵢ τⁱ` with the normalised time `τ = (t − base_time) /
//! time_scale`. An [`AxisTrajectory`] adds an optional fixed *base* polynomial under the
//! solved correction, which is how "fit over existing" is represented: the base keeps the
//! existing trajectory and the bundle only adjusts the correction terms.
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::jigsaw_errors::JigsawError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polynomial {
    pub base_time: f64,
    pub time_scale: f64,
    pub coefficients: Vec<f64>,
}

impl Polynomial {
    pub fn new(base_time: f64, time_scale: f64, coefficients: Vec<f64>) -> Self {
        Self {
            base_time,
            time_scale,
            coefficients,
        }
    }

    /// Constant polynomial.
    pub fn constant(value: f64, base_time: f64) -> Self {
        Self::new(base_time, 1.0, vec![value])
    }

    pub fn zeros(base_time: f64, time_scale: f64, count: usize) -> Self {
        Self::new(base_time, time_scale, vec![0.0; count])
    }

    /// Polynomial degree (0 for an empty or constant polynomial).
    pub fn degree(&self) -> usize {
        self.coefficients.len().saturating_sub(1)
    }

    #[inline]
    pub fn normalized_time(&self, t: f64) -> f64 {
        (t - self.base_time) / self.time_scale
    }

    /// Basis functions `τ⁰ … τⁿ⁻¹` at time `t`.
    pub fn basis(&self, t: f64, count: usize) -> Vec<f64> {
        let tau = self.normalized_time(t);
        let mut out = Vec::with_capacity(count);
        let mut p = 1.0;
        for _ in 0..count {
            out.push(p);
            p *= tau;
        }
        out
    }

    pub fn evaluate(&self, t: f64) -> f64 {
        let tau = self.normalized_time(t);
        self.coefficients
            .iter()
            .rev()
            .fold(0.0, |acc, c| acc * tau + c)
    }

    /// Least-squares fit of a polynomial of `degree` to `(time, value)` samples.
    ///
    /// Under-determined fits (fewer samples than coefficients) return the minimum-norm
    /// solution, which reproduces the samples exactly.
    pub fn fit(
        times: &[f64],
        values: &[f64],
        degree: usize,
        base_time: f64,
        time_scale: f64,
    ) -> Result<Self, JigsawError> {
        let mut poly = Self::zeros(base_time, time_scale, degree + 1);
        if times.is_empty() {
            return Ok(poly);
        }
        let n = degree + 1;
        let design = DMatrix::from_fn(times.len(), n, |r, c| {
            poly.normalized_time(times[r]).powi(c as i32)
        });
        let rhs = DVector::from_column_slice(values);
        let solution = design
            .svd(true, true)
            .solve(&rhs, 1e-14)
            .map_err(|e| JigsawError::InvalidNetwork(format!("polynomial fit failed: {e}")))?;
        poly.coefficients = solution.iter().copied().collect();
        Ok(poly)
    }
}

/// One solvable axis: `value(t) = base(t) + correction(t)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxisTrajectory {
    pub base: Option<Polynomial>,
    pub correction: Polynomial,
}

impl AxisTrajectory {
    /// Build the solvable representation of an existing polynomial.
    ///
    /// Arguments
    /// -----------------
    /// * `existing`: the polynomial read from the image tables.
    /// * `degree`: configured polynomial degree.
    /// * `over_existing`: keep `existing` as a fixed base and solve a zero-initialised
    ///   correction of `degree`; otherwise re-fit `existing` to `degree`.
    /// * `sample_times`: times used for a least-squares re-fit when the degree decreases.
    pub fn from_existing(
        existing: &Polynomial,
        degree: usize,
        over_existing: bool,
        sample_times: &[f64],
    ) -> Result<Self, JigsawError> {
        if over_existing {
            return Ok(Self {
                base: Some(existing.clone()),
                correction: Polynomial::zeros(
                    existing.base_time,
                    existing.time_scale,
                    degree + 1,
                ),
            });
        }
        let correction = if existing.coefficients.len() <= degree + 1 {
            let mut padded = existing.clone();
            padded.coefficients.resize(degree + 1, 0.0);
            padded
        } else {
            let values: Vec<f64> = sample_times.iter().map(|t| existing.evaluate(*t)).collect();
            Polynomial::fit(
                sample_times,
                &values,
                degree,
                existing.base_time,
                existing.time_scale,
            )?
        };
        Ok(Self {
            base: None,
            correction,
        })
    }

    pub fn evaluate(&self, t: f64) -> f64 {
        self.base.as_ref().map_or(0.0, |b| b.evaluate(t)) + self.correction.evaluate(t)
    }

    /// Collapse base and correction into a single polynomial of `degree`.
    pub fn to_polynomial(&self, degree: usize, sample_times: &[f64]) -> Result<Polynomial, JigsawError> {
        match &self.base {
            None => {
                let mut p = self.correction.clone();
                p.coefficients.resize(degree + 1, 0.0);
                Ok(p)
            }
            Some(base) => {
                let mut times = sample_times.to_vec();
                if times.len() < degree + 1 {
                    // spread extra samples over one time scale so the combined curve is kept
                    let span = self.correction.time_scale;
                    let t0 = times.first().copied().unwrap_or(base.base_time);
                    let extra = degree + 1 - times.len();
                    times.extend((1..=extra).map(|k| t0 + span * k as f64));
                }
                let values: Vec<f64> = times.iter().map(|t| self.evaluate(*t)).collect();
                Polynomial::fit(
                    &times,
                    &values,
                    degree,
                    self.correction.base_time,
                    self.correction.time_scale,
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_evaluate_and_basis() {
        let p = Polynomial::new(10.0, 2.0, vec![1.0, 2.0, 3.0]);
        // τ = 1.5
        assert_relative_eq!(p.evaluate(13.0), 1.0 + 3.0 + 3.0 * 2.25);
        assert_eq!(p.basis(13.0, 3), vec![1.0, 1.5, 2.25]);
        assert_eq!(p.degree(), 2);
    }

    #[test]
    fn test_fit_recovers_polynomial() {
        let truth = Polynomial::new(0.0, 1.0, vec![0.5, -1.0, 0.25]);
        let times: Vec<f64> = (0..10).map(|k| k as f64 * 0.3).collect();
        let values: Vec<f64> = times.iter().map(|t| truth.evaluate(*t)).collect();
        let fit = Polynomial::fit(&times, &values, 2, 0.0, 1.0).unwrap();
        for (a, b) in fit.coefficients.iter().zip(&truth.coefficients) {
            assert_relative_eq!(a, b, epsilon = 1e-10);
        }
    }

    #[test]
    fn test_refit_pads_or_reduces() {
        let existing = Polynomial::new(0.0, 1.0, vec![1.0, 0.1]);
        let up = AxisTrajectory::from_existing(&existing, 3, false, &[0.0]).unwrap();
        assert_eq!(up.correction.coefficients, vec![1.0, 0.1, 0.0, 0.0]);

        let down = AxisTrajectory::from_existing(&existing, 0, false, &[2.0]).unwrap();
        assert_relative_eq!(down.evaluate(2.0), existing.evaluate(2.0), epsilon = 1e-12);
    }

    #[test]
    fn test_over_existing_keeps_base() {
        let existing = Polynomial::new(5.0, 1.0, vec![1.0, 0.5, 0.1]);
        let mut axis = AxisTrajectory::from_existing(&existing, 1, true, &[5.0]).unwrap();
        assert_eq!(axis.correction.coefficients, vec![0.0, 0.0]);
        assert_relative_eq!(axis.evaluate(6.0), existing.evaluate(6.0));

        axis.correction.coefficients[0] = 0.01;
        let collapsed = axis.to_polynomial(2, &[5.0, 6.0, 7.0]).unwrap();
        for t in [5.0, 6.0, 7.0] {
            assert_relative_eq!(collapsed.evaluate(t), axis.evaluate(t), epsilon = 1e-10);
        }
    }
}
