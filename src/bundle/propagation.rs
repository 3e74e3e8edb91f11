//! # Error propagation
//!
//! Once converged, the reduced normal matrix is re-assembled at the final state and inverted.
//! With `Q = N_red⁻¹`:
//!
//! * observation and target sigmas are `σ₀ √Q_kk`,
//! * each point covariance is
//!
//! ```text
//! Σₚ = σ₀² (Q₂₂ + Q₂₂ (Σᵢⱼ N₁₂ᵢᵀ Q[i,j] N₁₂ⱼ) Q₂₂)
//! ```
//!
//! with `Q₂₂ = N₂₂⁻¹` the eliminated point block.
use nalgebra::{DMatrix, Matrix3};
use rayon::prelude::*;

use crate::{bundle::normals::ReducedSystem, jigsaw_errors::JigsawError};

/// Adjusted uncertainties of every solved quantity.
#[derive(Debug, Clone, PartialEq)]
pub struct Propagation {
    /// Per parameter block (observations then target body).
    pub block_sigmas: Vec<Vec<f64>>,
    /// `(point index, covariance in bundle coordinates)`.
    pub point_covariances: Vec<(usize, Matrix3<f64>)>,
}

/// Invert the reduced system and scale by the final σ₀.
///
/// Arguments
/// -----------------
/// * `system`: reduced normal equations assembled at the final state.
/// * `sigma0`: final standard deviation of unit weight.
///
/// Return
/// ----------
/// * The propagated uncertainties, or the factorisation error.
pub fn propagate(system: &ReducedSystem, sigma0: f64) -> Result<Propagation, JigsawError> {
    let matrix = &system.matrix;
    let q = matrix.factor()?.inverse();
    let s2 = sigma0 * sigma0;

    let block_sigmas = (0..matrix.block_count())
        .map(|b| {
            let off = matrix.offset(b);
            (0..matrix.block_size(b))
                .map(|k| sigma0 * q[(off + k, off + k)].max(0.0).sqrt())
                .collect()
        })
        .collect();

    let point_covariances = system
        .points
        .par_iter()
        .map(|p| {
            let mut inner = Matrix3::zeros();
            for (bi, ni) in &p.n12 {
                for (bj, nj) in &p.n12 {
                    let qij = block_view(&q, matrix.offset(*bi), matrix.offset(*bj), ni.nrows(), nj.nrows());
                    inner += ni.transpose() * qij * nj;
                }
            }
            let cov = (p.q + p.q * inner * p.q) * s2;
            (p.point, (cov + cov.transpose()) * 0.5)
        })
        .collect();

    Ok(Propagation {
        block_sigmas,
        point_covariances,
    })
}

fn block_view(q: &DMatrix<f64>, r: usize, c: usize, nr: usize, nc: usize) -> DMatrix<f64> {
    q.view((r, c), (nr, nc)).into_owned()
}
