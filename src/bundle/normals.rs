//! # Normal equations
//!
//! Linearisation of the reprojection residual `r = measured − projected(o, t, p)` around the
//! current state, with
//!
//! * `o` the free parameters of the observation owning the measure's image,
//! * `t` the solved target body parameters (optional),
//! * `p` the point coordinates in the bundle coordinate type.
//!
//! Per measure, with `A = ∂r/∂o`, `T = ∂r/∂t`, `B = ∂r/∂p` and `W = diag(w/σs², w/σl²)` (`w` the
//! maximum-likelihood weight):
//!
//! ```text
//! N₁₁ += Aᵀ W A   (plus the A/T cross and T/T blocks)
//! N₁₂ += Aᵀ W B
//! N₂₂ += Bᵀ W B
//! n₁  += Aᵀ W r,  n₂ += Bᵀ W r
//! ```
//!
//! Points are eliminated one at a time (Schur complement):
//!
//! ```text
//! N_red = N₁₁ − Σₚ N₁₂ₚ N₂₂ₚ⁻¹ N₁₂ₚᵀ
//! b_red = n₁  − Σₚ N₁₂ₚ N₂₂ₚ⁻¹ n₂ₚ
//! ```
//!
//! and recovered after the reduced solve by `Δp = N₂₂⁻¹ (n₂ − N₁₂ᵀ Δo)`.
//!
//! ## Work split
//!
//! Per-measure contributions are computed in parallel with `rayon`. The fold into the reduced
//! system is sequential, point by point in network order, so the result does not depend on the
//! thread count.
use std::collections::BTreeMap;

use itertools::Itertools;
use nalgebra::{DMatrix, DVector, Matrix2x3, Matrix3, MatrixXx3, Vector2, Vector3};
use rayon::prelude::*;
use tracing::warn;

use crate::{
    bundle::{observation::ObservationSet, sparse::SparseBlockMatrix},
    camera::{target::TargetBody, ImageCoordinate},
    constants::{BodyFixed, HELD_COORDINATE_WEIGHT, POINT_CONDITION_FLOOR},
    control::{
        surface_point::{coordinate_partials, sigmas_to_parameter_units, SurfacePoint},
        ControlNetwork, ControlPoint, ControlPointType,
    },
    images::ImageList,
    jigsaw_errors::JigsawError,
    settings::{
        target_body::{TargetBodySettings, TargetParameterKind},
        BundleSettings, CoordinateType,
    },
};

/// Wrap an angle difference into `(−π, π]`.
pub fn wrap_angle(d: f64) -> f64 {
    use std::f64::consts::PI;
    let w = (d + PI).rem_euclid(2.0 * PI) - PI;
    if w <= -PI {
        w + 2.0 * PI
    } else {
        w
    }
}

/// Solved target body parameters and their bookkeeping.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetParameters {
    pub kinds: Vec<TargetParameterKind>,
    pub apriori_values: DVector<f64>,
    pub apriori_sigmas: Vec<Option<f64>>,
    pub corrections: DVector<f64>,
    pub adjusted_sigmas: Option<Vec<f64>>,
}

impl TargetParameters {
    /// Seed the body with the configured a priori values and record them.
    pub fn new(settings: Option<&TargetBodySettings>, body: &mut TargetBody) -> Self {
        let params = settings.map_or(&[][..], |s| s.parameters.as_slice());
        for p in params {
            if let Some(v) = p.apriori_value {
                body.set_parameter_value(p.kind, v);
            }
        }
        let kinds: Vec<TargetParameterKind> = params.iter().map(|p| p.kind).collect();
        Self {
            apriori_values: DVector::from_iterator(
                kinds.len(),
                kinds.iter().map(|k| body.parameter_value(*k)),
            ),
            apriori_sigmas: params.iter().map(|p| p.apriori_sigma).collect(),
            corrections: DVector::zeros(kinds.len()),
            adjusted_sigmas: None,
            kinds,
        }
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    pub fn solves_radii(&self) -> bool {
        self.kinds.iter().any(TargetParameterKind::is_radius)
    }

    pub fn apply_corrections(&mut self, body: &mut TargetBody, delta: &DVector<f64>) {
        for (k, kind) in self.kinds.iter().enumerate() {
            body.set_parameter_value(*kind, body.parameter_value(*kind) + delta[k]);
        }
        self.corrections += delta;
    }
}

/// A priori pseudo-observation of one point, in bundle coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointConstraint {
    pub weight: Matrix3<f64>,
    /// `W (c_apriori − c)`.
    pub rhs: Vector3<f64>,
    /// `(c_apriori − c)ᵀ W (c_apriori − c)`.
    pub vtpv: f64,
    pub held_radius: bool,
    /// Constrained coordinates, held radius included.
    pub count: usize,
}

/// Linearised equations of one measure.
#[derive(Debug, Clone)]
struct MeasureContribution {
    point: usize,
    /// `(block, ∂r/∂block)` for the observation and, when solved, the target body.
    blocks: Vec<(usize, DMatrix<f64>)>,
    b: Matrix2x3<f64>,
    residual: Vector2<f64>,
    weight: Vector2<f64>,
}

/// Eliminated point block kept for back-substitution and error propagation.
#[derive(Debug, Clone)]
pub struct PointSystem {
    pub point: usize,
    /// `N₂₂⁻¹`.
    pub q: Matrix3<f64>,
    pub n2: Vector3<f64>,
    /// `N₁₂` per parameter block.
    pub n12: BTreeMap<usize, MatrixXx3<f64>>,
}

impl PointSystem {
    /// `Δp = N₂₂⁻¹ (n₂ − Σ N₁₂ᵢᵀ Δoᵢ)`.
    pub fn back_substitute(&self, matrix: &SparseBlockMatrix, delta: &DVector<f64>) -> Vector3<f64> {
        let mut rhs = self.n2;
        for (block, n12) in &self.n12 {
            rhs -= n12.transpose() * matrix.segment(delta, *block);
        }
        self.q * rhs
    }
}

/// Reduced normal equations of one iteration.
#[derive(Debug, Clone)]
pub struct ReducedSystem {
    pub matrix: SparseBlockMatrix,
    pub rhs: DVector<f64>,
    pub points: Vec<PointSystem>,
    pub ill_conditioned: Vec<usize>,
    pub active_measures: usize,
}

/// Per-iteration residual statistics.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Statistics {
    pub vtpv: f64,
    pub dof: i64,
    pub active_measures: usize,
    pub sigma0: f64,
}

/// Read-only view of the solve state used to linearise the problem.
pub struct Linearizer<'a> {
    pub settings: &'a BundleSettings,
    pub observations: &'a ObservationSet,
    pub images: &'a ImageList,
    pub target: &'a TargetBody,
    pub target_parameters: &'a TargetParameters,
}

/// Jacobi-scaled eigenvalue ratio test of a point block.
fn well_conditioned(n22: &Matrix3<f64>) -> bool {
    let d = n22.diagonal();
    if d.iter().any(|v| !(v.is_finite() && *v > 0.0)) {
        return false;
    }
    let s = Matrix3::from_diagonal(&d.map(|v| 1.0 / v.sqrt()));
    let scaled = s * n22 * s;
    let eig = scaled.symmetric_eigenvalues();
    let max = eig.max();
    max > 0.0 && eig.min() / max >= POINT_CONDITION_FLOOR
}

impl Linearizer<'_> {
    fn coordinate_type(&self) -> CoordinateType {
        self.settings.coordinate_type_bundle
    }

    /// Index of the target body block in the reduced system.
    pub fn target_block(&self) -> usize {
        self.observations.len()
    }

    pub fn block_sizes(&self) -> Vec<usize> {
        let mut sizes = self.observations.block_sizes();
        sizes.push(self.target_parameters.len());
        sizes
    }

    /// Radius of non-fixed latitudinal points is held at its current value.
    pub fn holds_radius(&self, point: &ControlPoint) -> bool {
        point.point_type != ControlPointType::Fixed
            && self.coordinate_type() == CoordinateType::Latitudinal
            && (!self.settings.solve_radius || self.target_parameters.solves_radii())
    }

    /// `(observation, member)` of an image serial number.
    pub fn locate(&self, serial_number: &str) -> Option<(usize, usize)> {
        self.images
            .index_of(serial_number)
            .and_then(|i| self.observations.locate(i))
    }

    /// Project a body-fixed point into the image with `serial_number`.
    pub fn project(&self, point: &BodyFixed, serial_number: &str) -> Option<ImageCoordinate> {
        let (o, member) = self.locate(serial_number)?;
        let obs = &self.observations.observations[o];
        let eo = obs.exterior_orientation(member, self.target);
        obs.camera(member).ground_to_image(&eo, point)
    }

    /// Intersect the line of sight of a measure with the target body.
    pub fn intersect(&self, serial_number: &str, coord: &ImageCoordinate) -> Option<BodyFixed> {
        let (o, member) = self.locate(serial_number)?;
        let obs = &self.observations.observations[o];
        let eo = obs.exterior_orientation(member, self.target);
        obs.camera(member).image_to_ground(&eo, coord, self.target)
    }

    /// Recompute the residual of every non-ignored measure.
    ///
    /// Return
    /// ----------
    /// * `usable[p][m]`: true when the measure has a residual (its image is adjusted and the
    ///   point projects in front of the camera).
    pub fn compute_residuals(&self, network: &mut ControlNetwork) -> Vec<Vec<bool>> {
        let residuals: Vec<Vec<Option<(f64, f64)>>> = network
            .points
            .par_iter()
            .map(|p| {
                let position = p.best_surface_point().filter(|_| !p.ignore).map(|s| s.position());
                p.measures
                    .iter()
                    .map(|m| {
                        let position = position.as_ref().filter(|_| !m.ignore)?;
                        self.project(position, &m.serial_number)
                            .map(|c| (m.sample - c.sample, m.line - c.line))
                    })
                    .collect()
            })
            .collect();

        network
            .points
            .iter_mut()
            .zip(residuals)
            .map(|(p, r)| {
                p.measures
                    .iter_mut()
                    .zip(r)
                    .map(|(m, r)| match r {
                        Some((s, l)) => {
                            m.sample_residual = s;
                            m.line_residual = l;
                            true
                        }
                        None => {
                            if !m.ignore {
                                m.sample_residual = 0.0;
                                m.line_residual = 0.0;
                            }
                            false
                        }
                    })
                    .collect()
            })
            .collect()
    }

    /// A priori constraint of a point at its current coordinates.
    pub fn point_constraint(&self, point: &ControlPoint, current: &SurfacePoint) -> PointConstraint {
        let ct = self.coordinate_type();
        let mut out = PointConstraint {
            weight: Matrix3::zeros(),
            rhs: Vector3::zeros(),
            vtpv: 0.0,
            held_radius: false,
            count: 0,
        };
        if point.point_type == ControlPointType::Fixed {
            return out;
        }
        let c = current.coordinates(ct);

        if let Some(apriori) = &point.apriori {
            let weight = match point.point_type {
                ControlPointType::Constrained => apriori
                    .coordinate_covariance(ct)
                    .map(|cov| constrained_weight(&cov))
                    .unwrap_or_else(Matrix3::zeros),
                _ => {
                    let sigmas =
                        sigmas_to_parameter_units(current, ct, self.settings.global_point_sigmas);
                    Matrix3::from_diagonal(&Vector3::from_iterator(
                        sigmas.iter().map(|s| s.map_or(0.0, |s| 1.0 / (s * s))),
                    ))
                }
            };
            let mut d = apriori.coordinates(ct) - c;
            if ct == CoordinateType::Latitudinal {
                d[1] = wrap_angle(d[1]);
            }
            out.count = (0..3).filter(|k| weight[(*k, *k)] > 0.0).count();
            out.rhs = weight * d;
            out.vtpv = d.dot(&(weight * d));
            out.weight = weight;
        }

        if self.holds_radius(point) {
            out.held_radius = true;
            if out.weight[(2, 2)] <= 0.0 {
                out.count += 1;
            }
        }
        out
    }

    fn contribution(
        &self,
        network: &ControlNetwork,
        point_index: usize,
        measure_index: usize,
        ml_weight: f64,
    ) -> Option<MeasureContribution> {
        let point = &network.points[point_index];
        let measure = &point.measures[measure_index];
        let surface = point.best_surface_point()?;
        let position = surface.position();
        let (o, member) = self.locate(&measure.serial_number)?;
        let obs = &self.observations.observations[o];
        let camera = obs.camera(member);
        let eo = obs.exterior_orientation(member, self.target);

        let look = camera.camera_look(&eo, &position);
        let (x, y) = camera.focal_plane(&look)?;
        let computed = camera.focal_plane_to_image(x, y);
        let g = camera.projection_partials(&look);
        let rotation = camera.look_rotation(&eo);

        let mut blocks = Vec::with_capacity(2);
        blocks.push((o, obs.partials(member, &eo, &position, &g)));

        if !self.target_parameters.is_empty() {
            let fixed = point.point_type == ControlPointType::Fixed;
            let (lat, lon, _) = surface.latitudinal();
            let radial = position.normalize();
            let mut t = DMatrix::zeros(2, self.target_parameters.len());
            for (k, kind) in self.target_parameters.kinds.iter().enumerate() {
                let dv = if kind.is_radius() {
                    if fixed {
                        continue;
                    }
                    let dr = self.target.local_radius_partial(lat, lon, *kind);
                    rotation * (eo.body.transpose() * radial) * dr
                } else {
                    let dm = self.target.body_rotation_partial(eo.time, *kind);
                    rotation * (dm.transpose() * position)
                };
                t.set_column(k, &(g * dv));
            }
            blocks.push((self.target_block(), t));
        }

        let j = coordinate_partials(&surface, self.coordinate_type());
        let b = g * rotation * eo.body.transpose() * j;
        let residual = Vector2::new(measure.sample - computed.sample, measure.line - computed.line);
        let weight = Vector2::new(
            ml_weight / (measure.sample_sigma * measure.sample_sigma),
            ml_weight / (measure.line_sigma * measure.line_sigma),
        );
        Some(MeasureContribution {
            point: point_index,
            blocks,
            b,
            residual,
            weight,
        })
    }

    /// Measures taking part in the solve.
    fn active_jobs(&self, network: &ControlNetwork, usable: &[Vec<bool>]) -> Vec<(usize, usize)> {
        network
            .points
            .iter()
            .enumerate()
            .filter(|(_, p)| p.is_active())
            .flat_map(|(pi, p)| {
                p.measures
                    .iter()
                    .enumerate()
                    .filter(move |(mi, m)| m.is_active() && usable[pi][*mi])
                    .map(move |(mi, _)| (pi, mi))
            })
            .collect()
    }

    /// Assemble and reduce the normal equations at the current state.
    ///
    /// Arguments
    /// -----------------
    /// * `network`: current point coordinates and rejection flags.
    /// * `usable`: output of [`Self::compute_residuals`].
    /// * `weights`: maximum-likelihood weight of every measure.
    ///
    /// Return
    /// ----------
    /// * The reduced system. Ill-conditioned points are listed and left out.
    pub fn assemble(
        &self,
        network: &ControlNetwork,
        usable: &[Vec<bool>],
        weights: &[Vec<f64>],
    ) -> ReducedSystem {
        let sizes = self.block_sizes();
        let mut matrix = SparseBlockMatrix::new(sizes);
        let mut rhs = DVector::zeros(matrix.dimension());

        let jobs = self.active_jobs(network, usable);
        let contributions: Vec<Option<MeasureContribution>> = jobs
            .par_iter()
            .map(|&(pi, mi)| self.contribution(network, pi, mi, weights[pi][mi]))
            .collect();

        let mut points = Vec::new();
        let mut ill_conditioned = Vec::new();
        let mut active_measures = 0;

        let chunks = contributions.into_iter().flatten().chunk_by(|c| c.point);
        for (pi, group) in &chunks {
            let group: Vec<MeasureContribution> = group.collect();
            let point = &network.points[pi];
            let fixed = point.is_fixed();

            let mut n11: BTreeMap<(usize, usize), DMatrix<f64>> = BTreeMap::new();
            let mut n1: BTreeMap<usize, DVector<f64>> = BTreeMap::new();
            let mut n12: BTreeMap<usize, MatrixXx3<f64>> = BTreeMap::new();
            let mut n22 = Matrix3::zeros();
            let mut n2 = Vector3::zeros();

            for c in &group {
                let r = DVector::from_column_slice(c.residual.as_slice());
                let mut wb = c.b;
                wb.row_mut(0).scale_mut(c.weight.x);
                wb.row_mut(1).scale_mut(c.weight.y);
                n22 += c.b.transpose() * wb;
                n2 += wb.transpose() * c.residual;

                for (i, (bi, ai)) in c.blocks.iter().enumerate() {
                    let mut wa = ai.clone();
                    wa.row_mut(0).scale_mut(c.weight.x);
                    wa.row_mut(1).scale_mut(c.weight.y);
                    for (bj, aj) in &c.blocks[i..] {
                        let m = wa.transpose() * aj;
                        accumulate(&mut n11, (*bi, *bj), m);
                    }
                    let v = wa.transpose() * &r;
                    match n1.get_mut(bi) {
                        Some(acc) => *acc += v,
                        None => {
                            n1.insert(*bi, v);
                        }
                    }
                    if !fixed {
                        let m: MatrixXx3<f64> = wa.transpose() * c.b;
                        match n12.get_mut(bi) {
                            Some(acc) => *acc += m,
                            None => {
                                n12.insert(*bi, m);
                            }
                        }
                    }
                }
            }

            let mut q = Matrix3::zeros();
            if !fixed {
                if let Some(surface) = point.best_surface_point() {
                    let constraint = self.point_constraint(point, &surface);
                    n22 += constraint.weight;
                    n2 += constraint.rhs;
                    if constraint.held_radius {
                        n22[(2, 2)] += HELD_COORDINATE_WEIGHT;
                    }
                }
                match Some(n22)
                    .filter(well_conditioned)
                    .and_then(|m| m.try_inverse())
                {
                    Some(inv) => q = inv,
                    None => {
                        let skipped = JigsawError::IllConditionedPoint(point.id.clone());
                        warn!(%skipped, "point skipped for this iteration");
                        ill_conditioned.push(pi);
                        continue;
                    }
                }
            }

            active_measures += group.len();
            for ((bi, bj), m) in n11 {
                matrix.add_block(bi, bj, &m);
            }
            for (bi, v) in n1 {
                let off = matrix.offset(bi);
                let mut seg = rhs.rows_mut(off, v.len());
                seg += v;
            }
            if fixed {
                continue;
            }

            let blocks: Vec<&usize> = n12.keys().collect();
            for (a, bi) in blocks.iter().enumerate() {
                let left = &n12[*bi] * q;
                for bj in &blocks[a..] {
                    let m: DMatrix<f64> = -(&left * n12[*bj].transpose());
                    matrix.add_block(**bi, **bj, &m);
                }
                let v = &left * n2;
                let off = matrix.offset(**bi);
                let mut seg = rhs.rows_mut(off, v.len());
                seg -= v;
            }
            points.push(PointSystem {
                point: pi,
                q,
                n2,
                n12,
            });
        }

        self.add_parameter_constraints(&mut matrix, &mut rhs);

        ReducedSystem {
            matrix,
            rhs,
            points,
            ill_conditioned,
            active_measures,
        }
    }

    /// Pseudo-observations `1/σ²` on observation and target parameters with an a priori sigma.
    fn add_parameter_constraints(&self, matrix: &mut SparseBlockMatrix, rhs: &mut DVector<f64>) {
        for (o, obs) in self.observations.iter().enumerate() {
            for (k, sigma) in obs.apriori_sigmas.iter().enumerate() {
                if let Some(s) = sigma {
                    let w = 1.0 / (s * s);
                    matrix.add_diagonal(o, k, w);
                    rhs[matrix.offset(o) + k] -= w * obs.corrections[k];
                }
            }
        }
        let tb = self.target_block();
        for (k, sigma) in self.target_parameters.apriori_sigmas.iter().enumerate() {
            if let Some(s) = sigma {
                let w = 1.0 / (s * s);
                matrix.add_diagonal(tb, k, w);
                rhs[matrix.offset(tb) + k] -= w * self.target_parameters.corrections[k];
            }
        }
    }

    /// `vᵀPv`, degrees of freedom and σ₀ at the current state.
    ///
    /// Arguments
    /// -----------------
    /// * `skipped`: points left out of the last solve (ill-conditioned).
    pub fn statistics(
        &self,
        network: &ControlNetwork,
        usable: &[Vec<bool>],
        weights: &[Vec<f64>],
        skipped: &[usize],
    ) -> Statistics {
        let mut vtpv = 0.0;
        let mut observations = 0i64;
        let mut unknowns = 0i64;
        let mut active_measures = 0;

        for (pi, point) in network.points.iter().enumerate() {
            if !point.is_active() || skipped.contains(&pi) {
                continue;
            }
            let mut used = 0;
            for (mi, m) in point.measures.iter().enumerate() {
                if !(m.is_active() && usable[pi][mi]) {
                    continue;
                }
                let w = weights[pi][mi];
                let s = m.sample_residual / m.sample_sigma;
                let l = m.line_residual / m.line_sigma;
                vtpv += w * (s * s + l * l);
                used += 1;
            }
            if used == 0 {
                continue;
            }
            active_measures += used;
            observations += 2 * used as i64;
            if !point.is_fixed() {
                unknowns += 3;
                if let Some(surface) = point.best_surface_point() {
                    let c = self.point_constraint(point, &surface);
                    vtpv += c.vtpv;
                    observations += c.count as i64;
                }
            }
        }

        for obs in self.observations.iter() {
            unknowns += obs.parameter_count() as i64;
            for (k, sigma) in obs.apriori_sigmas.iter().enumerate() {
                if let Some(s) = sigma {
                    let x = obs.corrections[k] / s;
                    vtpv += x * x;
                    observations += 1;
                }
            }
        }
        let tp = self.target_parameters;
        unknowns += tp.len() as i64;
        for (k, sigma) in tp.apriori_sigmas.iter().enumerate() {
            if let Some(s) = sigma {
                let x = tp.corrections[k] / s;
                vtpv += x * x;
                observations += 1;
            }
        }

        let dof = observations - unknowns;
        let sigma0 = if dof > 0 {
            (vtpv / dof as f64).sqrt()
        } else {
            vtpv.sqrt()
        };
        Statistics {
            vtpv,
            dof,
            active_measures,
            sigma0,
        }
    }
}

fn accumulate(map: &mut BTreeMap<(usize, usize), DMatrix<f64>>, key: (usize, usize), m: DMatrix<f64>) {
    match map.get_mut(&key) {
        Some(acc) => *acc += m,
        None => {
            map.insert(key, m);
        }
    }
}

/// Inverse of the constrained sub-block of an a priori covariance, embedded in a 3×3 weight.
fn constrained_weight(cov: &Matrix3<f64>) -> Matrix3<f64> {
    let idx: Vec<usize> = (0..3).filter(|k| cov[(*k, *k)] > 0.0).collect();
    let sub = DMatrix::from_fn(idx.len(), idx.len(), |r, c| cov[(idx[r], idx[c])]);
    let mut out = Matrix3::zeros();
    if let Some(inv) = sub.try_inverse() {
        for (r, ir) in idx.iter().enumerate() {
            for (c, ic) in idx.iter().enumerate() {
                out[(*ir, *ic)] = inv[(r, c)];
            }
        }
    }
    out
}
