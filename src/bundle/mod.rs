//! # Bundle adjustment driver
//!
//! [`BundleAdjust`] owns one solve. It is built from a [`SolveContext`] (settings, control
//! network, image list and optional lidar points), then consumed by [`BundleAdjust::solve`].
//!
//! ## Iteration
//!
//! Each iteration
//!
//! 1. assembles and reduces the normal equations at the current state ([`normals`]),
//! 2. factors and solves the reduced system ([`sparse`]), applies the observation and target
//!    corrections and back-substitutes the point corrections,
//! 3. recomputes every residual, `vᵀPv`, the degrees of freedom and σ₀,
//! 4. optionally flags outliers ([`rejection`]),
//! 5. tests convergence, advances the maximum-likelihood cascade ([`robust`]) and recomputes
//!    the measure weights.
//!
//! The run ends `Converged`, `Diverged` (iteration budget, σ₀ increasing on consecutive stable
//! iterations, reduced matrix not positive definite) or `Cancelled`. On convergence with error
//! propagation enabled, the adjusted sigmas and point covariances are computed
//! ([`propagation`]).
//!
//! ## Example
//!
//! ```rust,no_run
//! use camino::Utf8Path;
//! use jigsaw::bundle::{BundleAdjust, SolveContext};
//! use jigsaw::control::ControlNetwork;
//! use jigsaw::images::ImageList;
//! use jigsaw::settings::{observation_solve::ObservationSolveSettings, BundleSettings};
//!
//! # fn main() -> Result<(), jigsaw::jigsaw_errors::JigsawError> {
//! let settings = BundleSettings::builder()
//!     .observation_solve_settings(ObservationSolveSettings::builder("NAC").build()?)
//!     .build()?;
//! let ctx = SolveContext {
//!     settings,
//!     network: ControlNetwork::from_file(Utf8Path::new("in.net"))?,
//!     images: ImageList::from_list_file(Utf8Path::new("images.lis"))?,
//!     lidar: None,
//! };
//! let solution = BundleAdjust::new(ctx)?.solve()?;
//! println!("{}", solution.results.status);
//! # Ok(())
//! # }
//! ```
pub mod normals;
pub mod observation;
pub mod progress_bar;
pub mod propagation;
pub mod rejection;
pub mod results;
pub mod robust;
pub mod sparse;

use nalgebra::Vector3;
use tracing::{debug, info, warn};

use crate::{
    bundle::{
        normals::{Linearizer, Statistics, TargetParameters},
        observation::ObservationSet,
        progress_bar::IterationProgress,
        propagation::propagate,
        rejection::flag_outliers,
        results::{BundleResults, BundleStatus, DivergenceReason, IterationRecord},
        robust::{normalized_residual, RobustCascade},
    },
    camera::{target::TargetBody, ImageCoordinate},
    constants::{DIVERGENCE_STREAK, SIGMA0_INCREASE_TOLERANCE},
    control::{
        lidar::LidarData,
        surface_point::{from_coordinates, SurfacePoint},
        ControlNetwork, ControlPointType,
    },
    images::ImageList,
    jigsaw_errors::JigsawError,
    settings::{BundleSettings, ConvergenceCriteria, CoordinateType},
    solution::BundleSolutionInfo,
};

/// Everything one solve needs, passed explicitly.
#[derive(Debug, Clone)]
pub struct SolveContext {
    pub settings: BundleSettings,
    pub network: ControlNetwork,
    pub images: ImageList,
    pub lidar: Option<LidarData>,
}

#[derive(Debug)]
pub struct BundleAdjust {
    settings: BundleSettings,
    network: ControlNetwork,
    images: ImageList,
    lidar: Option<LidarData>,
    observations: ObservationSet,
    target: TargetBody,
    target_parameters: TargetParameters,
    robust: RobustCascade,
    /// `usable[p][m]`: the measure has a residual at the current state.
    usable: Vec<Vec<bool>>,
    /// Maximum-likelihood weight multipliers, one per measure.
    weights: Vec<Vec<f64>>,
}

impl BundleAdjust {
    /// Validate the inputs and initialise the solve state.
    ///
    /// Lidar points are appended to the network as ordinary points. Free points without a
    /// priori coordinates are seeded by intersecting the line of sight of their first measure
    /// with the target body. Initial residuals are computed at the a priori state.
    ///
    /// Arguments
    /// -----------------
    /// * `ctx`: settings, network, images and optional lidar data.
    ///
    /// Return
    /// ----------
    /// * The ready-to-solve adjustment, or the first validation/grouping error.
    pub fn new(ctx: SolveContext) -> Result<Self, JigsawError> {
        let SolveContext {
            settings,
            mut network,
            images,
            lidar,
        } = ctx;

        if let Some(lidar) = &lidar {
            network.points.extend(lidar.to_control_points());
        }
        network.validate(settings.validate_network, |s| images.contains(s))?;

        let mut target = images
            .records()
            .first()
            .map(|r| r.target.clone())
            .ok_or_else(|| JigsawError::InvalidNetwork("the image list is empty".into()))?;
        let target_parameters = TargetParameters::new(settings.target_body.as_ref(), &mut target);
        let observations = ObservationSet::group(&settings, &network, &images)?;
        info!(
            points = network.points.len(),
            images = images.len(),
            observations = observations.len(),
            parameters = observations.parameter_count() + target_parameters.len(),
            "bundle initialised"
        );

        let robust = RobustCascade::new(settings.maximum_likelihood.clone(), settings.chen_tail_weight);
        let weights = network
            .points
            .iter()
            .map(|p| vec![1.0; p.measures.len()])
            .collect();
        let mut bundle = Self {
            settings,
            network,
            images,
            lidar,
            observations,
            target,
            target_parameters,
            robust,
            usable: Vec::new(),
            weights,
        };
        bundle.seed_points();
        let (lin, network) = bundle.split();
        let usable = lin.compute_residuals(network);
        bundle.usable = usable;
        Ok(bundle)
    }

    fn linearizer(&self) -> Linearizer<'_> {
        Linearizer {
            settings: &self.settings,
            observations: &self.observations,
            images: &self.images,
            target: &self.target,
            target_parameters: &self.target_parameters,
        }
    }

    fn split(&mut self) -> (Linearizer<'_>, &mut ControlNetwork) {
        (
            Linearizer {
                settings: &self.settings,
                observations: &self.observations,
                images: &self.images,
                target: &self.target,
                target_parameters: &self.target_parameters,
            },
            &mut self.network,
        )
    }

    fn seed_points(&mut self) {
        let (lin, network) = self.split();
        for point in network.points.iter_mut().filter(|p| !p.ignore) {
            if point.apriori.is_none() && point.point_type == ControlPointType::Free {
                let seeded = point.measures.iter().filter(|m| !m.ignore).find_map(|m| {
                    lin.intersect(&m.serial_number, &ImageCoordinate::new(m.sample, m.line))
                });
                match seeded {
                    Some(p) => {
                        point.apriori = Some(SurfacePoint::from_rectangular(&p));
                        debug!(point = %point.id, "a priori coordinates seeded from the first measure");
                    }
                    None => warn!(point = %point.id, "no measure intersects the target body"),
                }
            }
            point.adjusted = point.apriori;
        }
    }

    pub fn settings(&self) -> &BundleSettings {
        &self.settings
    }

    pub fn network(&self) -> &ControlNetwork {
        &self.network
    }

    pub fn observations(&self) -> &ObservationSet {
        &self.observations
    }

    pub fn target(&self) -> &TargetBody {
        &self.target
    }

    /// Residual statistics at the current state.
    pub fn statistics(&self) -> Statistics {
        self.linearizer()
            .statistics(&self.network, &self.usable, &self.weights, &[])
    }

    /// Solve to convergence or divergence.
    pub fn solve(self) -> Result<BundleSolutionInfo, JigsawError> {
        self.solve_with_cancel(|| false)
    }

    /// Solve, polling `should_cancel` before each iteration.
    ///
    /// On cancellation the network and observations hold the last completed iteration.
    ///
    /// Return
    /// ----------
    /// * The solution (whatever its status), or a hard error (I/O, timestamp).
    pub fn solve_with_cancel<F>(mut self, mut should_cancel: F) -> Result<BundleSolutionInfo, JigsawError>
    where
        F: FnMut() -> bool,
    {
        let max_iterations = self.settings.max_iterations;
        let threshold = self.settings.convergence_threshold;
        let mut progress = IterationProgress::new(max_iterations);
        let mut records = Vec::new();
        let mut stats = self.statistics();
        let mut weights_in_effect = self.weights.clone();
        let mut ill_conditioned_points: Vec<String> = Vec::new();
        let mut flagged: Vec<usize> = Vec::new();
        let mut previous = f64::INFINITY;
        let mut increases = 0;
        let mut iteration = 0;

        let status = loop {
            if iteration >= max_iterations {
                break BundleStatus::Diverged(DivergenceReason::MaxIterations);
            }
            if should_cancel() {
                info!(iteration, "bundle cancelled");
                break BundleStatus::Cancelled;
            }
            iteration += 1;
            for pi in flagged.drain(..) {
                self.network.points[pi].jigsaw_rejected = false;
            }

            let system = self
                .linearizer()
                .assemble(&self.network, &self.usable, &self.weights);
            let factor = match system.matrix.factor() {
                Ok(f) => f,
                Err(JigsawError::NotPositiveDefinite { block, pivot }) => {
                    warn!(iteration, block, pivot, "reduced normal matrix is not positive definite");
                    break BundleStatus::Diverged(DivergenceReason::NotPositiveDefinite { block, pivot });
                }
                Err(e) => return Err(e),
            };
            let delta = factor.solve(&system.rhs);
            weights_in_effect.clone_from(&self.weights);

            let mut max_correction = 0.0f64;
            for (o, obs) in self.observations.observations.iter_mut().enumerate() {
                let d = system.matrix.segment(&delta, o);
                max_correction = d.iter().fold(max_correction, |m, v| m.max(v.abs()));
                obs.apply_corrections(&d);
            }
            let d = system.matrix.segment(&delta, self.observations.len());
            max_correction = d.iter().fold(max_correction, |m, v| m.max(v.abs()));
            self.target_parameters.apply_corrections(&mut self.target, &d);

            let ct = self.settings.coordinate_type_bundle;
            let hold_radius = ct == CoordinateType::Latitudinal
                && (!self.settings.solve_radius || self.target_parameters.solves_radii());
            for ps in &system.points {
                let dp = ps.back_substitute(&system.matrix, &delta);
                let point = &mut self.network.points[ps.point];
                let Some(current) = point.best_surface_point() else {
                    continue;
                };
                let before = current.coordinates(ct);
                let mut c = before + dp;
                if hold_radius {
                    c[2] = before[2];
                }
                max_correction = dp.iter().fold(max_correction, |m, v| m.max(v.abs()));
                let mut updated = from_coordinates(ct, &c);
                updated.covariance = current.covariance;
                point.adjusted = Some(updated);
            }
            if self.target_parameters.solves_radii() {
                self.project_points_on_target();
            }

            let (lin, network) = self.split();
            let usable = lin.compute_residuals(network);
            self.usable = usable;
            stats = self.linearizer().statistics(
                &self.network,
                &self.usable,
                &self.weights,
                &system.ill_conditioned,
            );

            let mut rejection_limit = None;
            let mut changed = false;
            if self.settings.outlier_rejection {
                let before = self.network.points.iter().filter(|p| p.jigsaw_rejected).count();
                if let Some(summary) =
                    flag_outliers(&mut self.network, &self.usable, self.settings.rejection_multiplier)
                {
                    changed = summary.changed(before);
                    rejection_limit = Some(summary.limit);
                    info!(
                        iteration,
                        limit = summary.limit,
                        rejected = summary.newly_rejected,
                        restored = summary.restored,
                        rejected_points = summary.rejected_points,
                        "outlier rejection"
                    );
                }
            }
            for &pi in &system.ill_conditioned {
                let point = &mut self.network.points[pi];
                if !point.jigsaw_rejected {
                    point.jigsaw_rejected = true;
                    flagged.push(pi);
                }
                if !ill_conditioned_points.contains(&point.id) {
                    ill_conditioned_points.push(point.id.clone());
                }
            }

            let rejected_measures = self
                .network
                .points
                .iter()
                .flat_map(|p| &p.measures)
                .filter(|m| !m.ignore && m.jigsaw_rejected)
                .count();
            info!(
                iteration,
                sigma0 = stats.sigma0,
                dof = stats.dof,
                active = stats.active_measures,
                rejected = rejected_measures,
                max_correction,
                "iteration complete"
            );
            records.push(IterationRecord {
                iteration,
                sigma0: stats.sigma0,
                vtpv: stats.vtpv,
                dof: stats.dof,
                active_measures: stats.active_measures,
                rejected_measures,
                ml_model: self.robust.active_model(),
                tweaking_constant: self.robust.tweaking_constant(),
                max_correction,
                rejection_limit,
            });
            progress.iteration_done(stats.sigma0);

            let converged = !changed
                && match self.settings.convergence_criteria {
                    ConvergenceCriteria::Sigma0 => {
                        stats.sigma0 <= threshold
                            || (previous.is_finite()
                                && (stats.sigma0 - previous).abs() / previous < threshold)
                    }
                    ConvergenceCriteria::ParameterCorrections => max_correction < threshold,
                };
            if converged {
                if !self.robust.on_converged() {
                    break BundleStatus::Converged;
                }
                previous = f64::INFINITY;
                increases = 0;
                self.update_weights();
                continue;
            }

            let stable = !changed && !self.robust.is_weighting();
            if stable && previous.is_finite() {
                if stats.sigma0 > previous * (1.0 + SIGMA0_INCREASE_TOLERANCE) {
                    increases += 1;
                } else {
                    increases = 0;
                }
            }
            if increases >= DIVERGENCE_STREAK {
                warn!(iteration, sigma0 = stats.sigma0, "sigma0 keeps increasing");
                break BundleStatus::Diverged(DivergenceReason::Sigma0Increase);
            }

            let was_weighting = self.robust.is_weighting();
            self.robust.end_of_iteration(iteration);
            previous = if !was_weighting && self.robust.is_weighting() {
                f64::INFINITY
            } else {
                stats.sigma0
            };
            if self.robust.is_weighting() {
                self.update_weights();
            }
        };
        progress.finish(&status.to_string());
        info!(%status, iterations = records.len(), sigma0 = stats.sigma0, "bundle finished");

        let mut error_propagation = false;
        if status.is_converged() && self.settings.error_propagation {
            error_propagation = self.propagate_errors(stats.sigma0);
        }

        let results = BundleResults {
            status,
            iterations: records,
            sigma0: stats.sigma0,
            dof: stats.dof,
            weights: weights_in_effect,
            ill_conditioned_points,
            error_propagation,
        };
        let lidar_ids = self.lidar.as_ref().map(LidarData::ids).unwrap_or_default();
        BundleSolutionInfo::new(
            self.settings,
            self.network,
            self.observations,
            self.images,
            self.target,
            self.target_parameters,
            results,
            lidar_ids,
        )
    }

    /// Put non-fixed points back on the (adjusted) target shape.
    fn project_points_on_target(&mut self) {
        for point in self
            .network
            .points
            .iter_mut()
            .filter(|p| !p.ignore && !p.is_fixed())
        {
            if let Some(current) = point.adjusted {
                let (lat, lon, _) = current.latitudinal();
                let c = Vector3::new(lat, lon, self.target.local_radius(lat, lon));
                let mut updated = from_coordinates(CoordinateType::Latitudinal, &c);
                updated.covariance = current.covariance;
                point.adjusted = Some(updated);
            }
        }
    }

    /// Recompute the maximum-likelihood weights from the current residuals.
    fn update_weights(&mut self) {
        let z: Vec<Option<f64>> = self
            .network
            .points
            .iter()
            .zip(&self.usable)
            .flat_map(|(p, usable)| {
                p.measures.iter().zip(usable).map(move |(m, ok)| {
                    (p.is_active() && m.is_active() && *ok).then(|| {
                        normalized_residual(
                            m.sample_residual,
                            m.line_residual,
                            m.sample_sigma,
                            m.line_sigma,
                        )
                    })
                })
            })
            .collect();
        let mut flat = self.robust.weights(&z).into_iter();
        for row in &mut self.weights {
            for w in row.iter_mut() {
                *w = flat.next().unwrap_or(1.0);
            }
        }
    }

    /// Adjusted sigmas and point covariances at the final state.
    ///
    /// Return
    /// ----------
    /// * `true` when the propagation succeeded.
    fn propagate_errors(&mut self, sigma0: f64) -> bool {
        let system = self
            .linearizer()
            .assemble(&self.network, &self.usable, &self.weights);
        let propagation = match propagate(&system, sigma0) {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "error propagation skipped");
                return false;
            }
        };
        let n_obs = self.observations.len();
        for (obs, sigmas) in self
            .observations
            .observations
            .iter_mut()
            .zip(&propagation.block_sigmas)
        {
            obs.adjusted_sigmas = Some(sigmas.clone());
        }
        self.target_parameters.adjusted_sigmas = propagation.block_sigmas.get(n_obs).cloned();

        let ct = self.settings.coordinate_type_bundle;
        for (pi, cov) in propagation.point_covariances {
            if let Some(adjusted) = self.network.points[pi].adjusted.as_mut() {
                adjusted.set_coordinate_covariance(ct, &cov);
            }
        }
        debug!("error propagation complete");
        true
    }
}
