//! # Outlier rejection
//!
//! After each iteration the residual magnitudes of the active measures are summarised by their
//! median and scaled median absolute deviation, and the rejection limit is
//!
//! ```text
//! limit = median + multiplier · 1.4826 · MAD
//! ```
//!
//! Then, point by point:
//!
//! * rejected measures back under the limit are restored,
//! * the worst active measure above the limit is rejected, only if at least two active measures
//!   remain afterwards,
//! * a point left with fewer than two active measures is itself rejected.
//!
//! Edit-locked points and measures are never rejected. Ignored entities are untouched.
use tracing::debug;

use crate::{bundle::robust::quantile, constants::MAD_SCALE, control::ControlNetwork};

/// Outcome of one rejection pass.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RejectionSummary {
    pub median: f64,
    pub mad: f64,
    pub limit: f64,
    pub newly_rejected: usize,
    pub restored: usize,
    pub rejected_measures: usize,
    pub rejected_points: usize,
}

impl RejectionSummary {
    /// True when the set of rejected measures or points changed.
    pub fn changed(&self, points_before: usize) -> bool {
        self.newly_rejected > 0 || self.restored > 0 || self.rejected_points != points_before
    }
}

/// Flag outlying measures.
///
/// Arguments
/// -----------------
/// * `network`: residuals must be up to date.
/// * `usable`: `usable[p][m]` is false for measures without a residual (unresolved image,
///   failed projection).
/// * `multiplier`: rejection multiplier.
///
/// Return
/// ----------
/// * The statistics and counts of the pass, or `None` when no active measure exists.
pub fn flag_outliers(
    network: &mut ControlNetwork,
    usable: &[Vec<bool>],
    multiplier: f64,
) -> Option<RejectionSummary> {
    let mut magnitudes: Vec<f64> = network
        .points
        .iter()
        .zip(usable)
        .filter(|(p, _)| !p.ignore)
        .flat_map(|(p, u)| {
            p.measures
                .iter()
                .zip(u)
                .filter(|(m, ok)| **ok && !m.ignore && !m.jigsaw_rejected)
                .map(|(m, _)| m.residual_magnitude())
        })
        .collect();
    let median = quantile(&mut magnitudes, 0.5)?;
    let mut deviations: Vec<f64> = magnitudes.iter().map(|m| (m - median).abs()).collect();
    let mad = quantile(&mut deviations, 0.5).unwrap_or(0.0) * MAD_SCALE;
    let limit = median + multiplier * mad;

    let mut summary = RejectionSummary {
        median,
        mad,
        limit,
        ..Default::default()
    };

    for (point, usable) in network.points.iter_mut().zip(usable) {
        if point.ignore {
            continue;
        }
        let mut active = 0usize;
        let mut worst: Option<(usize, f64)> = None;
        for (mi, (m, ok)) in point.measures.iter_mut().zip(usable).enumerate() {
            if !*ok || m.ignore {
                continue;
            }
            let mag = m.residual_magnitude();
            if mag <= limit {
                if m.jigsaw_rejected {
                    m.jigsaw_rejected = false;
                    summary.restored += 1;
                }
                active += 1;
            } else if !m.jigsaw_rejected {
                active += 1;
                if !m.edit_lock && !point.edit_lock && worst.map_or(true, |(_, w)| mag > w) {
                    worst = Some((mi, mag));
                }
            }
        }
        if let Some((mi, mag)) = worst {
            if active >= 3 {
                point.measures[mi].jigsaw_rejected = true;
                active -= 1;
                summary.newly_rejected += 1;
                debug!(point = %point.id, measure = %point.measures[mi].serial_number, residual = mag, "measure rejected");
            }
        }
        point.jigsaw_rejected = active < 2 && !point.edit_lock;
        if point.jigsaw_rejected {
            summary.rejected_points += 1;
        }
        summary.rejected_measures += point
            .measures
            .iter()
            .filter(|m| !m.ignore && m.jigsaw_rejected)
            .count();
    }
    Some(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::{ControlMeasure, ControlPoint, ControlPointType};

    fn network(residuals: &[&[f64]]) -> (ControlNetwork, Vec<Vec<bool>>) {
        let mut net = ControlNetwork::new("n", "Moon");
        for (k, point) in residuals.iter().enumerate() {
            let mut p = ControlPoint::new(format!("p{k}"), ControlPointType::Fixed);
            for (j, r) in point.iter().enumerate() {
                let mut m = ControlMeasure::new(format!("img{j}"), 0.0, 0.0);
                m.sample_residual = *r;
                p.measures.push(m);
            }
            net.points.push(p);
        }
        let usable = net.points.iter().map(|p| vec![true; p.measures.len()]).collect();
        (net, usable)
    }

    #[test]
    fn test_worst_measure_is_rejected() {
        let (mut net, usable) = network(&[
            &[0.1, 0.2, 0.15, 50.0],
            &[0.12, 0.1, 0.2, 0.18],
            &[0.11, 0.16, 0.14, 0.13],
        ]);
        let s = flag_outliers(&mut net, &usable, 3.0).unwrap();
        assert_eq!(s.newly_rejected, 1);
        assert!(net.points[0].measures[3].jigsaw_rejected);
        assert!(!net.points[0].jigsaw_rejected);
        assert_eq!(s.rejected_measures, 1);
    }

    #[test]
    fn test_two_measure_points_are_kept() {
        let (mut net, usable) = network(&[&[0.1, 40.0], &[0.1, 0.2], &[0.15, 0.12]]);
        let s = flag_outliers(&mut net, &usable, 3.0).unwrap();
        assert_eq!(s.newly_rejected, 0);
        assert!(!net.points[0].measures[1].jigsaw_rejected);
    }

    #[test]
    fn test_rejected_measure_is_restored_under_the_limit() {
        let (mut net, usable) = network(&[&[0.1, 0.2, 0.15], &[0.1, 0.2, 0.15]]);
        net.points[1].measures[0].jigsaw_rejected = true;
        let s = flag_outliers(&mut net, &usable, 3.0).unwrap();
        assert_eq!(s.restored, 1);
        assert!(!net.points[1].measures[0].jigsaw_rejected);
    }

    #[test]
    fn test_edit_locked_measure_is_never_rejected() {
        let (mut net, usable) = network(&[
            &[0.1, 0.2, 0.15, 50.0],
            &[0.12, 0.1, 0.2, 0.18],
            &[0.11, 0.16, 0.14, 0.13],
        ]);
        net.points[0].measures[3].edit_lock = true;
        let s = flag_outliers(&mut net, &usable, 3.0).unwrap();
        // the locked measure is the only one above the limit
        assert!(s.limit < 1.0);
        assert_eq!(s.newly_rejected, 0);
        assert!(!net.points[0].measures[3].jigsaw_rejected);
        assert!(!net.points[0].jigsaw_rejected);
    }

    #[test]
    fn test_locked_measure_skipped_for_the_next_worst() {
        let (mut net, usable) = network(&[&[0.1, 0.2, 0.15, 50.0], &[0.1, 0.1, 0.1, 0.1]]);
        net.points[0].measures[3].edit_lock = true;
        let s = flag_outliers(&mut net, &usable, 3.0).unwrap();
        // zero spread: the limit collapses onto the median
        assert_eq!(s.mad, 0.0);
        assert_eq!(s.newly_rejected, 1);
        assert!(!net.points[0].measures[3].jigsaw_rejected);
        assert!(net.points[0].measures[1].jigsaw_rejected);
    }
}
