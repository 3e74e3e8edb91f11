//! CSV artifacts: `residuals.csv`, `points.csv`, `images.csv` and `lidar.csv`.
//!
//! Every file has one header row. Angles are reported in degrees, distances in kilometers
//! except point sigmas and residuals (meters, pixels).
use std::io::Write;

use serde::Serialize;

use crate::{
    bundle::observation::{BundleObservation, ObservationParameter},
    constants::{DEGRAD, KM_PER_M},
    control::{ControlNetwork, ControlPoint},
    images::ImageList,
    jigsaw_errors::JigsawError,
    settings::CoordinateType,
    solution::BundleSolutionInfo,
};

#[derive(Debug, Serialize)]
struct ResidualRow<'a> {
    point_id: &'a str,
    serial_number: &'a str,
    sample: f64,
    line: f64,
    sample_residual: f64,
    line_residual: f64,
    residual_magnitude: f64,
    weight: f64,
    rejected: &'static str,
}

#[derive(Debug, Serialize)]
struct LatitudinalPointRow<'a> {
    point_id: &'a str,
    status: String,
    active_measures: usize,
    rejected_measures: usize,
    residual_rms: f64,
    latitude_deg: f64,
    longitude_deg: f64,
    radius_km: f64,
    latitude_sigma_m: Option<f64>,
    longitude_sigma_m: Option<f64>,
    radius_sigma_m: Option<f64>,
    latitude_correction_m: f64,
    longitude_correction_m: f64,
    radius_correction_m: f64,
}

#[derive(Debug, Serialize)]
struct RectangularPointRow<'a> {
    point_id: &'a str,
    status: String,
    active_measures: usize,
    rejected_measures: usize,
    residual_rms: f64,
    x_km: f64,
    y_km: f64,
    z_km: f64,
    x_sigma_m: Option<f64>,
    y_sigma_m: Option<f64>,
    z_sigma_m: Option<f64>,
    x_correction_m: f64,
    y_correction_m: f64,
    z_correction_m: f64,
}

#[derive(Debug, Serialize)]
struct ImageParameterRow<'a> {
    serial_number: &'a str,
    observation_number: &'a str,
    parameter: String,
    unit: &'static str,
    apriori: f64,
    correction: f64,
    adjusted: f64,
    apriori_sigma: Option<f64>,
    adjusted_sigma: Option<f64>,
}

#[derive(Debug, Serialize)]
struct LidarRow<'a> {
    point_id: &'a str,
    latitude_deg: f64,
    longitude_deg: f64,
    radius_km: f64,
    active_measures: usize,
    rejected_measures: usize,
    residual_rms: f64,
}

fn rejected_flag(rejected: bool) -> &'static str {
    if rejected {
        "*"
    } else {
        ""
    }
}

/// RMS of the residual magnitudes of the active measures of a point.
fn residual_rms(point: &ControlPoint) -> f64 {
    let (n, sum) = point
        .measures
        .iter()
        .filter(|m| m.is_active())
        .fold((0usize, 0.0), |(n, s), m| {
            (n + 1, s + m.sample_residual.powi(2) + m.line_residual.powi(2))
        });
    if n == 0 {
        0.0
    } else {
        (sum / n as f64).sqrt()
    }
}

fn rejected_count(point: &ControlPoint) -> usize {
    point
        .measures
        .iter()
        .filter(|m| !m.ignore && m.jigsaw_rejected)
        .count()
}

/// One row per non-ignored measure of a non-ignored point.
pub fn write_residuals<W: Write>(solution: &BundleSolutionInfo, out: W) -> Result<(), JigsawError> {
    let mut wtr = csv::Writer::from_writer(out);
    for (pi, point) in solution.network.points.iter().enumerate() {
        if point.ignore {
            continue;
        }
        for (mi, m) in point.measures.iter().enumerate() {
            if m.ignore {
                continue;
            }
            wtr.serialize(ResidualRow {
                point_id: &point.id,
                serial_number: &m.serial_number,
                sample: m.sample,
                line: m.line,
                sample_residual: m.sample_residual,
                line_residual: m.line_residual,
                residual_magnitude: m.residual_magnitude(),
                weight: solution.results.measure_weight(pi, mi),
                rejected: rejected_flag(m.jigsaw_rejected || point.jigsaw_rejected),
            })?;
        }
    }
    wtr.flush()?;
    Ok(())
}

/// Adjusted coordinates, sigmas and corrections of every non-ignored point.
///
/// Coordinates are given in the report coordinate type; corrections are the adjusted minus
/// a priori coordinates expressed in meters.
pub fn write_points<W: Write>(
    network: &ControlNetwork,
    coordinate_type: CoordinateType,
    skip: &[String],
    out: W,
) -> Result<(), JigsawError> {
    let mut wtr = csv::Writer::from_writer(out);
    for point in network.points.iter().filter(|p| !p.ignore) {
        if skip.contains(&point.id) {
            continue;
        }
        let Some(adjusted) = point.best_surface_point() else {
            continue;
        };
        let apriori = point.apriori.unwrap_or(adjusted);
        let sigmas = adjusted.sigmas_m(coordinate_type);
        let sigma = |i: usize| sigmas.map(|s| s[i]);
        let status = if point.jigsaw_rejected {
            format!("{} (rejected)", point.point_type)
        } else {
            point.point_type.to_string()
        };
        let active_measures = point.number_of_active_measures();
        match coordinate_type {
            CoordinateType::Latitudinal => {
                let (lat, lon, r) = adjusted.latitudinal();
                let (alat, alon, ar) = apriori.latitudinal();
                let dlon = crate::bundle::normals::wrap_angle(lon - alon);
                wtr.serialize(LatitudinalPointRow {
                    point_id: &point.id,
                    status,
                    active_measures,
                    rejected_measures: rejected_count(point),
                    residual_rms: residual_rms(point),
                    latitude_deg: lat * DEGRAD,
                    longitude_deg: lon * DEGRAD,
                    radius_km: r * KM_PER_M,
                    latitude_sigma_m: sigma(0),
                    longitude_sigma_m: sigma(1),
                    radius_sigma_m: sigma(2),
                    latitude_correction_m: (lat - alat) * r,
                    longitude_correction_m: dlon * r * lat.cos(),
                    radius_correction_m: r - ar,
                })?;
            }
            CoordinateType::Rectangular => {
                let d = adjusted.position() - apriori.position();
                wtr.serialize(RectangularPointRow {
                    point_id: &point.id,
                    status,
                    active_measures,
                    rejected_measures: rejected_count(point),
                    residual_rms: residual_rms(point),
                    x_km: adjusted.x * KM_PER_M,
                    y_km: adjusted.y * KM_PER_M,
                    z_km: adjusted.z * KM_PER_M,
                    x_sigma_m: sigma(0),
                    y_sigma_m: sigma(1),
                    z_sigma_m: sigma(2),
                    x_correction_m: d.x,
                    y_correction_m: d.y,
                    z_correction_m: d.z,
                })?;
            }
        }
    }
    wtr.flush()?;
    Ok(())
}

/// Display unit and scale of an observation parameter.
pub fn parameter_unit(parameter: &ObservationParameter) -> (&'static str, f64) {
    match parameter {
        ObservationParameter::Position { .. } => ("km", KM_PER_M),
        ObservationParameter::Pointing { .. } => ("deg", DEGRAD),
        ObservationParameter::Csm { .. } => ("", 1.0),
    }
}

fn observation_rows<'a>(
    obs: &'a BundleObservation,
    serial_number: &'a str,
) -> impl Iterator<Item = ImageParameterRow<'a>> + 'a {
    (0..obs.parameter_count()).map(move |k| {
        let (unit, scale) = parameter_unit(&obs.layout[k]);
        let adjusted = obs.parameter_value(k);
        let correction = obs.corrections[k];
        ImageParameterRow {
            serial_number,
            observation_number: &obs.observation_number,
            parameter: obs.parameter_name(k),
            unit,
            apriori: (adjusted - correction) * scale,
            correction: correction * scale,
            adjusted: adjusted * scale,
            apriori_sigma: obs.apriori_sigmas[k].map(|s| s * scale),
            adjusted_sigma: obs
                .adjusted_sigmas
                .as_ref()
                .and_then(|s| s.get(k))
                .map(|s| s * scale),
        }
    })
}

/// One row per (image, parameter) of every adjusted image.
pub fn write_images<W: Write>(solution: &BundleSolutionInfo, images: &ImageList, out: W) -> Result<(), JigsawError> {
    let mut wtr = csv::Writer::from_writer(out);
    for obs in solution.observations.iter() {
        for image in &obs.image_indices {
            let serial = &images.records()[*image].serial_number;
            for row in observation_rows(obs, serial) {
                wtr.serialize(row)?;
            }
        }
    }
    wtr.flush()?;
    Ok(())
}

/// Adjusted lidar points.
pub fn write_lidar<W: Write>(network: &ControlNetwork, lidar_ids: &[String], out: W) -> Result<(), JigsawError> {
    let mut wtr = csv::Writer::from_writer(out);
    for point in network.points.iter().filter(|p| lidar_ids.contains(&p.id)) {
        let Some(sp) = point.best_surface_point() else {
            continue;
        };
        let (lat, lon, r) = sp.latitudinal();
        wtr.serialize(LidarRow {
            point_id: &point.id,
            latitude_deg: lat * DEGRAD,
            longitude_deg: lon * DEGRAD,
            radius_km: r * KM_PER_M,
            active_measures: point.number_of_active_measures(),
            rejected_measures: rejected_count(point),
            residual_rms: residual_rms(point),
        })?;
    }
    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::{surface_point::SurfacePoint, ControlMeasure, ControlPointType};

    fn network() -> ControlNetwork {
        let mut net = ControlNetwork::new("n", "Moon");
        let sp = SurfacePoint::from_latitudinal(0.0, 0.0, 1_737_400.0);
        let mut p = ControlPoint::new("p1", ControlPointType::Free).with_apriori(sp);
        let mut adjusted = sp;
        adjusted.x += 10.0;
        p.adjusted = Some(adjusted);
        let mut m = ControlMeasure::new("img1", 10.0, 20.0);
        m.sample_residual = 3.0;
        m.line_residual = 4.0;
        p.measures.push(m);
        let mut rejected = ControlMeasure::new("img2", 1.0, 2.0);
        rejected.jigsaw_rejected = true;
        p.measures.push(rejected);
        net.points.push(p);
        net
    }

    #[test]
    fn test_points_report_radius_correction() {
        let mut buf = Vec::new();
        write_points(&network(), CoordinateType::Latitudinal, &[], &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let mut lines = text.lines();
        assert!(lines.next().unwrap().starts_with("point_id,status,active_measures"));
        let row: Vec<&str> = lines.next().unwrap().split(',').collect();
        assert_eq!(row[0], "p1");
        assert_eq!(row[2], "1");
        assert_eq!(row[3], "1");
        assert_eq!(row[4], "5.0");
        let dr: f64 = row[13].parse().unwrap();
        assert!((dr - 10.0).abs() < 1e-6);
    }

    #[test]
    fn test_lidar_rows_only_for_lidar_points() {
        let mut buf = Vec::new();
        write_lidar(&network(), &["other".to_string()], &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text.lines().count(), 0);
    }
}
