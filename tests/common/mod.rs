#![allow(dead_code)]

use std::f64::consts::PI;

use approx::assert_relative_eq;
use jigsaw::{
    bundle::{BundleAdjust, SolveContext},
    camera::{framing::FramingCamera, polynomial::Polynomial, target::TargetBody, CameraModel, ImageCoordinate},
    control::{surface_point::SurfacePoint, ControlMeasure, ControlNetwork, ControlPoint, ControlPointType},
    images::{ImageList, ImageRecord, PointingTable, PositionTable},
    settings::{
        observation_solve::{ObservationSolveSettings, PointingSolveOption},
        BundleSettings, BundleSettingsBuilder,
    },
    solution::BundleSolutionInfo,
};
use rand::{rngs::StdRng, SeedableRng};
use rand_distr::{Distribution, Normal};

pub const MOON_RADIUS: f64 = 1_737_400.0;
pub const ALTITUDE: f64 = 100_000.0;

/// Along-track offsets (meters) of the three images of the synthetic strip.
pub const IMAGE_OFFSETS: [f64; 3] = [-300.0, 0.0, 300.0];
pub const SERIALS: [&str; 3] = ["NAC/A", "NAC/B", "NAC/C"];

/// Nadir-looking framing image above `(R + h, y, 0)`, boresight along `-x`.
pub fn nadir_record(serial: &str, y: f64, time: f64) -> ImageRecord {
    ImageRecord {
        serial_number: serial.into(),
        observation_number: None,
        instrument_id: "NAC".into(),
        time,
        camera: CameraModel::Framing(FramingCamera::new(500.0, 0.01, 512.5, 512.5)),
        target: TargetBody::sphere("Moon", MOON_RADIUS),
        pointing: PointingTable {
            ra: Polynomial::constant(PI, time),
            dec: Polynomial::constant(0.0, time),
            twist: Polynomial::constant(0.0, time),
        },
        position: PositionTable {
            x: Polynomial::constant(MOON_RADIUS + ALTITUDE, time),
            y: Polynomial::constant(y, time),
            z: Polynomial::constant(0.0, time),
        },
        tables: None,
    }
}

pub fn strip_records() -> Vec<ImageRecord> {
    SERIALS
        .iter()
        .zip(IMAGE_OFFSETS)
        .enumerate()
        .map(|(i, (s, y))| nadir_record(s, y, 10.0 * i as f64))
        .collect()
}

/// Four images 200 m apart. Every point of [`ground_grid`] is seen by all of them.
pub fn four_image_records() -> Vec<ImageRecord> {
    ["NAC/A", "NAC/B", "NAC/C", "NAC/D"]
        .iter()
        .zip([-300.0, -100.0, 100.0, 300.0])
        .enumerate()
        .map(|(i, (s, y))| nadir_record(s, y, 10.0 * i as f64))
        .collect()
}

#[derive(Debug, Clone)]
pub struct GroundPoint {
    pub id: String,
    pub point_type: ControlPointType,
    pub truth: SurfacePoint,
}

/// 5×5 grid of surface points spanning ±600 m around the sub-spacecraft point. The four
/// corners are fixed, every other point is free.
pub fn ground_grid() -> Vec<GroundPoint> {
    let steps = [-600.0, -300.0, 0.0, 300.0, 600.0];
    let mut out = Vec::new();
    for (i, z) in steps.iter().enumerate() {
        for (j, y) in steps.iter().enumerate() {
            let corner = (i == 0 || i == 4) && (j == 0 || j == 4);
            out.push(GroundPoint {
                id: format!("P{i}{j}"),
                point_type: if corner {
                    ControlPointType::Fixed
                } else {
                    ControlPointType::Free
                },
                truth: SurfacePoint::from_latitudinal(
                    (z / MOON_RADIUS).asin(),
                    y / MOON_RADIUS,
                    MOON_RADIUS,
                ),
            });
        }
    }
    out
}

pub fn project(record: &ImageRecord, point: &SurfacePoint) -> ImageCoordinate {
    let eo = record.exterior_orientation();
    record
        .camera
        .as_camera()
        .ground_to_image(&eo, &point.position())
        .expect("ground point should be in front of the camera")
}

/// Exact measures of every ground point in every record, a priori coordinates set to the truth.
pub fn measured_network(records: &[ImageRecord], points: &[GroundPoint]) -> ControlNetwork {
    let mut net = ControlNetwork::new("synthetic strip", "Moon");
    for gp in points {
        let mut point = ControlPoint::new(gp.id.clone(), gp.point_type).with_apriori(gp.truth);
        for record in records {
            let c = project(record, &gp.truth);
            point = point.with_measure(ControlMeasure::new(record.serial_number.clone(), c.sample, c.line));
        }
        net.points.push(point);
    }
    net
}

/// Add Gaussian noise of `sigma` pixels to every measure and set its sigma accordingly.
pub fn add_noise(net: &mut ControlNetwork, sigma: f64, seed: u64) {
    let mut rng = StdRng::seed_from_u64(seed);
    let normal = Normal::new(0.0, sigma).unwrap();
    for m in net.points.iter_mut().flat_map(|p| p.measures.iter_mut()) {
        m.sample += normal.sample(&mut rng);
        m.line += normal.sample(&mut rng);
        m.sample_sigma = sigma;
        m.line_sigma = sigma;
    }
}

/// Gaussian noise of `noise` pixels on every measure, measure sigmas left at one pixel.
pub fn add_unit_sigma_noise(net: &mut ControlNetwork, noise: f64, seed: u64) {
    add_noise(net, noise, seed);
    for m in net.points.iter_mut().flat_map(|p| p.measures.iter_mut()) {
        m.sample_sigma = 1.0;
        m.line_sigma = 1.0;
    }
}

/// Shift the sample of one measure of each of the first `count` free points by `shift` pixels.
///
/// Return
/// ----------
/// * The `(point, measure)` indices of the shifted measures.
pub fn contaminate(net: &mut ControlNetwork, count: usize, shift: f64) -> Vec<(usize, usize)> {
    let picks: Vec<(usize, usize)> = net
        .points
        .iter()
        .enumerate()
        .filter(|(_, p)| p.point_type == ControlPointType::Free)
        .take(count)
        .map(|(pi, p)| (pi, pi % p.measures.len()))
        .collect();
    for &(pi, mi) in &picks {
        net.points[pi].measures[mi].sample += shift;
    }
    picks
}

/// Shift the a priori of every free point by `shift` meters in latitude and longitude.
pub fn perturb_free_points(net: &mut ControlNetwork, shift: f64) {
    for point in net.points.iter_mut().filter(|p| p.point_type == ControlPointType::Free) {
        if let Some(apriori) = point.apriori {
            let (lat, lon, r) = apriori.latitudinal();
            point.apriori = Some(SurfacePoint::from_latitudinal(
                lat + shift / r,
                lon + shift / r,
                r,
            ));
        }
    }
}

pub fn angles_only(solve_twist: bool) -> ObservationSolveSettings {
    ObservationSolveSettings::builder("NAC")
        .pointing(PointingSolveOption::AnglesOnly)
        .solve_twist(solve_twist)
        .build()
        .unwrap()
}

/// Latitudinal bundle solving ra/dec/twist of every image, σ₀ threshold 1e-6.
pub fn strip_settings() -> BundleSettingsBuilder {
    BundleSettings::builder()
        .observation_solve_settings(angles_only(true))
        .convergence_threshold(1.0e-6)
        .max_iterations(30)
}

pub fn solve(records: Vec<ImageRecord>, network: ControlNetwork, settings: BundleSettings) -> BundleSolutionInfo {
    let ctx = SolveContext {
        settings,
        network,
        images: ImageList::new(records).unwrap(),
        lidar: None,
    };
    BundleAdjust::new(ctx).unwrap().solve().unwrap()
}

/// Distance in meters between a point's adjusted coordinates and the truth.
pub fn point_error(solution: &BundleSolutionInfo, gp: &GroundPoint) -> f64 {
    let point = solution
        .network
        .points
        .iter()
        .find(|p| p.id == gp.id)
        .unwrap();
    (point.best_surface_point().unwrap().position() - gp.truth.position()).norm()
}

pub fn assert_same_coordinates(a: &ControlNetwork, b: &ControlNetwork, epsilon: f64) {
    assert_eq!(a.points.len(), b.points.len());
    for (pa, pb) in a.points.iter().zip(&b.points) {
        assert_eq!(pa.id, pb.id);
        let sa = pa.best_surface_point().unwrap();
        let sb = pb.best_surface_point().unwrap();
        assert_relative_eq!(sa.x, sb.x, epsilon = epsilon);
        assert_relative_eq!(sa.y, sb.y, epsilon = epsilon);
        assert_relative_eq!(sa.z, sb.z, epsilon = epsilon);
        assert_eq!(pa.measures.len(), pb.measures.len());
        for (ma, mb) in pa.measures.iter().zip(&pb.measures) {
            assert_eq!(ma.serial_number, mb.serial_number);
            assert_eq!(ma.sample.to_bits(), mb.sample.to_bits());
            assert_eq!(ma.line.to_bits(), mb.line.to_bits());
        }
    }
}
