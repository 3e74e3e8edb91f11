use std::f64::consts::PI;

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use nalgebra::DMatrix;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use jigsaw::{
    bundle::{sparse::SparseBlockMatrix, BundleAdjust, SolveContext},
    camera::{framing::FramingCamera, polynomial::Polynomial, target::TargetBody, CameraModel},
    control::{surface_point::SurfacePoint, ControlMeasure, ControlNetwork, ControlPoint, ControlPointType},
    images::{ImageList, ImageRecord, PointingTable, PositionTable},
    settings::{observation_solve::ObservationSolveSettings, BundleSettings},
};

const RADIUS: f64 = 1_737_400.0;
const ALTITUDE: f64 = 100_000.0;

/// Strip of `n_images` nadir frames 400 m apart with a 2 km wide band of tie points.
fn strip(n_images: usize, n_points: usize, rng: &mut StdRng) -> (ImageList, ControlNetwork) {
    let records: Vec<ImageRecord> = (0..n_images)
        .map(|i| {
            let t = i as f64;
            ImageRecord {
                serial_number: format!("NAC/{i:04}"),
                observation_number: None,
                instrument_id: "NAC".into(),
                time: t,
                camera: CameraModel::Framing(FramingCamera::new(500.0, 0.01, 512.5, 512.5)),
                target: TargetBody::sphere("Moon", RADIUS),
                pointing: PointingTable {
                    ra: Polynomial::constant(PI, t),
                    dec: Polynomial::constant(0.0, t),
                    twist: Polynomial::constant(0.0, t),
                },
                position: PositionTable {
                    x: Polynomial::constant(RADIUS + ALTITUDE, t),
                    y: Polynomial::constant(400.0 * t, t),
                    z: Polynomial::constant(0.0, t),
                },
                tables: None,
            }
        })
        .collect();

    let length = 400.0 * (n_images - 1) as f64;
    let mut net = ControlNetwork::new("bench", "Moon");
    for p in 0..n_points {
        let y = rng.random_range(0.0..=length);
        let z = rng.random_range(-600.0..=600.0);
        let truth = SurfacePoint::from_latitudinal((z / RADIUS).asin(), y / RADIUS, RADIUS);
        let point_type = if p % 10 == 0 {
            ControlPointType::Fixed
        } else {
            ControlPointType::Free
        };
        let mut point = ControlPoint::new(format!("P{p:05}"), point_type).with_apriori(truth);
        for r in &records {
            let eo = r.exterior_orientation();
            if let Some(c) = r.camera.as_camera().ground_to_image(&eo, &truth.position()) {
                if (1.0..=1024.0).contains(&c.sample) && (1.0..=1024.0).contains(&c.line) {
                    let noise_s: f64 = rng.random_range(-0.2..0.2);
                    let noise_l: f64 = rng.random_range(-0.2..0.2);
                    point = point.with_measure(ControlMeasure::new(
                        r.serial_number.clone(),
                        c.sample + noise_s,
                        c.line + noise_l,
                    ));
                }
            }
        }
        if point.measures.len() >= 2 {
            net.points.push(point);
        }
    }
    (ImageList::new(records).unwrap(), net)
}

fn bench_solve(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(0x5EED);
    let (images, network) = strip(20, 800, &mut rng);
    let settings = BundleSettings::builder()
        .observation_solve_settings(ObservationSolveSettings::builder("NAC").build().unwrap())
        .convergence_threshold(1.0e-6)
        .max_iterations(10)
        .build()
        .unwrap();

    c.bench_function("bundle/strip_20_images_800_points", |b| {
        b.iter_batched(
            || SolveContext {
                settings: settings.clone(),
                network: network.clone(),
                images: images.clone(),
                lidar: None,
            },
            |ctx| {
                let solution = BundleAdjust::new(ctx).unwrap().solve().unwrap();
                black_box(solution.results.sigma0)
            },
            BatchSize::LargeInput,
        )
    });
}

/// Banded SPD block matrix: each block couples with its two successors.
fn banded(n_blocks: usize, size: usize, rng: &mut StdRng) -> SparseBlockMatrix {
    let mut m = SparseBlockMatrix::new(vec![size; n_blocks]);
    for i in 0..n_blocks {
        let a = DMatrix::from_fn(size, size, |_, _| rng.random_range(-1.0..1.0));
        m.add_block(i, i, &(&a * a.transpose() + DMatrix::identity(size, size) * 10.0 * size as f64));
        for j in i + 1..(i + 3).min(n_blocks) {
            let off = DMatrix::from_fn(size, size, |_, _| rng.random_range(-0.1..0.1));
            m.add_block(i, j, &off);
        }
    }
    m
}

fn bench_factor(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(0xB10C);
    let matrix = banded(500, 6, &mut rng);
    let rhs = nalgebra::DVector::from_fn(matrix.dimension(), |_, _| rng.random_range(-1.0..1.0));

    c.bench_function("sparse/factor_solve_500x6", |b| {
        b.iter(|| {
            let factor = matrix.factor().unwrap();
            black_box(factor.solve(black_box(&rhs)))
        })
    });
}

criterion_group!(benches, bench_solve, bench_factor);
criterion_main!(benches);
