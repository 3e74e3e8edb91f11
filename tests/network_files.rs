mod common;

use std::f64::consts::PI;

use approx::assert_relative_eq;
use camino::{Utf8Path, Utf8PathBuf};
use jigsaw::{
    bundle::{BundleAdjust, SolveContext},
    camera::polynomial::Polynomial,
    control::{ControlNetwork, ControlPointType},
    images::{ImageList, ImageRecord},
};
use serde_json::{json, Value};

use crate::common::*;

fn tempdir() -> (tempfile::TempDir, Utf8PathBuf) {
    let tmp = tempfile::tempdir().unwrap();
    let dir = Utf8PathBuf::from_path_buf(tmp.path().to_path_buf()).unwrap();
    (tmp, dir)
}

/// Legacy (version-less) record of a network: fixed points become `Ground`, free points `Tie`
/// without a priori coordinates.
fn legacy_record(net: &ControlNetwork) -> Value {
    let points: Vec<Value> = net
        .points
        .iter()
        .map(|p| {
            let measures: Vec<Value> = p
                .measures
                .iter()
                .map(|m| {
                    json!({
                        "serial_number": m.serial_number,
                        "measurement": {"sample": m.sample, "line": m.line},
                    })
                })
                .collect();
            match p.point_type {
                ControlPointType::Fixed => json!({
                    "id": p.id,
                    "type": "Ground",
                    "apriori": p.apriori,
                    "measures": measures,
                }),
                _ => json!({"id": p.id, "type": "Tie", "measures": measures}),
            }
        })
        .collect();
    json!({
        "network_id": net.network_id,
        "target_name": net.target_name,
        "points": points,
    })
}

#[test]
fn test_legacy_network_upgraded_and_solved() {
    let (_tmp, dir) = tempdir();
    let records = strip_records();
    let grid = ground_grid();
    let network = measured_network(&records, &grid);

    let path = dir.join("legacy.net");
    std::fs::write(&path, legacy_record(&network).to_string()).unwrap();
    let upgraded = ControlNetwork::from_file(&path).unwrap();
    assert_eq!(upgraded.version, 3);
    assert_eq!(upgraded.counts().fixed_points, 4);
    assert_eq!(upgraded.counts().free_points, grid.len() - 4);
    assert!(upgraded.points[CENTRE_INDEX].apriori.is_none());

    let ctx = SolveContext {
        settings: strip_settings().build().unwrap(),
        network: upgraded,
        images: ImageList::new(records).unwrap(),
        lidar: None,
    };
    let solution = BundleAdjust::new(ctx).unwrap().solve().unwrap();
    assert!(solution.results.status.is_converged());
    // tie points seeded from their first measure land on the truth
    for gp in &grid {
        assert!(point_error(&solution, gp) < 1.0e-3);
    }

    let out = dir.join("upgraded.net");
    solution.write_network(&out).unwrap();
    let content = std::fs::read_to_string(&out).unwrap();
    assert!(content.contains("\"version\": 3"));
    assert!(content.ends_with('\n'));
}

const CENTRE_INDEX: usize = 12;

fn write_records(dir: &Utf8Path, records: &[ImageRecord]) -> Vec<Utf8PathBuf> {
    records
        .iter()
        .enumerate()
        .map(|(i, r)| {
            let path = dir.join(format!("image_{i}.json"));
            r.to_file(&path).unwrap();
            path
        })
        .collect()
}

#[test]
fn test_list_files_and_table_update() {
    let (_tmp, dir) = tempdir();
    let mut records = strip_records();
    let grid = ground_grid();
    let network = measured_network(&records, &grid);
    records[2].pointing.ra = Polynomial::constant(PI - 3.0e-5, 20.0);

    write_records(&dir, &records);
    std::fs::write(
        dir.join("images.lis"),
        "# synthetic strip\nimage_0.json\n\nimage_1.json\nimage_2.json\n",
    )
    .unwrap();
    std::fs::write(dir.join("held.lis"), "image_0.json\n").unwrap();
    let cnet = dir.join("in.net");
    network.to_file(&cnet).unwrap();

    let images = ImageList::from_list_file(&dir.join("images.lis")).unwrap();
    assert_eq!(images.len(), 3);
    let held_serials = ImageList::read_held_list(&dir.join("held.lis")).unwrap();
    assert_eq!(held_serials, vec!["NAC/A".to_string()]);
    let held = images.held_observations(&held_serials, false).unwrap();

    let settings = strip_settings()
        .update_cube_label(true)
        .output_prefix(format!("{dir}/"))
        .build()
        .unwrap()
        .with_held_observations(held);
    let ctx = SolveContext {
        settings,
        network: ControlNetwork::from_file(&cnet).unwrap(),
        images,
        lidar: None,
    };
    let mut solution = BundleAdjust::new(ctx).unwrap().solve().unwrap();
    assert!(solution.results.status.is_converged());
    let paths = solution.write_reports().unwrap();
    assert!(paths.residuals.exists());
    assert_eq!(solution.update_images().unwrap(), 3);

    let updated = ImageRecord::from_file(&dir.join("image_2.json")).unwrap();
    assert_relative_eq!(updated.pointing.ra.evaluate(20.0), PI, epsilon = 1.0e-9);
    let tables = updated.tables.unwrap();
    assert!(tables.comment.starts_with("Adjusted by jigsaw"));
    assert_eq!(tables.pointing_cache.len(), 1);
    assert_eq!(tables.pointing_cache[0].time, 20.0);
    assert_relative_eq!(tables.position_cache[0].position[1], IMAGE_OFFSETS[2]);

    let held = ImageRecord::from_file(&dir.join("image_0.json")).unwrap();
    assert_eq!(held.pointing.ra.evaluate(0.0), PI);
}
