//! # Control network versions
//!
//! Three layouts exist on disk:
//!
//! * **V1 / V2** share one record layout. Points carry `type ∈ {Ground, Tie}` and every measure
//!   nests its pixel data in a `measurement` sub-record
//!   (`sample`, `line`, `sample_residual`, `line_residual`). A missing `version` field means V1.
//! * **V3** is the in-memory [`ControlNetwork`] layout: point types `Free | Constrained | Fixed`
//!   and flat measures.
//!
//! Upgrades are applied one step at a time (`V1 → V2 → V3`) and never drop information:
//! `Ground → Fixed`, `Tie → Free`, and any point whose a priori covariance is non-empty becomes
//! `Constrained`. Writing always emits V3 with a trailing newline, so reading and writing a V3
//! file reproduces it byte for byte.
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    constants::{CONTROL_NET_VERSION, DEFAULT_MEASURE_SIGMA},
    control::{
        surface_point::SurfacePoint, ControlMeasure, ControlNetwork, ControlPoint,
        ControlPointType, MeasureLogEntry, MeasureType,
    },
    jigsaw_errors::JigsawError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
enum LegacyPointType {
    Ground,
    Tie,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct LegacyMeasurement {
    sample: f64,
    line: f64,
    #[serde(default)]
    sample_residual: f64,
    #[serde(default)]
    line_residual: f64,
}

fn default_sigma() -> f64 {
    DEFAULT_MEASURE_SIGMA
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct LegacyMeasure {
    serial_number: String,
    #[serde(default)]
    measure_type: MeasureType,
    measurement: LegacyMeasurement,
    #[serde(default = "default_sigma")]
    sample_sigma: f64,
    #[serde(default = "default_sigma")]
    line_sigma: f64,
    #[serde(default)]
    ignore: bool,
    #[serde(default)]
    edit_lock: bool,
    #[serde(default)]
    jigsaw_rejected: bool,
    #[serde(default)]
    apriori_sample: Option<f64>,
    #[serde(default)]
    apriori_line: Option<f64>,
    #[serde(default)]
    log: Vec<MeasureLogEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct LegacyPoint {
    id: String,
    #[serde(rename = "type")]
    point_type: LegacyPointType,
    #[serde(default)]
    apriori: Option<SurfacePoint>,
    #[serde(default)]
    adjusted: Option<SurfacePoint>,
    #[serde(default)]
    ignore: bool,
    #[serde(default)]
    edit_lock: bool,
    #[serde(default)]
    jigsaw_rejected: bool,
    measures: Vec<LegacyMeasure>,
}

/// V1 and V2 network record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct LegacyNetwork {
    #[serde(default = "first_version")]
    version: u32,
    network_id: String,
    target_name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    created: String,
    #[serde(default)]
    modified: String,
    points: Vec<LegacyPoint>,
}

fn first_version() -> u32 {
    1
}

/// V1 → V2. The layouts are shared, only the version tag moves.
fn upgrade_v1(mut net: LegacyNetwork) -> LegacyNetwork {
    net.version = 2;
    net
}

/// V2 → V3.
fn upgrade_v2(net: LegacyNetwork) -> ControlNetwork {
    let points = net
        .points
        .into_iter()
        .map(|p| {
            let mut point_type = match p.point_type {
                LegacyPointType::Ground => ControlPointType::Fixed,
                LegacyPointType::Tie => ControlPointType::Free,
            };
            if p.apriori.is_some_and(|a| a.has_covariance()) {
                point_type = ControlPointType::Constrained;
            }
            ControlPoint {
                id: p.id,
                point_type,
                apriori: p.apriori,
                adjusted: p.adjusted,
                ignore: p.ignore,
                edit_lock: p.edit_lock,
                jigsaw_rejected: p.jigsaw_rejected,
                measures: p
                    .measures
                    .into_iter()
                    .map(|m| ControlMeasure {
                        serial_number: m.serial_number,
                        measure_type: m.measure_type,
                        sample: m.measurement.sample,
                        line: m.measurement.line,
                        sample_sigma: m.sample_sigma,
                        line_sigma: m.line_sigma,
                        sample_residual: m.measurement.sample_residual,
                        line_residual: m.measurement.line_residual,
                        ignore: m.ignore,
                        edit_lock: m.edit_lock,
                        jigsaw_rejected: m.jigsaw_rejected,
                        apriori_sample: m.apriori_sample,
                        apriori_line: m.apriori_line,
                        log: m.log,
                    })
                    .collect(),
            }
        })
        .collect();

    ControlNetwork {
        version: 3,
        network_id: net.network_id,
        target_name: net.target_name,
        description: net.description,
        created: net.created,
        modified: net.modified,
        points,
    }
}

/// Version tag of a serialized network (absent means 1).
pub fn detect_version(record: &Value) -> Result<u32, JigsawError> {
    match record.get("version") {
        None => Ok(1),
        Some(v) => v
            .as_u64()
            .and_then(|v| u32::try_from(v).ok())
            .ok_or_else(|| JigsawError::InvalidNetwork(format!("invalid version tag {v}"))),
    }
}

/// Parse a serialized network of any supported version into the current model.
///
/// Return
/// ----------
/// * The upgraded network, [`JigsawError::UnsupportedVersion`] for an unknown tag, or
///   [`JigsawError::Json`] for a malformed record.
pub fn read_network(content: &str) -> Result<ControlNetwork, JigsawError> {
    let record: Value = serde_json::from_str(content)?;
    match detect_version(&record)? {
        1 => {
            let legacy: LegacyNetwork = serde_json::from_value(record)?;
            Ok(upgrade_v2(upgrade_v1(legacy)))
        }
        2 => {
            let legacy: LegacyNetwork = serde_json::from_value(record)?;
            Ok(upgrade_v2(legacy))
        }
        CONTROL_NET_VERSION => Ok(serde_json::from_value(record)?),
        other => Err(JigsawError::UnsupportedVersion(other)),
    }
}

/// Serialize a network in the current layout.
pub fn write_network(net: &ControlNetwork) -> Result<String, JigsawError> {
    if net.version != CONTROL_NET_VERSION {
        let mut current = net.clone();
        current.version = CONTROL_NET_VERSION;
        return write_network(&current);
    }
    let mut out = serde_json::to_string_pretty(net)?;
    out.push('\n');
    Ok(out)
}
