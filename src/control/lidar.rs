//! # Lidar control points
//!
//! Lidar shots are surface points measured by an altimeter and observed in one or more images.
//! They enter the bundle on equal terms with ordinary control points: each record is converted
//! into a [`ControlPoint`] (Constrained when it carries a covariance, Free otherwise) and the
//! ids are remembered so the solution can report them separately in `lidar.csv`.
//!
//! ## Formats
//!
//! * **JSON**: `{"points": [LidarPoint, …]}`.
//! * **Binary** (little-endian):
//!
//! ```text
//! magic      : b"JLID"
//! version    : u32 (= 1)
//! n_points   : u32
//! per point:
//!   id_len u32, id bytes (UTF-8)
//!   x, y, z    : f64 (meters, body-fixed)
//!   range      : f64 (meters), sigma_range : f64
//!   has_cov    : u8, then 9 × f64 (row-major, m²) when has_cov = 1
//!   n_measures : u32
//!   per measure:
//!     serial_len u32, serial bytes
//!     sample, line, sample_sigma, line_sigma : f64
//! ```
use camino::Utf8Path;
use nom::{
    bytes::complete::{tag, take},
    multi::count,
    number::complete::{le_f64, le_u32, le_u8},
    IResult, Parser,
};
use serde::{Deserialize, Serialize};

use crate::{
    control::{surface_point::SurfacePoint, ControlMeasure, ControlPoint, ControlPointType},
    jigsaw_errors::JigsawError,
};

const MAGIC: &[u8; 4] = b"JLID";
const BINARY_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LidarMeasure {
    pub serial_number: String,
    pub sample: f64,
    pub line: f64,
    #[serde(default = "unit")]
    pub sample_sigma: f64,
    #[serde(default = "unit")]
    pub line_sigma: f64,
}

fn unit() -> f64 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LidarPoint {
    pub id: String,
    pub point: SurfacePoint,
    /// Spacecraft-to-surface range, meters.
    #[serde(default)]
    pub range: f64,
    #[serde(default)]
    pub sigma_range: f64,
    pub measures: Vec<LidarMeasure>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LidarData {
    pub points: Vec<LidarPoint>,
}

fn parse_string(input: &[u8]) -> IResult<&[u8], String> {
    let (input, len) = le_u32(input)?;
    let (input, bytes) = take(len as usize)(input)?;
    Ok((input, String::from_utf8_lossy(bytes).into_owned()))
}

fn parse_measure(input: &[u8]) -> IResult<&[u8], LidarMeasure> {
    let (input, serial_number) = parse_string(input)?;
    let (input, values) = count(le_f64, 4).parse(input)?;
    Ok((
        input,
        LidarMeasure {
            serial_number,
            sample: values[0],
            line: values[1],
            sample_sigma: values[2],
            line_sigma: values[3],
        },
    ))
}

fn parse_point(input: &[u8]) -> IResult<&[u8], LidarPoint> {
    let (input, id) = parse_string(input)?;
    let (input, xyz) = count(le_f64, 3).parse(input)?;
    let (input, range) = le_f64(input)?;
    let (input, sigma_range) = le_f64(input)?;
    let (input, has_cov) = le_u8(input)?;
    let (input, covariance) = if has_cov == 1 {
        let (input, c) = count(le_f64, 9).parse(input)?;
        (
            input,
            Some([[c[0], c[1], c[2]], [c[3], c[4], c[5]], [c[6], c[7], c[8]]]),
        )
    } else {
        (input, None)
    };
    let (input, n_measures) = le_u32(input)?;
    let (input, measures) = count(parse_measure, n_measures as usize).parse(input)?;
    Ok((
        input,
        LidarPoint {
            id,
            point: SurfacePoint {
                x: xyz[0],
                y: xyz[1],
                z: xyz[2],
                covariance,
            },
            range,
            sigma_range,
            measures,
        },
    ))
}

fn parse_binary(input: &[u8]) -> IResult<&[u8], (u32, Vec<LidarPoint>)> {
    let (input, _) = tag(&MAGIC[..]).parse(input)?;
    let (input, version) = le_u32(input)?;
    let (input, n_points) = le_u32(input)?;
    let (input, points) = count(parse_point, n_points as usize).parse(input)?;
    Ok((input, (version, points)))
}

impl LidarData {
    /// Decode the binary form.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, JigsawError> {
        let (_, (version, points)) = parse_binary(bytes)
            .map_err(|e| JigsawError::NomParsingError(format!("lidar binary: {e:?}")))?;
        if version != BINARY_VERSION {
            return Err(JigsawError::UnsupportedVersion(version));
        }
        Ok(Self { points })
    }

    /// Encode the binary form.
    pub fn to_bytes(&self) -> Vec<u8> {
        fn put_str(out: &mut Vec<u8>, s: &str) {
            out.extend_from_slice(&(s.len() as u32).to_le_bytes());
            out.extend_from_slice(s.as_bytes());
        }
        let mut out = Vec::new();
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&BINARY_VERSION.to_le_bytes());
        out.extend_from_slice(&(self.points.len() as u32).to_le_bytes());
        for p in &self.points {
            put_str(&mut out, &p.id);
            for v in [p.point.x, p.point.y, p.point.z, p.range, p.sigma_range] {
                out.extend_from_slice(&v.to_le_bytes());
            }
            match p.point.covariance {
                Some(c) => {
                    out.push(1);
                    for v in c.iter().flatten() {
                        out.extend_from_slice(&v.to_le_bytes());
                    }
                }
                None => out.push(0),
            }
            out.extend_from_slice(&(p.measures.len() as u32).to_le_bytes());
            for m in &p.measures {
                put_str(&mut out, &m.serial_number);
                for v in [m.sample, m.line, m.sample_sigma, m.line_sigma] {
                    out.extend_from_slice(&v.to_le_bytes());
                }
            }
        }
        out
    }

    /// Read either form; the binary form is recognised by its magic bytes.
    pub fn from_file(path: &Utf8Path) -> Result<Self, JigsawError> {
        let bytes = std::fs::read(path)?;
        if bytes.starts_with(MAGIC) {
            Self::from_bytes(&bytes)
        } else {
            Ok(serde_json::from_slice(&bytes)?)
        }
    }

    pub fn to_json_file(&self, path: &Utf8Path) -> Result<(), JigsawError> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn to_binary_file(&self, path: &Utf8Path) -> Result<(), JigsawError> {
        std::fs::write(path, self.to_bytes())?;
        Ok(())
    }

    /// Control points equivalent to the lidar shots.
    pub fn to_control_points(&self) -> Vec<ControlPoint> {
        self.points
            .iter()
            .map(|lp| {
                let point_type = if lp.point.has_covariance() {
                    ControlPointType::Constrained
                } else {
                    ControlPointType::Free
                };
                let mut cp = ControlPoint::new(lp.id.clone(), point_type).with_apriori(lp.point);
                cp.measures = lp
                    .measures
                    .iter()
                    .map(|m| {
                        ControlMeasure::new(m.serial_number.clone(), m.sample, m.line)
                            .with_sigmas(m.sample_sigma, m.line_sigma)
                    })
                    .collect();
                cp
            })
            .collect()
    }

    pub fn ids(&self) -> Vec<String> {
        self.points.iter().map(|p| p.id.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_data() -> LidarData {
        LidarData {
            points: vec![LidarPoint {
                id: "lidar_0001".into(),
                point: SurfacePoint {
                    x: 1_737_000.25,
                    y: -12.5,
                    z: 330.0,
                    covariance: Some([[100.0, 0.0, 0.0], [0.0, 100.0, 0.0], [0.0, 0.0, 4.0]]),
                },
                range: 99_876.5,
                sigma_range: 1.5,
                measures: vec![
                    LidarMeasure {
                        serial_number: "IMG_A".into(),
                        sample: 100.25,
                        line: 200.75,
                        sample_sigma: 0.5,
                        line_sigma: 0.5,
                    },
                    LidarMeasure {
                        serial_number: "IMG_B".into(),
                        sample: 300.0,
                        line: 12.0,
                        sample_sigma: 1.0,
                        line_sigma: 1.0,
                    },
                ],
            }],
        }
    }

    #[test]
    fn test_binary_decoding() {
        let data = sample_data();
        assert_eq!(LidarData::from_bytes(&data.to_bytes()).unwrap(), data);
    }

    #[test]
    fn test_truncated_binary_is_an_error() {
        let bytes = sample_data().to_bytes();
        assert!(matches!(
            LidarData::from_bytes(&bytes[..bytes.len() - 3]),
            Err(JigsawError::NomParsingError(_))
        ));
    }

    #[test]
    fn test_control_point_conversion() {
        let points = sample_data().to_control_points();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].point_type, ControlPointType::Constrained);
        assert_eq!(points[0].measures[0].sample_sigma, 0.5);
        assert_eq!(points[0].measures[1].serial_number, "IMG_B");
    }

    #[test]
    fn test_json_file_is_detected() {
        let dir = tempfile::tempdir().unwrap();
        let path = camino::Utf8PathBuf::from_path_buf(dir.path().join("lidar.json")).unwrap();
        sample_data().to_json_file(&path).unwrap();
        assert_eq!(LidarData::from_file(&path).unwrap(), sample_data());

        let bin = camino::Utf8PathBuf::from_path_buf(dir.path().join("lidar.bin")).unwrap();
        sample_data().to_binary_file(&bin).unwrap();
        assert_eq!(LidarData::from_file(&bin).unwrap(), sample_data());
    }
}
