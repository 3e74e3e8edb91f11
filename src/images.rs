//! # Image records and image lists
//!
//! An [`ImageRecord`] is everything the bundle needs to know about one image: its serial number
//! and observation number, the instrument, the exposure time, the camera model, the target body,
//! and the pointing (CK) and position (SPK) polynomials.
//!
//! Records are JSON files. An [`ImageList`] is read from a `FROMLIST` text file that names one
//! record per line (`#` starts a comment, relative paths are resolved against the list file's
//! directory). When the adjustment converges with `UPDATE` set, the adjusted polynomials and the
//! pointing/position caches are written back into the same record files.
//!
//! ## Held images
//!
//! `HELDLIST` uses the same list format. Every held record must also appear in the image list
//! (matched by serial number), otherwise [`JigsawError::MissingImage`] is returned.
use std::collections::{BTreeSet, HashMap};

use ahash::RandomState;
use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    camera::{
        polynomial::Polynomial, rotation::euler_attitude, target::TargetBody, CameraModel,
        ExteriorOrientation,
    },
    constants::{EphemerisTime, ObservationNumber, SerialNumber},
    jigsaw_errors::JigsawError,
};

/// Pointing polynomials: J2000 right ascension, declination and twist of the camera boresight,
/// radians.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointingTable {
    pub ra: Polynomial,
    pub dec: Polynomial,
    pub twist: Polynomial,
}

impl PointingTable {
    pub fn axes(&self) -> [&Polynomial; 3] {
        [&self.ra, &self.dec, &self.twist]
    }
}

/// Spacecraft position polynomials, J2000 meters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionTable {
    pub x: Polynomial,
    pub y: Polynomial,
    pub z: Polynomial,
}

impl PositionTable {
    pub fn axes(&self) -> [&Polynomial; 3] {
        [&self.x, &self.y, &self.z]
    }
}

/// One entry of the pointing cache: J2000 → camera rotation as `[w, x, y, z]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuaternionRecord {
    pub time: EphemerisTime,
    pub quaternion: [f64; 4],
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionRecord {
    pub time: EphemerisTime,
    pub position: [f64; 3],
}

/// Adjusted tables written back on `UPDATE`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentTables {
    pub comment: String,
    pub pointing_cache: Vec<QuaternionRecord>,
    pub position_cache: Vec<PositionRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub serial_number: SerialNumber,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observation_number: Option<ObservationNumber>,
    pub instrument_id: String,
    /// Exposure center time, seconds past J2000.
    pub time: EphemerisTime,
    pub camera: CameraModel,
    pub target: TargetBody,
    pub pointing: PointingTable,
    pub position: PositionTable,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tables: Option<InstrumentTables>,
}

impl ImageRecord {
    pub fn from_file(path: &Utf8Path) -> Result<Self, JigsawError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn to_file(&self, path: &Utf8Path) -> Result<(), JigsawError> {
        let mut out = serde_json::to_string_pretty(self)?;
        out.push('\n');
        std::fs::write(path, out)?;
        Ok(())
    }

    /// Observation number used for grouping.
    ///
    /// In observation mode images sharing an observation number form one observation; otherwise
    /// every image is its own observation, keyed by serial number.
    pub fn grouping_key(&self, observation_mode: bool) -> ObservationNumber {
        if observation_mode {
            self.observation_number
                .clone()
                .unwrap_or_else(|| self.serial_number.clone())
        } else {
            self.serial_number.clone()
        }
    }

    /// Exterior orientation from the record's own tables.
    pub fn exterior_orientation(&self) -> ExteriorOrientation {
        let t = self.time;
        let (pointing, pointing_partials) = euler_attitude(
            self.pointing.ra.evaluate(t),
            self.pointing.dec.evaluate(t),
            self.pointing.twist.evaluate(t),
        );
        ExteriorOrientation {
            time: t,
            pointing,
            pointing_partials,
            position: nalgebra::Vector3::new(
                self.position.x.evaluate(t),
                self.position.y.evaluate(t),
                self.position.z.evaluate(t),
            ),
            body: self.target.body_rotation(t),
        }
    }
}

/// The images taking part in one adjustment, indexed by serial number.
#[derive(Debug, Clone, Default)]
pub struct ImageList {
    records: Vec<ImageRecord>,
    paths: Vec<Option<Utf8PathBuf>>,
    index: HashMap<SerialNumber, usize, RandomState>,
}

fn read_list_file(path: &Utf8Path) -> Result<Vec<Utf8PathBuf>, JigsawError> {
    let content = std::fs::read_to_string(path)?;
    let base = path.parent().unwrap_or_else(|| Utf8Path::new(""));
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(|l| {
            let p = Utf8Path::new(l);
            if p.is_absolute() {
                p.to_path_buf()
            } else {
                base.join(p)
            }
        })
        .collect())
}

impl ImageList {
    /// Build a list from in-memory records.
    ///
    /// Return
    /// ----------
    /// * The list, or [`JigsawError::InvalidSetting`] when two records share a serial number.
    pub fn new(records: Vec<ImageRecord>) -> Result<Self, JigsawError> {
        let paths = vec![None; records.len()];
        Self::with_paths(records, paths)
    }

    fn with_paths(
        records: Vec<ImageRecord>,
        paths: Vec<Option<Utf8PathBuf>>,
    ) -> Result<Self, JigsawError> {
        let mut index = HashMap::with_capacity_and_hasher(records.len(), RandomState::new());
        for (i, r) in records.iter().enumerate() {
            if index.insert(r.serial_number.clone(), i).is_some() {
                return Err(JigsawError::InvalidSetting(format!(
                    "duplicate serial number '{}' in the image list",
                    r.serial_number
                )));
            }
        }
        Ok(Self {
            records,
            paths,
            index,
        })
    }

    /// Read a `FROMLIST` file.
    pub fn from_list_file(path: &Utf8Path) -> Result<Self, JigsawError> {
        let paths = read_list_file(path)?;
        let records = paths
            .iter()
            .map(|p| ImageRecord::from_file(p))
            .collect::<Result<Vec<_>, _>>()?;
        debug!(images = records.len(), list = %path, "image list loaded");
        Self::with_paths(records, paths.into_iter().map(Some).collect())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ImageRecord> {
        self.records.iter()
    }

    pub fn records(&self) -> &[ImageRecord] {
        &self.records
    }

    pub fn records_mut(&mut self) -> &mut [ImageRecord] {
        &mut self.records
    }

    pub fn index_of(&self, serial_number: &str) -> Option<usize> {
        self.index.get(serial_number).copied()
    }

    pub fn get(&self, serial_number: &str) -> Option<&ImageRecord> {
        self.index_of(serial_number).map(|i| &self.records[i])
    }

    pub fn contains(&self, serial_number: &str) -> bool {
        self.index.contains_key(serial_number)
    }

    /// Observation numbers of held images.
    ///
    /// Return
    /// ----------
    /// * The grouping keys of the held serial numbers, or [`JigsawError::MissingImage`] for the
    ///   first held serial number that is not part of the list.
    pub fn held_observations(
        &self,
        held_serials: &[SerialNumber],
        observation_mode: bool,
    ) -> Result<BTreeSet<ObservationNumber>, JigsawError> {
        held_serials
            .iter()
            .map(|s| {
                self.get(s)
                    .map(|r| r.grouping_key(observation_mode))
                    .ok_or_else(|| JigsawError::MissingImage(s.clone()))
            })
            .collect()
    }

    /// Serial numbers of the records named in a `HELDLIST` file.
    pub fn read_held_list(path: &Utf8Path) -> Result<Vec<SerialNumber>, JigsawError> {
        read_list_file(path)?
            .iter()
            .map(|p| ImageRecord::from_file(p).map(|r| r.serial_number))
            .collect()
    }

    /// Rewrite every record that was loaded from disk.
    pub fn write_back(&self) -> Result<usize, JigsawError> {
        let mut written = 0;
        for (record, path) in self.records.iter().zip(&self.paths) {
            if let Some(path) = path {
                record.to_file(path)?;
                written += 1;
            }
        }
        Ok(written)
    }
}
