//! Adjusted pointing and position tables.
//!
//! For every image of an observation the adjusted trajectories are collapsed back into
//! single polynomials of the configured CK/SPK degree, and a one-entry cache (quaternion and
//! position at the exposure time) is produced. Each table set carries a comment naming the
//! adjustment run.
use crate::{
    bundle::observation::{BundleObservation, ObservationSet},
    camera::rotation::{euler_attitude, to_quaternion},
    images::{
        ImageList, InstrumentTables, PointingTable, PositionRecord, PositionTable,
        QuaternionRecord,
    },
    jigsaw_errors::JigsawError,
    time::table_comment,
};

/// Adjusted tables of one image.
#[derive(Debug, Clone, PartialEq)]
pub struct AdjustedTables {
    pub image_index: usize,
    pub pointing: PointingTable,
    pub position: PositionTable,
    pub tables: InstrumentTables,
}

/// Refit the trajectories of one observation member.
///
/// Arguments
/// -----------------
/// * `obs`: the adjusted observation.
/// * `member`: index of the image within the observation.
/// * `run_time`: run timestamp for the table comment.
pub fn adjusted_tables(
    obs: &BundleObservation,
    member: usize,
    run_time: &str,
) -> Result<AdjustedTables, JigsawError> {
    let t = obs.times[member];
    let [ra, dec, twist] = &obs.pointing;
    let [x, y, z] = &obs.position;
    let pointing = PointingTable {
        ra: ra.to_polynomial(obs.ck_degree, &obs.times)?,
        dec: dec.to_polynomial(obs.ck_degree, &obs.times)?,
        twist: twist.to_polynomial(obs.ck_degree, &obs.times)?,
    };
    let position = PositionTable {
        x: x.to_polynomial(obs.spk_degree, &obs.times)?,
        y: y.to_polynomial(obs.spk_degree, &obs.times)?,
        z: z.to_polynomial(obs.spk_degree, &obs.times)?,
    };

    let (rotation, _) = euler_attitude(ra.evaluate(t), dec.evaluate(t), twist.evaluate(t));
    let q = to_quaternion(&rotation);
    let tables = InstrumentTables {
        comment: table_comment(run_time),
        pointing_cache: vec![QuaternionRecord {
            time: t,
            quaternion: [q.w, q.i, q.j, q.k],
        }],
        position_cache: vec![PositionRecord {
            time: t,
            position: [x.evaluate(t), y.evaluate(t), z.evaluate(t)],
        }],
    };
    Ok(AdjustedTables {
        image_index: obs.image_indices[member],
        pointing,
        position,
        tables,
    })
}

/// Store the adjusted tables (and CSM cameras) in the image records.
///
/// Return
/// ----------
/// * The number of updated records.
pub fn apply_to_images(
    observations: &ObservationSet,
    images: &mut ImageList,
    run_time: &str,
) -> Result<usize, JigsawError> {
    let mut updated = 0;
    for obs in observations.iter() {
        for member in 0..obs.image_indices.len() {
            let adjusted = adjusted_tables(obs, member, run_time)?;
            let record = &mut images.records_mut()[adjusted.image_index];
            record.pointing = adjusted.pointing;
            record.position = adjusted.position;
            record.tables = Some(adjusted.tables);
            if obs.cameras[member].as_csm().is_some() {
                record.camera = obs.cameras[member].clone();
            }
            updated += 1;
        }
    }
    Ok(updated)
}
