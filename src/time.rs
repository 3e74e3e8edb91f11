//! Time helpers for reports and table comments.
use hifitime::{Epoch, TimeScale};

use crate::{constants::EphemerisTime, jigsaw_errors::JigsawError};

/// UTC timestamp of the adjustment run, used to tag reports and adjusted tables.
///
/// Return
/// ------
/// * the current UTC epoch formatted as `YYYY-MM-DDTHH:MM:SS UTC`, or a time error when the
///   system clock cannot be read.
pub fn run_timestamp() -> Result<String, JigsawError> {
    let now = Epoch::now()?;
    Ok(utc_string(now))
}

/// Ephemeris time (TDB seconds past J2000) as a UTC calendar string.
pub fn et_to_utc(et: EphemerisTime) -> String {
    utc_string(Epoch::from_et_seconds(et))
}

fn utc_string(epoch: Epoch) -> String {
    format!("{}", epoch.to_time_scale(TimeScale::UTC))
}

/// Comment attached to adjusted pointing and position tables.
pub fn table_comment(run_time: &str) -> String {
    format!("Adjusted by jigsaw, run {run_time}")
}
