//! # Constants and type definitions for Jigsaw
//!
//! This module centralizes the **unit conversions**, **numerical floors**, and **common type
//! aliases** used throughout the bundle adjustment library.
//!
//! ## Overview
//!
//! - Angle conversions (degrees ↔ radians)
//! - Statistical constants used by outlier rejection
//! - Weights and tolerances used by the normal-equation assembler
//! - Core type aliases shared by the control network, the observations and the solver
//!
//! These definitions are used by all main modules, including the settings model, the control
//! network, the camera models, and the iteration driver.

use std::collections::BTreeMap;

use nalgebra::{DMatrix, DVector, Matrix3, Vector3};

// -------------------------------------------------------------------------------------------------
// Unit conversions
// -------------------------------------------------------------------------------------------------

/// 2π, useful for longitude wrapping
pub const DPI: f64 = 2. * std::f64::consts::PI;

/// Degrees → radians
pub const RADEG: f64 = std::f64::consts::PI / 180.0;

/// Radians → degrees
pub const DEGRAD: f64 = 180.0 / std::f64::consts::PI;

/// Meters → kilometers
pub const KM_PER_M: f64 = 1.0e-3;

// -------------------------------------------------------------------------------------------------
// Solver constants
// -------------------------------------------------------------------------------------------------

/// Scale factor turning a median absolute deviation into a normal-equivalent standard deviation
pub const MAD_SCALE: f64 = 1.4826;

/// Weight used to hold a coordinate fixed without removing it from the point block
pub const HELD_COORDINATE_WEIGHT: f64 = 1.0e50;

/// Smallest admissible eigenvalue ratio of a point block before it is declared ill-conditioned
pub const POINT_CONDITION_FLOOR: f64 = 1.0e-12;

/// Relative tolerance applied before a σ₀ increase counts toward divergence
pub const SIGMA0_INCREASE_TOLERANCE: f64 = 1.0e-9;

/// Number of consecutive σ₀ increases declared as divergence
pub const DIVERGENCE_STREAK: usize = 2;

/// Maximum number of entries in the maximum-likelihood cascade
pub const MAX_LIKELIHOOD_MODELS: usize = 3;

/// Default a priori measure sigma, in pixels
pub const DEFAULT_MEASURE_SIGMA: f64 = 1.0;

/// Current version of the serialized control network
pub const CONTROL_NET_VERSION: u32 = 3;

// -------------------------------------------------------------------------------------------------
// Type aliases
// -------------------------------------------------------------------------------------------------

/// Angle in radians
pub type Radian = f64;

/// Angle in degrees
pub type Degree = f64;

/// Length in meters
pub type Meter = f64;

/// Ephemeris time in seconds past J2000
pub type EphemerisTime = f64;

/// Image serial number, used to link measures to cameras
pub type SerialNumber = String;

/// Observation number shared by every image of an observation
pub type ObservationNumber = String;

/// Body-fixed Cartesian coordinates, in meters
pub type BodyFixed = Vector3<f64>;

/// 3×3 covariance of a surface point
pub type Covariance3 = Matrix3<f64>;

/// Dense parameter correction vector of an observation or of the target body
pub type ParameterVector = DVector<f64>;

/// Upper-triangular row of a block-sparse symmetric matrix: column block index → block
pub type BlockRow = BTreeMap<usize, DMatrix<f64>>;
