//! Sparse bundle adjustment of planetary image control networks.
//!
//! The entry point is [`bundle::BundleAdjust`]: build it from a [`bundle::SolveContext`],
//! call [`solve`](bundle::BundleAdjust::solve) and write the resulting
//! [`solution::BundleSolutionInfo`].
pub mod bundle;
pub mod camera;
pub mod constants;
pub mod control;
pub mod images;
pub mod jigsaw_errors;
pub mod settings;
pub mod solution;
pub mod time;
