//! # Solution reporting
//!
//! [`BundleSolutionInfo`] is the product of a solve: the adjusted network, observations and
//! target body with the run statistics. It writes
//!
//! * the output control network (`ONET`),
//! * `<prefix>bundleout.txt` ([`summary`]),
//! * `<prefix>residuals.csv`, `<prefix>points.csv`, `<prefix>images.csv` and, when lidar points
//!   were supplied, `<prefix>lidar.csv` ([`csv_output`]),
//! * on `UPDATE` with a converged run, the adjusted tables back into the image records
//!   ([`tables`]).
pub mod csv_output;
pub mod summary;
pub mod tables;

use std::{fs::File, io::BufWriter};

use camino::{Utf8Path, Utf8PathBuf};
use tracing::info;

use crate::{
    bundle::{normals::TargetParameters, observation::ObservationSet, results::BundleResults},
    camera::target::TargetBody,
    control::ControlNetwork,
    images::ImageList,
    jigsaw_errors::JigsawError,
    settings::BundleSettings,
    solution::summary::Summary,
    time::run_timestamp,
};

#[derive(Debug, Clone)]
pub struct BundleSolutionInfo {
    pub settings: BundleSettings,
    pub network: ControlNetwork,
    pub observations: ObservationSet,
    pub images: ImageList,
    pub target: TargetBody,
    pub target_parameters: TargetParameters,
    pub results: BundleResults,
    /// Ids of the network points that came from lidar data.
    pub lidar_ids: Vec<String>,
    /// UTC timestamp of the run.
    pub run_time: String,
}

/// Paths of the written report files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub summary: Utf8PathBuf,
    pub residuals: Utf8PathBuf,
    pub points: Utf8PathBuf,
    pub images: Utf8PathBuf,
    pub lidar: Option<Utf8PathBuf>,
}

impl BundleSolutionInfo {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        settings: BundleSettings,
        network: ControlNetwork,
        observations: ObservationSet,
        images: ImageList,
        target: TargetBody,
        target_parameters: TargetParameters,
        results: BundleResults,
        lidar_ids: Vec<String>,
    ) -> Result<Self, JigsawError> {
        Ok(Self {
            settings,
            network,
            observations,
            images,
            target,
            target_parameters,
            results,
            lidar_ids,
            run_time: run_timestamp()?,
        })
    }

    /// `<prefix><name>`.
    pub fn artifact_path(&self, name: &str) -> Utf8PathBuf {
        Utf8PathBuf::from(format!("{}{name}", self.settings.output_prefix))
    }

    /// The output control network, without the lidar points.
    pub fn output_network(&self) -> ControlNetwork {
        let mut net = self.network.clone();
        net.points.retain(|p| !self.lidar_ids.contains(&p.id));
        net
    }

    pub fn write_network(&self, path: &Utf8Path) -> Result<(), JigsawError> {
        self.output_network().to_file(path)?;
        info!(path = %path, "output network written");
        Ok(())
    }

    pub fn summary(&self) -> String {
        Summary(self).to_string()
    }

    /// Write `bundleout.txt` and the CSV reports.
    pub fn write_reports(&self) -> Result<ArtifactPaths, JigsawError> {
        let paths = ArtifactPaths {
            summary: self.artifact_path("bundleout.txt"),
            residuals: self.artifact_path("residuals.csv"),
            points: self.artifact_path("points.csv"),
            images: self.artifact_path("images.csv"),
            lidar: (!self.lidar_ids.is_empty()).then(|| self.artifact_path("lidar.csv")),
        };

        std::fs::write(&paths.summary, self.summary())?;
        csv_output::write_residuals(self, BufWriter::new(File::create(&paths.residuals)?))?;
        csv_output::write_points(
            &self.network,
            self.settings.coordinate_type_reports,
            &self.lidar_ids,
            BufWriter::new(File::create(&paths.points)?),
        )?;
        csv_output::write_images(self, &self.images, BufWriter::new(File::create(&paths.images)?))?;
        if let Some(lidar) = &paths.lidar {
            csv_output::write_lidar(&self.network, &self.lidar_ids, BufWriter::new(File::create(lidar)?))?;
        }
        info!(summary = %paths.summary, "reports written");
        Ok(paths)
    }

    /// Store the adjusted tables in the image records and rewrite the record files.
    ///
    /// Return
    /// ----------
    /// * The number of rewritten files, or the error matching a non-converged status (tables
    ///   are never committed for such runs).
    pub fn update_images(&mut self) -> Result<usize, JigsawError> {
        self.results.check()?;
        let updated = tables::apply_to_images(&self.observations, &mut self.images, &self.run_time)?;
        let written = self.images.write_back()?;
        info!(updated, written, "image records updated");
        Ok(written)
    }
}
