//! `jigsaw` command line: one invocation runs one bundle adjustment.
//!
//! Logging goes to stderr through `tracing`; set `RUST_LOG` to change the level (default
//! `info`). The exit code is 0 only when the bundle converged and every artifact was written.
use std::{collections::BTreeSet, process::ExitCode};

use camino::Utf8PathBuf;
use clap::{ArgAction, Parser};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use jigsaw::{
    bundle::{BundleAdjust, SolveContext},
    camera::csm::{CsmParameterSet, CsmParameterType},
    control::{lidar::LidarData, ControlNetwork},
    images::ImageList,
    jigsaw_errors::JigsawError,
    settings::{
        maximum_likelihood::{MaximumLikelihoodEntry, MaximumLikelihoodModel},
        observation_solve::{ObservationSolveSettings, PointingSolveOption, PositionSolveOption},
        options::parse_sigma,
        target_body::TargetBodySettings,
        BundleSettings, ConvergenceCriteria, CoordinateType,
    },
};

/// Bundle adjustment of a planetary image control network.
#[derive(Debug, Parser)]
#[command(author, version, about = "Sparse bundle adjustment of planetary control networks")]
struct Args {
    /// Text file listing the image records, one per line.
    #[arg(long = "FROMLIST")]
    fromlist: Utf8PathBuf,

    /// Input control network.
    #[arg(long = "CNET")]
    cnet: Utf8PathBuf,

    /// Output control network.
    #[arg(long = "ONET")]
    onet: Utf8PathBuf,

    /// Pointing solve option.
    #[arg(long = "CAMSOLVE", default_value = "AnglesOnly")]
    camsolve: PointingSolveOption,

    /// Position solve option.
    #[arg(long = "SPSOLVE", default_value = "NoPosition")]
    spsolve: PositionSolveOption,

    #[arg(long = "TWIST", default_value_t = true, action = ArgAction::Set)]
    twist: bool,

    #[arg(long = "CKDEGREE", default_value_t = 2)]
    ckdegree: usize,

    #[arg(long = "CKSOLVEDEGREE", default_value_t = 2)]
    cksolvedegree: usize,

    #[arg(long = "SPKDEGREE", default_value_t = 2)]
    spkdegree: usize,

    #[arg(long = "SPKSOLVEDEGREE", default_value_t = 2)]
    spksolvedegree: usize,

    /// Fit the pointing correction over the existing pointing.
    #[arg(long = "OVEREXISTING", default_value_t = false, action = ArgAction::Set)]
    overexisting: bool,

    /// Fit the position correction over the existing position.
    #[arg(long = "OVERHERMITE", default_value_t = false, action = ArgAction::Set)]
    overhermite: bool,

    /// Group images by observation number.
    #[arg(long = "OBSERVATIONS", default_value_t = false, action = ArgAction::Set)]
    observations: bool,

    /// Write the adjusted tables back into the image records on convergence.
    #[arg(long = "UPDATE", default_value_t = false, action = ArgAction::Set)]
    update: bool,

    #[arg(long = "ERRORPROPAGATION", default_value_t = false, action = ArgAction::Set)]
    errorpropagation: bool,

    /// Solve point radii.
    #[arg(long = "RADIUS", default_value_t = false, action = ArgAction::Set)]
    radius: bool,

    #[arg(long = "OUTLIER_REJECTION", default_value_t = false, action = ArgAction::Set)]
    outlier_rejection: bool,

    #[arg(long = "REJECTION_MULTIPLIER", default_value_t = 3.0)]
    rejection_multiplier: f64,

    /// Convergence threshold.
    #[arg(long = "SIGMA0", default_value_t = 1.0e-10)]
    sigma0: f64,

    #[arg(long = "MAXITS", default_value_t = 50)]
    maxits: usize,

    /// Convergence criterion: Sigma0 or ParameterCorrections.
    #[arg(long = "CONVERGENCE_CRITERIA", default_value = "Sigma0")]
    convergence_criteria: ConvergenceCriteria,

    #[arg(long = "CONTROL_POINT_COORDINATE_TYPE_BUNDLE", default_value = "Latitudinal")]
    coordinate_type_bundle: CoordinateType,

    #[arg(long = "CONTROL_POINT_COORDINATE_TYPE_REPORTS", default_value = "Latitudinal")]
    coordinate_type_reports: CoordinateType,

    #[arg(long = "POINT_LATITUDE_SIGMA")]
    point_latitude_sigma: Option<String>,

    #[arg(long = "POINT_LONGITUDE_SIGMA")]
    point_longitude_sigma: Option<String>,

    #[arg(long = "POINT_RADIUS_SIGMA")]
    point_radius_sigma: Option<String>,

    #[arg(long = "POINT_X_SIGMA")]
    point_x_sigma: Option<String>,

    #[arg(long = "POINT_Y_SIGMA")]
    point_y_sigma: Option<String>,

    #[arg(long = "POINT_Z_SIGMA")]
    point_z_sigma: Option<String>,

    /// Degrees.
    #[arg(long = "CAMERA_ANGLES_SIGMA")]
    camera_angles_sigma: Option<String>,

    /// Degrees/s.
    #[arg(long = "CAMERA_ANGULAR_VELOCITY_SIGMA")]
    camera_angular_velocity_sigma: Option<String>,

    /// Degrees/s².
    #[arg(long = "CAMERA_ANGULAR_ACCELERATION_SIGMA")]
    camera_angular_acceleration_sigma: Option<String>,

    /// Meters.
    #[arg(long = "SPACECRAFT_POSITION_SIGMA")]
    spacecraft_position_sigma: Option<String>,

    /// m/s.
    #[arg(long = "SPACECRAFT_VELOCITY_SIGMA")]
    spacecraft_velocity_sigma: Option<String>,

    /// m/s².
    #[arg(long = "SPACECRAFT_ACCELERATION_SIGMA")]
    spacecraft_acceleration_sigma: Option<String>,

    /// List of held image records.
    #[arg(long = "HELDLIST")]
    heldlist: Option<Utf8PathBuf>,

    #[arg(long = "MODEL1")]
    model1: Option<MaximumLikelihoodModel>,

    #[arg(long = "MAX_MODEL1_C_QUANTILE", default_value_t = 0.5)]
    max_model1_c_quantile: f64,

    #[arg(long = "MODEL2")]
    model2: Option<MaximumLikelihoodModel>,

    #[arg(long = "MAX_MODEL2_C_QUANTILE", default_value_t = 0.5)]
    max_model2_c_quantile: f64,

    #[arg(long = "MODEL3")]
    model3: Option<MaximumLikelihoodModel>,

    #[arg(long = "MAX_MODEL3_C_QUANTILE", default_value_t = 0.5)]
    max_model3_c_quantile: f64,

    #[arg(long = "SOLVETARGETBODY", default_value_t = false, action = ArgAction::Set)]
    solvetargetbody: bool,

    /// Target body parameter keyword file.
    #[arg(long = "TBPARAMETERS")]
    tbparameters: Option<Utf8PathBuf>,

    #[arg(long = "CSMSOLVESET")]
    csmsolveset: Option<CsmParameterSet>,

    #[arg(long = "CSMSOLVETYPE")]
    csmsolvetype: Option<CsmParameterType>,

    /// Comma-separated CSM parameter names.
    #[arg(long = "CSMSOLVELIST", value_delimiter = ',')]
    csmsolvelist: Option<Vec<String>>,

    /// Prefix of the report files.
    #[arg(long = "FILE_PREFIX", default_value = "")]
    file_prefix: String,

    /// Lidar points, binary or JSON.
    #[arg(long = "LIDARDATA")]
    lidardata: Option<Utf8PathBuf>,
}

fn sigma(key: &str, value: &Option<String>) -> Result<Option<f64>, JigsawError> {
    value
        .as_deref()
        .map_or(Ok(None), |v| parse_sigma(key, v))
}

fn observation_settings(args: &Args, instrument_id: &str) -> Result<ObservationSolveSettings, JigsawError> {
    let mut builder = ObservationSolveSettings::builder(instrument_id)
        .pointing(args.camsolve)
        .solve_twist(args.twist)
        .ck_degree(args.ckdegree)
        .ck_solve_degree(args.cksolvedegree)
        .pointing_over_existing(args.overexisting)
        .angle_sigmas_deg(
            sigma("CAMERA_ANGLES_SIGMA", &args.camera_angles_sigma)?,
            sigma("CAMERA_ANGULAR_VELOCITY_SIGMA", &args.camera_angular_velocity_sigma)?,
            sigma(
                "CAMERA_ANGULAR_ACCELERATION_SIGMA",
                &args.camera_angular_acceleration_sigma,
            )?,
        )
        .position(args.spsolve)
        .spk_degree(args.spkdegree)
        .spk_solve_degree(args.spksolvedegree)
        .position_over_existing(args.overhermite)
        .position_sigmas_m(
            sigma("SPACECRAFT_POSITION_SIGMA", &args.spacecraft_position_sigma)?,
            sigma("SPACECRAFT_VELOCITY_SIGMA", &args.spacecraft_velocity_sigma)?,
            sigma(
                "SPACECRAFT_ACCELERATION_SIGMA",
                &args.spacecraft_acceleration_sigma,
            )?,
        );
    if let Some(set) = args.csmsolveset {
        builder = builder.csm_solve_set(set);
    }
    if let Some(kind) = args.csmsolvetype {
        builder = builder.csm_solve_type(kind);
    }
    if let Some(list) = &args.csmsolvelist {
        builder = builder.csm_solve_list(list.iter().map(|s| s.trim().to_string()));
    }
    builder.build()
}

fn build_settings(args: &Args, images: &ImageList) -> Result<BundleSettings, JigsawError> {
    let point_sigmas = match args.coordinate_type_bundle {
        CoordinateType::Latitudinal => [
            sigma("POINT_LATITUDE_SIGMA", &args.point_latitude_sigma)?,
            sigma("POINT_LONGITUDE_SIGMA", &args.point_longitude_sigma)?,
            sigma("POINT_RADIUS_SIGMA", &args.point_radius_sigma)?,
        ],
        CoordinateType::Rectangular => [
            sigma("POINT_X_SIGMA", &args.point_x_sigma)?,
            sigma("POINT_Y_SIGMA", &args.point_y_sigma)?,
            sigma("POINT_Z_SIGMA", &args.point_z_sigma)?,
        ],
    };
    let cascade = [
        (args.model1, args.max_model1_c_quantile),
        (args.model2, args.max_model2_c_quantile),
        (args.model3, args.max_model3_c_quantile),
    ]
    .into_iter()
    .filter_map(|(m, q)| m.filter(|m| *m != MaximumLikelihoodModel::None).map(|m| (m, q)))
    .map(|(m, q)| MaximumLikelihoodEntry::new(m, q))
    .collect();

    let mut builder = BundleSettings::builder()
        .validate_network(true)
        .coordinate_type_bundle(args.coordinate_type_bundle)
        .coordinate_type_reports(args.coordinate_type_reports)
        .solve_observation_mode(args.observations)
        .update_cube_label(args.update)
        .error_propagation(args.errorpropagation)
        .solve_radius(args.radius)
        .global_point_sigmas(point_sigmas[0], point_sigmas[1], point_sigmas[2])
        .outlier_rejection(args.outlier_rejection)
        .rejection_multiplier(args.rejection_multiplier)
        .convergence_criteria(args.convergence_criteria)
        .convergence_threshold(args.sigma0)
        .max_iterations(args.maxits)
        .maximum_likelihood(cascade)
        .output_prefix(args.file_prefix.clone());

    let instruments: BTreeSet<&str> = images.iter().map(|r| r.instrument_id.as_str()).collect();
    for instrument in instruments {
        builder = builder.observation_solve_settings(observation_settings(args, instrument)?);
    }

    if args.solvetargetbody {
        let path = args.tbparameters.as_ref().ok_or_else(|| {
            JigsawError::InvalidSetting("SOLVETARGETBODY requires TBPARAMETERS".into())
        })?;
        builder = builder.target_body(TargetBodySettings::from_keyword_file(path)?);
    }

    let mut settings = builder.build()?;
    if let Some(path) = &args.heldlist {
        let serials = ImageList::read_held_list(path)?;
        let held = images.held_observations(&serials, settings.solve_observation_mode)?;
        info!(held = held.len(), "held observations");
        settings = settings.with_held_observations(held);
    }
    Ok(settings)
}

fn run(args: &Args) -> Result<(), JigsawError> {
    let images = ImageList::from_list_file(&args.fromlist)?;
    let network = ControlNetwork::from_file(&args.cnet)?;
    let lidar = args
        .lidardata
        .as_deref()
        .map(LidarData::from_file)
        .transpose()?;
    let settings = build_settings(args, &images)?;

    let ctx = SolveContext {
        settings,
        network,
        images,
        lidar,
    };
    let mut solution = BundleAdjust::new(ctx)?.solve()?;
    for err in solution.results.point_errors() {
        warn!(%err, "recovered during the bundle");
    }
    solution.write_network(&args.onet)?;
    solution.write_reports()?;

    if solution.results.status.is_converged() {
        if solution.settings.update_cube_label {
            solution.update_images()?;
        }
    } else if solution.settings.update_cube_label {
        warn!("bundle did not converge, image records left untouched");
    }
    solution.results.check()
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("jigsaw: {}: {err}", err.kind());
            ExitCode::FAILURE
        }
    }
}
