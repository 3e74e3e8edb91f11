//! `bundleout.txt`: the human-readable run summary.
//!
//! Sections, in order: header (run time, network, target, status), settings snapshot
//! (`{:#}` of [`BundleSettings`](crate::settings::BundleSettings)), network counts,
//! per-iteration statistics, observation parameters, target body parameters and point
//! coordinates.
use std::fmt;

use comfy_table::{presets::UTF8_FULL, Cell, CellAlignment, ContentArrangement, Row, Table};

use crate::{
    constants::{DEGRAD, KM_PER_M},
    settings::CoordinateType,
    solution::{csv_output::parameter_unit, BundleSolutionInfo},
};

fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header.into_iter().map(Cell::new).collect::<Vec<_>>());
    table
}

fn right(s: impl ToString) -> Cell {
    Cell::new(s.to_string()).set_alignment(CellAlignment::Right)
}

fn opt(v: Option<f64>, precision: usize) -> String {
    v.map_or_else(|| "N/A".to_string(), |v| format!("{v:.precision$}"))
}

fn iteration_table(solution: &BundleSolutionInfo) -> Table {
    let mut table = new_table(vec![
        "Iteration",
        "Sigma0",
        "vtpv",
        "DOF",
        "Active",
        "Rejected",
        "Rejection limit",
        "ML model",
        "Tweaking c",
        "Max correction",
    ]);
    for r in &solution.results.iterations {
        table.add_row(Row::from(vec![
            right(r.iteration),
            right(format!("{:.6e}", r.sigma0)),
            right(format!("{:.6e}", r.vtpv)),
            right(r.dof),
            right(r.active_measures),
            right(r.rejected_measures),
            right(opt(r.rejection_limit, 4)),
            Cell::new(r.ml_model.map_or_else(|| "None".to_string(), |m| m.to_string())),
            right(opt(r.tweaking_constant, 4)),
            right(format!("{:.3e}", r.max_correction)),
        ]));
    }
    table
}

fn observation_table(solution: &BundleSolutionInfo) -> Table {
    let mut table = new_table(vec![
        "Observation",
        "Parameter",
        "Unit",
        "A priori",
        "Correction",
        "Adjusted",
        "A priori sigma",
        "Adjusted sigma",
    ]);
    for obs in solution.observations.iter() {
        if obs.parameter_count() == 0 {
            table.add_row(Row::from(vec![
                Cell::new(&obs.observation_number),
                Cell::new(if obs.held { "held" } else { "none solved" }),
            ]));
            continue;
        }
        for k in 0..obs.parameter_count() {
            let (unit, scale) = parameter_unit(&obs.layout[k]);
            let adjusted = obs.parameter_value(k);
            let correction = obs.corrections[k];
            table.add_row(Row::from(vec![
                Cell::new(&obs.observation_number),
                Cell::new(obs.parameter_name(k)),
                Cell::new(unit),
                right(format!("{:.8}", (adjusted - correction) * scale)),
                right(format!("{:.8}", correction * scale)),
                right(format!("{:.8}", adjusted * scale)),
                right(opt(obs.apriori_sigmas[k].map(|s| s * scale), 6)),
                right(opt(
                    obs.adjusted_sigmas
                        .as_ref()
                        .and_then(|s| s.get(k))
                        .map(|s| s * scale),
                    6,
                )),
            ]));
        }
    }
    table
}

fn target_table(solution: &BundleSolutionInfo) -> Table {
    let tp = &solution.target_parameters;
    let mut table = new_table(vec!["Parameter", "A priori", "Correction", "Adjusted", "A priori sigma", "Adjusted sigma"]);
    for (k, kind) in tp.kinds.iter().enumerate() {
        // keyword units: degrees or km
        let scale = 1.0 / kind.unit_scale();
        let adjusted = solution.target.parameter_value(*kind);
        table.add_row(Row::from(vec![
            Cell::new(kind.keyword()),
            right(format!("{:.8}", tp.apriori_values[k] * scale)),
            right(format!("{:.8}", tp.corrections[k] * scale)),
            right(format!("{:.8}", adjusted * scale)),
            right(opt(tp.apriori_sigmas[k].map(|s| s * scale), 6)),
            right(opt(
                tp.adjusted_sigmas.as_ref().and_then(|s| s.get(k)).map(|s| s * scale),
                6,
            )),
        ]));
    }
    table
}

fn point_table(solution: &BundleSolutionInfo) -> Table {
    let ct = solution.settings.coordinate_type_reports;
    let header = match ct {
        CoordinateType::Latitudinal => vec![
            "Point", "Status", "Measures", "Latitude (deg)", "Longitude (deg)", "Radius (km)",
            "Sigma lat (m)", "Sigma lon (m)", "Sigma radius (m)",
        ],
        CoordinateType::Rectangular => vec![
            "Point", "Status", "Measures", "X (km)", "Y (km)", "Z (km)", "Sigma X (m)",
            "Sigma Y (m)", "Sigma Z (m)",
        ],
    };
    let mut table = new_table(header);
    for point in solution.network.points.iter().filter(|p| !p.ignore) {
        let Some(sp) = point.best_surface_point() else {
            continue;
        };
        let c = match ct {
            CoordinateType::Latitudinal => {
                let (lat, lon, r) = sp.latitudinal();
                [lat * DEGRAD, lon * DEGRAD, r * KM_PER_M]
            }
            CoordinateType::Rectangular => [sp.x * KM_PER_M, sp.y * KM_PER_M, sp.z * KM_PER_M],
        };
        let sigmas = sp.sigmas_m(ct);
        let status = if point.jigsaw_rejected {
            format!("{} *", point.point_type)
        } else {
            point.point_type.to_string()
        };
        let mut row = vec![
            Cell::new(&point.id),
            Cell::new(status),
            right(format!(
                "{}/{}",
                point.number_of_active_measures(),
                point.number_of_valid_measures()
            )),
        ];
        row.extend(c.iter().map(|v| right(format!("{v:.8}"))));
        row.extend((0..3).map(|i| right(opt(sigmas.map(|s| s[i]), 4))));
        table.add_row(Row::from(row));
    }
    table
}

/// Full summary of a solution, rendered through `Display`.
pub struct Summary<'a>(pub &'a BundleSolutionInfo);

impl fmt::Display for Summary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let solution = self.0;
        let results = &solution.results;
        let counts = solution.network.counts();

        writeln!(f, "JIGSAW: BUNDLE ADJUSTMENT")?;
        writeln!(f, "=========================")?;
        writeln!(f, "Run time:           {}", solution.run_time)?;
        writeln!(f, "Network:            {}", solution.network.network_id)?;
        writeln!(f, "Target:             {}", solution.target.name)?;
        writeln!(f, "Status:             {}", results.status)?;
        writeln!(f, "Iterations:         {}", results.iteration_count())?;
        writeln!(f, "Sigma0:             {:.10e}", results.sigma0)?;
        writeln!(f, "Degrees of freedom: {}", results.dof)?;
        writeln!(f, "Error propagation:  {}", results.error_propagation)?;
        writeln!(f)?;
        writeln!(f, "{:#}", solution.settings)?;

        writeln!(f, "Network counts")?;
        writeln!(f, "--------------")?;
        writeln!(f, "  points:             {}", counts.points)?;
        writeln!(f, "    fixed:            {}", counts.fixed_points)?;
        writeln!(f, "    constrained:      {}", counts.constrained_points)?;
        writeln!(f, "    free:             {}", counts.free_points)?;
        writeln!(f, "    ignored:          {}", counts.ignored_points)?;
        writeln!(f, "    rejected:         {}", counts.rejected_points)?;
        writeln!(f, "  measures:           {}", counts.measures)?;
        writeln!(f, "    ignored:          {}", counts.ignored_measures)?;
        writeln!(f, "    rejected:         {}", counts.rejected_measures)?;
        writeln!(f, "  images:             {}", solution.images.len())?;
        writeln!(f, "  observations:       {}", solution.observations.len())?;
        if !solution.lidar_ids.is_empty() {
            writeln!(f, "  lidar points:       {}", solution.lidar_ids.len())?;
        }
        if !results.ill_conditioned_points.is_empty() {
            writeln!(
                f,
                "  ill-conditioned:    {}",
                results.ill_conditioned_points.join(", ")
            )?;
        }
        writeln!(f)?;

        writeln!(f, "Iterations")?;
        writeln!(f, "{}", iteration_table(solution))?;
        writeln!(f)?;
        writeln!(f, "Observations")?;
        writeln!(f, "{}", observation_table(solution))?;
        if !solution.target_parameters.is_empty() {
            writeln!(f)?;
            writeln!(f, "Target body")?;
            writeln!(f, "{}", target_table(solution))?;
        }
        writeln!(f)?;
        writeln!(f, "Points")?;
        writeln!(f, "{}", point_table(solution))
    }
}
