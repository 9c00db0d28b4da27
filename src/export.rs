use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::aggregate::SimulationRow;
use crate::features::FeatureRecord;
use crate::season::season_code_to_label;
use crate::simulation::SimulationReport;

pub const CHAMPION_CSV: &str = "champion_probabilities.csv";
pub const CHAMPION_MD: &str = "champion_probabilities.md";
pub const FEATURES_CSV: &str = "match_features.csv";

const REPORT_TOP_TEAMS: usize = 5;

#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub csv_path: PathBuf,
    pub markdown_path: Option<PathBuf>,
    pub rows: usize,
}

pub fn write_csv_rows<T: Serialize>(path: &Path, rows: &[T]) -> Result<usize> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create output dir {}", parent.display()))?;
    }
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("create csv {}", path.display()))?;
    for row in rows {
        writer
            .serialize(row)
            .with_context(|| format!("write row to {}", path.display()))?;
    }
    writer
        .flush()
        .with_context(|| format!("flush csv {}", path.display()))?;
    Ok(rows.len())
}

pub fn export_features(out_dir: &Path, records: &[FeatureRecord]) -> Result<ExportSummary> {
    let csv_path = out_dir.join(FEATURES_CSV);
    let rows = write_csv_rows(&csv_path, records)?;
    Ok(ExportSummary {
        csv_path,
        markdown_path: None,
        rows,
    })
}

/// Writes the combined probability table (by league, then champion
/// probability descending) and the markdown summary next to it.
pub fn export_simulations(out_dir: &Path, reports: &[SimulationReport]) -> Result<ExportSummary> {
    let rows = combined_rows(reports);
    let csv_path = out_dir.join(CHAMPION_CSV);
    write_csv_rows(&csv_path, &rows)?;

    let markdown_path = out_dir.join(CHAMPION_MD);
    fs::write(&markdown_path, render_champion_report(reports))
        .with_context(|| format!("write report {}", markdown_path.display()))?;

    Ok(ExportSummary {
        csv_path,
        markdown_path: Some(markdown_path),
        rows: rows.len(),
    })
}

pub fn combined_rows(reports: &[SimulationReport]) -> Vec<SimulationRow> {
    let mut ordered: Vec<&SimulationReport> = reports.iter().collect();
    ordered.sort_by(|a, b| a.league_code.cmp(&b.league_code));
    // Each report's rows are already in ranking order.
    ordered
        .into_iter()
        .flat_map(|r| r.rows.iter().cloned())
        .collect()
}

pub fn render_champion_report(reports: &[SimulationReport]) -> String {
    let mut ordered: Vec<&SimulationReport> = reports.iter().collect();
    ordered.sort_by(|a, b| a.league_code.cmp(&b.league_code));

    let mut out = String::new();
    out.push_str("# Champion Probability Report\n\n");
    if let Some(first) = ordered.first() {
        let _ = writeln!(out, "- Simulations per league: {}", first.replications);
        let _ = writeln!(out, "- Seed: {}", first.seed);
    }
    out.push_str(
        "- Probability engine: Elo + recent form + points-per-game heuristic (Monte Carlo).\n\n",
    );

    for report in ordered {
        let _ = writeln!(out, "## {}", report.league_code);
        if let Some(season) = &report.season_code {
            let label = season_code_to_label(season).unwrap_or_else(|_| season.clone());
            let _ = writeln!(
                out,
                "_season {label}, {} fixtures remaining_\n",
                report.remaining_fixtures
            );
        }
        for row in report.rows.iter().take(REPORT_TOP_TEAMS) {
            let _ = writeln!(
                out,
                "- {}: champion={:.3}, top3={:.3}, expected_points={:.2}",
                row.team, row.champion_probability, row.top3_probability, row.expected_points
            );
        }
        out.push('\n');
    }
    out
}
