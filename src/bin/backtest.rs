use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use tracing_subscriber::EnvFilter;

use football_sim::calibration::{self, LeagueScore};
use football_sim::config::EngineConfig;
use football_sim::features::build_match_features;
use football_sim::historical_dataset;

/// Leagues with fewer scored matches than this are reported as skipped.
const MIN_SAMPLES: usize = 8;

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cfg = EngineConfig::load(parse_path_arg("--config").as_deref())?;
    let league = parse_string_arg("--league");

    let (source, matches) = if let Some(csv) = parse_path_arg("--csv") {
        let rows = historical_dataset::load_clean_csv(&csv)?;
        (csv, rows)
    } else {
        let db_path = parse_path_arg("--db")
            .or_else(|| std::env::var("HIST_DB_PATH").ok().map(PathBuf::from))
            .or_else(historical_dataset::default_db_path)
            .context("unable to resolve sqlite path")?;
        let conn = historical_dataset::open_db(&db_path)?;
        let rows = historical_dataset::load_matches(&conn, league.as_deref())?;
        (db_path, rows)
    };

    let mut matches = matches;
    if let Some(league) = &league {
        matches.retain(|m| &m.league_code == league);
    }

    let records = build_match_features(&matches, &cfg.tracker);
    let (scores, skipped): (Vec<LeagueScore>, Vec<LeagueScore>) =
        calibration::score_feature_records(&records, &cfg.model)
            .into_iter()
            .partition(|s| s.model.samples >= MIN_SAMPLES);

    println!("Pre-match heuristic backtest");
    println!("Source: {}", source.display());
    if !skipped.is_empty() {
        let codes: Vec<&str> = skipped.iter().map(|s| s.league_code.as_str()).collect();
        println!("Skipped (insufficient data): {codes:?}");
    }
    println!();

    if scores.is_empty() {
        return Err(anyhow!("no league had enough samples to evaluate"));
    }

    for s in &scores {
        println!(
            "league {} samples={} ll={:.4} ll_base={:.4} brier={:.4} brier_base={:.4} acc={:.3} ece_home={:.4} gain={:+.6}",
            s.league_code,
            s.model.samples,
            s.model.log_loss,
            s.base_rate.log_loss,
            s.model.brier,
            s.base_rate.brier,
            s.model.accuracy,
            s.ece_home,
            s.base_rate.log_loss - s.model.log_loss
        );
    }

    let total_samples: usize = scores.iter().map(|s| s.model.samples).sum();
    println!();
    println!(
        "aggregate samples={} ll={:.4} ll_base={:.4} brier={:.4} brier_base={:.4} ece_home={:.4}",
        total_samples,
        weighted_mean(&scores, total_samples, |s| s.model.log_loss),
        weighted_mean(&scores, total_samples, |s| s.base_rate.log_loss),
        weighted_mean(&scores, total_samples, |s| s.model.brier),
        weighted_mean(&scores, total_samples, |s| s.base_rate.brier),
        weighted_mean(&scores, total_samples, |s| s.ece_home)
    );

    Ok(())
}

fn weighted_mean(scores: &[LeagueScore], total: usize, f: impl Fn(&LeagueScore) -> f64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    scores
        .iter()
        .map(|s| f(s) * s.model.samples as f64)
        .sum::<f64>()
        / total as f64
}

fn parse_string_arg(name: &str) -> Option<String> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let prefix = format!("{name}=");
    for (idx, arg) in args.iter().enumerate() {
        if let Some(raw) = arg.strip_prefix(&prefix) {
            let trimmed = raw.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
        if arg == name
            && let Some(next) = args.get(idx + 1)
            && !next.trim().is_empty()
        {
            return Some(next.trim().to_string());
        }
    }
    None
}

fn parse_path_arg(name: &str) -> Option<PathBuf> {
    parse_string_arg(name).map(PathBuf::from)
}
