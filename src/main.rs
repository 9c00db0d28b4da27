use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result, anyhow};
use tracing::info;
use tracing_subscriber::EnvFilter;

use football_sim::config::EngineConfig;
use football_sim::export;
use football_sim::features::build_match_features;
use football_sim::historical_dataset;
use football_sim::match_record::MatchRecord;
use football_sim::simulation::simulate_latest_season;

const USAGE: &str = "usage: football_sim <features|simulate> [--csv PATH | --db PATH] [--league CODE] \
[--config PATH] [--out DIR] [--simulations N] [--seed N] [--workers N] [--carry-elo] [--record]";

fn main() -> Result<()> {
    init_logging();

    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let Some(command) = args.first().cloned() else {
        return Err(anyhow!(USAGE));
    };

    let config_path = arg_value(&args, "--config").map(PathBuf::from);
    let mut cfg = EngineConfig::load(config_path.as_deref())?;
    if let Some(n) = parse_arg::<usize>(&args, "--simulations")? {
        cfg.sim.simulations = n;
    }
    if let Some(seed) = parse_arg::<u64>(&args, "--seed")? {
        cfg.sim.seed = seed;
    }
    if let Some(workers) = parse_arg::<usize>(&args, "--workers")? {
        cfg.sim.workers = workers;
    }
    if has_flag(&args, "--carry-elo") {
        cfg.sim.carry_elo = true;
    }

    let out_dir = arg_value(&args, "--out")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("out"));

    match command.as_str() {
        "features" => run_features(&args, &cfg, &out_dir),
        "simulate" => run_simulate(&args, &cfg, &out_dir),
        "-h" | "--help" | "help" => {
            println!("{USAGE}");
            Ok(())
        }
        other => Err(anyhow!("unknown command {other:?}\n{USAGE}")),
    }
}

fn run_features(args: &[String], cfg: &EngineConfig, out_dir: &Path) -> Result<()> {
    let matches = load_input(args)?;
    let records = build_match_features(&matches, &cfg.tracker);
    let summary = export::export_features(out_dir, &records)?;

    println!("Feature build complete");
    println!("Matches: {}", matches.len());
    println!("Rows: {}", summary.rows);
    println!("CSV: {}", summary.csv_path.display());
    Ok(())
}

fn run_simulate(args: &[String], cfg: &EngineConfig, out_dir: &Path) -> Result<()> {
    let matches = load_input(args)?;
    let reports = simulate_latest_season(&matches, cfg.tracker, &cfg.model, cfg.sim)?;
    if reports.is_empty() {
        return Err(anyhow!("no league had matches in the latest season"));
    }
    let summary = export::export_simulations(out_dir, &reports)?;

    if has_flag(args, "--record") {
        let db_path = resolve_db_path(args)?;
        let mut conn = historical_dataset::open_db(&db_path)?;
        for report in &reports {
            let run_id = historical_dataset::record_simulation(&mut conn, report)?;
            info!(league = %report.league_code, run_id, "recorded simulation run");
        }
    }

    println!("Season simulation complete");
    println!(
        "Replications: {} per league (seed {})",
        cfg.sim.simulations, cfg.sim.seed
    );
    for report in &reports {
        let leader = report
            .rows
            .first()
            .map(|r| format!("{} ({:.3})", r.team, r.champion_probability))
            .unwrap_or_else(|| "n/a".to_string());
        println!(
            "league {}: season={} teams={} remaining={} favourite={}",
            report.league_code,
            report.season_code.as_deref().unwrap_or("n/a"),
            report.rows.len(),
            report.remaining_fixtures,
            leader
        );
    }
    println!("CSV: {}", summary.csv_path.display());
    if let Some(md) = &summary.markdown_path {
        println!("Report: {}", md.display());
    }
    Ok(())
}

fn load_input(args: &[String]) -> Result<Vec<MatchRecord>> {
    let league = arg_value(args, "--league");
    let mut matches = if let Some(csv) = arg_value(args, "--csv") {
        historical_dataset::load_clean_csv(Path::new(&csv))?
    } else {
        let db_path = resolve_db_path(args)?;
        let conn = historical_dataset::open_db(&db_path)?;
        historical_dataset::load_matches(&conn, league.as_deref())?
    };
    if let Some(league) = league {
        matches.retain(|m| m.league_code == league);
    }
    if matches.is_empty() {
        return Err(anyhow!("no matches loaded"));
    }
    info!(matches = matches.len(), "loaded match history");
    Ok(matches)
}

fn resolve_db_path(args: &[String]) -> Result<PathBuf> {
    arg_value(args, "--db")
        .map(PathBuf::from)
        .or_else(|| std::env::var("HIST_DB_PATH").ok().map(PathBuf::from))
        .or_else(historical_dataset::default_db_path)
        .context("unable to resolve sqlite path")
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn arg_value(args: &[String], name: &str) -> Option<String> {
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

fn parse_arg<T: FromStr>(args: &[String], name: &str) -> Result<Option<T>> {
    let Some(raw) = arg_value(args, name) else {
        return Ok(None);
    };
    raw.parse::<T>()
        .map(Some)
        .map_err(|_| anyhow!("invalid value for {name}: {raw:?}"))
}

fn has_flag(args: &[String], name: &str) -> bool {
    args.iter().any(|a| a == name)
}
