use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use tracing_subscriber::EnvFilter;

use football_sim::historical_dataset;

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let csv_path = parse_path_arg("--csv")
        .context("missing --csv PATH (cleaned match history)")?;
    if !csv_path.exists() {
        return Err(anyhow!("csv not found: {}", csv_path.display()));
    }

    let db_path = parse_path_arg("--db")
        .or_else(|| std::env::var("HIST_DB_PATH").ok().map(PathBuf::from))
        .or_else(historical_dataset::default_db_path)
        .context("unable to resolve sqlite path")?;

    let mut conn = historical_dataset::open_db(&db_path)?;
    let summary = historical_dataset::ingest_clean_csv(&mut conn, db_path.clone(), &csv_path)?;

    println!("Historical ingest complete");
    println!("DB: {}", summary.db_path.display());
    println!("Source: {}", csv_path.display());
    println!("Leagues: {:?}", summary.leagues);
    println!("Rows read: {}", summary.rows_read);
    println!("Matches upserted: {}", summary.matches_upserted);

    for league in historical_dataset::league_codes(&conn)? {
        let stored = historical_dataset::load_matches(&conn, Some(&league))?;
        let latest = stored
            .last()
            .map(|m| m.match_date.to_string())
            .unwrap_or_else(|| "n/a".to_string());
        println!("league {league}: matches={} latest={latest}", stored.len());
    }

    Ok(())
}

fn parse_path_arg(name: &str) -> Option<PathBuf> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let prefix = format!("{name}=");
    for (idx, arg) in args.iter().enumerate() {
        if let Some(path) = arg.strip_prefix(&prefix) {
            let trimmed = path.trim();
            if !trimmed.is_empty() {
                return Some(PathBuf::from(trimmed));
            }
        }
        if arg == name {
            let Some(next) = args.get(idx + 1) else {
                continue;
            };
            if !next.trim().is_empty() {
                return Some(PathBuf::from(next));
            }
        }
    }
    None
}
