use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use chrono::{NaiveDate, Utc};
use rusqlite::{Connection, params};
use serde::Deserialize;
use tracing::{info, warn};

use crate::match_record::{MatchRecord, Outcome};
use crate::season::season_code_to_start_year;
use crate::simulation::SimulationReport;

const CACHE_DIR: &str = "football_sim";

#[derive(Debug, Clone)]
pub struct IngestSummary {
    pub db_path: PathBuf,
    pub rows_read: usize,
    pub matches_upserted: usize,
    pub leagues: Vec<String>,
}

pub fn app_cache_dir() -> Option<PathBuf> {
    if let Ok(base) = std::env::var("XDG_CACHE_HOME") {
        if !base.trim().is_empty() {
            return Some(PathBuf::from(base).join(CACHE_DIR));
        }
    }
    let home = std::env::var("HOME").ok()?;
    if home.trim().is_empty() {
        return None;
    }
    Some(PathBuf::from(home).join(".cache").join(CACHE_DIR))
}

pub fn default_db_path() -> Option<PathBuf> {
    app_cache_dir().map(|dir| dir.join("matches.sqlite"))
}

pub fn open_db(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let conn =
        Connection::open(path).with_context(|| format!("open sqlite db {}", path.display()))?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        CREATE TABLE IF NOT EXISTS matches (
            league_code TEXT NOT NULL,
            season_code TEXT NOT NULL,
            season_start_year INTEGER NOT NULL,
            match_date TEXT NOT NULL,
            home_team TEXT NOT NULL,
            away_team TEXT NOT NULL,
            home_goals INTEGER NOT NULL,
            away_goals INTEGER NOT NULL,
            result TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (league_code, season_code, match_date, home_team, away_team)
        );
        CREATE INDEX IF NOT EXISTS idx_matches_league ON matches(league_code);
        CREATE INDEX IF NOT EXISTS idx_matches_year ON matches(season_start_year);

        CREATE TABLE IF NOT EXISTS ingest_runs (
            run_id INTEGER PRIMARY KEY AUTOINCREMENT,
            started_at TEXT NOT NULL,
            finished_at TEXT NULL,
            source TEXT NOT NULL,
            rows_read INTEGER NOT NULL,
            matches_upserted INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS simulation_runs (
            run_id INTEGER PRIMARY KEY AUTOINCREMENT,
            created_at TEXT NOT NULL,
            league_code TEXT NOT NULL,
            season_code TEXT NULL,
            replications INTEGER NOT NULL,
            seed INTEGER NOT NULL,
            remaining_fixtures INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS simulation_results (
            run_id INTEGER NOT NULL REFERENCES simulation_runs(run_id),
            league_code TEXT NOT NULL,
            team TEXT NOT NULL,
            champion_probability REAL NOT NULL,
            top3_probability REAL NOT NULL,
            expected_points REAL NOT NULL,
            PRIMARY KEY (run_id, team)
        );
        "#,
    )
    .context("create sqlite schema")?;
    Ok(())
}

/// Loads a cleaned CSV and writes it into the store in one transaction.
pub fn ingest_clean_csv(conn: &mut Connection, db_path: PathBuf, csv_path: &Path) -> Result<IngestSummary> {
    let started_at = Utc::now().to_rfc3339();
    let rows = load_clean_csv(csv_path)?;
    if rows.is_empty() {
        return Err(anyhow!("no matches in {}", csv_path.display()));
    }

    let matches_upserted = upsert_matches(conn, &rows)?;
    let mut leagues: Vec<String> = rows.iter().map(|m| m.league_code.clone()).collect();
    leagues.sort_unstable();
    leagues.dedup();

    conn.execute(
        "INSERT INTO ingest_runs(started_at, finished_at, source, rows_read, matches_upserted)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            started_at,
            Utc::now().to_rfc3339(),
            csv_path.display().to_string(),
            rows.len() as i64,
            matches_upserted as i64
        ],
    )
    .context("insert ingest run")?;

    info!(
        source = %csv_path.display(),
        rows = rows.len(),
        upserted = matches_upserted,
        "ingested cleaned matches"
    );
    Ok(IngestSummary {
        db_path,
        rows_read: rows.len(),
        matches_upserted,
        leagues,
    })
}

pub fn upsert_matches(conn: &mut Connection, rows: &[MatchRecord]) -> Result<usize> {
    let tx = conn.transaction().context("begin ingest transaction")?;
    let mut upserted = 0usize;
    for row in rows {
        upsert_match(&tx, row)?;
        upserted += 1;
    }
    tx.commit().context("commit ingest transaction")?;
    Ok(upserted)
}

fn upsert_match(tx: &rusqlite::Transaction<'_>, m: &MatchRecord) -> Result<()> {
    tx.execute(
        r#"
        INSERT INTO matches (
            league_code, season_code, season_start_year, match_date,
            home_team, away_team, home_goals, away_goals, result, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        ON CONFLICT(league_code, season_code, match_date, home_team, away_team) DO UPDATE SET
            season_start_year = excluded.season_start_year,
            home_goals = excluded.home_goals,
            away_goals = excluded.away_goals,
            result = excluded.result,
            updated_at = excluded.updated_at
        "#,
        params![
            m.league_code,
            m.season_code,
            m.season_start_year,
            m.match_date.format("%Y-%m-%d").to_string(),
            m.home_team,
            m.away_team,
            m.home_goals,
            m.away_goals,
            m.result.code().to_string(),
            Utc::now().to_rfc3339(),
        ],
    )
    .context("upsert match")?;
    Ok(())
}

/// All matches of one league (or every league when `None`), in chronological order.
pub fn load_matches(conn: &Connection, league_code: Option<&str>) -> Result<Vec<MatchRecord>> {
    let mut stmt = conn
        .prepare(
            r#"
            SELECT
                league_code, season_code, season_start_year, match_date,
                home_team, away_team, home_goals, away_goals, result
            FROM matches
            WHERE ?1 IS NULL OR league_code = ?1
            ORDER BY league_code ASC, season_start_year ASC, match_date ASC, home_team ASC
            "#,
        )
        .context("prepare load matches query")?;

    let rows = stmt
        .query_map(params![league_code], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i32>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, u16>(6)?,
                row.get::<_, u16>(7)?,
                row.get::<_, String>(8)?,
            ))
        })
        .context("query load matches")?;

    let mut out = Vec::new();
    for row in rows {
        let (league, season, year, date, home, away, hg, ag, result) =
            row.context("decode match row")?;
        out.push(MatchRecord {
            league_code: league,
            season_code: season,
            season_start_year: year,
            match_date: parse_match_date(&date)?,
            home_team: home,
            away_team: away,
            home_goals: hg,
            away_goals: ag,
            result: Outcome::parse_code(&result)?,
        });
    }
    Ok(out)
}

pub fn league_codes(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn
        .prepare("SELECT DISTINCT league_code FROM matches ORDER BY league_code ASC")
        .context("prepare league codes query")?;
    let rows = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .context("query league codes")?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("decode league code")?);
    }
    Ok(out)
}

/// Persists one simulation report and returns its run id.
pub fn record_simulation(conn: &mut Connection, report: &SimulationReport) -> Result<i64> {
    let tx = conn.transaction().context("begin simulation transaction")?;
    tx.execute(
        "INSERT INTO simulation_runs(created_at, league_code, season_code, replications, seed, remaining_fixtures)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            Utc::now().to_rfc3339(),
            report.league_code,
            report.season_code,
            report.replications as i64,
            // SQLite integers are signed; keep the seed's bit pattern.
            report.seed as i64,
            report.remaining_fixtures as i64
        ],
    )
    .context("insert simulation run")?;
    let run_id = tx.last_insert_rowid();

    for row in &report.rows {
        tx.execute(
            "INSERT INTO simulation_results(run_id, league_code, team, champion_probability, top3_probability, expected_points)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                run_id,
                row.league_code,
                row.team,
                row.champion_probability,
                row.top3_probability,
                row.expected_points
            ],
        )
        .context("insert simulation result")?;
    }
    tx.commit().context("commit simulation transaction")?;
    Ok(run_id)
}

#[derive(Debug, Deserialize)]
struct CleanRow {
    league_code: String,
    season_code: String,
    #[serde(default)]
    season_start_year: Option<String>,
    match_date: String,
    home_team: String,
    away_team: String,
    home_goals: String,
    away_goals: String,
    full_time_result: String,
}

/// Reads the cleaning step's CSV. Extra columns are ignored; any malformed
/// row fails the whole load.
pub fn load_clean_csv(path: &Path) -> Result<Vec<MatchRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("open csv {}", path.display()))?;

    let mut out = Vec::new();
    for (idx, row) in reader.deserialize::<CleanRow>().enumerate() {
        // +2: header line and 1-based numbering.
        let line = idx + 2;
        let row = row.with_context(|| format!("{} line {line}: decode row", path.display()))?;
        let record = clean_row_to_record(row)
            .with_context(|| format!("{} line {line}", path.display()))?;
        out.push(record);
    }
    Ok(out)
}

fn clean_row_to_record(row: CleanRow) -> Result<MatchRecord> {
    let season_start_year = match row.season_start_year.as_deref().map(str::trim) {
        Some(raw) if !raw.is_empty() => parse_int(raw, "season_start_year")?,
        _ => season_code_to_start_year(&row.season_code)?,
    };
    let home_goals = parse_goals(&row.home_goals, "home_goals")?;
    let away_goals = parse_goals(&row.away_goals, "away_goals")?;
    let result = Outcome::parse_code(&row.full_time_result)?;
    if result != Outcome::from_goals(home_goals, away_goals) {
        warn!(
            home = %row.home_team,
            away = %row.away_team,
            result = %result,
            home_goals,
            away_goals,
            "result code disagrees with score; keeping result code"
        );
    }
    if row.home_team.is_empty() || row.away_team.is_empty() {
        return Err(anyhow!("empty team name"));
    }
    if row.home_team == row.away_team {
        return Err(anyhow!("{} listed as both home and away team", row.home_team));
    }

    Ok(MatchRecord {
        league_code: row.league_code,
        season_code: row.season_code,
        season_start_year,
        match_date: parse_match_date(&row.match_date)?,
        home_team: row.home_team,
        away_team: row.away_team,
        home_goals,
        away_goals,
        result,
    })
}

/// Accepts ISO dates (optionally followed by a time) and the raw feed's
/// `DD/MM/YY` / `DD/MM/YYYY`.
pub fn parse_match_date(raw: &str) -> Result<NaiveDate> {
    let s = raw.trim();
    let iso = s.get(..10).unwrap_or(s);
    if let Ok(d) = NaiveDate::parse_from_str(iso, "%Y-%m-%d") {
        return Ok(d);
    }
    // %Y would happily read "23" as year 23.
    let short_year = s.rsplit('/').next().is_some_and(|y| y.len() == 2);
    let fmt = if short_year { "%d/%m/%y" } else { "%d/%m/%Y" };
    if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
        return Ok(d);
    }
    Err(anyhow!("unparseable match date {raw:?}"))
}

fn parse_int(raw: &str, field: &str) -> Result<i32> {
    let v = raw
        .parse::<f64>()
        .map_err(|_| anyhow!("{field}: not a number: {raw:?}"))?;
    if v.fract() != 0.0 || !v.is_finite() {
        return Err(anyhow!("{field}: not an integer: {raw:?}"));
    }
    Ok(v as i32)
}

fn parse_goals(raw: &str, field: &str) -> Result<u16> {
    let v = parse_int(raw, field)?;
    u16::try_from(v).map_err(|_| anyhow!("{field}: out of range: {raw:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn match_dates_in_both_formats() {
        let want = NaiveDate::from_ymd_opt(2023, 8, 12).unwrap();
        assert_eq!(parse_match_date("2023-08-12").unwrap(), want);
        assert_eq!(parse_match_date("2023-08-12 00:00:00").unwrap(), want);
        assert_eq!(parse_match_date("12/08/23").unwrap(), want);
        assert_eq!(parse_match_date("12/08/2023").unwrap(), want);
        assert!(parse_match_date("Aug 12").is_err());
    }

    #[test]
    fn goals_accept_float_formatting_but_not_negatives() {
        assert_eq!(parse_goals("2.0", "g").unwrap(), 2);
        assert_eq!(parse_goals("0", "g").unwrap(), 0);
        assert!(parse_goals("-1", "g").is_err());
        assert!(parse_goals("1.5", "g").is_err());
    }
}
