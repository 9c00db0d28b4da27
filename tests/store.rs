use std::fs;

use football_sim::historical_dataset;
use football_sim::match_record::Outcome;
use football_sim::simulation::SimulationReport;
use football_sim::aggregate::SimulationRow;

const CLEAN_CSV: &str = "\
league_code,season_code,season_start_year,match_date,home_team,away_team,home_goals,away_goals,full_time_result
E0,2324,2023,2023-08-11,Burnley,Man City,0.0,3.0,A
E0,2324,,12/08/2023,Arsenal,Nott'm Forest,2,1,H
SP1,9394,,1993-09-05,Barcelona,Sevilla,1,1,D
";

#[test]
fn clean_csv_loads_and_derives_missing_years() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("clean.csv");
    fs::write(&path, CLEAN_CSV).unwrap();

    let rows = historical_dataset::load_clean_csv(&path).unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0].away_goals, 3);
    assert_eq!(rows[0].result, Outcome::Away);
    assert_eq!(rows[1].season_start_year, 2023);
    assert_eq!(rows[1].match_date.to_string(), "2023-08-12");
    assert_eq!(rows[2].season_start_year, 1993);
}

#[test]
fn malformed_row_names_its_line() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.csv");
    fs::write(
        &path,
        "league_code,season_code,season_start_year,match_date,home_team,away_team,home_goals,away_goals,full_time_result\n\
E0,2324,2023,2023-08-11,Burnley,Man City,0,3,X\n",
    )
    .unwrap();
    let err = historical_dataset::load_clean_csv(&path).unwrap_err();
    assert!(format!("{err:#}").contains("line 2"));
}

#[test]
fn team_listed_on_both_sides_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("self.csv");
    fs::write(
        &path,
        "league_code,season_code,season_start_year,match_date,home_team,away_team,home_goals,away_goals,full_time_result\n\
E0,2324,2023,2023-08-11,Burnley,Burnley,1,0,H\n",
    )
    .unwrap();
    let err = historical_dataset::load_clean_csv(&path).unwrap_err();
    let msg = format!("{err:#}");
    assert!(msg.contains("line 2"), "{msg}");
    assert!(msg.contains("both home and away"), "{msg}");
}

#[test]
fn sqlite_round_trip_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let csv_path = dir.path().join("clean.csv");
    fs::write(&csv_path, CLEAN_CSV).unwrap();
    let db_path = dir.path().join("matches.sqlite");

    let mut conn = historical_dataset::open_db(&db_path).unwrap();
    let first = historical_dataset::ingest_clean_csv(&mut conn, db_path.clone(), &csv_path).unwrap();
    let second = historical_dataset::ingest_clean_csv(&mut conn, db_path.clone(), &csv_path).unwrap();
    assert_eq!(first.matches_upserted, 3);
    assert_eq!(second.matches_upserted, 3);
    assert_eq!(first.leagues, vec!["E0".to_string(), "SP1".to_string()]);

    let all = historical_dataset::load_matches(&conn, None).unwrap();
    assert_eq!(all.len(), 3);
    let e0 = historical_dataset::load_matches(&conn, Some("E0")).unwrap();
    assert_eq!(e0.len(), 2);
    assert_eq!(e0[0].home_team, "Burnley");
    assert_eq!(
        historical_dataset::league_codes(&conn).unwrap(),
        vec!["E0".to_string(), "SP1".to_string()]
    );
}

#[test]
fn simulation_runs_are_recorded() {
    let dir = tempfile::tempdir().unwrap();
    let mut conn = historical_dataset::open_db(&dir.path().join("sim.sqlite")).unwrap();
    let report = SimulationReport {
        league_code: "E0".to_string(),
        season_code: Some("2324".to_string()),
        replications: 10,
        seed: u64::MAX,
        remaining_fixtures: 4,
        rows: vec![SimulationRow {
            league_code: "E0".to_string(),
            team: "Arsenal".to_string(),
            champion_probability: 0.6,
            top3_probability: 0.9,
            expected_points: 80.5,
        }],
    };
    let first = historical_dataset::record_simulation(&mut conn, &report).unwrap();
    let second = historical_dataset::record_simulation(&mut conn, &report).unwrap();
    assert!(second > first);

    let stored: f64 = conn
        .query_row(
            "SELECT champion_probability FROM simulation_results WHERE run_id = ?1",
            [second],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(stored, 0.6);
}
