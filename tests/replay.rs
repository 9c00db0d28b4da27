use chrono::NaiveDate;

use football_sim::elo::BASE_RATING;
use football_sim::features::{FeatureRow, LeagueScope, SeasonPhase, build_match_features};
use football_sim::match_record::{MatchRecord, Outcome};
use football_sim::team_state::TrackerConfig;

fn day(season_start: i32, offset: i64) -> NaiveDate {
    NaiveDate::from_ymd_opt(season_start, 8, 1).unwrap() + chrono::Duration::days(offset)
}

fn m(season: &str, date: NaiveDate, home: &str, away: &str, hg: u16, ag: u16) -> MatchRecord {
    let year = 2000 + season[..2].parse::<i32>().unwrap();
    MatchRecord {
        league_code: "E0".to_string(),
        season_code: season.to_string(),
        season_start_year: year,
        match_date: date,
        home_team: home.to_string(),
        away_team: away.to_string(),
        home_goals: hg,
        away_goals: ag,
        result: Outcome::from_goals(hg, ag),
    }
}

fn history() -> Vec<MatchRecord> {
    vec![
        m("2223", day(2022, 0), "Arsenal", "Chelsea", 2, 0),
        m("2223", day(2022, 3), "Everton", "Fulham", 1, 1),
        m("2223", day(2022, 7), "Chelsea", "Everton", 0, 1),
        m("2223", day(2022, 10), "Fulham", "Arsenal", 0, 3),
        m("2223", day(2022, 14), "Arsenal", "Everton", 1, 2),
        m("2324", day(2023, 0), "Chelsea", "Arsenal", 1, 1),
        m("2324", day(2023, 4), "Fulham", "Everton", 2, 1),
        m("2324", day(2023, 8), "Arsenal", "Fulham", 4, 0),
    ]
}

fn rows_of(matches: &[MatchRecord]) -> Vec<FeatureRow> {
    let mut scope = LeagueScope::new("E0", TrackerConfig::default());
    let mut rows = Vec::new();
    scope.replay(matches, |_, row| rows.push(*row));
    rows
}

#[test]
fn rows_do_not_depend_on_later_matches() {
    let full = history();
    let full_rows = rows_of(&full);

    for cut in 1..full.len() {
        let prefix_rows = rows_of(&full[..cut]);
        assert_eq!(prefix_rows, full_rows[..cut], "prefix of length {cut}");
    }

    // Rewriting a later result must not touch earlier rows.
    let mut altered = full.clone();
    let last = altered.len() - 1;
    altered[last].home_goals = 0;
    altered[last].away_goals = 5;
    altered[last].result = Outcome::Away;
    let altered_rows = rows_of(&altered);
    assert_eq!(altered_rows[..last], full_rows[..last]);
}

#[test]
fn first_meeting_uses_defaults() {
    let rows = rows_of(&history());
    let first = rows[0];
    assert_eq!(first.home_elo_pre, BASE_RATING);
    assert_eq!(first.away_elo_pre, BASE_RATING);
    assert_eq!(first.home_matches_played_pre, 0.0);
    assert_eq!(first.home_points_per_game_pre, 0.0);
    assert_eq!(first.home_rest_days_pre, 7.0);
    assert_eq!(first.rest_days_diff, 0.0);
}

#[test]
fn elo_is_zero_sum_across_a_season() {
    let season: Vec<MatchRecord> = history()
        .into_iter()
        .filter(|m| m.season_code == "2223")
        .collect();
    let mut scope = LeagueScope::new("E0", TrackerConfig::default());
    scope.replay(&season, |_, _| {});
    let total: f64 = scope.states().iter().map(|s| s.elo).sum();
    let expected = BASE_RATING * scope.states().len() as f64;
    assert!((total - expected).abs() < 1e-9, "total={total}");
}

#[test]
fn season_boundary_regresses_ratings_and_resets_tallies() {
    let cfg = TrackerConfig::default();
    let mut scope = LeagueScope::new("E0", cfg);
    assert_eq!(scope.enter_season("2223"), SeasonPhase::WithinSeason);

    let mut a = football_sim::team_state::TeamState::new(&cfg);
    a.elo = 1700.0;
    a.points = 30;
    a.matches_played = 12;
    scope.insert_state("Arsenal", a);

    assert_eq!(scope.enter_season("2223"), SeasonPhase::WithinSeason);
    assert_eq!(scope.enter_season("2324"), SeasonPhase::SeasonTransition);
    let a = scope.state("Arsenal").unwrap();
    assert_eq!(a.elo, 1650.0);
    assert_eq!(a.points, 0);
    assert_eq!(a.matches_played, 0);
    assert!(a.recent_points.is_empty());
    assert_eq!(a.last_match_date, None);
}

#[test]
fn recent_windows_stay_bounded() {
    let cfg = TrackerConfig {
        recent_window: 3,
        ..TrackerConfig::default()
    };
    let mut scope = LeagueScope::new("E0", cfg);
    for i in 0..10 {
        scope.apply_result("A", "B", 1, 0, Outcome::Home, day(2023, i * 3));
    }
    let a = scope.state("A").unwrap();
    assert_eq!(a.recent_points.len(), 3);
    assert_eq!(a.recent_points.mean(), 3.0);
    assert_eq!(a.matches_played, 10);
    assert_eq!(a.points, 30);
}

#[test]
fn unknown_teams_are_created_on_first_sight() {
    let mut scope = LeagueScope::new("E0", TrackerConfig::default());
    let row = scope.feature_row("Newcomer", "Other", day(2023, 0));
    assert_eq!(row.home_elo_pre, BASE_RATING);
    assert_eq!(scope.teams().len(), 2);
    assert!(scope.state("Newcomer").is_some());
}

#[test]
fn feature_table_keeps_input_match_count() {
    let mut matches = history();
    let mut other = matches[0].clone();
    other.league_code = "SP1".to_string();
    matches.push(other);

    let records = build_match_features(&matches, &TrackerConfig::default());
    assert_eq!(records.len(), matches.len());
    assert_eq!(records[0].league_code, "E0");
    assert_eq!(records.last().unwrap().league_code, "SP1");
    // The lone SP1 match sees fresh ratings.
    assert_eq!(records.last().unwrap().row.home_elo_pre, BASE_RATING);
}

#[test]
fn match_against_itself_is_skipped() {
    let mut matches = history();
    matches.insert(2, m("2223", day(2022, 5), "Everton", "Everton", 2, 1));
    let clean = history();

    assert_eq!(rows_of(&matches), rows_of(&clean));
    let records = build_match_features(&matches, &TrackerConfig::default());
    assert_eq!(records.len(), clean.len());
    assert!(records.iter().all(|r| r.home_team != r.away_team));

    let mut scope = LeagueScope::new("E0", TrackerConfig::default());
    let applied = scope.apply_result("A", "A", 1, 0, Outcome::Home, day(2023, 0));
    assert!(applied.is_none());
    let a = scope.state("A").unwrap();
    assert_eq!(a.elo, BASE_RATING);
    assert_eq!(a.matches_played, 0);
}
