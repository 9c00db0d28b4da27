use std::collections::HashMap;

use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use serde::ser::{SerializeStruct, Serializer};
use tracing::{debug, warn};

use crate::match_record::{MatchRecord, Outcome, sort_by_league_then_time};
use crate::team_state::{FeatureSnapshot, TeamState, TrackerConfig, apply_match};

/// Pre-match features for one fixture. Diffs are home minus away.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FeatureRow {
    pub home_elo_pre: f64,
    pub away_elo_pre: f64,
    pub elo_diff: f64,
    pub home_matches_played_pre: f64,
    pub away_matches_played_pre: f64,
    pub home_points_per_game_pre: f64,
    pub away_points_per_game_pre: f64,
    pub ppg_diff: f64,
    pub home_goal_diff_per_game_pre: f64,
    pub away_goal_diff_per_game_pre: f64,
    pub goal_diff_pg_diff: f64,
    pub home_recent_points_avg_pre: f64,
    pub away_recent_points_avg_pre: f64,
    pub recent_points_diff: f64,
    pub home_recent_goal_diff_avg_pre: f64,
    pub away_recent_goal_diff_avg_pre: f64,
    pub recent_goal_diff_diff: f64,
    pub home_rest_days_pre: f64,
    pub away_rest_days_pre: f64,
    pub rest_days_diff: f64,
    pub month: u32,
    // 0 = Monday.
    pub weekday: u32,
}

impl FeatureRow {
    pub fn from_snapshots(home: &FeatureSnapshot, away: &FeatureSnapshot, date: NaiveDate) -> Self {
        Self {
            home_elo_pre: home.elo_pre,
            away_elo_pre: away.elo_pre,
            elo_diff: home.elo_pre - away.elo_pre,
            home_matches_played_pre: home.matches_played_pre,
            away_matches_played_pre: away.matches_played_pre,
            home_points_per_game_pre: home.points_per_game_pre,
            away_points_per_game_pre: away.points_per_game_pre,
            ppg_diff: home.points_per_game_pre - away.points_per_game_pre,
            home_goal_diff_per_game_pre: home.goal_diff_per_game_pre,
            away_goal_diff_per_game_pre: away.goal_diff_per_game_pre,
            goal_diff_pg_diff: home.goal_diff_per_game_pre - away.goal_diff_per_game_pre,
            home_recent_points_avg_pre: home.recent_points_avg_pre,
            away_recent_points_avg_pre: away.recent_points_avg_pre,
            recent_points_diff: home.recent_points_avg_pre - away.recent_points_avg_pre,
            home_recent_goal_diff_avg_pre: home.recent_goal_diff_avg_pre,
            away_recent_goal_diff_avg_pre: away.recent_goal_diff_avg_pre,
            recent_goal_diff_diff: home.recent_goal_diff_avg_pre - away.recent_goal_diff_avg_pre,
            home_rest_days_pre: home.rest_days_pre,
            away_rest_days_pre: away.rest_days_pre,
            rest_days_diff: home.rest_days_pre - away.rest_days_pre,
            month: date.month(),
            weekday: date.weekday().num_days_from_monday(),
        }
    }

    /// The float feature columns, named as they appear in exported tables.
    pub fn numeric_columns(&self) -> [(&'static str, f64); 20] {
        [
            ("home_elo_pre", self.home_elo_pre),
            ("away_elo_pre", self.away_elo_pre),
            ("elo_diff", self.elo_diff),
            ("home_matches_played_pre", self.home_matches_played_pre),
            ("away_matches_played_pre", self.away_matches_played_pre),
            ("home_points_per_game_pre", self.home_points_per_game_pre),
            ("away_points_per_game_pre", self.away_points_per_game_pre),
            ("ppg_diff", self.ppg_diff),
            ("home_goal_diff_per_game_pre", self.home_goal_diff_per_game_pre),
            ("away_goal_diff_per_game_pre", self.away_goal_diff_per_game_pre),
            ("goal_diff_pg_diff", self.goal_diff_pg_diff),
            ("home_recent_points_avg_pre", self.home_recent_points_avg_pre),
            ("away_recent_points_avg_pre", self.away_recent_points_avg_pre),
            ("recent_points_diff", self.recent_points_diff),
            ("home_recent_goal_diff_avg_pre", self.home_recent_goal_diff_avg_pre),
            ("away_recent_goal_diff_avg_pre", self.away_recent_goal_diff_avg_pre),
            ("recent_goal_diff_diff", self.recent_goal_diff_diff),
            ("home_rest_days_pre", self.home_rest_days_pre),
            ("away_rest_days_pre", self.away_rest_days_pre),
            ("rest_days_diff", self.rest_days_diff),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeasonPhase {
    WithinSeason,
    SeasonTransition,
}

/// Tracks the season code while walking a league chronologically.
#[derive(Debug, Clone, Default)]
pub struct SeasonClock {
    current: Option<String>,
}

impl SeasonClock {
    pub fn observe(&mut self, season_code: &str) -> SeasonPhase {
        match self.current.as_deref() {
            Some(current) if current == season_code => SeasonPhase::WithinSeason,
            Some(_) => {
                self.current = Some(season_code.to_string());
                SeasonPhase::SeasonTransition
            }
            None => {
                self.current = Some(season_code.to_string());
                SeasonPhase::WithinSeason
            }
        }
    }

    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }
}

/// Owns every team's state for one league run. Teams are interned to dense
/// indices so the whole state table can be copied by value.
#[derive(Debug, Clone)]
pub struct LeagueScope {
    league_code: String,
    cfg: TrackerConfig,
    index: HashMap<String, usize>,
    teams: Vec<String>,
    states: Vec<TeamState>,
    clock: SeasonClock,
}

impl LeagueScope {
    pub fn new(league_code: impl Into<String>, cfg: TrackerConfig) -> Self {
        Self {
            league_code: league_code.into(),
            cfg,
            index: HashMap::new(),
            teams: Vec::new(),
            states: Vec::new(),
            clock: SeasonClock::default(),
        }
    }

    pub fn league_code(&self) -> &str {
        &self.league_code
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.cfg
    }

    pub fn teams(&self) -> &[String] {
        &self.teams
    }

    pub fn states(&self) -> &[TeamState] {
        &self.states
    }

    pub fn team_index(&self, team: &str) -> Option<usize> {
        self.index.get(team).copied()
    }

    pub fn state(&self, team: &str) -> Option<&TeamState> {
        self.team_index(team).map(|idx| &self.states[idx])
    }

    /// Looks up a team, creating a fresh state on first reference.
    pub fn resolve(&mut self, team: &str) -> usize {
        if let Some(idx) = self.index.get(team) {
            return *idx;
        }
        let idx = self.states.len();
        self.teams.push(team.to_string());
        self.states.push(TeamState::new(&self.cfg));
        self.index.insert(team.to_string(), idx);
        idx
    }

    /// Inserts or replaces a team's state wholesale.
    pub fn insert_state(&mut self, team: &str, state: TeamState) {
        let idx = self.resolve(team);
        self.states[idx] = state;
    }

    /// Advances the season clock and regresses every known team once when the
    /// season code changes.
    pub fn enter_season(&mut self, season_code: &str) -> SeasonPhase {
        let phase = self.clock.observe(season_code);
        if phase == SeasonPhase::SeasonTransition {
            for state in &mut self.states {
                state.regress_for_new_season(&self.cfg);
            }
            debug!(
                league = %self.league_code,
                season = season_code,
                teams = self.states.len(),
                "season boundary"
            );
        }
        phase
    }

    pub fn current_season(&self) -> Option<&str> {
        self.clock.current()
    }

    /// Captures both sides' pre-match snapshots. Never mutates ratings or tallies.
    pub fn feature_row(&mut self, home: &str, away: &str, date: NaiveDate) -> FeatureRow {
        let h = self.resolve(home);
        let a = self.resolve(away);
        feature_row_for(&self.states, h, a, date, &self.cfg)
    }

    pub fn apply_result(
        &mut self,
        home: &str,
        away: &str,
        home_goals: u16,
        away_goals: u16,
        result: Outcome,
        date: NaiveDate,
    ) -> Option<(f64, f64)> {
        let h = self.resolve(home);
        let a = self.resolve(away);
        apply_result_at(&mut self.states, h, a, home_goals, away_goals, result, date, &self.cfg)
    }

    /// Replays matches of this league in the given order, handing each match
    /// and its pre-match row to `on_row` before the match is applied.
    pub fn replay<'a, I>(&mut self, matches: I, mut on_row: impl FnMut(&MatchRecord, &FeatureRow))
    where
        I: IntoIterator<Item = &'a MatchRecord>,
    {
        for m in matches {
            if m.home_team == m.away_team {
                warn!(
                    league = %self.league_code,
                    team = %m.home_team,
                    date = %m.match_date,
                    "skipping match of a team against itself"
                );
                continue;
            }
            self.enter_season(&m.season_code);
            let row = self.feature_row(&m.home_team, &m.away_team, m.match_date);
            on_row(m, &row);
            self.apply_result(
                &m.home_team,
                &m.away_team,
                m.home_goals,
                m.away_goals,
                m.result,
                m.match_date,
            );
        }
    }
}

pub(crate) fn feature_row_for(
    states: &[TeamState],
    home: usize,
    away: usize,
    date: NaiveDate,
    cfg: &TrackerConfig,
) -> FeatureRow {
    let hs = states[home].snapshot(date, cfg);
    let as_ = states[away].snapshot(date, cfg);
    FeatureRow::from_snapshots(&hs, &as_, date)
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn apply_result_at(
    states: &mut [TeamState],
    home: usize,
    away: usize,
    home_goals: u16,
    away_goals: u16,
    result: Outcome,
    date: NaiveDate,
    cfg: &TrackerConfig,
) -> Option<(f64, f64)> {
    if home == away {
        return None;
    }
    let (lo, hi) = if home < away { (home, away) } else { (away, home) };
    let (left, right) = states.split_at_mut(hi);
    let (first, second) = (&mut left[lo], &mut right[0]);
    let (home_state, away_state) = if home < away {
        (first, second)
    } else {
        (second, first)
    };
    Some(apply_match(
        home_state, away_state, home_goals, away_goals, result, date, &cfg.elo,
    ))
}

/// One training row: match identity, labels, and the pre-match features.
/// Serializes flat, with the feature columns after the labels.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRecord {
    pub league_code: String,
    pub season_code: String,
    pub season_start_year: i32,
    pub match_date: NaiveDate,
    pub home_team: String,
    pub away_team: String,
    pub target_result: char,
    pub home_goals_actual: f64,
    pub away_goals_actual: f64,
    pub total_goals_actual: f64,
    pub row: FeatureRow,
}

impl Serialize for FeatureRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let columns = self.row.numeric_columns();
        let mut out = serializer.serialize_struct("FeatureRecord", 12 + columns.len())?;
        out.serialize_field("league_code", &self.league_code)?;
        out.serialize_field("season_code", &self.season_code)?;
        out.serialize_field("season_start_year", &self.season_start_year)?;
        out.serialize_field("match_date", &self.match_date)?;
        out.serialize_field("home_team", &self.home_team)?;
        out.serialize_field("away_team", &self.away_team)?;
        out.serialize_field("target_result", &self.target_result)?;
        out.serialize_field("home_goals_actual", &self.home_goals_actual)?;
        out.serialize_field("away_goals_actual", &self.away_goals_actual)?;
        out.serialize_field("total_goals_actual", &self.total_goals_actual)?;
        for (name, value) in columns {
            out.serialize_field(name, &value)?;
        }
        out.serialize_field("month", &self.row.month)?;
        out.serialize_field("weekday", &self.row.weekday)?;
        out.end()
    }
}

impl FeatureRecord {
    pub fn new(m: &MatchRecord, row: &FeatureRow) -> Self {
        Self {
            league_code: m.league_code.clone(),
            season_code: m.season_code.clone(),
            season_start_year: m.season_start_year,
            match_date: m.match_date,
            home_team: m.home_team.clone(),
            away_team: m.away_team.clone(),
            target_result: m.result.code(),
            home_goals_actual: f64::from(m.home_goals),
            away_goals_actual: f64::from(m.away_goals),
            total_goals_actual: f64::from(m.total_goals()),
            row: *row,
        }
    }

    pub fn outcome(&self) -> Option<Outcome> {
        Outcome::parse_code(&self.target_result.to_string()).ok()
    }
}

/// Leak-free feature table for every match, ordered by league, season, date
/// and home team. Each league gets its own scope.
pub fn build_match_features(matches: &[MatchRecord], cfg: &TrackerConfig) -> Vec<FeatureRecord> {
    let mut sorted = matches.to_vec();
    sort_by_league_then_time(&mut sorted);

    let mut out = Vec::with_capacity(sorted.len());
    for block in sorted.chunk_by(|a, b| a.league_code == b.league_code) {
        let league = &block[0].league_code;
        let mut scope = LeagueScope::new(league.as_str(), *cfg);
        scope.replay(block, |m, row| out.push(FeatureRecord::new(m, row)));
        debug!(
            league = %league,
            matches = block.len(),
            teams = scope.teams().len(),
            "replayed league history"
        );
    }
    out
}
