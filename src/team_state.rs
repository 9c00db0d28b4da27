use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::elo::EloConfig;
use crate::match_record::Outcome;

pub const MAX_RECENT_WINDOW: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub elo: EloConfig,
    pub recent_window: usize,
    pub default_rest_days: f64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            elo: EloConfig::default(),
            recent_window: 5,
            default_rest_days: 7.0,
        }
    }
}

/// Fixed-capacity FIFO of the last few per-match values. Stored inline so a
/// whole `TeamState` stays `Copy`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecentWindow {
    buf: [i32; MAX_RECENT_WINDOW],
    start: u8,
    len: u8,
    cap: u8,
}

impl RecentWindow {
    pub fn new(capacity: usize) -> Self {
        let cap = capacity.clamp(1, MAX_RECENT_WINDOW) as u8;
        Self {
            buf: [0; MAX_RECENT_WINDOW],
            start: 0,
            len: 0,
            cap,
        }
    }

    pub fn push(&mut self, value: i32) {
        let cap = self.cap as usize;
        if (self.len as usize) < cap {
            let idx = (self.start as usize + self.len as usize) % cap;
            self.buf[idx] = value;
            self.len += 1;
        } else {
            // Full: overwrite the oldest slot and advance the head.
            self.buf[self.start as usize] = value;
            self.start = ((self.start as usize + 1) % cap) as u8;
        }
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.cap as usize
    }

    pub fn clear(&mut self) {
        self.start = 0;
        self.len = 0;
    }

    /// Oldest first.
    pub fn iter(&self) -> impl Iterator<Item = i32> + '_ {
        let cap = self.cap as usize;
        (0..self.len as usize).map(move |i| self.buf[(self.start as usize + i) % cap])
    }

    pub fn mean(&self) -> f64 {
        if self.is_empty() {
            return 0.0;
        }
        self.iter().map(f64::from).sum::<f64>() / self.len() as f64
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TeamState {
    pub elo: f64,
    pub matches_played: u32,
    pub points: u32,
    pub goals_for: u32,
    pub goals_against: u32,
    pub recent_points: RecentWindow,
    pub recent_goal_diff: RecentWindow,
    pub last_match_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FeatureSnapshot {
    pub elo_pre: f64,
    pub matches_played_pre: f64,
    pub points_per_game_pre: f64,
    pub goal_diff_per_game_pre: f64,
    pub recent_points_avg_pre: f64,
    pub recent_goal_diff_avg_pre: f64,
    pub rest_days_pre: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Home,
    Away,
}

impl TeamState {
    pub fn new(cfg: &TrackerConfig) -> Self {
        Self {
            elo: cfg.elo.base_rating,
            matches_played: 0,
            points: 0,
            goals_for: 0,
            goals_against: 0,
            recent_points: RecentWindow::new(cfg.recent_window),
            recent_goal_diff: RecentWindow::new(cfg.recent_window),
            last_match_date: None,
        }
    }

    pub fn goal_diff(&self) -> i64 {
        i64::from(self.goals_for) - i64::from(self.goals_against)
    }

    pub fn points_per_game(&self) -> f64 {
        if self.matches_played == 0 {
            return 0.0;
        }
        f64::from(self.points) / f64::from(self.matches_played)
    }

    pub fn goal_diff_per_game(&self) -> f64 {
        if self.matches_played == 0 {
            return 0.0;
        }
        self.goal_diff() as f64 / f64::from(self.matches_played)
    }

    pub fn rest_days(&self, as_of: NaiveDate, default_rest_days: f64) -> f64 {
        match self.last_match_date {
            Some(last) => (as_of - last).num_days() as f64,
            None => default_rest_days,
        }
    }

    pub fn snapshot(&self, as_of: NaiveDate, cfg: &TrackerConfig) -> FeatureSnapshot {
        FeatureSnapshot {
            elo_pre: self.elo,
            matches_played_pre: f64::from(self.matches_played),
            points_per_game_pre: self.points_per_game(),
            goal_diff_per_game_pre: self.goal_diff_per_game(),
            recent_points_avg_pre: self.recent_points.mean(),
            recent_goal_diff_avg_pre: self.recent_goal_diff.mean(),
            rest_days_pre: self.rest_days(as_of, cfg.default_rest_days),
        }
    }

    pub fn update(&mut self, goals_for: u16, goals_against: u16, points: u32, date: NaiveDate) {
        self.matches_played += 1;
        self.points += points;
        self.goals_for += u32::from(goals_for);
        self.goals_against += u32::from(goals_against);
        self.recent_points.push(points as i32);
        self.recent_goal_diff
            .push(i32::from(goals_for) - i32::from(goals_against));
        self.last_match_date = Some(date);
    }

    /// Applies this side's Elo change given the opponent's rating *before* the
    /// match. Returns the delta that was applied.
    pub fn apply_elo_update(
        &mut self,
        opponent_elo_before: f64,
        side: Side,
        result: Outcome,
        cfg: &EloConfig,
    ) -> f64 {
        let delta = match side {
            Side::Home => cfg.deltas(self.elo, opponent_elo_before, result).0,
            Side::Away => cfg.deltas(opponent_elo_before, self.elo, result).1,
        };
        self.elo += delta;
        delta
    }

    pub fn regress_for_new_season(&mut self, cfg: &TrackerConfig) {
        self.elo = cfg.elo.regress(self.elo);
        self.matches_played = 0;
        self.points = 0;
        self.goals_for = 0;
        self.goals_against = 0;
        self.recent_points.clear();
        self.recent_goal_diff.clear();
        self.last_match_date = None;
    }
}

/// Applies one finished (or simulated) match to both sides: counters first,
/// then the Elo pair from the ratings both teams carried into the match.
/// Returns the (home, away) Elo deltas.
pub fn apply_match(
    home: &mut TeamState,
    away: &mut TeamState,
    home_goals: u16,
    away_goals: u16,
    result: Outcome,
    date: NaiveDate,
    cfg: &EloConfig,
) -> (f64, f64) {
    let (home_pts, away_pts) = result.points();
    home.update(home_goals, away_goals, home_pts, date);
    away.update(away_goals, home_goals, away_pts, date);

    let home_before = home.elo;
    let away_before = away.elo;
    let dh = home.apply_elo_update(away_before, Side::Home, result, cfg);
    let da = away.apply_elo_update(home_before, Side::Away, result, cfg);
    (dh, da)
}
