use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    Home,
    Draw,
    Away,
}

impl Outcome {
    pub fn from_goals(home_goals: u16, away_goals: u16) -> Self {
        if home_goals > away_goals {
            Outcome::Home
        } else if home_goals < away_goals {
            Outcome::Away
        } else {
            Outcome::Draw
        }
    }

    pub fn parse_code(raw: &str) -> Result<Self, EngineError> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "H" => Ok(Outcome::Home),
            "D" => Ok(Outcome::Draw),
            "A" => Ok(Outcome::Away),
            _ => Err(EngineError::InvalidResultCode(raw.to_string())),
        }
    }

    pub fn code(self) -> char {
        match self {
            Outcome::Home => 'H',
            Outcome::Draw => 'D',
            Outcome::Away => 'A',
        }
    }

    /// League points awarded as (home, away).
    pub fn points(self) -> (u32, u32) {
        match self {
            Outcome::Home => (3, 0),
            Outcome::Draw => (1, 1),
            Outcome::Away => (0, 3),
        }
    }

    /// Actual score from the home side's perspective, as used by Elo.
    pub fn home_score(self) -> f64 {
        match self {
            Outcome::Home => 1.0,
            Outcome::Draw => 0.5,
            Outcome::Away => 0.0,
        }
    }

    /// Fixed scoreline stand-in used by simulated fixtures so goal difference
    /// and goals-for tie-breaks still move.
    pub fn proxy_score(self) -> (u16, u16) {
        match self {
            Outcome::Home => (2, 1),
            Outcome::Draw => (1, 1),
            Outcome::Away => (1, 2),
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub league_code: String,
    pub season_code: String,
    pub season_start_year: i32,
    pub match_date: NaiveDate,
    pub home_team: String,
    pub away_team: String,
    pub home_goals: u16,
    pub away_goals: u16,
    pub result: Outcome,
}

impl MatchRecord {
    pub fn total_goals(&self) -> u16 {
        self.home_goals + self.away_goals
    }
}

/// Stable chronological order inside one league: season, then date, then home team.
pub fn sort_chronological(matches: &mut [MatchRecord]) {
    matches.sort_by(|a, b| {
        a.season_start_year
            .cmp(&b.season_start_year)
            .then(a.match_date.cmp(&b.match_date))
            .then_with(|| a.home_team.cmp(&b.home_team))
    });
}

/// Same as [`sort_chronological`] but groups leagues first.
pub fn sort_by_league_then_time(matches: &mut [MatchRecord]) {
    matches.sort_by(|a, b| {
        a.league_code
            .cmp(&b.league_code)
            .then(a.season_start_year.cmp(&b.season_start_year))
            .then(a.match_date.cmp(&b.match_date))
            .then_with(|| a.home_team.cmp(&b.home_team))
    });
}
