use serde::{Deserialize, Serialize};

use crate::match_record::Outcome;

pub const BASE_RATING: f64 = 1500.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EloConfig {
    pub k: f64,
    pub home_adv_pts: f64,
    pub base_rating: f64,
    // Share of last season's rating kept at a season boundary.
    pub season_retain: f64,
}

impl Default for EloConfig {
    fn default() -> Self {
        Self {
            k: 20.0,
            home_adv_pts: 60.0,
            base_rating: BASE_RATING,
            season_retain: 0.75,
        }
    }
}

impl EloConfig {
    pub fn expected_home(&self, home_elo: f64, away_elo: f64) -> f64 {
        expected_score(home_elo + self.home_adv_pts, away_elo)
    }

    /// Rating changes as (home, away). Both come from the pre-match ratings,
    /// and the away change is the exact negation of the home change.
    pub fn deltas(&self, home_elo: f64, away_elo: f64, result: Outcome) -> (f64, f64) {
        let expected_home = self.expected_home(home_elo, away_elo);
        let delta = self.k * (result.home_score() - expected_home);
        (delta, -delta)
    }

    pub fn regress(&self, elo: f64) -> f64 {
        self.season_retain * elo + (1.0 - self.season_retain) * self.base_rating
    }
}

fn expected_score(r_a: f64, r_b: f64) -> f64 {
    1.0 / (1.0 + 10.0_f64.powf(-(r_a - r_b) / 400.0))
}
