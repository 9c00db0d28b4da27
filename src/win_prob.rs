use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::features::FeatureRow;
use crate::match_record::Outcome;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prob3 {
    pub home: f64,
    pub draw: f64,
    pub away: f64,
}

impl Prob3 {
    pub fn uniform() -> Self {
        Self {
            home: 1.0 / 3.0,
            draw: 1.0 / 3.0,
            away: 1.0 / 3.0,
        }
    }

    pub fn get(&self, outcome: Outcome) -> f64 {
        match outcome {
            Outcome::Home => self.home,
            Outcome::Draw => self.draw,
            Outcome::Away => self.away,
        }
    }

    pub fn normalized(self) -> Self {
        let sum = self.home + self.draw + self.away;
        if !(sum > 0.0) || !sum.is_finite() {
            return Self::uniform();
        }
        Self {
            home: self.home / sum,
            draw: self.draw / sum,
            away: self.away / sum,
        }
    }

    /// Maps a uniform draw in [0, 1) onto an outcome.
    pub fn pick(&self, u: f64) -> Outcome {
        if u < self.home {
            Outcome::Home
        } else if u < self.home + self.draw {
            Outcome::Draw
        } else {
            Outcome::Away
        }
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Outcome {
        self.pick(rng.r#gen::<f64>())
    }
}

/// Anything that turns a pre-match feature row into an outcome distribution.
/// The simulator only ever talks to this seam.
pub trait OutcomeModel: Sync {
    fn predict(&self, row: &FeatureRow) -> Prob3;
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeuristicModel {
    pub elo_weight: f64,
    pub ppg_weight: f64,
    pub form_weight: f64,
    pub rest_weight: f64,
    pub draw_floor: f64,
    pub draw_base: f64,
    pub draw_slope: f64,
}

impl Default for HeuristicModel {
    fn default() -> Self {
        Self {
            elo_weight: 0.0028,
            ppg_weight: 0.85,
            form_weight: 0.25,
            rest_weight: 0.02,
            draw_floor: 0.14,
            draw_base: 0.26,
            draw_slope: 0.08,
        }
    }
}

impl HeuristicModel {
    pub fn strength_score(&self, row: &FeatureRow) -> f64 {
        self.elo_weight * row.elo_diff
            + self.ppg_weight * row.ppg_diff
            + self.form_weight * row.recent_points_diff
            + self.rest_weight * row.rest_days_diff
    }

    pub fn probs_from_score(&self, score: f64) -> Prob3 {
        let p_home_raw = logistic(score);
        let draw = (self.draw_base - self.draw_slope * score.abs()).max(self.draw_floor);
        Prob3 {
            home: p_home_raw * (1.0 - draw),
            draw,
            away: (1.0 - p_home_raw) * (1.0 - draw),
        }
        .normalized()
    }
}

impl OutcomeModel for HeuristicModel {
    fn predict(&self, row: &FeatureRow) -> Prob3 {
        self.probs_from_score(self.strength_score(row))
    }
}

fn logistic(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}
