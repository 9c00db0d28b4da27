use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::team_state::TeamState;

/// Table positions counted as a top finish.
pub const TOP_FINISH: usize = 3;

/// Per-team counters accumulated over replications. Integer sums only, so
/// merging partial tallies in any order gives the same totals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tally {
    pub replications: u64,
    pub champion: Vec<u64>,
    pub top3: Vec<u64>,
    pub points: Vec<u64>,
}

impl Tally {
    pub fn new(teams: usize) -> Self {
        Self {
            replications: 0,
            champion: vec![0; teams],
            top3: vec![0; teams],
            points: vec![0; teams],
        }
    }

    /// `ranked` holds team indices, best first.
    pub fn record(&mut self, ranked: &[usize], states: &[TeamState]) {
        self.replications += 1;
        if let Some(&first) = ranked.first() {
            self.champion[first] += 1;
        }
        for &idx in ranked.iter().take(TOP_FINISH) {
            self.top3[idx] += 1;
        }
        for (sum, state) in self.points.iter_mut().zip(states) {
            *sum += u64::from(state.points);
        }
    }

    pub fn merge(mut self, other: Tally) -> Tally {
        self.replications += other.replications;
        for (a, b) in self.champion.iter_mut().zip(&other.champion) {
            *a += b;
        }
        for (a, b) in self.top3.iter_mut().zip(&other.top3) {
            *a += b;
        }
        for (a, b) in self.points.iter_mut().zip(&other.points) {
            *a += b;
        }
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationRow {
    pub league_code: String,
    pub team: String,
    pub champion_probability: f64,
    pub top3_probability: f64,
    pub expected_points: f64,
}

pub fn summarize(league_code: &str, teams: &[String], tally: &Tally) -> Vec<SimulationRow> {
    let n = tally.replications.max(1) as f64;
    let mut rows: Vec<SimulationRow> = teams
        .iter()
        .enumerate()
        .map(|(idx, team)| SimulationRow {
            league_code: league_code.to_string(),
            team: team.clone(),
            champion_probability: tally.champion[idx] as f64 / n,
            top3_probability: tally.top3[idx] as f64 / n,
            expected_points: tally.points[idx] as f64 / n,
        })
        .collect();
    rows.sort_by(compare_rows);
    rows
}

fn compare_rows(a: &SimulationRow, b: &SimulationRow) -> Ordering {
    b.champion_probability
        .total_cmp(&a.champion_probability)
        .then(b.top3_probability.total_cmp(&a.top3_probability))
        .then(b.expected_points.total_cmp(&a.expected_points))
        .then_with(|| a.team.cmp(&b.team))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::team_state::TrackerConfig;

    fn states_with_points(points: &[u32]) -> Vec<TeamState> {
        let cfg = TrackerConfig::default();
        points
            .iter()
            .map(|p| {
                let mut s = TeamState::new(&cfg);
                s.points = *p;
                s
            })
            .collect()
    }

    #[test]
    fn merge_is_order_independent() {
        let states = states_with_points(&[9, 4, 6, 1]);
        let mut a = Tally::new(4);
        let mut b = Tally::new(4);
        a.record(&[0, 2, 1, 3], &states);
        b.record(&[2, 0, 1, 3], &states);
        b.record(&[1, 0, 2, 3], &states);
        assert_eq!(a.clone().merge(b.clone()), b.merge(a));
    }

    #[test]
    fn summary_sorted_by_champion_probability() {
        let teams = vec!["A".to_string(), "B".to_string(), "C".to_string()];
        let states = states_with_points(&[3, 6, 0]);
        let mut t = Tally::new(3);
        t.record(&[1, 0, 2], &states);
        t.record(&[1, 0, 2], &states);
        t.record(&[0, 1, 2], &states);
        let rows = summarize("EPL", &teams, &t);
        assert_eq!(rows[0].team, "B");
        assert!((rows[0].champion_probability - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(rows[2].team, "C");
        assert_eq!(rows[2].top3_probability, 1.0);
        assert_eq!(rows[1].expected_points, 3.0);
    }

    #[test]
    fn only_the_first_three_count_as_top_finish() {
        let states = states_with_points(&[9, 4, 6, 1, 0]);
        let mut t = Tally::new(5);
        t.record(&[0, 2, 1, 3, 4], &states);
        assert_eq!(t.champion, vec![1, 0, 0, 0, 0]);
        assert_eq!(t.top3, vec![1, 1, 1, 0, 0]);
        assert_eq!(t.top3.iter().sum::<u64>(), TOP_FINISH as u64);
    }
}
