use std::cmp::Ordering;

use serde::Serialize;

use crate::team_state::TeamState;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StandingsEntry {
    pub team: String,
    pub points: u32,
    pub goal_diff: i64,
    pub goals_for: u32,
    pub played: u32,
}

impl StandingsEntry {
    pub fn from_state(team: &str, state: &TeamState) -> Self {
        Self {
            team: team.to_string(),
            points: state.points,
            goal_diff: state.goal_diff(),
            goals_for: state.goals_for,
            played: state.matches_played,
        }
    }
}

/// Points, then goal difference, then goals scored, all descending; team id
/// ascending settles whatever is left.
pub fn compare_entries(a: &StandingsEntry, b: &StandingsEntry) -> Ordering {
    b.points
        .cmp(&a.points)
        .then(b.goal_diff.cmp(&a.goal_diff))
        .then(b.goals_for.cmp(&a.goals_for))
        .then_with(|| a.team.cmp(&b.team))
}

pub fn rank(entries: &mut [StandingsEntry]) {
    entries.sort_by(compare_entries);
}

pub fn table_from_states(teams: &[String], states: &[TeamState]) -> Vec<StandingsEntry> {
    let mut table: Vec<StandingsEntry> = teams
        .iter()
        .zip(states)
        .map(|(team, state)| StandingsEntry::from_state(team, state))
        .collect();
    rank(&mut table);
    table
}

/// Index order of `states` after ranking. Same keys as [`compare_entries`],
/// without building owned entries. `names` breaks the final tie.
pub(crate) fn ranked_indices(states: &[TeamState], names: &[String], out: &mut Vec<usize>) {
    out.clear();
    out.extend(0..states.len());
    out.sort_by(|&a, &b| {
        let (sa, sb) = (&states[a], &states[b]);
        sb.points
            .cmp(&sa.points)
            .then(sb.goal_diff().cmp(&sa.goal_diff()))
            .then(sb.goals_for.cmp(&sa.goals_for))
            .then_with(|| names[a].cmp(&names[b]))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(team: &str, points: u32, gd: i64, gf: u32) -> StandingsEntry {
        StandingsEntry {
            team: team.to_string(),
            points,
            goal_diff: gd,
            goals_for: gf,
            played: 38,
        }
    }

    #[test]
    fn goals_for_breaks_points_and_gd_tie() {
        let mut t = vec![entry("Low", 70, 20, 48), entry("High", 70, 20, 50)];
        rank(&mut t);
        assert_eq!(t[0].team, "High");
    }

    #[test]
    fn full_ordering_keys() {
        let mut t = vec![
            entry("D", 60, 5, 40),
            entry("B", 70, 10, 50),
            entry("A", 70, 12, 45),
            entry("C", 70, 10, 50),
        ];
        rank(&mut t);
        let order: Vec<_> = t.iter().map(|e| e.team.as_str()).collect();
        assert_eq!(order, ["A", "B", "C", "D"]);
    }
}
