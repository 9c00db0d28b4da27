use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{Duration, NaiveDate};
use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::aggregate::{SimulationRow, Tally, summarize};
use crate::error::EngineError;
use crate::features::{LeagueScope, apply_result_at, feature_row_for};
use crate::match_record::{MatchRecord, sort_chronological};
use crate::standings::{StandingsEntry, ranked_indices, table_from_states};
use crate::team_state::{TeamState, TrackerConfig};
use crate::win_prob::OutcomeModel;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub simulations: usize,
    pub seed: u64,
    // 0 = one worker per available core.
    pub workers: usize,
    pub day_step: i64,
    pub carry_elo: bool,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            simulations: 1000,
            seed: 42,
            workers: 0,
            day_step: 2,
            carry_elo: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fixture {
    pub home: usize,
    pub away: usize,
}

/// The league as it stands before any simulated fixture: immutable, shared by
/// every replication.
#[derive(Debug, Clone)]
pub struct BaseState {
    pub league_code: String,
    pub season_code: Option<String>,
    pub cfg: TrackerConfig,
    pub teams: Vec<String>,
    pub states: Vec<TeamState>,
    pub last_date: NaiveDate,
    played: HashSet<(usize, usize)>,
}

impl BaseState {
    /// Replays one season's played matches from fresh ratings.
    pub fn from_season(
        league_code: &str,
        season_matches: &[MatchRecord],
        cfg: TrackerConfig,
    ) -> Result<Self, EngineError> {
        let mut matches: Vec<&MatchRecord> = season_matches
            .iter()
            .filter(|m| m.league_code == league_code)
            .collect();
        let Some(first) = matches.first() else {
            return Err(EngineError::EmptyHistory {
                league: league_code.to_string(),
                season: "any".to_string(),
            });
        };
        let season_code = first.season_code.clone();
        matches.sort_by(|a, b| {
            a.match_date
                .cmp(&b.match_date)
                .then_with(|| a.home_team.cmp(&b.home_team))
        });

        let mut scope = LeagueScope::new(league_code, cfg);
        scope.replay(matches.iter().copied(), |_, _| {});
        Ok(Self::from_scope(&scope, Some(season_code), &matches))
    }

    /// Replays the whole league history so ratings carry across seasons (with
    /// the usual regression), then keeps only teams of the latest season.
    pub fn from_league_history(
        league_code: &str,
        history: &[MatchRecord],
        cfg: TrackerConfig,
    ) -> Result<Self, EngineError> {
        let mut matches: Vec<MatchRecord> = history
            .iter()
            .filter(|m| m.league_code == league_code)
            .cloned()
            .collect();
        if matches.is_empty() {
            return Err(EngineError::EmptyHistory {
                league: league_code.to_string(),
                season: "any".to_string(),
            });
        }
        sort_chronological(&mut matches);
        let latest_year = matches
            .iter()
            .map(|m| m.season_start_year)
            .max()
            .unwrap_or_default();

        let mut scope = LeagueScope::new(league_code, cfg);
        scope.replay(&matches, |_, _| {});

        let season: Vec<&MatchRecord> = matches
            .iter()
            .filter(|m| m.season_start_year == latest_year)
            .collect();
        let season_code = season.first().map(|m| m.season_code.clone());
        Ok(Self::from_scope(&scope, season_code, &season))
    }

    /// Builds a base from an explicit team table, with nothing marked as played.
    pub fn from_states(
        league_code: &str,
        states: Vec<(String, TeamState)>,
        last_date: NaiveDate,
        cfg: TrackerConfig,
    ) -> Self {
        let mut states = states;
        states.sort_by(|a, b| a.0.cmp(&b.0));
        states.dedup_by(|a, b| a.0 == b.0);
        let (teams, states): (Vec<String>, Vec<TeamState>) = states.into_iter().unzip();
        Self {
            league_code: league_code.to_string(),
            season_code: None,
            cfg,
            teams,
            states,
            last_date,
            played: HashSet::new(),
        }
    }

    fn from_scope(scope: &LeagueScope, season_code: Option<String>, season: &[&MatchRecord]) -> Self {
        let mut names: Vec<&str> = season
            .iter()
            .flat_map(|m| [m.home_team.as_str(), m.away_team.as_str()])
            .collect();
        names.sort_unstable();
        names.dedup();

        let teams: Vec<String> = names.iter().map(|s| s.to_string()).collect();
        let states: Vec<TeamState> = names
            .iter()
            .filter_map(|name| scope.state(name).copied())
            .collect();
        let pos = |name: &str| names.binary_search_by(|candidate| (*candidate).cmp(name)).ok();
        let played = season
            .iter()
            .filter_map(|m| Some((pos(m.home_team.as_str())?, pos(m.away_team.as_str())?)))
            .collect();
        let last_date = season
            .iter()
            .map(|m| m.match_date)
            .max()
            .unwrap_or_default();

        Self {
            league_code: scope.league_code().to_string(),
            season_code,
            cfg: *scope.config(),
            teams,
            states,
            last_date,
            played,
        }
    }

    pub fn team_index(&self, team: &str) -> Option<usize> {
        self.teams.iter().position(|t| t == team)
    }

    /// Every ordered pair of distinct teams that has not been played yet.
    pub fn remaining_fixtures(&self) -> Vec<Fixture> {
        let n = self.teams.len();
        let mut out = Vec::with_capacity(n * n.saturating_sub(1));
        for home in 0..n {
            for away in 0..n {
                if home != away && !self.played.contains(&(home, away)) {
                    out.push(Fixture { home, away });
                }
            }
        }
        out
    }

    pub fn standings(&self) -> Vec<StandingsEntry> {
        table_from_states(&self.teams, &self.states)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationReport {
    pub league_code: String,
    pub season_code: Option<String>,
    pub replications: u64,
    pub seed: u64,
    pub remaining_fixtures: usize,
    pub rows: Vec<SimulationRow>,
}

pub struct SeasonSimulator<'a> {
    base: &'a BaseState,
    model: &'a dyn OutcomeModel,
    fixtures: Vec<Fixture>,
    cfg: SimConfig,
    cancel: Option<Arc<AtomicBool>>,
}

struct Workspace {
    states: Vec<TeamState>,
    order: Vec<Fixture>,
    ranking: Vec<usize>,
}

impl<'a> SeasonSimulator<'a> {
    pub fn new(base: &'a BaseState, model: &'a dyn OutcomeModel, cfg: SimConfig) -> Self {
        Self {
            base,
            model,
            fixtures: base.remaining_fixtures(),
            cfg,
            cancel: None,
        }
    }

    pub fn with_fixtures(mut self, fixtures: Vec<Fixture>) -> Self {
        self.fixtures = fixtures;
        self
    }

    /// Raising the flag makes `run` stop and return `Cancelled`.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn fixtures(&self) -> &[Fixture] {
        &self.fixtures
    }

    /// Runs every replication on a pool sized from `SimConfig::workers`.
    pub fn run(&self) -> Result<SimulationReport, EngineError> {
        self.check_preconditions()?;
        let workers = worker_count(self.cfg.workers);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .build()
            .ok();
        self.log_start(pool.as_ref().map_or(1, |p| p.current_num_threads()));
        let tally = with_pool(&pool, || self.fold_replications())?;
        Ok(self.report(&tally))
    }

    /// Same as [`run`](Self::run) but on a caller-owned pool, whatever its size.
    pub fn run_in_pool(&self, pool: &rayon::ThreadPool) -> Result<SimulationReport, EngineError> {
        self.check_preconditions()?;
        self.log_start(pool.current_num_threads());
        let tally = pool.install(|| self.fold_replications())?;
        Ok(self.report(&tally))
    }

    fn check_preconditions(&self) -> Result<(), EngineError> {
        let teams = self.base.teams.len();
        if teams < 2 {
            return Err(EngineError::TooFewTeams {
                league: self.base.league_code.clone(),
                teams,
            });
        }
        if self.cfg.simulations == 0 {
            return Err(EngineError::NoReplications);
        }
        Ok(())
    }

    fn log_start(&self, workers: usize) {
        info!(
            league = %self.base.league_code,
            teams = self.base.teams.len(),
            fixtures = self.fixtures.len(),
            simulations = self.cfg.simulations,
            workers,
            seed = self.cfg.seed,
            "simulating season"
        );
    }

    fn fold_replications(&self) -> Result<Tally, EngineError> {
        let teams = self.base.teams.len();
        (0..self.cfg.simulations as u64)
            .into_par_iter()
            .try_fold(
                || (Tally::new(teams), self.workspace()),
                |(mut tally, mut ws), idx| {
                    if self.cancelled() {
                        return Err(EngineError::Cancelled);
                    }
                    self.run_replication(idx, &mut ws, &mut tally);
                    Ok((tally, ws))
                },
            )
            .map(|res| res.map(|(tally, _)| tally))
            .try_reduce(|| Tally::new(teams), |a, b| Ok(a.merge(b)))
    }

    fn report(&self, tally: &Tally) -> SimulationReport {
        let rows = summarize(&self.base.league_code, &self.base.teams, tally);
        if let Some(top) = rows.first() {
            debug!(
                league = %self.base.league_code,
                favourite = %top.team,
                p = top.champion_probability,
                "simulation finished"
            );
        }
        SimulationReport {
            league_code: self.base.league_code.clone(),
            season_code: self.base.season_code.clone(),
            replications: tally.replications,
            seed: self.cfg.seed,
            remaining_fixtures: self.fixtures.len(),
            rows,
        }
    }

    fn cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    fn workspace(&self) -> Workspace {
        Workspace {
            states: Vec::with_capacity(self.base.states.len()),
            order: Vec::with_capacity(self.fixtures.len()),
            ranking: Vec::with_capacity(self.base.states.len()),
        }
    }

    fn run_replication(&self, idx: u64, ws: &mut Workspace, tally: &mut Tally) {
        let cfg = &self.base.cfg;
        let mut rng = ChaCha8Rng::seed_from_u64(replication_seed(self.cfg.seed, idx));

        ws.states.clear();
        ws.states.extend_from_slice(&self.base.states);
        ws.order.clear();
        ws.order.extend_from_slice(&self.fixtures);
        ws.order.shuffle(&mut rng);

        let step = Duration::days(self.cfg.day_step);
        let mut date = self.base.last_date;
        for fx in &ws.order {
            date += step;
            let row = feature_row_for(&ws.states, fx.home, fx.away, date, cfg);
            let result = self.model.predict(&row).sample(&mut rng);
            let (hg, ag) = result.proxy_score();
            apply_result_at(&mut ws.states, fx.home, fx.away, hg, ag, result, date, cfg);
        }

        ranked_indices(&ws.states, &self.base.teams, &mut ws.ranking);
        tally.record(&ws.ranking, &ws.states);
    }
}

/// Seed for one replication. Depends only on the run seed and the replication
/// index, never on which worker picks it up.
pub fn replication_seed(run_seed: u64, idx: u64) -> u64 {
    splitmix64(run_seed ^ splitmix64(idx.wrapping_add(0x9E37_79B9_7F4A_7C15)))
}

fn splitmix64(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

fn worker_count(requested: usize) -> usize {
    let available = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    if requested == 0 {
        available
    } else {
        requested.clamp(1, available)
    }
}

fn with_pool<T>(pool: &Option<rayon::ThreadPool>, action: impl FnOnce() -> T + Send) -> T
where
    T: Send,
{
    if let Some(pool) = pool.as_ref() {
        pool.install(action)
    } else {
        action()
    }
}

/// Simulates the latest season present in `matches`, one league at a time in
/// league-code order.
pub fn simulate_latest_season(
    matches: &[MatchRecord],
    tracker: TrackerConfig,
    model: &dyn OutcomeModel,
    cfg: SimConfig,
) -> Result<Vec<SimulationReport>, EngineError> {
    let Some(latest_year) = matches.iter().map(|m| m.season_start_year).max() else {
        return Err(EngineError::EmptyHistory {
            league: "any".to_string(),
            season: "latest".to_string(),
        });
    };

    let mut by_league: BTreeMap<&str, Vec<MatchRecord>> = BTreeMap::new();
    for m in matches {
        by_league
            .entry(m.league_code.as_str())
            .or_default()
            .push(m.clone());
    }

    let mut reports = Vec::new();
    for (league, history) in &by_league {
        let in_latest = history.iter().any(|m| m.season_start_year == latest_year);
        if !in_latest {
            debug!(league = %league, latest_year, "league has no matches in latest season");
            continue;
        }
        let base = if cfg.carry_elo {
            BaseState::from_league_history(league, history, tracker)?
        } else {
            let season: Vec<MatchRecord> = history
                .iter()
                .filter(|m| m.season_start_year == latest_year)
                .cloned()
                .collect();
            BaseState::from_season(league, &season, tracker)?
        };
        reports.push(SeasonSimulator::new(&base, model, cfg).run()?);
    }
    Ok(reports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::match_record::Outcome;
    use crate::win_prob::HeuristicModel;

    fn rec(d: u32, home: &str, away: &str, hg: u16, ag: u16) -> MatchRecord {
        MatchRecord {
            league_code: "EPL".to_string(),
            season_code: "2324".to_string(),
            season_start_year: 2023,
            match_date: NaiveDate::from_ymd_opt(2023, 10, d).unwrap(),
            home_team: home.to_string(),
            away_team: away.to_string(),
            home_goals: hg,
            away_goals: ag,
            result: Outcome::from_goals(hg, ag),
        }
    }

    #[test]
    fn remaining_fixtures_skip_played_pairs() {
        let played = [rec(1, "A", "B", 1, 0), rec(2, "C", "A", 2, 2)];
        let base = BaseState::from_season("EPL", &played, TrackerConfig::default()).unwrap();
        assert_eq!(base.teams, ["A", "B", "C"]);
        let fx = base.remaining_fixtures();
        assert_eq!(fx.len(), 4);
        assert!(!fx.contains(&Fixture { home: 0, away: 1 }));
        assert!(!fx.contains(&Fixture { home: 2, away: 0 }));
        assert_eq!(base.last_date, NaiveDate::from_ymd_opt(2023, 10, 2).unwrap());
    }

    #[test]
    fn base_standings_follow_replay() {
        let played = [rec(1, "A", "B", 3, 0), rec(2, "B", "C", 1, 1)];
        let base = BaseState::from_season("EPL", &played, TrackerConfig::default()).unwrap();
        let table = base.standings();
        assert_eq!(table[0].team, "A");
        assert_eq!(table[0].points, 3);
        assert_eq!(table[2].team, "B");
        assert_eq!(table[2].goal_diff, -3);
    }

    #[test]
    fn replication_seeds_differ_per_index() {
        let a = replication_seed(42, 0);
        let b = replication_seed(42, 1);
        let c = replication_seed(43, 0);
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_eq!(a, replication_seed(42, 0));
    }

    #[test]
    fn zero_replications_rejected() {
        let played = [rec(1, "A", "B", 1, 0)];
        let base = BaseState::from_season("EPL", &played, TrackerConfig::default()).unwrap();
        let model = HeuristicModel::default();
        let cfg = SimConfig {
            simulations: 0,
            ..SimConfig::default()
        };
        let err = SeasonSimulator::new(&base, &model, cfg).run().unwrap_err();
        assert_eq!(err, EngineError::NoReplications);
    }

    #[test]
    fn raised_cancel_flag_discards_run() {
        let played = [rec(1, "A", "B", 1, 0)];
        let base = BaseState::from_season("EPL", &played, TrackerConfig::default()).unwrap();
        let model = HeuristicModel::default();
        let flag = Arc::new(AtomicBool::new(true));
        let err = SeasonSimulator::new(&base, &model, SimConfig::default())
            .with_cancel_flag(flag)
            .run()
            .unwrap_err();
        assert_eq!(err, EngineError::Cancelled);
    }
}
