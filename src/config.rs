use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::simulation::SimConfig;
use crate::team_state::{MAX_RECENT_WINDOW, TrackerConfig};
use crate::win_prob::HeuristicModel;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub tracker: TrackerConfig,
    pub model: HeuristicModel,
    pub sim: SimConfig,
}

impl EngineConfig {
    /// Defaults, then the optional JSON file, then environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let _ = dotenvy::dotenv();
        let mut cfg = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        cfg.apply_env();
        Ok(cfg)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        serde_json::from_str::<Self>(&raw)
            .with_context(|| format!("parse config {}", path.display()))
    }

    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| env::var(key).ok());
    }

    /// Applies `KEY=value` overrides from `lookup`; unparseable values are ignored
    /// and parsed ones are clamped to sane ranges.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let sim = &mut self.sim;
        sim.simulations = parse_override(&lookup, "SIM_COUNT").unwrap_or(sim.simulations);
        sim.seed = parse_override(&lookup, "SIM_SEED").unwrap_or(sim.seed);
        sim.workers = parse_override(&lookup, "SIM_WORKERS").unwrap_or(sim.workers).min(256);
        sim.day_step = parse_override(&lookup, "SIM_DAY_STEP")
            .unwrap_or(sim.day_step)
            .clamp(1, 14);
        sim.carry_elo = parse_override(&lookup, "SIM_CARRY_ELO").unwrap_or(sim.carry_elo);

        let tracker = &mut self.tracker;
        tracker.elo.k = parse_override(&lookup, "ELO_K").unwrap_or(tracker.elo.k).clamp(1.0, 100.0);
        tracker.elo.home_adv_pts = parse_override(&lookup, "ELO_HOME_ADV")
            .unwrap_or(tracker.elo.home_adv_pts)
            .clamp(0.0, 400.0);
        tracker.elo.season_retain = parse_override(&lookup, "ELO_SEASON_RETAIN")
            .unwrap_or(tracker.elo.season_retain)
            .clamp(0.0, 1.0);
        tracker.recent_window = parse_override(&lookup, "RECENT_WINDOW")
            .unwrap_or(tracker.recent_window)
            .clamp(1, MAX_RECENT_WINDOW);
        tracker.default_rest_days = parse_override(&lookup, "DEFAULT_REST_DAYS")
            .unwrap_or(tracker.default_rest_days)
            .clamp(0.0, 60.0);

        let model = &mut self.model;
        model.draw_floor = parse_override(&lookup, "DRAW_FLOOR")
            .unwrap_or(model.draw_floor)
            .clamp(0.0, 1.0);
        model.draw_base = parse_override(&lookup, "DRAW_BASE")
            .unwrap_or(model.draw_base)
            .clamp(model.draw_floor, 1.0);
        model.draw_slope = parse_override(&lookup, "DRAW_SLOPE")
            .unwrap_or(model.draw_slope)
            .max(0.0);
    }
}

fn parse_override<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|val| val.trim().parse::<T>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_constants() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.sim.simulations, 1000);
        assert_eq!(cfg.sim.seed, 42);
        assert_eq!(cfg.tracker.elo.k, 20.0);
        assert_eq!(cfg.tracker.elo.home_adv_pts, 60.0);
        assert_eq!(cfg.tracker.elo.season_retain, 0.75);
        assert_eq!(cfg.tracker.recent_window, 5);
        assert_eq!(cfg.tracker.default_rest_days, 7.0);
        assert_eq!(cfg.model.draw_floor, 0.14);
        assert_eq!(cfg.model.draw_base, 0.26);
        assert_eq!(cfg.model.draw_slope, 0.08);
    }

    #[test]
    fn partial_json_keeps_other_defaults() {
        let cfg: EngineConfig =
            serde_json::from_str(r#"{"sim":{"simulations":250},"tracker":{"elo":{"k":32.0}}}"#)
                .unwrap();
        assert_eq!(cfg.sim.simulations, 250);
        assert_eq!(cfg.sim.seed, 42);
        assert_eq!(cfg.tracker.elo.k, 32.0);
        assert_eq!(cfg.tracker.elo.home_adv_pts, 60.0);
        assert_eq!(cfg.model.ppg_weight, 0.85);
    }

    #[test]
    fn zero_simulations_survive_loading() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        fs::write(&path, r#"{"sim":{"simulations":0}}"#).unwrap();
        let mut cfg = EngineConfig::from_file(&path).unwrap();
        cfg.apply_overrides(|_| None);
        assert_eq!(cfg.sim.simulations, 0);

        let mut cfg = EngineConfig::default();
        cfg.apply_overrides(|key| (key == "SIM_COUNT").then(|| "0".to_string()));
        assert_eq!(cfg.sim.simulations, 0);
    }

    #[test]
    fn overrides_are_clamped() {
        let mut cfg = EngineConfig::default();
        cfg.apply_overrides(|key| match key {
            "ELO_SEASON_RETAIN" => Some("1.7".to_string()),
            "RECENT_WINDOW" => Some("40".to_string()),
            "SIM_SEED" => Some(" 9 ".to_string()),
            "ELO_K" => Some("not a number".to_string()),
            _ => None,
        });
        assert_eq!(cfg.tracker.elo.season_retain, 1.0);
        assert_eq!(cfg.tracker.recent_window, MAX_RECENT_WINDOW);
        assert_eq!(cfg.sim.seed, 9);
        assert_eq!(cfg.tracker.elo.k, 20.0);
    }
}
