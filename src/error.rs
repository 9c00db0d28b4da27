use thiserror::Error;

/// Failures the engine refuses to paper over. I/O layers wrap these in `anyhow`.
#[derive(Debug, Error, PartialEq)]
pub enum EngineError {
    #[error("no match history for league {league} (season {season})")]
    EmptyHistory { league: String, season: String },

    #[error("league {league} has {teams} team(s) in scope; at least 2 are required")]
    TooFewTeams { league: String, teams: usize },

    #[error("replication count must be at least 1")]
    NoReplications,

    #[error("invalid season code {0:?}")]
    InvalidSeasonCode(String),

    #[error("invalid result code {0:?}")]
    InvalidResultCode(String),

    #[error("simulation cancelled")]
    Cancelled,
}
