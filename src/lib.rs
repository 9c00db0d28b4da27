pub mod aggregate;
pub mod calibration;
pub mod config;
pub mod elo;
pub mod error;
pub mod export;
pub mod features;
pub mod historical_dataset;
pub mod match_record;
pub mod season;
pub mod simulation;
pub mod standings;
pub mod team_state;
pub mod win_prob;

pub use error::EngineError;
