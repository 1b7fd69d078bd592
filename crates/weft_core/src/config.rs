//! Configuration for the [`Controller`](crate::Controller).

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Tunables for how the controller schedules evaluation.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// How visited nodes are tracked across the seeds of a single batch.
    pub visited: Visited,
    /// Whether starting a new pass cancels any pass still in flight.
    pub cancel_superseded: bool,
    /// Whether code is trimmed before checking if it is empty.
    pub trim_code: bool,
    /// The error reported when an executor fails without saying why.
    pub unknown_error: String,
}

/// How the visited set is shared between the dirty seeds of one batch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum Visited {
    /// One visited set for the whole batch. Each node executes at most once
    /// per batch, even when reachable from several seeds.
    #[default]
    Shared,
    /// A fresh visited set for each seed.
    PerSeed,
}

/// Failed to load a [`Config`].
#[derive(Debug, Error)]
#[error("failed to parse config: {0}")]
pub struct ConfigError(#[from] ron::error::SpannedError);

impl Config {
    /// Parse a config from RON. Missing fields take their default values.
    pub fn from_ron(s: &str) -> Result<Self, ConfigError> {
        Ok(ron::from_str(s)?)
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            visited: Visited::Shared,
            cancel_superseded: true,
            trim_code: true,
            unknown_error: crate::UNKNOWN_ERROR.to_string(),
        }
    }
}

#[test]
fn test_config_from_ron() {
    let config = Config::from_ron("(visited: PerSeed, cancel_superseded: false)").unwrap();
    assert_eq!(config.visited, Visited::PerSeed);
    assert!(!config.cancel_superseded);
    assert!(config.trim_code);
    assert_eq!(config.unknown_error, crate::UNKNOWN_ERROR);
    assert!(Config::from_ron("(visited: Sometimes)").is_err());
}
