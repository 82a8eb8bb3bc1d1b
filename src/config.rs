//! Application-level configuration loading, including the quiz rules set.

use std::{env, fs, io::ErrorKind, path::PathBuf};

use serde::Deserialize;
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "TUNE_BLITZ_BACK_CONFIG_PATH";

/// Immutable runtime configuration shared across the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    rules: QuizRules,
}

/// Bounds every room must satisfy before and while a game runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuizRules {
    /// Minimum roster size required to start a game.
    pub min_players: usize,
    /// Minimum round budget accepted by start-game.
    pub min_rounds: u32,
    /// Number of title options presented each round (answer included).
    pub options_per_round: usize,
}

impl QuizRules {
    /// Smallest track pool that can cover `total_rounds` rounds.
    pub fn required_pool_size(&self, total_rounds: u32) -> usize {
        self.options_per_round * total_rounds as usize
    }
}

impl Default for QuizRules {
    fn default() -> Self {
        Self {
            min_players: 2,
            min_rounds: 5,
            options_per_round: 4,
        }
    }
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to the
    /// baked-in quiz rules.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let app_config: Self = raw.into();
                    info!(
                        path = %path.display(),
                        rules = ?app_config.rules,
                        "loaded quiz rules from config"
                    );
                    app_config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Quiz rules enforced by rooms and games.
    pub fn rules(&self) -> &QuizRules {
        &self.rules
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            rules: QuizRules::default(),
        }
    }
}

/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
#[derive(Debug, Deserialize)]
struct RawConfig {
    rules: RawRules,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        Self {
            rules: value.rules.into(),
        }
    }
}

/// JSON representation of the quiz rules block.
#[derive(Debug, Deserialize)]
struct RawRules {
    min_players: Option<usize>,
    min_rounds: Option<u32>,
    options_per_round: Option<usize>,
}

impl From<RawRules> for QuizRules {
    fn from(value: RawRules) -> Self {
        let defaults = QuizRules::default();
        Self {
            min_players: value.min_players.unwrap_or(defaults.min_players),
            min_rounds: value.min_rounds.unwrap_or(defaults.min_rounds),
            options_per_round: value.options_per_round.unwrap_or(defaults.options_per_round),
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
