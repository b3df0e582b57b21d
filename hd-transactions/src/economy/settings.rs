//! Configuration and feature flags.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use thiserror::Error;

/// Time between two pending transaction requests.
pub const PENDING_TIME_BETWEEN_REQUESTS: Duration = Duration::from_secs(10 * 60);

/// Default scheduler cycle for the manager loop (one frame at 60 Hz).
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_micros(1_000_000 / 60);

/// Device feature settings consulted by the pending transaction flow.
pub trait FeatureSettings: Send + Sync {
    /// Whether pending transactions must be acknowledged by the server before
    /// their rewards are applied.
    fn need_pending_transactions_server_confirm(&self) -> bool;
}

/// Where the player currently is in the game flow.
pub trait GameFlow: Send + Sync {
    /// True while a run is being played.
    fn is_in_game_scene(&self) -> bool;
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Environment variable holds a value that can't be parsed.
    #[error("invalid value {value:?} for {key}")]
    InvalidValue {
        /// Variable name.
        key: &'static str,
        /// Raw value.
        value: String,
    },
}

fn env_var(key: &'static str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn parse_bool(key: &'static str, value: String) -> Result<bool, ConfigError> {
    match value.as_str() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(ConfigError::InvalidValue { key, value }),
    }
}

fn parse_u64(key: &'static str, value: String) -> Result<u64, ConfigError> {
    value
        .trim()
        .parse::<u64>()
        .map_err(|_| ConfigError::InvalidValue { key, value })
}

/// Static feature flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureFlags {
    /// See [`FeatureSettings::need_pending_transactions_server_confirm`].
    pub pending_transactions_server_confirm: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            pending_transactions_server_confirm: true,
        }
    }
}

impl FeatureFlags {
    /// Read flags from `HD_PENDING_TX_SERVER_CONFIRM`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut flags = Self::default();
        if let Some(value) = env_var("HD_PENDING_TX_SERVER_CONFIRM") {
            flags.pending_transactions_server_confirm =
                parse_bool("HD_PENDING_TX_SERVER_CONFIRM", value)?;
        }
        Ok(flags)
    }
}

impl FeatureSettings for FeatureFlags {
    fn need_pending_transactions_server_confirm(&self) -> bool {
        self.pending_transactions_server_confirm
    }
}

/// Game flow flag that the scene loader flips on run start/end.
#[derive(Debug, Default)]
pub struct SceneFlag {
    in_game: AtomicBool,
}

impl SceneFlag {
    /// Create a flag, outside of a run.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark whether a run is in progress.
    pub fn set_in_game(&self, in_game: bool) {
        self.in_game.store(in_game, Ordering::Relaxed);
    }
}

impl GameFlow for SceneFlag {
    fn is_in_game_scene(&self) -> bool {
        self.in_game.load(Ordering::Relaxed)
    }
}

/// Manager configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerConfig {
    /// Time between two pending transaction requests.
    pub poll_interval: Duration,
    /// Scheduler cycle used by [`crate::network::manager::TransactionManager::run`].
    pub tick_interval: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            poll_interval: PENDING_TIME_BETWEEN_REQUESTS,
            tick_interval: DEFAULT_TICK_INTERVAL,
        }
    }
}

impl ManagerConfig {
    /// Read configuration from `HD_TX_POLL_INTERVAL_SECS` and `HD_TX_TICK_MILLIS`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(value) = env_var("HD_TX_POLL_INTERVAL_SECS") {
            config.poll_interval = Duration::from_secs(parse_u64("HD_TX_POLL_INTERVAL_SECS", value)?);
        }
        if let Some(value) = env_var("HD_TX_TICK_MILLIS") {
            let millis = parse_u64("HD_TX_TICK_MILLIS", value)?;
            if millis == 0 {
                return Err(ConfigError::InvalidValue {
                    key: "HD_TX_TICK_MILLIS",
                    value: millis.to_string(),
                });
            }
            config.tick_interval = Duration::from_millis(millis);
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manager_config_default() {
        let config = ManagerConfig::default();
        assert_eq!(config.poll_interval, Duration::from_secs(600));
        assert!(config.tick_interval > Duration::ZERO);
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("K", "1".into()), Ok(true));
        assert_eq!(parse_bool("K", "false".into()), Ok(false));
        assert!(matches!(
            parse_bool("K", "yes".into()),
            Err(ConfigError::InvalidValue { key: "K", .. })
        ));
    }

    #[test]
    fn test_parse_u64() {
        assert_eq!(parse_u64("K", " 30 ".into()), Ok(30));
        assert!(parse_u64("K", "-1".into()).is_err());
    }

    #[test]
    fn test_scene_flag() {
        let flag = SceneFlag::new();
        assert!(!flag.is_in_game_scene());
        flag.set_in_game(true);
        assert!(flag.is_in_game_scene());
    }
}
