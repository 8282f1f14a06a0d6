// Copyright (C) 2026 StarHuntingGames
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

use std::{str::FromStr, time::Duration};

use arena_common::{
    DEFAULT_BOT_THINKING_DELAY_MS, DEFAULT_BOT_TIMEOUT_MS, DEFAULT_NETWORK_TIMEOUT_MS,
    DEFAULT_PLAN_MAX_DEPTH, expand_env_vars, normalize_optional_string,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BotStrategyKind {
    #[default]
    Planning,
    Random,
}

impl FromStr for BotStrategyKind {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "planning" => Ok(Self::Planning),
            "random" => Ok(Self::Random),
            other => Err(ConfigError::Invalid {
                reason: format!("unknown bot strategy '{other}'"),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Minimum wall time for a successful bot decision. Zero disables pacing.
    pub bot_thinking_delay: Duration,
    pub bot_decision_timeout: Duration,
    pub network_decision_timeout: Duration,
    pub worker_pool_size: usize,
    pub strategy: BotStrategyKind,
    pub plan_max_depth: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            bot_thinking_delay: Duration::from_millis(DEFAULT_BOT_THINKING_DELAY_MS),
            bot_decision_timeout: Duration::from_millis(DEFAULT_BOT_TIMEOUT_MS),
            network_decision_timeout: Duration::from_millis(DEFAULT_NETWORK_TIMEOUT_MS),
            worker_pool_size: default_pool_size(),
            strategy: BotStrategyKind::default(),
            plan_max_depth: DEFAULT_PLAN_MAX_DEPTH,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct BridgeConfigFile {
    bot_thinking_delay_ms: Option<u64>,
    bot_decision_timeout_ms: Option<u64>,
    network_decision_timeout_ms: Option<u64>,
    worker_pool_size: Option<usize>,
    strategy: Option<String>,
    plan_max_depth: Option<usize>,
}

impl BridgeConfig {
    /// Reads the environment, then overlays `BRIDGE_CONFIG_PATH` if set. A
    /// broken overlay file is logged and ignored.
    pub fn from_env() -> Self {
        let base = Self::from_lookup(|name| std::env::var(name).ok());

        let Some(path) = normalize_optional_string(std::env::var("BRIDGE_CONFIG_PATH").ok()) else {
            return base;
        };
        match Self::load_file(&path, base.clone()) {
            Ok(config) => {
                info!(
                    path = %path,
                    strategy = ?config.strategy,
                    worker_pool_size = config.worker_pool_size,
                    "loaded bridge config overlay"
                );
                config
            }
            Err(error) => {
                warn!(path = %path, error = %error, "ignoring bridge config overlay");
                base
            }
        }
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let millis = |name: &str, default: Duration| {
            lookup(name)
                .and_then(|value| value.trim().parse::<u64>().ok())
                .map(Duration::from_millis)
                .unwrap_or(default)
        };
        // A zero ceiling would time out every decision on its first poll.
        let ceiling = |name: &str, default: Duration| {
            let value = millis(name, default);
            if value.is_zero() {
                warn!(variable = name, "decision timeout must be positive; using default");
                return default;
            }
            value
        };
        let count = |name: &str, default: usize| {
            lookup(name)
                .and_then(|value| value.trim().parse::<usize>().ok())
                .filter(|value| *value > 0)
                .unwrap_or(default)
        };

        let strategy = match normalize_optional_string(lookup("BOT_STRATEGY")) {
            Some(raw) => raw.parse().unwrap_or_else(|error: ConfigError| {
                warn!(value = %raw, error = %error, "falling back to planning strategy");
                BotStrategyKind::default()
            }),
            None => BotStrategyKind::default(),
        };

        Self {
            bot_thinking_delay: millis("BOT_THINKING_DELAY_MS", defaults.bot_thinking_delay),
            bot_decision_timeout: ceiling("BOT_DECISION_TIMEOUT_MS", defaults.bot_decision_timeout),
            network_decision_timeout: ceiling(
                "NETWORK_DECISION_TIMEOUT_MS",
                defaults.network_decision_timeout,
            ),
            worker_pool_size: count("BOT_WORKER_POOL_SIZE", defaults.worker_pool_size),
            strategy,
            plan_max_depth: count("BOT_PLAN_MAX_DEPTH", defaults.plan_max_depth),
        }
    }

    pub fn load_file(path: &str, base: Self) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        })?;
        Self::from_yaml_str(&raw, base).map_err(|error| match error {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path.to_string(),
                source,
            },
            other => other,
        })
    }

    /// Applies the keys present in `raw` on top of `base`. `${VAR}` references
    /// are expanded before parsing.
    pub fn from_yaml_str(raw: &str, base: Self) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(raw);
        let file: BridgeConfigFile =
            serde_yaml::from_str(&expanded).map_err(|source| ConfigError::Parse {
                path: "<inline>".to_string(),
                source,
            })?;

        let mut config = base;
        if let Some(ms) = file.bot_thinking_delay_ms {
            config.bot_thinking_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = file.bot_decision_timeout_ms {
            config.bot_decision_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = file.network_decision_timeout_ms {
            config.network_decision_timeout = Duration::from_millis(ms);
        }
        if let Some(size) = file.worker_pool_size {
            config.worker_pool_size = size;
        }
        if let Some(strategy) = normalize_optional_string(file.strategy) {
            config.strategy = strategy.parse()?;
        }
        if let Some(depth) = file.plan_max_depth {
            config.plan_max_depth = depth;
        }
        config.validate()
    }

    fn validate(self) -> Result<Self, ConfigError> {
        if self.bot_decision_timeout.is_zero() || self.network_decision_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                reason: "decision timeouts must be positive".to_string(),
            });
        }
        if self.worker_pool_size == 0 {
            return Err(ConfigError::Invalid {
                reason: "worker_pool_size must be at least 1".to_string(),
            });
        }
        if self.plan_max_depth == 0 {
            return Err(ConfigError::Invalid {
                reason: "plan_max_depth must be at least 1".to_string(),
            });
        }
        Ok(self)
    }
}

fn default_pool_size() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_when_environment_is_empty() {
        let config = BridgeConfig::from_lookup(|_| None);
        assert_eq!(config.bot_thinking_delay, Duration::ZERO);
        assert_eq!(config.bot_decision_timeout, Duration::from_secs(30));
        assert_eq!(config.network_decision_timeout, Duration::from_secs(120));
        assert_eq!(config.strategy, BotStrategyKind::Planning);
        assert_eq!(config.plan_max_depth, 8);
        assert!(config.worker_pool_size >= 1);
    }

    #[test]
    fn environment_values_override_defaults() {
        let config = BridgeConfig::from_lookup(lookup_from(&[
            ("BOT_THINKING_DELAY_MS", "200"),
            ("BOT_DECISION_TIMEOUT_MS", "1500"),
            ("BOT_WORKER_POOL_SIZE", "3"),
            ("BOT_STRATEGY", " Random "),
        ]));
        assert_eq!(config.bot_thinking_delay, Duration::from_millis(200));
        assert_eq!(config.bot_decision_timeout, Duration::from_millis(1500));
        assert_eq!(config.worker_pool_size, 3);
        assert_eq!(config.strategy, BotStrategyKind::Random);
    }

    #[test]
    fn malformed_environment_values_keep_defaults() {
        let config = BridgeConfig::from_lookup(lookup_from(&[
            ("BOT_DECISION_TIMEOUT_MS", "soon"),
            ("BOT_WORKER_POOL_SIZE", "0"),
            ("BOT_STRATEGY", "genius"),
        ]));
        assert_eq!(config.bot_decision_timeout, Duration::from_secs(30));
        assert!(config.worker_pool_size >= 1);
        assert_eq!(config.strategy, BotStrategyKind::Planning);
    }

    #[test]
    fn zero_timeouts_from_environment_keep_defaults() {
        let config = BridgeConfig::from_lookup(lookup_from(&[
            ("BOT_THINKING_DELAY_MS", "0"),
            ("BOT_DECISION_TIMEOUT_MS", "0"),
            ("NETWORK_DECISION_TIMEOUT_MS", "0"),
        ]));
        assert_eq!(config.bot_thinking_delay, Duration::ZERO);
        assert_eq!(config.bot_decision_timeout, Duration::from_secs(30));
        assert_eq!(config.network_decision_timeout, Duration::from_secs(120));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn yaml_overlay_applies_present_keys_only() {
        let base = BridgeConfig::from_lookup(lookup_from(&[("BOT_THINKING_DELAY_MS", "50")]));
        let config = BridgeConfig::from_yaml_str(
            "network_decision_timeout_ms: 9000\nstrategy: random\n",
            base,
        )
        .unwrap();
        assert_eq!(config.bot_thinking_delay, Duration::from_millis(50));
        assert_eq!(config.network_decision_timeout, Duration::from_millis(9000));
        assert_eq!(config.strategy, BotStrategyKind::Random);
    }

    #[test]
    fn yaml_overlay_rejects_zero_timeout() {
        let err = BridgeConfig::from_yaml_str("bot_decision_timeout_ms: 0\n", BridgeConfig::default())
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn yaml_overlay_rejects_unknown_keys() {
        let err = BridgeConfig::from_yaml_str("thinking: fast\n", BridgeConfig::default())
            .unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn missing_overlay_file_is_a_read_error() {
        let err = BridgeConfig::load_file("/nonexistent/bridge.yaml", BridgeConfig::default())
            .unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
