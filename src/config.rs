//! Startup configuration.
//!
//! [`GateConfig`] is read once, from environment variables or a JSON document, validated, and
//! never changed afterwards. Every field has a default so an empty environment yields the stock
//! policy.
//!
//! | variable                             | field                 | unit    |
//! |--------------------------------------|-----------------------|---------|
//! | `CLICKGATE_FLOOD_TIMEOUT_DEFAULT`    | `cycle_secs`          | seconds |
//! | `CLICKGATE_FLOOD_{0..5}_LIMIT`       | `thresholds[i]`       | clicks  |
//! | `CLICKGATE_FLOOD_{1..5}_TIMEOUT`     | `cooldown_secs[i-1]`  | seconds |
//! | `CLICKGATE_FLOOD_INTENSITY`          | `flood_intensity`     | 1 or 2  |
//! | `CLICKGATE_UTC_OFFSET_MINUTES`       | `utc_offset_minutes`  | minutes |
//! | `CLICKGATE_STORE_TIMEOUT_MS`         | `store_timeout_ms`    | millis  |
//! | `CLICKGATE_CONFLICT_RETRIES`         | `conflict_retries`    | count   |
//! | `CLICKGATE_RELEASE_DELAY_MS`         | `release_delay_ms`    | millis  |

use crate::format::TimeFormatter;
use crate::policy::{EscalationPolicy, FloodIntensity, PolicyError, MAX_BLOCK_LEVEL, THRESHOLD_COUNT};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

const ENV_PREFIX: &str = "CLICKGATE_";

/// Errors raised while loading configuration.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// A variable or field could not be parsed or is out of range.
    #[error("{key} has invalid value '{value}'")]
    InvalidValue { key: String, value: String },
    /// The escalation policy is inconsistent.
    #[error(transparent)]
    Policy(#[from] PolicyError),
    /// The JSON document is malformed.
    #[error("invalid configuration document: {0}")]
    Json(#[from] serde_json::Error),
    /// The display offset is a day or more.
    #[error("display offset of {0} minutes is out of range")]
    Offset(i32),
}

/// Immutable gate configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GateConfig {
    /// Length of a fresh click cycle, seconds.
    pub cycle_secs: u64,
    /// `T0..=T5`.
    pub thresholds: [u32; THRESHOLD_COUNT],
    /// Cool-downs for block tiers 1 to 5, seconds.
    pub cooldown_secs: [u64; MAX_BLOCK_LEVEL as usize],
    /// Expiry reset mode, `1` or `2`.
    pub flood_intensity: u8,
    /// Display offset east of UTC; only affects rendered messages.
    pub utc_offset_minutes: i32,
    pub store_timeout_ms: u64,
    /// Conditional-write attempts per operation.
    pub conflict_retries: usize,
    /// Pause before a release is applied; `0` disables it.
    pub release_delay_ms: u64,
}

impl Default for GateConfig {
    fn default() -> Self {
        let policy = EscalationPolicy::default();
        Self {
            cycle_secs: policy.cycle().as_secs(),
            thresholds: policy.thresholds(),
            cooldown_secs: policy.cooldowns().map(|d| d.as_secs()),
            flood_intensity: policy.intensity().into(),
            utc_offset_minutes: 0,
            store_timeout_ms: 2_000,
            conflict_retries: 3,
            release_delay_ms: 0,
        }
    }
}

impl GateConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from any key lookup, e.g. a map in tests. Missing keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let read = |name: &str| {
            let key = format!("{ENV_PREFIX}{name}");
            lookup(&key).map(|value| (key, value))
        };

        parse_into(read("FLOOD_TIMEOUT_DEFAULT"), &mut config.cycle_secs)?;
        for (i, slot) in config.thresholds.iter_mut().enumerate() {
            parse_into(read(&format!("FLOOD_{i}_LIMIT")), slot)?;
        }
        for (i, slot) in config.cooldown_secs.iter_mut().enumerate() {
            parse_into(read(&format!("FLOOD_{}_TIMEOUT", i + 1)), slot)?;
        }
        parse_into(read("FLOOD_INTENSITY"), &mut config.flood_intensity)?;
        parse_into(read("UTC_OFFSET_MINUTES"), &mut config.utc_offset_minutes)?;
        parse_into(read("STORE_TIMEOUT_MS"), &mut config.store_timeout_ms)?;
        parse_into(read("CONFLICT_RETRIES"), &mut config.conflict_retries)?;
        parse_into(read("RELEASE_DELAY_MS"), &mut config.release_delay_ms)?;

        config.validate()?;
        Ok(config)
    }

    /// Load from a JSON object using the field names of this struct.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every field, including the derived policy and formatter.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.policy()?;
        self.formatter()?;
        if self.store_timeout_ms == 0 {
            return Err(invalid("store_timeout_ms", self.store_timeout_ms));
        }
        if self.conflict_retries == 0 {
            return Err(invalid("conflict_retries", self.conflict_retries));
        }
        Ok(())
    }

    pub fn policy(&self) -> Result<EscalationPolicy, PolicyError> {
        EscalationPolicy::new(
            self.thresholds,
            self.cooldown_secs.map(Duration::from_secs),
            Duration::from_secs(self.cycle_secs),
            FloodIntensity::try_from(self.flood_intensity)?,
        )
    }

    pub fn formatter(&self) -> Result<TimeFormatter, ConfigError> {
        TimeFormatter::with_offset_minutes(self.utc_offset_minutes)
            .ok_or(ConfigError::Offset(self.utc_offset_minutes))
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    pub fn release_delay(&self) -> Duration {
        Duration::from_millis(self.release_delay_ms)
    }
}

fn parse_into<T: FromStr>(entry: Option<(String, String)>, slot: &mut T) -> Result<(), ConfigError> {
    if let Some((key, value)) = entry {
        *slot = value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { key, value: value.clone() })?;
    }
    Ok(())
}

fn invalid(key: &str, value: impl ToString) -> ConfigError {
    ConfigError::InvalidValue { key: key.to_owned(), value: value.to_string() }
}
