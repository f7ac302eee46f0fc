//! Escalation policy: click thresholds, block tiers and their cool-downs.
//!
//! The policy is pure data plus lookups. Six ordered thresholds `T0 < T1 < ... < T5` split the
//! click count into half-open windows:
//!
//! | count            | tier              |
//! |------------------|-------------------|
//! | `< T0`           | [`Tier::Clear`]   |
//! | `[T0, T1)`       | [`Tier::Warn`]    |
//! | `[T1, T2)` ...   | [`Tier::Block`] 1 |
//! | `>= T5`          | [`Tier::Block`] 5 |

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Number of click thresholds (`T0..=T5`).
pub const THRESHOLD_COUNT: usize = 6;
/// Highest block tier.
pub const MAX_BLOCK_LEVEL: u8 = 5;
/// Block level recorded for a subject that was flood-warned but not blocked.
pub const WARN_LEVEL: u8 = 0;

const DEFAULT_THRESHOLDS: [u32; THRESHOLD_COUNT] = [3, 7, 10, 15, 20, 25];
const DEFAULT_COOLDOWN_SECS: [u64; MAX_BLOCK_LEVEL as usize] = [60, 180, 600, 900, 1800];
const DEFAULT_CYCLE_SECS: u64 = 10;

/// What an expiry-triggered reset does to the click counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum FloodIntensity {
    /// Mode 1: zero both the click counter and the block tier.
    #[default]
    Light,
    /// Mode 2: keep the click counter, zero only the block tier.
    Aggressive,
}

impl TryFrom<u8> for FloodIntensity {
    type Error = PolicyError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(FloodIntensity::Light),
            2 => Ok(FloodIntensity::Aggressive),
            other => Err(PolicyError::UnknownIntensity(other)),
        }
    }
}

impl From<FloodIntensity> for u8 {
    fn from(value: FloodIntensity) -> Self {
        match value {
            FloodIntensity::Light => 1,
            FloodIntensity::Aggressive => 2,
        }
    }
}

/// Result of looking up a click count in the policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    /// Below `T0`: no penalty yet.
    Clear,
    /// `[T0, T1)`: flood warning.
    Warn,
    /// Block tier `1..=5`.
    Block(u8),
}

/// Errors produced when validating a policy. Raised at startup, never per request.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PolicyError {
    /// `T0` must be at least 1.
    #[error("first click threshold must be > 0")]
    ZeroFirstThreshold,
    /// Thresholds must be strictly increasing.
    #[error("click threshold T{index} ({value}) must be greater than the one before it ({previous})")]
    ThresholdsNotIncreasing {
        /// Position of the offending threshold.
        index: usize,
        /// Value of the threshold before it.
        previous: u32,
        /// Offending value.
        value: u32,
    },
    /// Every block tier needs a positive cool-down.
    #[error("cool-down for block tier {level} must be > 0")]
    ZeroCooldown {
        /// Tier with a zero cool-down.
        level: u8,
    },
    /// The default cycle must be positive.
    #[error("default cycle duration must be > 0")]
    ZeroCycle,
    /// Only modes 1 and 2 exist.
    #[error("flood intensity must be 1 or 2 (got {0})")]
    UnknownIntensity(u8),
}

/// Validated escalation policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscalationPolicy {
    thresholds: [u32; THRESHOLD_COUNT],
    cooldowns: [Duration; MAX_BLOCK_LEVEL as usize],
    cycle: Duration,
    intensity: FloodIntensity,
}

impl Default for EscalationPolicy {
    /// Thresholds 3/7/10/15/20/25, cool-downs 1/3/10/15/30 minutes, 10 second cycle, intensity 1.
    fn default() -> Self {
        Self {
            thresholds: DEFAULT_THRESHOLDS,
            cooldowns: DEFAULT_COOLDOWN_SECS.map(Duration::from_secs),
            cycle: Duration::from_secs(DEFAULT_CYCLE_SECS),
            intensity: FloodIntensity::Light,
        }
    }
}

impl EscalationPolicy {
    /// Create a policy with validation.
    ///
    /// # Examples
    /// ```
    /// use clickgate::policy::{EscalationPolicy, FloodIntensity};
    /// use std::time::Duration;
    ///
    /// let policy = EscalationPolicy::new(
    ///     [3, 7, 10, 15, 20, 25],
    ///     [60, 180, 600, 900, 1800].map(Duration::from_secs),
    ///     Duration::from_secs(10),
    ///     FloodIntensity::Light,
    /// )
    /// .unwrap();
    /// assert_eq!(policy, EscalationPolicy::default());
    /// ```
    pub fn new(
        thresholds: [u32; THRESHOLD_COUNT],
        cooldowns: [Duration; MAX_BLOCK_LEVEL as usize],
        cycle: Duration,
        intensity: FloodIntensity,
    ) -> Result<Self, PolicyError> {
        let policy = Self { thresholds, cooldowns, cycle, intensity };
        policy.validate()?;
        Ok(policy)
    }

    /// Replace the thresholds; must stay strictly increasing.
    pub fn with_thresholds(
        mut self,
        thresholds: [u32; THRESHOLD_COUNT],
    ) -> Result<Self, PolicyError> {
        self.thresholds = thresholds;
        self.validate()?;
        Ok(self)
    }

    /// Replace the per-tier cool-downs; all must be > 0.
    pub fn with_cooldowns(
        mut self,
        cooldowns: [Duration; MAX_BLOCK_LEVEL as usize],
    ) -> Result<Self, PolicyError> {
        self.cooldowns = cooldowns;
        self.validate()?;
        Ok(self)
    }

    /// Replace the default cycle length; must be > 0.
    pub fn with_cycle(mut self, cycle: Duration) -> Result<Self, PolicyError> {
        self.cycle = cycle;
        self.validate()?;
        Ok(self)
    }

    /// Select the expiry reset mode.
    pub fn with_intensity(mut self, intensity: FloodIntensity) -> Self {
        self.intensity = intensity;
        self
    }

    fn validate(&self) -> Result<(), PolicyError> {
        if self.thresholds[0] == 0 {
            return Err(PolicyError::ZeroFirstThreshold);
        }
        for (index, pair) in self.thresholds.windows(2).enumerate() {
            if pair[1] <= pair[0] {
                return Err(PolicyError::ThresholdsNotIncreasing {
                    index: index + 1,
                    previous: pair[0],
                    value: pair[1],
                });
            }
        }
        if let Some(pos) = self.cooldowns.iter().position(Duration::is_zero) {
            return Err(PolicyError::ZeroCooldown { level: pos as u8 + 1 });
        }
        if self.cycle.is_zero() {
            return Err(PolicyError::ZeroCycle);
        }
        Ok(())
    }

    /// Map a click count to its tier. Thresholds are scanned low to high; first match wins.
    pub fn tier_for(&self, click_count: u32) -> Tier {
        match self.thresholds.iter().rposition(|&t| click_count >= t) {
            None => Tier::Clear,
            Some(0) => Tier::Warn,
            Some(i) => Tier::Block(i as u8),
        }
    }

    /// Cool-down for a block tier, `None` outside `1..=5`.
    pub fn cooldown_for(&self, level: u8) -> Option<Duration> {
        match level {
            1..=MAX_BLOCK_LEVEL => Some(self.cooldowns[usize::from(level) - 1]),
            _ => None,
        }
    }

    /// Cool-down in whole seconds, `None` outside `1..=5`.
    pub fn cooldown_seconds_for(&self, level: u8) -> Option<u64> {
        self.cooldown_for(level).map(|d| d.as_secs())
    }

    /// Human label for a tier's wait: `"3min"`, or `"90s"` when not a whole minute.
    pub fn wait_label_for(&self, level: u8) -> Option<String> {
        self.cooldown_for(level).map(wait_label)
    }

    pub fn thresholds(&self) -> [u32; THRESHOLD_COUNT] {
        self.thresholds
    }

    pub fn cooldowns(&self) -> [Duration; MAX_BLOCK_LEVEL as usize] {
        self.cooldowns
    }

    /// Length of a fresh click cycle.
    pub fn cycle(&self) -> Duration {
        self.cycle
    }

    pub fn intensity(&self) -> FloodIntensity {
        self.intensity
    }
}

pub(crate) fn wait_label(wait: Duration) -> String {
    let secs = wait.as_secs();
    if secs >= 60 && secs % 60 == 0 {
        format!("{}min", secs / 60)
    } else {
        format!("{secs}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_tiers_follow_half_open_windows() {
        let policy = EscalationPolicy::default();
        let expected = [
            (0, Tier::Clear),
            (2, Tier::Clear),
            (3, Tier::Warn),
            (6, Tier::Warn),
            (7, Tier::Block(1)),
            (9, Tier::Block(1)),
            (10, Tier::Block(2)),
            (15, Tier::Block(3)),
            (19, Tier::Block(3)),
            (20, Tier::Block(4)),
            (24, Tier::Block(4)),
            (25, Tier::Block(5)),
            (10_000, Tier::Block(5)),
        ];
        for (count, tier) in expected {
            assert_eq!(policy.tier_for(count), tier, "count {count}");
        }
    }

    #[test]
    fn default_cooldowns_and_labels() {
        let policy = EscalationPolicy::default();
        let secs: Vec<_> = (1..=5).filter_map(|l| policy.cooldown_seconds_for(l)).collect();
        assert_eq!(secs, vec![60, 180, 600, 900, 1800]);
        assert_eq!(policy.wait_label_for(1).as_deref(), Some("1min"));
        assert_eq!(policy.wait_label_for(5).as_deref(), Some("30min"));
        assert!(policy.cooldown_for(0).is_none());
        assert!(policy.cooldown_for(6).is_none());
    }

    #[test]
    fn non_minute_cooldowns_label_in_seconds() {
        assert_eq!(wait_label(Duration::from_secs(90)), "90s");
        assert_eq!(wait_label(Duration::from_secs(45)), "45s");
    }

    #[test]
    fn rejects_non_increasing_thresholds() {
        let err = EscalationPolicy::default()
            .with_thresholds([3, 7, 7, 15, 20, 25])
            .expect_err("duplicate threshold should be invalid");
        assert_eq!(err, PolicyError::ThresholdsNotIncreasing { index: 2, previous: 7, value: 7 });
        assert!(err.to_string().contains("T2"));
    }

    #[test]
    fn rejects_zero_first_threshold() {
        let err = EscalationPolicy::default().with_thresholds([0, 7, 10, 15, 20, 25]).unwrap_err();
        assert_eq!(err, PolicyError::ZeroFirstThreshold);
    }

    #[test]
    fn rejects_zero_cooldown_and_cycle() {
        let mut cooldowns = EscalationPolicy::default().cooldowns();
        cooldowns[3] = Duration::ZERO;
        let err = EscalationPolicy::default().with_cooldowns(cooldowns).unwrap_err();
        assert_eq!(err, PolicyError::ZeroCooldown { level: 4 });

        let err = EscalationPolicy::default().with_cycle(Duration::ZERO).unwrap_err();
        assert_eq!(err, PolicyError::ZeroCycle);
    }

    #[test]
    fn intensity_round_trips_through_its_numeric_code() {
        assert_eq!(FloodIntensity::try_from(2), Ok(FloodIntensity::Aggressive));
        assert_eq!(u8::from(FloodIntensity::Light), 1);
        assert_eq!(FloodIntensity::try_from(3), Err(PolicyError::UnknownIntensity(3)));
        let parsed: FloodIntensity = serde_json::from_str("2").unwrap();
        assert_eq!(parsed, FloodIntensity::Aggressive);
        assert!(serde_json::from_str::<FloodIntensity>("7").is_err());
    }
}
