//! Non-blocking pauses.
//!
//! The gate pauses in two places: the optional release delay before a finalize/force release, and
//! between attempts when a conditional write loses a race. Both go through [`Sleeper`] so tests
//! can run without real delays and so no worker thread is ever pinned by a wait.

use async_trait::async_trait;
use rand::Rng;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Abstraction for sleeping/waiting.
#[async_trait]
pub trait Sleeper: Send + Sync + std::fmt::Debug {
    async fn sleep(&self, duration: Duration);
}

/// Production sleeper using the tokio timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }
    }
}

/// Test sleeper that returns immediately.
#[derive(Debug, Default, Clone, Copy)]
pub struct InstantSleeper;

#[async_trait]
impl Sleeper for InstantSleeper {
    async fn sleep(&self, _duration: Duration) {}
}

/// Test sleeper that records every requested pause and returns immediately.
#[derive(Debug, Clone, Default)]
pub struct TrackingSleeper {
    calls: Arc<Mutex<Vec<Duration>>>,
}

impl TrackingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<Duration> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Sleeper for TrackingSleeper {
    async fn sleep(&self, duration: Duration) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(duration);
        }
    }
}

/// Pause before retrying a conflicted write: `base * attempt` plus up to `base` of jitter.
pub(crate) fn conflict_pause(base: Duration, attempt: usize) -> Duration {
    if base.is_zero() {
        return Duration::ZERO;
    }
    let attempt = u32::try_from(attempt.max(1)).unwrap_or(u32::MAX);
    let floor = base.saturating_mul(attempt);
    let jitter_nanos = u64::try_from(base.as_nanos()).unwrap_or(u64::MAX);
    let jitter = rand::rng().random_range(0..=jitter_nanos);
    floor.saturating_add(Duration::from_nanos(jitter))
}
