//! The click gate: admission engine plus record store.
//!
//! Each operation is one read-decide-write round against one subject's record:
//!
//! 1. read the record (bounded by the store timeout),
//! 2. run the [`AdmissionEngine`] against it at the current instant,
//! 3. commit the resulting record with a conditional write keyed on the version that was read.
//!
//! If the write loses a race the round starts over with a fresh read, after a short jittered
//! pause, up to the configured number of attempts. The record is fully computed before the
//! write, so a cancelled or failed call never leaves a partial update behind.

use crate::clock::{Clock, SystemClock};
use crate::config::{ConfigError, GateConfig};
use crate::decision::{Decision, RenderedDecision};
use crate::engine::{AdmissionEngine, Step, Transition};
use crate::error::GateError;
use crate::format::TimeFormatter;
use crate::policy::EscalationPolicy;
use crate::record::{SubjectId, SubjectRecord};
use crate::sleeper::{conflict_pause, Sleeper, TokioSleeper};
use crate::store::RecordStore;
use crate::telemetry::{
    emit_best_effort, AdmissionEvent, GateEvent, NullSink, ReleaseEvent, StoreEvent, TelemetrySink,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Default limit for a single store call.
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(2);
/// Default conditional-write attempts per operation.
pub const DEFAULT_CONFLICT_ATTEMPTS: usize = 3;
const DEFAULT_CONFLICT_PAUSE: Duration = Duration::from_millis(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    Click,
    Finalize,
    Force,
}

/// Per-subject click admission gate.
///
/// # Example
/// ```
/// use clickgate::{ClickGate, EscalationPolicy, InMemoryRecordStore};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), clickgate::GateError> {
/// let gate = ClickGate::new(InMemoryRecordStore::new(), EscalationPolicy::default());
/// assert!(gate.evaluate_click("u1").await?.is_allowed());
/// assert!(!gate.evaluate_click("u1").await?.is_allowed());
/// assert!(gate.finalize_click("u1").await?.is_allowed());
/// # Ok(())
/// # }
/// ```
pub struct ClickGate<S, T = NullSink> {
    store: Arc<S>,
    engine: AdmissionEngine,
    clock: Arc<dyn Clock>,
    sleeper: Arc<dyn Sleeper>,
    formatter: TimeFormatter,
    store_timeout: Duration,
    attempts: usize,
    conflict_pause: Duration,
    release_delay: Duration,
    sink: T,
}

impl<S, T: Clone> Clone for ClickGate<S, T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            engine: self.engine.clone(),
            clock: self.clock.clone(),
            sleeper: self.sleeper.clone(),
            formatter: self.formatter,
            store_timeout: self.store_timeout,
            attempts: self.attempts,
            conflict_pause: self.conflict_pause,
            release_delay: self.release_delay,
            sink: self.sink.clone(),
        }
    }
}

impl<S, T> std::fmt::Debug for ClickGate<S, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClickGate")
            .field("policy", self.engine.policy())
            .field("store_timeout", &self.store_timeout)
            .field("attempts", &self.attempts)
            .field("release_delay", &self.release_delay)
            .finish_non_exhaustive()
    }
}

impl<S> ClickGate<S, NullSink> {
    /// Gate over `store` with the system clock, tokio timers and no telemetry.
    pub fn new(store: S, policy: EscalationPolicy) -> Self {
        Self {
            store: Arc::new(store),
            engine: AdmissionEngine::new(policy),
            clock: Arc::new(SystemClock),
            sleeper: Arc::new(TokioSleeper),
            formatter: TimeFormatter::utc(),
            store_timeout: DEFAULT_STORE_TIMEOUT,
            attempts: DEFAULT_CONFLICT_ATTEMPTS,
            conflict_pause: DEFAULT_CONFLICT_PAUSE,
            release_delay: Duration::ZERO,
            sink: NullSink,
        }
    }

    /// Gate configured from a validated [`GateConfig`].
    pub fn from_config(store: S, config: &GateConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::new(store, config.policy()?)
            .with_formatter(config.formatter()?)
            .with_store_timeout(config.store_timeout())
            .with_conflict_attempts(config.conflict_retries)
            .with_release_delay(config.release_delay()))
    }
}

impl<S, T> ClickGate<S, T> {
    /// Override the clock (useful for deterministic tests).
    pub fn with_clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Override how the gate pauses between conflicting writes and before releases.
    pub fn with_sleeper<Z: Sleeper + 'static>(mut self, sleeper: Z) -> Self {
        self.sleeper = Arc::new(sleeper);
        self
    }

    /// Attach a telemetry sink.
    pub fn with_sink<U>(self, sink: U) -> ClickGate<S, U> {
        ClickGate {
            store: self.store,
            engine: self.engine,
            clock: self.clock,
            sleeper: self.sleeper,
            formatter: self.formatter,
            store_timeout: self.store_timeout,
            attempts: self.attempts,
            conflict_pause: self.conflict_pause,
            release_delay: self.release_delay,
            sink,
        }
    }

    pub fn with_formatter(mut self, formatter: TimeFormatter) -> Self {
        self.formatter = formatter;
        self
    }

    /// Limit for each individual store call.
    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    /// Conditional-write attempts per operation; at least one is always made.
    pub fn with_conflict_attempts(mut self, attempts: usize) -> Self {
        self.attempts = attempts.max(1);
        self
    }

    /// Base pause between conflicting attempts; the actual pause grows with the attempt number
    /// and is jittered.
    pub fn with_conflict_pause(mut self, pause: Duration) -> Self {
        self.conflict_pause = pause;
        self
    }

    /// Pause applied before every finalize or forced release.
    pub fn with_release_delay(mut self, delay: Duration) -> Self {
        self.release_delay = delay;
        self
    }

    pub fn policy(&self) -> &EscalationPolicy {
        self.engine.policy()
    }

    pub fn formatter(&self) -> &TimeFormatter {
        &self.formatter
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Render a decision with the configured display offset.
    pub fn render(&self, decision: &Decision) -> RenderedDecision {
        decision.render(&self.formatter)
    }
}

impl<S, T> ClickGate<S, T>
where
    S: RecordStore + 'static,
    T: TelemetrySink,
    T::Future: Send + 'static,
{
    /// Admit, count, warn or block one click.
    pub async fn evaluate_click(&self, subject: &str) -> Result<Decision, GateError> {
        let subject = parse_subject(subject)?;
        self.run(Operation::Click, &subject).await
    }

    /// Close the subject's cycle. Refused with [`Decision::Blocked`] while the subject sits at a
    /// block tier.
    pub async fn finalize_click(&self, subject: &str) -> Result<Decision, GateError> {
        let subject = parse_subject(subject)?;
        self.sleeper.sleep(self.release_delay).await;
        self.run(Operation::Finalize, &subject).await
    }

    /// Reset the subject's record whatever its state.
    pub async fn force_release(&self, subject: &str) -> Result<Decision, GateError> {
        let subject = parse_subject(subject)?;
        self.sleeper.sleep(self.release_delay).await;
        self.run(Operation::Force, &subject).await
    }

    /// Every record, ordered by subject id.
    pub async fn list_subjects(&self) -> Result<Vec<SubjectRecord>, GateError> {
        let mut records = self.call("list", self.store.list()).await?;
        records.sort_by(|a, b| a.subject_id.cmp(&b.subject_id));
        Ok(records)
    }

    /// Records at a block tier whose cool-down has not elapsed yet.
    pub async fn blocked_subjects(&self) -> Result<Vec<SubjectRecord>, GateError> {
        let records = self.list_subjects().await?;
        let now = self.clock.now_millis();
        Ok(records.into_iter().filter(|r| r.is_blocked_at(now)).collect())
    }

    /// One subject's record, if it has one.
    pub async fn subject(&self, subject: &str) -> Result<Option<SubjectRecord>, GateError> {
        let subject = parse_subject(subject)?;
        self.call("get", self.store.get(&subject)).await
    }

    async fn run(&self, op: Operation, subject: &SubjectId) -> Result<Decision, GateError> {
        for attempt in 1..=self.attempts {
            let current = self.call("get", self.store.get(subject)).await?;
            let now = self.clock.now_millis();
            let transition = self.decide(op, subject, current.as_ref(), now);

            let committed = match (&transition.next, &current) {
                (None, _) => true,
                (Some(next), None) => self.call("create", self.store.create(next.clone())).await?,
                (Some(next), Some(read)) => {
                    self.call("update", self.store.update(next.clone(), read.version)).await?
                }
            };

            if committed {
                if let Some(event) = self.observe(op, subject, &transition) {
                    self.emit(event).await;
                }
                return Ok(transition.decision);
            }

            tracing::warn!(subject = %subject, attempt, "conflicting write, re-reading record");
            self.emit(GateEvent::Store(StoreEvent::Conflict { subject: subject.clone(), attempt }))
                .await;
            if attempt < self.attempts {
                self.sleeper.sleep(conflict_pause(self.conflict_pause, attempt)).await;
            }
        }

        tracing::warn!(subject = %subject, attempts = self.attempts, "giving up after write conflicts");
        Err(GateError::Contention { subject: subject.to_string(), attempts: self.attempts })
    }

    fn decide(
        &self,
        op: Operation,
        subject: &SubjectId,
        current: Option<&SubjectRecord>,
        now: u64,
    ) -> Transition {
        match op {
            Operation::Click => self.engine.evaluate_click(subject, current, now),
            Operation::Finalize => self.engine.finalize_click(current, now),
            Operation::Force => self.engine.force_release(current, now),
        }
    }

    async fn call<F, V>(&self, operation: &'static str, fut: F) -> Result<V, GateError>
    where
        F: Future<Output = Result<V, S::Error>>,
    {
        match tokio::time::timeout(self.store_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => {
                tracing::warn!(operation, error = %err, "record store call failed");
                self.emit(GateEvent::Store(StoreEvent::Failure { operation })).await;
                Err(GateError::storage(err))
            }
            Err(_) => {
                let timeout = self.store_timeout;
                tracing::warn!(operation, ?timeout, "record store call timed out");
                self.emit(GateEvent::Store(StoreEvent::Timeout { operation, timeout })).await;
                Err(GateError::StoreTimeout { timeout })
            }
        }
    }

    /// Log a committed transition and build its event.
    fn observe(&self, op: Operation, subject: &SubjectId, t: &Transition) -> Option<GateEvent> {
        let subject = subject.clone();
        let clicks = t.next.as_ref().map_or(0, |r| r.click_count);
        let event = match t.step {
            Step::Created | Step::Reopened => {
                let reopened = t.step == Step::Reopened;
                tracing::debug!(subject = %subject, reopened, "click cycle opened");
                GateEvent::Admission(AdmissionEvent::Opened { subject, reopened })
            }
            Step::Expired { previous_level } => {
                tracing::info!(subject = %subject, ?previous_level, clicks, "stale click cycle reset");
                GateEvent::Admission(AdmissionEvent::Expired {
                    subject,
                    previous_level,
                    click_count: clicks,
                })
            }
            Step::Denied => {
                tracing::debug!(subject = %subject, clicks, "click denied, cycle still open");
                GateEvent::Admission(AdmissionEvent::Denied { subject, click_count: clicks })
            }
            Step::Warned => {
                tracing::debug!(subject = %subject, clicks, "click flood warning");
                GateEvent::Admission(AdmissionEvent::FloodWarning { subject, click_count: clicks })
            }
            Step::Escalated { tier } => {
                tracing::warn!(subject = %subject, tier, clicks, "click flood blocked");
                self.blocked(subject, tier, true)
            }
            Step::Held { tier } => {
                tracing::debug!(subject = %subject, tier, "click rejected, block unchanged");
                self.blocked(subject, tier, false)
            }
            Step::ReleaseRefused { tier } => {
                tracing::info!(subject = %subject, tier, "release refused while blocked");
                GateEvent::Release(ReleaseEvent::Refused { subject, tier })
            }
            Step::Released => {
                let forced = op == Operation::Force;
                tracing::info!(subject = %subject, forced, "click cycle released");
                if forced {
                    GateEvent::Release(ReleaseEvent::Forced { subject })
                } else {
                    GateEvent::Release(ReleaseEvent::Finalized { subject })
                }
            }
            Step::Absent => {
                tracing::debug!(subject = %subject, "release for unknown subject ignored");
                return None;
            }
        };
        Some(event)
    }

    fn blocked(&self, subject: SubjectId, tier: u8, escalated: bool) -> GateEvent {
        let wait = self.engine.policy().cooldown_for(tier).unwrap_or_default();
        GateEvent::Admission(AdmissionEvent::Blocked { subject, tier, wait, escalated })
    }

    async fn emit(&self, event: GateEvent) {
        emit_best_effort(self.sink.clone(), event).await;
    }
}

fn parse_subject(raw: &str) -> Result<SubjectId, GateError> {
    SubjectId::parse(raw).map_err(|err| {
        tracing::debug!(error = %err, "rejected subject id");
        GateError::from(err)
    })
}
