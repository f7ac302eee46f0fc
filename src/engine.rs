//! Admission engine: the per-subject escalation state machine.
//!
//! The engine is pure. It takes the subject's current record (or its absence) and the current
//! instant and returns a [`Transition`]: the record to write, if any, and the decision to hand
//! back. Persistence, retries and timeouts live in [`crate::gate::ClickGate`].
//!
//! # States
//! - **absent**: the first click creates an `Active` record and is allowed.
//! - **Idle**: a finalized cycle; the next click reopens it and is allowed.
//! - **Active, expired**: the cycle or block went stale without a finalize; it is reset to `Idle`
//!   according to the [`FloodIntensity`] and the click is allowed.
//! - **Active, live**: the click count selects a tier; denied/warned clicks are counted, block
//!   tiers escalate the cool-down, tier 5 is a ceiling.

use crate::decision::Decision;
use crate::policy::{EscalationPolicy, FloodIntensity, Tier, MAX_BLOCK_LEVEL, WARN_LEVEL};
use crate::record::{CycleStatus, SubjectId, SubjectRecord};
use std::time::Duration;

/// Which branch of the state machine produced a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// First click for the subject.
    Created,
    /// Click on an `Idle` record reopened the cycle.
    Reopened,
    /// Stale cycle or block was reset.
    Expired {
        /// Block level before the reset.
        previous_level: Option<u8>,
    },
    /// Counted below `T0`.
    Denied,
    /// Counted in the warning window.
    Warned,
    /// Entered or extended a block tier.
    Escalated {
        /// Tier written.
        tier: u8,
    },
    /// Blocked without a write: tier-5 ceiling, or the cycle ends this very instant.
    Held {
        /// Tier reported.
        tier: u8,
    },
    /// Release refused because the subject is at a block tier.
    ReleaseRefused {
        /// Current tier.
        tier: u8,
    },
    /// Record reset by a release.
    Released,
    /// Release for a subject with no record; nothing to do.
    Absent,
}

/// Result of running the state machine once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    /// Record to persist; `None` when the branch does not write.
    pub next: Option<SubjectRecord>,
    /// Decision for the caller.
    pub decision: Decision,
    /// Branch taken.
    pub step: Step,
}

impl Transition {
    fn write(next: SubjectRecord, decision: Decision, step: Step) -> Self {
        Self { next: Some(next), decision, step }
    }

    fn read_only(decision: Decision, step: Step) -> Self {
        Self { next: None, decision, step }
    }
}

/// Parameterized admission state machine.
#[derive(Debug, Clone, Default)]
pub struct AdmissionEngine {
    policy: EscalationPolicy,
}

impl AdmissionEngine {
    pub fn new(policy: EscalationPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &EscalationPolicy {
        &self.policy
    }

    /// Decide on one click.
    pub fn evaluate_click(
        &self,
        subject: &SubjectId,
        current: Option<&SubjectRecord>,
        now: u64,
    ) -> Transition {
        let record = match current {
            None => {
                let expires_at = after(now, self.policy.cycle());
                let next = SubjectRecord::first_click(subject.clone(), now, expires_at);
                return Transition::write(next, Decision::Allow { at: expires_at }, Step::Created);
            }
            Some(record) => record,
        };

        if record.status == CycleStatus::Idle {
            let mut next = record.clone();
            next.status = CycleStatus::Active;
            next.expires_at = after(now, self.policy.cycle());
            next.updated_at = Some(now);
            let decision = Decision::Allow { at: next.expires_at };
            return Transition::write(next, decision, Step::Reopened);
        }

        if record.is_expired(now) {
            return self.expire(record, now);
        }

        match self.policy.tier_for(record.click_count) {
            Tier::Clear => {
                let next = counted(record, now, record.block_level);
                Transition::write(next, Decision::Denied { retry_at: record.expires_at }, Step::Denied)
            }
            Tier::Warn => {
                let next = counted(record, now, Some(WARN_LEVEL));
                let decision = Decision::FloodWarning { expires_at: record.expires_at };
                Transition::write(next, decision, Step::Warned)
            }
            Tier::Block(tier) => self.block(record, tier, now),
        }
    }

    /// Cooperative release: refused while the subject sits at a block tier.
    pub fn finalize_click(&self, current: Option<&SubjectRecord>, now: u64) -> Transition {
        match current {
            None => Transition::read_only(Decision::Allow { at: now }, Step::Absent),
            Some(record) => match record.block_tier() {
                Some(tier) => {
                    let decision = Decision::Blocked {
                        tier,
                        wait: self.policy.cooldown_for(tier).unwrap_or_default(),
                        unlock_at: record.expires_at,
                    };
                    Transition::read_only(decision, Step::ReleaseRefused { tier })
                }
                None => released(record, now),
            },
        }
    }

    /// Administrative release: resets whatever the record's state.
    pub fn force_release(&self, current: Option<&SubjectRecord>, now: u64) -> Transition {
        match current {
            None => Transition::read_only(Decision::Allow { at: now }, Step::Absent),
            Some(record) => released(record, now),
        }
    }

    fn expire(&self, record: &SubjectRecord, now: u64) -> Transition {
        let keep_clicks = record.block_level != Some(MAX_BLOCK_LEVEL)
            && self.policy.intensity() == FloodIntensity::Aggressive;

        let mut next = record.clone();
        next.click_count = if keep_clicks { record.click_count } else { 0 };
        next.block_level = Some(WARN_LEVEL);
        next.status = CycleStatus::Idle;
        next.updated_at = Some(now);
        let step = Step::Expired { previous_level: record.block_level };
        Transition::write(next, Decision::Allow { at: record.expires_at }, step)
    }

    fn block(&self, record: &SubjectRecord, tier: u8, now: u64) -> Transition {
        let wait = self.policy.cooldown_for(tier).unwrap_or_default();
        let at_ceiling = tier == MAX_BLOCK_LEVEL
            && record.block_level.is_some_and(|level| level >= MAX_BLOCK_LEVEL);

        if now < record.expires_at && !at_ceiling {
            let mut next = counted(record, now, Some(tier));
            next.expires_at = record.expires_at.max(after(now, wait));
            let decision = Decision::Blocked { tier, wait, unlock_at: next.expires_at };
            Transition::write(next, decision, Step::Escalated { tier })
        } else {
            let decision = Decision::Blocked { tier, wait, unlock_at: record.expires_at };
            Transition::read_only(decision, Step::Held { tier })
        }
    }
}

fn counted(record: &SubjectRecord, now: u64, block_level: Option<u8>) -> SubjectRecord {
    let mut next = record.clone();
    next.click_count = record.click_count.saturating_add(1);
    next.block_level = block_level;
    next.updated_at = Some(now);
    next
}

fn released(record: &SubjectRecord, now: u64) -> Transition {
    let mut next = record.clone();
    next.click_count = 0;
    next.status = CycleStatus::Idle;
    next.block_level = Some(WARN_LEVEL);
    next.expires_at = now;
    next.updated_at = Some(now);
    Transition::write(next, Decision::Allow { at: now }, Step::Released)
}

fn after(now: u64, duration: Duration) -> u64 {
    now.saturating_add(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
}
