use crate::record::SubjectId;
use std::fmt;
use std::time::Duration;

#[cfg(feature = "telemetry-json")]
use serde_json::json;

/// Events emitted by the click gate.
///
/// One event is emitted per accepted state change or rejected release, plus one per store
/// problem. Denials that race and retry emit a `Store(Conflict)` for every lost attempt before
/// the event describing the final outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateEvent {
    /// Outcome of a click evaluation.
    Admission(AdmissionEvent),
    /// Outcome of a finalize or forced release.
    Release(ReleaseEvent),
    /// Record store trouble.
    Store(StoreEvent),
}

/// Events emitted when a click is evaluated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdmissionEvent {
    /// A cycle was opened: first click for the subject, or first click after a release.
    Opened {
        subject: SubjectId,
        /// `false` when the record was created by this click.
        reopened: bool,
    },
    /// A stale cycle or block was reset.
    Expired {
        subject: SubjectId,
        /// Level before the reset.
        previous_level: Option<u8>,
        /// Clicks left on the record after the reset.
        click_count: u32,
    },
    /// Click counted and denied while a cycle is open.
    Denied { subject: SubjectId, click_count: u32 },
    /// Click counted with a flood warning.
    FloodWarning { subject: SubjectId, click_count: u32 },
    /// Click rejected at a block tier.
    Blocked {
        subject: SubjectId,
        tier: u8,
        /// Cool-down of the tier.
        wait: Duration,
        /// `false` when nothing was written (tier-5 ceiling).
        escalated: bool,
    },
}

/// Events emitted by releases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseEvent {
    /// Cooperative release reset the record.
    Finalized { subject: SubjectId },
    /// Cooperative release refused at a block tier.
    Refused { subject: SubjectId, tier: u8 },
    /// Administrative release reset the record.
    Forced { subject: SubjectId },
}

/// Events emitted around record store calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    /// A conditional write lost a race.
    Conflict {
        subject: SubjectId,
        /// Attempt that lost (1-indexed).
        attempt: usize,
    },
    /// The store returned an error.
    Failure {
        /// Store call: `get`, `create`, `update` or `list`.
        operation: &'static str,
    },
    /// The store did not answer in time.
    Timeout { operation: &'static str, timeout: Duration },
}

impl GateEvent {
    /// Subject the event concerns, if any.
    pub fn subject(&self) -> Option<&SubjectId> {
        match self {
            GateEvent::Admission(
                AdmissionEvent::Opened { subject, .. }
                | AdmissionEvent::Expired { subject, .. }
                | AdmissionEvent::Denied { subject, .. }
                | AdmissionEvent::FloodWarning { subject, .. }
                | AdmissionEvent::Blocked { subject, .. },
            ) => Some(subject),
            GateEvent::Release(
                ReleaseEvent::Finalized { subject }
                | ReleaseEvent::Refused { subject, .. }
                | ReleaseEvent::Forced { subject },
            ) => Some(subject),
            GateEvent::Store(StoreEvent::Conflict { subject, .. }) => Some(subject),
            GateEvent::Store(_) => None,
        }
    }
}

impl fmt::Display for GateEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GateEvent::Admission(event) => write!(f, "Admission::{}", event),
            GateEvent::Release(event) => write!(f, "Release::{}", event),
            GateEvent::Store(event) => write!(f, "Store::{}", event),
        }
    }
}

impl fmt::Display for AdmissionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdmissionEvent::Opened { subject, reopened } => {
                write!(f, "Opened({}, reopened={})", subject, reopened)
            }
            AdmissionEvent::Expired { subject, previous_level, click_count } => {
                write!(f, "Expired({}, from={:?}, clicks={})", subject, previous_level, click_count)
            }
            AdmissionEvent::Denied { subject, click_count } => {
                write!(f, "Denied({}, clicks={})", subject, click_count)
            }
            AdmissionEvent::FloodWarning { subject, click_count } => {
                write!(f, "FloodWarning({}, clicks={})", subject, click_count)
            }
            AdmissionEvent::Blocked { subject, tier, wait, escalated } => {
                write!(f, "Blocked({}, tier={}, wait={:?}, escalated={})", subject, tier, wait, escalated)
            }
        }
    }
}

impl fmt::Display for ReleaseEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReleaseEvent::Finalized { subject } => write!(f, "Finalized({})", subject),
            ReleaseEvent::Refused { subject, tier } => {
                write!(f, "Refused({}, tier={})", subject, tier)
            }
            ReleaseEvent::Forced { subject } => write!(f, "Forced({})", subject),
        }
    }
}

impl fmt::Display for StoreEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreEvent::Conflict { subject, attempt } => {
                write!(f, "Conflict({}, attempt=#{})", subject, attempt)
            }
            StoreEvent::Failure { operation } => write!(f, "Failure(op={})", operation),
            StoreEvent::Timeout { operation, timeout } => {
                write!(f, "Timeout(op={}, timeout={:?})", operation, timeout)
            }
        }
    }
}

#[cfg_attr(not(feature = "telemetry-json"), allow(dead_code))]
#[inline]
fn clamp_u64(val: u128) -> u64 {
    val.min(u128::from(u64::MAX)) as u64
}

#[cfg(feature = "telemetry-json")]
impl GateEvent {
    /// Flat JSON object with a `kind` discriminator, for line-oriented sinks.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            GateEvent::Admission(a) => match a {
                AdmissionEvent::Opened { subject, reopened } => json!({
                    "kind": "cycle_opened",
                    "subject": subject.as_str(),
                    "reopened": *reopened,
                }),
                AdmissionEvent::Expired { subject, previous_level, click_count } => json!({
                    "kind": "cycle_expired",
                    "subject": subject.as_str(),
                    "previous_level": previous_level,
                    "click_count": *click_count,
                }),
                AdmissionEvent::Denied { subject, click_count } => json!({
                    "kind": "click_denied",
                    "subject": subject.as_str(),
                    "click_count": *click_count,
                }),
                AdmissionEvent::FloodWarning { subject, click_count } => json!({
                    "kind": "flood_warning",
                    "subject": subject.as_str(),
                    "click_count": *click_count,
                }),
                AdmissionEvent::Blocked { subject, tier, wait, escalated } => json!({
                    "kind": "flood_block",
                    "subject": subject.as_str(),
                    "tier": *tier,
                    "wait_ms": clamp_u64(wait.as_millis()),
                    "escalated": *escalated,
                }),
            },
            GateEvent::Release(r) => match r {
                ReleaseEvent::Finalized { subject } => {
                    json!({ "kind": "release_finalized", "subject": subject.as_str() })
                }
                ReleaseEvent::Refused { subject, tier } => json!({
                    "kind": "release_refused",
                    "subject": subject.as_str(),
                    "tier": *tier,
                }),
                ReleaseEvent::Forced { subject } => {
                    json!({ "kind": "release_forced", "subject": subject.as_str() })
                }
            },
            GateEvent::Store(s) => match s {
                StoreEvent::Conflict { subject, attempt } => json!({
                    "kind": "store_conflict",
                    "subject": subject.as_str(),
                    "attempt": *attempt,
                }),
                StoreEvent::Failure { operation } => {
                    json!({ "kind": "store_failure", "operation": *operation })
                }
                StoreEvent::Timeout { operation, timeout } => json!({
                    "kind": "store_timeout",
                    "operation": *operation,
                    "timeout_ms": clamp_u64(timeout.as_millis()),
                }),
            },
        }
    }
}
