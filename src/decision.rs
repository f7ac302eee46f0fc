//! Decisions returned to the transport, and their rendering.

use crate::error::{ErrorKind, GateError};
use crate::format::TimeFormatter;
use crate::policy::wait_label;
use serde::Serialize;
use std::time::Duration;

/// Outcome of a gate operation.
///
/// Every variant carries the instant the caller should show: the cycle expiry for admissions and
/// denials, the unlock instant for blocks, the release instant for releases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Proceed.
    Allow {
        /// Relevant instant (epoch millis).
        at: u64,
    },
    /// Counted, with a warning that further clicks will block.
    FloodWarning {
        /// End of the current cycle.
        expires_at: u64,
    },
    /// Rejected for a cool-down.
    Blocked {
        /// Block tier `1..=5`.
        tier: u8,
        /// Cool-down configured for the tier.
        wait: Duration,
        /// When the block lifts.
        unlock_at: u64,
    },
    /// Counted but not admitted: a click cycle is still open.
    Denied {
        /// When the open cycle ends.
        retry_at: u64,
    },
    /// The gate could not decide.
    Error(ErrorKind),
}

/// Wire-ready view of a decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedDecision {
    /// `allow`, `flood`, `blocked`, `denied` or `error`.
    pub status: &'static str,
    /// Stable machine code, e.g. `click-flood-block-2`.
    pub declaration: String,
    /// Human message: `HH:MM:SS`, or `<wait>/<HH:MM:SS>` for blocks.
    pub message: String,
}

impl Decision {
    /// Helper to check if allowed.
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow { .. })
    }

    pub fn is_blocked(&self) -> bool {
        matches!(self, Decision::Blocked { .. })
    }

    /// Block tier, if blocked.
    pub fn tier(&self) -> Option<u8> {
        match self {
            Decision::Blocked { tier, .. } => Some(*tier),
            _ => None,
        }
    }

    /// Collapse a gate result into a decision, mapping failures to [`Decision::Error`].
    pub fn from_result(result: Result<Decision, GateError>) -> Decision {
        result.unwrap_or_else(|err| Decision::Error(err.kind()))
    }

    pub fn status(&self) -> &'static str {
        match self {
            Decision::Allow { .. } => "allow",
            Decision::FloodWarning { .. } => "flood",
            Decision::Blocked { .. } => "blocked",
            Decision::Denied { .. } => "denied",
            Decision::Error(_) => "error",
        }
    }

    pub fn declaration(&self) -> String {
        match self {
            Decision::Allow { .. } => "click-allow".to_owned(),
            Decision::FloodWarning { .. } => "click-flood-warning".to_owned(),
            Decision::Blocked { tier, .. } => format!("click-flood-block-{tier}"),
            Decision::Denied { .. } => "click-denied".to_owned(),
            Decision::Error(kind) => format!("click-error-{}", kind.as_str()),
        }
    }

    pub fn message(&self, formatter: &TimeFormatter) -> String {
        match self {
            Decision::Allow { at } => formatter.time(*at),
            Decision::FloodWarning { expires_at } => formatter.time(*expires_at),
            Decision::Denied { retry_at } => formatter.time(*retry_at),
            Decision::Blocked { wait, unlock_at, .. } => {
                format!("{}/{}", wait_label(*wait), formatter.time(*unlock_at))
            }
            Decision::Error(kind) if kind.is_retryable() => {
                "temporary failure, try again".to_owned()
            }
            Decision::Error(_) => "request rejected".to_owned(),
        }
    }

    pub fn render(&self, formatter: &TimeFormatter) -> RenderedDecision {
        RenderedDecision {
            status: self.status(),
            declaration: self.declaration(),
            message: self.message(formatter),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::SubjectIdError;

    // 2023-11-15T18:30:05Z
    const AT: u64 = 1_700_073_005_000;

    #[test]
    fn renders_block_with_wait_and_unlock_time() {
        let decision =
            Decision::Blocked { tier: 2, wait: Duration::from_secs(180), unlock_at: AT };
        let rendered = decision.render(&TimeFormatter::utc());
        assert_eq!(rendered.status, "blocked");
        assert_eq!(rendered.declaration, "click-flood-block-2");
        assert_eq!(rendered.message, "3min/18:30:05");
    }

    #[test]
    fn renders_admissions_as_time_only() {
        let fmt = TimeFormatter::with_offset_minutes(-180).unwrap();
        assert_eq!(Decision::Allow { at: AT }.message(&fmt), "15:30:05");
        assert_eq!(Decision::Denied { retry_at: AT }.declaration(), "click-denied");
        assert_eq!(Decision::FloodWarning { expires_at: AT }.status(), "flood");
    }

    #[test]
    fn errors_collapse_into_error_decisions() {
        let decision = Decision::from_result(Err(GateError::from(SubjectIdError::Missing)));
        assert_eq!(decision, Decision::Error(ErrorKind::Validation));
        assert_eq!(decision.declaration(), "click-error-validation");
        assert!(!decision.is_allowed());

        let retry = Decision::Error(ErrorKind::Storage).render(&TimeFormatter::utc());
        assert!(retry.message.contains("try again"));
    }

    #[test]
    fn rendered_decision_serializes_flat() {
        let json = serde_json::to_value(Decision::Allow { at: AT }.render(&TimeFormatter::utc()))
            .unwrap();
        assert_eq!(json["status"], "allow");
        assert_eq!(json["declaration"], "click-allow");
        assert_eq!(json["message"], "18:30:05");
    }
}
