//! Subject identifiers and the per-subject record kept by the store.

use crate::policy::MAX_BLOCK_LEVEL;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Longest accepted subject identifier, in bytes.
pub const MAX_SUBJECT_LEN: usize = 256;

/// Reasons a subject identifier is rejected before the store is touched.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SubjectIdError {
    /// Empty or whitespace-only identifier.
    #[error("subject id is missing")]
    Missing,
    /// Identifier exceeds [`MAX_SUBJECT_LEN`].
    #[error("subject id is {len} bytes, over the length limit")]
    TooLong {
        /// Length of the rejected id.
        len: usize,
    },
    /// Identifier contains control characters or a path separator.
    #[error("subject id contains a forbidden character")]
    ForbiddenCharacter,
}

/// Validated, opaque subject identifier (user id, account id, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SubjectId(String);

impl SubjectId {
    /// Validate and wrap an identifier. Surrounding whitespace is trimmed.
    pub fn parse(raw: impl AsRef<str>) -> Result<Self, SubjectIdError> {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            return Err(SubjectIdError::Missing);
        }
        if trimmed.len() > MAX_SUBJECT_LEN {
            return Err(SubjectIdError::TooLong { len: trimmed.len() });
        }
        if trimmed.chars().any(|c| c.is_control() || c == '/') {
            return Err(SubjectIdError::ForbiddenCharacter);
        }
        Ok(Self(trimmed.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for SubjectId {
    type Error = SubjectIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<SubjectId> for String {
    fn from(value: SubjectId) -> Self {
        value.0
    }
}

impl From<u64> for SubjectId {
    fn from(value: u64) -> Self {
        Self(value.to_string())
    }
}

/// Whether a click cycle is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CycleStatus {
    /// A cycle is open and has not been finalized.
    Active,
    /// The last cycle was finalized or reset.
    Idle,
}

/// One record per subject.
///
/// Timestamps are epoch milliseconds. `version` belongs to the store: it is 1 after creation and
/// bumped by every accepted update, and is what conditional writes compare against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectRecord {
    pub subject_id: SubjectId,
    pub click_count: u32,
    pub status: CycleStatus,
    /// `None`: never flagged. `Some(0)`: flood-warned. `Some(1..=5)`: block tier.
    pub block_level: Option<u8>,
    pub created_at: u64,
    pub expires_at: u64,
    pub updated_at: Option<u64>,
    #[serde(default)]
    pub version: u64,
}

impl SubjectRecord {
    /// Record for a subject's first click.
    pub fn first_click(subject_id: SubjectId, now: u64, expires_at: u64) -> Self {
        Self {
            subject_id,
            click_count: 1,
            status: CycleStatus::Active,
            block_level: None,
            created_at: now,
            expires_at,
            updated_at: None,
            version: 0,
        }
    }

    /// Block tier if the subject is at tier 1 or above.
    pub fn block_tier(&self) -> Option<u8> {
        self.block_level.filter(|l| (1..=MAX_BLOCK_LEVEL).contains(l))
    }

    /// `now` is past the record's expiry.
    pub fn is_expired(&self, now: u64) -> bool {
        now > self.expires_at
    }

    /// At a block tier whose cool-down has not elapsed yet.
    pub fn is_blocked_at(&self, now: u64) -> bool {
        self.block_tier().is_some() && !self.is_expired(now)
    }
}
