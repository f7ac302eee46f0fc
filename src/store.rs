//! Record persistence.
//!
//! The gate talks to storage only through [`RecordStore`]. Writes are conditional: `create` only
//! succeeds when no record exists, `update` only when the stored version still equals the version
//! the caller read. A `false` from either means another writer got there first and the caller must
//! re-read and re-decide.

use crate::record::{SubjectId, SubjectRecord};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Abstract storage interface for subject records.
///
/// Implementations must make `create` and `update` atomic with respect to each other for the same
/// subject. They own the `version` field: whatever the caller passes in is overwritten.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Error type for storage operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Fetch the record for a subject.
    async fn get(&self, subject: &SubjectId) -> Result<Option<SubjectRecord>, Self::Error>;

    /// Insert `record` with version 1 if the subject has no record yet.
    ///
    /// Returns `Ok(false)` if a record already exists (race detected, retry needed).
    async fn create(&self, record: SubjectRecord) -> Result<bool, Self::Error>;

    /// Replace the subject's record if its version still equals `expected_version`. The stored
    /// version becomes `expected_version + 1`.
    ///
    /// Returns `Ok(false)` if the record changed or disappeared since it was read.
    async fn update(&self, record: SubjectRecord, expected_version: u64)
        -> Result<bool, Self::Error>;

    /// Every record, in no particular order.
    async fn list(&self) -> Result<Vec<SubjectRecord>, Self::Error>;
}

/// In-process record store. Clones share the same map.
#[derive(Default, Clone, Debug)]
pub struct InMemoryRecordStore {
    records: Arc<Mutex<HashMap<SubjectId, SubjectRecord>>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write a record unconditionally, keeping its version as given. Meant for fixtures.
    pub fn seed(&self, record: SubjectRecord) {
        self.lock().insert(record.subject_id.clone(), record);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // A panic while holding the lock cannot leave a half-written record behind, so the map is
    // still consistent after poisoning.
    fn lock(&self) -> MutexGuard<'_, HashMap<SubjectId, SubjectRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    type Error = std::convert::Infallible;

    async fn get(&self, subject: &SubjectId) -> Result<Option<SubjectRecord>, Self::Error> {
        Ok(self.lock().get(subject).cloned())
    }

    async fn create(&self, mut record: SubjectRecord) -> Result<bool, Self::Error> {
        let mut guard = self.lock();
        if guard.contains_key(&record.subject_id) {
            return Ok(false);
        }
        record.version = 1;
        guard.insert(record.subject_id.clone(), record);
        Ok(true)
    }

    async fn update(
        &self,
        mut record: SubjectRecord,
        expected_version: u64,
    ) -> Result<bool, Self::Error> {
        let mut guard = self.lock();
        match guard.get_mut(&record.subject_id) {
            Some(current) if current.version == expected_version => {
                let Some(version) = expected_version.checked_add(1) else {
                    return Ok(false);
                };
                record.version = version;
                *current = record;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list(&self) -> Result<Vec<SubjectRecord>, Self::Error> {
        Ok(self.lock().values().cloned().collect())
    }
}
