//! Persistent record store for `clickgate` on top of `sled`.
//!
//! Records live in one tree keyed by subject id, JSON-encoded. Creates and versioned updates are
//! `compare_and_swap`s on the encoded bytes: since every accepted write bumps the version, the
//! bytes only match if nobody wrote in between.

use async_trait::async_trait;
use clickgate::{RecordStore, SubjectId, SubjectRecord};
use std::path::Path;

const TREE: &str = "subjects";

#[derive(thiserror::Error, Debug)]
pub enum SledStoreError {
    #[error("sled access failed: {0}")]
    Sled(#[from] sled::Error),
    #[error("stored record for '{key}' is not valid: {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("could not encode record: {0}")]
    Encode(#[source] serde_json::Error),
}

#[derive(Clone, Debug)]
pub struct SledRecordStore {
    tree: sled::Tree,
}

impl SledRecordStore {
    /// Open (or create) a database directory.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SledStoreError> {
        let db = sled::open(path)?;
        Self::from_db(&db)
    }

    /// Use the record tree of an already open database.
    pub fn from_db(db: &sled::Db) -> Result<Self, SledStoreError> {
        Ok(Self { tree: db.open_tree(TREE)? })
    }

    /// Block until all writes are durable.
    pub async fn flush(&self) -> Result<usize, SledStoreError> {
        Ok(self.tree.flush_async().await?)
    }

    fn decode(key: &[u8], bytes: &[u8]) -> Result<SubjectRecord, SledStoreError> {
        serde_json::from_slice(bytes).map_err(|source| SledStoreError::Decode {
            key: String::from_utf8_lossy(key).into_owned(),
            source,
        })
    }

    fn encode(record: &SubjectRecord) -> Result<Vec<u8>, SledStoreError> {
        serde_json::to_vec(record).map_err(SledStoreError::Encode)
    }
}

#[async_trait]
impl RecordStore for SledRecordStore {
    type Error = SledStoreError;

    async fn get(&self, subject: &SubjectId) -> Result<Option<SubjectRecord>, Self::Error> {
        let key = subject.as_str().as_bytes();
        match self.tree.get(key)? {
            Some(bytes) => Ok(Some(Self::decode(key, &bytes)?)),
            None => Ok(None),
        }
    }

    async fn create(&self, mut record: SubjectRecord) -> Result<bool, Self::Error> {
        record.version = 1;
        let bytes = Self::encode(&record)?;
        let swapped =
            self.tree.compare_and_swap(record.subject_id.as_str(), None as Option<&[u8]>, Some(bytes))?;
        Ok(swapped.is_ok())
    }

    async fn update(
        &self,
        mut record: SubjectRecord,
        expected_version: u64,
    ) -> Result<bool, Self::Error> {
        let key = record.subject_id.as_str().as_bytes().to_vec();
        let Some(current) = self.tree.get(&key)? else {
            return Ok(false);
        };
        if Self::decode(&key, &current)?.version != expected_version {
            return Ok(false);
        }
        let Some(version) = expected_version.checked_add(1) else {
            return Ok(false);
        };

        record.version = version;
        let bytes = Self::encode(&record)?;
        let swapped = self.tree.compare_and_swap(&key, Some(&current), Some(bytes))?;
        Ok(swapped.is_ok())
    }

    async fn list(&self) -> Result<Vec<SubjectRecord>, Self::Error> {
        let mut records = Vec::new();
        for entry in self.tree.iter() {
            let (key, bytes) = entry?;
            match Self::decode(&key, &bytes) {
                Ok(record) => records.push(record),
                Err(err) => tracing::error!(error = %err, "skipping undecodable record"),
            }
        }
        Ok(records)
    }
}
