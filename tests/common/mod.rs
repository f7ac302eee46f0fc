#![allow(dead_code)]

use async_trait::async_trait;
use clickgate::telemetry::MemorySink;
use clickgate::{
    ClickGate, EscalationPolicy, InMemoryRecordStore, InstantSleeper, ManualClock, RecordStore,
    SubjectId, SubjectRecord,
};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// 2023-11-14T22:13:20Z
pub const T0: u64 = 1_700_000_000_000;
pub const SEC: u64 = 1_000;

pub struct Harness<S = InMemoryRecordStore> {
    pub gate: ClickGate<S, MemorySink>,
    pub store: S,
    pub clock: ManualClock,
    pub sink: MemorySink,
}

pub fn harness() -> Harness {
    harness_with(InMemoryRecordStore::new(), EscalationPolicy::default())
}

pub fn harness_with<S: Clone>(store: S, policy: EscalationPolicy) -> Harness<S> {
    let clock = ManualClock::starting_at(T0);
    let sink = MemorySink::new();
    let gate = ClickGate::new(store.clone(), policy)
        .with_clock(clock.clone())
        .with_sleeper(InstantSleeper)
        .with_sink(sink.clone());
    Harness { gate, store, clock, sink }
}

pub fn record(id: &str, clicks: u32, level: Option<u8>, expires_at: u64) -> SubjectRecord {
    let mut record = SubjectRecord::first_click(SubjectId::parse(id).unwrap(), T0, expires_at);
    record.click_count = clicks;
    record.block_level = level;
    record.version = 1;
    record
}

/// Store wrapper whose calls can be made to fail or hang.
#[derive(Clone, Default)]
pub struct FaultyStore {
    pub inner: InMemoryRecordStore,
    fail_reads: Arc<AtomicBool>,
    fail_writes: Arc<AtomicBool>,
    hang: Arc<AtomicBool>,
}

impl FaultyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_reads(&self, on: bool) {
        self.fail_reads.store(on, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, on: bool) {
        self.fail_writes.store(on, Ordering::SeqCst);
    }

    pub fn hang(&self, on: bool) {
        self.hang.store(on, Ordering::SeqCst);
    }

    async fn check(&self, flag: &AtomicBool) -> Result<(), io::Error> {
        if self.hang.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        if flag.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::ConnectionReset, "store unreachable"));
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for FaultyStore {
    type Error = io::Error;

    async fn get(&self, subject: &SubjectId) -> Result<Option<SubjectRecord>, Self::Error> {
        self.check(&self.fail_reads).await?;
        Ok(self.inner.get(subject).await.unwrap_or_else(|never| match never {}))
    }

    async fn create(&self, record: SubjectRecord) -> Result<bool, Self::Error> {
        self.check(&self.fail_writes).await?;
        Ok(self.inner.create(record).await.unwrap_or_else(|never| match never {}))
    }

    async fn update(&self, record: SubjectRecord, expected: u64) -> Result<bool, Self::Error> {
        self.check(&self.fail_writes).await?;
        Ok(self.inner.update(record, expected).await.unwrap_or_else(|never| match never {}))
    }

    async fn list(&self) -> Result<Vec<SubjectRecord>, Self::Error> {
        self.check(&self.fail_reads).await?;
        Ok(self.inner.list().await.unwrap_or_else(|never| match never {}))
    }
}

/// Store wrapper where a rival writer sneaks in before each of the next `rivals` updates.
#[derive(Clone, Default)]
pub struct RivalStore {
    pub inner: InMemoryRecordStore,
    rivals: Arc<AtomicUsize>,
}

impl RivalStore {
    pub fn with_rivals(rivals: usize) -> Self {
        Self { inner: InMemoryRecordStore::new(), rivals: Arc::new(AtomicUsize::new(rivals)) }
    }
}

#[async_trait]
impl RecordStore for RivalStore {
    type Error = std::convert::Infallible;

    async fn get(&self, subject: &SubjectId) -> Result<Option<SubjectRecord>, Self::Error> {
        self.inner.get(subject).await
    }

    async fn create(&self, record: SubjectRecord) -> Result<bool, Self::Error> {
        self.inner.create(record).await
    }

    async fn update(&self, record: SubjectRecord, expected: u64) -> Result<bool, Self::Error> {
        let rival_turn = self
            .rivals
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if rival_turn {
            if let Some(current) = self.inner.get(&record.subject_id).await? {
                let version = current.version;
                self.inner.update(current, version).await?;
            }
        }
        self.inner.update(record, expected).await
    }

    async fn list(&self) -> Result<Vec<SubjectRecord>, Self::Error> {
        self.inner.list().await
    }
}

/// Captures `tracing` output for assertions.
#[derive(Clone, Default)]
pub struct SharedWriter(pub Arc<Mutex<Vec<u8>>>);

impl SharedWriter {
    pub fn contents(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for SharedWriter {
    type Writer = SharedGuard;
    fn make_writer(&'a self) -> Self::Writer {
        SharedGuard(self.0.clone())
    }
}

pub struct SharedGuard(Arc<Mutex<Vec<u8>>>);

impl io::Write for SharedGuard {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
