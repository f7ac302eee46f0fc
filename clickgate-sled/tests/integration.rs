use clickgate::{
    ClickGate, CycleStatus, EscalationPolicy, RecordStore, SubjectId, SubjectRecord,
};
use clickgate_sled::{SledRecordStore, SledStoreError};

fn record(id: &str) -> SubjectRecord {
    SubjectRecord::first_click(SubjectId::parse(id).unwrap(), 1_000, 11_000)
}

#[tokio::test]
async fn create_is_conditional_on_absence() {
    let dir = tempfile::tempdir().unwrap();
    let store = SledRecordStore::open(dir.path()).unwrap();

    assert!(store.create(record("u1")).await.unwrap());
    assert!(!store.create(record("u1")).await.unwrap());
    let stored = store.get(&SubjectId::parse("u1").unwrap()).await.unwrap().unwrap();
    assert_eq!(stored.version, 1);
}

#[tokio::test]
async fn update_is_conditional_on_version() {
    let dir = tempfile::tempdir().unwrap();
    let store = SledRecordStore::open(dir.path()).unwrap();
    store.create(record("u1")).await.unwrap();

    let mut next = record("u1");
    next.click_count = 2;
    assert!(!store.update(next.clone(), 7).await.unwrap());
    assert!(store.update(next.clone(), 1).await.unwrap());
    assert!(!store.update(next, 1).await.unwrap());
    assert!(!store.update(record("ghost"), 1).await.unwrap());

    let stored = store.get(&SubjectId::parse("u1").unwrap()).await.unwrap().unwrap();
    assert_eq!((stored.click_count, stored.version), (2, 2));
}

#[tokio::test]
async fn records_survive_reopening() {
    let dir = tempfile::tempdir().unwrap();
    {
        let store = SledRecordStore::open(dir.path()).unwrap();
        let gate = ClickGate::new(store.clone(), EscalationPolicy::default());
        gate.evaluate_click("u1").await.unwrap();
        gate.finalize_click("u1").await.unwrap();
        store.flush().await.unwrap();
    }

    let store = SledRecordStore::open(dir.path()).unwrap();
    let records = store.list().await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, CycleStatus::Idle);
    assert_eq!(records[0].version, 2);
}

#[tokio::test]
async fn corrupt_records_are_reported_on_get_and_skipped_on_list() {
    let dir = tempfile::tempdir().unwrap();
    let db = sled::open(dir.path()).unwrap();
    let store = SledRecordStore::from_db(&db).unwrap();
    store.create(record("good")).await.unwrap();
    db.open_tree("subjects").unwrap().insert("bad", "not json").unwrap();

    let err = store.get(&SubjectId::parse("bad").unwrap()).await.unwrap_err();
    assert!(matches!(err, SledStoreError::Decode { ref key, .. } if key == "bad"));
    assert_eq!(store.list().await.unwrap().len(), 1);
}

#[tokio::test]
async fn exhausted_version_refuses_update() {
    let dir = tempfile::tempdir().unwrap();
    let db = sled::open(dir.path()).unwrap();
    let store = SledRecordStore::from_db(&db).unwrap();
    let mut worn = record("u1");
    worn.version = u64::MAX;
    db.open_tree("subjects").unwrap().insert("u1", serde_json::to_vec(&worn).unwrap()).unwrap();

    assert!(!store.update(record("u1"), u64::MAX).await.unwrap());
    let stored = store.get(&SubjectId::parse("u1").unwrap()).await.unwrap().unwrap();
    assert_eq!(stored.version, u64::MAX);
}
