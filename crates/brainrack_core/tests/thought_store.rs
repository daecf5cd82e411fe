mod common;

use brainrack_core::{
    thoughts_key, KvBackend, KvResult, LoadOutcome, MemoryKvBackend, StoreHandle, Thought,
    ThoughtStore,
};
use common::{stored_texts, RecordingBackend};
use serde_json::{json, Value};
use std::sync::mpsc::{channel, Receiver};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

const DEBOUNCE: Duration = Duration::from_millis(500);

fn setup() -> (RecordingBackend, ThoughtStore) {
    let backend = RecordingBackend::new();
    let store = ThoughtStore::new(StoreHandle::spawn(backend.clone()), DEBOUNCE);
    (backend, store)
}

fn note(text: &str) -> Thought {
    Thought::new(text, 10.0, 20.0, 1.5)
}

fn texts(store: &ThoughtStore) -> Vec<String> {
    store
        .thoughts()
        .into_iter()
        .map(|thought| thought.text)
        .collect()
}

fn seed(backend: &RecordingBackend, workspace: Uuid, thoughts: &[Thought]) {
    backend.seed(
        &thoughts_key(workspace),
        serde_json::to_value(thoughts).unwrap(),
    );
}

#[tokio::test(start_paused = true)]
async fn load_of_absent_key_yields_empty_synced_store() {
    let (backend, store) = setup();
    let workspace = Uuid::new_v4();

    let outcome = store.load(workspace).await;

    assert_eq!(outcome, LoadOutcome::Loaded { stored: 0, gap: 0 });
    assert!(store.is_synced());
    assert!(store.thoughts().is_empty());
    assert_eq!(store.workspace_id(), Some(workspace));

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(backend.writes_to(&thoughts_key(workspace)).is_empty());
}

#[tokio::test(start_paused = true)]
async fn rapid_mutations_coalesce_into_one_write() {
    let (backend, store) = setup();
    let workspace = Uuid::new_v4();
    store.load(workspace).await;

    for index in 0..5 {
        store.modify(|thoughts| thoughts.push(note(&format!("t{index}"))));
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert!(backend.writes_to(&thoughts_key(workspace)).is_empty());

    tokio::time::sleep(Duration::from_millis(600)).await;
    store.flush().await;

    let writes = backend.writes_to(&thoughts_key(workspace));
    assert_eq!(writes.len(), 1);
    assert_eq!(stored_texts(&writes[0]), vec!["t0", "t1", "t2", "t3", "t4"]);
}

#[tokio::test(start_paused = true)]
async fn mutate_replaces_collection_and_debounces() {
    let (backend, store) = setup();
    let workspace = Uuid::new_v4();
    store.load(workspace).await;

    store.mutate(vec![note("one"), note("two")]);
    store.mutate(vec![note("three")]);
    assert_eq!(texts(&store), vec!["three"]);

    tokio::time::sleep(Duration::from_millis(501)).await;
    store.flush().await;
    let writes = backend.writes_to(&thoughts_key(workspace));
    assert_eq!(writes.len(), 1);
    assert_eq!(stored_texts(&writes[0]), vec!["three"]);
}

#[tokio::test(start_paused = true)]
async fn gap_thoughts_are_kept_after_stored_ones_and_saved() {
    let (backend, store) = setup();
    let workspace = Uuid::new_v4();
    seed(&backend, workspace, &[note("stored")]);

    let load = store.load(workspace);
    store.modify(|thoughts| thoughts.push(note("typed during load")));
    assert!(!store.has_pending_save());
    assert!(!store.save_now(None));

    assert_eq!(load.await, LoadOutcome::Loaded { stored: 1, gap: 1 });
    assert_eq!(texts(&store), vec!["stored", "typed during load"]);
    assert!(store.has_pending_save());

    tokio::time::sleep(Duration::from_millis(600)).await;
    store.flush().await;
    let writes = backend.writes_to(&thoughts_key(workspace));
    assert_eq!(writes.len(), 1);
    assert_eq!(stored_texts(&writes[0]), vec!["stored", "typed during load"]);
}

#[tokio::test(start_paused = true)]
async fn switching_workspaces_discards_pending_load() {
    let (backend, store) = setup();
    let workspace_a = Uuid::new_v4();
    let workspace_b = Uuid::new_v4();
    seed(&backend, workspace_a, &[note("from a")]);
    seed(&backend, workspace_b, &[note("from b")]);

    let load_a = store.load(workspace_a);
    store.modify(|thoughts| thoughts.push(note("meant for a")));
    let load_b = store.load(workspace_b);

    assert_eq!(load_b.await, LoadOutcome::Loaded { stored: 1, gap: 0 });
    assert_eq!(load_a.await, LoadOutcome::Stale);
    assert_eq!(texts(&store), vec!["from b"]);
    assert_eq!(store.workspace_id(), Some(workspace_b));

    tokio::time::sleep(Duration::from_secs(2)).await;
    store.flush().await;
    assert!(backend.writes_to(&thoughts_key(workspace_a)).is_empty());
    assert!(backend.writes_to(&thoughts_key(workspace_b)).is_empty());
}

#[tokio::test(start_paused = true)]
async fn returning_to_a_workspace_only_applies_the_newest_load() {
    let (backend, store) = setup();
    let workspace_a = Uuid::new_v4();
    let workspace_b = Uuid::new_v4();
    seed(&backend, workspace_a, &[note("a1"), note("a2")]);

    let first_a = store.load(workspace_a);
    let load_b = store.load(workspace_b);
    let second_a = store.load(workspace_a);

    assert_eq!(second_a.await, LoadOutcome::Loaded { stored: 2, gap: 0 });
    assert_eq!(first_a.await, LoadOutcome::Stale);
    assert_eq!(load_b.await, LoadOutcome::Stale);
    assert_eq!(texts(&store), vec!["a1", "a2"]);
}

#[tokio::test(start_paused = true)]
async fn switching_cancels_the_pending_debounce() {
    let (backend, store) = setup();
    let workspace_a = Uuid::new_v4();
    let workspace_b = Uuid::new_v4();
    store.load(workspace_a).await;

    store.modify(|thoughts| thoughts.push(note("unsaved")));
    assert!(store.has_pending_save());
    store.load(workspace_b).await;

    tokio::time::sleep(Duration::from_secs(2)).await;
    store.flush().await;
    assert!(backend.writes_to(&thoughts_key(workspace_a)).is_empty());
    assert!(backend.writes_to(&thoughts_key(workspace_b)).is_empty());
}

#[tokio::test(start_paused = true)]
async fn save_now_cancels_timer_and_writes_once() {
    let (backend, store) = setup();
    let workspace = Uuid::new_v4();
    store.load(workspace).await;

    store.modify(|thoughts| thoughts.push(note("checkpoint")));
    assert!(store.has_pending_save());
    assert!(store.save_now(None));
    assert!(!store.has_pending_save());
    assert!(store.is_saving());

    store.flush().await;
    assert!(!store.is_saving());

    tokio::time::sleep(Duration::from_secs(2)).await;
    let writes = backend.writes_to(&thoughts_key(workspace));
    assert_eq!(writes.len(), 1);
    assert_eq!(stored_texts(&writes[0]), vec!["checkpoint"]);
}

#[tokio::test(start_paused = true)]
async fn save_now_with_explicit_state_leaves_memory_alone() {
    let (backend, store) = setup();
    let workspace = Uuid::new_v4();
    store.load(workspace).await;
    store.modify(|thoughts| thoughts.push(note("in memory")));

    assert!(store.save_now(Some(vec![note("explicit")])));
    store.flush().await;

    let writes = backend.writes_to(&thoughts_key(workspace));
    assert_eq!(stored_texts(writes.last().unwrap()), vec!["explicit"]);
    assert_eq!(texts(&store), vec!["in memory"]);
}

#[tokio::test(start_paused = true)]
async fn flush_turns_pending_debounce_into_write() {
    let (backend, store) = setup();
    let workspace = Uuid::new_v4();
    store.load(workspace).await;

    store.modify(|thoughts| thoughts.push(note("flushed")));
    store.flush().await;

    assert!(!store.has_pending_save());
    assert_eq!(backend.writes_to(&thoughts_key(workspace)).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn close_drops_pending_timer_and_memory() {
    let (backend, store) = setup();
    let workspace = Uuid::new_v4();
    store.load(workspace).await;
    store.modify(|thoughts| thoughts.push(note("abandoned")));

    store.close();

    assert_eq!(store.workspace_id(), None);
    assert!(store.thoughts().is_empty());
    assert!(!store.save_now(None));
    tokio::time::sleep(Duration::from_secs(2)).await;
    store.flush().await;
    assert!(backend.writes_to(&thoughts_key(workspace)).is_empty());
}

#[tokio::test(start_paused = true)]
async fn read_failure_still_syncs_and_keeps_working_in_memory() {
    let (backend, store) = setup();
    let workspace = Uuid::new_v4();
    backend.fail_reads(true);

    assert_eq!(store.load(workspace).await, LoadOutcome::Failed);
    assert!(store.is_synced());

    store.modify(|thoughts| thoughts.push(note("still here")));
    assert!(store.has_pending_save());
    assert_eq!(texts(&store), vec!["still here"]);
}

#[tokio::test(start_paused = true)]
async fn write_failure_never_rolls_back_memory() {
    let (backend, store) = setup();
    let workspace = Uuid::new_v4();
    store.load(workspace).await;
    backend.fail_writes(true);

    store.modify(|thoughts| thoughts.push(note("kept")));
    assert!(store.save_now(None));
    store.flush().await;

    assert_eq!(texts(&store), vec!["kept"]);
    assert!(!store.is_saving());
    assert_eq!(backend.writes_to(&thoughts_key(workspace)).len(), 1);
    assert!(backend.memory.peek(&thoughts_key(workspace)).is_none());
}

#[tokio::test(start_paused = true)]
async fn corrupt_records_are_skipped_on_load() {
    let (backend, store) = setup();
    let workspace = Uuid::new_v4();
    backend.seed(
        &thoughts_key(workspace),
        json!([
            {"id": Uuid::new_v4(), "text": "valid", "x": 1.0, "y": 2.0, "rotation": 0.0},
            {"id": Uuid::new_v4(), "text": "", "x": 1.0, "y": 2.0, "rotation": 0.0},
            {"text": "missing id"}
        ]),
    );

    assert_eq!(
        store.load(workspace).await,
        LoadOutcome::Loaded { stored: 1, gap: 0 }
    );
    assert_eq!(texts(&store), vec!["valid"]);
}

#[tokio::test(start_paused = true)]
async fn subscribers_observe_every_published_state() {
    let (_backend, store) = setup();
    let workspace = Uuid::new_v4();
    let mut thoughts = store.subscribe();
    store.load(workspace).await;

    store.modify(|items| items.push(note("seen")));
    thoughts.changed().await.unwrap();
    let current: Vec<String> = thoughts
        .borrow_and_update()
        .iter()
        .map(|thought| thought.text.clone())
        .collect();
    assert_eq!(current, vec!["seen"]);
}

/// Backend whose writes block until the test hands out a permit.
#[derive(Clone)]
struct GatedBackend {
    memory: MemoryKvBackend,
    permits: Arc<Mutex<Receiver<()>>>,
}

impl KvBackend for GatedBackend {
    fn get(&self, key: &str) -> KvResult<Option<Value>> {
        self.memory.get(key)
    }

    fn set(&self, key: &str, value: &Value) -> KvResult<()> {
        let _ = self.permits.lock().unwrap().recv();
        self.memory.set(key, value)
    }

    fn remove(&self, key: &str) -> KvResult<()> {
        self.memory.remove(key)
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn older_save_completion_does_not_clear_saving_flag() {
    let (permit_tx, permit_rx) = channel();
    let backend = GatedBackend {
        memory: MemoryKvBackend::new(),
        permits: Arc::new(Mutex::new(permit_rx)),
    };
    let store = ThoughtStore::new(StoreHandle::spawn(backend.clone()), DEBOUNCE);
    let workspace = Uuid::new_v4();
    store.load(workspace).await;

    store.modify(|thoughts| thoughts.push(note("first")));
    assert!(store.save_now(None));
    store.modify(|thoughts| thoughts.push(note("second")));
    assert!(store.save_now(None));
    let mut saving = store.subscribe_saving();

    permit_tx.send(()).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(store.is_saving());

    permit_tx.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(5), saving.wait_for(|busy| !*busy))
        .await
        .unwrap()
        .unwrap();
    let stored = backend.memory.peek(&thoughts_key(workspace)).unwrap();
    assert_eq!(stored_texts(&stored), vec!["first", "second"]);
}
