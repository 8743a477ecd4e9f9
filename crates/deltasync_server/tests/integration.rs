//! Integration tests for full exchange rounds over the loopback
//! transport.

use deltasync_engine::{
    HttpTransport, LoopbackClient, SyncConfig, SyncError, SyncPhase, Synchronizer, TrackedStore,
};
use deltasync_protocol::{Delta, ExchangeRequest, Operation, Row, Value};
use deltasync_server::{ExchangeServer, ServerConfig};
use deltasync_store::{FieldDef, FieldType, MemoryStore, RowStore, Schema, TableDef};
use std::sync::Arc;

type Server = Arc<ExchangeServer<MemoryStore>>;
type Client = Synchronizer<MemoryStore, HttpTransport<LoopbackClient<Server>>>;

fn task_schema() -> Schema {
    Schema::new().with_table(
        "Task",
        TableDef::new(vec![
            FieldDef::new("id", FieldType::String),
            FieldDef::new("name", FieldType::String),
        ]),
    )
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn make_server() -> Server {
    init_tracing();
    let server = Arc::new(ExchangeServer::new(ServerConfig::default()));
    server.register_dataset("todo", MemoryStore::new(task_schema()));
    server
}

fn make_client(server: &Server, identity: &str) -> (Client, Arc<TrackedStore<MemoryStore>>) {
    let store = Arc::new(TrackedStore::new(MemoryStore::new(task_schema())));
    let transport =
        HttpTransport::new("http://server", LoopbackClient::new(Arc::clone(server)));
    let config = SyncConfig::new("todo", "http://server").with_identity(identity);
    let sync = Synchronizer::new(config, Arc::clone(&store), transport);
    sync.init().unwrap();
    (sync, store)
}

fn task_names(store: &impl RowStore) -> Vec<String> {
    let mut names: Vec<String> = store
        .find_all("Task")
        .unwrap()
        .iter()
        .filter_map(|row| row.get("name").and_then(Value::as_text).map(str::to_string))
        .collect();
    names.sort();
    names
}

#[test]
fn two_clients_converge_to_the_union() {
    let server = make_server();
    let (a, a_store) = make_client(&server, "client-a");
    let (b, b_store) = make_client(&server, "client-b");

    a_store
        .add("Task", Row::new().with("name", "alpha"))
        .unwrap();
    b_store
        .add("Task", Row::new().with("name", "beta"))
        .unwrap();

    a.sync().unwrap();
    // B's first round pushes beta and bootstraps the full data set,
    // which already includes alpha.
    b.sync().unwrap();
    // A pulls beta incrementally.
    a.sync().unwrap();

    let server_store = server.dataset("todo").unwrap().store().clone();
    assert_eq!(task_names(server_store.as_ref()), vec!["alpha", "beta"]);
    assert_eq!(task_names(a_store.as_ref()), vec!["alpha", "beta"]);
    assert_eq!(task_names(b_store.as_ref()), vec!["alpha", "beta"]);
}

#[test]
fn later_write_wins_on_both_side_edits() {
    let server = make_server();
    let (a, a_store) = make_client(&server, "client-a");
    let (b, b_store) = make_client(&server, "client-b");

    let id = a_store
        .add("Task", Row::new().with("name", "shared"))
        .unwrap();
    a.sync().unwrap();
    b.sync().unwrap();
    assert!(b_store.exists("Task", &id).unwrap());

    a_store
        .update(
            "Task",
            Row::new().with("id", id.clone()).with("name", "from-a"),
        )
        .unwrap();
    b_store
        .update(
            "Task",
            Row::new().with("id", id.clone()).with("name", "from-b"),
        )
        .unwrap();

    a.sync().unwrap();
    b.sync().unwrap();
    a.sync().unwrap();

    let read_name = |store: &dyn RowStore| {
        store
            .find_by_id("Task", &id)
            .unwrap()
            .unwrap()
            .get("name")
            .and_then(Value::as_text)
            .map(str::to_string)
            .unwrap()
    };

    let server_store = server.dataset("todo").unwrap().store().clone();
    assert_eq!(read_name(server_store.as_ref()), "from-b");
    assert_eq!(read_name(a_store.as_ref()), "from-b");
    assert_eq!(read_name(b_store.as_ref()), "from-b");
}

#[test]
fn deletion_propagates_as_tombstone() {
    let server = make_server();
    let (a, a_store) = make_client(&server, "client-a");
    let (b, b_store) = make_client(&server, "client-b");

    let id = a_store
        .add("Task", Row::new().with("name", "doomed"))
        .unwrap();
    a.sync().unwrap();
    b.sync().unwrap();
    assert!(b_store.exists("Task", &id).unwrap());

    a_store.remove("Task", &Row::tombstone("id", id.clone())).unwrap();
    a.sync().unwrap();
    b.sync().unwrap();

    let server_store = server.dataset("todo").unwrap().store().clone();
    assert!(!server_store.exists("Task", &id).unwrap());
    assert!(!b_store.exists("Task", &id).unwrap());
}

#[test]
fn replayed_delta_is_idempotent() {
    let server = make_server();

    let mut delta = Delta::new();
    delta.push("Task", Row::new().with("id", "t1").with("name", "once"));
    delta.push("Task", Row::tombstone("id", "t2"));
    let request = ExchangeRequest::new("client-a", "todo").with_delta(delta);

    // At-least-once delivery: the same request lands twice.
    assert!(server.exchange(&request).is_success());
    assert!(server.exchange(&request).is_success());

    let store = server.dataset("todo").unwrap().store().clone();
    assert_eq!(store.count("Task").unwrap(), 1);
    let row = store.find_by_id("Task", "t1").unwrap().unwrap();
    assert_eq!(row.get("name").and_then(Value::as_text), Some("once"));
}

#[test]
fn cold_bootstrap_pulls_full_snapshot() {
    let server = make_server();

    // Rows seeded straight into the backing store, bypassing capture:
    // only a full snapshot can deliver these.
    let dataset = server.dataset("todo").unwrap();
    dataset
        .store()
        .inner()
        .add("Task", Row::new().with("id", "s1").with("name", "seeded-1"))
        .unwrap();
    dataset
        .store()
        .inner()
        .add("Task", Row::new().with("id", "s2").with("name", "seeded-2"))
        .unwrap();

    let (fresh, fresh_store) = make_client(&server, "client-fresh");
    let report = fresh.sync().unwrap();

    assert_eq!(report.received, 2);
    assert_eq!(
        task_names(fresh_store.as_ref()),
        vec!["seeded-1", "seeded-2"]
    );
    // Applied rows were not re-logged on the client.
    assert!(fresh_store.capture().entries().unwrap().is_empty());
}

#[test]
fn failed_round_is_retryable_end_to_end() {
    // A server without the dataset: the first round fails with the
    // peer's error payload.
    let server: Server = Arc::new(ExchangeServer::new(ServerConfig::default()));
    let (a, a_store) = make_client(&server, "client-a");

    a_store
        .add("Task", Row::new().with("name", "kept"))
        .unwrap();

    let err = a.sync().unwrap_err();
    assert!(matches!(err, SyncError::Peer(_)));
    assert_eq!(a.phase(), SyncPhase::Failed);
    // The change log survived the failure.
    assert_eq!(a_store.capture().entries().unwrap().len(), 1);

    // Once the dataset exists, the very same delta ships.
    server.register_dataset("todo", MemoryStore::new(task_schema()));
    a.sync().unwrap();

    let server_store = server.dataset("todo").unwrap().store().clone();
    assert_eq!(task_names(server_store.as_ref()), vec!["kept"]);
    assert!(a_store.capture().entries().unwrap().is_empty());
}

#[test]
fn lifecycle_add_update_remove_ships_a_lone_tombstone() {
    let server = make_server();
    let (a, a_store) = make_client(&server, "client-a");

    let id = a_store
        .add("Task", Row::new().with("name", "Test1"))
        .unwrap();
    a_store
        .update(
            "Task",
            Row::new().with("id", id.clone()).with("name", "Updated"),
        )
        .unwrap();
    let row = a_store.find_by_id("Task", &id).unwrap().unwrap();
    assert_eq!(row.get("name").and_then(Value::as_text), Some("Updated"));

    // First round ships the coalesced insert.
    a.sync().unwrap();

    a_store.remove("Task", &Row::tombstone("id", id.clone())).unwrap();
    assert!(a_store.find_by_id("Task", &id).unwrap().is_none());

    // The next window holds exactly one delete entry for the object.
    let entries = a_store.capture().entries().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].operation, Operation::Delete);
    assert_eq!(entries[0].object_id, id);

    a.sync().unwrap();
    let server_store = server.dataset("todo").unwrap().store().clone();
    assert!(!server_store.exists("Task", &id).unwrap());
}

#[test]
fn post_checkpoint_window_extracts_exactly_three_changes() {
    let server = make_server();
    let (a, a_store) = make_client(&server, "client-a");

    let kept = a_store
        .add("Task", Row::new().with("name", "kept"))
        .unwrap();
    let doomed = a_store
        .add("Task", Row::new().with("name", "doomed"))
        .unwrap();
    a.sync().unwrap();
    assert!(a.checkpoint().is_some());

    a_store
        .add("Task", Row::new().with("name", "brand-new"))
        .unwrap();
    a_store
        .update(
            "Task",
            Row::new().with("id", kept.clone()).with("name", "kept-2"),
        )
        .unwrap();
    a_store
        .remove("Task", &Row::tombstone("id", doomed.clone()))
        .unwrap();

    let entries = a_store.capture().entries().unwrap();
    assert_eq!(entries.len(), 3);
    let op_for = |id: &str| {
        entries
            .iter()
            .find(|e| e.object_id == id)
            .map(|e| e.operation)
    };
    assert_eq!(op_for(&kept), Some(Operation::Update));
    assert_eq!(op_for(&doomed), Some(Operation::Delete));

    let report = a.sync().unwrap();
    assert_eq!(report.sent, 3);
}
