//! Integration Tests for Repositories
//!
//! These tests drive the store the way application code does: through
//! repositories, nodes, and observers sharing one store.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use lattice_store::reactive::Observer;
use lattice_store::store::{
    EdgeKind, EdgeSnapshot, Id, InitialValues, Model, ModelBuilder, Node, RepositorySnapshot,
    SchemaDescriptor, Value, ValueKind,
};
use lattice_store::{CascadePolicy, Repository, Result, Store, StoreConfig, StoreError};

/// Typed wrapper used by the scenario tests.
struct Item(Node);

impl Item {
    fn title(&self) -> Result<String> {
        self.0.get("title")
    }

    fn description(&self) -> Result<Option<String>> {
        self.0.get_optional("description")
    }

    fn completed(&self) -> Result<bool> {
        self.0.get("completed")
    }

    fn set_completed(&self, completed: bool) -> Result<bool> {
        self.0.set("completed", completed)
    }
}

impl Model for Item {
    fn describe() -> ModelBuilder {
        ModelBuilder::new("Item")
            .required("title", ValueKind::Text)
            .optional("description", ValueKind::Text)
            .required_with_default("completed", false)
            .acyclic("parent")
    }

    fn from_node(node: Node) -> Self {
        Item(node)
    }

    fn node(&self) -> &Node {
        &self.0
    }
}

fn items(store: &Store) -> Repository {
    store
        .repository(Item::describe().build().unwrap())
        .unwrap()
}

fn titled(title: &str) -> InitialValues {
    InitialValues::new().with("title", title)
}

/// Counts observer runs.
fn counter() -> (Arc<AtomicUsize>, Arc<AtomicUsize>) {
    let runs = Arc::new(AtomicUsize::new(0));
    (runs.clone(), runs)
}

#[test]
fn unknown_identifier_is_absent() {
    let store = Store::new();
    let repo = items(&store);

    assert!(repo.get(Id::random()).is_none());
    assert!(store.node(Id::from_u128(0)).is_none());
}

#[test]
fn created_node_round_trips_through_get() {
    let store = Store::new();
    let repo = items(&store);

    let node = repo
        .create(titled("write docs").with("description", "all of them"))
        .unwrap();
    let fetched = repo.get(repo.identifier_of(&node)).unwrap();

    assert!(fetched.ptr_eq(&node));
    assert_eq!(fetched.get::<String>("title").unwrap(), "write docs");
    assert_eq!(
        fetched.get_optional::<String>("description").unwrap().as_deref(),
        Some("all of them")
    );
    assert!(!fetched.get::<bool>("completed").unwrap());
    assert_eq!(store.model_of(node.id()).as_deref(), Some("Item"));
}

#[test]
fn item_scenario() {
    let store = Store::new();
    let items = store.typed::<Item>().unwrap();

    let item = items
        .create(InitialValues::new().with("title", "x").absent("description"))
        .unwrap();
    let id = items.identifier_of(&item);

    let fetched = items.get(id).unwrap();
    assert_eq!(fetched.title().unwrap(), "x");
    assert_eq!(fetched.description().unwrap(), None);
    assert!(!fetched.completed().unwrap());

    assert!(item.set_completed(true).unwrap());
    assert!(fetched.completed().unwrap());

    assert!(items.delete(&item).unwrap());
    assert!(items.get(id).is_none());
}

#[test]
fn missing_required_field_fails_creation() {
    let store = Store::new();
    let repo = items(&store);

    let err = repo.create(InitialValues::new()).unwrap_err();
    assert!(matches!(err, StoreError::InvalidInitialValue { ref field, .. } if field == "title"));
    assert!(repo.is_empty());
    assert_eq!(store.node_count(), 0);
}

#[test]
fn last_write_wins_and_equal_write_is_silent() {
    let store = Store::new();
    let repo = items(&store);
    let node = repo.create(titled("a")).unwrap();

    let (runs, runs_clone) = counter();
    let reader = node.clone();
    let _observer = Observer::new(store.tracker(), move |cx| {
        let _ = reader.read("title", Some(cx));
        runs_clone.fetch_add(1, Ordering::SeqCst);
    });

    for title in ["b", "c", "d"] {
        assert!(node.set("title", title).unwrap());
    }
    assert_eq!(node.get::<String>("title").unwrap(), "d");
    assert_eq!(runs.load(Ordering::SeqCst), 4);

    assert!(!node.set("title", "d").unwrap());
    assert_eq!(runs.load(Ordering::SeqCst), 4);
    assert_eq!(node.version("title").unwrap(), 3);
}

#[test]
fn batch_writing_two_fields_notifies_once() {
    let store = Store::new();
    let repo = items(&store);
    let node = repo.create(titled("a")).unwrap();

    let (runs, runs_clone) = counter();
    let reader = node.clone();
    let _observer = Observer::new(store.tracker(), move |cx| {
        let _ = reader.read("title", Some(cx));
        let _ = reader.read("completed", Some(cx));
        runs_clone.fetch_add(1, Ordering::SeqCst);
    });

    store.batch(|| {
        node.set("title", "b").unwrap();
        node.set("completed", true).unwrap();
    });
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

#[test]
fn field_writes_are_type_checked() {
    let store = Store::new();
    let repo = items(&store);
    let node = repo.create(titled("a")).unwrap();

    assert!(matches!(
        node.set("completed", "yes"),
        Err(StoreError::TypeMismatch { expected: ValueKind::Bool, found: ValueKind::Text, .. })
    ));
    assert!(matches!(node.clear("title"), Err(StoreError::RequiredField { .. })));
    assert!(matches!(node.set("owner", 1), Err(StoreError::UnknownField { .. })));
    assert!(matches!(node.get::<String>("description"), Err(StoreError::AbsentValue { .. })));
    assert!(matches!(node.get::<i64>("title"), Err(StoreError::TypeMismatch { .. })));

    assert!(node.set("description", "now present").unwrap());
    assert!(node.clear("description").unwrap());
    assert_eq!(node.value("description").unwrap(), None);
}

#[test]
fn schema_redeclaration() {
    let store = Store::new();
    let repo = items(&store);

    let first = repo.init_schema().unwrap();
    let second = repo.init_schema().unwrap();
    assert_eq!(first, second);
    assert_eq!(repo.schema(), Some(first.clone()));

    let conflicting = SchemaDescriptor::new().sticky_edge("parent");
    let err = repo.init_schema_with(conflicting).unwrap_err();
    assert!(matches!(err, StoreError::InvalidSchema { .. }));
    assert_eq!(repo.schema(), Some(first));
}

#[test]
fn schema_state_belongs_to_the_instance() {
    let first = Store::new();
    let second = Store::new();
    let a = items(&first);
    let b = items(&second);

    a.init_schema_with(SchemaDescriptor::new()).unwrap();
    assert!(a.is_initialized());
    assert!(!b.is_initialized());
    b.init_schema().unwrap();
}

#[test]
fn colliding_identifier_fails_creation() {
    let fixed = Id::from_u128(42);
    let store = Store::with_id_source(StoreConfig::default(), move || fixed);
    let repo = items(&store);

    let first = repo.create(titled("first")).unwrap();
    assert_eq!(first.id(), fixed);

    let err = repo.create(titled("second")).unwrap_err();
    assert!(matches!(err, StoreError::IdCollision(id) if id == fixed));
    assert_eq!(repo.len(), 1);
    assert_eq!(repo.get(fixed).unwrap().get::<String>("title").unwrap(), "first");
}

#[test]
fn collision_retries_draw_fresh_identifiers() {
    let next = Arc::new(AtomicU64::new(0));
    let source = {
        let next = next.clone();
        // 1, 1, 2, 2, 3, 3, ...
        move || Id::from_u128(u128::from(next.fetch_add(1, Ordering::SeqCst) / 2 + 1))
    };
    let store = Store::with_id_source(StoreConfig::default().with_id_retries(1), source);
    let repo = items(&store);

    let a = repo.create(titled("a")).unwrap();
    let b = repo.create(titled("b")).unwrap();
    assert_eq!(a.id(), Id::from_u128(1));
    assert_eq!(b.id(), Id::from_u128(2));
    assert_eq!(next.load(Ordering::SeqCst), 3);
}

#[test]
fn one_repository_per_model() {
    let store = Store::new();
    let repo = items(&store);

    let err = store.repository(Item::describe().build().unwrap()).unwrap_err();
    assert!(matches!(err, StoreError::DuplicateRepository(ref name) if name == "Item"));

    drop(repo);
    items(&store);
}

#[test]
fn foreign_nodes_are_rejected() {
    let store = Store::new();
    let repo = items(&store);
    let tags = store
        .repository(ModelBuilder::new("Tag").required("label", ValueKind::Text).build().unwrap())
        .unwrap();
    let tag = tags.create(InitialValues::new().with("label", "urgent")).unwrap();

    assert!(matches!(repo.delete(&tag), Err(StoreError::ForeignNode { .. })));
    assert!(tags.get(tag.id()).is_some());
}

#[test]
fn deleted_node_is_cut_loose() {
    let store = Store::new();
    let repo = items(&store);
    let node = repo.create(titled("a")).unwrap();

    let (runs, runs_clone) = counter();
    let reader = node.clone();
    let _observer = Observer::new(store.tracker(), move |cx| {
        let _ = reader.read("title", Some(cx));
        runs_clone.fetch_add(1, Ordering::SeqCst);
    });

    repo.delete(&node).unwrap();
    assert!(!node.is_live());
    assert!(matches!(node.set("title", "b"), Err(StoreError::UnknownNode(_))));
    // Last committed values stay readable on the handle
    assert_eq!(node.get::<String>("title").unwrap(), "a");
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[test]
fn acyclic_kind_rejects_cycles_and_leaves_edges() {
    let store = Store::new();
    let repo = items(&store);
    let a = repo.create(titled("a")).unwrap();
    let b = repo.create(titled("b")).unwrap();
    let c = repo.create(titled("c")).unwrap();

    repo.link(&a, "parent", b.id()).unwrap();
    repo.link(&b, "parent", c.id()).unwrap();
    let before: Vec<_> = [&a, &b, &c].iter().map(|node| node.edges()).collect();

    let err = repo.link(&c, "parent", a.id()).unwrap_err();
    match err {
        StoreError::CycleViolation { kind, origin, target } => {
            assert_eq!(kind, EdgeKind::from("parent"));
            assert_eq!(origin, c.id());
            assert_eq!(target, a.id());
        }
        other => panic!("unexpected error: {other}"),
    }
    let after: Vec<_> = [&a, &b, &c].iter().map(|node| node.edges()).collect();
    assert_eq!(before, after);

    // A second path that does not close a loop is fine
    assert!(repo.link(&a, "parent", c.id()).unwrap());
    assert!(!repo.link(&a, "parent", c.id()).unwrap());
}

#[test]
fn observers_follow_edge_changes() {
    let store = Store::new();
    let repo = items(&store);
    let parent = repo.create(titled("parent")).unwrap();
    let child = repo.create(titled("child")).unwrap();

    let seen = Arc::new(AtomicUsize::new(usize::MAX));
    let (reader, seen_clone) = (child.clone(), seen.clone());
    let _observer = Observer::new(store.tracker(), move |cx| {
        seen_clone.store(reader.read_targets("parent", Some(cx)).len(), Ordering::SeqCst);
    });
    assert_eq!(seen.load(Ordering::SeqCst), 0);

    repo.link(&child, "parent", parent.id()).unwrap();
    assert_eq!(seen.load(Ordering::SeqCst), 1);
    assert_eq!(repo.sources_of(parent.id(), "parent"), vec![child.id()]);

    repo.delete(&parent).unwrap();
    assert_eq!(seen.load(Ordering::SeqCst), 0);
}

#[test]
fn edges_cross_repositories() {
    let store = Store::new();
    let repo = items(&store);
    let people = store
        .repository(
            ModelBuilder::new("Person")
                .required("name", ValueKind::Text)
                .sticky_edge("assigned")
                .build()
                .unwrap(),
        )
        .unwrap();

    let task = repo.create(titled("task")).unwrap();
    let person = people.create(InitialValues::new().with("name", "ada")).unwrap();
    people.link(&person, "assigned", task.id()).unwrap();

    // Person's schema pins the edge, so the item cannot go
    let err = repo.delete(&task).unwrap_err();
    assert!(matches!(err, StoreError::StickyReferenceViolation { origin, .. } if origin == person.id()));

    people.unlink(&person, "assigned", task.id()).unwrap();
    assert!(repo.delete(&task).unwrap());
}

#[test]
fn restrict_policy_from_json_config() {
    let config = StoreConfig::from_json(r#"{ "cascade": "restrict" }"#).unwrap();
    assert_eq!(config.cascade, CascadePolicy::Restrict);

    let store = Store::with_config(config);
    let repo = items(&store);
    let a = repo.create(titled("a")).unwrap();
    let b = repo.create(titled("b")).unwrap();
    repo.link(&a, "related", b.id()).unwrap();

    assert!(matches!(
        repo.delete(&b),
        Err(StoreError::ReferencedNode { count: 1, .. })
    ));
    assert!(repo.delete(&a).unwrap());
    assert!(repo.delete(&b).unwrap());
}

#[test]
fn snapshot_restores_into_a_fresh_store() {
    let store = Store::new();
    let repo = items(&store);
    let a = repo.create(titled("a").with("description", "first")).unwrap();
    let b = repo.create(titled("b")).unwrap();
    b.set("completed", true).unwrap();
    repo.link(&a, "parent", b.id()).unwrap();

    let bytes = repo.snapshot().unwrap().to_msgpack().unwrap();
    let snapshot = RepositorySnapshot::from_msgpack(&bytes).unwrap();
    assert_eq!(snapshot.len(), 2);

    let restored_store = Store::new();
    let restored = items(&restored_store);
    let nodes = restored.restore(&snapshot).unwrap();
    assert_eq!(nodes.len(), 2);

    let a2 = restored.get(a.id()).unwrap();
    let b2 = restored.get(b.id()).unwrap();
    assert_eq!(a2.values(), a.values());
    assert!(b2.get::<bool>("completed").unwrap());
    assert_eq!(a2.targets("parent"), vec![b.id()]);

    // Restoring again would reuse live identifiers
    assert!(matches!(restored.restore(&snapshot), Err(StoreError::IdCollision(_))));
    assert_eq!(restored.len(), 2);
}

#[test]
fn snapshot_keeps_explicit_absence_over_defaults() {
    let store = Store::new();
    let notes = store
        .repository(
            ModelBuilder::new("Note")
                .optional_with_default("body", Value::from("draft"))
                .build()
                .unwrap(),
        )
        .unwrap();
    let note = notes.create(InitialValues::new()).unwrap();
    assert_eq!(note.value("body").unwrap(), Some(Value::from("draft")));
    note.clear("body").unwrap();

    let snapshot = notes.snapshot().unwrap();
    notes.dispose();

    let reopened = store
        .repository(
            ModelBuilder::new("Note")
                .optional_with_default("body", Value::from("draft"))
                .build()
                .unwrap(),
        )
        .unwrap();
    let restored = reopened.restore(&snapshot).unwrap();
    assert_eq!(restored[0].value("body").unwrap(), None);
}

#[test]
fn explicit_absence_at_create_is_kept() {
    let store = Store::new();
    let memos = store
        .repository(
            ModelBuilder::new("Memo")
                .required("title", ValueKind::Text)
                .optional_with_default("note", "default-note")
                .build()
                .unwrap(),
        )
        .unwrap();

    let cleared = memos
        .create(InitialValues::new().with("title", "x").absent("note"))
        .unwrap();
    assert_eq!(cleared.value("note").unwrap(), None);

    let defaulted = memos.create(titled("y")).unwrap();
    assert_eq!(defaulted.value("note").unwrap(), Some(Value::from("default-note")));

    // Required fields cannot be created absent, default or not
    let err = items(&store)
        .create(titled("z").absent("completed"))
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidInitialValue { ref field, .. } if field == "completed"));
}

#[test]
fn acyclic_declaration_binds_every_repository() {
    let store = Store::new();
    let folders = store
        .repository(
            ModelBuilder::new("Folder")
                .required("name", ValueKind::Text)
                .acyclic("parent")
                .build()
                .unwrap(),
        )
        .unwrap();
    let files = store
        .repository(
            ModelBuilder::new("File")
                .required("name", ValueKind::Text)
                .build()
                .unwrap(),
        )
        .unwrap();

    let folder = folders.create(InitialValues::new().with("name", "src")).unwrap();
    let file = files.create(InitialValues::new().with("name", "lib.rs")).unwrap();

    assert!(folders.link(&folder, "parent", file.id()).unwrap());
    let err = files.link(&file, "parent", folder.id()).unwrap_err();
    assert!(matches!(err, StoreError::CycleViolation { origin, .. } if origin == file.id()));
    assert_eq!(store.edge_count(), 1);
    assert!(file.targets("parent").is_empty());
}

#[test]
fn acyclic_declaration_over_an_existing_cycle_is_refused() {
    let store = Store::new();
    let files = store
        .repository(
            ModelBuilder::new("File")
                .required("name", ValueKind::Text)
                .build()
                .unwrap(),
        )
        .unwrap();
    let a = files.create(InitialValues::new().with("name", "a")).unwrap();
    let b = files.create(InitialValues::new().with("name", "b")).unwrap();
    files.link(&a, "parent", b.id()).unwrap();
    files.link(&b, "parent", a.id()).unwrap();

    let folders = store
        .repository(
            ModelBuilder::new("Folder")
                .required("name", ValueKind::Text)
                .acyclic("parent")
                .build()
                .unwrap(),
        )
        .unwrap();
    assert!(matches!(folders.init_schema(), Err(StoreError::InvalidSchema { .. })));
    assert!(!folders.is_initialized());

    // The kind stays unchecked, so the loop can still be extended
    files.unlink(&b, "parent", a.id()).unwrap();
    assert!(folders.init_schema().is_ok());
    assert!(matches!(
        files.link(&b, "parent", a.id()),
        Err(StoreError::CycleViolation { .. })
    ));
}

#[test]
fn failed_restore_adopts_no_schema() {
    let store = Store::new();
    let repo = items(&store);
    let node = repo.create(titled("a")).unwrap();
    let snapshot = repo.snapshot().unwrap();

    let other = Store::new();
    let squatters = other
        .repository(ModelBuilder::new("Squatter").build().unwrap())
        .unwrap();
    let squatter = squatters
        .create_with_id(node.id(), InitialValues::new())
        .unwrap();

    let restored = items(&other);
    assert!(matches!(restored.restore(&snapshot), Err(StoreError::IdCollision(id)) if id == node.id()));
    assert!(!restored.is_initialized());
    assert!(restored.is_empty());

    squatters.delete(&squatter).unwrap();
    assert_eq!(restored.restore(&snapshot).unwrap().len(), 1);
    assert!(restored.is_initialized());
}

#[test]
fn restore_refused_midway_drops_its_schema() {
    let store = Store::new();
    let repo = items(&store);
    let a = repo.create(titled("a")).unwrap();
    let b = repo.create(titled("b")).unwrap();
    repo.link(&a, "parent", b.id()).unwrap();

    let mut snapshot = repo.snapshot().unwrap();
    snapshot.nodes[1].edges.push(EdgeSnapshot {
        kind: EdgeKind::from("parent"),
        target: a.id(),
    });

    let other = Store::new();
    let restored = items(&other);
    assert!(matches!(restored.restore(&snapshot), Err(StoreError::CycleViolation { .. })));
    assert!(restored.is_empty());
    assert!(!restored.is_initialized());
    assert_eq!(other.edge_count(), 0);
}

#[test]
fn observers_follow_incoming_edges() {
    let store = Store::new();
    let repo = items(&store);
    let parent = repo.create(titled("parent")).unwrap();
    let child = repo.create(titled("child")).unwrap();

    let seen = Arc::new(AtomicUsize::new(usize::MAX));
    let (runs, runs_clone) = counter();
    let (reader, seen_clone) = (parent.clone(), seen.clone());
    let _observer = Observer::new(store.tracker(), move |cx| {
        runs_clone.fetch_add(1, Ordering::SeqCst);
        seen_clone.store(reader.read_sources("parent", Some(cx)).len(), Ordering::SeqCst);
    });
    assert_eq!(seen.load(Ordering::SeqCst), 0);

    repo.link(&child, "parent", parent.id()).unwrap();
    assert_eq!(seen.load(Ordering::SeqCst), 1);
    assert_eq!(parent.sources("parent"), vec![child.id()]);

    repo.unlink(&child, "parent", parent.id()).unwrap();
    assert_eq!(seen.load(Ordering::SeqCst), 0);

    repo.link(&child, "parent", parent.id()).unwrap();
    repo.delete(&child).unwrap();
    assert_eq!(seen.load(Ordering::SeqCst), 0);
    assert_eq!(runs.load(Ordering::SeqCst), 5);

    // Edges of the parent itself leave its incoming revision alone
    let other = repo.create(titled("other")).unwrap();
    repo.link(&parent, "related", other.id()).unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 5);
}
