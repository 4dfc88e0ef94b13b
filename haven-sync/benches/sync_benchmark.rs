use criterion::{black_box, criterion_group, criterion_main, Criterion};
use haven_sync::{
    ChangeDraft, ChangeKind, ChangeLog, ConflictTable, PresenceTracker, SyncPolicyStore,
    SyncPreference, SyncService,
};
use serde_json::json;

fn draft(doc: &str, user: &str, path: &str, value: serde_json::Value) -> ChangeDraft {
    ChangeDraft::new(doc, user, ChangeKind::Update, path).new_value(value)
}

fn bench_record_change(c: &mut Criterion) {
    c.bench_function("record_change", |b| {
        let mut log = ChangeLog::new();
        b.iter(|| {
            let op = log.record(black_box(draft("doc1", "u1", "title", json!("hello"))));
            black_box(op);
        })
    });
}

fn bench_change_history_1k(c: &mut Criterion) {
    let mut log = ChangeLog::new();
    for i in 0..1_000 {
        log.record(draft("doc1", "u1", "title", json!(i)));
    }

    c.bench_function("change_history_1k", |b| {
        b.iter(|| {
            black_box(log.history(black_box("doc1")).len());
        })
    });
}

fn bench_detect_no_conflict(c: &mut Criterion) {
    let mut table = ConflictTable::new();
    let mut log = ChangeLog::new();
    let local = log.record(draft("doc1", "alice", "title", json!("same")));
    let remote = log.record(draft("doc1", "bob", "title", json!("same")));

    c.bench_function("detect_no_conflict_deep_eq", |b| {
        b.iter(|| {
            black_box(table.detect("doc1", black_box(&local), black_box(&remote)));
        })
    });
}

fn bench_detect_and_auto_resolve(c: &mut Criterion) {
    c.bench_function("detect_and_auto_resolve", |b| {
        b.iter(|| {
            let mut service = SyncService::new();
            let local = service.record_change(draft("doc1", "alice", "title", json!("a")));
            let remote = service.record_change(draft("doc1", "bob", "title", json!("b")));
            service.detect_conflicts("doc1", &local, &remote);
            black_box(service.auto_resolve_conflicts("doc1"));
        })
    });
}

fn bench_presence_update(c: &mut Criterion) {
    c.bench_function("presence_update", |b| {
        let mut tracker = PresenceTracker::new();
        b.iter(|| {
            black_box(tracker.update(black_box("u1"), black_box("doc1"), true, None));
        })
    });
}

fn bench_presence_read_100_users(c: &mut Criterion) {
    let mut tracker = PresenceTracker::new();
    for i in 0..100 {
        tracker.update(&format!("u{i}"), "doc1", i % 2 == 0, None);
    }

    c.bench_function("document_presence_100_users", |b| {
        b.iter(|| {
            black_box(tracker.document_presence(black_box("doc1")).len());
        })
    });
}

fn bench_policy_lookup(c: &mut Criterion) {
    let mut store = SyncPolicyStore::new();
    store.set(SyncPreference::default());
    for i in 0..100 {
        store.set(SyncPreference::for_document(format!("doc{i}")));
    }

    c.bench_function("is_sync_enabled", |b| {
        b.iter(|| {
            black_box(store.is_enabled(black_box(Some("doc42"))));
            black_box(store.is_enabled(black_box(Some("uncovered"))));
        })
    });
}

criterion_group!(
    benches,
    bench_record_change,
    bench_change_history_1k,
    bench_detect_no_conflict,
    bench_detect_and_auto_resolve,
    bench_presence_update,
    bench_presence_read_100_users,
    bench_policy_lookup,
);
criterion_main!(benches);
