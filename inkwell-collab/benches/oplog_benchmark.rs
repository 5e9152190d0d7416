use criterion::{criterion_group, criterion_main, Criterion};
use inkwell_collab::broadcast::BroadcastGroup;
use inkwell_collab::oplog::{OperationLog, UndoScope};
use inkwell_collab::protocol::{ClientEvent, CompositeMode, ConnectionId, Point, RoomId, ServerEvent, Stroke};
use inkwell_collab::room::{Audience, Dispatch, RoomState};
use std::hint::black_box;

fn stroke(owner: ConnectionId, i: usize) -> Stroke {
    Stroke {
        stroke_id: format!("s{i}"),
        owner_id: owner,
        points: (0..32).map(|p| Point::new(p as f64, (p * i) as f64)).collect(),
        color: "#34495e".to_string(),
        size: 3.0,
        composite: CompositeMode::SourceOver,
    }
}

/// A log of `n` strokes spread over `owners` members, every tenth undone.
fn busy_log(n: usize, owners: &[ConnectionId]) -> OperationLog {
    let mut log = OperationLog::new();
    for i in 0..n {
        log.append(stroke(owners[i % owners.len()], i));
    }
    for i in (0..n).step_by(10) {
        log.undo(owners[i % owners.len()], UndoScope::Own);
    }
    log
}

fn bench_append_1000(c: &mut Criterion) {
    let owner = ConnectionId::new();
    let strokes: Vec<Stroke> = (0..1000).map(|i| stroke(owner, i)).collect();

    c.bench_function("oplog_append_1000", |b| {
        b.iter(|| {
            let mut log = OperationLog::new();
            for s in &strokes {
                log.append(s.clone());
            }
            black_box(log.len());
        })
    });
}

fn bench_active_strokes_10k(c: &mut Criterion) {
    let owners: Vec<ConnectionId> = (0..8).map(|_| ConnectionId::new()).collect();
    let log = busy_log(10_000, &owners);

    c.bench_function("oplog_active_strokes_10k", |b| {
        b.iter(|| {
            black_box(log.active_strokes());
        })
    });
}

fn bench_self_undo_redo_10k(c: &mut Criterion) {
    let owners: Vec<ConnectionId> = (0..8).map(|_| ConnectionId::new()).collect();
    let mut log = busy_log(10_000, &owners);

    c.bench_function("oplog_self_undo_redo_10k", |b| {
        b.iter(|| {
            black_box(log.undo(black_box(owners[3]), UndoScope::Own));
            black_box(log.redo(owners[0]));
        })
    });
}

fn bench_commit_decode(c: &mut Criterion) {
    let event = ClientEvent::Commit {
        stroke_id: "s1".to_string(),
        points: (0..64).map(|p| Point::new(p as f64, p as f64 * 0.5)).collect(),
        color: "#1abc9c".to_string(),
        size: 4.0,
        composite: CompositeMode::SourceOver,
    };
    let text = event.encode().unwrap();

    c.bench_function("commit_parse_64_points", |b| {
        b.iter(|| {
            black_box(ClientEvent::parse(black_box(&text)).unwrap());
        })
    });
}

fn bench_snapshot_encode_1000(c: &mut Criterion) {
    let owners = [ConnectionId::new()];
    let log = busy_log(1000, &owners);
    let snapshot = ServerEvent::Snapshot {
        strokes: log.active_strokes(),
        users: Vec::new(),
    };

    c.bench_function("snapshot_encode_1000_strokes", |b| {
        b.iter(|| {
            black_box(snapshot.encode().unwrap());
        })
    });
}

fn bench_broadcast_100_members(c: &mut Criterion) {
    let group = BroadcastGroup::new(1024);
    let mut receivers: Vec<_> = (0..100).map(|_| group.subscribe()).collect();

    c.bench_function("broadcast_members_100_receivers", |b| {
        b.iter(|| {
            let count = group.send(Dispatch::new(
                Audience::Room,
                ServerEvent::Members { users: Vec::new() },
            ));
            black_box(count);
            for rx in receivers.iter_mut() {
                let _ = rx.try_recv();
            }
        })
    });
}

fn bench_room_commit(c: &mut Criterion) {
    let mut room = RoomState::new(RoomId::default());
    let member = ConnectionId::new();
    room.join(member, None);
    let mut i = 0usize;

    c.bench_function("room_apply_commit", |b| {
        b.iter(|| {
            i += 1;
            let event = ClientEvent::Commit {
                stroke_id: format!("s{i}"),
                points: vec![Point::new(0.0, 0.0), Point::new(1.0, 1.0)],
                color: "#000".to_string(),
                size: 1.0,
                composite: CompositeMode::SourceOver,
            };
            black_box(room.apply(member, event));
        })
    });
}

criterion_group!(
    benches,
    bench_append_1000,
    bench_active_strokes_10k,
    bench_self_undo_redo_10k,
    bench_commit_decode,
    bench_snapshot_encode_1000,
    bench_broadcast_100_members,
    bench_room_commit,
);
criterion_main!(benches);
