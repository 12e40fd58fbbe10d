//! Sender/receiver sequence tests for state replication.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use serde_json::{json, Map, Value};

use tandem_core::protocol::{Envelope, Frame, SyncFrame};
use tandem_core::sync::{ApplyOutcome, StateReplica, StateSyncEngine};

fn obj(v: Value) -> Map<String, Value> {
    match v {
        Value::Object(m) => m,
        other => panic!("not an object: {other}"),
    }
}

/// Engine attached with no state yet, replica fresh: both start at {} / 0.
fn attached_engine() -> StateSyncEngine {
    let mut engine = StateSyncEngine::new();
    engine.attach();
    engine
}

fn updates(n: usize) -> Vec<Map<String, Value>> {
    (0..n)
        .map(|i| {
            let mut m = obj(json!({
                "turn": i,
                "board": { "cells": vec![i; i % 4 + 1] },
            }));
            m.insert(format!("k{}", i % 3), json!({ "nested": [i, { "deep": i * 2 }] }));
            m
        })
        .collect()
}

#[test]
fn in_order_diffs_converge() {
    let mut engine = attached_engine();
    let mut replica = StateReplica::new();
    let n = 25;

    for u in updates(n) {
        let frame = engine.set_state(u).expect("non-empty diff");
        assert_eq!(replica.apply(&frame), ApplyOutcome::Applied);
    }

    assert_eq!(replica.expected(), n as u64);
    assert_eq!(replica.state(), &engine.state_value());
}

#[test]
fn diffs_survive_envelope_encoding() {
    let mut engine = attached_engine();
    let mut replica = StateReplica::new();

    for u in updates(8) {
        let frame = engine.set_state(u).unwrap();
        let text = Envelope::from_sync(&frame).unwrap().to_text().unwrap();
        let Frame::Sync(decoded) = Envelope::parse(&text).unwrap().classify().unwrap() else {
            panic!("not a sync frame");
        };
        assert_eq!(replica.apply(&decoded), ApplyOutcome::Applied);
    }
    assert_eq!(replica.state(), &engine.state_value());
}

#[test]
fn missing_diff_forces_full_resync() {
    let mut engine = attached_engine();
    let mut replica = StateReplica::new();

    let frames: Vec<SyncFrame> = updates(6)
        .into_iter()
        .map(|u| engine.set_state(u).unwrap())
        .collect();

    // deliver 1..=3, drop 4, deliver 5
    for f in &frames[..3] {
        assert_eq!(replica.apply(f), ApplyOutcome::Applied);
    }
    let before = replica.state().clone();
    assert_eq!(
        replica.apply(&frames[4]),
        ApplyOutcome::ResyncRequired { wanted: 4, received: 5 }
    );
    assert_eq!(replica.state(), &before, "mismatched diff must not be applied");
    assert_eq!(replica.expected(), 3);

    replica.resync(engine.sync_state());
    assert_eq!(replica.expected(), 6);
    assert_eq!(replica.state(), &engine.state_value());

    // the stream continues from the rebased snapshot
    let next = engine.set_state(obj(json!({"after": true}))).unwrap();
    assert_eq!(replica.apply(&next), ApplyOutcome::Applied);
    assert_eq!(replica.expected(), 7);
    assert_eq!(replica.state(), &engine.state_value());
}

#[test]
fn replayed_diff_is_lost_sync() {
    let mut engine = attached_engine();
    let mut replica = StateReplica::new();
    let first = engine.set_state(obj(json!({"a": 1}))).unwrap();
    assert_eq!(replica.apply(&first), ApplyOutcome::Applied);
    assert_eq!(
        replica.apply(&first),
        ApplyOutcome::ResyncRequired { wanted: 2, received: 1 }
    );
}

#[test]
fn empty_update_never_emits() {
    let mut engine = attached_engine();
    assert!(engine.set_state(Map::new()).is_none());
    assert_eq!(engine.seq_num(), 0);
}

#[test]
fn snapshot_frame_resets_replica() {
    let mut engine = attached_engine();
    let mut replica = StateReplica::new();
    engine.set_state(obj(json!({"lost": 1})));
    engine.set_state(obj(json!({"lost": 2})));

    let snap = engine.snapshot_frame();
    assert_eq!(replica.apply(&snap), ApplyOutcome::Replaced);
    assert_eq!(replica.expected(), 3);

    let next = engine.set_state(obj(json!({"lost": 3}))).unwrap();
    assert_eq!(replica.apply(&next), ApplyOutcome::Applied);
    assert_eq!(replica.state(), &json!({"lost": 3}));
}
