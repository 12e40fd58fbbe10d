use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::protocol::SyncFrame;

use super::patch::create_patch;

/// Full state plus the sequence number it corresponds to. This is the
/// `syncState` response body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub state: Value,
    pub seq_num: u64,
}

/// Sender half of state replication, owned by the gateway.
///
/// State only changes through [`StateSyncEngine::set_state`]; mutation by any
/// other path is invisible to the diffing and breaks the replica's
/// consistency.
#[derive(Debug)]
pub struct StateSyncEngine {
    state: Map<String, Value>,
    prev_snapshot: Value,
    seq_num: u64,
    attached: bool,
}

impl Default for StateSyncEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateSyncEngine {
    pub fn new() -> Self {
        Self::with_state(Map::new())
    }

    pub fn with_state(state: Map<String, Value>) -> Self {
        Self {
            prev_snapshot: Value::Object(state.clone()),
            state,
            seq_num: 0,
            attached: false,
        }
    }

    pub fn state(&self) -> &Map<String, Value> {
        &self.state
    }

    pub fn state_value(&self) -> Value {
        Value::Object(self.state.clone())
    }

    pub fn seq_num(&self) -> u64 {
        self.seq_num
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }

    /// A browser is now listening. Diffs are computed from the current state.
    pub fn attach(&mut self) {
        self.attached = true;
        self.prev_snapshot = self.state_value();
    }

    pub fn detach(&mut self) {
        self.attached = false;
    }

    /// Merge `update` into the state (keys replaced, never the whole map).
    ///
    /// Returns the diff to ship when a browser is attached and something
    /// actually changed.
    pub fn set_state(&mut self, update: Map<String, Value>) -> Option<SyncFrame> {
        for (key, value) in update {
            self.state.insert(key, value);
        }
        if !self.attached {
            return None;
        }

        let next = self.state_value();
        let ops = create_patch(&self.prev_snapshot, &next);
        if ops.is_empty() {
            return None;
        }
        self.seq_num += 1;
        self.prev_snapshot = next;
        Some(SyncFrame::Diff {
            seq_num: self.seq_num,
            ops,
        })
    }

    /// Numbered full-state frame; later diffs are relative to it.
    pub fn snapshot_frame(&mut self) -> SyncFrame {
        self.seq_num += 1;
        self.prev_snapshot = self.state_value();
        SyncFrame::Snapshot {
            seq_num: Some(self.seq_num),
            state: self.prev_snapshot.clone(),
        }
    }

    /// Pull-based resync: a copy of the state, with bookkeeping reset as if
    /// the receiver had just caught up to the current sequence number.
    pub fn sync_state(&mut self) -> Snapshot {
        self.prev_snapshot = self.state_value();
        Snapshot {
            state: self.prev_snapshot.clone(),
            seq_num: self.seq_num,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn update(v: Value) -> Map<String, Value> {
        match v {
            Value::Object(m) => m,
            _ => Map::new(),
        }
    }

    #[test]
    fn detached_updates_merge_without_frames() {
        let mut engine = StateSyncEngine::new();
        assert!(engine.set_state(update(json!({"a": 1}))).is_none());
        assert_eq!(engine.state_value(), json!({"a": 1}));
        assert_eq!(engine.seq_num(), 0);
    }

    #[test]
    fn merge_keeps_untouched_keys() {
        let mut engine = StateSyncEngine::new();
        engine.attach();
        engine.set_state(update(json!({"a": 1, "b": 2})));
        engine.set_state(update(json!({"b": 3})));
        assert_eq!(engine.state_value(), json!({"a": 1, "b": 3}));
        assert_eq!(engine.seq_num(), 2);
    }

    #[test]
    fn empty_or_noop_update_emits_nothing() {
        let mut engine = StateSyncEngine::new();
        engine.attach();
        assert!(engine.set_state(Map::new()).is_none());
        assert!(engine.set_state(update(json!({"a": 1}))).is_some());
        assert!(engine.set_state(update(json!({"a": 1}))).is_none());
        assert_eq!(engine.seq_num(), 1);
    }

    #[test]
    fn snapshot_frames_are_numbered() {
        let mut engine = StateSyncEngine::new();
        engine.attach();
        engine.set_state(update(json!({"a": 1})));
        match engine.snapshot_frame() {
            SyncFrame::Snapshot { seq_num, state } => {
                assert_eq!(seq_num, Some(2));
                assert_eq!(state, json!({"a": 1}));
            }
            SyncFrame::Diff { .. } => unreachable!("snapshot_frame returned a diff"),
        }
    }

    #[test]
    fn sync_state_rebases_next_diff() {
        let mut engine = StateSyncEngine::new();
        engine.attach();
        engine.set_state(update(json!({"a": 1})));
        let snap = engine.sync_state();
        assert_eq!(snap, Snapshot { state: json!({"a": 1}), seq_num: 1 });
        match engine.set_state(update(json!({"b": 2}))) {
            Some(SyncFrame::Diff { seq_num, ops }) => {
                assert_eq!(seq_num, 2);
                assert_eq!(ops.len(), 1);
            }
            other => unreachable!("unexpected {other:?}"),
        }
    }
}
