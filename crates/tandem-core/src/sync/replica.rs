use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::protocol::SyncFrame;

use super::engine::Snapshot;
use super::patch::apply_patch;

/// What the replica did with a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Diff applied, sequence advanced.
    Applied,
    /// Full snapshot installed.
    Replaced,
    /// Frame discarded. The caller must pull a snapshot and call
    /// [`StateReplica::resync`].
    ResyncRequired { wanted: u64, received: u64 },
}

/// Receiver half of state replication (the browser side).
#[derive(Debug, Clone)]
pub struct StateReplica {
    state: Value,
    expected: u64,
}

impl Default for StateReplica {
    fn default() -> Self {
        Self::new()
    }
}

impl StateReplica {
    pub fn new() -> Self {
        Self {
            state: Value::Object(Map::new()),
            expected: 0,
        }
    }

    pub fn state(&self) -> &Value {
        &self.state
    }

    /// Sequence number of the last update applied. The next diff must carry
    /// `expected() + 1`.
    pub fn expected(&self) -> u64 {
        self.expected
    }

    pub fn apply(&mut self, frame: &SyncFrame) -> ApplyOutcome {
        match frame {
            SyncFrame::Diff { seq_num, ops } => {
                let wanted = self.expected.saturating_add(1);
                if *seq_num != wanted {
                    warn!(wanted, received = seq_num, "sync sequence deviation, resync required");
                    return ApplyOutcome::ResyncRequired {
                        wanted,
                        received: *seq_num,
                    };
                }
                let mut next = self.state.clone();
                if let Err(e) = apply_patch(&mut next, ops) {
                    warn!(error = %e, seq_num, "diff does not apply, resync required");
                    return ApplyOutcome::ResyncRequired {
                        wanted,
                        received: *seq_num,
                    };
                }
                self.state = next;
                self.expected = *seq_num;
                ApplyOutcome::Applied
            }
            SyncFrame::Snapshot { seq_num, state } => {
                self.state = state.clone();
                if let Some(seq) = seq_num {
                    self.expected = *seq;
                }
                debug!(expected = self.expected, "snapshot installed");
                ApplyOutcome::Replaced
            }
        }
    }

    /// Install a pulled snapshot: state replaced wholesale, sequence reset to
    /// the reported value.
    pub fn resync(&mut self, snapshot: Snapshot) {
        self.state = snapshot.state;
        self.expected = snapshot.seq_num;
    }
}
