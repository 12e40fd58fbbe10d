//! State replication from a gateway to its dependent browser.
//!
//! The sender ([`StateSyncEngine`]) diffs each state update against the last
//! shipped snapshot and numbers every emitted diff or snapshot. The receiver
//! ([`StateReplica`]) applies a diff only when it carries exactly the next
//! sequence number; anything else means sync was lost and a full resync is
//! required. The sequence check is the consistency guarantee, the patch
//! format is just transport.

pub mod engine;
pub mod patch;
pub mod replica;

pub use engine::{Snapshot, StateSyncEngine};
pub use patch::{apply_patch, create_patch, PatchOp};
pub use replica::{ApplyOutcome, StateReplica};
