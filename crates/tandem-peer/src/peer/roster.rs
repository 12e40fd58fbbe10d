use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use super::connection::{ConnId, Connection};
use crate::lock;

/// Live connections of a server, in connection order.
///
/// Ids are handed out from a monotonically increasing counter starting at 0
/// and are never reused within one server.
#[derive(Default)]
pub struct Roster {
    entries: Mutex<Vec<Arc<Connection>>>,
    next_id: AtomicU64,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn allocate_id(&self) -> ConnId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn push(&self, conn: Arc<Connection>) {
        lock(&self.entries).push(conn);
    }

    pub(crate) fn remove(&self, id: ConnId) -> Option<Arc<Connection>> {
        let mut entries = lock(&self.entries);
        let idx = entries.iter().position(|c| c.id() == id)?;
        Some(entries.remove(idx))
    }

    pub fn get(&self, id: ConnId) -> Option<Arc<Connection>> {
        lock(&self.entries).iter().find(|c| c.id() == id).cloned()
    }

    pub fn ids(&self) -> Vec<ConnId> {
        lock(&self.entries).iter().map(|c| c.id()).collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.entries).is_empty()
    }

    pub fn snapshot(&self) -> Vec<Arc<Connection>> {
        lock(&self.entries).clone()
    }
}
