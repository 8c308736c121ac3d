use super::Category;
use crate::api::types::default_load_balance;
use crate::api::Channel;
use std::sync::Arc;

/// Last known channel list of one category.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub channels: Vec<Channel>,
    /// Index of the channel the proxy currently routes to, if known.
    pub current: Option<u32>,
    /// Scheduling strategy name (`round-robin`, `failover`, ...).
    pub load_balance: String,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            channels: Vec::new(),
            current: None,
            load_balance: default_load_balance(),
        }
    }
}

impl Snapshot {
    pub fn channel(&self, index: u32) -> Option<&Channel> {
        self.channels.iter().find(|c| c.index == index)
    }

    pub(crate) fn channel_mut(&mut self, index: u32) -> Option<&mut Channel> {
        self.channels.iter_mut().find(|c| c.index == index)
    }
}

/// One snapshot per category.
///
/// Snapshots are handed out as `Arc`s so readers never hold the engine lock;
/// writers copy-on-write through [`SnapshotStore::update`].
#[derive(Debug, Default)]
pub(crate) struct SnapshotStore {
    slots: [Arc<Snapshot>; 3],
}

impl SnapshotStore {
    pub fn get(&self, category: Category) -> Arc<Snapshot> {
        Arc::clone(&self.slots[category.slot()])
    }

    pub fn replace(&mut self, category: Category, snapshot: Snapshot) {
        self.slots[category.slot()] = Arc::new(snapshot);
    }

    pub fn update<R>(&mut self, category: Category, f: impl FnOnce(&mut Snapshot) -> R) -> R {
        f(Arc::make_mut(&mut self.slots[category.slot()]))
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
