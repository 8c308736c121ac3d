use super::Category;
use tokio::sync::broadcast;

/// Buffered events per subscriber before it starts lagging.
pub(crate) const EVENT_CAPACITY: usize = 64;

/// Change notifications published by [`super::SyncEngine`].
///
/// Subscribers that fall more than [`EVENT_CAPACITY`] events behind receive
/// `RecvError::Lagged` and should re-read state from the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncEvent {
    CategoryChanged(Category),
    SnapshotChanged(Category),
    DashboardChanged(Category),
    RefreshStatus { success: bool },
    PingSweep { running: bool },
}

pub(crate) fn channel() -> broadcast::Sender<SyncEvent> {
    broadcast::channel(EVENT_CAPACITY).0
}

pub(crate) fn publish(tx: &broadcast::Sender<SyncEvent>, event: SyncEvent) {
    // No receivers is not an error
    let _ = tx.send(event);
}
