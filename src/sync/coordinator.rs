use super::auto_refresh::AutoRefresh;
use super::dashboard_cache::{DashboardCache, DashboardSlot};
use super::events::{self, SyncEvent};
use super::merge::merge_channels;
use super::snapshot::{Snapshot, SnapshotStore};
use super::{Category, CategorySelector, DashboardSource};
use crate::api::{ApiError, DashboardResponse};
use chrono::Utc;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;

// ============================================================================
// Public Types
// ============================================================================

/// Errors delivered to every caller sharing a refresh pass.
#[derive(Debug, Clone, Error)]
pub enum SyncError {
    #[error("Refreshing {category} channels failed: {source}")]
    Fetch {
        category: Category,
        source: Arc<ApiError>,
    },

    /// The pass task panicked or was cancelled by runtime shutdown.
    #[error("Refresh pass ended unexpectedly: {0}")]
    PassAborted(String),
}

/// Awaitable result of a refresh pass. Cloning shares the same pass.
pub type RefreshHandle = Shared<BoxFuture<'static, Result<(), SyncError>>>;

/// Connection state shown to operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemStatus {
    /// No refresh has completed yet.
    Connecting,
    Running,
    Error,
}

#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Delay between auto-refresh ticks, measured from the end of the previous tick.
    pub refresh_interval: Duration,
    /// How long a local latency measurement survives refreshes.
    pub latency_ttl: Duration,
    pub initial_category: Category,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_millis(2000),
            latency_ttl: Duration::from_secs(300),
            initial_category: Category::Messages,
        }
    }
}

// ============================================================================
// Engine State
// ============================================================================

/// Which sweep currently owns the running flag.
#[derive(Default)]
pub(super) struct SweepState {
    pub(super) current: Option<u64>,
    pub(super) issued: u64,
}

#[derive(Default)]
struct RefreshState {
    requested: bool,
    in_flight: Option<RefreshHandle>,
}

pub(crate) struct Inner<S> {
    pub(super) source: S,
    pub(super) settings: EngineSettings,
    pub(super) selector: CategorySelector,
    pub(super) snapshots: Mutex<SnapshotStore>,
    pub(super) dashboards: Mutex<DashboardCache>,
    refresh: Mutex<RefreshState>,
    /// `None` until the first pass completes.
    last_refresh: Mutex<Option<bool>>,
    pub(super) sweep: Mutex<SweepState>,
    pub(super) auto_refresh: Mutex<AutoRefresh>,
    pub(super) events: broadcast::Sender<SyncEvent>,
}

impl<S> Drop for Inner<S> {
    fn drop(&mut self) {
        lock(&self.auto_refresh).stop();
    }
}

/// Poisoning only means another thread panicked mid-update; every critical
/// section here leaves the state consistent, so keep going.
pub(super) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Keeps per-category channel snapshots and dashboard metrics in sync with
/// the proxy.
///
/// Cheap to clone; clones share state. Dropping the last clone stops the
/// auto-refresh loop.
pub struct SyncEngine<S> {
    pub(super) inner: Arc<Inner<S>>,
}

impl<S> Clone for SyncEngine<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: DashboardSource> SyncEngine<S> {
    pub fn new(source: S, settings: EngineSettings) -> Self {
        let selector = CategorySelector::new(settings.initial_category);
        Self {
            inner: Arc::new(Inner {
                source,
                settings,
                selector,
                snapshots: Mutex::new(SnapshotStore::default()),
                dashboards: Mutex::new(DashboardCache::default()),
                refresh: Mutex::new(RefreshState::default()),
                last_refresh: Mutex::new(None),
                sweep: Mutex::new(SweepState::default()),
                auto_refresh: Mutex::new(AutoRefresh::Stopped),
                events: events::channel(),
            }),
        }
    }

    pub fn source(&self) -> &S {
        &self.inner.source
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.inner.settings
    }

    // ========================================================================
    // Refresh
    // ========================================================================

    /// Request a refresh of the active category.
    ///
    /// At most one dashboard fetch is in flight. A call made while a pass is
    /// running joins that pass, which re-reads the active category and fetches
    /// again before finishing. The pass runs as its own task: dropping the
    /// handle does not cancel it.
    pub fn refresh(&self) -> RefreshHandle {
        let mut state = lock(&self.inner.refresh);
        state.requested = true;
        if let Some(handle) = &state.in_flight {
            return handle.clone();
        }

        let task = tokio::spawn(run_pass(Arc::clone(&self.inner)));
        let handle = async move {
            match task.await {
                Ok(result) => result,
                Err(e) => Err(SyncError::PassAborted(e.to_string())),
            }
        }
        .boxed()
        .shared();

        state.in_flight = Some(handle.clone());
        handle
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn snapshot(&self, category: Category) -> Arc<Snapshot> {
        lock(&self.inner.snapshots).get(category)
    }

    pub fn current_snapshot(&self) -> Arc<Snapshot> {
        self.snapshot(self.active_category())
    }

    pub fn dashboard(&self, category: Category) -> Arc<DashboardSlot> {
        lock(&self.inner.dashboards).get(category)
    }

    pub fn current_dashboard(&self) -> Arc<DashboardSlot> {
        self.dashboard(self.active_category())
    }

    pub fn active_category(&self) -> Category {
        self.inner.selector.current()
    }

    /// Select `category`. Returns true when the selection changed.
    pub fn set_active_category(&self, category: Category) -> bool {
        let changed = self.inner.selector.select(category);
        if changed {
            self.announce_category(category);
        }
        changed
    }

    /// Apply a navigation route (`/channels/<c>`, `/monitor?type=<c>`).
    pub fn navigate(&self, route: &str) -> Option<Category> {
        let category = self.inner.selector.navigate(route)?;
        self.announce_category(category);
        Some(category)
    }

    fn announce_category(&self, category: Category) {
        tracing::debug!(category = %category, "Active category changed");
        events::publish(&self.inner.events, SyncEvent::CategoryChanged(category));
    }

    /// Whether the most recent pass succeeded. True before any pass.
    pub fn last_refresh_succeeded(&self) -> bool {
        lock(&self.inner.last_refresh).unwrap_or(true)
    }

    pub fn system_status(&self) -> SystemStatus {
        match *lock(&self.inner.last_refresh) {
            None => SystemStatus::Connecting,
            Some(true) => SystemStatus::Running,
            Some(false) => SystemStatus::Error,
        }
    }

    pub fn is_ping_sweep_running(&self) -> bool {
        lock(&self.inner.sweep).current.is_some()
    }

    /// Subscribe to change notifications. Drop the receiver to unsubscribe.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.inner.events.subscribe()
    }

    /// Reset every category to its initial state (used on logout).
    ///
    /// A pass already in flight still completes and writes its result.
    pub fn clear(&self) {
        lock(&self.inner.snapshots).reset();
        lock(&self.inner.dashboards).reset();
        *lock(&self.inner.last_refresh) = None;
        // A sweep still in flight no longer owns the flag
        lock(&self.inner.sweep).current = None;

        for category in Category::ALL {
            events::publish(&self.inner.events, SyncEvent::SnapshotChanged(category));
            events::publish(&self.inner.events, SyncEvent::DashboardChanged(category));
        }
        tracing::debug!("Cleared all channel snapshots");
    }
}

impl<S: DashboardSource> Inner<S> {
    async fn fetch_and_apply(&self, category: Category) -> Result<(), ApiError> {
        let DashboardResponse {
            channels,
            load_balance,
            metrics,
            stats,
            recent_activity,
        } = self.source.fetch_dashboard(category).await?;

        let now = Utc::now();
        let channel_count = channels.len();
        {
            let mut snapshots = lock(&self.snapshots);
            let previous = snapshots.get(category);
            let merged = merge_channels(
                channels,
                &previous.channels,
                now,
                self.settings.latency_ttl,
            );
            snapshots.replace(
                category,
                Snapshot {
                    channels: merged,
                    current: previous.current,
                    load_balance,
                },
            );
        }
        lock(&self.dashboards).replace(
            category,
            DashboardSlot {
                metrics,
                stats,
                recent_activity,
            },
        );

        tracing::debug!(category = %category, channels = channel_count, "Dashboard refreshed");
        events::publish(&self.events, SyncEvent::SnapshotChanged(category));
        events::publish(&self.events, SyncEvent::DashboardChanged(category));
        Ok(())
    }

    fn record_refresh(&self, success: bool) {
        *lock(&self.last_refresh) = Some(success);
        events::publish(&self.events, SyncEvent::RefreshStatus { success });
    }
}

/// Clears the in-flight handle if a pass unwinds without reaching a normal exit.
struct PassGuard<'a> {
    refresh: &'a Mutex<RefreshState>,
    armed: bool,
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            let mut state = lock(self.refresh);
            state.in_flight = None;
            state.requested = false;
        }
    }
}

async fn run_pass<S: DashboardSource>(inner: Arc<Inner<S>>) -> Result<(), SyncError> {
    let mut guard = PassGuard {
        refresh: &inner.refresh,
        armed: true,
    };

    loop {
        // Flag check and handle clear happen under one lock, so a refresh()
        // racing with the end of the pass either joins it or starts a new one.
        let category = {
            let mut state = lock(&inner.refresh);
            if !state.requested {
                state.in_flight = None;
                guard.armed = false;
                return Ok(());
            }
            state.requested = false;
            inner.selector.current()
        };

        if let Err(err) = inner.fetch_and_apply(category).await {
            {
                let mut state = lock(&inner.refresh);
                state.in_flight = None;
                state.requested = false;
            }
            guard.armed = false;

            tracing::warn!(category = %category, error = %err, "Dashboard refresh failed");
            inner.record_refresh(false);
            return Err(SyncError::Fetch {
                category,
                source: Arc::new(err),
            });
        }

        inner.record_refresh(true);
    }
}
