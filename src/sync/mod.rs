//! Dashboard synchronization engine.
//!
//! [`SyncEngine`] keeps one [`Snapshot`] and one [`DashboardSlot`] per
//! [`Category`] in step with the proxy. Refreshes are single-flight and
//! coalescing; pings overlay locally measured latency that survives refreshes
//! for a bounded window.

mod auto_refresh;
mod category;
mod channels;
mod coordinator;
mod dashboard_cache;
mod events;
mod merge;
mod ping;
mod snapshot;

#[cfg(test)]
pub(crate) mod fake;

pub use category::{category_from_route, Category, CategoryParseError, CategorySelector};
pub use channels::{quick_add_order, ChannelOpError, SaveOutcome, QUICK_ADD_PROMOTION};
pub use coordinator::{EngineSettings, RefreshHandle, SyncEngine, SyncError, SystemStatus};
pub use dashboard_cache::DashboardSlot;
pub use events::SyncEvent;
pub use merge::merge_channels;
pub use ping::PingError;
pub use snapshot::Snapshot;

use crate::api::{ApiError, DashboardResponse, PingResult, PingSweepEntry};
use std::future::Future;

/// Read side of the admin API that the engine depends on.
///
/// [`crate::api::ApiClient`] is the production implementation; tests swap in
/// an in-memory source with controllable latency.
pub trait DashboardSource: Send + Sync + 'static {
    fn fetch_dashboard(
        &self,
        category: Category,
    ) -> impl Future<Output = Result<DashboardResponse, ApiError>> + Send;

    fn ping(
        &self,
        category: Category,
        index: u32,
    ) -> impl Future<Output = Result<PingResult, ApiError>> + Send;

    fn ping_all(
        &self,
        category: Category,
    ) -> impl Future<Output = Result<Vec<PingSweepEntry>, ApiError>> + Send;
}
