use super::events::{self, SyncEvent};
use super::coordinator::lock;
use super::{Category, DashboardSource, SyncEngine, SyncError};
use crate::api::{ApiClient, ApiError, Channel, ChannelConfig, ChannelStatus};
use std::time::Duration;
use thiserror::Error;

/// Promotion window granted to a quick-added channel.
pub const QUICK_ADD_PROMOTION: Duration = Duration::from_secs(300);

#[derive(Debug, Error)]
pub enum ChannelOpError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Refresh(#[from] SyncError),
}

/// What [`SyncEngine::save_channel`] ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Updated { index: u32 },
    Added,
    /// Added, moved to the front of the order, and promoted.
    QuickAdded { index: u32 },
}

/// Work out the order that puts a freshly added channel first.
///
/// The new channel is taken to be the non-disabled channel with the highest
/// index. The remaining non-disabled channels follow, sorted by priority
/// (falling back to their index). Returns `None` when every channel is
/// disabled.
pub fn quick_add_order(channels: &[Channel]) -> Option<(u32, Vec<u32>)> {
    let candidates: Vec<&Channel> = channels
        .iter()
        .filter(|c| c.status.is_failover_candidate())
        .collect();
    let newest = candidates.iter().map(|c| c.index).max()?;

    let mut rest: Vec<&Channel> = candidates
        .into_iter()
        .filter(|c| c.index != newest)
        .collect();
    rest.sort_by_key(|c| c.priority.unwrap_or(i64::from(c.index)));

    let order = std::iter::once(newest)
        .chain(rest.into_iter().map(|c| c.index))
        .collect();
    Some((newest, order))
}

impl<S: DashboardSource> SyncEngine<S> {
    /// Channels that are explicitly active or have no status set.
    pub fn active_channel_count(&self, category: Category) -> usize {
        self.snapshot(category)
            .channels
            .iter()
            .filter(|c| c.status.is_active())
            .count()
    }

    /// Channels taking part in failover (everything not disabled).
    pub fn failover_channel_count(&self, category: Category) -> usize {
        self.snapshot(category)
            .channels
            .iter()
            .filter(|c| c.status.is_failover_candidate())
            .count()
    }
}

// ============================================================================
// Mutations (active category)
// ============================================================================

impl SyncEngine<ApiClient> {
    pub async fn update_load_balance(&self, strategy: &str) -> Result<(), ChannelOpError> {
        let category = self.active_category();
        self.source().update_load_balance(category, strategy).await?;

        lock(&self.inner.snapshots).update(category, |s| s.load_balance = strategy.to_string());
        events::publish(&self.inner.events, SyncEvent::SnapshotChanged(category));
        tracing::info!(category = %category, strategy, "Load balance strategy updated");
        Ok(())
    }

    /// Delete a channel, then refresh so the snapshot drops it.
    pub async fn delete_channel(&self, index: u32) -> Result<(), ChannelOpError> {
        let category = self.active_category();
        self.source().delete_channel(category, index).await?;
        tracing::info!(category = %category, index, "Channel deleted");
        self.refresh().await?;
        Ok(())
    }

    pub async fn set_channel_status(
        &self,
        index: u32,
        status: ChannelStatus,
    ) -> Result<(), ChannelOpError> {
        let category = self.active_category();
        self.source()
            .set_channel_status(category, index, status)
            .await?;
        tracing::info!(category = %category, index, status = %status, "Channel status updated");
        Ok(())
    }

    pub async fn reorder(&self, order: &[u32]) -> Result<(), ChannelOpError> {
        let category = self.active_category();
        self.source().reorder_channels(category, order).await?;
        Ok(())
    }

    pub async fn set_promotion(
        &self,
        index: u32,
        duration: Duration,
    ) -> Result<(), ChannelOpError> {
        let category = self.active_category();
        self.source()
            .set_channel_promotion(category, index, duration)
            .await?;
        tracing::info!(
            category = %category,
            index,
            seconds = duration.as_secs(),
            "Channel promoted"
        );
        Ok(())
    }

    /// Update the channel at `editing`, or add a new one.
    ///
    /// With `quick_add`, a newly added channel is also moved to the front of
    /// the order and promoted for [`QUICK_ADD_PROMOTION`]. Those two follow-up
    /// steps are best effort: if either fails the save still succeeds and the
    /// outcome is [`SaveOutcome::Added`].
    pub async fn save_channel(
        &self,
        config: &ChannelConfig,
        editing: Option<u32>,
        quick_add: bool,
    ) -> Result<SaveOutcome, ChannelOpError> {
        let category = self.active_category();

        if let Some(index) = editing {
            self.source().update_channel(category, index, config).await?;
            tracing::info!(category = %category, index, "Channel updated");
            return Ok(SaveOutcome::Updated { index });
        }

        self.source().add_channel(category, config).await?;
        tracing::info!(category = %category, "Channel added");
        if !quick_add {
            return Ok(SaveOutcome::Added);
        }

        // The proxy assigns the index, so learn it from a fresh list
        self.refresh().await?;
        let snapshot = self.snapshot(category);
        let Some((index, order)) = quick_add_order(&snapshot.channels) else {
            tracing::warn!(category = %category, "No enabled channel found after quick add");
            return Ok(SaveOutcome::Added);
        };

        match self.promote_first(category, index, &order).await {
            Ok(()) => Ok(SaveOutcome::QuickAdded { index }),
            Err(e) => {
                tracing::warn!(
                    category = %category,
                    index,
                    error = %e,
                    "Quick add priority setup failed"
                );
                Ok(SaveOutcome::Added)
            }
        }
    }

    async fn promote_first(
        &self,
        category: Category,
        index: u32,
        order: &[u32],
    ) -> Result<(), ApiError> {
        self.source().reorder_channels(category, order).await?;
        self.source()
            .set_channel_promotion(category, index, QUICK_ADD_PROMOTION)
            .await
    }
}
