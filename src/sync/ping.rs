use super::coordinator::{lock, Inner};
use super::events::{self, SyncEvent};
use super::{Category, DashboardSource, SyncEngine};
use crate::api::{ApiError, Channel, Health, PingResult, PingSweepEntry};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PingError {
    #[error("A ping sweep is already running")]
    SweepInProgress,

    #[error(transparent)]
    Api(#[from] ApiError),
}

fn apply_measurement(channel: &mut Channel, latency: u64, status: &str, now: DateTime<Utc>) {
    channel.latency = Some(latency);
    channel.latency_measured_at = Some(now);
    channel.health = Health::normalize(status);
}

/// Resets the sweep flag however the sweep ends, unless a later sweep has
/// taken it over since.
struct SweepGuard<'a, S> {
    inner: &'a Inner<S>,
    generation: u64,
}

impl<S> Drop for SweepGuard<'_, S> {
    fn drop(&mut self) {
        let released = {
            let mut sweep = lock(&self.inner.sweep);
            let owned = sweep.current == Some(self.generation);
            if owned {
                sweep.current = None;
            }
            owned
        };
        if released {
            events::publish(&self.inner.events, SyncEvent::PingSweep { running: false });
        }
    }
}

impl<S: DashboardSource> SyncEngine<S> {
    /// Ping one channel and record its latency in `category`'s snapshot.
    ///
    /// On failure the snapshot is left untouched. A channel that disappeared
    /// while the ping was in flight is ignored.
    pub async fn ping_channel(
        &self,
        category: Category,
        index: u32,
    ) -> Result<PingResult, PingError> {
        let result = self.inner.source.ping(category, index).await?;

        let now = Utc::now();
        let applied = {
            let mut snapshots = lock(&self.inner.snapshots);
            if snapshots.get(category).channel(index).is_some() {
                snapshots.update(category, |snapshot| {
                    if let Some(channel) = snapshot.channel_mut(index) {
                        apply_measurement(channel, result.latency, &result.status, now);
                    }
                });
                true
            } else {
                false
            }
        };

        if applied {
            events::publish(&self.inner.events, SyncEvent::SnapshotChanged(category));
        } else {
            tracing::debug!(category = %category, index, "Pinged channel is not in the snapshot");
        }
        Ok(result)
    }

    /// Ping every channel of `category` and record the results.
    ///
    /// Only one sweep runs at a time; a second call while one is running
    /// returns [`PingError::SweepInProgress`]. Results are applied after the
    /// whole response arrives, and only to channels that were present when the
    /// sweep started and are still present now.
    pub async fn ping_all(&self, category: Category) -> Result<Vec<PingSweepEntry>, PingError> {
        let generation = {
            let mut sweep = lock(&self.inner.sweep);
            if sweep.current.is_some() {
                return Err(PingError::SweepInProgress);
            }
            sweep.issued += 1;
            sweep.current = Some(sweep.issued);
            sweep.issued
        };
        events::publish(&self.inner.events, SyncEvent::PingSweep { running: true });
        let _guard = SweepGuard {
            inner: &self.inner,
            generation,
        };

        let requested: HashSet<u32> = self
            .snapshot(category)
            .channels
            .iter()
            .map(|c| c.index)
            .collect();

        let results = match self.inner.source.ping_all(category).await {
            Ok(results) => results,
            Err(e) => {
                tracing::warn!(category = %category, error = %e, "Ping sweep failed");
                return Err(e.into());
            }
        };

        let now = Utc::now();
        let applied = lock(&self.inner.snapshots).update(category, |snapshot| {
            let mut applied = 0usize;
            for entry in results.iter().filter(|e| requested.contains(&e.id)) {
                if let Some(channel) = snapshot.channel_mut(entry.id) {
                    apply_measurement(channel, entry.latency, &entry.status, now);
                    applied += 1;
                }
            }
            applied
        });

        tracing::debug!(
            category = %category,
            results = results.len(),
            applied,
            "Ping sweep complete"
        );
        events::publish(&self.inner.events, SyncEvent::SnapshotChanged(category));
        Ok(results)
    }
}
