use super::coordinator::{lock, Inner};
use super::{DashboardSource, SyncEngine};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Auto-refresh loop state. Each run owns its own cancellation token.
#[derive(Debug, Default)]
pub(crate) enum AutoRefresh {
    #[default]
    Stopped,
    Running { token: CancellationToken },
}

impl AutoRefresh {
    /// Cancel the running loop, if any. Returns true when a loop was stopped.
    pub(crate) fn stop(&mut self) -> bool {
        match std::mem::take(self) {
            AutoRefresh::Running { token } => {
                token.cancel();
                true
            }
            AutoRefresh::Stopped => false,
        }
    }
}

impl<S: DashboardSource> SyncEngine<S> {
    /// Start refreshing on a fixed cadence, replacing any loop already running.
    ///
    /// The first tick fires one interval from now; each following tick is
    /// scheduled one interval after the previous refresh settles, whether it
    /// succeeded or not.
    pub fn start_auto_refresh(&self) {
        let interval = self.inner.settings.refresh_interval;
        let mut state = lock(&self.inner.auto_refresh);
        if state.stop() {
            tracing::debug!("Restarting auto-refresh");
        }

        let token = CancellationToken::new();
        tokio::spawn(tick_chain(
            Arc::downgrade(&self.inner),
            token.clone(),
            interval,
        ));
        *state = AutoRefresh::Running { token };
        tracing::debug!(interval_ms = interval.as_millis() as u64, "Auto-refresh started");
    }

    /// Cancel the pending tick. A refresh already in flight still completes.
    pub fn stop_auto_refresh(&self) {
        if lock(&self.inner.auto_refresh).stop() {
            tracing::debug!("Auto-refresh stopped");
        }
    }

    pub fn is_auto_refresh_running(&self) -> bool {
        matches!(*lock(&self.inner.auto_refresh), AutoRefresh::Running { .. })
    }

    /// Stop background work before discarding this handle.
    pub fn dispose(self) {
        self.stop_auto_refresh();
    }
}

/// Holds only a weak reference so a dropped engine is never kept alive.
async fn tick_chain<S: DashboardSource>(
    engine: Weak<Inner<S>>,
    token: CancellationToken,
    interval: Duration,
) {
    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }

        let Some(inner) = engine.upgrade() else {
            break;
        };
        let pass = SyncEngine { inner }.refresh();

        if let Err(e) = pass.await {
            tracing::warn!(error = %e, "Auto-refresh tick failed");
        }
        if token.is_cancelled() {
            break;
        }
    }
}
