//! In-memory [`DashboardSource`] with gates for holding requests open.

use super::{Category, DashboardSource};
use crate::api::{ApiError, DashboardResponse, PingResult, PingSweepEntry};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

#[derive(Default)]
struct FakeState {
    dashboards: Mutex<HashMap<Category, DashboardResponse>>,
    fetch_failure: Mutex<Option<u16>>,
    ping_failure: Mutex<Option<u16>>,
    fetch_gate: Mutex<Option<Arc<Semaphore>>>,
    ping_gate: Mutex<Option<Arc<Semaphore>>>,
    pings: Mutex<HashMap<u32, PingResult>>,
    sweep: Mutex<Vec<PingSweepEntry>>,
    fetched: Mutex<Vec<Category>>,
    fetches: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    ping_calls: AtomicUsize,
}

#[derive(Clone, Default)]
pub(crate) struct FakeSource {
    state: Arc<FakeState>,
}

fn empty_dashboard() -> DashboardResponse {
    DashboardResponse {
        channels: Vec::new(),
        load_balance: "round-robin".to_string(),
        metrics: Vec::new(),
        stats: None,
        recent_activity: None,
    }
}

fn http_error(status: u16) -> ApiError {
    ApiError::Http {
        status,
        message: format!("Request failed ({status})"),
    }
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_dashboard(&self, category: Category, dashboard: DashboardResponse) {
        self.state.dashboards.lock().unwrap().insert(category, dashboard);
    }

    pub fn fail_with(&self, status: u16) {
        *self.state.fetch_failure.lock().unwrap() = Some(status);
    }

    pub fn recover(&self) {
        *self.state.fetch_failure.lock().unwrap() = None;
        *self.state.ping_failure.lock().unwrap() = None;
    }

    pub fn fail_pings(&self, status: u16) {
        *self.state.ping_failure.lock().unwrap() = Some(status);
    }

    /// Block dashboard fetches until permits are added to the returned gate.
    pub fn hold_fetches(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.state.fetch_gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    /// Block pings (single and sweep) until permits are added.
    pub fn hold_pings(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.state.ping_gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    pub fn set_ping(&self, index: u32, result: PingResult) {
        self.state.pings.lock().unwrap().insert(index, result);
    }

    pub fn set_sweep(&self, entries: Vec<PingSweepEntry>) {
        *self.state.sweep.lock().unwrap() = entries;
    }

    pub fn fetch_count(&self) -> usize {
        self.state.fetches.load(Ordering::SeqCst)
    }

    pub fn in_flight(&self) -> usize {
        self.state.in_flight.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.state.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn ping_calls(&self) -> usize {
        self.state.ping_calls.load(Ordering::SeqCst)
    }

    pub fn fetched_categories(&self) -> Vec<Category> {
        self.state.fetched.lock().unwrap().clone()
    }

    /// Yield until at least `n` fetches have started.
    pub async fn wait_for_fetches(&self, n: usize) {
        while self.fetch_count() < n {
            tokio::task::yield_now().await;
        }
    }

    /// Yield until at least `n` ping requests have started.
    pub async fn wait_for_pings(&self, n: usize) {
        while self.ping_calls() < n {
            tokio::task::yield_now().await;
        }
    }

    async fn pass_gate(gate: Option<Arc<Semaphore>>) {
        if let Some(gate) = gate {
            let _permit = gate.acquire().await.unwrap();
        }
    }
}

impl DashboardSource for FakeSource {
    async fn fetch_dashboard(&self, category: Category) -> Result<DashboardResponse, ApiError> {
        let state = &self.state;
        state.fetches.fetch_add(1, Ordering::SeqCst);
        state.fetched.lock().unwrap().push(category);
        let now = state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        state.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let gate = state.fetch_gate.lock().unwrap().clone();
        Self::pass_gate(gate).await;
        state.in_flight.fetch_sub(1, Ordering::SeqCst);

        let failure = *state.fetch_failure.lock().unwrap();
        if let Some(status) = failure {
            return Err(http_error(status));
        }
        let dashboard = state.dashboards.lock().unwrap().get(&category).cloned();
        Ok(dashboard.unwrap_or_else(empty_dashboard))
    }

    async fn ping(&self, _category: Category, index: u32) -> Result<PingResult, ApiError> {
        let state = &self.state;
        state.ping_calls.fetch_add(1, Ordering::SeqCst);

        let gate = state.ping_gate.lock().unwrap().clone();
        Self::pass_gate(gate).await;

        let failure = *state.ping_failure.lock().unwrap();
        if let Some(status) = failure {
            return Err(http_error(status));
        }
        let result = state.pings.lock().unwrap().get(&index).cloned();
        result.ok_or_else(|| http_error(404))
    }

    async fn ping_all(&self, _category: Category) -> Result<Vec<PingSweepEntry>, ApiError> {
        let state = &self.state;
        state.ping_calls.fetch_add(1, Ordering::SeqCst);

        let gate = state.ping_gate.lock().unwrap().clone();
        Self::pass_gate(gate).await;

        let failure = *state.ping_failure.lock().unwrap();
        if let Some(status) = failure {
            return Err(http_error(status));
        }
        let sweep = state.sweep.lock().unwrap().clone();
        Ok(sweep)
    }
}
