use super::Category;
use crate::api::types::{ChannelMetrics, DashboardStats, RecentActivity};
use std::sync::Arc;

/// Server-side metrics for one category, replaced wholesale on each fetch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DashboardSlot {
    pub metrics: Vec<ChannelMetrics>,
    pub stats: Option<DashboardStats>,
    pub recent_activity: Option<Vec<RecentActivity>>,
}

impl DashboardSlot {
    pub fn metrics_for(&self, index: u32) -> Option<&ChannelMetrics> {
        self.metrics.iter().find(|m| m.channel_index == index)
    }
}

#[derive(Debug, Default)]
pub(crate) struct DashboardCache {
    slots: [Arc<DashboardSlot>; 3],
}

impl DashboardCache {
    pub fn get(&self, category: Category) -> Arc<DashboardSlot> {
        Arc::clone(&self.slots[category.slot()])
    }

    pub fn replace(&mut self, category: Category, slot: DashboardSlot) {
        self.slots[category.slot()] = Arc::new(slot);
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
