use crate::api::Channel;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::time::Duration;

/// Carry still-valid local latency measurements from `previous` onto `fresh`.
///
/// Records are matched by `index` (first occurrence in `previous`). A previous
/// measurement is copied when it is younger than `ttl`; timestamps in the
/// future count as fresh. Records that exist only in `previous` are dropped,
/// records that exist only in `fresh` pass through untouched.
pub fn merge_channels(
    fresh: Vec<Channel>,
    previous: &[Channel],
    now: DateTime<Utc>,
    ttl: Duration,
) -> Vec<Channel> {
    if previous.is_empty() {
        return fresh;
    }

    let mut by_index: HashMap<u32, &Channel> = HashMap::with_capacity(previous.len());
    for channel in previous {
        by_index.entry(channel.index).or_insert(channel);
    }

    fresh
        .into_iter()
        .map(|mut channel| {
            let Some(prev) = by_index.get(&channel.index) else {
                return channel;
            };
            let Some(measured_at) = prev.latency_measured_at else {
                return channel;
            };
            if is_within(measured_at, now, ttl) {
                channel.latency = prev.latency;
                channel.latency_measured_at = Some(measured_at);
            }
            channel
        })
        .collect()
}

fn is_within(measured_at: DateTime<Utc>, now: DateTime<Utc>, ttl: Duration) -> bool {
    match now.signed_duration_since(measured_at).to_std() {
        Ok(age) => age < ttl,
        // Negative age: measured "after" now (clock skew)
        Err(_) => true,
    }
}
