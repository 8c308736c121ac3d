//! Property tests for the latency overlay merge.

use chrono::{DateTime, TimeDelta, Utc};
use proptest::prelude::*;
use proxydash::api::Channel;
use proxydash::sync::merge_channels;
use std::time::Duration;

const TTL: Duration = Duration::from_secs(300);

fn now() -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000, 0).unwrap()
}

/// (index, optional (latency, age in seconds))
fn channel_strategy() -> impl Strategy<Value = (u32, Option<(u64, i64)>)> {
    (0u32..20, proptest::option::of((0u64..5_000, -60i64..900)))
}

fn build(shape: &[(u32, Option<(u64, i64)>)]) -> Vec<Channel> {
    shape
        .iter()
        .map(|(index, measurement)| {
            let mut channel = Channel::new(*index, format!("ch-{index}"));
            if let Some((latency, age)) = measurement {
                channel.latency = Some(*latency);
                channel.latency_measured_at = Some(now() - TimeDelta::seconds(*age));
            }
            channel
        })
        .collect()
}

proptest! {
    #[test]
    fn merge_with_itself_is_identity(
        shape in proptest::collection::vec(channel_strategy(), 0..12),
    ) {
        // Index is the identity; keep it unique like the proxy does
        let mut seen = std::collections::HashSet::new();
        let shape: Vec<_> = shape.into_iter().filter(|(i, _)| seen.insert(*i)).collect();

        let list = build(&shape);
        prop_assert_eq!(merge_channels(list.clone(), &list, now(), TTL), list);
    }

    #[test]
    fn merge_keeps_fresh_membership_and_order(
        fresh in proptest::collection::vec(channel_strategy(), 0..12),
        previous in proptest::collection::vec(channel_strategy(), 0..12),
    ) {
        let fresh = build(&fresh);
        let previous = build(&previous);
        let merged = merge_channels(fresh.clone(), &previous, now(), TTL);

        let fresh_indices: Vec<u32> = fresh.iter().map(|c| c.index).collect();
        let merged_indices: Vec<u32> = merged.iter().map(|c| c.index).collect();
        prop_assert_eq!(merged_indices, fresh_indices);

        for (out, input) in merged.iter().zip(&fresh) {
            prop_assert_eq!(&out.name, &input.name);
            // A carried-over measurement is never older than the window
            if out.latency_measured_at != input.latency_measured_at {
                let measured = out.latency_measured_at.unwrap();
                prop_assert!(now() - measured < TimeDelta::seconds(300));
            }
        }
    }
}
