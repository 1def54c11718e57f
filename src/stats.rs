use crate::store::KeyStore;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Instant;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RouteStats {
    // Requests seen by the live records of this route
    pub requests: u64,
    // Keys currently blocked on this route
    pub blocked: u64,
    // Blocks ever placed on the live records of this route, forced ones included
    pub blocks: u64,
}

/// Read-only snapshot of the key store for observability endpoints.
///
/// Built with per-shard iteration, so it is eventually consistent under
/// concurrent traffic rather than an exact point-in-time view.
#[derive(Debug, Clone, Serialize)]
pub struct Stats {
    pub total_entries: usize,
    pub blocked_count: usize,
    pub per_route: BTreeMap<String, RouteStats>,
    pub generated_at: DateTime<Utc>,
}

pub fn collect(store: &KeyStore, now: Instant) -> Stats {
    let mut total_entries = 0;
    let mut blocked_count = 0;
    let mut per_route: BTreeMap<String, RouteStats> = BTreeMap::new();

    store.for_each(|_, record| {
        total_entries += 1;
        // expired blocks count as unblocked even before they are lazily cleared
        let blocked = record.blocked && record.blocked_until.is_some_and(|until| now < until);

        let route = per_route.entry(record.route.clone()).or_default();
        route.requests += record.total_requests;
        route.blocks += record.blocks;
        if blocked {
            blocked_count += 1;
            route.blocked += 1;
        }
    });

    Stats {
        total_entries,
        blocked_count,
        per_route,
        generated_at: Utc::now(),
    }
}
