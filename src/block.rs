//! Block state transitions on a single tracking record.
//!
//! None of these fail: they are plain state changes. The only thing a caller
//! ever observes is a deny decision carrying a retry-after.

use crate::clock::deadline;
use crate::policy::EndpointProfile;
use crate::rate_limit::TrackingRecord;
use std::time::{Duration, Instant};

/// Count written by a forced block, far above any real profile limit.
pub const FORCED_BLOCK_COUNT: u32 = u32::MAX;

/// Returns the remaining block time if `record` is blocked at `now`.
///
/// An expired block is cleared on the spot (unblocked, count reset, fresh
/// window), so callers never see stale blocked state.
pub fn active_block(record: &mut TrackingRecord, now: Instant) -> Option<Duration> {
    if !record.blocked {
        return None;
    }

    match record.blocked_until {
        Some(until) if now < until => Some(until - now),
        _ => {
            clear(record, now);
            None
        }
    }
}

pub fn trigger_block(record: &mut TrackingRecord, profile: &EndpointProfile, now: Instant) {
    record.blocked = true;
    record.blocked_until = Some(deadline(now, profile.block_duration));
    record.blocks = record.blocks.saturating_add(1);
}

pub fn force_block(record: &mut TrackingRecord, duration: Duration, now: Instant) {
    record.count = FORCED_BLOCK_COUNT;
    record.blocked = true;
    record.blocked_until = Some(deadline(now, duration));
    record.blocks = record.blocks.saturating_add(1);
    record.last_seen = now;
}

// Returns whether the record was blocked before
pub fn force_unblock(record: &mut TrackingRecord, now: Instant) -> bool {
    let was_blocked = record.blocked;
    clear(record, now);
    was_blocked
}

fn clear(record: &mut TrackingRecord, now: Instant) {
    record.blocked = false;
    record.blocked_until = None;
    record.count = 0;
    record.window_start = now;
}
