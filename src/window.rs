use crate::clock::deadline;
use crate::policy::EndpointProfile;
use crate::rate_limit::TrackingRecord;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowOutcome {
    Within {
        remaining: u32,
        // Time until the current window rolls over
        reset_after: Duration,
    },
    // Caller escalates to the block manager
    OverLimit,
}

// Fixed window counter: roll the window if it expired, count the request,
// compare against the profile. Must run under the record's lock.
pub fn advance(
    record: &mut TrackingRecord,
    now: Instant,
    profile: &EndpointProfile,
) -> WindowOutcome {
    if now.saturating_duration_since(record.window_start) >= profile.window {
        record.count = 0;
        record.window_start = now;
    }

    record.count = record.count.saturating_add(1);
    record.total_requests = record.total_requests.saturating_add(1);

    if record.count > profile.max_requests {
        return WindowOutcome::OverLimit;
    }

    let window_end = deadline(record.window_start, profile.window);
    WindowOutcome::Within {
        remaining: profile.max_requests - record.count,
        reset_after: window_end.saturating_duration_since(now),
    }
}
