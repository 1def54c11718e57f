mod check;
mod health;
mod limit;
mod metrics;
mod stats;

pub use check::{CheckRequest, CheckResponse, check_handler};
pub use health::health_handler;
pub use limit::{ErrorResponse, rate_limit};
pub use metrics::metrics_handler;
pub use stats::stats_handler;

use std::time::Duration;

// Whole seconds, rounded up so clients never retry early
pub(crate) fn ceil_secs(d: Duration) -> u64 {
    d.as_secs().saturating_add(u64::from(d.subsec_nanos() > 0))
}
