//! The admission-control engine: decides allow or deny per request.

use crate::block;
use crate::clock::{Clock, SystemClock};
use crate::error::ConfigError;
use crate::metrics::{BLOCKS_TOTAL, DECISIONS_TOTAL, EVICTIONS_TOTAL, TRACKED_KEYS};
use crate::policy::{EndpointProfile, PolicyTable, ProfileId};
use crate::rate_limit::RateKey;
use crate::stats::{self, Stats};
use crate::store::KeyStore;
use crate::sweeper::{self, SweepReport, SweeperConfig, SweeperHandle};
use crate::window::{self, WindowOutcome};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Outcome of [`RateLimitEngine::check_request`]. A deny is a normal
/// result, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    /// `max_requests` of the profile that made the decision
    pub limit: u32,
    /// Requests left in the current window, set on allow
    pub remaining: Option<u32>,
    /// How long the caller should wait, set on deny
    pub retry_after: Option<Duration>,
    /// Time until the current window (or block) ends
    pub reset_after: Duration,
}

impl Decision {
    fn allow(profile: &EndpointProfile, remaining: u32, reset_after: Duration) -> Self {
        Self {
            allowed: true,
            limit: profile.max_requests,
            remaining: Some(remaining),
            retry_after: None,
            reset_after,
        }
    }

    fn deny(profile: &EndpointProfile, retry_after: Duration) -> Self {
        Self {
            allowed: false,
            limit: profile.max_requests,
            remaining: None,
            retry_after: Some(retry_after),
            reset_after: retry_after,
        }
    }
}

// What happened under the record lock; logged after the lock is released
enum Verdict {
    Allowed { remaining: u32, reset_after: Duration },
    Blocked { retry_after: Duration },
    Triggered,
}

pub struct RateLimitEngine {
    store: KeyStore,
    policies: PolicyTable,
    sweeper: SweeperConfig,
    clock: Arc<dyn Clock>,
}

impl RateLimitEngine {
    pub fn new(policies: PolicyTable, sweeper: SweeperConfig) -> Result<Self, ConfigError> {
        Self::with_clock(policies, sweeper, Arc::new(SystemClock))
    }

    pub fn with_clock(
        policies: PolicyTable,
        sweeper: SweeperConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        sweeper.validate()?;
        Ok(Self {
            store: KeyStore::new(),
            policies,
            sweeper,
            clock,
        })
    }

    pub fn policies(&self) -> &PolicyTable {
        &self.policies
    }

    pub fn store(&self) -> &KeyStore {
        &self.store
    }

    pub fn sweeper_config(&self) -> SweeperConfig {
        self.sweeper
    }

    /// Profile behind `id`, or the table's fallback profile if `id` was
    /// issued by another table.
    pub fn profile(&self, id: ProfileId) -> &EndpointProfile {
        self.policies.get(id).unwrap_or_else(|| {
            let fallback = self.policies.fallback();
            error!(
                ?id,
                fallback = %fallback.name,
                "Profile id belongs to another policy table, using fallback profile"
            );
            fallback
        })
    }

    /// Decide whether `identity` may make a request to `route`.
    ///
    /// Block check, window update and block transition all happen under the
    /// key's lock, so concurrent calls for one key never over- or under-count.
    pub fn check_request(&self, identity: &str, route: &str, profile_id: ProfileId) -> Decision {
        let profile = self.profile(profile_id);
        let key = RateKey::new(identity, route);
        let now = self.clock.now();

        let verdict = self.store.update(&key, route, profile.window, now, |record| {
            record.last_seen = now;
            record.window = profile.window;

            if let Some(retry_after) = block::active_block(record, now) {
                return Verdict::Blocked { retry_after };
            }

            match window::advance(record, now, profile) {
                WindowOutcome::Within {
                    remaining,
                    reset_after,
                } => Verdict::Allowed {
                    remaining,
                    reset_after,
                },
                WindowOutcome::OverLimit => {
                    block::trigger_block(record, profile, now);
                    Verdict::Triggered
                }
            }
        });

        match verdict {
            Verdict::Allowed {
                remaining,
                reset_after,
            } => {
                DECISIONS_TOTAL.with_label_values(&["allowed"]).inc();
                debug!(%key, profile = %profile.name, remaining, "Request allowed");
                Decision::allow(profile, remaining, reset_after)
            }
            Verdict::Blocked { retry_after } => {
                DECISIONS_TOTAL.with_label_values(&["denied"]).inc();
                info!(
                    %key,
                    profile = %profile.name,
                    retry_after_secs = retry_after.as_secs(),
                    "Request denied, key is blocked"
                );
                Decision::deny(profile, retry_after)
            }
            Verdict::Triggered => {
                DECISIONS_TOTAL.with_label_values(&["denied"]).inc();
                BLOCKS_TOTAL.with_label_values(&[profile.name.as_str()]).inc();
                warn!(
                    %key,
                    profile = %profile.name,
                    max_requests = profile.max_requests,
                    block_secs = profile.block_duration.as_secs(),
                    "Rate limit exceeded, blocking key"
                );
                Decision::deny(profile, profile.block_duration)
            }
        }
    }

    /// Name-based variant of [`RateLimitEngine::check_request`] for callers
    /// that did not resolve their profile at startup.
    pub fn check_named(
        &self,
        identity: &str,
        route: &str,
        profile: &str,
    ) -> Result<Decision, ConfigError> {
        let id = self.policies.resolve(profile)?;
        Ok(self.check_request(identity, route, id))
    }

    /// True iff the key is blocked right now. Clears an expired block and
    /// never creates a record.
    pub fn is_blocked(&self, identity: &str, route: &str) -> bool {
        let key = RateKey::new(identity, route);
        let now = self.clock.now();
        self.store
            .update_existing(&key, |record| block::active_block(record, now).is_some())
            .unwrap_or(false)
    }

    pub fn force_block(&self, identity: &str, route: &str, duration: Duration) {
        let key = RateKey::new(identity, route);
        let now = self.clock.now();
        let window = self.policies.longest_window();
        self.store.update(&key, route, window, now, |record| {
            block::force_block(record, duration, now)
        });
        warn!(%key, duration_secs = duration.as_secs(), "Key force-blocked");
    }

    /// Returns whether the key was blocked before the call.
    pub fn force_unblock(&self, identity: &str, route: &str) -> bool {
        let key = RateKey::new(identity, route);
        let now = self.clock.now();
        let was_blocked = self
            .store
            .update_existing(&key, |record| block::force_unblock(record, now))
            .unwrap_or(false);
        if was_blocked {
            info!(%key, "Key force-unblocked");
        }
        was_blocked
    }

    pub fn stats(&self) -> Stats {
        let stats = stats::collect(&self.store, self.clock.now());
        TRACKED_KEYS.set(stats.total_entries as i64);
        stats
    }

    pub fn sweep(&self) -> SweepReport {
        let report = sweeper::sweep(&self.store, self.clock.now(), self.sweeper.stale_windows);
        EVICTIONS_TOTAL.inc_by(report.evicted as u64);
        TRACKED_KEYS.set(self.store.len() as i64);
        if report.evicted > 0 || report.unblocked > 0 {
            info!(
                scanned = report.scanned,
                evicted = report.evicted,
                unblocked = report.unblocked,
                "Evicted stale rate limit state"
            );
        }
        report
    }

    /// Start the periodic sweeper. Must be called from within a tokio runtime.
    pub fn spawn_sweeper(self: &Arc<Self>) -> SweeperHandle {
        SweeperHandle::spawn(Arc::clone(self), self.sweeper.interval)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::policy::AUTH;

    fn engine() -> (RateLimitEngine, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let engine = RateLimitEngine::with_clock(
            PolicyTable::default(),
            SweeperConfig::default(),
            clock.clone(),
        )
        .unwrap();
        (engine, clock)
    }

    #[test]
    fn check_named_rejects_unknown_profile() {
        let (engine, _) = engine();
        assert!(matches!(
            engine.check_named("1.2.3.4", "/", "nope"),
            Err(ConfigError::UnknownProfile(_))
        ));
        assert!(engine.check_named("1.2.3.4", "/", AUTH).unwrap().allowed);
    }

    #[test]
    fn is_blocked_does_not_create_records() {
        let (engine, _) = engine();
        assert!(!engine.is_blocked("1.2.3.4", "/"));
        assert!(engine.store().is_empty());
    }

    #[test]
    fn is_blocked_clears_expired_block() {
        let (engine, clock) = engine();
        engine.force_block("1.2.3.4", "/", Duration::from_secs(10));
        assert!(engine.is_blocked("1.2.3.4", "/"));

        clock.advance(Duration::from_secs(10));
        assert!(!engine.is_blocked("1.2.3.4", "/"));
        let record = engine.store().get(&RateKey::new("1.2.3.4", "/")).unwrap();
        assert!(!record.blocked);
        assert_eq!(record.count, 0);
    }

    #[test]
    fn allowed_decision_reports_window_reset() {
        let (engine, clock) = engine();
        let auth = engine.policies().resolve(AUTH).unwrap();

        engine.check_request("1.2.3.4", "/login", auth);
        clock.advance(Duration::from_secs(100));
        let d = engine.check_request("1.2.3.4", "/login", auth);
        assert_eq!(d.limit, 10);
        assert_eq!(d.reset_after, Duration::from_secs(500));
    }

    #[test]
    fn rejects_invalid_sweeper_config() {
        let config = SweeperConfig {
            stale_windows: 0,
            ..Default::default()
        };
        assert!(RateLimitEngine::new(PolicyTable::default(), config).is_err());
    }
}
