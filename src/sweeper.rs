//! Periodic eviction of stale tracking records.

use crate::block;
use crate::engine::RateLimitEngine;
use crate::error::ConfigError;
use crate::store::KeyStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

/// Eviction schedule and staleness threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweeperConfig {
    /// Time between sweeps (default: 1 hour)
    #[serde(default = "default_interval", rename = "sweep_interval_secs", with = "secs")]
    pub interval: Duration,

    /// Windows of inactivity after which a record is dropped (default: 24)
    #[serde(default = "default_stale_windows")]
    pub stale_windows: u32,
}

fn default_interval() -> Duration {
    Duration::from_secs(60 * 60)
}

fn default_stale_windows() -> u32 {
    24
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval: default_interval(),
            stale_windows: default_stale_windows(),
        }
    }
}

impl SweeperConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval.is_zero() {
            return Err(ConfigError::InvalidSweepInterval);
        }
        if self.stale_windows == 0 {
            return Err(ConfigError::InvalidStaleWindows);
        }
        Ok(())
    }
}

mod secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub scanned: usize,
    pub evicted: usize,
    pub unblocked: usize,
}

// Keys that looked sweepable when the store was scanned
#[derive(Debug, Default)]
struct Candidates {
    scanned: usize,
    stale: Vec<String>,
    expired: Vec<String>,
}

/// One eviction pass.
///
/// Candidates are collected with per-shard iteration first, then each one is
/// re-checked under its own lock before it is removed or unblocked, so the
/// store is never locked as a whole and records touched in the meantime
/// survive.
pub fn sweep(store: &KeyStore, now: Instant, stale_windows: u32) -> SweepReport {
    let candidates = scan(store, now, stale_windows);
    apply(store, candidates, now, stale_windows)
}

fn scan(store: &KeyStore, now: Instant, stale_windows: u32) -> Candidates {
    let mut candidates = Candidates::default();
    store.for_each(|key, record| {
        candidates.scanned += 1;
        if record.is_stale(now, stale_windows) {
            candidates.stale.push(key.to_string());
        } else if record.blocked && record.blocked_until.is_none_or(|until| now >= until) {
            candidates.expired.push(key.to_string());
        }
    });
    candidates
}

fn apply(
    store: &KeyStore,
    candidates: Candidates,
    now: Instant,
    stale_windows: u32,
) -> SweepReport {
    let mut report = SweepReport {
        scanned: candidates.scanned,
        ..Default::default()
    };

    for key in candidates.stale {
        if store.remove_if(&key, |record| record.is_stale(now, stale_windows)) {
            report.evicted += 1;
        }
    }

    for key in candidates.expired {
        let cleared = store.update_raw(&key, |record| {
            record.blocked && block::active_block(record, now).is_none()
        });
        if cleared == Some(true) {
            report.unblocked += 1;
        }
    }

    report
}

/// Handle to the background sweep task.
///
/// `stop` ends the task and waits for it; dropping the handle closes the
/// cancellation channel, which ends the task as well.
pub struct SweeperHandle {
    cancel: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    pub(crate) fn spawn(engine: Arc<RateLimitEngine>, period: Duration) -> Self {
        let (cancel, mut cancel_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // first tick completes immediately
            ticker.tick().await;

            info!(interval = ?period, "Eviction sweeper started");
            loop {
                tokio::select! {
                    _ = &mut cancel_rx => break,
                    _ = ticker.tick() => {
                        let report = engine.sweep();
                        debug!(?report, "Sweep finished");
                    }
                }
            }
            info!("Eviction sweeper stopped");
        });

        Self { cancel, task }
    }

    pub async fn stop(self) {
        let Self { cancel, task } = self;
        let _ = cancel.send(());
        if let Err(e) = task.await {
            warn!(error = %e, "Eviction sweeper task failed");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
