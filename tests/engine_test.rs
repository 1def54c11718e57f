//! Behavioural tests for the admission-control engine, driven by a manual clock.

use rate_guard::clock::ManualClock;
use rate_guard::policy::AUTH;
use rate_guard::{EndpointProfile, PolicyTable, ProfileId, RateLimitEngine, SweeperConfig};
use std::sync::Arc;
use std::time::Duration;

const MINUTE: Duration = Duration::from_secs(60);

fn engine_with(profiles: Vec<EndpointProfile>) -> (Arc<RateLimitEngine>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new());
    let engine = RateLimitEngine::with_clock(
        PolicyTable::new(profiles).unwrap(),
        SweeperConfig::default(),
        clock.clone(),
    )
    .unwrap();
    (Arc::new(engine), clock)
}

fn single(max: u32) -> (Arc<RateLimitEngine>, Arc<ManualClock>, ProfileId) {
    let (engine, clock) = engine_with(vec![EndpointProfile::new("test", MINUTE, max, 5 * MINUTE)]);
    let id = engine.policies().resolve("test").unwrap();
    (engine, clock, id)
}

#[test]
fn exactly_n_requests_allowed_per_window() {
    let (engine, _, id) = single(5);

    for i in 0..5 {
        assert!(
            engine.check_request("10.0.0.1", "/", id).allowed,
            "Request {} should be allowed",
            i + 1
        );
    }
    let sixth = engine.check_request("10.0.0.1", "/", id);
    assert!(!sixth.allowed);
    assert_eq!(sixth.retry_after, Some(5 * MINUTE));
    assert_eq!(sixth.remaining, None);
}

#[test]
fn retry_after_shrinks_until_block_expires() {
    let (engine, clock, id) = single(1);

    assert!(engine.check_request("10.0.0.1", "/", id).allowed);
    let first = engine.check_request("10.0.0.1", "/", id);
    assert!(!first.allowed);

    let mut last = first.retry_after.unwrap();
    for _ in 0..4 {
        clock.advance(MINUTE);
        let d = engine.check_request("10.0.0.1", "/", id);
        assert!(!d.allowed);
        let retry = d.retry_after.unwrap();
        assert!(retry < last, "{retry:?} should be below {last:?}");
        last = retry;
    }

    clock.advance(MINUTE);
    let after = engine.check_request("10.0.0.1", "/", id);
    assert!(after.allowed);
    assert_eq!(after.remaining, Some(0));
    let record = engine
        .store()
        .get(&rate_guard::rate_limit::RateKey::new("10.0.0.1", "/"))
        .unwrap();
    assert_eq!(record.count, 1);
}

#[test]
fn blocking_one_key_leaves_others_alone() {
    let (engine, _, id) = single(1);

    engine.check_request("A", "/r", id);
    assert!(!engine.check_request("A", "/r", id).allowed);

    assert!(engine.check_request("B", "/r", id).allowed);
    assert!(engine.check_request("A", "/s", id).allowed);
    assert!(engine.is_blocked("A", "/r"));
    assert!(!engine.is_blocked("B", "/r"));
    assert!(!engine.is_blocked("A", "/s"));
}

#[test]
fn separator_in_identity_does_not_collide() {
    let (engine, _, id) = single(1);

    engine.check_request("1.2.3.4:admin", "x", id);
    assert!(!engine.check_request("1.2.3.4:admin", "x", id).allowed);
    assert!(engine.check_request("1.2.3.4", "admin:x", id).allowed);
}

#[test]
fn force_block_and_unblock_take_effect_immediately() {
    let (engine, _, id) = single(100);

    assert!(engine.check_request("10.0.0.9", "/", id).allowed);
    engine.force_block("10.0.0.9", "/", Duration::from_secs(3600));
    assert!(engine.is_blocked("10.0.0.9", "/"));

    let denied = engine.check_request("10.0.0.9", "/", id);
    assert!(!denied.allowed);
    assert!(denied.retry_after.unwrap() <= Duration::from_secs(3600));

    assert!(engine.force_unblock("10.0.0.9", "/"));
    assert!(!engine.is_blocked("10.0.0.9", "/"));
    assert_eq!(engine.check_request("10.0.0.9", "/", id).remaining, Some(99));
}

#[test]
fn force_block_works_for_unseen_keys() {
    let (engine, _, _) = single(10);

    engine.force_block("192.0.2.1", "/", MINUTE);
    assert!(engine.is_blocked("192.0.2.1", "/"));
    assert!(!engine.force_unblock("192.0.2.2", "/"));
}

#[test]
fn unbounded_force_block_holds_without_panicking() {
    let (engine, clock, id) = single(10);

    engine.force_block("198.51.100.7", "/", Duration::MAX);
    clock.advance(Duration::from_secs(365 * 24 * 3600));

    let denied = engine.check_request("198.51.100.7", "/", id);
    assert!(!denied.allowed);
    assert!(denied.retry_after.unwrap() > Duration::from_secs(365 * 24 * 3600));
    assert!(engine.is_blocked("198.51.100.7", "/"));
}

#[test]
fn profile_id_from_another_table_falls_back() {
    let (engine, _, _) = single(2);
    let foreign = PolicyTable::default().resolve(AUTH).unwrap();

    assert_eq!(engine.profile(foreign).name, "test");
    let first = engine.check_request("10.0.0.3", "/login", foreign);
    assert!(first.allowed);
    assert_eq!(first.limit, 2);
    assert_eq!(first.remaining, Some(1));
}

#[test]
fn login_scenario_with_default_profiles() {
    let clock = Arc::new(ManualClock::new());
    let engine =
        RateLimitEngine::with_clock(PolicyTable::default(), SweeperConfig::default(), clock.clone())
            .unwrap();
    let auth = engine.policies().resolve(AUTH).unwrap();

    for expected in (0..10u32).rev() {
        let d = engine.check_request("1.2.3.4", "/login", auth);
        assert!(d.allowed);
        assert_eq!(d.remaining, Some(expected));
    }

    let eleventh = engine.check_request("1.2.3.4", "/login", auth);
    assert!(!eleventh.allowed);
    assert_eq!(eleventh.retry_after, Some(Duration::from_secs(1800)));

    clock.advance(Duration::from_secs(1800));
    let next = engine.check_request("1.2.3.4", "/login", auth);
    assert!(next.allowed);
    assert_eq!(next.remaining, Some(9));
}

#[test]
fn concurrent_calls_for_one_key_never_overcount() {
    const N: usize = 50;
    let (engine, _, id) = single(N as u32);

    let outcomes: Vec<bool> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..2 * N)
            .map(|_| {
                let engine = &engine;
                s.spawn(move || engine.check_request("203.0.113.5", "/api", id).allowed)
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let allowed = outcomes.iter().filter(|a| **a).count();
    assert_eq!(allowed, N);
    assert_eq!(outcomes.len() - allowed, N);
}

#[test]
fn stats_reflect_blocked_keys_per_route() {
    let (engine, _, id) = single(1);

    engine.check_request("A", "/login", id);
    engine.check_request("A", "/login", id);
    engine.check_request("B", "/login", id);
    engine.check_request("A", "/", id);

    let stats = engine.stats();
    assert_eq!(stats.total_entries, 3);
    assert_eq!(stats.blocked_count, 1);
    assert_eq!(stats.per_route["/login"].requests, 3);
    assert_eq!(stats.per_route["/login"].blocked, 1);
    assert_eq!(stats.per_route["/login"].blocks, 1);
    assert_eq!(stats.per_route["/"].requests, 1);
    assert_eq!(stats.per_route["/"].blocked, 0);

    engine.force_unblock("A", "/login");
    engine.force_block("A", "/login", MINUTE);
    let stats = engine.stats();
    assert_eq!(stats.per_route["/login"].blocks, 2);
    assert_eq!(stats.per_route["/"].blocks, 0);
}

#[test]
fn sweep_evicts_idle_keys_and_is_idempotent() {
    let (engine, clock, id) = single(10);

    engine.check_request("idle", "/", id);
    clock.advance(MINUTE * 20);
    engine.check_request("busy", "/", id);
    clock.advance(MINUTE * 4);

    let first = engine.sweep();
    assert_eq!(first.evicted, 1);
    let second = engine.sweep();
    assert_eq!(second.evicted, 0);

    assert_eq!(engine.store().len(), 1);
    assert!(engine.check_request("busy", "/", id).allowed);
}

#[test]
fn sweep_keeps_keys_with_active_blocks() {
    let (engine, clock, id) = single(1);

    engine.check_request("A", "/", id);
    engine.check_request("A", "/", id);
    engine.force_block("A", "/", MINUTE * 48);

    clock.advance(MINUTE * 30);
    assert_eq!(engine.sweep().evicted, 0);
    assert!(engine.is_blocked("A", "/"));
}
