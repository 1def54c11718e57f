use std::fmt;
use std::time::{Duration, Instant};

// Separates the escaped identity from the route inside a key
pub const KEY_SEPARATOR: char = ':';

// Composite key: escaped client identity + ":" + route.
// '%' and ':' in the identity are percent-escaped so the first ':' is always
// the separator, e.g. ("1.2.3.4:admin", "x") and ("1.2.3.4", "admin:x")
// produce different keys and IPv6 identities need no special casing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RateKey(String);

impl RateKey {
    pub fn new(identity: &str, route: &str) -> Self {
        let mut key = String::with_capacity(identity.len() + route.len() + 1);
        for c in identity.chars() {
            match c {
                '%' => key.push_str("%25"),
                KEY_SEPARATOR => key.push_str("%3A"),
                c => key.push(c),
            }
        }
        key.push(KEY_SEPARATOR);
        key.push_str(route);
        Self(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// Rate limit entry - tracks requests per identity/route key.
// Owned by the key store; callers only ever see copies of decision data.
#[derive(Debug, Clone)]
pub struct TrackingRecord {
    pub route: String,
    pub count: u32,
    pub window_start: Instant,
    pub blocked: bool,
    // Set only while `blocked` is true
    pub blocked_until: Option<Instant>,
    // Window of the profile that last touched this record, used for staleness
    pub window: Duration,
    pub last_seen: Instant,
    pub total_requests: u64,
    pub blocks: u64,
}

impl TrackingRecord {
    pub fn new(route: &str, window: Duration, now: Instant) -> Self {
        Self {
            route: route.to_string(),
            count: 0,
            window_start: now,
            blocked: false,
            blocked_until: None,
            window,
            last_seen: now,
            total_requests: 0,
            blocks: 0,
        }
    }

    // Latest point in time the record was relevant: its last access or the
    // end of its block, whichever is later.
    pub fn last_activity(&self) -> Instant {
        match self.blocked_until {
            Some(until) if until > self.last_seen => until,
            _ => self.last_seen,
        }
    }

    pub fn is_stale(&self, now: Instant, stale_windows: u32) -> bool {
        let idle = now.saturating_duration_since(self.last_activity());
        idle >= self.window.saturating_mul(stale_windows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_joins_identity_and_route() {
        assert_eq!(RateKey::new("1.2.3.4", "/login").as_str(), "1.2.3.4:/login");
    }

    #[test]
    fn key_escaping_prevents_collisions() {
        let a = RateKey::new("1.2.3.4:admin", "x");
        let b = RateKey::new("1.2.3.4", "admin:x");
        assert_ne!(a, b);
        assert_eq!(a.as_str(), "1.2.3.4%3Aadmin:x");

        // an identity that already looks escaped stays distinct
        let c = RateKey::new("1.2.3.4%3Aadmin", "x");
        assert_ne!(a, c);
    }

    #[test]
    fn ipv6_identities_are_accepted() {
        let key = RateKey::new("::1", "/api");
        assert_eq!(key.as_str(), "%3A%3A1:/api");
    }

    #[test]
    fn staleness_counts_whole_windows_of_inactivity() {
        let now = Instant::now();
        let record = TrackingRecord::new("/", Duration::from_secs(60), now);

        assert!(!record.is_stale(now + Duration::from_secs(60 * 24 - 1), 24));
        assert!(record.is_stale(now + Duration::from_secs(60 * 24), 24));
    }

    #[test]
    fn active_block_keeps_record_fresh() {
        let now = Instant::now();
        let mut record = TrackingRecord::new("/", Duration::from_secs(1), now);
        record.blocked = true;
        record.blocked_until = Some(now + Duration::from_secs(100));

        assert!(!record.is_stale(now + Duration::from_secs(50), 2));
        assert!(record.is_stale(now + Duration::from_secs(102), 2));
    }
}
