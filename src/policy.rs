//! Endpoint profiles and the policy table that maps profile names to limits.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

pub const NORMAL: &str = "normal";
pub const AUTH: &str = "auth";
pub const API: &str = "api";
pub const SENSITIVE: &str = "sensitive";

/// Upper bound for a profile's window and block duration.
pub const MAX_PROFILE_DURATION: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Limiting parameters for one class of routes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointProfile {
    pub name: String,
    /// Length of the counting window
    pub window: Duration,
    /// Requests permitted within one window before blocking
    pub max_requests: u32,
    /// How long a violating identity stays blocked
    pub block_duration: Duration,
}

impl EndpointProfile {
    pub fn new(name: &str, window: Duration, max_requests: u32, block_duration: Duration) -> Self {
        Self {
            name: name.to_string(),
            window,
            max_requests,
            block_duration,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidProfile {
            name: self.name.clone(),
            reason: reason.to_string(),
        };

        if self.name.trim().is_empty() {
            return Err(invalid("name must not be empty"));
        }
        if self.max_requests == 0 {
            return Err(invalid("max_requests must be greater than zero"));
        }
        if self.window.is_zero() {
            return Err(invalid("window must be greater than zero"));
        }
        if self.block_duration.is_zero() {
            return Err(invalid("block duration must be greater than zero"));
        }
        if self.window > MAX_PROFILE_DURATION {
            return Err(invalid("window must not exceed 365 days"));
        }
        if self.block_duration > MAX_PROFILE_DURATION {
            return Err(invalid("block duration must not exceed 365 days"));
        }
        Ok(())
    }
}

/// Profile as it appears in a JSON profile file; durations are in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileSpec {
    pub name: String,
    pub window_secs: u64,
    pub max_requests: u32,
    pub block_secs: u64,
}

impl From<ProfileSpec> for EndpointProfile {
    fn from(spec: ProfileSpec) -> Self {
        EndpointProfile {
            name: spec.name,
            window: Duration::from_secs(spec.window_secs),
            max_requests: spec.max_requests,
            block_duration: Duration::from_secs(spec.block_secs),
        }
    }
}

/// Handle to a profile in a [`PolicyTable`], obtained once via
/// [`PolicyTable::resolve`]. Only valid for the table that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProfileId {
    table: u64,
    index: usize,
}

static NEXT_TABLE_ID: AtomicU64 = AtomicU64::new(1);

fn next_table_id() -> u64 {
    NEXT_TABLE_ID.fetch_add(1, Ordering::Relaxed)
}

/// Immutable table of endpoint profiles, fixed at startup. Never empty.
#[derive(Debug, Clone)]
pub struct PolicyTable {
    id: u64,
    profiles: Vec<EndpointProfile>,
}

impl PolicyTable {
    pub fn new(profiles: Vec<EndpointProfile>) -> Result<Self, ConfigError> {
        if profiles.is_empty() {
            return Err(ConfigError::EmptyTable);
        }

        for (i, profile) in profiles.iter().enumerate() {
            profile.validate()?;
            if profiles[..i].iter().any(|p| p.name == profile.name) {
                return Err(ConfigError::DuplicateProfile(profile.name.clone()));
            }
        }

        Ok(Self {
            id: next_table_id(),
            profiles,
        })
    }

    pub fn resolve(&self, name: &str) -> Result<ProfileId, ConfigError> {
        self.profiles
            .iter()
            .position(|p| p.name == name)
            .map(|index| ProfileId {
                table: self.id,
                index,
            })
            .ok_or_else(|| ConfigError::UnknownProfile(name.to_string()))
    }

    /// `None` if `id` was issued by a different table.
    pub fn get(&self, id: ProfileId) -> Option<&EndpointProfile> {
        if id.table != self.id {
            return None;
        }
        self.profiles.get(id.index)
    }

    /// Profile applied when a lookup misses: the first one in the table.
    pub fn fallback(&self) -> &EndpointProfile {
        // `new` and `default` both refuse to build an empty table
        &self.profiles[0]
    }

    pub fn profiles(&self) -> &[EndpointProfile] {
        &self.profiles
    }

    // Window used for records created outside of a profile (forced blocks).
    // The longest one keeps such records around the longest.
    pub fn longest_window(&self) -> Duration {
        self.profiles
            .iter()
            .map(|p| p.window)
            .max()
            .unwrap_or_default()
    }
}

impl Default for PolicyTable {
    fn default() -> Self {
        const MINUTE: u64 = 60;
        Self {
            id: next_table_id(),
            profiles: vec![
                EndpointProfile::new(
                    NORMAL,
                    Duration::from_secs(15 * MINUTE),
                    100,
                    Duration::from_secs(15 * MINUTE),
                ),
                EndpointProfile::new(
                    AUTH,
                    Duration::from_secs(10 * MINUTE),
                    10,
                    Duration::from_secs(30 * MINUTE),
                ),
                EndpointProfile::new(
                    API,
                    Duration::from_secs(MINUTE),
                    60,
                    Duration::from_secs(5 * MINUTE),
                ),
                EndpointProfile::new(
                    SENSITIVE,
                    Duration::from_secs(15 * MINUTE),
                    20,
                    Duration::from_secs(60 * MINUTE),
                ),
            ],
        }
    }
}
