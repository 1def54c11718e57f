use crate::error::ConfigError;
use crate::policy::{EndpointProfile, PolicyTable, ProfileSpec};
use crate::sweeper::SweeperConfig;
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

// CLI argument structure
#[derive(Parser, Debug, Clone)]
#[command(name = "rate-guard")]
#[command(about = "Adaptive rate limiting and admission control service")]
pub struct Args {
    // Port to run the server on
    #[arg(short, long, default_value_t = 8080)]
    pub port: u16,

    // JSON file with the profile table and sweeper settings
    #[arg(long)]
    pub profiles: Option<PathBuf>,

    // Seconds between eviction sweeps (overrides the file)
    #[arg(long)]
    pub sweep_interval: Option<u64>,

    // Windows of inactivity before a key is evicted (overrides the file)
    #[arg(long)]
    pub stale_windows: Option<u32>,
}

// Profile file format, e.g.
// { "profiles": [{ "name": "auth", "window_secs": 600, "max_requests": 10, "block_secs": 1800 }],
//   "sweep_interval_secs": 3600, "stale_windows": 24 }
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub profiles: Option<Vec<ProfileSpec>>,

    #[serde(flatten)]
    pub sweeper: SweeperConfig,
}

// Everything the engine needs; immutable once built
#[derive(Debug, Clone)]
pub struct Settings {
    pub policies: PolicyTable,
    pub sweeper: SweeperConfig,
}

impl FileConfig {
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::ParseFile {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn into_settings(self) -> Result<Settings, ConfigError> {
        let policies = match self.profiles {
            Some(specs) => {
                PolicyTable::new(specs.into_iter().map(EndpointProfile::from).collect())?
            }
            None => PolicyTable::default(),
        };
        self.sweeper.validate()?;
        Ok(Settings {
            policies,
            sweeper: self.sweeper,
        })
    }
}

impl Args {
    pub fn load(&self) -> Result<Settings, ConfigError> {
        let mut file = match &self.profiles {
            Some(path) => FileConfig::from_path(path)?,
            None => FileConfig::default(),
        };

        if let Some(secs) = self.sweep_interval {
            file.sweeper.interval = Duration::from_secs(secs);
        }
        if let Some(windows) = self.stale_windows {
            file.sweeper.stale_windows = windows;
        }

        file.into_settings()
    }
}
