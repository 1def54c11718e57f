use crate::classify::RouteClassifier;
use crate::config::Settings;
use crate::engine::RateLimitEngine;
use crate::error::ConfigError;
use std::sync::Arc;

// app's shared state
pub struct AppState {
    pub engine: Arc<RateLimitEngine>,
    pub classifier: RouteClassifier, // path -> profile, resolved at startup
}

impl AppState {
    pub fn new(engine: Arc<RateLimitEngine>) -> Result<Self, ConfigError> {
        let classifier = RouteClassifier::new(engine.policies())?;
        Ok(Self { engine, classifier })
    }

    pub fn from_settings(settings: Settings) -> Result<Self, ConfigError> {
        let engine = RateLimitEngine::new(settings.policies, settings.sweeper)?;
        Self::new(Arc::new(engine))
    }
}
