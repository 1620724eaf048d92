//! Maintenance configuration management.
//!
//! Consolidates environment variable reads and CLI overrides into one
//! validated configuration.

use std::time::Duration;
use wager_engine::{DatabaseConfig, EngineConfig};

/// Default pause between sweeps
const DEFAULT_INTERVAL_SECS: u64 = 300;

/// Complete maintenance configuration
#[derive(Debug, Clone)]
pub struct MaintConfig {
    pub database: DatabaseConfig,
    /// Payout, audit, token and ledger policy handed to the engine
    pub engine: EngineConfig,
    /// Seconds between sweeps
    pub interval_secs: u64,
    /// Run a single sweep and exit
    pub once: bool,
    /// Apply bundled migrations before the first sweep
    pub migrate: bool,
}

impl MaintConfig {
    /// Load configuration from environment variables
    ///
    /// # Arguments
    ///
    /// * `database_url_override` - Optional database URL (from CLI args)
    /// * `interval_override` - Optional sweep interval in seconds (from CLI args)
    ///
    /// Reads `SWEEP_INTERVAL_SECS` plus everything [`DatabaseConfig::from_env`]
    /// and [`EngineConfig::from_env`] read.
    pub fn from_env(
        database_url_override: Option<String>,
        interval_override: Option<u64>,
    ) -> Self {
        let mut database = DatabaseConfig::from_env();
        if let Some(url) = database_url_override {
            database.database_url = url;
        }

        let interval_secs = interval_override.unwrap_or_else(|| {
            std::env::var("SWEEP_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_INTERVAL_SECS)
        });

        Self {
            database,
            engine: EngineConfig::from_env(),
            interval_secs,
            once: false,
            migrate: false,
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.database_url.trim().is_empty() {
            return Err(ConfigError::MissingRequired {
                var: "DATABASE_URL".to_string(),
                hint: "Pass --db-url or set DATABASE_URL".to_string(),
            });
        }

        if self.database.max_connections < self.database.min_connections {
            return Err(ConfigError::Invalid {
                var: "DB_MAX_CONNECTIONS".to_string(),
                reason: format!(
                    "Must be at least DB_MIN_CONNECTIONS ({})",
                    self.database.min_connections
                ),
            });
        }

        if !self.once && self.interval_secs == 0 {
            return Err(ConfigError::Invalid {
                var: "SWEEP_INTERVAL_SECS".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        if self.engine.token_ttl_hours <= 0 {
            return Err(ConfigError::Invalid {
                var: "TOKEN_TTL_HOURS".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        let decay = &self.engine.ledger.decay;
        if !(0..=100).contains(&decay.rate_percent) {
            return Err(ConfigError::Invalid {
                var: "DECAY_RATE_PERCENT".to_string(),
                reason: "Must be between 0 and 100".to_string(),
            });
        }

        if decay.idle_days < 1 {
            return Err(ConfigError::Invalid {
                var: "DECAY_IDLE_DAYS".to_string(),
                reason: "Must be at least 1".to_string(),
            });
        }

        if decay.floor < 0 {
            return Err(ConfigError::Invalid {
                var: "DECAY_FLOOR".to_string(),
                reason: "Must not be negative".to_string(),
            });
        }

        Ok(())
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {var}\nHint: {hint}")]
    MissingRequired { var: String, hint: String },

    #[error("Invalid configuration for {var}: {reason}")]
    Invalid { var: String, reason: String },
}
