/// Configuration management for Timeline Service
///
/// Loads configuration from environment variables.
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub cache: CacheConfig,
    pub fanout: FanoutConfig,
    pub timeline: TimelineConfig,
    pub reconcile: ReconcileConfig,
}

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application environment (development, staging, production)
    pub env: String,
    /// Server host to bind to
    pub host: String,
    /// HTTP port for health checks and metrics
    pub http_port: u16,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
}

/// Redis-backed read-through cache
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub redis_url: String,
    /// When false every read goes to the database
    pub enabled: bool,
    pub followers_ttl_secs: u64,
    pub timeline_ttl_secs: u64,
    /// Extra random TTL, as a percentage of the base TTL
    pub ttl_jitter_percent: u32,
}

impl CacheConfig {
    pub fn followers_ttl(&self) -> Duration {
        Duration::from_secs(self.followers_ttl_secs)
    }

    pub fn timeline_ttl(&self) -> Duration {
        Duration::from_secs(self.timeline_ttl_secs)
    }
}

/// Where follower propagation runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FanoutMode {
    /// Inside the publishing request
    Inline,
    /// On a background worker fed by a bounded channel
    Queued,
}

impl FromStr for FanoutMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "inline" => Ok(FanoutMode::Inline),
            "queued" => Ok(FanoutMode::Queued),
            other => bail!("unknown FANOUT_MODE '{other}' (expected inline or queued)"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FanoutConfig {
    /// Posts copied into a new follower's timeline on follow
    pub backfill_limit: i64,
    /// Retries per fan-out step before it is logged as failed
    pub retry_attempts: u32,
    pub mode: FanoutMode,
    pub queue_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineConfig {
    pub page_size_max: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileConfig {
    pub enabled: bool,
    pub interval_secs: u64,
    pub batch_size: i64,
}

impl Default for FanoutConfig {
    fn default() -> Self {
        Self {
            backfill_limit: 30,
            retry_attempts: 2,
            mode: FanoutMode::Inline,
            queue_capacity: 1024,
        }
    }
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self { page_size_max: 100 }
    }
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 3600,
            batch_size: 200,
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let app = AppConfig {
            env: std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
            host: std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            http_port: env_or("PORT", 8090),
        };

        let database = DatabaseConfig {
            url: std::env::var("DATABASE_URL")
                .context("DATABASE_URL environment variable not set")?,
            max_connections: env_or("DB_MAX_CONNECTIONS", 20),
            min_connections: env_or("DB_MIN_CONNECTIONS", 5),
            acquire_timeout_secs: env_or("DB_ACQUIRE_TIMEOUT_SECS", 10),
        };

        let cache = CacheConfig {
            redis_url: std::env::var("REDIS_URL")
                .context("REDIS_URL environment variable not set")?,
            enabled: env_or("CACHE_ENABLED", true),
            followers_ttl_secs: env_or("CACHE_FOLLOWERS_TTL_SECS", timeline_cache::ttl::FOLLOWERS),
            timeline_ttl_secs: env_or(
                "CACHE_TIMELINE_TTL_SECS",
                timeline_cache::ttl::TIMELINE_PAGE,
            ),
            ttl_jitter_percent: env_or("CACHE_TTL_JITTER_PERCENT", 0),
        };

        let defaults = FanoutConfig::default();
        let mode = match std::env::var("FANOUT_MODE") {
            Ok(raw) => raw.parse::<FanoutMode>().context("Invalid FANOUT_MODE")?,
            Err(_) => defaults.mode,
        };
        let fanout = FanoutConfig {
            backfill_limit: env_or("FANOUT_BACKFILL_LIMIT", defaults.backfill_limit),
            retry_attempts: env_or("FANOUT_RETRY_ATTEMPTS", defaults.retry_attempts),
            mode,
            queue_capacity: env_or("FANOUT_QUEUE_CAPACITY", defaults.queue_capacity).max(1),
        };

        let timeline = TimelineConfig {
            page_size_max: env_or("TIMELINE_PAGE_SIZE_MAX", 100).max(1),
        };

        let defaults = ReconcileConfig::default();
        let reconcile = ReconcileConfig {
            enabled: env_or("RECONCILE_ENABLED", defaults.enabled),
            interval_secs: env_or("RECONCILE_INTERVAL_SECS", defaults.interval_secs).max(1),
            batch_size: env_or("RECONCILE_BATCH_SIZE", defaults.batch_size).max(1),
        };

        Ok(Config {
            app,
            database,
            cache,
            fanout,
            timeline,
            reconcile,
        })
    }
}
