//! Worker configuration.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::WorkerError;

/// Which document store the worker talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Firestore,
    /// Process-local store, useful for dry runs and tests
    Memory,
}

impl FromStr for StoreBackend {
    type Err = WorkerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "firestore" => Ok(StoreBackend::Firestore),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(WorkerError::config_error(format!(
                "unknown STORE_BACKEND '{}', expected firestore or memory",
                other
            ))),
        }
    }
}

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum records claimed per poll
    pub batch_size: usize,
    /// Stop a stage after this many records, run forever when unset
    pub max_count: Option<usize>,
    /// Sleep between polls that found nothing to claim
    pub idle_backoff: Duration,
    /// Attempt ceiling shared by every stage
    pub max_attempts: u32,
    /// Lease stamped on a record at claim time
    pub claim_ttl: Duration,
    /// How often in-flight leases are extended
    pub heartbeat_interval: Duration,
    /// How often expired leases are swept
    pub sweep_interval: Duration,
    /// Root directory for converted assets, narrations and renders
    pub media_root: PathBuf,
    /// Maximum scenes rendered in parallel within one video
    pub max_scene_parallel: usize,
    /// Re-render scenes that already have a clip
    pub force_render: bool,
    pub subtitles: bool,
    /// Fade in/out length on the final cut, 0 disables it
    pub fade_secs: f64,
    pub brand_logo: Option<PathBuf>,
    /// Font for drawtext; FFmpeg's default font when unset
    pub font_file: Option<PathBuf>,
    /// Spawn video jobs per VideoRequestFormat instead of per request
    pub spawn_per_format: bool,
    pub store_backend: StoreBackend,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            batch_size: 3,
            max_count: None,
            idle_backoff: Duration::from_secs(5),
            max_attempts: 3,
            claim_ttl: Duration::from_secs(1800), // 30 minutes
            heartbeat_interval: Duration::from_secs(60),
            sweep_interval: Duration::from_secs(60),
            media_root: PathBuf::from("media"),
            max_scene_parallel: 4,
            force_render: false,
            subtitles: true,
            fade_secs: 0.0,
            brand_logo: None,
            font_file: None,
            spawn_per_format: false,
            store_backend: StoreBackend::Firestore,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Result<Self, WorkerError> {
        let defaults = Self::default();

        let store_backend = match std::env::var("STORE_BACKEND") {
            Ok(v) if !v.is_empty() => v.parse()?,
            _ => defaults.store_backend,
        };

        Ok(Self {
            batch_size: std::env::var("WORKER_BATCH_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.batch_size),
            max_count: std::env::var("WORKER_MAX_COUNT")
                .ok()
                .and_then(|s| s.parse().ok()),
            idle_backoff: Duration::from_secs(
                std::env::var("WORKER_IDLE_BACKOFF_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(5),
            ),
            max_attempts: std::env::var("WORKER_MAX_ATTEMPTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_attempts),
            claim_ttl: Duration::from_secs(
                std::env::var("WORKER_CLAIM_TTL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(1800),
            ),
            heartbeat_interval: Duration::from_secs(
                std::env::var("WORKER_HEARTBEAT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(60),
            ),
            sweep_interval: Duration::from_secs(
                std::env::var("WORKER_SWEEP_INTERVAL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(60),
            ),
            media_root: std::env::var("MEDIA_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.media_root),
            max_scene_parallel: std::env::var("WORKER_MAX_SCENE_PARALLEL")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_scene_parallel),
            force_render: env_flag("RENDER_FORCE", defaults.force_render),
            subtitles: env_flag("RENDER_SUBTITLES", defaults.subtitles),
            fade_secs: std::env::var("RENDER_FADE_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.fade_secs),
            brand_logo: std::env::var("BRAND_LOGO_PATH").ok().map(PathBuf::from),
            font_file: std::env::var("FONT_FILE").ok().map(PathBuf::from),
            spawn_per_format: env_flag("SPAWN_PER_FORMAT", defaults.spawn_per_format),
            store_backend,
        })
    }

    /// Lease length in epoch milliseconds.
    pub fn claim_ttl_ms(&self) -> i64 {
        self.claim_ttl.as_millis() as i64
    }
}

fn env_flag(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const KEYS: [&str; 6] = [
        "WORKER_BATCH_SIZE",
        "WORKER_MAX_COUNT",
        "WORKER_MAX_ATTEMPTS",
        "RENDER_SUBTITLES",
        "STORE_BACKEND",
        "MEDIA_ROOT",
    ];

    fn clear() {
        for key in KEYS {
            std::env::remove_var(key);
        }
    }

    #[test]
    #[serial]
    fn test_defaults_from_empty_env() {
        clear();
        let config = WorkerConfig::from_env().unwrap();
        assert_eq!(config.batch_size, 3);
        assert_eq!(config.max_count, None);
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.idle_backoff, Duration::from_secs(5));
        assert!(config.subtitles);
        assert_eq!(config.media_root, PathBuf::from("media"));
        assert_eq!(config.store_backend, StoreBackend::Firestore);
    }

    #[test]
    #[serial]
    fn test_overrides() {
        clear();
        std::env::set_var("WORKER_BATCH_SIZE", "8");
        std::env::set_var("WORKER_MAX_COUNT", "20");
        std::env::set_var("RENDER_SUBTITLES", "false");
        std::env::set_var("STORE_BACKEND", "memory");
        std::env::set_var("MEDIA_ROOT", "/srv/media");

        let config = WorkerConfig::from_env().unwrap();
        assert_eq!(config.batch_size, 8);
        assert_eq!(config.max_count, Some(20));
        assert!(!config.subtitles);
        assert_eq!(config.store_backend, StoreBackend::Memory);
        assert_eq!(config.media_root, PathBuf::from("/srv/media"));
        clear();
    }

    #[test]
    #[serial]
    fn test_bad_values_fall_back() {
        clear();
        std::env::set_var("WORKER_BATCH_SIZE", "0");
        std::env::set_var("WORKER_MAX_ATTEMPTS", "lots");
        let config = WorkerConfig::from_env().unwrap();
        assert_eq!(config.batch_size, 3);
        assert_eq!(config.max_attempts, 3);
        clear();
    }

    #[test]
    #[serial]
    fn test_unknown_backend_is_an_error() {
        clear();
        std::env::set_var("STORE_BACKEND", "postgres");
        assert!(WorkerConfig::from_env().is_err());
        clear();
    }
}
