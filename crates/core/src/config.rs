use std::env;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{LumenError, Result};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

// ── Top-level config ──────────────────────────────────────────

/// Full render configuration.
///
/// Parsed from `lumen.toml`; every key can be overridden with a
/// `LUMEN_SECTION_KEY` environment variable (e.g. `LUMEN_IMAGE_WIDTH`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Output image dimensions.
    #[serde(default)]
    pub image: ImageConfig,

    /// Scheduling policy knobs.
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Worker pool settings.
    #[serde(default)]
    pub workers: WorkerConfig,
}

// ── Image ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageConfig {
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
}

fn default_width() -> u32 { 1280 }
fn default_height() -> u32 { 720 }

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
        }
    }
}

impl ImageConfig {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

// ── Scheduler ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds after the last tonemap before a fresh one is preferred.
    #[serde(default = "default_tonemap_interval")]
    pub tonemap_interval_secs: u64,
    /// Number of throughput samples kept for the rolling mean.
    #[serde(default = "default_performance_history")]
    pub performance_history: usize,
    /// Pin the seed of the first trace unit (random when unset).
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_tonemap_interval() -> u64 { 30 }
fn default_performance_history() -> usize { 512 }

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tonemap_interval_secs: default_tonemap_interval(),
            performance_history: default_performance_history(),
            seed: None,
        }
    }
}

impl SchedulerConfig {
    pub fn tonemap_interval(&self) -> Duration {
        Duration::from_secs(self.tonemap_interval_secs)
    }
}

// ── Workers ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Number of worker threads. 0 = available parallelism.
    #[serde(default)]
    pub threads: usize,
    /// How long a worker idles after receiving a sleep task.
    #[serde(default = "default_sleep_backoff")]
    pub sleep_backoff_ms: u64,
}

fn default_sleep_backoff() -> u64 { 10 }

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            threads: 0,
            sleep_backoff_ms: default_sleep_backoff(),
        }
    }
}

impl WorkerConfig {
    /// Resolve worker thread count (0 means use available parallelism).
    pub fn resolved_threads(&self) -> usize {
        if self.threads == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        } else {
            self.threads
        }
    }

    pub fn sleep_backoff(&self) -> Duration {
        Duration::from_millis(self.sleep_backoff_ms)
    }
}

// ── Loading & Validation ──────────────────────────────────────

impl Config {
    /// Parse config from a TOML string, then apply env overrides.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(toml_str)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load config from a file path, then apply env overrides.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let mut config = Self::read_file(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse a config file exactly as written, without env overrides.
    fn read_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Ok(toml::from_str(&content)?)
    }

    /// Defaults plus env overrides, for running without a config file.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply `LUMEN_*` environment variable overrides.
    ///
    /// - `LUMEN_IMAGE_WIDTH` / `LUMEN_IMAGE_HEIGHT`
    /// - `LUMEN_SCHEDULER_TONEMAP_INTERVAL_SECS`
    /// - `LUMEN_SCHEDULER_PERFORMANCE_HISTORY`
    /// - `LUMEN_SCHEDULER_SEED`
    /// - `LUMEN_WORKERS_THREADS` / `LUMEN_WORKERS_SLEEP_BACKOFF_MS`
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| env::var(key).ok().filter(|v| !v.is_empty()));
    }

    /// Unparseable values are ignored, keeping the file or default value.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        fn parsed<T: std::str::FromStr>(
            lookup: &impl Fn(&str) -> Option<String>,
            key: &str,
        ) -> Option<T> {
            lookup(key).and_then(|v| v.parse().ok())
        }

        if let Some(v) = parsed(&lookup, "LUMEN_IMAGE_WIDTH") {
            self.image.width = v;
        }
        if let Some(v) = parsed(&lookup, "LUMEN_IMAGE_HEIGHT") {
            self.image.height = v;
        }
        if let Some(v) = parsed(&lookup, "LUMEN_SCHEDULER_TONEMAP_INTERVAL_SECS") {
            self.scheduler.tonemap_interval_secs = v;
        }
        if let Some(v) = parsed(&lookup, "LUMEN_SCHEDULER_PERFORMANCE_HISTORY") {
            self.scheduler.performance_history = v;
        }
        if let Some(v) = parsed(&lookup, "LUMEN_SCHEDULER_SEED") {
            self.scheduler.seed = Some(v);
        }
        if let Some(v) = parsed(&lookup, "LUMEN_WORKERS_THREADS") {
            self.workers.threads = v;
        }
        if let Some(v) = parsed(&lookup, "LUMEN_WORKERS_SLEEP_BACKOFF_MS") {
            self.workers.sleep_backoff_ms = v;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.image.width == 0 || self.image.height == 0 {
            return Err(LumenError::Config(format!(
                "image dimensions must be non-zero, got {}x{}",
                self.image.width, self.image.height
            )));
        }
        if self.scheduler.tonemap_interval_secs == 0 {
            return Err(LumenError::Config(
                "scheduler.tonemap_interval_secs must be at least 1".into(),
            ));
        }
        if self.scheduler.performance_history == 0 {
            return Err(LumenError::Config(
                "scheduler.performance_history must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded:");
        tracing::info!("  image:     {}x{}", self.image.width, self.image.height);
        tracing::info!(
            "  scheduler: tonemap every {}s, history={}, seed={}",
            self.scheduler.tonemap_interval_secs,
            self.scheduler.performance_history,
            self.scheduler
                .seed
                .map(|s| s.to_string())
                .unwrap_or_else(|| "(random)".into())
        );
        tracing::info!(
            "  workers:   threads={}, sleep_backoff={}ms",
            self.workers.resolved_threads(),
            self.workers.sleep_backoff_ms
        );
    }

    pub fn summary(&self) -> serde_json::Value {
        serde_json::json!({
            "image": { "width": self.image.width, "height": self.image.height },
            "scheduler": {
                "tonemap_interval_secs": self.scheduler.tonemap_interval_secs,
                "performance_history": self.scheduler.performance_history,
                "seed": self.scheduler.seed,
            },
            "workers": {
                "threads": self.workers.resolved_threads(),
                "sleep_backoff_ms": self.workers.sleep_backoff_ms,
            },
        })
    }
}
