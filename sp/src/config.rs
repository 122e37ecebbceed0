//! Provider configuration types and loading

use eyre::{Result, WrapErr, eyre};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const LOCAL_CONFIG: &str = ".schedprov.yml";

/// Configuration for a [`DefaultSchedulerProvider`](crate::provider::DefaultSchedulerProvider)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Prefix for worker pool and new-thread scheduler thread names
    #[serde(rename = "thread-name-prefix")]
    pub thread_name_prefix: String,

    /// Prefix for generated event loop thread names
    #[serde(rename = "event-loop-prefix")]
    pub event_loop_prefix: String,

    /// Number of event loops backing the shared worker pool
    #[serde(rename = "worker-pool-size")]
    pub worker_pool_size: usize,

    /// Worker threads of the task pool runtime
    #[serde(rename = "task-pool-threads")]
    pub task_pool_threads: usize,
}

fn default_worker_pool_size() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4)
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            thread_name_prefix: "sched".to_string(),
            event_loop_prefix: "event-loop".to_string(),
            worker_pool_size: default_worker_pool_size(),
            task_pool_threads: 2,
        }
    }
}

impl ProviderConfig {
    /// Validate configuration before building a provider
    pub fn validate(&self) -> Result<()> {
        debug!(config = ?self, "ProviderConfig::validate: called");
        if self.thread_name_prefix.is_empty() {
            return Err(eyre!("thread-name-prefix must not be empty"));
        }
        if self.event_loop_prefix.is_empty() {
            return Err(eyre!("event-loop-prefix must not be empty"));
        }
        if self.worker_pool_size == 0 {
            return Err(eyre!("worker-pool-size must be at least 1"));
        }
        if self.task_pool_threads == 0 {
            return Err(eyre!("task-pool-threads must be at least 1"));
        }
        Ok(())
    }

    /// Load configuration from `config_path`, or the first readable candidate
    ///
    /// An explicit path must load. Otherwise [`candidate_paths`](Self::candidate_paths)
    /// are tried in order; a candidate that fails to parse or validate is
    /// skipped with a warning. Defaults apply when none loads.
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path)
                .wrap_err_with(|| format!("Failed to load config from {}", path.display()));
        }

        let loaded = Self::candidate_paths()
            .into_iter()
            .filter(|path| path.is_file())
            .find_map(|path| match Self::load_from_file(&path) {
                Ok(config) => Some(config),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unusable config file");
                    None
                }
            });

        Ok(loaded.unwrap_or_else(|| {
            info!("No config file found, using defaults");
            Self::default()
        }))
    }

    /// Config files consulted by [`load`](Self::load), highest priority first
    pub fn candidate_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(LOCAL_CONFIG)];
        paths.extend(dirs::config_dir().map(|dir| dir.join("schedprov").join("schedprov.yml")));
        paths
    }

    fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).wrap_err("Failed to read config file")?;
        let config: Self = serde_yaml::from_str(&content).wrap_err("Failed to parse config file")?;
        config.validate()?;

        info!(path = %path.display(), "Loaded provider config");
        Ok(config)
    }
}
