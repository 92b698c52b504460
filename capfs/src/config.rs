//! Adapter settings, loadable from YAML.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("removal_concurrency must be at least 1")]
    ZeroConcurrency,
}

/// Adapter options.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CapFsConfig {
    /// Use exclusive sync access handles when the host offers them.
    pub prefer_sync_access: bool,
    /// Log every call, result and failure through `tracing`.
    pub trace: bool,
    /// Upper bound on removals in flight while emptying the root.
    pub removal_concurrency: usize,
    /// Maximum number of cached directory handles.
    pub dir_cache_capacity: u64,
}

impl Default for CapFsConfig {
    fn default() -> Self {
        Self {
            prefer_sync_access: true,
            trace: false,
            removal_concurrency: 10,
            dir_cache_capacity: 10_000,
        }
    }
}

impl CapFsConfig {
    pub fn with_trace(mut self, trace: bool) -> Self {
        self.trace = trace;
        self
    }

    pub fn with_sync_access(mut self, prefer: bool) -> Self {
        self.prefer_sync_access = prefer;
        self
    }

    pub fn with_removal_concurrency(mut self, n: usize) -> Self {
        self.removal_concurrency = n;
        self
    }

    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        let cfg: Self = serde_yaml::from_str(text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.removal_concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        Ok(())
    }
}
