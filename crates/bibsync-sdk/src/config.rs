use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use bibsync_identity::{FileLogConfig, ResolvePolicy, SyncMode};
use bibsync_sync::{IndexOptions, SyncConfig};

use crate::error::{SdkError, SdkResult};

/// How the query path follows identity mappings.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolveMode {
    #[default]
    SingleHop,
    Chase,
}

/// Top-level pipeline settings.
///
/// Every field has a default, so a config file only lists what it changes:
///
/// ```toml
/// search_endpoints = ["http://solr1:8983/solr/update"]
/// ignore_errors = true
/// resolve_policy = "chase"
///
/// [sync]
/// parallelism = 4
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub search_endpoints: Vec<String>,
    /// Ask search endpoints to commit after each update.
    pub commit: bool,
    /// Terminally mark records that still fail after bisection.
    pub ignore_errors: bool,
    pub resolve_policy: ResolveMode,
    /// Hop limit when `resolve_policy` is `chase`.
    pub max_resolve_hops: usize,
    /// Durable change log file. In-memory when unset.
    pub change_log_path: Option<PathBuf>,
    pub change_log_sync: SyncMode,
    pub sync: SyncConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            search_endpoints: Vec::new(),
            commit: false,
            ignore_errors: false,
            resolve_policy: ResolveMode::SingleHop,
            max_resolve_hops: 8,
            change_log_path: None,
            change_log_sync: SyncMode::OsDefault,
            sync: SyncConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_toml_str(s: &str) -> SdkResult<Self> {
        let config: Self = toml::from_str(s).map_err(|e| SdkError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> SdkResult<Self> {
        let text = fs::read_to_string(path).map_err(|source| SdkError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> SdkResult<()> {
        if let Some(bad) = self.search_endpoints.iter().find(|e| e.trim().is_empty()) {
            return Err(SdkError::Config(format!("blank search endpoint {bad:?}")));
        }
        if self.resolve_policy == ResolveMode::Chase && self.max_resolve_hops == 0 {
            return Err(SdkError::Config("max_resolve_hops must be positive for chase".into()));
        }
        Ok(())
    }

    pub fn resolve(&self) -> ResolvePolicy {
        match self.resolve_policy {
            ResolveMode::SingleHop => ResolvePolicy::SingleHop,
            ResolveMode::Chase => ResolvePolicy::Chase {
                max_hops: self.max_resolve_hops,
            },
        }
    }

    pub fn index_options(&self) -> IndexOptions {
        IndexOptions {
            commit: self.commit,
            ignore_errors: self.ignore_errors,
        }
    }

    pub fn change_log(&self) -> FileLogConfig {
        FileLogConfig {
            sync_mode: self.change_log_sync,
        }
    }
}
