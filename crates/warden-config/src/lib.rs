//! Configuration management for Warden
//!
//! Provides hierarchical configuration loading from multiple sources:
//! 1. Environment variables (WARDEN_* prefix, highest precedence)
//! 2. warden.local.toml (gitignored, local overrides)
//! 3. warden.toml (git-tracked, project config)
//! 4. ~/.config/warden/config.toml (user defaults)
//! 5. Built-in defaults (lowest precedence)

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

mod error;
mod loader;
mod paths;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use paths::Paths;

/// Default bound on hierarchy traversal depth.
pub const DEFAULT_MAX_HIERARCHY_DEPTH: usize = 10;

/// Default number of worker threads used by `filter_by_permission`.
pub const DEFAULT_FILTER_CONCURRENCY: usize = 8;

/// Main Warden configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WardenConfig {
    pub hierarchy: HierarchyConfig,
    pub engine: EngineConfig,
    pub audit: AuditConfig,
    pub facets: FacetConfig,
    pub policy: PolicyConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HierarchyConfig {
    /// Maximum number of manager hops followed by any traversal.
    pub max_depth: usize,
}

impl Default for HierarchyConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_HIERARCHY_DEPTH,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Upper bound on concurrent checks during batch filtering.
    pub filter_concurrency: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            filter_concurrency: DEFAULT_FILTER_CONCURRENCY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    pub enabled: bool,
    pub queue_capacity: usize,
    pub batch_size: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            queue_capacity: 1024,
            batch_size: 64,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FacetConfig {
    /// Days before `review_at` at which an assignment starts reporting `needs_review`.
    pub review_warning_days: u32,
}

/// Facets that confer elevated access in the standard policies.
///
/// Values are facet identifiers (`scope:name[:value]`), parsed when the
/// engine is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub global_admin_facet: String,
    pub divisional_admin_facet: String,
    /// Scope whose facets place an entity in a division.
    pub division_scope: String,
    /// Restricts division facets to `division_scope:<name>:<value>`.
    pub division_name: Option<String>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            global_admin_facet: "role:admin".to_string(),
            divisional_admin_facet: "role:divisional-admin".to_string(),
            division_scope: "org-division".to_string(),
            division_name: None,
        }
    }
}

impl WardenConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self> {
        ConfigLoader::new().load()
    }

    /// Load configuration from specific project directory
    pub fn load_from_dir(project_dir: impl AsRef<Path>) -> Result<Self> {
        ConfigLoader::new().with_project_dir(project_dir).load()
    }

    /// Parse a single TOML file, without layering.
    pub fn from_file(path: impl AsRef<Path>) -> std::result::Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&content).map_err(|source| ConfigError::ParseError {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects settings that would disable a safety bound.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.hierarchy.max_depth == 0 {
            return Err(ConfigError::ValidationError(
                "hierarchy.max_depth must be at least 1".to_string(),
            ));
        }
        if self.engine.filter_concurrency == 0 {
            return Err(ConfigError::ValidationError(
                "engine.filter_concurrency must be at least 1".to_string(),
            ));
        }
        if self.audit.queue_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "audit.queue_capacity must be at least 1".to_string(),
            ));
        }
        if self.audit.batch_size == 0 {
            return Err(ConfigError::ValidationError(
                "audit.batch_size must be at least 1".to_string(),
            ));
        }
        if self.policy.division_scope.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "policy.division_scope must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
