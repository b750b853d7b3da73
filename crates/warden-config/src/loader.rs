//! Layered loading of [`WardenConfig`].
//!
//! Sources, lowest precedence first:
//!
//! 1. built-in defaults
//! 2. the user file (`~/.config/warden/config.toml`)
//! 3. `warden.toml` in the project directory
//! 4. `warden.local.toml` in the project directory
//! 5. `WARDEN_*` environment variables, with `__` between nested keys
//!    (`WARDEN_AUDIT__QUEUE_CAPACITY=64`)
//!
//! The merged result is validated before it is returned.

use crate::{Paths, WardenConfig};
use anyhow::{Context, Result};
use std::env;
use std::path::{Path, PathBuf};

pub struct ConfigLoader {
    project_dir: PathBuf,
    env_prefix: String,
    include_user_config: bool,
}

impl ConfigLoader {
    /// Loads from the current directory with the `WARDEN` prefix.
    pub fn new() -> Self {
        Self {
            project_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            env_prefix: "WARDEN".to_string(),
            include_user_config: true,
        }
    }

    pub fn with_project_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.project_dir = dir.as_ref().to_path_buf();
        self
    }

    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Ignores the user file, so results depend only on the project directory.
    pub fn without_user_config(mut self) -> Self {
        self.include_user_config = false;
        self
    }

    /// Existing config files, lowest precedence first.
    pub fn files(&self) -> Vec<PathBuf> {
        let user = self
            .include_user_config
            .then(|| Paths::new().user_config_file().ok())
            .flatten();

        user.into_iter()
            .chain([
                Paths::project_config_file(&self.project_dir),
                Paths::local_config_file(&self.project_dir),
            ])
            .filter(|path| path.exists())
            .collect()
    }

    pub fn load(self) -> Result<WardenConfig> {
        let defaults = config::Config::try_from(&WardenConfig::default())
            .context("Failed to serialize default configuration")?;

        let builder = self.files().into_iter().fold(
            config::Config::builder().add_source(defaults),
            |builder, path| {
                builder.add_source(config::File::from(path).format(config::FileFormat::Toml))
            },
        );

        let merged = builder
            .add_source(
                config::Environment::with_prefix(&self.env_prefix)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to merge configuration sources")?;

        let config: WardenConfig = merged
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        config
            .validate()
            .context("Configuration failed validation")?;
        Ok(config)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn loader(dir: &Path) -> ConfigLoader {
        ConfigLoader::new()
            .with_project_dir(dir)
            .with_env_prefix("WARDEN_LOADER_TEST")
            .without_user_config()
    }

    #[test]
    fn test_empty_project_yields_defaults() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let loader = loader(temp_dir.path());

        assert!(loader.files().is_empty());
        assert_eq!(loader.load().unwrap(), WardenConfig::default());
    }

    #[test]
    fn test_project_file_overrides_defaults() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        fs::write(
            temp_dir.path().join("warden.toml"),
            r#"
[hierarchy]
max_depth = 6

[engine]
filter_concurrency = 2

[audit]
queue_capacity = 16
"#,
        )
        .expect("Failed to write config");

        let config = loader(temp_dir.path()).load().unwrap();

        assert_eq!(config.hierarchy.max_depth, 6);
        assert_eq!(config.engine.filter_concurrency, 2);
        assert_eq!(config.audit.queue_capacity, 16);
        // Untouched keys keep their defaults
        assert!(config.audit.enabled);
        assert_eq!(config.audit.batch_size, 64);
    }

    #[test]
    fn test_local_file_wins_over_project_file() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let dir = temp_dir.path();
        fs::write(dir.join("warden.toml"), "[hierarchy]\nmax_depth = 6\n").unwrap();
        fs::write(dir.join("warden.local.toml"), "[hierarchy]\nmax_depth = 3\n").unwrap();

        let loader = loader(dir);
        assert_eq!(
            loader.files(),
            vec![dir.join("warden.toml"), dir.join("warden.local.toml")]
        );
        assert_eq!(loader.load().unwrap().hierarchy.max_depth, 3);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        fs::write(
            temp_dir.path().join("warden.toml"),
            "[engine]\nfilter_concurrency = 0\n",
        )
        .unwrap();

        let err = loader(temp_dir.path()).load().unwrap_err();
        assert!(format!("{err:#}").contains("filter_concurrency"));
    }
}
