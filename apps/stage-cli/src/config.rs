//! CLI configuration management.
//!
//! Configuration is stored as TOML:
//! - Linux: `~/.config/assetstage/config.toml`
//! - Windows: `%APPDATA%/assetstage/config.toml`
//!
//! Relative paths are resolved against `project_root`.

use std::path::{Path, PathBuf};

use assetstage_protocol::StagingSettings;
use serde::{Deserialize, Serialize};

/// CLI configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CliConfig {
    /// Root of the local project.
    #[serde(default = "default_project_root")]
    pub project_root: PathBuf,

    /// JSON manifest describing the project's assets.
    #[serde(default = "default_manifest")]
    pub manifest: PathBuf,

    /// Directory holding the repository records.
    #[serde(default = "default_repository_dir")]
    pub repository_dir: PathBuf,

    /// Import baselines, saved after every upload.
    #[serde(default = "default_tracker_file")]
    pub tracker_file: PathBuf,

    #[serde(default)]
    pub settings: StagingSettings,
}

fn default_project_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_manifest() -> PathBuf {
    PathBuf::from("assetstage.json")
}

fn default_repository_dir() -> PathBuf {
    PathBuf::from(".assetstage/repository")
}

fn default_tracker_file() -> PathBuf {
    PathBuf::from(".assetstage/imports.json")
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            project_root: default_project_root(),
            manifest: default_manifest(),
            repository_dir: default_repository_dir(),
            tracker_file: default_tracker_file(),
            settings: StagingSettings::default(),
        }
    }
}

impl CliConfig {
    /// Loads configuration from `path` (or the default location), creating
    /// a default file if none exists.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => config_path()?,
        };

        if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            let config: CliConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            let config = CliConfig::default();
            config.save(&path)?;
            Ok(config)
        }
    }

    /// Saves the configuration to `path`.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }

        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }

    /// Resolves `path` against the project root unless it is absolute.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_root.join(path)
        }
    }
}

/// Returns the platform-specific configuration file path.
fn config_path() -> anyhow::Result<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        Ok(PathBuf::from(appdata).join("assetstage").join("config.toml"))
    }

    #[cfg(not(target_os = "windows"))]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        Ok(PathBuf::from(home)
            .join(".config")
            .join("assetstage")
            .join("config.toml"))
    }
}
