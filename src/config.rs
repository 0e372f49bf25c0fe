//! Run configuration.
//!
//! Loaded from a YAML file whose fields all default, so a partial file only
//! overrides what it names. Environment variables are applied last.
//!
//! ```yaml
//! conversion:
//!   preserve_structure: true
//!   base_path: /home/me/org
//!   link_target: filename
//! attachments:
//!   attachment_folder: media
//! converter:
//!   kind: pandoc
//!   timeout_secs: 10
//! workers: 4
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid value {value:?} for environment variable {var}")]
    InvalidEnv { var: &'static str, value: String },
}

/// How a resolved note link names its target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkTarget {
    /// `[[Title]]`
    #[default]
    Title,
    /// `[[dir/file-stem|Title]]`
    Filename,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConverterKind {
    Pandoc,
    #[default]
    Builtin,
    None,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionConfig {
    /// Mirror source directories under the vault root.
    pub preserve_structure: bool,
    /// Root that source directories are taken relative to. Inferred from the
    /// notes when unset.
    pub base_path: Option<PathBuf>,
    pub link_target: LinkTarget,
    /// Rewrite tags into a form the destination accepts (no spaces, no `#`).
    pub convert_tags: bool,
    pub max_filename_length: usize,
    /// Emit the source file's modification time as `modified`.
    pub preserve_creation_date: bool,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            preserve_structure: false,
            base_path: None,
            link_target: LinkTarget::Title,
            convert_tags: true,
            max_filename_length: 80,
            preserve_creation_date: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttachmentConfig {
    pub copy_attachments: bool,
    pub attachment_folder: String,
}

impl Default for AttachmentConfig {
    fn default() -> Self {
        Self {
            copy_attachments: true,
            attachment_folder: "assets".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConverterConfig {
    pub kind: ConverterKind,
    pub pandoc_path: String,
    pub pandoc_args: Vec<String>,
    pub timeout_secs: u64,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            kind: ConverterKind::Builtin,
            pandoc_path: "pandoc".to_string(),
            pandoc_args: Vec::new(),
            timeout_secs: 30,
        }
    }
}

impl ConverterConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub conversion: ConversionConfig,
    pub attachments: AttachmentConfig,
    pub converter: ConverterConfig,
    /// Size of the conversion worker pool.
    pub workers: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            conversion: ConversionConfig::default(),
            attachments: AttachmentConfig::default(),
            converter: ConverterConfig::default(),
            workers: default_workers(),
        }
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

impl Config {
    /// Parses YAML, filling every missing field with its default.
    pub fn from_yaml_str(yaml: &str, origin: &Path) -> Result<Self, ConfigError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(yaml).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })
    }

    /// Loads configuration for a run.
    ///
    /// Uses `explicit` when given; otherwise `{config_dir}/roam2md/config.yaml`
    /// if it exists; otherwise defaults. An explicit path that does not exist
    /// is a warning, not an error. Environment overrides are applied last.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match explicit {
            Some(path) if path.exists() => Some(path.to_path_buf()),
            Some(path) => {
                tracing::warn!(path = %path.display(), "config file not found, using defaults");
                None
            }
            None => default_config_path().filter(|p| p.exists()),
        };

        let mut config = match path {
            Some(path) => {
                let yaml = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
                    path: path.clone(),
                    source,
                })?;
                let config = Self::from_yaml_str(&yaml, &path)?;
                tracing::info!(path = %path.display(), "loaded configuration");
                config
            }
            None => Self::default(),
        };

        config.apply_env()?;
        Ok(config)
    }

    /// Applies `ROAM2MD_PANDOC`, `ROAM2MD_WORKERS` and `ROAM2MD_TIMEOUT_SECS`.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(pandoc) = std::env::var("ROAM2MD_PANDOC") {
            self.converter.pandoc_path = pandoc;
        }
        if let Some(workers) = parse_env::<usize>("ROAM2MD_WORKERS")? {
            self.workers = workers;
        }
        if let Some(timeout) = parse_env::<u64>("ROAM2MD_TIMEOUT_SECS")? {
            self.converter.timeout_secs = timeout;
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(var: &'static str) -> Result<Option<T>, ConfigError> {
    match std::env::var(var) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv { var, value }),
        Err(_) => Ok(None),
    }
}

/// `{config_dir}/roam2md/config.yaml`, where `config_dir` is:
/// - Linux: `~/.config`
/// - macOS: `~/Library/Application Support`
/// - Windows: `C:\Users\<user>\AppData\Roaming`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("roam2md").join("config.yaml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::tempdir;

    #[test]
    fn partial_yaml_overlays_defaults() {
        let yaml = "conversion:\n  preserve_structure: true\n  link_target: filename\nconverter:\n  kind: pandoc\n";
        let config = Config::from_yaml_str(yaml, Path::new("test.yaml")).unwrap();

        assert!(config.conversion.preserve_structure);
        assert_eq!(config.conversion.link_target, LinkTarget::Filename);
        assert!(config.conversion.convert_tags);
        assert!(config.conversion.preserve_creation_date);
        assert_eq!(config.converter.kind, ConverterKind::Pandoc);
        assert_eq!(config.converter.pandoc_path, "pandoc");
        assert_eq!(config.attachments.attachment_folder, "assets");
    }

    #[test]
    fn empty_yaml_is_default() {
        let config = Config::from_yaml_str("  \n", Path::new("x.yaml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn malformed_yaml_reports_path() {
        let err = Config::from_yaml_str("conversion: [1, 2", Path::new("bad.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("bad.yaml"));
    }

    #[test]
    #[serial]
    fn missing_explicit_file_falls_back_to_defaults() {
        let dir = tempdir().unwrap();
        let config = Config::load(Some(&dir.path().join("absent.yaml"))).unwrap();
        assert_eq!(config.conversion, ConversionConfig::default());
    }

    #[test]
    #[serial]
    fn load_reads_explicit_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "attachments:\n  copy_attachments: false\nworkers: 3\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert!(!config.attachments.copy_attachments);
        assert_eq!(config.workers, 3);
    }

    #[test]
    #[serial]
    fn environment_overrides_file_values() {
        unsafe {
            std::env::set_var("ROAM2MD_WORKERS", "2");
            std::env::set_var("ROAM2MD_PANDOC", "/opt/pandoc");
        }
        let mut config = Config::default();
        let result = config.apply_env();
        unsafe {
            std::env::remove_var("ROAM2MD_WORKERS");
            std::env::remove_var("ROAM2MD_PANDOC");
        }

        result.unwrap();
        assert_eq!(config.workers, 2);
        assert_eq!(config.converter.pandoc_path, "/opt/pandoc");
    }

    #[test]
    #[serial]
    fn invalid_environment_value_is_rejected() {
        unsafe { std::env::set_var("ROAM2MD_TIMEOUT_SECS", "soon") };
        let result = Config::default().apply_env();
        unsafe { std::env::remove_var("ROAM2MD_TIMEOUT_SECS") };

        assert!(matches!(
            result,
            Err(ConfigError::InvalidEnv {
                var: "ROAM2MD_TIMEOUT_SECS",
                ..
            })
        ));
    }
}
