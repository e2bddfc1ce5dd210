//! Daemon configuration
//!
//! Values come from an optional TOML file (by default
//! `<config dir>/drivefs/config.toml`) with command line flags layered on
//! top. Every field is optional in the file.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use url::Url;

use remote::{DriveClientConfig, DEFAULT_API_BASE_URL, DEFAULT_UPLOAD_BASE_URL};

use crate::fuse::DriveFsConfig;

pub const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Bearer token for the drive API
    pub access_token: Option<String>,
    pub api_base_url: Option<String>,
    pub upload_base_url: Option<String>,
    /// Byte capacity of the content cache, unbounded if absent
    pub cache_max_bytes: Option<u64>,
    /// Directory for staging files, the OS temp dir if absent
    pub staging_dir: Option<PathBuf>,
    /// Directory for daily log files, stderr only if absent
    pub log_dir: Option<PathBuf>,
}

impl Config {
    /// Default location of the config file, if the platform has one
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "drivefs").map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    /// Load from `path`, or from the default location when `path` is `None`.
    ///
    /// A missing file at the default location yields the defaults; a missing
    /// file that was named explicitly is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let (path, explicit) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => match Self::default_path() {
                Some(path) => (path, false),
                None => return Ok(Self::default()),
            },
        };

        if !explicit && !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        let config = Self::from_toml_str(&contents)?;
        tracing::debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Overlay every field set in `overrides`
    pub fn merge(mut self, overrides: Config) -> Self {
        macro_rules! overlay {
            ($($field:ident),*) => {
                $(if overrides.$field.is_some() {
                    self.$field = overrides.$field;
                })*
            };
        }
        overlay!(
            access_token,
            api_base_url,
            upload_base_url,
            cache_max_bytes,
            staging_dir,
            log_dir
        );
        self
    }

    /// Settings for the HTTP store client
    pub fn client_config(&self) -> Result<DriveClientConfig, ConfigError> {
        let access_token = self
            .access_token
            .clone()
            .filter(|token| !token.is_empty())
            .ok_or(ConfigError::MissingAccessToken)?;

        Ok(DriveClientConfig {
            access_token,
            api_base_url: parse_base_url(self.api_base_url.as_deref(), DEFAULT_API_BASE_URL)?,
            upload_base_url: parse_base_url(
                self.upload_base_url.as_deref(),
                DEFAULT_UPLOAD_BASE_URL,
            )?,
        })
    }

    /// Settings for the filesystem adapter
    pub fn drive_fs_config(&self) -> DriveFsConfig {
        let defaults = DriveFsConfig::default();
        DriveFsConfig {
            cache_max_bytes: self.cache_max_bytes,
            staging_dir: self.staging_dir.clone().unwrap_or(defaults.staging_dir),
            ..defaults
        }
    }
}

/// Parse a base URL, making sure it ends with `/` so relative joins append
fn parse_base_url(value: Option<&str>, default: &str) -> Result<Url, ConfigError> {
    let raw = value.unwrap_or(default);
    let normalized = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{}/", raw)
    };
    Url::parse(&normalized).map_err(|source| ConfigError::InvalidUrl {
        value: raw.to_string(),
        source,
    })
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid URL {value}: {source}")]
    InvalidUrl {
        value: String,
        source: url::ParseError,
    },
    #[error("no access token configured (set access_token, --access-token or DRIVEFS_ACCESS_TOKEN)")]
    MissingAccessToken,
}
