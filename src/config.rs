//! nsxctl configuration
//!
//! Connection settings live in `~/.config/nsxctl/config.toml` unless
//! `--config` points elsewhere. Flags and `NSX_*` environment variables
//! override what the file says.

use anyhow::{Context, Result, bail};
use nsxkit::MergeStrategy;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Get the config directory path
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".config").join("nsxctl"))
}

/// Expand ~ and environment variables in a path string.
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}

// ============================================================================
// Config File
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Manager base URL, e.g. `https://nsx.example.com`
    pub url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Per-request timeout
    pub timeout_secs: u64,
    /// How observed membership rules are paired with declared ones
    pub merge_strategy: MergeStrategy,
    /// Delete security policies even while they are in use
    pub force_policy_delete: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            url: None,
            username: None,
            password: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            merge_strategy: MergeStrategy::default(),
            force_policy_delete: false,
        }
    }
}

/// Connection values given on the command line or through the environment
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Everything needed to reach the manager
#[derive(Debug, Clone)]
pub struct Connection {
    pub url: String,
    pub username: String,
    pub password: String,
    pub timeout: Duration,
}

impl Config {
    /// Get the default config file path
    pub fn default_path() -> Result<PathBuf> {
        Ok(config_dir()?.join("config.toml"))
    }

    /// Load config from `path`, or from the default location.
    ///
    /// A missing default file yields the defaults; a missing explicit file
    /// is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, explicit) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (Self::default_path()?, false),
        };

        if !path.exists() {
            if explicit {
                bail!("Config file not found: {}", path.display());
            }
            log::debug!("Config file does not exist, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Layer command-line and environment values over the file
    pub fn with_overrides(mut self, overrides: &Overrides) -> Self {
        if let Some(url) = &overrides.url {
            self.url = Some(url.clone());
        }
        if let Some(username) = &overrides.username {
            self.username = Some(username.clone());
        }
        if let Some(password) = &overrides.password {
            self.password = Some(password.clone());
        }
        self
    }

    /// Resolve the connection settings, failing on anything missing
    pub fn connection(&self) -> Result<Connection> {
        let url = required(self.url.as_deref(), "url", "--url or NSX_URL")?;
        let username = required(
            self.username.as_deref(),
            "username",
            "--username or NSX_USERNAME",
        )?;
        let password = required(
            self.password.as_deref(),
            "password",
            "--password or NSX_PASSWORD",
        )?;
        if self.timeout_secs == 0 {
            bail!("timeout_secs must be greater than zero");
        }

        Ok(Connection {
            url,
            username,
            password,
            timeout: Duration::from_secs(self.timeout_secs),
        })
    }
}

fn required(value: Option<&str>, key: &str, flag: &str) -> Result<String> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => bail!(
            "No NSX {} configured (set `{}` in the config file, or use {})",
            key,
            key,
            flag
        ),
    }
}
