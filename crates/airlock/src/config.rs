//! Configuration for channels and the control CLI.
//!
//! Sources, lowest precedence first: built-in defaults, an optional TOML
//! file, then `AIRLOCK__*` environment variables (`__` separates sections,
//! e.g. `AIRLOCK__CONNECTION__SHIP`).

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::ChannelResult;
use crate::types::Connection;

const APP_NAME: &str = "airlock";

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "AIRLOCK";

/// HTTP client tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Timeout for a single command batch, in seconds.
    pub request_timeout_secs: u64,
    /// User-Agent header sent with every request.
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 30,
            user_agent: format!("{}/{}", APP_NAME, env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Top-level configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AirlockConfig {
    pub connection: Connection,
    pub client: ClientConfig,
}

impl AirlockConfig {
    /// Default config file location, `<config dir>/airlock/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_NAME).join("config.toml"))
    }

    /// Config file to use: `path` with `~` expanded, or the default location.
    pub fn resolve_path(path: Option<&Path>) -> Option<PathBuf> {
        path.map(expand_path).or_else(Self::default_path)
    }

    /// Load configuration from `path` (or the default location) and the
    /// process environment. A missing file is not an error.
    pub fn load(path: Option<&Path>) -> ChannelResult<Self> {
        let path = Self::resolve_path(path);
        Self::build(
            path.as_deref(),
            Environment::with_prefix(ENV_PREFIX).separator("__"),
        )
    }

    fn build(path: Option<&Path>, env: Environment) -> ChannelResult<Self> {
        let defaults = Self::default();
        let mut builder = Config::builder()
            .set_default("connection.url", defaults.connection.url)?
            .set_default("connection.port", i64::from(defaults.connection.port))?
            .set_default(
                "client.request_timeout_secs",
                defaults.client.request_timeout_secs as i64,
            )?;

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(false));
        }

        let built = builder.add_source(env.try_parsing(true)).build()?;
        Ok(built.try_deserialize()?)
    }

    /// Write the default configuration to `path`, creating parent directories.
    pub fn write_default(path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let toml = toml::to_string_pretty(&Self::default()).map_err(io::Error::other)?;
        let mut body = String::new();
        body.push_str("# Configuration for ");
        body.push_str(APP_NAME);
        body.push('\n');
        body.push_str("# File: ");
        body.push_str(&path.display().to_string());
        body.push_str("\n\n");
        body.push_str(&toml);
        fs::write(path, body)
    }

    /// Copy with the session cookie masked, for display.
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        if !config.connection.cookie.is_empty() {
            config.connection.cookie = "<redacted>".to_string();
        }
        config
    }
}

fn expand_path(path: &Path) -> PathBuf {
    match path.to_str() {
        Some(text) => PathBuf::from(shellexpand::tilde(text).into_owned()),
        None => path.to_path_buf(),
    }
}
