//! Bot configuration.
//!
//! Read once at startup from a JSON file (`config.json` by default). Only
//! `server`, `nickname` and `channels` are required; everything else has a
//! default matching the public SmartOS/illumos services.

use std::path::{Path, PathBuf};
use std::time::Duration;

use jinni_sdk::client::{ConnectConfig, ReconnectConfig};
use serde::Deserialize;
use thiserror::Error;

/// Default config file location, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config.json";
/// Default holdout window: 180,000 ms.
pub const DEFAULT_HOLDOUT_SECS: u64 = 180;
/// Default cap on references extracted per pattern from one message.
pub const DEFAULT_MAX_REFERENCES: usize = 8;
/// Owner assumed for bare `repo#N` references.
pub const DEFAULT_GITHUB_OWNER: &str = "joyent";
/// Sent on every outbound HTTP request.
pub const DEFAULT_USER_AGENT: &str = concat!("jinni/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {0} does not exist")]
    Missing(PathBuf),
    #[error("can't read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("bad config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Connection settings plus bot tunables.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Server host, optionally with `:port`.
    pub server: String,
    /// Port when `server` has none. Default: 6697 with TLS, 6667 without.
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub tls: bool,
    /// Skip TLS certificate verification.
    #[serde(default)]
    pub tls_insecure: bool,
    pub nickname: String,
    /// Ident. Defaults to the nickname.
    #[serde(default)]
    pub username: Option<String>,
    /// Real name. Defaults to the nickname.
    #[serde(default)]
    pub realname: Option<String>,
    /// NickServ password, used for IDENTIFY and GHOST.
    #[serde(default)]
    pub password: Option<String>,
    pub channels: Vec<String>,
    #[serde(flatten)]
    pub bot: BotConfig,
}

/// Settings consumed by the classifier, holdout store and resolver.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    pub holdout_secs: u64,
    pub max_references: usize,
    pub github_owner: String,
    /// No timeout when unset.
    pub http_timeout_secs: Option<u64>,
    pub user_agent: String,
    pub endpoints: Endpoints,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            holdout_secs: DEFAULT_HOLDOUT_SECS,
            max_references: DEFAULT_MAX_REFERENCES,
            github_owner: DEFAULT_GITHUB_OWNER.to_string(),
            http_timeout_secs: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            endpoints: Endpoints::default(),
        }
    }
}

impl BotConfig {
    pub fn holdout(&self) -> Duration {
        Duration::from_secs(self.holdout_secs)
    }

    pub fn http_timeout(&self) -> Option<Duration> {
        self.http_timeout_secs.map(Duration::from_secs)
    }
}

/// Base URLs of the services the bot links to.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    /// Ticket URL prefix; the ticket ID is appended.
    pub bugview: String,
    pub github_api: String,
    pub github_web: String,
    /// RFD tree; `/<0077>/README.md` is appended.
    pub rfd: String,
    /// illumos issue URL prefix; the numeric ID is appended.
    pub illumos: String,
    pub changelog: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            bugview: "https://smartos.org/bugview/".to_string(),
            github_api: "https://api.github.com".to_string(),
            github_web: "https://github.com".to_string(),
            rfd: "https://github.com/joyent/rfd/blob/master/rfd".to_string(),
            illumos: "https://www.illumos.org/issues/".to_string(),
            changelog: "http://us-east.manta.joyent.com/Joyent_Dev/public/SmartOS/smartos.html"
                .to_string(),
        }
    }
}

impl Config {
    /// Load and validate the config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::Missing(path.to_path_buf()));
        }
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.server.trim().is_empty() {
            return Err(ConfigError::Invalid("server is empty".into()));
        }
        if self.nickname.is_empty() || self.nickname.contains(char::is_whitespace) {
            return Err(ConfigError::Invalid(format!(
                "nickname {:?} is not a valid IRC nick",
                self.nickname
            )));
        }
        if self.bot.max_references == 0 {
            return Err(ConfigError::Invalid("max_references must be at least 1".into()));
        }
        Ok(())
    }

    /// `host:port` to dial.
    pub fn server_addr(&self) -> String {
        if self.server.contains(':') {
            return self.server.clone();
        }
        let port = self.port.unwrap_or(if self.tls { 6697 } else { 6667 });
        format!("{}:{port}", self.server)
    }

    pub fn connect_config(&self) -> ConnectConfig {
        ConnectConfig {
            server_addr: self.server_addr(),
            nick: self.nickname.clone(),
            user: self.username.clone().unwrap_or_else(|| self.nickname.clone()),
            realname: self.realname.clone().unwrap_or_else(|| self.nickname.clone()),
            tls: self.tls,
            tls_insecure: self.tls_insecure,
        }
    }

    pub fn reconnect_config(&self) -> ReconnectConfig {
        ReconnectConfig {
            channels: self.channels.clone(),
            ..Default::default()
        }
    }
}
