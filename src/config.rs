//! Connection settings for the job service.
//!
//! Every key is resolved on its own, highest precedence first:
//! system property (`-D key=value`), environment variable, config file,
//! built-in default.

use crate::error::ConfigError;
use anyhow::{Context, Result};
use regex::Regex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const SERVER_URL_KEY: &str = "kyuubi.server.url";
pub const USERNAME_KEY: &str = "kyuubi.server.username";
pub const PASSWORD_KEY: &str = "kyuubi.server.password";
pub const HISTORY_SERVER_URL_KEY: &str = "spark.history.server.url";
pub const TIMEOUT_KEY: &str = "kyuubi.client.timeout.secs";

const SERVER_URL_ENV: &str = "KYUUBI_SERVER_URL";
const USERNAME_ENV: &str = "KYUUBI_SERVER_USERNAME";
const PASSWORD_ENV: &str = "KYUUBI_SERVER_PASSWORD";
const HISTORY_SERVER_URL_ENV: &str = "SPARK_HISTORY_SERVER_URL";
const TIMEOUT_ENV: &str = "KYUUBI_CLIENT_TIMEOUT_SECS";

const DEFAULT_SERVER_URL: &str = "http://localhost:10099";
const DEFAULT_USERNAME: &str = "kyuubi-server";
const DEFAULT_PASSWORD: &str = "kyuubi-server";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

const CONFIG_FILE_NAME: &str = ".spark-submit.conf";

/// Default config file location: `~/.spark-submit.conf`.
pub fn default_config_path() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_default()
        .join(CONFIG_FILE_NAME)
}

/// Parse Java properties style text.
///
/// Accepts `key=value`, `key: value` and `key value`. Lines starting with
/// `#` or `!` are comments.
pub fn parse_properties(text: &str) -> BTreeMap<String, String> {
    let re = match Regex::new(r"^\s*([^#!\s=:][^\s=:]*)\s*(?:[=:]\s*|\s+|$)(.*?)\s*$") {
        Ok(re) => re,
        Err(_) => return BTreeMap::new(),
    };

    text.lines()
        .filter_map(|line| {
            let caps = re.captures(line)?;
            Some((caps[1].to_string(), caps[2].to_string()))
        })
        .collect()
}

/// Load a properties file. A missing file yields `Ok(None)`.
pub fn load_properties_file(path: &Path) -> Result<Option<BTreeMap<String, String>>> {
    if !path.exists() {
        return Ok(None);
    }
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read properties file: {}", path.display()))?;
    Ok(Some(parse_properties(&text)))
}

/// Resolved connection settings.
#[derive(Debug, Clone)]
pub struct Config {
    pub server_url: String,
    pub username: String,
    pub password: String,
    pub history_server_url: Option<String>,
    pub request_timeout: Duration,
    pub config_file: PathBuf,
    /// No config file and nothing set through properties or environment.
    pub using_defaults: bool,
}

impl Config {
    /// Resolve settings from the process environment and the config file.
    pub fn load(
        config_file: Option<PathBuf>,
        properties: &BTreeMap<String, String>,
    ) -> Result<Self> {
        let config_file = config_file.unwrap_or_else(default_config_path);
        let file_props = match load_properties_file(&config_file) {
            Ok(Some(props)) => {
                tracing::debug!(
                    path = %config_file.display(),
                    count = props.len(),
                    "loaded config file"
                );
                Some(props)
            }
            Ok(None) => {
                tracing::info!(path = %config_file.display(), "config file not found");
                None
            }
            Err(e) => {
                tracing::warn!(path = %config_file.display(), error = %e, "failed to load config file");
                None
            }
        };

        let config = Self::resolve(
            config_file,
            properties,
            |name| std::env::var(name).ok(),
            file_props.as_ref(),
        )?;
        tracing::debug!(
            server_url = %config.server_url,
            username = %config.username,
            history_server_url = ?config.history_server_url,
            timeout_secs = config.request_timeout.as_secs(),
            "resolved configuration"
        );
        Ok(config)
    }

    /// Resolve each key independently from the given sources.
    pub fn resolve(
        config_file: PathBuf,
        properties: &BTreeMap<String, String>,
        env: impl Fn(&str) -> Option<String>,
        file: Option<&BTreeMap<String, String>>,
    ) -> std::result::Result<Self, ConfigError> {
        let lookup = |key: &str, env_name: &str| -> (Option<String>, bool) {
            if let Some(v) = properties.get(key) {
                return (Some(v.clone()), true);
            }
            if let Some(v) = env(env_name) {
                return (Some(v), true);
            }
            (file.and_then(|f| f.get(key).cloned()), false)
        };

        let (server_url, url_explicit) = lookup(SERVER_URL_KEY, SERVER_URL_ENV);
        let (username, user_explicit) = lookup(USERNAME_KEY, USERNAME_ENV);
        let (password, password_explicit) = lookup(PASSWORD_KEY, PASSWORD_ENV);
        let (history_server_url, _) = lookup(HISTORY_SERVER_URL_KEY, HISTORY_SERVER_URL_ENV);
        let (timeout, _) = lookup(TIMEOUT_KEY, TIMEOUT_ENV);

        let timeout_secs = match timeout {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .ok_or_else(|| ConfigError::InvalidTimeout {
                    key: TIMEOUT_KEY.to_string(),
                    value: raw.clone(),
                })?,
            None => DEFAULT_TIMEOUT_SECS,
        };

        Ok(Self {
            server_url: server_url.unwrap_or_else(|| DEFAULT_SERVER_URL.to_string()),
            username: username.unwrap_or_else(|| DEFAULT_USERNAME.to_string()),
            password: password.unwrap_or_else(|| DEFAULT_PASSWORD.to_string()),
            history_server_url,
            request_timeout: Duration::from_secs(timeout_secs),
            config_file,
            using_defaults: file.is_none()
                && !url_explicit
                && !user_explicit
                && !password_explicit,
        })
    }

    /// REST base path, `<server>/api/v1`.
    pub fn base_url(&self) -> String {
        let url = self.server_url.trim().trim_end_matches('/');
        if url.contains("/api/v1") {
            url.to_string()
        } else {
            format!("{}/api/v1", url)
        }
    }

    /// Explain how to configure the tool when nothing was configured.
    pub fn defaults_notice(&self) -> Option<String> {
        if !self.using_defaults {
            return None;
        }
        Some(format!(
            "Using default configuration!\n\
             \x20  Kyuubi Server URL: {url}\n\
             \x20  Username: {user}\n\n\
             \x20  To configure the Kyuubi server, either:\n\
             \x20  1. Create {file} containing:\n\
             \x20     {SERVER_URL_KEY}=<your-kyuubi-server-url>\n\
             \x20     {USERNAME_KEY}=<your-username>\n\
             \x20     {PASSWORD_KEY}=<your-password>\n\
             \x20     {HISTORY_SERVER_URL_KEY}=<your-spark-history-server-url>  # Optional\n\
             \x20  2. Or export {SERVER_URL_ENV}, {USERNAME_ENV}, {PASSWORD_ENV}\n\
             \x20     and optionally {HISTORY_SERVER_URL_ENV}\n\
             \x20  3. Or pass -D {SERVER_URL_KEY}=<url> (and the other keys) on the command line",
            url = self.server_url,
            user = self.username,
            file = self.config_file.display(),
        ))
    }
}
