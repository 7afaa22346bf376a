//! Client configuration.
//!
//! Defaults match a backend running locally. A JSON settings file in the
//! user config directory and environment variables can override them.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use url::Url;

use crate::{Error, Result};

const DEFAULT_API_BASE: &str = "http://localhost:8000";

/// Environment variable overriding the backend base URL.
pub const API_ENV: &str = "HONEYSENTINEL_API";
/// Environment variable overriding the push channel URL.
pub const PUSH_ENV: &str = "HONEYSENTINEL_PUSH_URL";

/// Runtime configuration for a browsing session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Base URL of the analysis backend.
    pub api_base: Url,
    /// WebSocket URL of the push channel.
    pub push_url: Url,
    /// Number of messages requested per bulk load.
    pub page_size: u32,
    /// Delay between authenticity polls while the backend is processing.
    pub poll_interval: Duration,
    /// Longest a poll chain may keep seeing `processing` before it fails.
    pub max_poll_wait: Duration,
    /// Timeout for a single HTTP request.
    pub request_timeout: Duration,
    /// First reconnect delay after the push channel drops.
    pub reconnect_initial: Duration,
    /// Upper bound for the reconnect delay.
    pub reconnect_max: Duration,
}

impl Default for Config {
    #[allow(clippy::expect_used)] // Constant input
    fn default() -> Self {
        let api_base = Url::parse(DEFAULT_API_BASE).expect("default API base is a valid URL");
        Self::new(api_base)
    }
}

impl Config {
    /// Creates a configuration for the given backend with default settings.
    #[must_use]
    pub fn new(api_base: Url) -> Self {
        Self {
            push_url: push_url_for(&api_base),
            api_base,
            page_size: 5,
            poll_interval: Duration::from_secs(1),
            max_poll_wait: Duration::from_secs(60),
            request_timeout: Duration::from_secs(30),
            reconnect_initial: Duration::from_secs(1),
            reconnect_max: Duration::from_secs(30),
        }
    }

    /// Creates a configuration builder.
    #[must_use]
    pub fn builder(api_base: Url) -> ConfigBuilder {
        ConfigBuilder::new(api_base)
    }

    /// Default settings file location.
    #[must_use]
    pub fn settings_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("honeysentinel")
            .join("settings.json")
    }

    /// Loads the configuration from the default settings file and the
    /// process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings file exists but cannot be read or
    /// parsed, or if a URL override is invalid.
    pub async fn load() -> Result<Self> {
        Self::load_from(&Self::settings_path())
            .await?
            .with_overrides(|key| std::env::var(key).ok())
    }

    /// Loads the configuration from a settings file. A missing file yields
    /// the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub async fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = tokio::fs::read_to_string(path).await?;
        let settings: Settings = serde_json::from_str(&contents)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        let config = settings.into_config()?;
        tracing::debug!("Loaded settings from {:?}", path);
        Ok(config)
    }

    /// Applies environment overrides using the given lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if an override is not a valid URL.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(api) = lookup(API_ENV) {
            let api_base = parse_url(&api)?;
            // Keep the push channel next to the API unless set explicitly.
            if self.push_url == push_url_for(&self.api_base) {
                self.push_url = push_url_for(&api_base);
            }
            self.api_base = api_base;
        }
        if let Some(push) = lookup(PUSH_ENV) {
            self.push_url = parse_url(&push)?;
        }
        Ok(self)
    }
}

fn parse_url(raw: &str) -> Result<Url> {
    Url::parse(raw).map_err(|e| Error::Config(format!("invalid URL {raw:?}: {e}")))
}

/// Derives the push channel URL from the API base: the same host and path
/// with a `ws` segment appended, over `ws` or `wss`.
fn push_url_for(api_base: &Url) -> Url {
    let mut url = api_base.clone();
    let scheme = if api_base.scheme() == "https" { "wss" } else { "ws" };
    // http/https -> ws/wss are both special schemes, so this cannot fail.
    let _ = url.set_scheme(scheme);
    if let Ok(mut segments) = url.path_segments_mut() {
        segments.pop_if_empty().push("ws");
    } else {
        url.set_path("/ws");
    }
    url.set_query(None);
    url.set_fragment(None);
    url
}

/// Builder for [`Config`].
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
    push_url: Option<Url>,
}

impl ConfigBuilder {
    /// Creates a new builder for the given backend.
    #[must_use]
    pub fn new(api_base: Url) -> Self {
        Self {
            config: Config::new(api_base),
            push_url: None,
        }
    }

    /// Sets the push channel URL.
    #[must_use]
    pub fn push_url(mut self, url: Url) -> Self {
        self.push_url = Some(url);
        self
    }

    /// Sets the bulk load size.
    #[must_use]
    pub const fn page_size(mut self, page_size: u32) -> Self {
        self.config.page_size = page_size;
        self
    }

    /// Sets the poll interval.
    #[must_use]
    pub const fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    /// Sets the maximum poll wait.
    #[must_use]
    pub const fn max_poll_wait(mut self, wait: Duration) -> Self {
        self.config.max_poll_wait = wait;
        self
    }

    /// Sets the HTTP request timeout.
    #[must_use]
    pub const fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    /// Sets the reconnect backoff bounds.
    #[must_use]
    pub const fn reconnect(mut self, initial: Duration, max: Duration) -> Self {
        self.config.reconnect_initial = initial;
        self.config.reconnect_max = max;
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> Config {
        let mut config = self.config;
        if let Some(url) = self.push_url {
            config.push_url = url;
        }
        config
    }
}

/// On-disk settings. Durations are in seconds.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Settings {
    api_base: Option<String>,
    push_url: Option<String>,
    page_size: Option<u32>,
    poll_interval_secs: Option<u64>,
    max_poll_wait_secs: Option<u64>,
    request_timeout_secs: Option<u64>,
    reconnect_initial_secs: Option<u64>,
    reconnect_max_secs: Option<u64>,
}

/// Longest accepted duration setting: one day.
const MAX_SETTING_SECS: u64 = 24 * 60 * 60;

/// Checks a duration setting against `min_secs..=MAX_SETTING_SECS`.
fn seconds(field: &str, secs: u64, min_secs: u64) -> Result<Duration> {
    if secs < min_secs || secs > MAX_SETTING_SECS {
        return Err(Error::Config(format!(
            "{field} must be between {min_secs} and {MAX_SETTING_SECS} seconds, got {secs}"
        )));
    }
    Ok(Duration::from_secs(secs))
}

impl Settings {
    fn into_config(self) -> Result<Config> {
        let api_base = match self.api_base {
            Some(raw) => parse_url(&raw)?,
            None => Config::default().api_base,
        };
        let mut builder = Config::builder(api_base);
        if let Some(raw) = self.push_url {
            builder = builder.push_url(parse_url(&raw)?);
        }
        if let Some(n) = self.page_size {
            if n == 0 {
                return Err(Error::Config("page_size must be at least 1".into()));
            }
            builder = builder.page_size(n);
        }
        if let Some(secs) = self.poll_interval_secs {
            builder = builder.poll_interval(seconds("poll_interval_secs", secs, 1)?);
        }
        if let Some(secs) = self.max_poll_wait_secs {
            builder = builder.max_poll_wait(seconds("max_poll_wait_secs", secs, 0)?);
        }
        if let Some(secs) = self.request_timeout_secs {
            builder = builder.request_timeout(seconds("request_timeout_secs", secs, 1)?);
        }
        let defaults = Config::default();
        let initial = match self.reconnect_initial_secs {
            Some(secs) => seconds("reconnect_initial_secs", secs, 1)?,
            None => defaults.reconnect_initial,
        };
        let max = match self.reconnect_max_secs {
            Some(secs) => seconds("reconnect_max_secs", secs, 1)?,
            None => defaults.reconnect_max,
        };
        Ok(builder.reconnect(initial, max).build())
    }
}
