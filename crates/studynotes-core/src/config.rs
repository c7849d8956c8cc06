//! Process configuration.
//!
//! Loaded once at startup (CLI flags > environment > defaults), validated, and
//! then handed by value to [`OpenAiClient`](crate::OpenAiClient), which keeps
//! it behind an `Arc` for the rest of the process.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

/// Environment variable names.
pub mod env_vars {
    pub const API_KEY: &str = "OPENAI_API_KEY";
    pub const BASE_URL: &str = "OPENAI_BASE_URL";
    pub const MODEL: &str = "STUDYNOTES_MODEL";
    /// Per-request HTTP timeout in seconds.
    pub const TIMEOUT: &str = "STUDYNOTES_TIMEOUT";
    pub const POLL_INTERVAL_MS: &str = "STUDYNOTES_POLL_INTERVAL_MS";
    pub const MAX_POLL_ATTEMPTS: &str = "STUDYNOTES_MAX_POLL_ATTEMPTS";
    pub const TEMPERATURE: &str = "STUDYNOTES_TEMPERATURE";
}

/// Default values
pub mod defaults {
    pub const BASE_URL: &str = "https://api.openai.com/v1";
    pub const MODEL: &str = "gpt-4o-mini";
    pub const TIMEOUT_SECS: u64 = 60;
    pub const POLL_INTERVAL_MS: u64 = 1000;
    pub const MAX_POLL_ATTEMPTS: u32 = 30;
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} is not set (export it or add it to .env)")]
    MissingApiKey { var: &'static str },
    #[error("invalid value {value:?} for {var}: {reason}")]
    InvalidValue {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Provider API key. `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

/// Configuration for the provider client and the notes pipeline.
#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: ApiKey,
    pub base_url: String,
    pub model: String,
    pub request_timeout: Duration,
    /// Delay between vector store status checks during ingestion.
    pub poll_interval: Duration,
    pub max_poll_attempts: u32,
    pub temperature: Option<f32>,
}

impl Config {
    /// Configuration with default settings for the given key. Not validated.
    pub fn with_api_key(api_key: impl Into<String>) -> Self {
        Self {
            api_key: ApiKey::new(api_key),
            base_url: defaults::BASE_URL.to_string(),
            model: defaults::MODEL.to_string(),
            request_timeout: Duration::from_secs(defaults::TIMEOUT_SECS),
            poll_interval: Duration::from_millis(defaults::POLL_INTERVAL_MS),
            max_poll_attempts: defaults::MAX_POLL_ATTEMPTS,
            temperature: None,
        }
    }

    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load through an arbitrary variable lookup, so callers can layer CLI
    /// flags over the environment. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| {
            lookup(var)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let api_key = get(env_vars::API_KEY).ok_or(ConfigError::MissingApiKey {
            var: env_vars::API_KEY,
        })?;

        let mut config = Self::with_api_key(api_key);
        if let Some(base_url) = get(env_vars::BASE_URL) {
            config.base_url = base_url.trim_end_matches('/').to_string();
        }
        if let Some(model) = get(env_vars::MODEL) {
            config.model = model;
        }
        if let Some(secs) = parse_var::<u64>(env_vars::TIMEOUT, get(env_vars::TIMEOUT))? {
            config.request_timeout = Duration::from_secs(secs);
        }
        if let Some(ms) =
            parse_var::<u64>(env_vars::POLL_INTERVAL_MS, get(env_vars::POLL_INTERVAL_MS))?
        {
            config.poll_interval = Duration::from_millis(ms);
        }
        if let Some(attempts) =
            parse_var::<u32>(env_vars::MAX_POLL_ATTEMPTS, get(env_vars::MAX_POLL_ATTEMPTS))?
        {
            config.max_poll_attempts = attempts;
        }
        config.temperature = parse_var::<f32>(env_vars::TEMPERATURE, get(env_vars::TEMPERATURE))?;

        config.validate()?;
        Ok(config)
    }

    /// Check every setting. Called by the loaders and again by the client
    /// constructor, so nothing reaches the network with a bad configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_key.expose().trim().is_empty() {
            return Err(ConfigError::MissingApiKey {
                var: env_vars::API_KEY,
            });
        }
        if !(self.base_url.starts_with("https://") || self.base_url.starts_with("http://")) {
            return Err(invalid(
                env_vars::BASE_URL,
                &self.base_url,
                "must start with http:// or https://",
            ));
        }
        if self.model.trim().is_empty() {
            return Err(invalid(env_vars::MODEL, &self.model, "must not be empty"));
        }
        if self.request_timeout.is_zero() {
            return Err(invalid(env_vars::TIMEOUT, "0", "must be at least 1 second"));
        }
        if self.poll_interval.is_zero() {
            return Err(invalid(env_vars::POLL_INTERVAL_MS, "0", "must be positive"));
        }
        if self.max_poll_attempts == 0 {
            return Err(invalid(env_vars::MAX_POLL_ATTEMPTS, "0", "must be positive"));
        }
        if let Some(t) = self.temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(invalid(
                    env_vars::TEMPERATURE,
                    &t.to_string(),
                    "must be between 0.0 and 2.0",
                ));
            }
        }
        Ok(())
    }
}

fn parse_var<T>(var: &'static str, value: Option<String>) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    value
        .map(|v| v.parse::<T>().map_err(|e| invalid(var, &v, &e.to_string())))
        .transpose()
}

fn invalid(var: &'static str, value: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        var,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}
