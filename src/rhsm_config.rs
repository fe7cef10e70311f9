//! RHSM provider configuration.
//!
//! Unique responsibility: gather everything needed to talk to the RHSM API
//! (credential, endpoints, HTTP behaviour, export polling bounds).
//!
//! Values come from environment variables (with `.env` support in local dev) or
//! can be set explicitly; an explicit refresh token always wins over the env.

use std::{env, time::Duration};

use crate::rhsm_error::RhsmError;
use crate::rhsm_manifest::ExportPolicy;

/// Default RHSM management API base URL.
pub const DEFAULT_API_URL: &str = "https://api.access.redhat.com/management/v1";

/// Default Red Hat SSO token endpoint used to exchange the refresh token.
pub const DEFAULT_TOKEN_URL: &str =
    "https://sso.redhat.com/auth/realms/redhat-external/protocol/openid-connect/token";

/// Environment variable holding the offline refresh token.
pub const REFRESH_TOKEN_ENV: &str = "RHSM_REFRESH_TOKEN";

/// Configuration for the RHSM client and provider.
#[derive(Clone, Debug)]
pub struct RhsmConfig {
    /// Offline refresh token exchanged for an access token at configure time.
    /// Env: `RHSM_REFRESH_TOKEN` (required unless set explicitly)
    pub refresh_token: String,

    /// Management API base URL.
    /// Env: `RHSM_API_URL` (default: "<https://api.access.redhat.com/management/v1>")
    pub api_url: String,

    /// SSO token endpoint.
    /// Env: `RHSM_TOKEN_URL`
    pub token_url: String,

    /// HTTP request timeout in milliseconds.
    /// Env: `RHSM_HTTP_TIMEOUT_MS` (default: 30000)
    pub timeout_ms: u64,

    /// Maximum retry attempts for idempotent GET calls.
    /// Env: `RHSM_HTTP_RETRY_MAX` (default: 0)
    pub retry_max: u32,

    /// Initial backoff between GET retries in milliseconds.
    /// Env: `RHSM_HTTP_RETRY_BACKOFF_MS` (default: 500)
    pub retry_backoff_ms: u64,

    /// User agent for HTTP requests.
    /// Env: `RHSM_USER_AGENT` (default: "rhsm-provider/<version>")
    pub user_agent: String,

    /// Bounds of the manifest export poll loop.
    pub export: ExportPolicy,
}

impl RhsmConfig {
    /// Configuration with defaults and the given refresh token.
    #[must_use]
    pub fn new(refresh_token: impl Into<String>) -> Self {
        Self {
            refresh_token: refresh_token.into(),
            api_url: DEFAULT_API_URL.to_string(),
            token_url: DEFAULT_TOKEN_URL.to_string(),
            timeout_ms: 30_000,
            retry_max: 0,
            retry_backoff_ms: 500,
            user_agent: default_user_agent(),
            export: ExportPolicy::default(),
        }
    }

    /// Load configuration from environment variables.
    ///
    /// In local dev, this will also attempt to load `.env` from the current directory.
    ///
    /// # Errors
    ///
    /// Returns an error if required environment variables are missing or invalid.
    pub fn from_env() -> Result<Self, RhsmError> {
        Self::from_env_with_token(None)
    }

    /// Load configuration from the environment, preferring an explicitly
    /// configured refresh token over `RHSM_REFRESH_TOKEN`.
    ///
    /// # Errors
    ///
    /// Returns an error if no non-empty refresh token is available or another
    /// variable is invalid.
    pub fn from_env_with_token(refresh_token: Option<String>) -> Result<Self, RhsmError> {
        let _ = dotenvy::dotenv();

        let refresh_token = match refresh_token.filter(|t| !t.trim().is_empty()) {
            Some(token) => token,
            None => must_env(REFRESH_TOKEN_ENV)?,
        };

        let defaults = ExportPolicy::default();
        let export = ExportPolicy {
            initial_interval: Duration::from_millis(parse_u64_env(
                "RHSM_EXPORT_POLL_INTERVAL_MS",
                millis(defaults.initial_interval),
            )?),
            max_interval: Duration::from_millis(parse_u64_env(
                "RHSM_EXPORT_MAX_POLL_INTERVAL_MS",
                millis(defaults.max_interval),
            )?),
            backoff_factor: parse_f64_env("RHSM_EXPORT_BACKOFF_FACTOR", defaults.backoff_factor)?,
            max_duration: Duration::from_millis(parse_u64_env(
                "RHSM_EXPORT_TIMEOUT_MS",
                millis(defaults.max_duration),
            )?),
            max_attempts: parse_optional_u32_env("RHSM_EXPORT_MAX_ATTEMPTS")?,
        };

        Ok(Self {
            refresh_token,
            api_url: env::var("RHSM_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string()),
            token_url: env::var("RHSM_TOKEN_URL")
                .unwrap_or_else(|_| DEFAULT_TOKEN_URL.to_string()),
            timeout_ms: parse_u64_env("RHSM_HTTP_TIMEOUT_MS", 30_000)?,
            retry_max: parse_u32_env("RHSM_HTTP_RETRY_MAX", 0)?,
            retry_backoff_ms: parse_u64_env("RHSM_HTTP_RETRY_BACKOFF_MS", 500)?,
            user_agent: env::var("RHSM_USER_AGENT").unwrap_or_else(|_| default_user_agent()),
            export,
        })
    }

    /// Build the full URL for an API path (path must start with `/`).
    #[inline]
    #[must_use]
    pub fn api_endpoint(&self, path: &str) -> String {
        format!("{}{}", self.api_url.trim_end_matches('/'), path)
    }
}

fn default_user_agent() -> String {
    format!("rhsm-provider/{}", env!("CARGO_PKG_VERSION"))
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[inline]
fn must_env(key: &'static str) -> Result<String, RhsmError> {
    env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or(RhsmError::MissingEnv(key))
}

fn parse_u64_env(key: &'static str, default: u64) -> Result<u64, RhsmError> {
    env::var(key).map_or_else(
        |_| Ok(default),
        |v| {
            v.parse::<u64>().map_err(|_| RhsmError::InvalidEnv {
                key,
                value: v,
                reason: "expected an unsigned integer",
            })
        },
    )
}

fn parse_u32_env(key: &'static str, default: u32) -> Result<u32, RhsmError> {
    parse_optional_u32_env(key).map(|v| v.unwrap_or(default))
}

fn parse_optional_u32_env(key: &'static str) -> Result<Option<u32>, RhsmError> {
    env::var(key).map_or_else(
        |_| Ok(None),
        |v| {
            v.parse::<u32>().map(Some).map_err(|_| RhsmError::InvalidEnv {
                key,
                value: v,
                reason: "expected an unsigned integer",
            })
        },
    )
}

fn parse_f64_env(key: &'static str, default: f64) -> Result<f64, RhsmError> {
    env::var(key).map_or_else(
        |_| Ok(default),
        |v| match v.parse::<f64>() {
            Ok(f) if f >= 1.0 && f.is_finite() => Ok(f),
            _ => Err(RhsmError::InvalidEnv {
                key,
                value: v,
                reason: "expected a number >= 1.0",
            }),
        },
    )
}
