//! Configuration loading and representation.
//!
//! Everything is read through a lookup function so tests can feed a map
//! instead of touching the process environment.
//!
//! ## Environment variables
//! - `BIND_ADDR`: listen address (default `0.0.0.0:8080`)
//! - `JWT_SECRET`: session signing secret
//! - `JWT_VALIDITY_DAYS`: session validity window in days (default 30)
//! - `DATABASE_URL`: Postgres URL; unset selects the in-memory store
//! - `USE_EMPLOYEE_API`: employee directory toggle (default off)
//! - `EMPLOYEE_API_*`: directory endpoint, credentials, and resilience knobs
//! - `AZURE_*`: identity provider app registration
//! - `GRAPH_BASE_URL`: Graph API base

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;
use url::Url;

use gatepass_auth::DEFAULT_SESSION_VALIDITY_DAYS;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
pub const DEV_JWT_SECRET: &str = "dev-secret";
pub const DEFAULT_AUTH_TYPE_ID: &str = "1";
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_STEP_MS: u64 = 2_000;
pub const DEFAULT_CACHE_TTL_SECS: u64 = 1_800;
pub const DEFAULT_CACHE_CAPACITY: u64 = 10_000;
pub const DEFAULT_AZURE_REDIRECT_URI: &str = "http://localhost:5173/callback";
pub const DEFAULT_GRAPH_BASE_URL: &str = "https://graph.microsoft.com/v1.0";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// A credential that never shows up in `Debug` output or logs.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Debug for Secret {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("Secret(**redacted**)")
    }
}

/// Employee directory settings.
#[derive(Debug, Clone)]
pub struct DirectoryConfig {
    /// Process-wide toggle. Off means no directory I/O at all.
    pub enabled: bool,
    pub base_url: Option<Url>,
    pub client_id: String,
    pub client_secret: Secret,
    pub auth_type_id: String,
    pub timeout: Duration,
    pub max_retries: u32,
    /// Linear backoff step: the n-th retry waits `n * retry_step`.
    pub retry_step: Duration,
    pub cache_ttl: Duration,
    pub cache_capacity: u64,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: None,
            client_id: String::new(),
            client_secret: Secret::default(),
            auth_type_id: DEFAULT_AUTH_TYPE_ID.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_retries: DEFAULT_MAX_RETRIES,
            retry_step: Duration::from_millis(DEFAULT_RETRY_STEP_MS),
            cache_ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
            cache_capacity: DEFAULT_CACHE_CAPACITY,
        }
    }
}

impl DirectoryConfig {
    /// Enabled directory pointing at `base_url`.
    pub fn enabled_at(base_url: Url) -> Self {
        Self {
            enabled: true,
            base_url: Some(base_url),
            ..Self::default()
        }
    }

    /// Log configuration at startup.
    pub fn log_config(&self) {
        tracing::info!(
            enabled = self.enabled,
            base_url = self.base_url.as_ref().map(Url::as_str).unwrap_or("-"),
            timeout_secs = self.timeout.as_secs(),
            max_retries = self.max_retries,
            retry_step_ms = self.retry_step.as_millis() as u64,
            cache_ttl_secs = self.cache_ttl.as_secs(),
            cache_capacity = self.cache_capacity,
            "employee directory configuration loaded"
        );
    }
}

/// Identity provider app registration. Present only when every part is set.
#[derive(Debug, Clone)]
pub struct AzureConfig {
    pub client_id: String,
    pub client_secret: Secret,
    pub tenant_id: String,
    pub redirect_uri: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub jwt_secret: Secret,
    pub session_validity: chrono::Duration,
    pub database_url: Option<Secret>,
    pub directory: DirectoryConfig,
    pub azure: Option<AzureConfig>,
    pub graph_base_url: Url,
}

impl AppConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from a map (tests).
    pub fn from_map(map: &HashMap<String, String>) -> Result<Self, ConfigError> {
        Self::from_lookup(|key| map.get(key).cloned())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);

        let bind_addr = env
            .string("BIND_ADDR")
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = bind_addr.parse::<SocketAddr>().map_err(|e| ConfigError::Invalid {
            key: "BIND_ADDR",
            reason: e.to_string(),
        })?;

        let jwt_secret = match env.string("JWT_SECRET") {
            Some(secret) => Secret::new(secret),
            None => {
                tracing::warn!("JWT_SECRET not set; using the development secret");
                Secret::new(DEV_JWT_SECRET)
            }
        };

        let validity_days = env.number("JWT_VALIDITY_DAYS", DEFAULT_SESSION_VALIDITY_DAYS as u64)?;
        if validity_days == 0 {
            return Err(ConfigError::Invalid {
                key: "JWT_VALIDITY_DAYS",
                reason: "must be at least one day".into(),
            });
        }

        let directory = Self::directory(&env)?;
        let azure = Self::azure(&env);

        let graph_base_url = env
            .string("GRAPH_BASE_URL")
            .unwrap_or_else(|| DEFAULT_GRAPH_BASE_URL.to_string());
        let graph_base_url = parse_url("GRAPH_BASE_URL", &graph_base_url)?;

        Ok(Self {
            bind_addr,
            jwt_secret,
            session_validity: chrono::Duration::days(validity_days as i64),
            database_url: env.string("DATABASE_URL").map(Secret::new),
            directory,
            azure,
            graph_base_url,
        })
    }

    fn directory<F>(env: &Env<F>) -> Result<DirectoryConfig, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let enabled = env.boolean("USE_EMPLOYEE_API", false)?;
        let base_url = env
            .string("EMPLOYEE_API_BASE_URL")
            .map(|raw| parse_url("EMPLOYEE_API_BASE_URL", &raw))
            .transpose()?;
        if enabled && base_url.is_none() {
            return Err(ConfigError::Missing("EMPLOYEE_API_BASE_URL"));
        }

        Ok(DirectoryConfig {
            enabled,
            base_url,
            client_id: env.string("EMPLOYEE_API_CLIENT_ID").unwrap_or_default(),
            client_secret: Secret::new(env.string("EMPLOYEE_API_CLIENT_SECRET").unwrap_or_default()),
            auth_type_id: env
                .string("EMPLOYEE_API_AUTH_TYPE_ID")
                .unwrap_or_else(|| DEFAULT_AUTH_TYPE_ID.to_string()),
            timeout: Duration::from_secs(env.number("EMPLOYEE_API_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS)?),
            max_retries: env.number("EMPLOYEE_API_MAX_RETRIES", DEFAULT_MAX_RETRIES as u64)? as u32,
            retry_step: Duration::from_millis(
                env.number("EMPLOYEE_API_RETRY_STEP_MS", DEFAULT_RETRY_STEP_MS)?,
            ),
            cache_ttl: Duration::from_secs(
                env.number("EMPLOYEE_API_CACHE_TTL_SECS", DEFAULT_CACHE_TTL_SECS)?,
            ),
            cache_capacity: env.number("EMPLOYEE_API_CACHE_CAPACITY", DEFAULT_CACHE_CAPACITY)?,
        })
    }

    fn azure<F>(env: &Env<F>) -> Option<AzureConfig>
    where
        F: Fn(&str) -> Option<String>,
    {
        match (
            env.string("AZURE_CLIENT_ID"),
            env.string("AZURE_CLIENT_SECRET"),
            env.string("AZURE_TENANT_ID"),
        ) {
            (Some(client_id), Some(client_secret), Some(tenant_id)) => Some(AzureConfig {
                client_id,
                client_secret: Secret::new(client_secret),
                tenant_id,
                redirect_uri: env
                    .string("AZURE_REDIRECT_URI")
                    .unwrap_or_else(|| DEFAULT_AZURE_REDIRECT_URI.to_string()),
            }),
            _ => {
                tracing::warn!("Azure settings incomplete; federated login is disabled");
                None
            }
        }
    }
}

struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Trimmed, non-empty value.
    fn string(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn number(&self, key: &'static str, default: u64) -> Result<u64, ConfigError> {
        match self.string(key) {
            Some(raw) => raw.parse::<u64>().map_err(|e| ConfigError::Invalid {
                key,
                reason: e.to_string(),
            }),
            None => Ok(default),
        }
    }

    fn boolean(&self, key: &'static str, default: bool) -> Result<bool, ConfigError> {
        match self.string(key).map(|v| v.to_ascii_lowercase()) {
            None => Ok(default),
            Some(v) => match v.as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" => Ok(false),
                other => Err(ConfigError::Invalid {
                    key,
                    reason: format!("expected a boolean, got '{other}'"),
                }),
            },
        }
    }
}

fn parse_url(key: &'static str, raw: &str) -> Result<Url, ConfigError> {
    Url::parse(raw).map_err(|e| ConfigError::Invalid {
        key,
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load(pairs: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_map(&map)
    }

    #[test]
    fn defaults_are_offline() {
        let cfg = load(&[]).unwrap();
        assert!(!cfg.directory.enabled);
        assert!(cfg.azure.is_none());
        assert!(cfg.database_url.is_none());
        assert_eq!(cfg.session_validity, chrono::Duration::days(30));
        assert_eq!(cfg.jwt_secret.expose(), DEV_JWT_SECRET);
        assert_eq!(cfg.directory.timeout, Duration::from_secs(10));
        assert_eq!(cfg.directory.max_retries, 3);
        assert_eq!(cfg.directory.retry_step, Duration::from_secs(2));
        assert_eq!(cfg.directory.cache_ttl, Duration::from_secs(1800));
        assert_eq!(cfg.directory.auth_type_id, "1");
        assert_eq!(cfg.graph_base_url.as_str(), "https://graph.microsoft.com/v1.0");
    }

    #[test]
    fn toggle_on_requires_base_url() {
        assert_eq!(
            load(&[("USE_EMPLOYEE_API", "true")]).unwrap_err(),
            ConfigError::Missing("EMPLOYEE_API_BASE_URL")
        );

        let cfg = load(&[
            ("USE_EMPLOYEE_API", "YES"),
            ("EMPLOYEE_API_BASE_URL", "http://erp.internal/api"),
            ("EMPLOYEE_API_CLIENT_ID", "gatepass"),
            ("EMPLOYEE_API_CLIENT_SECRET", "hunter2"),
        ])
        .unwrap();
        assert!(cfg.directory.enabled);
        assert_eq!(cfg.directory.client_id, "gatepass");
        assert_eq!(cfg.directory.client_secret.expose(), "hunter2");
    }

    #[test]
    fn bad_values_are_rejected() {
        assert!(matches!(
            load(&[("USE_EMPLOYEE_API", "maybe")]),
            Err(ConfigError::Invalid { key: "USE_EMPLOYEE_API", .. })
        ));
        assert!(matches!(
            load(&[("EMPLOYEE_API_MAX_RETRIES", "-1")]),
            Err(ConfigError::Invalid { key: "EMPLOYEE_API_MAX_RETRIES", .. })
        ));
        assert!(matches!(
            load(&[("BIND_ADDR", "nowhere")]),
            Err(ConfigError::Invalid { key: "BIND_ADDR", .. })
        ));
        assert!(matches!(
            load(&[("JWT_VALIDITY_DAYS", "0")]),
            Err(ConfigError::Invalid { key: "JWT_VALIDITY_DAYS", .. })
        ));
    }

    #[test]
    fn azure_needs_all_three_settings() {
        assert!(load(&[("AZURE_CLIENT_ID", "a"), ("AZURE_TENANT_ID", "t")])
            .unwrap()
            .azure
            .is_none());

        let cfg = load(&[
            ("AZURE_CLIENT_ID", "a"),
            ("AZURE_CLIENT_SECRET", "s"),
            ("AZURE_TENANT_ID", "t"),
        ])
        .unwrap();
        let azure = cfg.azure.unwrap();
        assert_eq!(azure.redirect_uri, DEFAULT_AZURE_REDIRECT_URI);
    }

    #[test]
    fn secrets_are_redacted_in_debug() {
        let cfg = load(&[("JWT_SECRET", "top-secret-value")]).unwrap();
        assert!(!format!("{cfg:?}").contains("top-secret-value"));
    }
}
