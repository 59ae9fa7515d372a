//! Provider configuration.
//!
//! The engine hands the provider block over as JSON. It is decoded once into
//! [`ProviderConfig`]; values left out of the block fall back to the
//! `FREEIPA_*` environment variables.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use url::Url;

use crate::error::ProviderError;
use crate::schema::{Attribute, Diagnostic, Schema};

/// Environment variable holding the FreeIPA server host name or URL.
pub const ENV_HOST: &str = "FREEIPA_HOST";
/// Environment variable holding the login user.
pub const ENV_USERNAME: &str = "FREEIPA_USERNAME";
/// Environment variable holding the login password.
pub const ENV_PASSWORD: &str = "FREEIPA_PASSWORD";
/// Environment variable disabling TLS verification when set to `true` or `1`.
pub const ENV_INSECURE: &str = "FREEIPA_INSECURE";

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;
const DEFAULT_REPLICATION_TIMEOUT_SECS: u64 = 30;

/// Provider block exactly as written by the user.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    host: Option<String>,
    username: Option<String>,
    password: Option<String>,
    insecure: Option<bool>,
    ca_certificate: Option<String>,
    request_timeout_secs: Option<u64>,
    replication_timeout_secs: Option<u64>,
}

/// Typed and complete provider configuration.
#[derive(Clone)]
pub struct ProviderConfig {
    /// Server host name, or a full base URL such as `https://ipa.example.com`.
    pub host: String,
    /// Login user.
    pub username: String,
    /// Login password.
    pub password: String,
    /// Skip TLS certificate verification.
    pub insecure: bool,
    /// Extra PEM CA certificate to trust.
    pub ca_certificate: Option<PathBuf>,
    /// Timeout applied to every HTTP request.
    pub request_timeout: Duration,
    /// Upper bound on waiting for a new principal to replicate. Zero disables the wait.
    pub replication_timeout: Duration,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("host", &self.host)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("insecure", &self.insecure)
            .field("ca_certificate", &self.ca_certificate)
            .field("request_timeout", &self.request_timeout)
            .field("replication_timeout", &self.replication_timeout)
            .finish()
    }
}

impl ProviderConfig {
    /// Build a configuration with defaults for everything but the credentials.
    pub fn new(
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            username: username.into(),
            password: password.into(),
            insecure: false,
            ca_certificate: None,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            replication_timeout: Duration::from_secs(DEFAULT_REPLICATION_TIMEOUT_SECS),
        }
    }

    /// Disable TLS certificate verification.
    pub fn with_insecure(mut self, insecure: bool) -> Self {
        self.insecure = insecure;
        self
    }

    /// Set the replication wait bound.
    pub fn with_replication_timeout(mut self, timeout: Duration) -> Self {
        self.replication_timeout = timeout;
        self
    }

    /// Schema of the provider block.
    pub fn schema() -> Schema {
        Schema::v0()
            .with_description("Connection settings for the FreeIPA server")
            .with_attribute(
                "host",
                Attribute::optional_string()
                    .with_description("FreeIPA server host name or base URL (env FREEIPA_HOST)"),
            )
            .with_attribute(
                "username",
                Attribute::optional_string().with_description("Login user (env FREEIPA_USERNAME)"),
            )
            .with_attribute(
                "password",
                Attribute::optional_string()
                    .sensitive()
                    .with_description("Login password (env FREEIPA_PASSWORD)"),
            )
            .with_attribute(
                "insecure",
                Attribute::optional_bool()
                    .with_default(serde_json::json!(false))
                    .with_description("Skip TLS certificate verification (env FREEIPA_INSECURE)"),
            )
            .with_attribute(
                "ca_certificate",
                Attribute::optional_string().with_description("Path to a PEM CA certificate"),
            )
            .with_attribute(
                "request_timeout_secs",
                Attribute::optional_int64()
                    .with_default(serde_json::json!(DEFAULT_REQUEST_TIMEOUT_SECS)),
            )
            .with_attribute(
                "replication_timeout_secs",
                Attribute::optional_int64()
                    .with_default(serde_json::json!(DEFAULT_REPLICATION_TIMEOUT_SECS))
                    .with_description("How long to wait for a new service to replicate, 0 disables"),
            )
    }

    /// Decode the provider block, falling back to the process environment.
    pub fn from_value(value: &serde_json::Value) -> Result<Self, Vec<Diagnostic>> {
        Self::from_value_with_env(value, |key| std::env::var(key).ok())
    }

    /// Decode the provider block, falling back to `env` for missing values.
    pub fn from_value_with_env<F>(value: &serde_json::Value, env: F) -> Result<Self, Vec<Diagnostic>>
    where
        F: Fn(&str) -> Option<String>,
    {
        let raw: RawConfig = if value.is_null() {
            RawConfig::default()
        } else {
            serde_json::from_value(value.clone()).map_err(|e| {
                vec![Diagnostic::error("Invalid provider configuration").with_detail(e.to_string())]
            })?
        };

        let mut diagnostics = Vec::new();
        let mut required = |name: &str, explicit: Option<String>, env_key: &str| {
            match explicit.filter(|v| !v.is_empty()).or_else(|| env(env_key)) {
                Some(v) if !v.is_empty() => v,
                _ => {
                    diagnostics.push(
                        Diagnostic::error(format!("Missing required attribute '{}'", name))
                            .with_detail(format!("Set '{}' or the {} environment variable", name, env_key))
                            .with_attribute(name),
                    );
                    String::new()
                }
            }
        };

        let host = required("host", raw.host, ENV_HOST);
        let username = required("username", raw.username, ENV_USERNAME);
        let password = required("password", raw.password, ENV_PASSWORD);

        let insecure = raw.insecure.unwrap_or_else(|| {
            env(ENV_INSECURE)
                .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true"))
                .unwrap_or(false)
        });

        if !diagnostics.is_empty() {
            return Err(diagnostics);
        }

        let config = Self {
            host,
            username,
            password,
            insecure,
            ca_certificate: raw.ca_certificate.map(PathBuf::from),
            request_timeout: Duration::from_secs(
                raw.request_timeout_secs
                    .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
            ),
            replication_timeout: Duration::from_secs(
                raw.replication_timeout_secs
                    .unwrap_or(DEFAULT_REPLICATION_TIMEOUT_SECS),
            ),
        };

        if let Err(e) = config.base_url() {
            return Err(vec![Diagnostic::error("Invalid FreeIPA host")
                .with_detail(e.to_string())
                .with_attribute("host")]);
        }

        Ok(config)
    }

    /// Base URL of the server. A bare host name implies `https://`.
    pub fn base_url(&self) -> Result<Url, ProviderError> {
        let raw = if self.host.contains("://") {
            self.host.clone()
        } else {
            format!("https://{}", self.host)
        };
        let url = Url::parse(&raw)
            .map_err(|e| ProviderError::Configuration(format!("invalid host '{}': {}", self.host, e)))?;
        if url.host_str().is_none() {
            return Err(ProviderError::Configuration(format!(
                "host '{}' has no host name",
                self.host
            )));
        }
        Ok(url)
    }
}
