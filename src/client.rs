//! Directory client.
//!
//! [`DirectoryClient`] is the narrow set of FreeIPA commands the service
//! resource needs. [`IpaClient`] implements it against the FreeIPA JSON-RPC
//! endpoint with a cookie-based session.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, REFERER};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, info, instrument};

use crate::config::ProviderConfig;
use crate::error::ProviderError;

/// API version sent with every command.
pub const API_VERSION: &str = "2.251";

/// Header FreeIPA sets on a rejected login.
const REJECTION_REASON_HEADER: &str = "x-ipa-rejection-reason";

/// A service entry as returned by `service_add`, `service_show` and `service_mod`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ServiceEntry {
    /// Distinguished name of the entry.
    #[serde(default)]
    pub dn: Option<String>,
    /// Canonical principal names, realm included.
    #[serde(default)]
    pub krbcanonicalname: Vec<String>,
    /// All principal names (aliases included).
    #[serde(default)]
    pub krbprincipalname: Vec<String>,
    /// Hosts allowed to manage this service.
    #[serde(default)]
    pub managedby_host: Vec<String>,
}

/// FreeIPA commands operating on service principals.
///
/// Every method takes the canonical `service/host` name. Errors come back as
/// [`ProviderError`], with FreeIPA's NotFound mapped to
/// [`ProviderError::NotFound`].
#[async_trait]
pub trait DirectoryClient: Send + Sync {
    /// `service_add`: create the principal.
    async fn service_add(&self, name: &str, force: bool) -> Result<ServiceEntry, ProviderError>;

    /// `service_show`: fetch the principal.
    async fn service_show(&self, name: &str) -> Result<ServiceEntry, ProviderError>;

    /// `service_mod` with no attribute changes.
    async fn service_mod(&self, name: &str) -> Result<ServiceEntry, ProviderError>;

    /// `service_del`: remove every listed principal.
    async fn service_del(&self, names: &[String]) -> Result<(), ProviderError>;
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    #[serde(default)]
    name: String,
    #[serde(default)]
    message: String,
}

/// JSON-RPC client for a FreeIPA server.
///
/// FreeIPA expires idle sessions. A command answered with 401 triggers one
/// fresh login and is sent again; a second 401 is `PermissionDenied`.
#[derive(Clone)]
pub struct IpaClient {
    http: Client,
    /// Base URL without trailing slash, e.g. `https://ipa.example.com`.
    base: String,
    username: String,
    password: String,
}

impl std::fmt::Debug for IpaClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IpaClient").field("base", &self.base).finish()
    }
}

impl IpaClient {
    /// Build the HTTP client and log in.
    #[instrument(skip(config), fields(host = %config.host, username = %config.username))]
    pub async fn connect(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let base = config.base_url()?;
        let http = Self::build_http(config).await?;
        let client = Self {
            http,
            base: base.as_str().trim_end_matches('/').to_string(),
            username: config.username.clone(),
            password: config.password.clone(),
        };
        client.login().await?;
        info!(base = %client.base, "Connected to FreeIPA");
        Ok(client)
    }

    async fn build_http(config: &ProviderConfig) -> Result<Client, ProviderError> {
        let mut builder = Client::builder()
            .cookie_store(true)
            .timeout(config.request_timeout)
            .connect_timeout(Duration::from_secs(10));

        if config.insecure {
            builder = builder.danger_accept_invalid_certs(true);
        }

        if let Some(path) = &config.ca_certificate {
            let pem = tokio::fs::read(path).await.map_err(|e| {
                ProviderError::Configuration(format!(
                    "failed to read CA certificate {}: {}",
                    path.display(),
                    e
                ))
            })?;
            let cert = reqwest::Certificate::from_pem(&pem).map_err(|e| {
                ProviderError::Configuration(format!(
                    "invalid CA certificate {}: {}",
                    path.display(),
                    e
                ))
            })?;
            builder = builder.add_root_certificate(cert);
        }

        builder.build().map_err(|e| {
            ProviderError::Configuration(format!("failed to build HTTP client: {}", e))
        })
    }

    fn referer(&self) -> String {
        format!("{}/ipa", self.base)
    }

    /// Open a session with a password login. The session cookie is kept by
    /// the HTTP client for every later call.
    async fn login(&self) -> Result<(), ProviderError> {
        let url = format!("{}/ipa/session/login_password", self.base);
        debug!(url = %url, "Logging in");

        let response = self
            .http
            .post(&url)
            .header(REFERER, self.referer())
            .header(ACCEPT, "text/plain")
            .form(&[("user", self.username.as_str()), ("password", self.password.as_str())])
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let reason = response
            .headers()
            .get(REJECTION_REASON_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.text().await.unwrap_or_default();

        if status == StatusCode::UNAUTHORIZED {
            return Err(ProviderError::PermissionDenied(format!(
                "login as '{}' rejected: {}",
                self.username,
                reason.unwrap_or_else(|| "unauthorized".to_string())
            )));
        }
        Err(status_error(status, &body))
    }

    /// Run one JSON-RPC command and return its `result` member.
    #[instrument(skip(self, args, options), name = "ipa.call")]
    pub async fn call(
        &self,
        method: &str,
        args: Vec<Value>,
        mut options: Map<String, Value>,
    ) -> Result<Value, ProviderError> {
        options.insert("version".to_string(), json!(API_VERSION));
        let body = json!({
            "id": 0,
            "method": method,
            "params": [args, options],
        });
        debug!(%body, "Sending command");

        let mut response = self.send_command(&body).await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            info!(method, "Session expired, logging in again");
            self.login().await?;
            response = self.send_command(&body).await?;
        }

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if status == StatusCode::UNAUTHORIZED {
                return Err(ProviderError::PermissionDenied(format!(
                    "session rejected for {}",
                    method
                )));
            }
            return Err(status_error(status, &body));
        }

        let envelope: RpcResponse = response.json().await?;
        if let Some(err) = envelope.error {
            debug!(code = err.code, name = %err.name, "Command failed");
            return Err(ProviderError::from_directory(err.code, err.name, err.message));
        }
        Ok(envelope.result.unwrap_or(Value::Null))
    }

    async fn send_command(&self, body: &Value) -> Result<reqwest::Response, ProviderError> {
        Ok(self
            .http
            .post(format!("{}/ipa/session/json", self.base))
            .header(REFERER, self.referer())
            .header(ACCEPT, "application/json")
            .json(body)
            .send()
            .await?)
    }

    async fn call_entry(
        &self,
        method: &str,
        name: &str,
        options: Map<String, Value>,
    ) -> Result<ServiceEntry, ProviderError> {
        let result = self.call(method, vec![json!(name)], options).await?;
        entry_from_result(result)
    }
}

#[async_trait]
impl DirectoryClient for IpaClient {
    async fn service_add(&self, name: &str, force: bool) -> Result<ServiceEntry, ProviderError> {
        let mut options = Map::new();
        options.insert("force".to_string(), json!(force));
        self.call_entry("service_add", name, options).await
    }

    async fn service_show(&self, name: &str) -> Result<ServiceEntry, ProviderError> {
        self.call_entry("service_show", name, Map::new()).await
    }

    async fn service_mod(&self, name: &str) -> Result<ServiceEntry, ProviderError> {
        self.call_entry("service_mod", name, Map::new()).await
    }

    async fn service_del(&self, names: &[String]) -> Result<(), ProviderError> {
        self.call("service_del", vec![json!(names)], Map::new())
            .await
            .map(|_| ())
    }
}

/// Pull the entry out of a `{"result": {...}, "value": ..., "summary": ...}` payload.
fn entry_from_result(result: Value) -> Result<ServiceEntry, ProviderError> {
    match result {
        Value::Object(mut map) => match map.remove("result") {
            Some(entry @ Value::Object(_)) => Ok(serde_json::from_value(entry)?),
            _ => Ok(ServiceEntry::default()),
        },
        _ => Ok(ServiceEntry::default()),
    }
}

fn status_error(status: StatusCode, body: &str) -> ProviderError {
    if status.is_server_error() {
        ProviderError::Unavailable(format!("FreeIPA returned {}: {}", status, body.trim()))
    } else {
        ProviderError::Directory {
            code: i64::from(status.as_u16()),
            name: "HTTPError".to_string(),
            message: body.trim().to_string(),
        }
    }
}
