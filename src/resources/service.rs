//! The `freeipa_service` resource.
//!
//! Manages one Kerberos service principal. The principal is identified by
//! its canonical name `service/host`, which doubles as the resource ID.
//! Both halves force a replacement when changed, so an in-place update has
//! nothing to send to the directory.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::DirectoryClient;
use crate::error::ProviderError;
use crate::retry::{poll_while_not_found, BackoffPolicy};
use crate::schema::{Attribute, Diagnostic, Schema};
use crate::types::{AttributeChange, PlanResult};
use crate::validation;

/// Resource type name.
pub const RESOURCE_TYPE: &str = "freeipa_service";

/// State of a `freeipa_service` resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceState {
    /// Canonical name once created, empty before create and after delete.
    #[serde(default)]
    pub id: String,
    /// Service part of the principal, e.g. `HTTP`.
    pub service: String,
    /// Host part of the principal.
    pub host: String,
    /// Create the principal even if the host has no DNS record.
    #[serde(default)]
    pub force: bool,
}

impl ServiceState {
    /// A state for a principal that does not exist yet.
    pub fn new(service: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            service: service.into(),
            host: host.into(),
            force: false,
        }
    }

    /// Set the `force` flag.
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// `service/host`.
    pub fn canonical_name(&self) -> String {
        format!("{}/{}", self.service, self.host)
    }

    /// Decode a state document handed over by the engine.
    pub fn from_value(value: Value) -> Result<Self, ProviderError> {
        serde_json::from_value(value).map_err(|e| {
            ProviderError::Validation(format!("invalid {} state: {}", RESOURCE_TYPE, e))
        })
    }

    /// Encode for the engine.
    pub fn to_value(&self) -> Value {
        json!({
            "id": self.id,
            "service": self.service,
            "host": self.host,
            "force": self.force,
        })
    }
}

/// Split an import ID into its service and host parts.
///
/// The ID must be exactly two non-empty segments separated by `/`.
pub fn parse_import_id(raw: &str) -> Result<(String, String), ProviderError> {
    match raw.split_once('/') {
        Some((service, host)) if !service.is_empty() && !host.is_empty() && !host.contains('/') => {
            Ok((service.to_string(), host.to_string()))
        }
        _ => Err(ProviderError::InvalidRequest(format!(
            "invalid import ID '{}': expected <service>/<host>",
            raw
        ))),
    }
}

/// Schema of the `freeipa_service` resource.
pub fn schema() -> Schema {
    Schema::v0()
        .with_description("A Kerberos service principal in FreeIPA")
        .with_attribute(
            "id",
            Attribute::computed_string().with_description("Canonical name, service/host"),
        )
        .with_attribute(
            "service",
            Attribute::required_string()
                .with_force_new()
                .with_description("Service name, e.g. HTTP"),
        )
        .with_attribute(
            "host",
            Attribute::required_string()
                .with_force_new()
                .with_description("Fully qualified host name the service runs on"),
        )
        .with_attribute(
            "force",
            Attribute::optional_bool()
                .with_default(json!(false))
                .with_description("Skip the host DNS check on creation"),
        )
}

/// Validate a resource configuration.
pub fn validate(config: &Value) -> Vec<Diagnostic> {
    let mut diagnostics = validation::validate(&schema(), config);
    for name in ["service", "host"] {
        if let Some(part) = config.get(name).and_then(Value::as_str) {
            if part.is_empty() {
                diagnostics.push(
                    Diagnostic::error(format!("Attribute '{}' must not be empty", name))
                        .with_attribute(name),
                );
            } else if part.contains('/') {
                diagnostics.push(
                    Diagnostic::error(format!("Attribute '{}' must not contain '/'", name))
                        .with_detail("The principal name is formed as <service>/<host>")
                        .with_attribute(name),
                );
            }
        }
    }
    diagnostics
}

/// Compute a plan. `proposed` is `None` for a destroy.
pub fn plan(prior: Option<&ServiceState>, proposed: Option<ServiceState>) -> PlanResult {
    match (prior, proposed) {
        (None, Some(mut proposed)) => {
            proposed.id = proposed.canonical_name();
            let changes = vec![
                AttributeChange::added("id", json!(proposed.id)),
                AttributeChange::added("service", json!(proposed.service)),
                AttributeChange::added("host", json!(proposed.host)),
                AttributeChange::added("force", json!(proposed.force)),
            ];
            PlanResult::with_changes(proposed.to_value(), changes, false)
        }
        (Some(prior), None) => {
            let changes = ["id", "service", "host", "force"]
                .into_iter()
                .map(|path| AttributeChange::removed(path, prior.to_value()[path].clone()))
                .collect();
            PlanResult::with_changes(Value::Null, changes, false)
        }
        (Some(prior), Some(mut proposed)) => {
            let before = prior.to_value();
            let mut changes = Vec::new();
            let mut requires_replace = false;

            let resource_schema = schema();
            let force_new: Vec<_> = resource_schema.force_new_attributes().collect();
            proposed.id = prior.id.clone();
            let after = proposed.to_value();

            for path in ["service", "host", "force"] {
                if before[path] != after[path] {
                    requires_replace |= force_new.contains(&path);
                    changes.push(AttributeChange::modified(
                        path,
                        before[path].clone(),
                        after[path].clone(),
                    ));
                }
            }

            if changes.is_empty() {
                return PlanResult::no_change(before);
            }
            if requires_replace {
                proposed.id = proposed.canonical_name();
            }
            PlanResult::with_changes(proposed.to_value(), changes, requires_replace)
        }
        (None, None) => PlanResult::no_change(Value::Null),
    }
}

/// Reconciler for `freeipa_service`.
///
/// Every operation takes the directory client explicitly; the reconciler
/// itself only holds the replication wait settings.
#[derive(Debug, Clone)]
pub struct ServiceResource {
    replication: BackoffPolicy,
    cancel: CancellationToken,
}

impl Default for ServiceResource {
    fn default() -> Self {
        Self::new(BackoffPolicy::default(), CancellationToken::new())
    }
}

impl ServiceResource {
    /// Create a reconciler. `cancel` aborts a pending replication wait.
    pub fn new(replication: BackoffPolicy, cancel: CancellationToken) -> Self {
        Self {
            replication,
            cancel,
        }
    }

    /// Create the principal and return the state with its ID set.
    ///
    /// When a replication wait is configured, the call waits until the new
    /// principal is visible through `service_show`. The principal exists once
    /// `service_add` succeeds, so a wait that runs out of time or is cancelled
    /// only logs a warning and the state is still returned.
    pub async fn create(
        &self,
        client: &dyn DirectoryClient,
        desired: ServiceState,
    ) -> Result<ServiceState, ProviderError> {
        let name = desired.canonical_name();
        info!(principal = %name, force = desired.force, "Creating service");

        let entry = client.service_add(&name, desired.force).await?;
        debug!(principal = %name, canonical = ?entry.krbcanonicalname, "Service created");

        if self.replication.is_enabled() {
            let visible = poll_while_not_found(&self.replication, &self.cancel, &name, || {
                client.service_show(&name)
            })
            .await;
            match visible {
                Ok(_) => {}
                Err(e @ (ProviderError::DeadlineExceeded(_) | ProviderError::Cancelled(_))) => {
                    warn!(principal = %name, error = %e, "Created service is not visible yet");
                }
                Err(e) => return Err(e),
            }
        }

        Ok(ServiceState {
            id: name,
            ..desired
        })
    }

    /// Check that the principal still exists.
    ///
    /// Returns `None` when the directory reports it missing. The directory's
    /// answer is not copied back into the state.
    pub async fn read(
        &self,
        client: &dyn DirectoryClient,
        current: ServiceState,
    ) -> Result<Option<ServiceState>, ProviderError> {
        let name = current.canonical_name();
        info!(principal = %name, id = %current.id, "Refreshing service");

        match client.service_show(&name).await {
            Ok(_) => Ok(Some(current)),
            Err(e) if e.is_not_found() => {
                info!(principal = %name, "Service is gone");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Re-apply the principal and read it back.
    ///
    /// The directory answers a modification without changes with
    /// EmptyModlist, which counts as success.
    pub async fn update(
        &self,
        client: &dyn DirectoryClient,
        desired: ServiceState,
    ) -> Result<ServiceState, ProviderError> {
        let name = desired.canonical_name();
        info!(principal = %name, "Updating service");

        match client.service_mod(&name).await {
            Ok(_) | Err(ProviderError::EmptyModlist(_)) => {}
            Err(e) => return Err(e),
        }

        let desired = ServiceState {
            id: name.clone(),
            ..desired
        };
        self.read(client, desired)
            .await?
            .ok_or_else(|| ProviderError::NotFound(format!("service {} disappeared", name)))
    }

    /// Remove the principal and return the state with its ID cleared.
    pub async fn delete(
        &self,
        client: &dyn DirectoryClient,
        current: ServiceState,
    ) -> Result<ServiceState, ProviderError> {
        let name = current.canonical_name();
        info!(principal = %name, "Deleting service");

        client.service_del(std::slice::from_ref(&name)).await?;

        Ok(ServiceState {
            id: String::new(),
            ..current
        })
    }

    /// Adopt an existing principal from its `service/host` ID.
    pub async fn import(
        &self,
        client: &dyn DirectoryClient,
        raw_id: &str,
    ) -> Result<Vec<ServiceState>, ProviderError> {
        let (service, host) = parse_import_id(raw_id)?;
        info!(id = %raw_id, "Importing service");

        let state = ServiceState {
            id: raw_id.to_string(),
            service,
            host,
            force: false,
        };

        match self.read(client, state).await? {
            Some(state) => Ok(vec![state]),
            None => Err(ProviderError::NotFound(format!(
                "service {} does not exist",
                raw_id
            ))),
        }
    }
}
