//! The FreeIPA provider.
//!
//! [`FreeIpaProvider`] implements [`ProviderService`]: it turns the
//! engine's JSON documents into typed states, hands them to the matching
//! resource reconciler together with the configured directory client, and
//! turns the results back into JSON.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument};

use crate::client::{DirectoryClient, IpaClient};
use crate::config::ProviderConfig;
use crate::error::ProviderError;
use crate::resources::service::{self, ServiceResource, ServiceState, RESOURCE_TYPE};
use crate::retry::BackoffPolicy;
use crate::schema::{Diagnostic, ProviderSchema};
use crate::service::ProviderService;
use crate::types::{ImportedResource, PlanResult};
use crate::validation;

/// What `configure` produces.
#[derive(Clone)]
struct Configured {
    client: Arc<dyn DirectoryClient>,
    services: ServiceResource,
}

/// Provider for FreeIPA service principals.
pub struct FreeIpaProvider {
    configured: RwLock<Option<Configured>>,
    replication: Option<BackoffPolicy>,
    cancel: CancellationToken,
}

impl Default for FreeIpaProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl FreeIpaProvider {
    /// An unconfigured provider; [`ProviderService::configure`] connects it.
    pub fn new() -> Self {
        Self {
            configured: RwLock::new(None),
            replication: None,
            cancel: CancellationToken::new(),
        }
    }

    /// A provider that uses an already connected client.
    pub fn with_client(client: Arc<dyn DirectoryClient>) -> Self {
        let cancel = CancellationToken::new();
        let services = ServiceResource::new(BackoffPolicy::default(), cancel.child_token());
        Self {
            configured: RwLock::new(Some(Configured { client, services })),
            replication: None,
            cancel,
        }
    }

    /// Override the replication wait.
    ///
    /// Applies to an injected client right away and to the client built by
    /// a later `configure`, where it wins over `replication_timeout_secs`.
    pub fn with_replication(mut self, policy: BackoffPolicy) -> Self {
        let token = self.cancel.child_token();
        if let Some(configured) = self.configured.get_mut() {
            configured.services = ServiceResource::new(policy, token);
        }
        self.replication = Some(policy);
        self
    }

    async fn configured(&self) -> Result<Configured, ProviderError> {
        self.configured.read().await.clone().ok_or_else(|| {
            ProviderError::Configuration("provider has not been configured".to_string())
        })
    }
}

fn check_resource_type(resource_type: &str) -> Result<(), ProviderError> {
    if resource_type == RESOURCE_TYPE {
        Ok(())
    } else {
        Err(ProviderError::UnknownResource(resource_type.to_string()))
    }
}

#[async_trait::async_trait]
impl ProviderService for FreeIpaProvider {
    fn schema(&self) -> ProviderSchema {
        ProviderSchema::new()
            .with_provider_config(ProviderConfig::schema())
            .with_resource(RESOURCE_TYPE, service::schema())
    }

    async fn validate_provider_config(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        if config.is_null() {
            return Ok(vec![]);
        }
        Ok(validation::validate(&ProviderConfig::schema(), &config))
    }

    #[instrument(skip(self, config))]
    async fn configure(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        let mut diagnostics = self.validate_provider_config(config.clone()).await?;
        if diagnostics.iter().any(Diagnostic::is_error) {
            return Ok(diagnostics);
        }

        let provider_config = match ProviderConfig::from_value(&config) {
            Ok(c) => c,
            Err(mut errors) => {
                diagnostics.append(&mut errors);
                return Ok(diagnostics);
            }
        };

        if provider_config.insecure {
            diagnostics.push(
                Diagnostic::warning("TLS certificate verification is disabled")
                    .with_attribute("insecure"),
            );
        }

        let client = IpaClient::connect(&provider_config)
            .await
            .inspect_err(|e| error!(error = %e, "Failed to connect to FreeIPA"))?;

        let policy = self
            .replication
            .unwrap_or_else(|| BackoffPolicy::with_timeout(provider_config.replication_timeout));
        let services = ServiceResource::new(policy, self.cancel.child_token());
        *self.configured.write().await = Some(Configured {
            client: Arc::new(client),
            services,
        });

        info!(host = %provider_config.host, "Provider configured");
        Ok(diagnostics)
    }

    async fn stop(&self) -> Result<(), ProviderError> {
        info!("Stopping provider");
        self.cancel.cancel();
        Ok(())
    }

    async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        check_resource_type(resource_type)?;
        Ok(service::validate(&config))
    }

    #[instrument(skip(self, prior_state, proposed_state, _config))]
    async fn plan(
        &self,
        resource_type: &str,
        prior_state: Option<Value>,
        proposed_state: Value,
        _config: Value,
    ) -> Result<PlanResult, ProviderError> {
        check_resource_type(resource_type)?;
        let prior = prior_state
            .filter(|v| !v.is_null())
            .map(ServiceState::from_value)
            .transpose()?;
        let proposed = if proposed_state.is_null() {
            None
        } else {
            Some(ServiceState::from_value(proposed_state)?)
        };
        Ok(service::plan(prior.as_ref(), proposed))
    }

    #[instrument(skip(self, planned_state))]
    async fn create(&self, resource_type: &str, planned_state: Value) -> Result<Value, ProviderError> {
        check_resource_type(resource_type)?;
        let desired = ServiceState::from_value(planned_state)?;
        let Configured { client, services } = self.configured().await?;

        let created = services
            .create(client.as_ref(), desired)
            .await
            .inspect_err(|e| error!(error = %e, "Create failed"))?;
        Ok(created.to_value())
    }

    #[instrument(skip(self, current_state))]
    async fn read(&self, resource_type: &str, current_state: Value) -> Result<Value, ProviderError> {
        check_resource_type(resource_type)?;
        let current = ServiceState::from_value(current_state)?;
        let Configured { client, services } = self.configured().await?;

        let state = services
            .read(client.as_ref(), current)
            .await
            .inspect_err(|e| error!(error = %e, "Read failed"))?;
        Ok(state.map(|s| s.to_value()).unwrap_or(Value::Null))
    }

    #[instrument(skip(self, _prior_state, planned_state))]
    async fn update(
        &self,
        resource_type: &str,
        _prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        check_resource_type(resource_type)?;
        let desired = ServiceState::from_value(planned_state)?;
        let Configured { client, services } = self.configured().await?;

        let updated = services
            .update(client.as_ref(), desired)
            .await
            .inspect_err(|e| error!(error = %e, "Update failed"))?;
        Ok(updated.to_value())
    }

    #[instrument(skip(self, current_state))]
    async fn delete(&self, resource_type: &str, current_state: Value) -> Result<(), ProviderError> {
        check_resource_type(resource_type)?;
        let current = ServiceState::from_value(current_state)?;
        let Configured { client, services } = self.configured().await?;

        services
            .delete(client.as_ref(), current)
            .await
            .inspect_err(|e| error!(error = %e, "Delete failed"))?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn import_resource(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        check_resource_type(resource_type)?;
        let Configured { client, services } = self.configured().await?;

        let imported = services
            .import(client.as_ref(), id)
            .await
            .inspect_err(|e| error!(error = %e, "Import failed"))?;
        Ok(imported
            .into_iter()
            .map(|state| ImportedResource::new(RESOURCE_TYPE, state.to_value()))
            .collect())
    }
}
