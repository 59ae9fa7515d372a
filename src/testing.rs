//! Testing utilities.
//!
//! [`ProviderTester`] drives a [`ProviderService`] without an engine, and
//! [`MemoryDirectory`] is an in-memory [`DirectoryClient`] that behaves like a
//! FreeIPA server for the service commands.
//!
//! # Example
//!
//! ```ignore
//! use freeipa_provider::testing::{MemoryDirectory, ProviderTester};
//! use freeipa_provider::FreeIpaProvider;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! #[tokio::test]
//! async fn test_create_service() {
//!     let directory = Arc::new(MemoryDirectory::new());
//!     let tester = ProviderTester::new(FreeIpaProvider::with_client(directory.clone()));
//!
//!     let state = tester
//!         .lifecycle_create("freeipa_service", json!({"service": "HTTP", "host": "web.example.com"}))
//!         .await
//!         .unwrap();
//!
//!     assert_eq!(state["id"], "HTTP/web.example.com");
//!     assert!(directory.contains("HTTP/web.example.com"));
//! }
//! ```

use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::client::{DirectoryClient, ServiceEntry};
use crate::error::{ProviderError, IPA_DUPLICATE_ENTRY, IPA_EMPTY_MODLIST, IPA_NOT_FOUND};
use crate::schema::{Diagnostic, ProviderSchema};
use crate::service::ProviderService;
use crate::types::{ImportedResource, PlanResult};

/// A test harness for provider implementations.
pub struct ProviderTester<P: ProviderService> {
    provider: P,
}

impl<P: ProviderService> ProviderTester<P> {
    /// Create a new tester for the given provider.
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    /// Get a reference to the underlying provider.
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Get the provider's schema.
    pub fn schema(&self) -> ProviderSchema {
        self.provider.schema()
    }

    /// Get the list of resource type names.
    pub fn resource_types(&self) -> Vec<String> {
        self.provider.metadata().resources
    }

    /// Validate provider configuration.
    pub async fn validate_provider_config(&self, config: Value) -> Result<(), TestError> {
        let diagnostics = self.provider.validate_provider_config(config).await?;
        check_diagnostics(diagnostics)
    }

    /// Configure the provider.
    pub async fn configure(&self, config: Value) -> Result<(), TestError> {
        let diagnostics = self.provider.configure(config).await?;
        check_diagnostics(diagnostics)
    }

    /// Stop the provider.
    pub async fn stop(&self) -> Result<(), ProviderError> {
        self.provider.stop().await
    }

    /// Validate a resource configuration.
    pub async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<(), TestError> {
        let diagnostics = self
            .provider
            .validate_resource_config(resource_type, config)
            .await?;
        check_diagnostics(diagnostics)
    }

    /// Plan a resource creation (no prior state).
    pub async fn plan_create(
        &self,
        resource_type: &str,
        proposed_state: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.provider
            .plan(resource_type, None, proposed_state.clone(), proposed_state)
            .await
    }

    /// Plan a resource update.
    pub async fn plan_update(
        &self,
        resource_type: &str,
        prior_state: Value,
        proposed_state: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.provider
            .plan(
                resource_type,
                Some(prior_state),
                proposed_state.clone(),
                proposed_state,
            )
            .await
    }

    /// Plan a resource deletion.
    pub async fn plan_delete(
        &self,
        resource_type: &str,
        prior_state: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.provider
            .plan(resource_type, Some(prior_state), Value::Null, Value::Null)
            .await
    }

    /// Create a new resource.
    pub async fn create(
        &self,
        resource_type: &str,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        self.provider.create(resource_type, planned_state).await
    }

    /// Read the current state of a resource. `Value::Null` means it is gone.
    pub async fn read(
        &self,
        resource_type: &str,
        current_state: Value,
    ) -> Result<Value, ProviderError> {
        self.provider.read(resource_type, current_state).await
    }

    /// Update an existing resource.
    pub async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        self.provider
            .update(resource_type, prior_state, planned_state)
            .await
    }

    /// Delete a resource.
    pub async fn delete(
        &self,
        resource_type: &str,
        current_state: Value,
    ) -> Result<(), ProviderError> {
        self.provider.delete(resource_type, current_state).await
    }

    /// Import an existing resource.
    pub async fn import_resource(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        self.provider.import_resource(resource_type, id).await
    }

    /// Run plan → create → read and return the state after read.
    pub async fn lifecycle_create(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Value, ProviderError> {
        let plan_result = self.plan_create(resource_type, config).await?;
        let created_state = self
            .create(resource_type, plan_result.planned_state)
            .await?;
        self.read(resource_type, created_state).await
    }

    /// Run plan → update → read and return the state after read.
    pub async fn lifecycle_update(
        &self,
        resource_type: &str,
        prior_state: Value,
        proposed_state: Value,
    ) -> Result<Value, ProviderError> {
        let plan_result = self
            .plan_update(resource_type, prior_state.clone(), proposed_state)
            .await?;
        let updated_state = self
            .update(resource_type, prior_state, plan_result.planned_state)
            .await?;
        self.read(resource_type, updated_state).await
    }

    /// Run plan → delete.
    pub async fn lifecycle_delete(
        &self,
        resource_type: &str,
        current_state: Value,
    ) -> Result<(), ProviderError> {
        let _ = self
            .plan_delete(resource_type, current_state.clone())
            .await?;
        self.delete(resource_type, current_state).await
    }
}

/// Error type for test operations that may fail with diagnostics.
#[derive(Debug)]
pub enum TestError {
    /// The operation failed with diagnostics.
    Diagnostics(Vec<Diagnostic>),
    /// The operation failed with a provider error.
    Provider(ProviderError),
}

impl std::fmt::Display for TestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TestError::Diagnostics(diags) => {
                writeln!(f, "Operation failed with {} diagnostic(s):", diags.len())?;
                for diag in diags {
                    write!(f, "  [{:?}] {}", diag.severity, diag.summary)?;
                    if let Some(detail) = &diag.detail {
                        write!(f, ": {}", detail)?;
                    }
                    if let Some(attr) = &diag.attribute {
                        write!(f, " (at {})", attr)?;
                    }
                    writeln!(f)?;
                }
                Ok(())
            }
            TestError::Provider(e) => write!(f, "Provider error: {}", e),
        }
    }
}

impl std::error::Error for TestError {}

impl From<ProviderError> for TestError {
    fn from(e: ProviderError) -> Self {
        TestError::Provider(e)
    }
}

fn check_diagnostics(diagnostics: Vec<Diagnostic>) -> Result<(), TestError> {
    let errors: Vec<_> = diagnostics.into_iter().filter(|d| d.is_error()).collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(TestError::Diagnostics(errors))
    }
}

/// Assert that a plan creates the resource.
///
/// # Panics
///
/// Panics if the plan has no changes or requires replacement.
pub fn assert_plan_creates(plan: &PlanResult) {
    assert!(
        !plan.changes.is_empty(),
        "Expected plan to create resource, but no changes were planned"
    );
    assert!(
        !plan.requires_replace,
        "Expected plan to create resource, but it requires replacement"
    );
}

/// Assert that a plan has no changes.
pub fn assert_plan_no_changes(plan: &PlanResult) {
    assert!(
        plan.changes.is_empty(),
        "Expected no changes, but found {} change(s): {:?}",
        plan.changes.len(),
        plan.changes.iter().map(|c| &c.path).collect::<Vec<_>>()
    );
}

/// Assert that a plan replaces the resource.
pub fn assert_plan_replaces(plan: &PlanResult) {
    assert!(
        plan.requires_replace,
        "Expected plan to require replacement, but it does not"
    );
}

/// Assert that a plan updates the resource in place.
pub fn assert_plan_updates_in_place(plan: &PlanResult) {
    assert!(
        !plan.changes.is_empty(),
        "Expected in-place update, but no changes were planned"
    );
    assert!(
        !plan.requires_replace,
        "Expected in-place update, but the plan requires replacement"
    );
}

/// Assert that a plan changes the given attribute.
pub fn assert_plan_changes_attribute(plan: &PlanResult, path: &str) {
    assert!(
        plan.changes.iter().any(|c| c.path == path),
        "Expected plan to change '{}', but changed: {:?}",
        path,
        plan.changes.iter().map(|c| &c.path).collect::<Vec<_>>()
    );
}

/// Assert that diagnostics contain an error mentioning `substring`.
pub fn assert_error_contains(diagnostics: &[Diagnostic], substring: &str) {
    assert!(
        diagnostics
            .iter()
            .any(|d| d.is_error() && (d.summary.contains(substring)
                || d.detail.as_deref().is_some_and(|x| x.contains(substring)))),
        "Expected an error containing '{}', got: {:?}",
        substring,
        diagnostics
    );
}

// =========================================================================
// In-memory directory
// =========================================================================

#[derive(Default)]
struct DirectoryState {
    principals: BTreeSet<String>,
    /// Remaining NotFound answers to `service_show` per freshly added principal.
    lagging: HashMap<String, u32>,
    failures: HashMap<&'static str, (i64, String, String)>,
    calls: Vec<String>,
}

/// In-memory stand-in for a FreeIPA server's service commands.
///
/// Mirrors the server's answers: NotFound (4001) for missing principals,
/// DuplicateEntry (4002) on a second add and EmptyModlist (4202) for a
/// modification that changes nothing.
#[derive(Default)]
pub struct MemoryDirectory {
    state: Mutex<DirectoryState>,
    replication_lag: u32,
}

impl MemoryDirectory {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every newly added principal invisible to the next `lag` shows.
    pub fn with_replication_lag(mut self, lag: u32) -> Self {
        self.replication_lag = lag;
        self
    }

    /// Seed an existing principal.
    pub fn with_principal(self, name: impl Into<String>) -> Self {
        self.lock().principals.insert(name.into());
        self
    }

    /// Make every later call of `method` fail with the given FreeIPA error.
    pub fn fail_with(&self, method: &'static str, code: i64, name: &str, message: &str) {
        self.lock()
            .failures
            .insert(method, (code, name.to_string(), message.to_string()));
    }

    /// Whether the principal exists.
    pub fn contains(&self, name: &str) -> bool {
        self.lock().principals.contains(name)
    }

    /// Commands received so far, formatted as `method name`.
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, DirectoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn begin(&self, method: &'static str, name: &str) -> Result<std::sync::MutexGuard<'_, DirectoryState>, ProviderError> {
        let mut state = self.lock();
        state.calls.push(format!("{} {}", method, name));
        if let Some((code, err_name, message)) = state.failures.get(method) {
            return Err(ProviderError::from_directory(*code, err_name.clone(), message.clone()));
        }
        Ok(state)
    }
}

fn entry(name: &str) -> ServiceEntry {
    ServiceEntry {
        dn: None,
        krbcanonicalname: vec![name.to_string()],
        krbprincipalname: vec![name.to_string()],
        managedby_host: name
            .split_once('/')
            .map(|(_, host)| vec![host.to_string()])
            .unwrap_or_default(),
    }
}

fn not_found(name: &str) -> ProviderError {
    ProviderError::from_directory(
        IPA_NOT_FOUND,
        "NotFound",
        format!("{}: service not found", name),
    )
}

#[async_trait]
impl DirectoryClient for MemoryDirectory {
    async fn service_add(&self, name: &str, _force: bool) -> Result<ServiceEntry, ProviderError> {
        let mut state = self.begin("service_add", name)?;
        if !state.principals.insert(name.to_string()) {
            return Err(ProviderError::from_directory(
                IPA_DUPLICATE_ENTRY,
                "DuplicateEntry",
                format!("service with name \"{}\" already exists", name),
            ));
        }
        if self.replication_lag > 0 {
            state.lagging.insert(name.to_string(), self.replication_lag);
        }
        Ok(entry(name))
    }

    async fn service_show(&self, name: &str) -> Result<ServiceEntry, ProviderError> {
        let mut state = self.begin("service_show", name)?;
        if let Some(remaining) = state.lagging.get_mut(name) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(not_found(name));
            }
        }
        if state.principals.contains(name) {
            Ok(entry(name))
        } else {
            Err(not_found(name))
        }
    }

    async fn service_mod(&self, name: &str) -> Result<ServiceEntry, ProviderError> {
        let state = self.begin("service_mod", name)?;
        if state.principals.contains(name) {
            Err(ProviderError::from_directory(
                IPA_EMPTY_MODLIST,
                "EmptyModlist",
                "no modifications to be performed",
            ))
        } else {
            Err(not_found(name))
        }
    }

    async fn service_del(&self, names: &[String]) -> Result<(), ProviderError> {
        let mut state = self.begin("service_del", &names.join(","))?;
        if let Some(missing) = names.iter().find(|n| !state.principals.contains(*n)) {
            return Err(not_found(missing));
        }
        for name in names {
            state.principals.remove(name);
            state.lagging.remove(name);
        }
        Ok(())
    }
}
