//! FreeIPA Provider
//!
//! An infrastructure-as-code provider that manages Kerberos service
//! principals in a [FreeIPA](https://www.freeipa.org) directory.
//!
//! # Overview
//!
//! The crate provides:
//!
//! - **ProviderService trait**: the seam an engine drives (schema, configure, plan, CRUD, import)
//! - **FreeIpaProvider**: the provider, exposing the `freeipa_service` resource
//! - **Directory client**: the `DirectoryClient` trait and the JSON-RPC `IpaClient`
//! - **Schema & validation**: attribute schemas and diagnostics for provider and resource config
//! - **Error types**: [`ProviderError`] with FreeIPA error codes mapped to variants
//! - **Logging**: `tracing` subscriber setup writing to stderr
//! - **Testing**: `ProviderTester` and an in-memory directory
//!
//! # Quick Start
//!
//! ```ignore
//! use freeipa_provider::{init_logging, FreeIpaProvider, ProviderService};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     init_logging();
//!
//!     let provider = FreeIpaProvider::new();
//!     provider
//!         .configure(json!({
//!             "host": "ipa.example.com",
//!             "username": "admin",
//!             "password": "secret"
//!         }))
//!         .await?;
//!
//!     let state = provider
//!         .create("freeipa_service", json!({"service": "HTTP", "host": "web.example.com"}))
//!         .await?;
//!     assert_eq!(state["id"], "HTTP/web.example.com");
//!     Ok(())
//! }
//! ```
//!
//! # Resource `freeipa_service`
//!
//! | Attribute | Type | Notes |
//! |-----------|------|-------|
//! | `service` | string | required, forces replacement |
//! | `host`    | string | required, forces replacement |
//! | `force`   | bool   | optional, default `false`, only used on creation |
//! | `id`      | string | computed, `service/host` |
//!
//! Import IDs use the same `service/host` form.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod provider;
pub mod resources;
pub mod retry;
pub mod schema;
pub mod service;
pub mod testing;
pub mod types;
pub mod validation;

// Re-export main types at crate root
pub use client::{DirectoryClient, IpaClient, ServiceEntry};
pub use config::ProviderConfig;
pub use error::ProviderError;
pub use logging::{init_logging, init_logging_with_default, try_init_logging};
pub use provider::FreeIpaProvider;
pub use resources::{ServiceResource, ServiceState};
pub use retry::BackoffPolicy;
pub use schema::ProviderSchema;
pub use service::ProviderService;
pub use types::{AttributeChange, ImportedResource, PlanResult, ProviderMetadata};
