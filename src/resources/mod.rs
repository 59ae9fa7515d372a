//! Resource implementations.

pub mod service;

pub use service::{ServiceResource, ServiceState};
