//! Error types for the FreeIPA provider.

use thiserror::Error;

/// FreeIPA error code for a missing entry.
pub const IPA_NOT_FOUND: i64 = 4001;

/// FreeIPA error code for a duplicate entry.
pub const IPA_DUPLICATE_ENTRY: i64 = 4002;

/// FreeIPA error code returned when a modification changes nothing.
pub const IPA_EMPTY_MODLIST: i64 = 4202;

/// Errors that can occur while serving the provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The requested directory entry was not found.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// The directory entry already exists.
    #[error("Resource already exists: {0}")]
    AlreadyExists(String),

    /// A validation error occurred.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Invalid request from the engine (for example a malformed import ID).
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// A configuration error occurred.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The requested resource type is unknown.
    #[error("Unknown resource type: {0}")]
    UnknownResource(String),

    /// Authentication against the directory failed.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// The directory server is temporarily unavailable.
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// A bounded wait ran out of time.
    #[error("Deadline exceeded: {0}")]
    DeadlineExceeded(String),

    /// The operation was cancelled by a provider shutdown.
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// The directory accepted a modification that changes nothing.
    #[error("No modifications to be performed: {0}")]
    EmptyModlist(String),

    /// Any other error reported by the directory.
    #[error("Directory error {code} ({name}): {message}")]
    Directory {
        /// Numeric FreeIPA error code, or the HTTP status for transport-level failures.
        code: i64,
        /// FreeIPA error class name.
        name: String,
        /// Human readable message.
        message: String,
    },

    /// An HTTP transport error occurred.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ProviderError {
    /// Build an error from a FreeIPA JSON-RPC error object.
    ///
    /// The codes the reconciler reacts to get their own variants, everything
    /// else is kept verbatim in [`ProviderError::Directory`].
    pub fn from_directory(code: i64, name: impl Into<String>, message: impl Into<String>) -> Self {
        let name = name.into();
        let message = message.into();
        match code {
            IPA_NOT_FOUND => Self::NotFound(message),
            IPA_DUPLICATE_ENTRY => Self::AlreadyExists(message),
            IPA_EMPTY_MODLIST => Self::EmptyModlist(message),
            _ => Self::Directory {
                code,
                name,
                message,
            },
        }
    }

    /// Get the error message as a string.
    pub fn message(&self) -> &str {
        match self {
            Self::NotFound(msg) => msg,
            Self::AlreadyExists(msg) => msg,
            Self::Validation(msg) => msg,
            Self::InvalidRequest(msg) => msg,
            Self::Configuration(msg) => msg,
            Self::UnknownResource(msg) => msg,
            Self::PermissionDenied(msg) => msg,
            Self::Unavailable(msg) => msg,
            Self::DeadlineExceeded(msg) => msg,
            Self::Cancelled(msg) => msg,
            Self::EmptyModlist(msg) => msg,
            Self::Directory { message, .. } => message,
            Self::Http(_err) => "http error (see Debug output)",
            Self::Serialization(_err) => "serialization error (see Debug output)",
        }
    }

    /// Whether the directory reported the entry as missing.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
