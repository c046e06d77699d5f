//! Error types for the provider
//!
//! Session errors (`ProviderError`) are fatal for the whole run. Lifecycle
//! errors (`ReconcileError`) are scoped to one resource and surface to the
//! host as a [`Diagnostic`].

use serde::Serialize;
use thiserror::Error;
use xray_client::ClientError;
use xray_types::PolicyFamily;

/// Errors raised while negotiating a session
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Missing or malformed configuration. Raised before any network call.
    #[error("Configuration error: {0}")]
    Config(String),

    /// No usable token could be resolved
    #[error("Authentication error: {0}")]
    Auth(String),

    /// The platform license tier is not supported
    #[error("License check failed: {0}")]
    License(String),

    /// REST client failure during negotiation
    #[error("Failed to {operation}: {source}")]
    Client {
        operation: &'static str,
        #[source]
        source: ClientError,
    },
}

/// Result type for session operations
pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

impl ProviderError {
    pub fn client(operation: &'static str, source: ClientError) -> Self {
        Self::Client { operation, source }
    }
}

/// Client-side schema violations, detected before any network call
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("policy name must not be empty")]
    EmptyName,

    #[error("policy must declare at least one rule")]
    EmptyRules,

    #[error("{path}: unknown field")]
    UnknownField { path: String },

    #[error("{path}: not valid for {family} policies (it is a {owner} criterion)")]
    IncompatibleCriteria {
        path: String,
        family: PolicyFamily,
        owner: PolicyFamily,
    },

    #[error("{path}: expected {expected}")]
    TypeMismatch { path: String, expected: &'static str },

    #[error("{path}: '{value}' is not one of: {allowed}")]
    InvalidEnum {
        path: String,
        value: String,
        allowed: String,
    },

    #[error("{path}: {reason}")]
    InvalidValue { path: String, reason: String },

    #[error("{path}: required field is missing")]
    MissingField { path: String },

    #[error("{path}: `{first}` and `{second}` are mutually exclusive")]
    ConflictingFields {
        path: String,
        first: String,
        second: String,
    },

    #[error("state schema version {found} is newer than the supported version {supported}")]
    UnsupportedSchemaVersion { found: u32, supported: u32 },
}

/// Errors raised by a policy lifecycle operation
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("Invalid policy: {0}")]
    Validation(#[from] ValidationError),

    #[error("Policy '{name}' already exists: {message}")]
    AlreadyExists { name: String, message: String },

    /// The server refused the payload; `message` is the server's text verbatim
    #[error("Policy '{name}' rejected by Xray: {message}")]
    RemoteValidation { name: String, message: String },

    #[error("Policy '{name}' not found")]
    NotFound { name: String },

    #[error("Policy name is immutable: '{from}' cannot be renamed to '{to}' in place")]
    ImmutableIdentifier { from: String, to: String },

    #[error("Policy '{name}' is a {found} policy, expected a {expected} policy")]
    FamilyMismatch {
        name: String,
        expected: PolicyFamily,
        found: PolicyFamily,
    },

    #[error("Failed to {operation} policy '{name}': {source}")]
    Remote {
        operation: &'static str,
        name: String,
        #[source]
        source: ClientError,
    },
}

/// Result type for lifecycle operations
pub type ReconcileResult<T> = std::result::Result<T, ReconcileError>;

impl ReconcileError {
    /// Wrap a client error with the operation that raised it.
    ///
    /// Conflicts, rejections and missing policies get their own variants.
    pub fn remote(operation: &'static str, name: &str, source: ClientError) -> Self {
        match source {
            ClientError::Conflict(message) => Self::AlreadyExists {
                name: name.to_string(),
                message,
            },
            ClientError::Rejected { message, .. } => Self::RemoteValidation {
                name: name.to_string(),
                message,
            },
            ClientError::NotFound(_) => Self::NotFound {
                name: name.to_string(),
            },
            source => Self::Remote {
                operation,
                name: name.to_string(),
                source,
            },
        }
    }
}

/// Errors reading or writing the local state file
#[derive(Debug, Error)]
pub enum StateError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed state file {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Unsupported state format version {0}")]
    UnsupportedFormat(u32),
}

/// Diagnostic severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// What the host reports to the user for one failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub summary: String,
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
}

impl Diagnostic {
    pub fn error(summary: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            summary: summary.into(),
            detail: detail.into(),
            resource: None,
        }
    }

    pub fn warning(summary: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            ..Self::error(summary, detail)
        }
    }

    /// Attach the resource address the diagnostic belongs to
    pub fn for_resource(mut self, address: impl Into<String>) -> Self {
        self.resource = Some(address.into());
        self
    }
}

impl From<&ReconcileError> for Diagnostic {
    fn from(err: &ReconcileError) -> Self {
        let summary = match err {
            ReconcileError::Validation(_) => "Invalid policy configuration",
            ReconcileError::AlreadyExists { .. } => "Policy already exists",
            ReconcileError::RemoteValidation { .. } => "Policy rejected by Xray",
            ReconcileError::NotFound { .. } => "Policy not found",
            ReconcileError::ImmutableIdentifier { .. } => "Policy requires replacement",
            ReconcileError::FamilyMismatch { .. } => "Policy family mismatch",
            ReconcileError::Remote { .. } => "Xray request failed",
        };
        Diagnostic::error(summary, err.to_string())
    }
}

impl From<&ProviderError> for Diagnostic {
    fn from(err: &ProviderError) -> Self {
        let summary = match err {
            ProviderError::Config(_) => "Invalid provider configuration",
            ProviderError::Auth(_) => "Authentication failed",
            ProviderError::License(_) => "Unsupported license",
            ProviderError::Client { .. } => "Provider configuration failed",
        };
        Diagnostic::error(summary, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_error_classification() {
        let err = ReconcileError::remote("create", "p1", ClientError::Conflict("dup".into()));
        assert!(matches!(err, ReconcileError::AlreadyExists { ref message, .. } if message == "dup"));

        let err = ReconcileError::remote(
            "update",
            "p1",
            ClientError::Rejected {
                status: 400,
                message: "Rule 'r1' has no criteria".into(),
            },
        );
        assert_eq!(
            err.to_string(),
            "Policy 'p1' rejected by Xray: Rule 'r1' has no criteria"
        );

        let err = ReconcileError::remote(
            "read",
            "p1",
            ClientError::Api {
                status: 502,
                message: "bad gateway".into(),
            },
        );
        assert!(err.to_string().starts_with("Failed to read policy 'p1'"));
    }

    #[test]
    fn test_diagnostic_from_errors() {
        let diag = Diagnostic::from(&ReconcileError::NotFound { name: "p1".into() })
            .for_resource("xray_license_policy.p1");
        assert_eq!(diag.severity, Severity::Error);
        assert_eq!(diag.summary, "Policy not found");
        assert_eq!(diag.resource.as_deref(), Some("xray_license_policy.p1"));

        let diag = Diagnostic::from(&ProviderError::License("OSS".into()));
        assert_eq!(diag.summary, "Unsupported license");
    }
}
