//! Client error types

use reqwest::StatusCode;
use thiserror::Error;

/// Errors raised by the REST client layer
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("No credentials: a non-empty access token is required")]
    MissingCredentials,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// The server refused the payload (400 / 422)
    #[error("Rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Unauthorized ({status}): {message}")]
    Unauthorized { status: u16, message: String },

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("License '{found}' is not one of the supported tiers: {}", required.join(", "))]
    UnsupportedLicense { found: String, required: Vec<String> },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for client operations
pub type ClientResult<T> = std::result::Result<T, ClientError>;

impl ClientError {
    /// Map a non-success status and its body to an error
    pub fn from_status(status: StatusCode, message: String) -> Self {
        let code = status.as_u16();
        match status {
            StatusCode::NOT_FOUND => Self::NotFound(message),
            StatusCode::CONFLICT => Self::Conflict(message),
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => Self::Rejected {
                status: code,
                message,
            },
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Self::Unauthorized {
                status: code,
                message,
            },
            _ => Self::Api {
                status: code,
                message,
            },
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert!(ClientError::from_status(StatusCode::NOT_FOUND, String::new()).is_not_found());
        assert!(matches!(
            ClientError::from_status(StatusCode::CONFLICT, "exists".into()),
            ClientError::Conflict(m) if m == "exists"
        ));
        assert!(matches!(
            ClientError::from_status(StatusCode::UNPROCESSABLE_ENTITY, "bad".into()),
            ClientError::Rejected { status: 422, .. }
        ));
        assert!(matches!(
            ClientError::from_status(StatusCode::FORBIDDEN, String::new()),
            ClientError::Unauthorized { status: 403, .. }
        ));
        assert!(matches!(
            ClientError::from_status(StatusCode::BAD_GATEWAY, String::new()),
            ClientError::Api { status: 502, .. }
        ));
    }

    #[test]
    fn test_license_message_lists_tiers() {
        let err = ClientError::UnsupportedLicense {
            found: "OSS".into(),
            required: vec!["Enterprise".into(), "Commercial".into()],
        };
        assert_eq!(
            err.to_string(),
            "License 'OSS' is not one of the supported tiers: Enterprise, Commercial"
        );
    }
}
