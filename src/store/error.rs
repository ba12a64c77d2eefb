use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

use crate::validation::ValidationError;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Backend error ({status}): {message}")]
    Http { status: StatusCode, message: String },
    #[error("Backend request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Malformed backend response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("This snippet has expired")]
    Expired,
    #[error("Not signed in")]
    Unauthenticated,
    #[error("Backend is not configured (set CHAMBERS_BACKEND_URL and CHAMBERS_BACKEND_KEY)")]
    NotConfigured,
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        StoreError::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Builds an `Http` error from a non-success response body, preferring the
    /// message fields the REST and auth endpoints put in their JSON errors.
    pub fn from_response(status: StatusCode, body: &str) -> Self {
        #[derive(Deserialize)]
        struct ErrorBody {
            message: Option<String>,
            msg: Option<String>,
            error_description: Option<String>,
            error: Option<String>,
        }

        let message = serde_json::from_str::<ErrorBody>(body)
            .ok()
            .and_then(|b| b.message.or(b.msg).or(b.error_description).or(b.error))
            .unwrap_or_else(|| body.trim().to_string());
        let message = if message.is_empty() {
            status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string()
        } else {
            message
        };
        StoreError::Http { status, message }
    }
}
