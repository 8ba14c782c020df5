//! Test fixtures for interacting with cluster components.
//!
//! Each client wraps one DC/OS component behind Admin Router. They share the
//! authenticated `reqwest::Client` built by
//! [`ClusterConnection`](crate::cluster::ClusterConnection).

pub mod cosmos_client;
pub mod exhibitor_client;
pub mod marathon_client;
pub mod mesos_client;

pub use cosmos_client::CosmosClient;
pub use exhibitor_client::ExhibitorClient;
pub use marathon_client::MarathonClient;
pub use mesos_client::MesosClient;

use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

/// Maximum length for error body in error messages.
const MAX_ERROR_BODY_LEN: usize = 256;

/// Regex pattern for JWT tokens (header.payload.signature).
static JWT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"eyJ[A-Za-z0-9_-]+\.[A-Za-z0-9_-]+(?:\.[A-Za-z0-9_-]*)?")
        .expect("JWT pattern is a valid regex")
});

/// Regex pattern for DC/OS `Authorization: token=...` values echoed in text.
static ACS_TOKEN_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)token=[A-Za-z0-9_.-]+").expect("ACS token pattern is a valid regex")
});

/// Errors shared by the component API clients.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Request failed with status {status}: {body}")]
    RequestFailed { status: u16, body: String },

    #[error("JSON deserialization failed: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl ApiError {
    /// HTTP status of a rejected request, if the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::RequestFailed { status, .. } => Some(*status),
            ApiError::HttpError(e) => e.status().map(|s| s.as_u16()),
            ApiError::JsonError(_) => None,
        }
    }
}

/// Sanitize error response body to remove sensitive data.
///
/// Removes `token=...` values first so the whole header value is replaced,
/// then standalone JWTs, then truncates to `MAX_ERROR_BODY_LEN`.
pub(crate) fn sanitize_error_body(body: &str) -> String {
    let sanitized = ACS_TOKEN_PATTERN.replace_all(body, "[TOKEN_REDACTED]");
    let sanitized = JWT_PATTERN.replace_all(&sanitized, "[JWT_REDACTED]");

    if sanitized.len() > MAX_ERROR_BODY_LEN {
        let mut cut = MAX_ERROR_BODY_LEN;
        while !sanitized.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}...[truncated]", &sanitized[..cut])
    } else {
        sanitized.into_owned()
    }
}

/// Turn a non-success response into `ApiError::RequestFailed`.
pub(crate) async fn check_status(
    response: reqwest::Response,
) -> Result<reqwest::Response, ApiError> {
    let status = response.status();

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ApiError::RequestFailed {
            status: status.as_u16(),
            body: sanitize_error_body(&body),
        });
    }

    Ok(response)
}

/// Check status and parse the JSON body.
pub(crate) async fn handle_response<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, ApiError> {
    let response = check_status(response).await?;
    let parsed = response.json().await?;
    Ok(parsed)
}
