//! Cosmos (package manager) client fixture.
//!
//! Provides an HTTP client for the DC/OS package API behind Admin Router at
//! `<dcos_url>/package`, covering install, uninstall, list and describe.
//!
//! Cosmos negotiates on versioned vendor media types, so every request sets
//! both `Content-Type` and `Accept` explicitly.

use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{handle_response, sanitize_error_body, ApiError};

/// Cosmos error type reported when a package is installed twice under the same app id.
pub const PACKAGE_ALREADY_INSTALLED: &str = "PackageAlreadyInstalled";

/// Cosmos client errors.
#[derive(Debug, Error)]
pub enum CosmosError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("Package {package} is already installed: {message}")]
    AlreadyInstalled { package: String, message: String },

    #[error("Cosmos rejected request with status {status} ({error_type}): {message}")]
    Rejected {
        status: u16,
        error_type: String,
        message: String,
    },
}

impl From<reqwest::Error> for CosmosError {
    fn from(e: reqwest::Error) -> Self {
        CosmosError::Api(ApiError::HttpError(e))
    }
}

/// Error envelope returned by Cosmos on 4xx/5xx.
#[derive(Debug, Deserialize)]
struct CosmosErrorBody {
    #[serde(rename = "type")]
    error_type: String,
    #[serde(default)]
    message: String,
}

/// Request body for `POST /package/install`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallRequest {
    pub package_name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub package_version: Option<String>,

    /// Opaque options tree (e.g. `{"service": {"name": "test-marathon"}}`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<serde_json::Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_id: Option<String>,
}

/// Response from `POST /package/install`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallResponse {
    pub package_name: String,
    pub package_version: String,

    #[serde(default)]
    pub app_id: Option<String>,

    #[serde(default)]
    pub post_install_notes: Option<String>,
}

/// Request body for `POST /package/uninstall`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UninstallRequest {
    pub package_name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_id: Option<String>,

    /// Remove every instance and its data, not just the first match.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub all: Option<bool>,
}

/// Response from `POST /package/uninstall`.
#[derive(Debug, Clone, Deserialize)]
pub struct UninstallResponse {
    pub results: Vec<UninstallResult>,
}

/// One removed app in an uninstall response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UninstallResult {
    pub package_name: String,
    pub app_id: String,

    #[serde(default)]
    pub package_version: Option<String>,

    #[serde(default)]
    pub post_uninstall_notes: Option<String>,
}

/// Request body for `POST /package/list`.
#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ListRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub package_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_id: Option<String>,
}

/// Response from `POST /package/list`.
#[derive(Debug, Clone, Deserialize)]
pub struct ListResponse {
    pub packages: Vec<InstalledPackage>,
}

/// An installed package instance.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstalledPackage {
    pub app_id: String,
    pub package_information: PackageInformation,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageInformation {
    pub package_definition: PackageDefinition,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PackageDefinition {
    pub name: String,
    pub version: String,
}

/// Request body for `POST /package/describe`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DescribeRequest {
    pub package_name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub package_version: Option<String>,
}

/// Response from `POST /package/describe`.
#[derive(Debug, Clone, Deserialize)]
pub struct DescribeResponse {
    pub package: PackageDescription,
}

/// Catalog metadata for one package version.
#[derive(Debug, Clone, Deserialize)]
pub struct PackageDescription {
    pub name: String,
    pub version: String,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub framework: bool,
}

/// Build the versioned vendor media type Cosmos expects.
fn media_type(operation: &str, kind: &str, version: &str) -> String {
    format!("application/vnd.dcos.package.{operation}-{kind}+json;charset=utf-8;version={version}")
}

/// Client for the Cosmos package API.
pub struct CosmosClient {
    base_url: String,
    http_client: Client,
}

impl CosmosClient {
    /// Create a new Cosmos client.
    ///
    /// `base_url` is the package API root, normally `<dcos_url>/package`.
    pub fn new(base_url: impl Into<String>, http_client: Client) -> Self {
        Self {
            base_url: base_url.into(),
            http_client,
        }
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Install a package.
    ///
    /// # Endpoint
    ///
    /// `POST /package/install`
    pub async fn install(&self, request: &InstallRequest) -> Result<InstallResponse, CosmosError> {
        let response = self.post("install", "v1", "v2", request).await?;
        self.handle_cosmos_response(&request.package_name, response)
            .await
    }

    /// Uninstall a package instance.
    ///
    /// # Endpoint
    ///
    /// `POST /package/uninstall`
    pub async fn uninstall(
        &self,
        request: &UninstallRequest,
    ) -> Result<UninstallResponse, CosmosError> {
        let response = self.post("uninstall", "v1", "v1", request).await?;
        self.handle_cosmos_response(&request.package_name, response)
            .await
    }

    /// List installed packages, optionally filtered by name or app id.
    ///
    /// # Endpoint
    ///
    /// `POST /package/list`
    pub async fn list(&self, request: &ListRequest) -> Result<ListResponse, CosmosError> {
        let response = self.post("list", "v1", "v1", request).await?;
        Ok(handle_response(response).await?)
    }

    /// Describe a package version from the catalog.
    ///
    /// # Endpoint
    ///
    /// `POST /package/describe`
    pub async fn describe(
        &self,
        request: &DescribeRequest,
    ) -> Result<DescribeResponse, CosmosError> {
        let response = self.post("describe", "v1", "v1", request).await?;
        self.handle_cosmos_response(&request.package_name, response)
            .await
    }

    async fn post<B: Serialize>(
        &self,
        operation: &str,
        request_version: &str,
        response_version: &str,
        body: &B,
    ) -> Result<reqwest::Response, CosmosError> {
        let url = format!("{}/{}", self.base_url, operation);

        let response = self
            .http_client
            .post(&url)
            .header(CONTENT_TYPE, media_type(operation, "request", request_version))
            .header(ACCEPT, media_type(operation, "response", response_version))
            .body(serde_json::to_vec(body).map_err(ApiError::from)?)
            .send()
            .await?;

        Ok(response)
    }

    /// Map Cosmos error envelopes onto `CosmosError`, otherwise parse JSON.
    async fn handle_cosmos_response<T: serde::de::DeserializeOwned>(
        &self,
        package: &str,
        response: reqwest::Response,
    ) -> Result<T, CosmosError> {
        let status = response.status();

        if status.is_success() {
            return Ok(handle_response(response).await?);
        }

        let body = response.text().await.unwrap_or_default();

        match serde_json::from_str::<CosmosErrorBody>(&body) {
            Ok(envelope) if envelope.error_type == PACKAGE_ALREADY_INSTALLED => {
                Err(CosmosError::AlreadyInstalled {
                    package: package.to_string(),
                    message: sanitize_error_body(&envelope.message),
                })
            }
            Ok(envelope) => Err(CosmosError::Rejected {
                status: status.as_u16(),
                error_type: envelope.error_type,
                message: sanitize_error_body(&envelope.message),
            }),
            Err(_) if status == reqwest::StatusCode::CONFLICT => {
                Err(CosmosError::AlreadyInstalled {
                    package: package.to_string(),
                    message: sanitize_error_body(&body),
                })
            }
            Err(_) => Err(CosmosError::Api(ApiError::RequestFailed {
                status: status.as_u16(),
                body: sanitize_error_body(&body),
            })),
        }
    }
}
