//! HTTP client for the resource service's internal API.
//!
//! The resource service owns memberships and session state, so it is the
//! permission oracle and the downstream cache owner for subscriptions.
//! [`HttpResourceClient`] implements both [`PermissionResolver`] and
//! [`CacheInvalidator`] against it:
//!
//! - `GET  {base}/internal/v1/resources/{type}/{id}/members/{user}`
//! - `GET  {base}/internal/v1/resources/{type}/{id}/liveness`
//! - `POST {base}/internal/v1/cache/invalidate`
//!
//! Path segments are percent-encoded; identifiers are never spliced into
//! the URL as raw text.

use crate::collaborators::{CacheInvalidator, PermissionResolver, ResolveError, ResourceLiveness};
use crate::policy::{ResourceKind, Role};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::secret::{ExposeSecret, SecretString};
use common::types::UserId;
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, instrument, warn};

/// Default timeout for resource API requests in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 5;

/// Connect timeout for resource API requests in seconds.
const CONNECT_TIMEOUT_SECS: u64 = 2;

#[derive(Debug, Error)]
pub enum ResourceClientError {
    #[error("Invalid resource API URL: {0}")]
    InvalidBaseUrl(String),

    #[error("Failed to build HTTP client: {0}")]
    Build(#[from] reqwest::Error),
}

#[derive(Debug, Deserialize)]
struct MembershipResponse {
    role: Role,
}

#[derive(Debug, Deserialize)]
struct LivenessResponse {
    active: bool,
    #[serde(default)]
    ends_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
struct InvalidateRequest<'a> {
    resource_id: &'a str,
}

/// Resource service client.
#[derive(Clone)]
pub struct HttpResourceClient {
    client: Client,
    base_url: Url,
    token: Option<SecretString>,
}

impl HttpResourceClient {
    /// Create a client for the resource API at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns `ResourceClientError::InvalidBaseUrl` if `base_url` is not an
    /// absolute http(s) URL, or `ResourceClientError::Build` if the HTTP
    /// client cannot be built.
    pub fn new(base_url: &str, token: Option<SecretString>) -> Result<Self, ResourceClientError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| ResourceClientError::InvalidBaseUrl(format!("{base_url}: {e}")))?;
        if base_url.cannot_be_a_base() || !matches!(base_url.scheme(), "http" | "https") {
            return Err(ResourceClientError::InvalidBaseUrl(base_url.to_string()));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url,
            token,
        })
    }

    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        // cannot_be_a_base URLs are rejected in new().
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token.expose_secret()),
            None => request,
        }
    }

    async fn get(&self, url: Url) -> Result<reqwest::Response, ResolveError> {
        self.authorize(self.client.get(url))
            .send()
            .await
            .map_err(|e| {
                warn!(target: "sc.resource_client", error = %e, "Resource API request failed");
                ResolveError::Unavailable("resource API unreachable".to_string())
            })
    }
}

fn unexpected_status(status: StatusCode) -> ResolveError {
    if status.is_server_error() {
        warn!(target: "sc.resource_client", status = %status, "Resource API returned server error");
        ResolveError::Unavailable(format!("resource API returned {status}"))
    } else {
        error!(target: "sc.resource_client", status = %status, "Unexpected resource API response");
        ResolveError::InvalidResponse(format!("unexpected status {status}"))
    }
}

async fn parse_json<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, ResolveError> {
    response.json().await.map_err(|e| {
        error!(target: "sc.resource_client", error = %e, "Failed to parse resource API response");
        ResolveError::InvalidResponse("malformed response body".to_string())
    })
}

#[async_trait]
impl PermissionResolver for HttpResourceClient {
    #[instrument(skip_all, fields(resource_type = %kind, resource_id = %resource_id))]
    async fn resolve_role(
        &self,
        kind: ResourceKind,
        resource_id: &str,
        caller: &UserId,
    ) -> Result<Option<Role>, ResolveError> {
        let url = self.url(&[
            "internal",
            "v1",
            "resources",
            kind.as_str(),
            resource_id,
            "members",
            caller.as_str(),
        ]);
        let response = self.get(url).await?;

        match response.status() {
            StatusCode::OK => {
                let membership: MembershipResponse = parse_json(response).await?;
                Ok(Some(membership.role))
            }
            StatusCode::FORBIDDEN | StatusCode::NOT_FOUND => {
                debug!(target: "sc.resource_client", "No membership for caller");
                Ok(None)
            }
            StatusCode::GONE => Err(ResolveError::ResourceGone),
            status => Err(unexpected_status(status)),
        }
    }

    #[instrument(skip_all, fields(resource_type = %kind, resource_id = %resource_id))]
    async fn resource_liveness(
        &self,
        kind: ResourceKind,
        resource_id: &str,
    ) -> Result<ResourceLiveness, ResolveError> {
        let url = self.url(&[
            "internal",
            "v1",
            "resources",
            kind.as_str(),
            resource_id,
            "liveness",
        ]);
        let response = self.get(url).await?;

        match response.status() {
            StatusCode::OK => {
                let liveness: LivenessResponse = parse_json(response).await?;
                Ok(ResourceLiveness {
                    active: liveness.active,
                    ends_at: liveness.ends_at,
                })
            }
            StatusCode::NOT_FOUND | StatusCode::GONE => Err(ResolveError::ResourceGone),
            status => Err(unexpected_status(status)),
        }
    }
}

#[async_trait]
impl CacheInvalidator for HttpResourceClient {
    #[instrument(skip_all, fields(resource_id = %resource_id))]
    async fn invalidate(&self, resource_id: &str) {
        let url = self.url(&["internal", "v1", "cache", "invalidate"]);
        let result = self
            .authorize(self.client.post(url))
            .json(&InvalidateRequest { resource_id })
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                debug!(target: "sc.resource_client", "Cache invalidated");
            }
            Ok(response) => {
                warn!(
                    target: "sc.resource_client",
                    status = %response.status(),
                    "Cache invalidation rejected"
                );
            }
            Err(e) => {
                warn!(target: "sc.resource_client", error = %e, "Cache invalidation failed");
            }
        }
    }
}
