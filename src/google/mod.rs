use reqwest::{Client, RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;

use crate::auth::{AuthError, TokenSource};

pub mod directory;
pub mod gmail;
pub mod migration;

pub const GMAIL_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1";
pub const DIRECTORY_API_BASE: &str = "https://admin.googleapis.com/admin/directory/v1";
pub const MIGRATION_UPLOAD_BASE: &str = "https://groupsmigration.googleapis.com/upload/groups/v1";
const REDACTED_BODY_MAX_LEN: usize = 200;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{operation} failed: status={status} body={body}")]
    Status {
        operation: &'static str,
        status: StatusCode,
        body: String,
    },

    #[error("{operation} request: {source}")]
    Transport {
        operation: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{operation} response: {source}")]
    Decode {
        operation: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("acquire access token: {0}")]
    Auth(#[from] AuthError),

    #[error("invalid endpoint {base}: {reason}")]
    Endpoint { base: String, reason: String },
}

impl ApiError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(StatusCode::NOT_FOUND)
    }
}

/// Base URLs of the three Google APIs the relay talks to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub gmail: String,
    pub directory: String,
    pub migration: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            gmail: GMAIL_API_BASE.to_string(),
            directory: DIRECTORY_API_BASE.to_string(),
            migration: MIGRATION_UPLOAD_BASE.to_string(),
        }
    }
}

impl Endpoints {
    /// All APIs rooted under one host, mirroring the public path layout.
    pub fn with_base(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            gmail: format!("{base}/gmail/v1"),
            directory: format!("{base}/admin/directory/v1"),
            migration: format!("{base}/upload/groups/v1"),
        }
    }
}

/// Authenticated client for the Gmail, Directory and Groups Migration APIs.
pub struct GoogleApi {
    client: Client,
    tokens: Box<dyn TokenSource>,
    endpoints: Endpoints,
}

impl GoogleApi {
    pub fn new(client: Client, tokens: Box<dyn TokenSource>) -> Self {
        Self {
            client,
            tokens,
            endpoints: Endpoints::default(),
        }
    }

    pub fn with_endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    async fn send(&self, operation: &'static str, request: RequestBuilder) -> Result<String, ApiError> {
        let token = self.tokens.access_token().await?;
        debug!(operation, "google api request");

        let response = request
            .bearer_auth(token)
            .header("accept", "application/json")
            .send()
            .await
            .map_err(|source| ApiError::Transport { operation, source })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|source| ApiError::Transport { operation, source })?;
        if !status.is_success() {
            return Err(ApiError::Status {
                operation,
                status,
                body: redact_response_body(&body),
            });
        }

        Ok(body)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        request: RequestBuilder,
    ) -> Result<T, ApiError> {
        let body = self.send(operation, request).await?;
        serde_json::from_str(&body).map_err(|source| ApiError::Decode { operation, source })
    }
}

/// Appends `segments` to `base`, percent-encoding each one as a single path segment.
pub(crate) fn endpoint_url(base: &str, segments: &[&str]) -> Result<Url, ApiError> {
    let invalid = |reason: String| ApiError::Endpoint {
        base: base.to_string(),
        reason,
    };
    let mut url = Url::parse(base).map_err(|error| invalid(error.to_string()))?;
    {
        let mut path = url
            .path_segments_mut()
            .map_err(|()| invalid("cannot carry path segments".to_string()))?;
        path.pop_if_empty().extend(segments);
    }
    Ok(url)
}

pub(crate) fn redact_response_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.len() <= REDACTED_BODY_MAX_LEN {
        trimmed.to_string()
    } else {
        let mut cut = REDACTED_BODY_MAX_LEN;
        while !trimmed.is_char_boundary(cut) {
            cut -= 1;
        }
        format!(
            "{}…[truncated {} bytes]",
            &trimmed[..cut],
            trimmed.len()
        )
    }
}
