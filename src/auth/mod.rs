use std::future::Future;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::google::redact_response_body;

pub mod installed;
pub mod service_account;

pub use installed::{AuthorizedUser, ClientSecret, InstalledAppFlow};
pub use service_account::{ServiceAccount, ServiceAccountKey};

pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/auth";

/// Scopes needed to read and relabel mail, manage groups and write group archives.
pub const SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/gmail.labels",
    "https://www.googleapis.com/auth/gmail.modify",
    "https://www.googleapis.com/auth/admin.directory.group",
    "https://www.googleapis.com/auth/apps.groups.settings",
    "https://www.googleapis.com/auth/apps.groups.migration",
];

const CACHE_SKEW_SECONDS: i64 = 60;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("read credential file {}: {source}", .path.display())]
    CredentialFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse credential file {}: {source}", .path.display())]
    CredentialFormat {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid credential material: {0}")]
    InvalidKey(String),

    #[error("token request to {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("token endpoint rejected request: status={status} body={body}")]
    Rejected { status: StatusCode, body: String },

    #[error("decode token response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("loopback redirect listener: {0}")]
    Listener(#[source] std::io::Error),

    #[error("authorization flow: {0}")]
    Flow(String),
}

/// Source of bearer tokens for Google API calls.
#[async_trait(?Send)]
pub trait TokenSource {
    async fn access_token(&self) -> Result<String, AuthError>;
}

/// A fixed token, for callers that already hold one.
#[derive(Debug, Clone)]
pub struct StaticToken(pub String);

#[async_trait(?Send)]
impl TokenSource for StaticToken {
    async fn access_token(&self) -> Result<String, AuthError> {
        Ok(self.0.clone())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct OAuthTokenResponse {
    pub access_token: String,
    #[allow(dead_code)]
    pub token_type: Option<String>,
    pub expires_in: u64,
    pub refresh_token: Option<String>,
    #[allow(dead_code)]
    pub scope: Option<String>,
}

impl OAuthTokenResponse {
    pub(crate) fn to_cached(&self) -> CachedAccessToken {
        CachedAccessToken {
            access_token: self.access_token.clone(),
            expires_at: Utc::now()
                + Duration::seconds((self.expires_in as i64).saturating_sub(CACHE_SKEW_SECONDS)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct CachedAccessToken {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}

impl CachedAccessToken {
    fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }
}

/// Holds the current access token and refreshes it once it nears expiry.
#[derive(Debug, Default)]
pub(crate) struct TokenCache {
    slot: Mutex<Option<CachedAccessToken>>,
}

impl TokenCache {
    pub(crate) fn seeded(token: Option<CachedAccessToken>) -> Self {
        Self {
            slot: Mutex::new(token),
        }
    }

    pub(crate) async fn get_or_fetch<F, Fut>(&self, fetch: F) -> Result<String, AuthError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<CachedAccessToken, AuthError>>,
    {
        let mut slot = self.slot.lock().await;
        if let Some(cached) = slot.as_ref().filter(|token| !token.is_expired()) {
            return Ok(cached.access_token.clone());
        }

        let fresh = fetch().await?;
        let access_token = fresh.access_token.clone();
        *slot = Some(fresh);
        Ok(access_token)
    }
}

pub(crate) async fn request_token(
    client: &Client,
    token_url: &str,
    form: &[(&str, &str)],
) -> Result<OAuthTokenResponse, AuthError> {
    let response = client
        .post(token_url)
        .form(form)
        .send()
        .await
        .map_err(|source| AuthError::Transport {
            url: token_url.to_string(),
            source,
        })?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|source| AuthError::Transport {
            url: token_url.to_string(),
            source,
        })?;
    if !status.is_success() {
        return Err(AuthError::Rejected {
            status,
            body: redact_response_body(&body),
        });
    }

    Ok(serde_json::from_str(&body)?)
}
