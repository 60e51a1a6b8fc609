use std::path::Path;

use async_trait::async_trait;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use chrono::{DateTime, Utc};
use reqwest::Client;
use ring::rand::SystemRandom;
use ring::signature::{RsaKeyPair, RSA_PKCS1_SHA256};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{request_token, AuthError, CachedAccessToken, TokenCache, TokenSource, GOOGLE_TOKEN_URL};

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECONDS: i64 = 3600;

/// Service-account key file as exported from the Google Cloud console.
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    pub private_key_id: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

impl std::fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("private_key", &"<redacted>")
            .field("private_key_id", &self.private_key_id)
            .field("token_uri", &self.token_uri)
            .finish()
    }
}

fn default_token_uri() -> String {
    GOOGLE_TOKEN_URL.to_string()
}

impl ServiceAccountKey {
    pub fn from_file(path: &Path) -> Result<Self, AuthError> {
        let raw = std::fs::read_to_string(path).map_err(|source| AuthError::CredentialFile {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| AuthError::CredentialFormat {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[derive(Debug, Serialize)]
struct JwtHeader<'a> {
    alg: &'static str,
    typ: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    kid: Option<&'a str>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
struct JwtClaims {
    iss: String,
    scope: String,
    aud: String,
    iat: i64,
    exp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    sub: Option<String>,
}

/// Service-account credentials, optionally delegated to impersonate a mailbox user.
pub struct ServiceAccount {
    client: Client,
    key: ServiceAccountKey,
    signer: RsaKeyPair,
    scopes: String,
    subject: Option<String>,
    cache: TokenCache,
}

impl ServiceAccount {
    pub fn new(
        client: Client,
        key: ServiceAccountKey,
        scopes: &[&str],
        subject: Option<String>,
    ) -> Result<Self, AuthError> {
        let der = pem_to_der(&key.private_key)?;
        let signer = RsaKeyPair::from_pkcs8(&der).map_err(|error| {
            AuthError::InvalidKey(format!("service account private key rejected: {error}"))
        })?;

        Ok(Self {
            client,
            key,
            signer,
            scopes: scopes.join(" "),
            subject,
            cache: TokenCache::default(),
        })
    }

    fn claims(&self, now: DateTime<Utc>) -> JwtClaims {
        build_claims(&self.key, &self.scopes, self.subject.as_deref(), now)
    }

    fn assertion(&self, now: DateTime<Utc>) -> Result<String, AuthError> {
        let header = JwtHeader {
            alg: "RS256",
            typ: "JWT",
            kid: self.key.private_key_id.as_deref(),
        };
        let signing_input = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header)?),
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(&self.claims(now))?)
        );

        let mut signature = vec![0u8; self.signer.public().modulus_len()];
        self.signer
            .sign(
                &RSA_PKCS1_SHA256,
                &SystemRandom::new(),
                signing_input.as_bytes(),
                &mut signature,
            )
            .map_err(|_| AuthError::InvalidKey("sign service account assertion".to_string()))?;

        Ok(format!("{signing_input}.{}", URL_SAFE_NO_PAD.encode(signature)))
    }

    async fn exchange(&self) -> Result<CachedAccessToken, AuthError> {
        debug!(
            client_email = %self.key.client_email,
            subject = self.subject.as_deref().unwrap_or("-"),
            "requesting service account access token"
        );
        let assertion = self.assertion(Utc::now())?;
        let response = request_token(
            &self.client,
            &self.key.token_uri,
            &[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())],
        )
        .await?;
        Ok(response.to_cached())
    }
}

#[async_trait(?Send)]
impl TokenSource for ServiceAccount {
    async fn access_token(&self) -> Result<String, AuthError> {
        self.cache.get_or_fetch(move || self.exchange()).await
    }
}

fn build_claims(
    key: &ServiceAccountKey,
    scopes: &str,
    subject: Option<&str>,
    now: DateTime<Utc>,
) -> JwtClaims {
    let iat = now.timestamp();
    JwtClaims {
        iss: key.client_email.clone(),
        scope: scopes.to_string(),
        aud: key.token_uri.clone(),
        iat,
        exp: iat + ASSERTION_LIFETIME_SECONDS,
        sub: subject.map(str::to_string),
    }
}

fn pem_to_der(pem: &str) -> Result<Vec<u8>, AuthError> {
    let body: String = pem
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("-----"))
        .collect();
    if body.is_empty() {
        return Err(AuthError::InvalidKey(
            "service account private key is empty".to_string(),
        ));
    }
    STANDARD
        .decode(body)
        .map_err(|error| AuthError::InvalidKey(format!("private key is not valid PEM: {error}")))
}
