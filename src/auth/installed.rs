//! Installed-application consent flow for a personal account.
//!
//! The flow binds a loopback listener, logs the consent URL for the operator to open,
//! waits for Google to redirect back with an authorization code and exchanges it (with
//! a PKCE verifier) for a refresh token.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use reqwest::{Client, Url};
use ring::digest::{digest, SHA256};
use ring::rand::{SecureRandom, SystemRandom};
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use super::{
    request_token, AuthError, CachedAccessToken, TokenCache, TokenSource, GOOGLE_AUTH_URL,
    GOOGLE_TOKEN_URL,
};

const RANDOM_TOKEN_BYTES: usize = 32;
const SUCCESS_PAGE: &str =
    "The authentication flow has completed. You may close this window.";

#[derive(Debug, Deserialize)]
struct ClientSecretFile {
    installed: Option<ClientSecret>,
    web: Option<ClientSecret>,
}

/// OAuth client registration as downloaded from the Google Cloud console.
#[derive(Clone, Deserialize)]
pub struct ClientSecret {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

impl std::fmt::Debug for ClientSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientSecret")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("auth_uri", &self.auth_uri)
            .field("token_uri", &self.token_uri)
            .finish()
    }
}

fn default_auth_uri() -> String {
    GOOGLE_AUTH_URL.to_string()
}

fn default_token_uri() -> String {
    GOOGLE_TOKEN_URL.to_string()
}

impl ClientSecret {
    pub fn from_json(raw: &str) -> Result<Self, AuthError> {
        let file: ClientSecretFile = serde_json::from_str(raw)?;
        file.installed.or(file.web).ok_or_else(|| {
            AuthError::InvalidKey(
                "client secret file has neither an 'installed' nor a 'web' section".to_string(),
            )
        })
    }
}

#[derive(Debug, Clone)]
pub struct InstalledAppFlow {
    client: Client,
    secret: ClientSecret,
    scopes: Vec<String>,
}

impl InstalledAppFlow {
    pub fn new(client: Client, secret: ClientSecret, scopes: &[&str]) -> Self {
        Self {
            client,
            secret,
            scopes: scopes.iter().map(|scope| scope.to_string()).collect(),
        }
    }

    pub fn from_client_secrets_file(
        client: Client,
        path: &Path,
        scopes: &[&str],
    ) -> Result<Self, AuthError> {
        let raw = std::fs::read_to_string(path).map_err(|source| AuthError::CredentialFile {
            path: path.to_path_buf(),
            source,
        })?;
        let file: ClientSecretFile =
            serde_json::from_str(&raw).map_err(|source| AuthError::CredentialFormat {
                path: path.to_path_buf(),
                source,
            })?;
        let secret = file.installed.or(file.web).ok_or_else(|| {
            AuthError::InvalidKey(format!(
                "{} has neither an 'installed' nor a 'web' section",
                path.display()
            ))
        })?;
        Ok(Self::new(client, secret, scopes))
    }

    pub fn authorization_url(
        &self,
        redirect_uri: &str,
        state: &str,
        code_challenge: &str,
    ) -> Result<Url, AuthError> {
        let mut url = Url::parse(&self.secret.auth_uri)
            .map_err(|error| AuthError::Flow(format!("invalid auth_uri: {error}")))?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.secret.client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", &self.scopes.join(" "))
            .append_pair("state", state)
            .append_pair("code_challenge", code_challenge)
            .append_pair("code_challenge_method", "S256")
            .append_pair("access_type", "offline")
            .append_pair("prompt", "consent");
        Ok(url)
    }

    /// Runs the consent flow against a loopback listener on `port` (0 picks a free port).
    pub async fn run_local_server(self, port: u16) -> Result<AuthorizedUser, AuthError> {
        let listener = TcpListener::bind(("127.0.0.1", port))
            .await
            .map_err(AuthError::Listener)?;
        let local_port = listener.local_addr().map_err(AuthError::Listener)?.port();
        let redirect_uri = format!("http://localhost:{local_port}/");

        let state = random_token()?;
        let verifier = random_token()?;
        let url = self.authorization_url(&redirect_uri, &state, &pkce_challenge(&verifier))?;
        info!("Please visit this URL to authorize this application: {url}");

        let code = wait_for_redirect(listener, &state).await?;
        let response = request_token(
            &self.client,
            &self.secret.token_uri,
            &[
                ("code", code.as_str()),
                ("client_id", self.secret.client_id.as_str()),
                ("client_secret", self.secret.client_secret.as_str()),
                ("redirect_uri", redirect_uri.as_str()),
                ("grant_type", "authorization_code"),
                ("code_verifier", verifier.as_str()),
            ],
        )
        .await?;

        let refresh_token = response.refresh_token.clone().ok_or_else(|| {
            AuthError::Flow("token response did not include a refresh token".to_string())
        })?;
        info!("authorization granted");

        Ok(AuthorizedUser::with_cached(
            self.client,
            self.secret,
            refresh_token,
            Some(response.to_cached()),
        ))
    }
}

/// Credentials of a user who completed the consent flow.
pub struct AuthorizedUser {
    client: Client,
    secret: ClientSecret,
    refresh_token: String,
    cache: TokenCache,
}

impl AuthorizedUser {
    fn with_cached(
        client: Client,
        secret: ClientSecret,
        refresh_token: String,
        cached: Option<CachedAccessToken>,
    ) -> Self {
        Self {
            client,
            secret,
            refresh_token,
            cache: TokenCache::seeded(cached),
        }
    }

    async fn refresh(&self) -> Result<CachedAccessToken, AuthError> {
        debug!("refreshing user access token");
        let response = request_token(
            &self.client,
            &self.secret.token_uri,
            &[
                ("client_id", self.secret.client_id.as_str()),
                ("client_secret", self.secret.client_secret.as_str()),
                ("refresh_token", self.refresh_token.as_str()),
                ("grant_type", "refresh_token"),
            ],
        )
        .await?;
        Ok(response.to_cached())
    }
}

#[async_trait(?Send)]
impl TokenSource for AuthorizedUser {
    async fn access_token(&self) -> Result<String, AuthError> {
        self.cache.get_or_fetch(move || self.refresh()).await
    }
}

type RedirectOutcome = Result<String, AuthError>;

#[derive(Clone)]
struct RedirectState {
    expected_state: Arc<str>,
    outcome: mpsc::UnboundedSender<RedirectOutcome>,
}

/// Serves the loopback redirect until a request carries a code or an error, then shuts
/// the listener down.
async fn wait_for_redirect(listener: TcpListener, expected_state: &str) -> RedirectOutcome {
    let (outcome_tx, mut outcome_rx) = mpsc::unbounded_channel();
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let app = Router::new()
        .route("/", get(handle_redirect))
        .with_state(RedirectState {
            expected_state: Arc::from(expected_state),
            outcome: outcome_tx,
        });

    let server = async {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await
            .map_err(AuthError::Listener)
    };
    let outcome = async {
        let outcome = outcome_rx.recv().await;
        let _ = shutdown_tx.send(());
        outcome
    };

    let (served, outcome) = tokio::join!(server, outcome);
    served?;
    outcome.unwrap_or_else(|| {
        Err(AuthError::Flow(
            "redirect listener stopped before a code arrived".to_string(),
        ))
    })
}

async fn handle_redirect(
    State(state): State<RedirectState>,
    Query(params): Query<HashMap<String, String>>,
) -> (StatusCode, &'static str) {
    match parse_redirect(&params, &state.expected_state) {
        Ok(Some(code)) => {
            let _ = state.outcome.send(Ok(code));
            (StatusCode::OK, SUCCESS_PAGE)
        }
        Ok(None) => {
            debug!("ignoring loopback request without authorization code");
            (StatusCode::NOT_FOUND, "Not found.")
        }
        Err(error) => {
            let _ = state.outcome.send(Err(error));
            (StatusCode::BAD_REQUEST, "Authorization failed.")
        }
    }
}

/// Extracts the authorization code from the redirect's query parameters.
/// Requests without a code yield `Ok(None)`.
fn parse_redirect(
    params: &HashMap<String, String>,
    expected_state: &str,
) -> Result<Option<String>, AuthError> {
    if let Some(reason) = params.get("error") {
        return Err(AuthError::Flow(format!("consent was not granted: {reason}")));
    }
    let Some(code) = params.get("code") else {
        return Ok(None);
    };
    if params.get("state").map(String::as_str) != Some(expected_state) {
        return Err(AuthError::Flow(
            "redirect state does not match the issued state".to_string(),
        ));
    }
    Ok(Some(code.clone()))
}

fn random_token() -> Result<String, AuthError> {
    let mut bytes = [0u8; RANDOM_TOKEN_BYTES];
    SystemRandom::new()
        .fill(&mut bytes)
        .map_err(|_| AuthError::Flow("generate random state".to_string()))?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

fn pkce_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(digest(&SHA256, verifier.as_bytes()))
}
