use reqwest::Client;
use thiserror::Error;
use tracing::info;

use crate::auth::installed::InstalledAppFlow;
use crate::auth::service_account::{ServiceAccount, ServiceAccountKey};
use crate::auth::{AuthError, TokenSource, SCOPES};
use crate::config::{ConfigError, CredentialStrategy, Settings};
use crate::google::{ApiError, GoogleApi};
use crate::relay::{MailRelay, Mailbox};

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("no Gmail label named '{name}' (names are compared case-insensitively)")]
    LabelNotFound { name: String },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Authenticated handle on the Google APIs, created once at startup.
pub struct Session {
    api: GoogleApi,
}

impl Session {
    pub async fn connect(settings: &Settings) -> Result<Self, BootstrapError> {
        let client = Client::new();
        let tokens: Box<dyn TokenSource> = match settings.credentials()? {
            CredentialStrategy::ServiceAccount { key_path, subject } => {
                info!(key = %key_path.display(), %subject, "using service account credentials");
                let key = ServiceAccountKey::from_file(&key_path)?;
                Box::new(ServiceAccount::new(
                    client.clone(),
                    key,
                    SCOPES,
                    Some(subject),
                )?)
            }
            CredentialStrategy::Interactive {
                client_secret,
                redirect_port,
            } => {
                info!(client_secret = %client_secret.display(), "starting interactive consent flow");
                let flow =
                    InstalledAppFlow::from_client_secrets_file(client.clone(), &client_secret, SCOPES)?;
                Box::new(flow.run_local_server(redirect_port).await?)
            }
        };

        Ok(Self::from_api(GoogleApi::new(client, tokens)))
    }

    pub fn from_api(api: GoogleApi) -> Self {
        Self { api }
    }

    pub fn api(&self) -> &GoogleApi {
        &self.api
    }

    pub fn relay(&self, triage_label_id: &str, owner_address: &str) -> MailRelay<'_> {
        MailRelay::new(
            &self.api,
            &self.api,
            &self.api,
            triage_label_id,
            owner_address,
        )
    }
}

/// Finds the id of the label called `name`, ignoring case.
pub async fn resolve_triage_label(
    mailbox: &dyn Mailbox,
    name: &str,
) -> Result<String, BootstrapError> {
    let wanted = name.to_uppercase();
    let labels = mailbox.labels().await?;
    labels
        .into_iter()
        .find(|label| label.name.to_uppercase() == wanted)
        .map(|label| {
            info!(label_id = %label.id, name = %label.name, "resolved triage label");
            label.id
        })
        .ok_or_else(|| BootstrapError::LabelNotFound {
            name: name.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use uuid::Uuid;

    use super::{resolve_triage_label, BootstrapError, Session};
    use crate::auth::AuthError;
    use crate::config::{ConfigError, Settings};
    use crate::google::gmail::Label;
    use crate::relay::testing::{FakeWorkspace, RecordedCall, TRIAGE_LABEL_ID};

    fn settings() -> Settings {
        Settings {
            label: "Catch-All".to_string(),
            owner: Some("owner@example.com".to_string()),
            client_secret: None,
            service_account_key: None,
            impersonate: None,
            poll_interval: 10,
            redirect_port: 0,
        }
    }

    fn missing_file() -> PathBuf {
        std::env::temp_dir().join(format!("catchall-missing-{}.json", Uuid::new_v4()))
    }

    #[tokio::test]
    async fn label_is_matched_case_insensitively() {
        let workspace = FakeWorkspace::new();
        let id = resolve_triage_label(&workspace, "CATCH-ALL")
            .await
            .expect("resolve label");
        assert_eq!(id, TRIAGE_LABEL_ID);
        assert_eq!(workspace.calls(), vec![RecordedCall::Labels]);
    }

    #[tokio::test]
    async fn unknown_label_is_a_configuration_error() {
        let workspace = FakeWorkspace::new();
        workspace.set_labels(vec![Label {
            id: "INBOX".to_string(),
            name: "INBOX".to_string(),
            label_type: Some("system".to_string()),
        }]);

        let error = resolve_triage_label(&workspace, "Catch-All")
            .await
            .expect_err("label is absent");
        assert!(matches!(error, BootstrapError::LabelNotFound { name } if name == "Catch-All"));
    }

    #[tokio::test]
    async fn missing_client_secret_fails_before_consent() {
        let mut settings = settings();
        settings.client_secret = Some(missing_file());

        let error = Session::connect(&settings)
            .await
            .err()
            .expect("missing client secret");
        assert!(matches!(
            error,
            BootstrapError::Auth(AuthError::CredentialFile { .. })
        ));
    }

    #[tokio::test]
    async fn missing_service_account_key_is_reported() {
        let mut settings = settings();
        settings.service_account_key = Some(missing_file());

        let error = Session::connect(&settings)
            .await
            .err()
            .expect("missing key file");
        assert!(matches!(
            error,
            BootstrapError::Auth(AuthError::CredentialFile { .. })
        ));
    }

    #[tokio::test]
    async fn service_account_without_subject_is_a_configuration_error() {
        let mut settings = settings();
        settings.owner = None;
        settings.service_account_key = Some(missing_file());

        let error = Session::connect(&settings)
            .await
            .err()
            .expect("no subject");
        assert!(matches!(
            error,
            BootstrapError::Config(ConfigError::MissingSubject)
        ));
    }
}
