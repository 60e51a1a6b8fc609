use std::path::PathBuf;
use std::time::Duration;

use clap::Args;
use thiserror::Error;

pub const DEFAULT_LABEL_NAME: &str = "Catch-All";
pub const CLIENT_SECRET_FILE_NAME: &str = "client_secret.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no operating account configured; pass --owner or set MAIN_EMAIL_ADDRESS")]
    MissingOwner,

    #[error("service account needs a mailbox to act as; pass --impersonate or --owner")]
    MissingSubject,

    #[error("resolve working directory: {0}")]
    WorkingDirectory(#[source] std::io::Error),
}

/// Runtime settings, read from flags with environment fallbacks.
#[derive(Debug, Clone, Args)]
pub struct Settings {
    /// Display name of the Gmail label catch-all traffic is filed under
    #[arg(long, global = true, env = "GMAIL_CATCHALL_LABEL_NAME", default_value = DEFAULT_LABEL_NAME)]
    pub label: String,

    /// Operating account; owns every created group
    #[arg(long, global = true, env = "MAIN_EMAIL_ADDRESS")]
    pub owner: Option<String>,

    /// OAuth client secret for the interactive consent flow [default: ../client_secret.json]
    #[arg(long, global = true, env = "CLIENT_SECRET_PATH")]
    pub client_secret: Option<PathBuf>,

    /// Service account key; switches to domain-wide delegation instead of interactive consent
    #[arg(long, global = true, env = "SERVICE_ACCOUNT_KEY_PATH")]
    pub service_account_key: Option<PathBuf>,

    /// Mailbox the service account acts as (defaults to the owner)
    #[arg(long, global = true, env = "IMPERSONATE_USER")]
    pub impersonate: Option<String>,

    /// Seconds to wait after a poll that found nothing
    #[arg(long, global = true, env = "POLL_INTERVAL_SECS", default_value_t = 10)]
    pub poll_interval: u64,

    /// Loopback port for the consent redirect (0 picks a free port)
    #[arg(long, global = true, env = "OAUTH_REDIRECT_PORT", default_value_t = 0)]
    pub redirect_port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialStrategy {
    ServiceAccount { key_path: PathBuf, subject: String },
    Interactive { client_secret: PathBuf, redirect_port: u16 },
}

impl Settings {
    pub fn owner(&self) -> Result<&str, ConfigError> {
        self.owner
            .as_deref()
            .map(str::trim)
            .filter(|owner| !owner.is_empty())
            .ok_or(ConfigError::MissingOwner)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval)
    }

    pub fn client_secret_path(&self) -> Result<PathBuf, ConfigError> {
        match &self.client_secret {
            Some(path) => Ok(path.clone()),
            None => default_client_secret_path(),
        }
    }

    pub fn credentials(&self) -> Result<CredentialStrategy, ConfigError> {
        if let Some(key_path) = &self.service_account_key {
            let subject = self
                .impersonate
                .as_deref()
                .map(str::trim)
                .filter(|subject| !subject.is_empty())
                .map(str::to_string)
                .or_else(|| self.owner().ok().map(str::to_string))
                .ok_or(ConfigError::MissingSubject)?;
            return Ok(CredentialStrategy::ServiceAccount {
                key_path: key_path.clone(),
                subject,
            });
        }

        Ok(CredentialStrategy::Interactive {
            client_secret: self.client_secret_path()?,
            redirect_port: self.redirect_port,
        })
    }
}

/// `client_secret.json` in the parent of the working directory.
pub fn default_client_secret_path() -> Result<PathBuf, ConfigError> {
    let cwd = std::env::current_dir().map_err(ConfigError::WorkingDirectory)?;
    Ok(cwd.join("..").join(CLIENT_SECRET_FILE_NAME))
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::time::Duration;

    use clap::Parser;

    use super::{ConfigError, CredentialStrategy, Settings, CLIENT_SECRET_FILE_NAME};

    #[derive(Debug, Parser)]
    struct TestCli {
        #[command(flatten)]
        settings: Settings,
    }

    fn parse(args: &[&str]) -> Settings {
        let mut argv = vec!["catchall-groups"];
        argv.extend_from_slice(args);
        TestCli::try_parse_from(argv).expect("parse settings").settings
    }

    #[test]
    fn explicit_flags_are_used() {
        let settings = parse(&[
            "--label",
            "Wildcard",
            "--owner",
            "admin@example.com",
            "--poll-interval",
            "30",
        ]);

        assert_eq!(settings.label, "Wildcard");
        assert_eq!(settings.owner().expect("owner"), "admin@example.com");
        assert_eq!(settings.poll_interval(), Duration::from_secs(30));
    }

    #[test]
    fn blank_owner_is_treated_as_missing() {
        let settings = parse(&["--owner", "  "]);
        assert!(matches!(settings.owner(), Err(ConfigError::MissingOwner)));
    }

    #[test]
    fn interactive_flow_is_used_without_a_service_account_key() {
        let settings = parse(&[
            "--client-secret",
            "/etc/catchall/secret.json",
            "--redirect-port",
            "8765",
        ]);

        assert_eq!(
            settings.credentials().expect("credentials"),
            CredentialStrategy::Interactive {
                client_secret: PathBuf::from("/etc/catchall/secret.json"),
                redirect_port: 8765,
            }
        );
    }

    #[test]
    fn client_secret_defaults_to_parent_directory() {
        let settings = parse(&[]);
        if settings.client_secret.is_some() {
            // CLIENT_SECRET_PATH is set in this environment.
            return;
        }

        let path = settings.client_secret_path().expect("default path");
        assert!(path.ends_with(PathBuf::from("..").join(CLIENT_SECRET_FILE_NAME)));
        assert!(path.is_absolute());
    }

    #[test]
    fn service_account_impersonates_owner_by_default() {
        let settings = parse(&[
            "--service-account-key",
            "key.json",
            "--owner",
            "admin@example.com",
        ]);
        if settings.impersonate.is_some() {
            return;
        }

        assert_eq!(
            settings.credentials().expect("credentials"),
            CredentialStrategy::ServiceAccount {
                key_path: PathBuf::from("key.json"),
                subject: "admin@example.com".to_string(),
            }
        );
    }

    #[test]
    fn explicit_impersonation_wins_over_owner() {
        let settings = parse(&[
            "--service-account-key",
            "key.json",
            "--owner",
            "admin@example.com",
            "--impersonate",
            "catchall@example.com",
        ]);

        assert!(matches!(
            settings.credentials().expect("credentials"),
            CredentialStrategy::ServiceAccount { subject, .. } if subject == "catchall@example.com"
        ));
    }

    #[test]
    fn invalid_poll_interval_is_rejected() {
        let result = TestCli::try_parse_from(["catchall-groups", "--poll-interval", "soon"]);
        assert!(result.is_err());
    }
}
