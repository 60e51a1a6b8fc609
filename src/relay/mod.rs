use async_trait::async_trait;
use thiserror::Error;

use crate::google::directory::{Group, GroupLookup, Member};
use crate::google::gmail::{Label, Message};
use crate::google::{ApiError, GoogleApi};

pub mod address;
pub mod processor;
pub mod scheduler;

#[cfg(test)]
pub(crate) mod testing;

pub use address::{group_display_name, normalize_recipient};
pub use processor::{MailRelay, RelayedMessage, GROUP_DESCRIPTION, INBOX_LABEL};
pub use scheduler::{Pause, PollScheduler, PollStats, TokioPause, DEFAULT_POLL_INTERVAL};

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("message {message_id} has no To header")]
    MissingRecipient { message_id: String },

    #[error("message {message_id} raw body is not valid base64url: {source}")]
    Decode {
        message_id: String,
        #[source]
        source: base64::DecodeError,
    },

    #[error(transparent)]
    Api(#[from] ApiError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// The triage label had no messages.
    Idle,
    /// This many messages were relayed and reclassified.
    Processed(usize),
}

/// Mail-side operations: list, read and relabel messages.
#[async_trait(?Send)]
pub trait Mailbox {
    async fn labels(&self) -> Result<Vec<Label>, ApiError>;
    async fn triaged_message_ids(&self, label_id: &str) -> Result<Vec<String>, ApiError>;
    async fn message(&self, message_id: &str) -> Result<Message, ApiError>;
    async fn raw_message(&self, message_id: &str) -> Result<String, ApiError>;
    async fn relabel(&self, message_id: &str, add: &[&str], remove: &[&str]) -> Result<(), ApiError>;
}

#[async_trait(?Send)]
pub trait GroupDirectory {
    async fn lookup_group(&self, group_key: &str) -> Result<GroupLookup, ApiError>;
    async fn create_group(&self, group: &Group) -> Result<(), ApiError>;
    async fn add_member(&self, group_key: &str, member: &Member) -> Result<(), ApiError>;
}

#[async_trait(?Send)]
pub trait GroupArchive {
    async fn archive(&self, group_key: &str, rfc822: Vec<u8>) -> Result<(), ApiError>;
}

#[async_trait(?Send)]
impl Mailbox for GoogleApi {
    async fn labels(&self) -> Result<Vec<Label>, ApiError> {
        self.list_labels().await
    }

    async fn triaged_message_ids(&self, label_id: &str) -> Result<Vec<String>, ApiError> {
        self.list_messages(label_id).await
    }

    async fn message(&self, message_id: &str) -> Result<Message, ApiError> {
        self.get_message(message_id).await
    }

    async fn raw_message(&self, message_id: &str) -> Result<String, ApiError> {
        self.get_raw_message(message_id).await
    }

    async fn relabel(&self, message_id: &str, add: &[&str], remove: &[&str]) -> Result<(), ApiError> {
        self.modify_labels(message_id, add, remove).await
    }
}

#[async_trait(?Send)]
impl GroupDirectory for GoogleApi {
    async fn lookup_group(&self, group_key: &str) -> Result<GroupLookup, ApiError> {
        self.get_group(group_key).await
    }

    async fn create_group(&self, group: &Group) -> Result<(), ApiError> {
        self.insert_group(group).await.map(|_| ())
    }

    async fn add_member(&self, group_key: &str, member: &Member) -> Result<(), ApiError> {
        self.insert_member(group_key, member).await
    }
}

#[async_trait(?Send)]
impl GroupArchive for GoogleApi {
    async fn archive(&self, group_key: &str, rfc822: Vec<u8>) -> Result<(), ApiError> {
        let code = self.insert_archive(group_key, rfc822).await?;
        tracing::debug!(group_key, response_code = %code, "archive insert accepted");
        Ok(())
    }
}
