use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use tracing::{debug, info};

use super::address::{group_display_name, normalize_recipient};
use super::{GroupArchive, GroupDirectory, Mailbox, PollOutcome, RelayError};
use crate::google::directory::{DeliverySettings, Group, GroupLookup, Member, MemberRole};

pub const INBOX_LABEL: &str = "INBOX";
pub const GROUP_DESCRIPTION: &str =
    "An automatic group collecting the emails sent to this address through the catch-all route";

/// Result of relaying one triaged message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayedMessage {
    pub message_id: String,
    pub group_key: String,
    pub group_created: bool,
}

/// Applies the find-or-create-group, relay, reclassify transition to triaged messages.
pub struct MailRelay<'a> {
    mailbox: &'a dyn Mailbox,
    directory: &'a dyn GroupDirectory,
    archive: &'a dyn GroupArchive,
    triage_label_id: String,
    owner_address: String,
}

impl<'a> MailRelay<'a> {
    pub fn new(
        mailbox: &'a dyn Mailbox,
        directory: &'a dyn GroupDirectory,
        archive: &'a dyn GroupArchive,
        triage_label_id: impl Into<String>,
        owner_address: impl Into<String>,
    ) -> Self {
        Self {
            mailbox,
            directory,
            archive,
            triage_label_id: triage_label_id.into(),
            owner_address: owner_address.into(),
        }
    }

    /// Lists the triage label once and relays everything found, stopping at the first error.
    pub async fn poll_once(&self) -> Result<PollOutcome, RelayError> {
        let message_ids = self
            .mailbox
            .triaged_message_ids(&self.triage_label_id)
            .await?;
        if message_ids.is_empty() {
            debug!("no triaged messages");
            return Ok(PollOutcome::Idle);
        }

        info!(count = message_ids.len(), "found triaged messages");
        for message_id in &message_ids {
            self.process_message(message_id).await?;
        }
        Ok(PollOutcome::Processed(message_ids.len()))
    }

    pub async fn process_message(&self, message_id: &str) -> Result<RelayedMessage, RelayError> {
        let message = self.mailbox.message(message_id).await?;
        let subject = message.header("Subject").unwrap_or_default();
        info!(message_id, "starting processing of new message '{subject}'");

        let recipient = message
            .header("To")
            .map(str::trim)
            .filter(|to| !to.is_empty())
            .ok_or_else(|| RelayError::MissingRecipient {
                message_id: message_id.to_string(),
            })?;
        let group_key = normalize_recipient(recipient);

        let group_created = self.find_or_create_group(group_key).await?;
        self.relay_content(message_id, group_key).await?;
        self.mailbox
            .relabel(message_id, &[INBOX_LABEL], &[self.triage_label_id.as_str()])
            .await?;

        info!(message_id, group_key, "processed message '{subject}'");
        Ok(RelayedMessage {
            message_id: message_id.to_string(),
            group_key: group_key.to_string(),
            group_created,
        })
    }

    /// Ensures a group keyed by `address` exists. Returns `true` when it had to be created.
    pub async fn find_or_create_group(&self, address: &str) -> Result<bool, RelayError> {
        match self.directory.lookup_group(address).await? {
            GroupLookup::Found(_) => Ok(false),
            GroupLookup::NotFound => {
                self.create_group(address).await?;
                Ok(true)
            }
        }
    }

    async fn create_group(&self, address: &str) -> Result<(), RelayError> {
        let group = Group {
            id: None,
            email: address.to_string(),
            name: Some(group_display_name(address)),
            description: Some(GROUP_DESCRIPTION.to_string()),
        };
        self.directory.create_group(&group).await?;

        let owner = Member {
            email: self.owner_address.clone(),
            role: MemberRole::Owner,
            delivery_settings: DeliverySettings::AllMail,
        };
        self.directory.add_member(address, &owner).await?;

        info!(group_key = address, owner = %self.owner_address, "created group");
        Ok(())
    }

    async fn relay_content(&self, message_id: &str, group_key: &str) -> Result<(), RelayError> {
        let encoded = self.mailbox.raw_message(message_id).await?;
        let rfc822 = decode_raw_message(&encoded).map_err(|source| RelayError::Decode {
            message_id: message_id.to_string(),
            source,
        })?;
        self.archive.archive(group_key, rfc822).await?;
        Ok(())
    }
}

/// Decodes the API's base64url `raw` field, with or without padding.
fn decode_raw_message(encoded: &str) -> Result<Vec<u8>, base64::DecodeError> {
    URL_SAFE_NO_PAD.decode(encoded.trim_end_matches('='))
}
