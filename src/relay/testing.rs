//! In-memory stand-in for the Gmail, Directory and Groups Migration APIs.

use std::cell::RefCell;
use std::collections::BTreeMap;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use reqwest::StatusCode;
use serde_json::json;

use super::{GroupArchive, GroupDirectory, Mailbox};
use crate::google::directory::{Group, GroupLookup, Member};
use crate::google::gmail::{Label, Message};
use crate::google::ApiError;

pub(crate) const TRIAGE_LABEL_ID: &str = "Label_7";

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RecordedCall {
    Labels,
    ListTriaged(String),
    Message(String),
    RawMessage(String),
    Relabel(String),
    LookupGroup(String),
    CreateGroup(String),
    AddMember(String, String),
    Archive(String),
}

struct StoredMessage {
    message: Message,
    raw: String,
    labels: Vec<String>,
}

#[derive(Default)]
struct State {
    labels: Vec<Label>,
    messages: BTreeMap<String, StoredMessage>,
    groups: BTreeMap<String, Group>,
    members: BTreeMap<String, Vec<Member>>,
    archives: BTreeMap<String, Vec<Vec<u8>>>,
    lookup_failure: Option<StatusCode>,
    calls: Vec<RecordedCall>,
}

pub(crate) struct FakeWorkspace {
    state: RefCell<State>,
}

pub(crate) fn encode_raw(rfc822: &str) -> String {
    URL_SAFE.encode(rfc822.as_bytes())
}

fn status_error(operation: &'static str, status: StatusCode) -> ApiError {
    ApiError::Status {
        operation,
        status,
        body: String::new(),
    }
}

impl FakeWorkspace {
    pub(crate) fn new() -> Self {
        let state = State {
            labels: vec![
                Label {
                    id: "INBOX".to_string(),
                    name: "INBOX".to_string(),
                    label_type: Some("system".to_string()),
                },
                Label {
                    id: TRIAGE_LABEL_ID.to_string(),
                    name: "Catch-All".to_string(),
                    label_type: Some("user".to_string()),
                },
            ],
            ..State::default()
        };
        Self {
            state: RefCell::new(state),
        }
    }

    pub(crate) fn add_message(&self, id: &str, to: &str, subject: &str, rfc822: &str) {
        let message = serde_json::from_value(json!({
            "id": id,
            "threadId": id,
            "labelIds": [TRIAGE_LABEL_ID],
            "payload": {
                "mimeType": "text/plain",
                "headers": [
                    { "name": "From", "value": "sender@example.net" },
                    { "name": "To", "value": to },
                    { "name": "Subject", "value": subject }
                ]
            }
        }))
        .expect("build fake message");
        self.insert_message(id, message, encode_raw(rfc822));
    }

    pub(crate) fn add_message_without_recipient(&self, id: &str, subject: &str) {
        let message = serde_json::from_value(json!({
            "id": id,
            "labelIds": [TRIAGE_LABEL_ID],
            "payload": { "headers": [{ "name": "Subject", "value": subject }] }
        }))
        .expect("build fake message");
        self.insert_message(id, message, encode_raw("Subject: x\r\n\r\n"));
    }

    fn insert_message(&self, id: &str, message: Message, raw: String) {
        self.state.borrow_mut().messages.insert(
            id.to_string(),
            StoredMessage {
                message,
                raw,
                labels: vec![TRIAGE_LABEL_ID.to_string()],
            },
        );
    }

    pub(crate) fn set_raw(&self, id: &str, raw: &str) {
        if let Some(stored) = self.state.borrow_mut().messages.get_mut(id) {
            stored.raw = raw.to_string();
        }
    }

    pub(crate) fn set_labels(&self, labels: Vec<Label>) {
        self.state.borrow_mut().labels = labels;
    }

    pub(crate) fn add_group(&self, email: &str) {
        self.state.borrow_mut().groups.insert(
            email.to_string(),
            Group {
                id: Some(format!("id-{email}")),
                email: email.to_string(),
                name: None,
                description: None,
            },
        );
    }

    pub(crate) fn fail_lookups_with(&self, status: StatusCode) {
        self.state.borrow_mut().lookup_failure = Some(status);
    }

    pub(crate) fn calls(&self) -> Vec<RecordedCall> {
        self.state.borrow().calls.clone()
    }

    pub(crate) fn group(&self, email: &str) -> Option<Group> {
        self.state.borrow().groups.get(email).cloned()
    }

    pub(crate) fn group_count(&self) -> usize {
        self.state.borrow().groups.len()
    }

    pub(crate) fn members(&self, email: &str) -> Vec<Member> {
        self.state
            .borrow()
            .members
            .get(email)
            .cloned()
            .unwrap_or_default()
    }

    pub(crate) fn archived(&self, email: &str) -> Vec<Vec<u8>> {
        self.state
            .borrow()
            .archives
            .get(email)
            .cloned()
            .unwrap_or_default()
    }

    pub(crate) fn labels_of(&self, id: &str) -> Vec<String> {
        self.state
            .borrow()
            .messages
            .get(id)
            .map(|stored| stored.labels.clone())
            .unwrap_or_default()
    }

    fn record(&self, call: RecordedCall) {
        self.state.borrow_mut().calls.push(call);
    }
}

#[async_trait(?Send)]
impl Mailbox for FakeWorkspace {
    async fn labels(&self) -> Result<Vec<Label>, ApiError> {
        self.record(RecordedCall::Labels);
        Ok(self.state.borrow().labels.clone())
    }

    async fn triaged_message_ids(&self, label_id: &str) -> Result<Vec<String>, ApiError> {
        self.record(RecordedCall::ListTriaged(label_id.to_string()));
        Ok(self
            .state
            .borrow()
            .messages
            .iter()
            .filter(|(_, stored)| stored.labels.iter().any(|label| label == label_id))
            .map(|(id, _)| id.clone())
            .collect())
    }

    async fn message(&self, message_id: &str) -> Result<Message, ApiError> {
        self.record(RecordedCall::Message(message_id.to_string()));
        self.state
            .borrow()
            .messages
            .get(message_id)
            .map(|stored| stored.message.clone())
            .ok_or_else(|| status_error("gmail messages.get", StatusCode::NOT_FOUND))
    }

    async fn raw_message(&self, message_id: &str) -> Result<String, ApiError> {
        self.record(RecordedCall::RawMessage(message_id.to_string()));
        self.state
            .borrow()
            .messages
            .get(message_id)
            .map(|stored| stored.raw.clone())
            .ok_or_else(|| status_error("gmail messages.get(raw)", StatusCode::NOT_FOUND))
    }

    async fn relabel(&self, message_id: &str, add: &[&str], remove: &[&str]) -> Result<(), ApiError> {
        self.record(RecordedCall::Relabel(message_id.to_string()));
        let mut state = self.state.borrow_mut();
        let stored = state
            .messages
            .get_mut(message_id)
            .ok_or_else(|| status_error("gmail messages.modify", StatusCode::NOT_FOUND))?;
        stored.labels.retain(|label| !remove.contains(&label.as_str()));
        for label in add {
            if !stored.labels.iter().any(|existing| existing == label) {
                stored.labels.push(label.to_string());
            }
        }
        Ok(())
    }
}

#[async_trait(?Send)]
impl GroupDirectory for FakeWorkspace {
    async fn lookup_group(&self, group_key: &str) -> Result<GroupLookup, ApiError> {
        self.record(RecordedCall::LookupGroup(group_key.to_string()));
        let state = self.state.borrow();
        if let Some(status) = state.lookup_failure {
            return Err(status_error("directory groups.get", status));
        }
        Ok(match state.groups.get(group_key) {
            Some(group) => GroupLookup::Found(group.clone()),
            None => GroupLookup::NotFound,
        })
    }

    async fn create_group(&self, group: &Group) -> Result<(), ApiError> {
        self.record(RecordedCall::CreateGroup(group.email.clone()));
        let mut state = self.state.borrow_mut();
        if state.groups.contains_key(&group.email) {
            return Err(status_error("directory groups.insert", StatusCode::CONFLICT));
        }
        state.groups.insert(group.email.clone(), group.clone());
        Ok(())
    }

    async fn add_member(&self, group_key: &str, member: &Member) -> Result<(), ApiError> {
        self.record(RecordedCall::AddMember(
            group_key.to_string(),
            member.email.clone(),
        ));
        self.state
            .borrow_mut()
            .members
            .entry(group_key.to_string())
            .or_default()
            .push(member.clone());
        Ok(())
    }
}

#[async_trait(?Send)]
impl GroupArchive for FakeWorkspace {
    async fn archive(&self, group_key: &str, rfc822: Vec<u8>) -> Result<(), ApiError> {
        self.record(RecordedCall::Archive(group_key.to_string()));
        self.state
            .borrow_mut()
            .archives
            .entry(group_key.to_string())
            .or_default()
            .push(rfc822);
        Ok(())
    }
}
