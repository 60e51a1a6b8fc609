use serde::{Deserialize, Serialize};

use super::{ApiError, GoogleApi};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub label_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct LabelList {
    #[serde(default)]
    labels: Vec<Label>,
}

#[derive(Debug, Clone, Deserialize)]
struct MessageList {
    messages: Option<Vec<MessageRef>>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct MessageRef {
    id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub id: String,
    #[serde(rename = "threadId")]
    pub thread_id: Option<String>,
    #[serde(rename = "labelIds", default)]
    pub label_ids: Vec<String>,
    pub snippet: Option<String>,
    pub payload: Option<Payload>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Payload {
    #[serde(rename = "mimeType")]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub headers: Vec<Header>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Header {
    pub name: String,
    pub value: String,
}

impl Message {
    /// First header with the given name, matched case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.payload
            .as_ref()?
            .headers
            .iter()
            .find(|header| header.name.eq_ignore_ascii_case(name))
            .map(|header| header.value.as_str())
    }
}

#[derive(Debug, Clone, Deserialize)]
struct RawMessage {
    raw: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ModifyRequest<'a> {
    add_label_ids: &'a [&'a str],
    remove_label_ids: &'a [&'a str],
}

impl GoogleApi {
    pub async fn list_labels(&self) -> Result<Vec<Label>, ApiError> {
        let url = format!("{}/users/me/labels", self.endpoints.gmail);
        let list: LabelList = self
            .send_json("gmail labels.list", self.client.get(&url))
            .await?;
        Ok(list.labels)
    }

    /// Ids of every message carrying `label_id`, spam and trash excluded.
    pub async fn list_messages(&self, label_id: &str) -> Result<Vec<String>, ApiError> {
        let url = format!("{}/users/me/messages", self.endpoints.gmail);
        let mut ids = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .get(&url)
                .query(&[("labelIds", label_id), ("includeSpamTrash", "false")]);
            if let Some(token) = page_token.as_deref() {
                request = request.query(&[("pageToken", token)]);
            }

            let page: MessageList = self.send_json("gmail messages.list", request).await?;
            ids.extend(page.messages.unwrap_or_default().into_iter().map(|stub| stub.id));

            page_token = page.next_page_token;
            if page_token.is_none() {
                return Ok(ids);
            }
        }
    }

    pub async fn get_message(&self, message_id: &str) -> Result<Message, ApiError> {
        let url = format!("{}/users/me/messages/{message_id}", self.endpoints.gmail);
        self.send_json(
            "gmail messages.get",
            self.client.get(&url).query(&[("format", "full")]),
        )
        .await
    }

    /// The message's RFC 822 form, still base64url-encoded as the API returns it.
    pub async fn get_raw_message(&self, message_id: &str) -> Result<String, ApiError> {
        let url = format!("{}/users/me/messages/{message_id}", self.endpoints.gmail);
        let raw: RawMessage = self
            .send_json(
                "gmail messages.get(raw)",
                self.client.get(&url).query(&[("format", "raw")]),
            )
            .await?;
        Ok(raw.raw)
    }

    pub async fn modify_labels(
        &self,
        message_id: &str,
        add: &[&str],
        remove: &[&str],
    ) -> Result<(), ApiError> {
        let url = format!("{}/users/me/messages/{message_id}/modify", self.endpoints.gmail);
        let body = ModifyRequest {
            add_label_ids: add,
            remove_label_ids: remove,
        };
        self.send("gmail messages.modify", self.client.post(&url).json(&body))
            .await?;
        Ok(())
    }
}
