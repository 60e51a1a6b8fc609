use serde::{Deserialize, Serialize};

use super::{endpoint_url, ApiError, GoogleApi};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MemberRole {
    Owner,
    Manager,
    Member,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliverySettings {
    AllMail,
    Daily,
    Digest,
    Disabled,
    None,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub email: String,
    pub role: MemberRole,
    pub delivery_settings: DeliverySettings,
}

/// Outcome of looking a group up by key. Absence is an answer, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupLookup {
    Found(Group),
    NotFound,
}

impl GoogleApi {
    pub async fn get_group(&self, group_key: &str) -> Result<GroupLookup, ApiError> {
        let url = endpoint_url(&self.endpoints.directory, &["groups", group_key])?;
        match self
            .send_json::<Group>("directory groups.get", self.client.get(url))
            .await
        {
            Ok(group) => Ok(GroupLookup::Found(group)),
            Err(error) if error.is_not_found() => Ok(GroupLookup::NotFound),
            Err(error) => Err(error),
        }
    }

    pub async fn insert_group(&self, group: &Group) -> Result<Group, ApiError> {
        let url = endpoint_url(&self.endpoints.directory, &["groups"])?;
        self.send_json("directory groups.insert", self.client.post(url).json(group))
            .await
    }

    pub async fn insert_member(&self, group_key: &str, member: &Member) -> Result<(), ApiError> {
        let url = endpoint_url(&self.endpoints.directory, &["groups", group_key, "members"])?;
        self.send("directory members.insert", self.client.post(url).json(member))
            .await?;
        Ok(())
    }
}
