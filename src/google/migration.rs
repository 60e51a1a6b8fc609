use serde::Deserialize;

use super::{endpoint_url, ApiError, GoogleApi};

#[derive(Debug, Clone, Deserialize)]
struct ArchiveInsertResponse {
    #[serde(rename = "responseCode")]
    response_code: Option<String>,
}

impl GoogleApi {
    /// Uploads one RFC 822 message into a group's archive and returns the API's
    /// response code (`SUCCESS` on acceptance).
    pub async fn insert_archive(&self, group_key: &str, rfc822: Vec<u8>) -> Result<String, ApiError> {
        let url = endpoint_url(&self.endpoints.migration, &["groups", group_key, "archive"])?;
        let response: ArchiveInsertResponse = self
            .send_json(
                "groupsmigration archive.insert",
                self.client
                    .post(url)
                    .query(&[("uploadType", "media")])
                    .header("content-type", "message/rfc822")
                    .body(rfc822),
            )
            .await?;
        Ok(response.response_code.unwrap_or_default())
    }
}
