//! JSON shapes exchanged with the Drive v3 API.

use chrono::{DateTime, TimeZone, Utc};
use postwatch_core::{ChannelRecord, ChannelRequest, RemoteError, RemoteItem};
use serde::{Deserialize, Serialize};

pub const LIST_FIELDS: &str = "nextPageToken, files(id, name, mimeType)";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileList {
    #[serde(default)]
    pub files: Vec<DriveFile>,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
    pub id: String,
    pub name: String,
    pub mime_type: String,
}

impl From<DriveFile> for RemoteItem {
    fn from(file: DriveFile) -> Self {
        RemoteItem::new(file.id, file.name, file.mime_type)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchRequest<'a> {
    pub id: &'a str,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub address: &'a str,
    /// Milliseconds since the epoch, as a string.
    pub expiration: String,
    pub payload: bool,
}

impl<'a> WatchRequest<'a> {
    pub fn from_request(request: &'a ChannelRequest) -> Self {
        Self {
            id: request.id.as_str(),
            kind: request.transport.as_str(),
            address: &request.address,
            expiration: request.expires_at.timestamp_millis().to_string(),
            payload: request.payload,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchResponse {
    pub id: String,
    pub resource_id: Option<String>,
    pub expiration: Option<String>,
}

impl WatchResponse {
    /// Merge the confirmed channel with what was asked for. The store may
    /// shorten the expiration, so its value wins when present.
    pub fn into_record(self, request: &ChannelRequest) -> Result<ChannelRecord, RemoteError> {
        if self.id != request.id.as_str() {
            return Err(RemoteError::Malformed(format!(
                "watch returned channel {} for request {}",
                self.id, request.id
            )));
        }

        let expires_at = match self.expiration.as_deref() {
            Some(raw) => parse_millis(raw)?,
            None => request.expires_at,
        };

        Ok(ChannelRecord {
            id: request.id.clone(),
            target: request.target.clone(),
            remote_resource_id: self.resource_id,
            address: request.address.clone(),
            expires_at,
        })
    }
}

fn parse_millis(raw: &str) -> Result<DateTime<Utc>, RemoteError> {
    raw.parse::<i64>()
        .ok()
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
        .ok_or_else(|| RemoteError::Malformed(format!("invalid channel expiration '{raw}'")))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StopRequest<'a> {
    pub id: &'a str,
    pub resource_id: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
}

#[derive(Debug, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub code: Option<u16>,
    #[serde(default)]
    pub message: String,
}

/// Turn a non-success response body into a [`RemoteError::Api`].
pub fn api_error(status: u16, body: &str) -> RemoteError {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => RemoteError::Api {
            status: envelope.error.code.unwrap_or(status),
            message: envelope.error.message,
        },
        Err(_) => RemoteError::Api {
            status,
            message: body.trim().chars().take(512).collect(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use postwatch_core::model::ChannelTransport;
    use postwatch_core::{ChannelId, ItemId};

    fn request() -> ChannelRequest {
        ChannelRequest {
            id: ChannelId::new("AbCdEfGhIjKl"),
            target: ItemId::new("doc-1"),
            transport: ChannelTransport::WebHook,
            address: "https://posts.example.org/api".into(),
            expires_at: Utc.timestamp_millis_opt(1_700_000_000_000).unwrap(),
            payload: true,
        }
    }

    #[test]
    fn watch_body_uses_drive_field_names() {
        let req = request();
        let body = serde_json::to_value(WatchRequest::from_request(&req)).unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "id": "AbCdEfGhIjKl",
                "type": "web_hook",
                "address": "https://posts.example.org/api",
                "expiration": "1700000000000",
                "payload": true,
            })
        );
    }

    #[test]
    fn watch_response_keeps_resource_id_and_shorter_expiration() {
        let response: WatchResponse = serde_json::from_str(
            r#"{"kind":"api#channel","id":"AbCdEfGhIjKl","resourceId":"res-9","expiration":"1699999000000"}"#,
        )
        .unwrap();
        let record = response.into_record(&request()).unwrap();
        assert_eq!(record.remote_resource_id.as_deref(), Some("res-9"));
        assert_eq!(record.expires_at.timestamp_millis(), 1_699_999_000_000);
        assert_eq!(record.target, ItemId::new("doc-1"));
    }

    #[test]
    fn mismatched_channel_id_is_malformed() {
        let response = WatchResponse {
            id: "other".into(),
            resource_id: None,
            expiration: None,
        };
        assert!(matches!(
            response.into_record(&request()),
            Err(RemoteError::Malformed(_))
        ));
    }

    #[test]
    fn error_envelope_is_decoded() {
        let err = api_error(
            400,
            r#"{"error":{"code":404,"errors":[],"message":"File not found: doc-1."}}"#,
        );
        match err {
            RemoteError::Api { status, message } => {
                assert_eq!(status, 404);
                assert_eq!(message, "File not found: doc-1.");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn non_json_error_keeps_status_and_text() {
        match api_error(502, "  Bad Gateway \n") {
            RemoteError::Api { status, message } => {
                assert_eq!(status, 502);
                assert_eq!(message, "Bad Gateway");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn file_list_tolerates_missing_fields() {
        let list: FileList = serde_json::from_str(r#"{"kind":"drive#fileList"}"#).unwrap();
        assert!(list.files.is_empty());
        assert!(list.next_page_token.is_none());
    }
}
