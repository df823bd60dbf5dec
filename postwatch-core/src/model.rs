use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// MIME type of folders on the remote store.
pub const FOLDER_MIME: &str = "application/vnd.google-apps.folder";
/// Native (editor) document MIME type; exported before download.
pub const NATIVE_DOC_MIME: &str = "application/vnd.google-apps.document";
/// Word document MIME type.
pub const DOCX_MIME: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
/// JPEG image MIME type, used for cover images.
pub const JPEG_MIME: &str = "image/jpeg";

/// Opaque identifier the remote store assigns to an item.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ItemId(pub String);

impl ItemId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Locally generated identifier of a push-notification channel.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ChannelId(pub String);

impl ChannelId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A file or folder as returned by a listing call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteItem {
    pub id: ItemId,
    pub name: String,
    pub mime_type: String,
}

impl RemoteItem {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        mime_type: impl Into<String>,
    ) -> Self {
        Self {
            id: ItemId::new(id),
            name: name.into(),
            mime_type: mime_type.into(),
        }
    }

    pub fn is_folder(&self) -> bool {
        self.mime_type == FOLDER_MIME
    }
}

/// Human-meaningful identity of a post: the author folder and date folder.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct ResourceKey {
    pub author: String,
    pub date: String,
}

impl ResourceKey {
    pub fn new(author: impl Into<String>, date: impl Into<String>) -> Self {
        Self {
            author: author.into(),
            date: date.into(),
        }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.author, self.date)
    }
}

/// One watched document as discovered by the catalog builder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub key: ResourceKey,
    pub document: RemoteItem,
    /// Optional cover image living next to the document.
    pub asset: Option<RemoteItem>,
}

impl Resource {
    pub fn resource_id(&self) -> &ItemId {
        &self.document.id
    }

    pub fn filename(&self) -> &str {
        &self.document.name
    }

    pub fn content_type(&self) -> &str {
        &self.document.mime_type
    }

    /// Filename without its extension, used as the post title.
    pub fn title(&self) -> &str {
        let name = self.filename();
        match name.rfind('.') {
            Some(idx) if idx > 0 => &name[..idx],
            _ => name,
        }
    }
}

/// Notification transport requested for a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelTransport {
    #[serde(rename = "web_hook")]
    WebHook,
}

impl ChannelTransport {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelTransport::WebHook => "web_hook",
        }
    }
}

/// Everything the remote store needs to open a channel on one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelRequest {
    pub id: ChannelId,
    pub target: ItemId,
    pub transport: ChannelTransport,
    pub address: String,
    pub expires_at: DateTime<Utc>,
    pub payload: bool,
}

/// A channel the remote store has confirmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRecord {
    pub id: ChannelId,
    /// The item the channel watches.
    pub target: ItemId,
    /// Opaque id the remote store assigns to the watched resource; required to
    /// stop the channel and not necessarily equal to `target`.
    pub remote_resource_id: Option<String>,
    pub address: String,
    pub expires_at: DateTime<Utc>,
}

impl ChannelRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}
