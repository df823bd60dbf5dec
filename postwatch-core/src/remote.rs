use std::collections::HashSet;

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{ChannelRecord, ChannelRequest, ItemId, RemoteItem};

/// Filter for a single listing call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListQuery {
    /// Only direct children of this item.
    pub parent: Option<ItemId>,
    /// Exact name match.
    pub name: Option<String>,
    /// Any of these MIME types; empty means no type filter.
    pub mime_types: Vec<String>,
}

impl ListQuery {
    pub fn children_of(parent: &ItemId) -> Self {
        Self {
            parent: Some(parent.clone()),
            ..Default::default()
        }
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn with_mime(mut self, mime: impl Into<String>) -> Self {
        self.mime_types.push(mime.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    pub items: Vec<RemoteItem>,
    pub next_page_token: Option<String>,
}

/// Port onto the remote document store: listing, download and push channels.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Fetch one page of items matching `query`.
    async fn list(
        &self,
        query: &ListQuery,
        page_token: Option<String>,
    ) -> Result<ListPage>;

    /// Download (or export) the content of `item`.
    async fn download(&self, item: &RemoteItem) -> Result<Vec<u8>>;

    /// Ask the store to push change notifications for `request.target`.
    async fn open_channel(&self, request: &ChannelRequest)
    -> Result<ChannelRecord>;

    /// Cancel a previously opened channel.
    async fn stop_channel(&self, channel: &ChannelRecord) -> Result<()>;
}

/// Follow page tokens until the listing is exhausted.
///
/// Stops early if the store hands back a token it already returned.
pub async fn list_all(
    store: &dyn RemoteStore,
    query: &ListQuery,
) -> Result<Vec<RemoteItem>> {
    let mut items = Vec::new();
    let mut seen = HashSet::new();
    let mut page_token: Option<String> = None;

    loop {
        let page = store.list(query, page_token.clone()).await?;
        items.extend(page.items);

        match page.next_page_token {
            Some(next) if !next.is_empty() && seen.insert(next.clone()) => {
                page_token = Some(next);
            }
            _ => break,
        }
    }

    Ok(items)
}
