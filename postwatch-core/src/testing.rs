//! In-memory fakes for the remote store and the refresh pipeline.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::Semaphore;

use crate::error::{RemoteError, Result};
use crate::model::{
    ChannelId, ChannelRecord, ChannelRequest, DOCX_MIME, FOLDER_MIME, ItemId, JPEG_MIME,
    RemoteItem, Resource, ResourceKey,
};
use crate::refresh::{RefreshError, RefreshStep, Refresher};
use crate::remote::{ListPage, ListQuery, RemoteStore};

pub fn sample_resource(author: &str, date: &str) -> Resource {
    Resource {
        key: ResourceKey::new(author, date),
        document: RemoteItem::new(
            format!("doc-{author}-{date}"),
            format!("{author} {date}.docx"),
            DOCX_MIME,
        ),
        asset: Some(RemoteItem::new(
            format!("img-{author}-{date}"),
            "cover.jpg",
            JPEG_MIME,
        )),
    }
}

pub fn sample_channel(id: &str, target: &str) -> ChannelRecord {
    ChannelRecord {
        id: ChannelId::new(id),
        target: ItemId::new(target),
        remote_resource_id: Some(format!("remote-{target}")),
        address: "https://example.org/api".to_string(),
        expires_at: Utc::now() + chrono::Duration::hours(1),
    }
}

#[derive(Debug, Clone)]
struct Node {
    parent: Option<ItemId>,
    item: RemoteItem,
}

/// Remote store backed by an in-memory folder tree.
#[derive(Debug, Default)]
pub struct FakeRemote {
    nodes: Vec<Node>,
    page_size: Option<usize>,
    contents: HashMap<ItemId, Vec<u8>>,
    fail_listing: HashSet<ItemId>,
    fail_open: HashSet<ItemId>,
    reuse_channel_id: Option<ChannelId>,
    fail_stop: Mutex<HashSet<ChannelId>>,
    opened: Mutex<Vec<ChannelRequest>>,
    stopped: Mutex<Vec<ChannelId>>,
    downloads: Mutex<Vec<ItemId>>,
}

impl FakeRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Root folder with `author/date` folders, each holding one document and
    /// one cover image. Ids follow `author-{a}`, `date-{a}-{d}`,
    /// `doc-{a}-{d}` and `img-{a}-{d}`.
    pub fn with_posts(root: &str, posts: &[(&str, &[&str])]) -> Self {
        let mut remote = Self::new().folder("root", root, "");
        for (author, dates) in posts {
            let author_id = format!("author-{author}");
            remote = remote.folder(&author_id, author, "root");
            for date in dates.iter() {
                let date_id = format!("date-{author}-{date}");
                remote = remote
                    .folder(&date_id, date, &author_id)
                    .file(
                        &format!("doc-{author}-{date}"),
                        &format!("{author} {date}.docx"),
                        DOCX_MIME,
                        &date_id,
                    )
                    .file(&format!("img-{author}-{date}"), "cover.jpg", JPEG_MIME, &date_id);
            }
        }
        remote
    }

    /// An empty `parent` places the folder at the top level.
    pub fn folder(self, id: &str, name: &str, parent: &str) -> Self {
        self.file(id, name, FOLDER_MIME, parent)
    }

    pub fn file(mut self, id: &str, name: &str, mime: &str, parent: &str) -> Self {
        let parent = (!parent.is_empty()).then(|| ItemId::new(parent));
        self.nodes.push(Node {
            parent,
            item: RemoteItem::new(id, name, mime),
        });
        self
    }

    pub fn content(mut self, id: &str, bytes: impl Into<Vec<u8>>) -> Self {
        self.contents.insert(ItemId::new(id), bytes.into());
        self
    }

    pub fn page_size(mut self, size: usize) -> Self {
        self.page_size = Some(size.max(1));
        self
    }

    pub fn fail_listing(mut self, parent: &str) -> Self {
        self.fail_listing.insert(ItemId::new(parent));
        self
    }

    pub fn fail_open(mut self, target: &str) -> Self {
        self.fail_open.insert(ItemId::new(target));
        self
    }

    /// Confirm every channel under `id` whatever id was requested.
    pub fn reuse_channel_id(mut self, id: &str) -> Self {
        self.reuse_channel_id = Some(ChannelId::new(id));
        self
    }

    /// Make stopping the given channel fail. Usable after subscription since
    /// channel ids are generated at runtime.
    pub fn fail_stop(&self, channel: &ChannelId) {
        self.fail_stop.lock().insert(channel.clone());
    }

    pub fn opened(&self) -> Vec<ChannelRequest> {
        self.opened.lock().clone()
    }

    pub fn stopped(&self) -> Vec<ChannelId> {
        self.stopped.lock().clone()
    }

    pub fn downloads(&self) -> Vec<ItemId> {
        self.downloads.lock().clone()
    }

    fn matches(node: &Node, query: &ListQuery) -> bool {
        if let Some(parent) = &query.parent
            && node.parent.as_ref() != Some(parent)
        {
            return false;
        }
        if let Some(name) = &query.name
            && &node.item.name != name
        {
            return false;
        }
        query.mime_types.is_empty() || query.mime_types.contains(&node.item.mime_type)
    }
}

#[async_trait]
impl RemoteStore for FakeRemote {
    async fn list(&self, query: &ListQuery, page_token: Option<String>) -> Result<ListPage> {
        if let Some(parent) = &query.parent
            && self.fail_listing.contains(parent)
        {
            return Err(RemoteError::Transport(format!("listing {parent} refused")));
        }

        let all: Vec<RemoteItem> = self
            .nodes
            .iter()
            .filter(|node| Self::matches(node, query))
            .map(|node| node.item.clone())
            .collect();

        let offset: usize = page_token
            .as_deref()
            .map(|t| t.parse().map_err(|_| RemoteError::Malformed(format!("bad page token {t}"))))
            .transpose()?
            .unwrap_or(0);
        let size = self.page_size.unwrap_or(all.len().max(1));
        let items: Vec<RemoteItem> = all.iter().skip(offset).take(size).cloned().collect();
        let next = offset + items.len();
        let next_page_token = (next < all.len()).then(|| next.to_string());

        Ok(ListPage {
            items,
            next_page_token,
        })
    }

    async fn download(&self, item: &RemoteItem) -> Result<Vec<u8>> {
        self.downloads.lock().push(item.id.clone());
        self.contents
            .get(&item.id)
            .cloned()
            .ok_or_else(|| RemoteError::Api {
                status: 404,
                message: format!("File not found: {}", item.id),
            })
    }

    async fn open_channel(&self, request: &ChannelRequest) -> Result<ChannelRecord> {
        if self.fail_open.contains(&request.target) {
            return Err(RemoteError::Api {
                status: 403,
                message: "push notifications are not enabled".into(),
            });
        }
        self.opened.lock().push(request.clone());
        Ok(ChannelRecord {
            id: self
                .reuse_channel_id
                .clone()
                .unwrap_or_else(|| request.id.clone()),
            target: request.target.clone(),
            remote_resource_id: Some(format!("remote-{}", request.target)),
            address: request.address.clone(),
            expires_at: request.expires_at,
        })
    }

    async fn stop_channel(&self, channel: &ChannelRecord) -> Result<()> {
        if self.fail_stop.lock().contains(&channel.id) {
            return Err(RemoteError::Api {
                status: 404,
                message: format!("Channel '{}' not found", channel.id),
            });
        }
        self.stopped.lock().push(channel.id.clone());
        Ok(())
    }
}

/// Refresher that records calls and can be slowed down, failed or gated.
#[derive(Debug, Default)]
pub struct RecordingRefresher {
    calls: AtomicUsize,
    refreshed: Mutex<Vec<ResourceKey>>,
    delay: Option<Duration>,
    fail_with: Option<RefreshStep>,
    gate: Option<(String, Arc<Semaphore>)>,
}

impl RecordingRefresher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn failing(mut self, step: RefreshStep) -> Self {
        self.fail_with = Some(step);
        self
    }

    /// Refreshes for `author` wait until a permit is added to the returned
    /// semaphore.
    pub fn gated(mut self, author: &str) -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        self.gate = Some((author.to_string(), Arc::clone(&gate)));
        (self, gate)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn refreshed(&self) -> Vec<ResourceKey> {
        self.refreshed.lock().clone()
    }
}

#[async_trait]
impl Refresher for RecordingRefresher {
    async fn refresh(&self, resource: &Resource) -> std::result::Result<(), RefreshError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some((author, gate)) = &self.gate
            && author == &resource.key.author
        {
            let permit = gate
                .acquire()
                .await
                .map_err(|_| RefreshError::new(RefreshStep::Download, "gate closed"))?;
            permit.forget();
        }

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        self.refreshed.lock().push(resource.key.clone());

        match self.fail_with {
            Some(step) => Err(RefreshError::new(step, "script exited with status 1")),
            None => Ok(()),
        }
    }
}
