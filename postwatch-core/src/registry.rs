//! Channel id → watched resource mapping shared by every request handler.
//!
//! The map is populated once through [`RegistryBuilder`] before the server
//! starts. After that it only ever shrinks, and only through
//! [`Registry::drain`] during teardown. Lookups clone the entry's `Arc` and
//! release the map lock immediately, so the map lock is never held while a
//! resource lock is awaited or a refresh runs.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::Instant;

use crate::error::RegistryError;
use crate::model::{ChannelId, ChannelRecord, ItemId, Resource, ResourceKey};

/// Mutable part of a watched resource, guarded by the resource's own lock.
#[derive(Debug, Default, Clone)]
pub struct RefreshState {
    /// Monotonic instant of the last accepted refresh.
    pub last_refresh: Option<Instant>,
}

/// Refresh counters readable while the resource lock is held.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RefreshHistory {
    /// Wall-clock time of the last accepted refresh, for reporting.
    pub last_refresh_at: Option<DateTime<Utc>>,
    pub refreshes: u64,
}

#[derive(Debug)]
pub struct WatchedResource {
    resource: Resource,
    channel: ChannelRecord,
    state: Mutex<RefreshState>,
    history: parking_lot::Mutex<RefreshHistory>,
}

impl WatchedResource {
    pub fn new(resource: Resource, channel: ChannelRecord) -> Self {
        Self {
            resource,
            channel,
            state: Mutex::new(RefreshState::default()),
            history: parking_lot::Mutex::new(RefreshHistory::default()),
        }
    }

    pub fn resource(&self) -> &Resource {
        &self.resource
    }

    pub fn key(&self) -> &ResourceKey {
        &self.resource.key
    }

    pub fn channel(&self) -> &ChannelRecord {
        &self.channel
    }

    /// Exclusive access to the refresh state; released when the guard drops.
    pub async fn lock(&self) -> MutexGuard<'_, RefreshState> {
        self.state.lock().await
    }

    pub async fn last_refresh(&self) -> Option<Instant> {
        self.state.lock().await.last_refresh
    }

    /// Start a new debounce window. Requires the resource lock.
    pub fn record_refresh(&self, state: &mut RefreshState, now: Instant, wall: DateTime<Utc>) {
        state.last_refresh = Some(now);
        let mut history = self.history.lock();
        history.last_refresh_at = Some(wall);
        history.refreshes += 1;
    }

    pub fn history(&self) -> RefreshHistory {
        *self.history.lock()
    }
}

/// Collects confirmed subscriptions before serving starts.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    entries: HashMap<ChannelId, Arc<WatchedResource>>,
    watched: HashSet<ItemId>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains_channel(&self, id: &ChannelId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn watches(&self, resource_id: &ItemId) -> bool {
        self.watched.contains(resource_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Register `resource` under its confirmed channel.
    ///
    /// Rejects a second channel for the same resource and a reused channel id.
    pub fn insert(
        &mut self,
        resource: Resource,
        channel: ChannelRecord,
    ) -> Result<(), RegistryError> {
        if self.entries.contains_key(&channel.id) {
            return Err(RegistryError::DuplicateChannel(channel.id));
        }
        if self.watched.contains(resource.resource_id()) {
            return Err(RegistryError::DuplicateResource(
                resource.resource_id().clone(),
            ));
        }

        self.watched.insert(resource.resource_id().clone());
        self.entries.insert(
            channel.id.clone(),
            Arc::new(WatchedResource::new(resource, channel)),
        );
        Ok(())
    }

    pub fn build(self) -> Registry {
        Registry {
            entries: RwLock::new(self.entries),
        }
    }
}

#[derive(Debug, Default)]
pub struct Registry {
    entries: RwLock<HashMap<ChannelId, Arc<WatchedResource>>>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    pub fn lookup(&self, id: &ChannelId) -> Option<Arc<WatchedResource>> {
        self.entries.read().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn channel_ids(&self) -> Vec<ChannelId> {
        let mut ids: Vec<_> = self.entries.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn snapshot(&self) -> Vec<Arc<WatchedResource>> {
        let mut entries: Vec<_> = self.entries.read().values().cloned().collect();
        entries.sort_by(|a, b| a.key().cmp(b.key()));
        entries
    }

    /// Remove every entry. Lookups that race with this observe a miss.
    pub fn drain(&self) -> Vec<Arc<WatchedResource>> {
        let mut entries: Vec<_> = self.entries.write().drain().map(|(_, v)| v).collect();
        entries.sort_by(|a, b| a.key().cmp(b.key()));
        entries
    }

    /// Expiration and refresh status of every channel.
    ///
    /// A resource whose lock is currently held is reported as refreshing
    /// instead of waiting for it; its refresh history is still reported.
    pub fn health(&self, now: DateTime<Utc>) -> RegistryHealth {
        let channels: Vec<ChannelHealth> = self
            .snapshot()
            .iter()
            .map(|entry| {
                let refreshing = entry.state.try_lock().is_err();
                let history = entry.history();
                ChannelHealth {
                    channel_id: entry.channel.id.clone(),
                    author: entry.key().author.clone(),
                    date: entry.key().date.clone(),
                    filename: entry.resource.filename().to_string(),
                    expires_at: entry.channel.expires_at,
                    expired: entry.channel.is_expired(now),
                    refreshing,
                    last_refresh_at: history.last_refresh_at,
                    refreshes: history.refreshes,
                }
            })
            .collect();

        RegistryHealth {
            checked_at: now,
            total: channels.len(),
            expired: channels.iter().filter(|c| c.expired).count(),
            channels,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChannelHealth {
    pub channel_id: ChannelId,
    pub author: String,
    pub date: String,
    pub filename: String,
    pub expires_at: DateTime<Utc>,
    pub expired: bool,
    pub refreshing: bool,
    pub last_refresh_at: Option<DateTime<Utc>>,
    pub refreshes: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegistryHealth {
    pub checked_at: DateTime<Utc>,
    pub total: usize,
    pub expired: usize,
    pub channels: Vec<ChannelHealth>,
}

impl RegistryHealth {
    pub fn all_live(&self) -> bool {
        self.expired == 0
    }
}
