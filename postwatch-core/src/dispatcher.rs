//! Correlates inbound change notifications with watched resources and decides
//! whether to trigger a refresh.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::debounce::DebounceGuard;
use crate::model::ChannelId;
use crate::refresh::{RefreshError, RefreshStep, Refresher};
use crate::registry::{Registry, WatchedResource};

/// The only resource state that can trigger a refresh.
pub const STATE_UPDATE: &str = "update";
/// Changed aspects that count as an edit to the post.
pub const RELEVANT_CHANGES: [&str; 2] = ["content", "properties"];

/// Correlation values carried by a push notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub channel_id: ChannelId,
    pub resource_state: String,
    pub changed: Vec<String>,
    pub message_number: Option<String>,
}

impl Notification {
    pub fn new(
        channel_id: impl Into<String>,
        resource_state: impl Into<String>,
        changed: &str,
    ) -> Self {
        Self {
            channel_id: ChannelId::new(channel_id),
            resource_state: resource_state.into(),
            changed: parse_changed(changed),
            message_number: None,
        }
    }

    pub fn is_update(&self) -> bool {
        self.resource_state == STATE_UPDATE
    }

    /// Relevant entries of the changed-aspects list.
    pub fn relevant_changes(&self) -> Vec<&str> {
        self.changed
            .iter()
            .map(String::as_str)
            .filter(|change| RELEVANT_CHANGES.contains(change))
            .collect()
    }
}

/// Split a comma-separated changed-aspects header.
pub fn parse_changed(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Resource state was not `update`.
    IgnoredState(String),
    /// Nothing relevant changed.
    IgnoredChanges,
    UnknownChannel(ChannelId),
    Debounced,
    Refreshed,
    RefreshFailed(RefreshError),
}

impl DispatchOutcome {
    pub fn triggered_refresh(&self) -> bool {
        matches!(
            self,
            DispatchOutcome::Refreshed | DispatchOutcome::RefreshFailed(_)
        )
    }
}

#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<Registry>,
    refresher: Arc<dyn Refresher>,
    guard: DebounceGuard,
    refresh_timeout: Option<Duration>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("channels", &self.registry.len())
            .field("guard", &self.guard)
            .field("refresh_timeout", &self.refresh_timeout)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    pub fn new(registry: Arc<Registry>, refresher: Arc<dyn Refresher>) -> Self {
        Self {
            registry,
            refresher,
            guard: DebounceGuard::default(),
            refresh_timeout: None,
        }
    }

    pub fn with_guard(mut self, guard: DebounceGuard) -> Self {
        self.guard = guard;
        self
    }

    pub fn with_refresh_timeout(mut self, timeout: Duration) -> Self {
        self.refresh_timeout = Some(timeout);
        self
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Header checks and registry lookup.
    ///
    /// Returns the matching resource when the notification should go on to
    /// the debounce check, or the terminal outcome otherwise.
    pub fn admit(
        &self,
        notification: &Notification,
    ) -> Result<Arc<WatchedResource>, DispatchOutcome> {
        if !notification.is_update() {
            debug!(
                channel_id = %notification.channel_id,
                state = %notification.resource_state,
                "ignoring non-update notification"
            );
            return Err(DispatchOutcome::IgnoredState(
                notification.resource_state.clone(),
            ));
        }

        if notification.relevant_changes().is_empty() {
            debug!(
                channel_id = %notification.channel_id,
                changed = ?notification.changed,
                "ignoring notification without content changes"
            );
            return Err(DispatchOutcome::IgnoredChanges);
        }

        match self.registry.lookup(&notification.channel_id) {
            Some(resource) => Ok(resource),
            None => {
                error!(
                    channel_id = %notification.channel_id,
                    "channel id not found for post update"
                );
                Err(DispatchOutcome::UnknownChannel(
                    notification.channel_id.clone(),
                ))
            }
        }
    }

    /// Debounce check, timestamp update and refresh under the resource lock.
    pub async fn process(&self, watched: &WatchedResource) -> DispatchOutcome {
        let mut state = watched.lock().await;
        let now = Instant::now();

        if !self.guard.allows(state.last_refresh, now) {
            debug!(
                post = %watched.key(),
                cooldown_secs = self.guard.cooldown().as_secs(),
                "post updated within cooldown, skipping"
            );
            return DispatchOutcome::Debounced;
        }

        // Recorded before the refresh runs: a failed refresh still consumes the window.
        watched.record_refresh(&mut state, now, Utc::now());
        info!(post = %watched.key(), channel_id = %watched.channel().id, "refreshing post");

        match self.run_refresher(watched).await {
            Ok(()) => {
                info!(post = %watched.key(), "post refreshed");
                DispatchOutcome::Refreshed
            }
            Err(err) => {
                error!(
                    post = %watched.key(),
                    step = %err.step,
                    error = %err.diagnostic,
                    "failed to refresh post after update"
                );
                DispatchOutcome::RefreshFailed(err)
            }
        }
    }

    pub async fn dispatch(&self, notification: &Notification) -> DispatchOutcome {
        match self.admit(notification) {
            Ok(watched) => self.process(&watched).await,
            Err(outcome) => outcome,
        }
    }

    /// Refresh without consulting or moving the debounce window.
    ///
    /// Used for the initial sync right after subscribing.
    pub async fn sync(&self, watched: &WatchedResource) -> Result<(), RefreshError> {
        let _state = watched.lock().await;
        let result = self.run_refresher(watched).await;
        if let Err(err) = &result {
            warn!(
                post = %watched.key(),
                step = %err.step,
                error = %err.diagnostic,
                "initial sync failed"
            );
        }
        result
    }

    async fn run_refresher(&self, watched: &WatchedResource) -> Result<(), RefreshError> {
        let refresh = self.refresher.refresh(watched.resource());
        match self.refresh_timeout {
            Some(limit) => match tokio::time::timeout(limit, refresh).await {
                Ok(result) => result,
                Err(_) => Err(RefreshError::new(
                    RefreshStep::Timeout,
                    format!("refresh did not finish within {}s", limit.as_secs()),
                )),
            },
            None => refresh.await,
        }
    }
}
