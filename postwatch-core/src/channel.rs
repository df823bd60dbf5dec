use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::{Rng, distr::Alphanumeric};
use tracing::{error, info};

use crate::error::{RemoteError, SubscribeError};
use crate::model::{ChannelId, ChannelRecord, ChannelRequest, ChannelTransport, Resource};
use crate::remote::RemoteStore;

/// Shortest channel id we are willing to generate.
pub const MIN_CHANNEL_ID_LEN: usize = 10;

/// Random alphanumeric channel id of at least [`MIN_CHANNEL_ID_LEN`] characters.
pub fn generate_channel_id(len: usize) -> ChannelId {
    let len = len.max(MIN_CHANNEL_ID_LEN);
    let id: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect();
    ChannelId(id)
}

#[derive(Debug, Clone)]
pub struct ChannelOptions {
    /// Public address the remote store posts notifications to.
    pub callback_address: String,
    /// Requested lifetime of each channel.
    pub ttl: Duration,
    pub id_length: usize,
    /// Opt in to notification payload delivery.
    pub payload: bool,
}

impl ChannelOptions {
    pub fn new(callback_address: impl Into<String>) -> Self {
        Self {
            callback_address: callback_address.into(),
            ttl: Duration::from_secs(60 * 60),
            id_length: 24,
            payload: true,
        }
    }
}

/// Opens one push-notification channel per watched document.
pub struct ChannelSubscriber {
    store: Arc<dyn RemoteStore>,
    options: ChannelOptions,
}

impl std::fmt::Debug for ChannelSubscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelSubscriber")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl ChannelSubscriber {
    pub fn new(store: Arc<dyn RemoteStore>, options: ChannelOptions) -> Self {
        Self { store, options }
    }

    pub fn options(&self) -> &ChannelOptions {
        &self.options
    }

    pub fn generate_id(&self) -> ChannelId {
        generate_channel_id(self.options.id_length)
    }

    pub fn request_for(
        &self,
        resource: &Resource,
        id: ChannelId,
        now: DateTime<Utc>,
    ) -> ChannelRequest {
        let fallback = chrono::Duration::hours(1);
        let expires_at = chrono::Duration::from_std(self.options.ttl)
            .ok()
            .and_then(|ttl| now.checked_add_signed(ttl))
            .unwrap_or(now + fallback);
        ChannelRequest {
            id,
            target: resource.resource_id().clone(),
            transport: ChannelTransport::WebHook,
            address: self.options.callback_address.clone(),
            expires_at,
            payload: self.options.payload,
        }
    }

    /// Stop a channel this subscriber opened.
    pub async fn unsubscribe(&self, channel: &ChannelRecord) -> Result<(), RemoteError> {
        self.store.stop_channel(channel).await
    }

    /// Open a channel for `resource` under the given id.
    pub async fn subscribe(
        &self,
        resource: &Resource,
        id: ChannelId,
    ) -> Result<ChannelRecord, SubscribeError> {
        let request = self.request_for(resource, id, Utc::now());

        match self.store.open_channel(&request).await {
            Ok(record) => {
                info!(
                    post = %resource.key,
                    channel_id = %record.id,
                    expires_at = %record.expires_at,
                    "subscribed to post"
                );
                Ok(record)
            }
            Err(source) => {
                error!(
                    post = %resource.key,
                    channel_id = %request.id,
                    error = %source,
                    "failed to subscribe to post changes"
                );
                Err(SubscribeError::Remote {
                    channel_id: request.id,
                    target: request.target,
                    source,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeRemote, sample_resource};

    #[test]
    fn generated_ids_are_alphanumeric_and_long_enough() {
        for len in [0, 4, 10, 32] {
            let id = generate_channel_id(len);
            assert_eq!(id.as_str().len(), len.max(MIN_CHANNEL_ID_LEN));
            assert!(id.as_str().chars().all(|c| c.is_ascii_alphanumeric()));
        }
    }

    #[test]
    fn generated_ids_do_not_repeat() {
        let ids: std::collections::HashSet<_> =
            (0..1000).map(|_| generate_channel_id(10)).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn request_carries_webhook_address_and_expiration() {
        let mut options = ChannelOptions::new("https://example.org/api");
        options.ttl = Duration::from_secs(300);
        let subscriber = ChannelSubscriber::new(Arc::new(FakeRemote::new()), options);
        let resource = sample_resource("alice", "2024-01-01");
        let now = Utc::now();

        let request = subscriber.request_for(&resource, ChannelId::new("abcdefghij"), now);

        assert_eq!(request.target, resource.document.id);
        assert_eq!(request.transport, ChannelTransport::WebHook);
        assert_eq!(request.address, "https://example.org/api");
        assert_eq!(request.expires_at, now + chrono::Duration::seconds(300));
        assert!(request.payload);
    }

    #[test]
    fn unrepresentable_ttl_falls_back_to_one_hour() {
        let mut options = ChannelOptions::new("https://example.org/api");
        options.ttl = Duration::from_secs(280_000 * 365 * 24 * 60 * 60);
        let subscriber = ChannelSubscriber::new(Arc::new(FakeRemote::new()), options);
        let now = Utc::now();

        let request = subscriber.request_for(
            &sample_resource("alice", "2024-01-01"),
            ChannelId::new("abcdefghij"),
            now,
        );

        assert_eq!(request.expires_at, now + chrono::Duration::hours(1));
    }

    #[tokio::test]
    async fn remote_failure_is_reported_not_panicked() {
        let resource = sample_resource("alice", "2024-01-01");
        let remote = FakeRemote::new().fail_open(resource.resource_id().as_str());
        let subscriber = ChannelSubscriber::new(
            Arc::new(remote),
            ChannelOptions::new("https://example.org/api"),
        );

        let err = subscriber
            .subscribe(&resource, ChannelId::new("abcdefghij"))
            .await
            .unwrap_err();
        assert!(matches!(err, SubscribeError::Remote { .. }));
    }
}
