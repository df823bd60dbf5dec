use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{error, info};

use crate::model::{ChannelId, ResourceKey};
use crate::registry::Registry;
use crate::remote::RemoteStore;

const STOP_CONCURRENCY: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StopFailure {
    pub channel_id: ChannelId,
    pub post: String,
    pub error: String,
}

/// Result of a bulk channel stop.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TeardownReport {
    pub attempted: usize,
    pub stopped: Vec<ChannelId>,
    pub failures: Vec<StopFailure>,
}

impl TeardownReport {
    pub fn all_stopped(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Stops every open channel.
pub struct LifecycleController {
    registry: Arc<Registry>,
    store: Arc<dyn RemoteStore>,
}

impl std::fmt::Debug for LifecycleController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleController")
            .field("channels", &self.registry.len())
            .finish_non_exhaustive()
    }
}

impl LifecycleController {
    pub fn new(registry: Arc<Registry>, store: Arc<dyn RemoteStore>) -> Self {
        Self { registry, store }
    }

    /// Drain the registry and ask the remote store to stop each channel.
    ///
    /// Every channel is attempted even when earlier stops fail. Notifications
    /// arriving afterwards no longer find their channel.
    pub async fn stop_all(&self) -> TeardownReport {
        let entries = self.registry.drain();
        info!(channels = entries.len(), "stopping all listener channels");

        let results: Vec<(ChannelId, ResourceKey, Result<(), String>)> = stream::iter(entries)
            .map(|entry| {
                let store = Arc::clone(&self.store);
                async move {
                    let result = store
                        .stop_channel(entry.channel())
                        .await
                        .map_err(|err| err.to_string());
                    (entry.channel().id.clone(), entry.key().clone(), result)
                }
            })
            .buffer_unordered(STOP_CONCURRENCY)
            .collect()
            .await;

        let mut report = TeardownReport {
            attempted: results.len(),
            ..Default::default()
        };

        for (channel_id, key, result) in results {
            match result {
                Ok(()) => report.stopped.push(channel_id),
                Err(err) => {
                    error!(
                        channel_id = %channel_id,
                        post = %key,
                        error = %err,
                        "error stopping channel"
                    );
                    report.failures.push(StopFailure {
                        channel_id,
                        post: key.to_string(),
                        error: err,
                    });
                }
            }
        }

        report.stopped.sort();
        report.failures.sort_by(|a, b| a.channel_id.cmp(&b.channel_id));

        info!(
            attempted = report.attempted,
            stopped = report.stopped.len(),
            failed = report.failures.len(),
            "channel teardown finished"
        );
        report
    }
}
