use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use tracing::{info, warn};

use crate::infra::app_state::AppState;

const EXPIRY_CHECK_INTERVAL: Duration = Duration::from_secs(300);

#[async_trait]
pub trait StartupHooks: Send + Sync {
    async fn run(&self, state: &AppState) -> Result<()>;
}

/// Downloads every watched post once before serving, then starts the
/// channel expiry watch.
#[derive(Debug, Default)]
pub struct ProdStartupHooks;

#[async_trait]
impl StartupHooks for ProdStartupHooks {
    async fn run(&self, state: &AppState) -> Result<()> {
        if state.config.dispatch.refresh_on_startup {
            let watched = state.registry().snapshot();
            info!(posts = watched.len(), "running initial sync");
            let mut failed = 0usize;
            for entry in &watched {
                if state.dispatcher.sync(entry).await.is_err() {
                    failed += 1;
                }
            }
            info!(posts = watched.len(), failed, "initial sync finished");
        }

        let expiry_state = state.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(EXPIRY_CHECK_INTERVAL);
            loop {
                interval.tick().await;
                if expiry_state.shutdown.is_triggered() {
                    break;
                }
                warn_expired_channels(&expiry_state);
            }
        });

        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct NoopStartupHooks;

#[async_trait]
impl StartupHooks for NoopStartupHooks {
    async fn run(&self, _state: &AppState) -> Result<()> {
        Ok(())
    }
}

/// Channels are never renewed, so an expired one means that post is no
/// longer watched until the next restart.
pub fn warn_expired_channels(state: &AppState) -> usize {
    let health = state.registry().health(Utc::now());
    for channel in health.channels.iter().filter(|c| c.expired) {
        warn!(
            channel_id = %channel.channel_id,
            author = %channel.author,
            date = %channel.date,
            expired_at = %channel.expires_at,
            "listener channel expired; restart to resubscribe"
        );
    }
    health.expired
}
