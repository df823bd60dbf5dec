//! Stopping every channel on teardown, including partial failures.

use std::sync::Arc;

use async_trait::async_trait;
use mockall::mock;
use postwatch_core::{
    ChannelId, LifecycleController, ListPage, ListQuery, RemoteError, RemoteItem, RemoteStore,
    model::{ChannelRecord, ChannelRequest},
};

mod support;
use support::registry_of;

mock! {
    pub Remote {}

    #[async_trait]
    impl RemoteStore for Remote {
        async fn list(
            &self,
            query: &ListQuery,
            page_token: Option<String>,
        ) -> Result<ListPage, RemoteError>;
        async fn download(&self, item: &RemoteItem) -> Result<Vec<u8>, RemoteError>;
        async fn open_channel(
            &self,
            request: &ChannelRequest,
        ) -> Result<ChannelRecord, RemoteError>;
        async fn stop_channel(&self, channel: &ChannelRecord) -> Result<(), RemoteError>;
    }
}

fn five_posts() -> Vec<(&'static str, &'static str, &'static str)> {
    vec![
        ("chan-000000001", "alice", "2024-01-01"),
        ("chan-000000002", "alice", "2024-02-01"),
        ("chan-000000003", "bob", "2024-03-01"),
        ("chan-000000004", "carol", "2024-04-01"),
        ("chan-000000005", "dave", "2024-05-01"),
    ]
}

#[tokio::test]
async fn one_failing_stop_does_not_prevent_the_rest() {
    let registry = registry_of(&five_posts());
    let mut remote = MockRemote::new();
    remote
        .expect_stop_channel()
        .times(5)
        .returning(|channel| {
            if channel.id.as_str() == "chan-000000003" {
                Err(RemoteError::Api {
                    status: 404,
                    message: "Channel not found".into(),
                })
            } else {
                Ok(())
            }
        });

    let controller = LifecycleController::new(registry.clone(), Arc::new(remote));
    let report = controller.stop_all().await;

    assert_eq!(report.attempted, 5);
    assert_eq!(report.stopped.len(), 4);
    assert!(!report.all_stopped());
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].channel_id, ChannelId::new("chan-000000003"));
    assert_eq!(report.failures[0].post, "bob/2024-03-01");
    assert!(registry.is_empty());
}

#[tokio::test]
async fn clean_teardown_reports_success() {
    let registry = registry_of(&five_posts());
    let mut remote = MockRemote::new();
    remote.expect_stop_channel().times(5).returning(|_| Ok(()));

    let report = LifecycleController::new(registry.clone(), Arc::new(remote))
        .stop_all()
        .await;

    assert!(report.all_stopped());
    assert_eq!(report.stopped.len(), 5);
    assert!(registry.lookup(&ChannelId::new("chan-000000001")).is_none());
}

#[tokio::test]
async fn second_teardown_has_nothing_left_to_stop() {
    let registry = registry_of(&five_posts());
    let mut remote = MockRemote::new();
    remote.expect_stop_channel().times(5).returning(|_| Ok(()));
    let controller = LifecycleController::new(registry, Arc::new(remote));

    controller.stop_all().await;
    let again = controller.stop_all().await;

    assert_eq!(again.attempted, 0);
    assert!(again.all_stopped());
}
