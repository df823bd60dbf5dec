use postwatch_core::ChannelId;
use postwatch_server::infra::startup::{
    NoopStartupHooks, ProdStartupHooks, StartupHooks, warn_expired_channels,
};

mod support;
use support::harness;

#[tokio::test]
async fn initial_sync_refreshes_every_post_without_starting_cooldowns() {
    let h = harness(&[
        ("chan-alice-0001", "alice", "2024-01-01"),
        ("chan-bob-00001", "bob", "2024-01-02"),
    ]);

    ProdStartupHooks.run(&h.state).await.unwrap();
    h.settle().await;

    assert_eq!(h.refresher.calls(), 2);
    let alice = h
        .state
        .registry()
        .lookup(&ChannelId::new("chan-alice-0001"))
        .unwrap();
    assert!(alice.last_refresh().await.is_none());
}

#[tokio::test]
async fn noop_hooks_leave_posts_alone() {
    let h = harness(&[("chan-alice-0001", "alice", "2024-01-01")]);

    NoopStartupHooks.run(&h.state).await.unwrap();
    h.settle().await;

    assert_eq!(h.refresher.calls(), 0);
}

#[tokio::test]
async fn fresh_channels_are_not_reported_expired() {
    let h = harness(&[("chan-alice-0001", "alice", "2024-01-01")]);
    assert_eq!(warn_expired_channels(&h.state), 0);
}
