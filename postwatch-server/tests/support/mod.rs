use std::sync::Arc;
use std::time::Duration;

use axum::{Router, body::Body, http::Request};
use postwatch_core::{
    Dispatcher, LifecycleController, Registry, RemoteStore,
    testing::{FakeRemote, RecordingRefresher, sample_channel, sample_resource},
};
use postwatch_server::{
    AppState,
    infra::config::{ConfigMetadata, loader::compose, sources::EnvConfig},
    routes,
};

#[allow(dead_code)]
pub struct Harness {
    pub state: AppState,
    pub app: Router,
    pub remote: Arc<FakeRemote>,
    pub refresher: Arc<RecordingRefresher>,
}

#[allow(dead_code)]
impl Harness {
    /// Let every spawned refresh run to completion.
    pub async fn settle(&self) {
        self.state.tasks.close();
        tokio::time::timeout(Duration::from_secs(5), self.state.tasks.wait())
            .await
            .expect("background refreshes finish");
        self.state.tasks.reopen();
    }
}

/// Server wired to in-memory fakes with one post per `(channel, author, date)`.
pub fn harness(entries: &[(&str, &str, &str)]) -> Harness {
    let mut builder = Registry::builder();
    for (channel, author, date) in entries {
        let resource = sample_resource(author, date);
        let target = resource.resource_id().as_str().to_string();
        builder
            .insert(resource, sample_channel(channel, &target))
            .expect("fixture entries are unique");
    }
    let registry = Arc::new(builder.build());

    let env = EnvConfig {
        callback_address: Some("https://posts.example.org/api".into()),
        ..EnvConfig::default()
    };
    let config = compose(None, env, ConfigMetadata::default())
        .expect("test configuration is valid")
        .config;

    let remote = Arc::new(FakeRemote::new());
    let refresher = Arc::new(RecordingRefresher::new());
    let dispatcher = Dispatcher::new(registry.clone(), refresher.clone())
        .with_guard(config.debounce_guard());
    let store: Arc<dyn RemoteStore> = remote.clone();
    let lifecycle = Arc::new(LifecycleController::new(registry, store));

    let state = AppState::new(Arc::new(config), dispatcher, lifecycle);
    let app = routes::create_app(state.clone());

    Harness {
        state,
        app,
        remote,
        refresher,
    }
}

#[allow(dead_code)]
pub fn notification(channel: &str, state: &str, changed: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api")
        .header("X-Goog-Channel-ID", channel)
        .header("X-Goog-Resource-State", state)
        .header("X-Goog-Changed", changed)
        .header("X-Goog-Message-Number", "1")
        .body(Body::empty())
        .unwrap()
}
