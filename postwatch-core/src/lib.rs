//! # postwatch-core
//!
//! Subscription and notification-debounce engine for posts kept as documents
//! on a remote store.
//!
//! ## Overview
//!
//! - **Catalog**: walks `root → author → date` and finds one document (plus an
//!   optional cover image) per date folder
//! - **Channels**: opens one push-notification channel per document
//! - **Registry**: channel id → watched resource, each entry with its own lock
//! - **Dispatcher**: filters notifications, applies the per-resource cooldown
//!   and triggers the refresh pipeline
//! - **Lifecycle**: stops every open channel on teardown
//!
//! The remote store and the refresh pipeline are ports ([`RemoteStore`] and
//! [`Refresher`]); the server crate provides the Drive and subprocess
//! implementations.
//!
//! ## Feature Flags
//!
//! - `test-utils`: in-memory [`testing::FakeRemote`] and
//!   [`testing::RecordingRefresher`]

#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(missing_docs)]

pub mod bootstrap;
pub mod catalog;
pub mod channel;
pub mod debounce;
pub mod dispatcher;
pub mod error;
pub mod lifecycle;
pub mod model;
pub mod refresh;
pub mod registry;
pub mod remote;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use bootstrap::{BootstrapReport, build_registry};
pub use catalog::{Catalog, CatalogBuilder, CatalogOptions};
pub use channel::{ChannelOptions, ChannelSubscriber};
pub use debounce::DebounceGuard;
pub use dispatcher::{DispatchOutcome, Dispatcher, Notification};
pub use error::{CatalogError, RegistryError, RemoteError, SubscribeError};
pub use lifecycle::{LifecycleController, TeardownReport};
pub use model::{
    ChannelId, ChannelRecord, ChannelRequest, ChannelTransport, ItemId, RemoteItem, Resource,
    ResourceKey,
};
pub use refresh::{RefreshError, RefreshStep, Refresher};
pub use registry::{Registry, RegistryHealth, WatchedResource};
pub use remote::{ListPage, ListQuery, RemoteStore};
