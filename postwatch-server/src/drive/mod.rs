//! Google Drive v3 implementation of the remote-store port.

pub mod auth;
pub mod client;
pub mod query;
pub mod wire;

pub use auth::{AccessTokenProvider, OAuthTokenSource, StaticToken};
pub use client::DriveClient;
