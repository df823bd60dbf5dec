//! # postwatch-server
//!
//! Webhook server that keeps a static site in step with posts written as
//! documents on Google Drive.
//!
//! ## Overview
//!
//! - **Startup**: discovers `root → author → date` posts, opens one push
//!   channel per post document and downloads every post once
//! - **Notifications**: `POST /api` acknowledges immediately and refreshes
//!   the post in the background, at most once per cooldown
//! - **Teardown**: `POST /api/stop` stops every channel and shuts the server
//!   down after in-flight refreshes finish
//! - **Health**: `GET /api/health` reports channel expiry and refresh times
//!
//! ## Architecture
//!
//! The engine lives in `postwatch-core`. This crate adds:
//! - a Drive v3 client over `reqwest` with OAuth token refresh
//! - a subprocess refresh pipeline driven by command templates
//! - axum routes, layered configuration and graceful shutdown

pub mod drive;
pub mod handlers;
pub mod infra;
pub mod pipeline;
pub mod routes;

pub use infra::app_state::AppState;
