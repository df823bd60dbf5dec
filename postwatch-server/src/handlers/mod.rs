//! HTTP request handlers organized by functionality

pub mod lifecycle;
pub mod notifications;

pub use lifecycle::{health, stop_channels};
pub use notifications::receive_notification;
