use std::fmt;

use async_trait::async_trait;
use thiserror::Error;

use crate::model::Resource;

/// Stage of the refresh pipeline a failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefreshStep {
    Download,
    Asset,
    Prepare,
    Convert,
    Thumbnail,
    Regenerate,
    Publish,
    /// The whole pipeline exceeded its time budget.
    Timeout,
}

impl fmt::Display for RefreshStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RefreshStep::Download => "download",
            RefreshStep::Asset => "asset",
            RefreshStep::Prepare => "prepare",
            RefreshStep::Convert => "convert",
            RefreshStep::Thumbnail => "thumbnail",
            RefreshStep::Regenerate => "regenerate",
            RefreshStep::Publish => "publish",
            RefreshStep::Timeout => "timeout",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{step} step failed: {diagnostic}")]
pub struct RefreshError {
    pub step: RefreshStep,
    pub diagnostic: String,
}

impl RefreshError {
    pub fn new(step: RefreshStep, diagnostic: impl Into<String>) -> Self {
        Self {
            step,
            diagnostic: diagnostic.into(),
        }
    }
}

/// Downloads, converts and publishes one post.
///
/// Implementations are opaque to the dispatcher: each call either succeeds or
/// reports the failing step with diagnostic text.
#[async_trait]
pub trait Refresher: Send + Sync {
    async fn refresh(&self, resource: &Resource) -> Result<(), RefreshError>;
}
