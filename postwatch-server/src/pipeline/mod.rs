//! Subprocess refresh pipeline: download, convert, thumbnail, regenerate,
//! publish.

mod refresher;
mod template;

pub use refresher::{PipelineRefresher, PostPaths};
pub use template::{CommandTemplate, Placeholders};
