use std::path::PathBuf;
use std::time::Duration;

use postwatch_core::{CatalogOptions, ChannelOptions, DebounceGuard};

use crate::pipeline::CommandTemplate;

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub drive: DriveConfig,
    pub channels: ChannelConfig,
    pub dispatch: DispatchConfig,
    pub pipeline: PipelineConfig,
    pub shutdown: ShutdownConfig,
    pub metadata: ConfigMetadata,
}

impl Config {
    pub fn catalog_options(&self) -> CatalogOptions {
        CatalogOptions::new(&self.drive.root_folder)
    }

    pub fn channel_options(&self) -> ChannelOptions {
        let mut options = ChannelOptions::new(&self.channels.callback_address);
        options.ttl = self.channels.ttl;
        options.id_length = self.channels.id_length;
        options
    }

    pub fn debounce_guard(&self) -> DebounceGuard {
        DebounceGuard::new(self.dispatch.cooldown)
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct DriveConfig {
    pub api_base: String,
    pub credentials_path: PathBuf,
    pub token_path: PathBuf,
    /// Name of the folder holding one folder per author.
    pub root_folder: String,
    pub page_size: u32,
    pub request_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Public URL the Drive API posts notifications to.
    pub callback_address: String,
    pub ttl: Duration,
    pub id_length: usize,
}

#[derive(Debug, Clone)]
pub struct DispatchConfig {
    pub cooldown: Duration,
    pub refresh_timeout: Duration,
    pub refresh_on_startup: bool,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Downloaded documents land in `docs_root/<author>/<date>/`.
    pub docs_root: PathBuf,
    /// Converted html lands in `html_root/<author>/<date>/`.
    pub html_root: PathBuf,
    pub convert: Option<CommandTemplate>,
    pub thumbnail: Option<CommandTemplate>,
    pub regenerate: Option<CommandTemplate>,
    pub publish: Option<CommandTemplate>,
}

#[derive(Debug, Clone)]
pub struct ShutdownConfig {
    /// How long in-flight requests and refreshes may run after teardown.
    pub grace: Duration,
}

#[derive(Debug, Clone, Default)]
pub struct ConfigMetadata {
    pub config_path: Option<PathBuf>,
    pub env_file_loaded: bool,
}
