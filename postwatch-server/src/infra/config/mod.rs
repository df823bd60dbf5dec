pub mod loader;
pub mod models;
pub mod sources;
pub mod validation;

pub use loader::{ConfigLoad, ConfigLoadError, ConfigLoader, ConfigLoaderOptions};
pub use models::{
    ChannelConfig, Config, ConfigMetadata, DispatchConfig, DriveConfig, PipelineConfig,
    ServerConfig, ShutdownConfig,
};
pub use validation::{ConfigGuardRailError, ConfigWarning, ConfigWarnings};
