use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Raw configuration as defined in a TOML file.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct FileConfig {
    #[serde(default)]
    pub server: FileServerConfig,
    #[serde(default)]
    pub drive: FileDriveConfig,
    #[serde(default)]
    pub channels: FileChannelConfig,
    #[serde(default)]
    pub dispatch: FileDispatchConfig,
    #[serde(default)]
    pub pipeline: FilePipelineConfig,
    #[serde(default)]
    pub shutdown: FileShutdownConfig,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileServerConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileDriveConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credentials_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root_folder: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_timeout: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileChannelConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callback_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_length: Option<usize>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileDispatchConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cooldown: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_timeout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_on_startup: Option<bool>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FilePipelineConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docs_root: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html_root: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub convert: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub regenerate: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publish: Option<Vec<String>>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileShutdownConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grace: Option<String>,
}

/// Environment-derived configuration values.
#[derive(Debug, Default, Clone)]
pub struct EnvConfig {
    pub config_path: Option<PathBuf>,
    pub server_host: Option<String>,
    pub server_port: Option<u16>,
    pub drive_api_base: Option<String>,
    pub drive_credentials: Option<PathBuf>,
    pub drive_token: Option<PathBuf>,
    pub drive_root_folder: Option<String>,
    pub callback_address: Option<String>,
    pub channel_ttl: Option<String>,
    pub debounce_cooldown: Option<String>,
    pub refresh_timeout: Option<String>,
    pub refresh_on_startup: Option<bool>,
    pub docs_root: Option<PathBuf>,
    pub html_root: Option<PathBuf>,
}

impl EnvConfig {
    pub fn gather() -> Self {
        let mut env_config = Self::default();

        env_config.config_path = std::env::var("POSTWATCH_CONFIG").ok().map(PathBuf::from);
        env_config.server_host = std::env::var("SERVER_HOST").ok();
        env_config.server_port = std::env::var("SERVER_PORT")
            .ok()
            .and_then(|s| s.parse().ok());
        env_config.drive_api_base = non_empty_var("DRIVE_API_BASE");
        env_config.drive_credentials = non_empty_var("DRIVE_CREDENTIALS").map(PathBuf::from);
        env_config.drive_token = non_empty_var("DRIVE_TOKEN").map(PathBuf::from);
        env_config.drive_root_folder = non_empty_var("DRIVE_ROOT_FOLDER");
        env_config.callback_address = non_empty_var("CALLBACK_ADDRESS");
        env_config.channel_ttl = non_empty_var("CHANNEL_TTL");
        env_config.debounce_cooldown = non_empty_var("DEBOUNCE_COOLDOWN");
        env_config.refresh_timeout = non_empty_var("REFRESH_TIMEOUT");
        env_config.refresh_on_startup = parse_bool_var("REFRESH_ON_STARTUP");
        env_config.docs_root = non_empty_var("DOCS_ROOT").map(PathBuf::from);
        env_config.html_root = non_empty_var("HTML_ROOT").map(PathBuf::from);

        env_config
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|raw| raw.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_bool_var(name: &str) -> Option<bool> {
    std::env::var(name).ok().and_then(|raw| {
        match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => None,
        }
    })
}
