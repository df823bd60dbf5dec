use once_cell::sync::Lazy;
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};
use thiserror::Error;

use super::{
    models::{
        ChannelConfig, Config, ConfigMetadata, DispatchConfig, DriveConfig, PipelineConfig,
        ServerConfig, ShutdownConfig,
    },
    sources::{EnvConfig, FileConfig},
    validation::{self, ConfigGuardRailError, ConfigWarnings},
};
use crate::pipeline::CommandTemplate;

static DEFAULT_CONFIG_LOCATIONS: Lazy<Vec<PathBuf>> =
    Lazy::new(|| vec![PathBuf::from("postwatch.toml"), PathBuf::from("config/postwatch.toml")]);

pub const DEFAULT_PORT: u16 = 9000;
pub const DEFAULT_API_BASE: &str = "https://www.googleapis.com/drive/v3";
pub const DEFAULT_ROOT_FOLDER: &str = "attic-posts";

#[derive(Debug, Default, Clone)]
pub struct ConfigLoaderOptions {
    pub config_path: Option<PathBuf>,
    pub env_file: Option<PathBuf>,
}

#[derive(Debug, Default)]
pub struct ConfigLoader {
    options: ConfigLoaderOptions,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: ConfigLoaderOptions) -> Self {
        Self { options }
    }

    pub fn with_config_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.config_path = Some(path.into());
        self
    }

    pub fn with_env_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.env_file = Some(path.into());
        self
    }

    pub fn load(&self) -> Result<ConfigLoad, ConfigLoadError> {
        let env_file_loaded = match &self.options.env_file {
            Some(path) => dotenvy::from_path(path).map(|_| true).or_else(|err| match err {
                dotenvy::Error::Io(_) => Ok(false),
                _ => Err(err),
            })?,
            None => dotenvy::dotenv().map(|_| true).or_else(|err| match err {
                dotenvy::Error::Io(_) => Ok(false),
                _ => Err(err),
            })?,
        };

        let env_config = EnvConfig::gather();
        let (file_config, config_path) = self.load_file_config(&env_config)?;

        compose(
            file_config,
            env_config,
            ConfigMetadata {
                config_path,
                env_file_loaded,
            },
        )
    }

    fn load_file_config(
        &self,
        env_config: &EnvConfig,
    ) -> Result<(Option<FileConfig>, Option<PathBuf>), ConfigLoadError> {
        let mut source = ConfigPathSource::default();

        if let Some(explicit) = &self.options.config_path {
            source.explicit = Some(explicit.clone());
        } else if let Some(from_env) = &env_config.config_path {
            source.env = Some(from_env.clone());
        } else {
            source.default = DEFAULT_CONFIG_LOCATIONS
                .iter()
                .find(|candidate| candidate.exists())
                .cloned();
        }

        let Some((path, provenance)) = source.resolved_path() else {
            return Ok((None, None));
        };

        if !path.exists() {
            if provenance.is_explicit() {
                return Err(ConfigLoadError::MissingConfig { path });
            }
            return Ok((None, None));
        }

        let file_config = read_file_config(&path)?;
        Ok((Some(file_config), Some(path)))
    }
}

pub fn read_file_config(path: &Path) -> Result<FileConfig, ConfigLoadError> {
    let contents = fs::read_to_string(path).map_err(|err| ConfigLoadError::Io {
        path: path.to_path_buf(),
        source: err,
    })?;
    toml::from_str(&contents).map_err(|err| ConfigLoadError::Parse {
        path: path.to_path_buf(),
        source: err,
    })
}

/// Layer environment over file over defaults, then apply guard rails.
pub fn compose(
    file_config: Option<FileConfig>,
    env: EnvConfig,
    metadata: ConfigMetadata,
) -> Result<ConfigLoad, ConfigLoadError> {
    let mut warnings = ConfigWarnings::default();

    if file_config.is_none() {
        warnings.push_with_hint(
            "No postwatch.toml detected; falling back to environment variables",
            "Pass --config or set POSTWATCH_CONFIG to use a configuration file",
        );
    }

    let FileConfig {
        server: file_server,
        drive: file_drive,
        channels: file_channels,
        dispatch: file_dispatch,
        pipeline: file_pipeline,
        shutdown: file_shutdown,
    } = file_config.unwrap_or_default();

    let server = ServerConfig {
        host: env
            .server_host
            .or(file_server.host)
            .unwrap_or_else(|| "0.0.0.0".to_string()),
        port: env.server_port.or(file_server.port).unwrap_or(DEFAULT_PORT),
    };

    let drive = DriveConfig {
        api_base: env
            .drive_api_base
            .or(file_drive.api_base)
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string())
            .trim_end_matches('/')
            .to_string(),
        credentials_path: env
            .drive_credentials
            .or(file_drive.credentials_path)
            .unwrap_or_else(|| PathBuf::from("credentials.json")),
        token_path: env
            .drive_token
            .or(file_drive.token_path)
            .unwrap_or_else(|| PathBuf::from("token.json")),
        root_folder: env
            .drive_root_folder
            .or(file_drive.root_folder)
            .unwrap_or_else(|| DEFAULT_ROOT_FOLDER.to_string()),
        page_size: file_drive.page_size.unwrap_or(100),
        request_timeout: duration_or(
            "drive.request_timeout",
            file_drive.request_timeout,
            Duration::from_secs(30),
        )?,
    };

    let channels = ChannelConfig {
        callback_address: env
            .callback_address
            .or(file_channels.callback_address)
            .unwrap_or_default(),
        ttl: duration_or(
            "channels.ttl",
            env.channel_ttl.or(file_channels.ttl),
            Duration::from_secs(60 * 60),
        )?,
        id_length: file_channels.id_length.unwrap_or(24),
    };

    let dispatch = DispatchConfig {
        cooldown: duration_or(
            "dispatch.cooldown",
            env.debounce_cooldown.or(file_dispatch.cooldown),
            Duration::from_secs(60),
        )?,
        refresh_timeout: duration_or(
            "dispatch.refresh_timeout",
            env.refresh_timeout.or(file_dispatch.refresh_timeout),
            Duration::from_secs(10 * 60),
        )?,
        refresh_on_startup: env
            .refresh_on_startup
            .or(file_dispatch.refresh_on_startup)
            .unwrap_or(true),
    };

    let pipeline = PipelineConfig {
        docs_root: env
            .docs_root
            .or(file_pipeline.docs_root)
            .unwrap_or_else(|| PathBuf::from("./drive")),
        html_root: env
            .html_root
            .or(file_pipeline.html_root)
            .unwrap_or_else(|| PathBuf::from("./html/posts")),
        convert: command("pipeline.convert", file_pipeline.convert)?,
        thumbnail: command("pipeline.thumbnail", file_pipeline.thumbnail)?,
        regenerate: command("pipeline.regenerate", file_pipeline.regenerate)?,
        publish: command("pipeline.publish", file_pipeline.publish)?,
    };

    let shutdown = ShutdownConfig {
        grace: duration_or("shutdown.grace", file_shutdown.grace, Duration::from_secs(30))?,
    };

    let config = Config {
        server,
        drive,
        channels,
        dispatch,
        pipeline,
        shutdown,
        metadata,
    };

    warnings.extend(validation::apply_guard_rails(&config)?);

    Ok(ConfigLoad { config, warnings })
}

fn duration_or(
    key: &'static str,
    raw: Option<String>,
    default: Duration,
) -> Result<Duration, ConfigLoadError> {
    match raw {
        Some(value) => humantime::parse_duration(value.trim())
            .map_err(|source| ConfigLoadError::InvalidDuration { key, value, source }),
        None => Ok(default),
    }
}

fn command(
    key: &'static str,
    argv: Option<Vec<String>>,
) -> Result<Option<CommandTemplate>, ConfigLoadError> {
    argv.map(|argv| CommandTemplate::new(argv).ok_or(ConfigLoadError::EmptyCommand { key }))
        .transpose()
}

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("configuration file missing: {path}")]
    MissingConfig { path: PathBuf },
    #[error("failed to read configuration {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid duration '{value}' for {key}")]
    InvalidDuration {
        key: &'static str,
        value: String,
        #[source]
        source: humantime::DurationError,
    },
    #[error("{key} must name a program to run")]
    EmptyCommand { key: &'static str },
    #[error(transparent)]
    GuardRail(#[from] ConfigGuardRailError),
    #[error(transparent)]
    EnvFile(#[from] dotenvy::Error),
}

#[derive(Debug, Default)]
struct ConfigPathSource {
    explicit: Option<PathBuf>,
    env: Option<PathBuf>,
    default: Option<PathBuf>,
}

impl ConfigPathSource {
    fn resolved_path(&self) -> Option<(PathBuf, ConfigPathProvenance)> {
        if let Some(path) = &self.explicit {
            return Some((path.clone(), ConfigPathProvenance::Explicit));
        }
        if let Some(path) = &self.env {
            return Some((path.clone(), ConfigPathProvenance::Env));
        }
        if let Some(path) = &self.default {
            return Some((path.clone(), ConfigPathProvenance::Default));
        }
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConfigPathProvenance {
    Explicit,
    Env,
    Default,
}

impl ConfigPathProvenance {
    fn is_explicit(self) -> bool {
        matches!(self, ConfigPathProvenance::Explicit | ConfigPathProvenance::Env)
    }
}

#[derive(Debug)]
pub struct ConfigLoad {
    pub config: Config,
    pub warnings: ConfigWarnings,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn env_with_callback() -> EnvConfig {
        EnvConfig {
            callback_address: Some("https://posts.example.org/api".into()),
            ..EnvConfig::default()
        }
    }

    fn file_from(toml: &str) -> FileConfig {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(toml.as_bytes()).unwrap();
        read_file_config(file.path()).unwrap()
    }

    #[test]
    fn defaults_fill_every_section() {
        let load = compose(None, env_with_callback(), ConfigMetadata::default()).unwrap();
        let config = load.config;

        assert_eq!(config.server.port, DEFAULT_PORT);
        assert_eq!(config.drive.root_folder, DEFAULT_ROOT_FOLDER);
        assert_eq!(config.drive.api_base, DEFAULT_API_BASE);
        assert_eq!(config.channels.ttl, Duration::from_secs(3600));
        assert_eq!(config.channels.id_length, 24);
        assert_eq!(config.dispatch.cooldown, Duration::from_secs(60));
        assert_eq!(config.dispatch.refresh_timeout, Duration::from_secs(600));
        assert!(config.dispatch.refresh_on_startup);
        assert_eq!(config.pipeline.docs_root, PathBuf::from("./drive"));
        assert!(config.pipeline.convert.is_none());
        // missing file + no pipeline commands
        assert_eq!(load.warnings.items.len(), 2);
    }

    #[test]
    fn environment_overrides_file() {
        let file = file_from(
            r#"
            [server]
            port = 8080

            [channels]
            callback_address = "https://file.example.org/api"
            ttl = "30m"

            [dispatch]
            cooldown = "2m"

            [pipeline]
            convert = ["pandoc", "{document}", "-o", "{html_dir}/index.html"]
            "#,
        );
        let env = EnvConfig {
            server_port: Some(9100),
            debounce_cooldown: Some("90s".into()),
            ..env_with_callback()
        };

        let config = compose(Some(file), env, ConfigMetadata::default()).unwrap().config;

        assert_eq!(config.server.port, 9100);
        assert_eq!(config.channels.callback_address, "https://posts.example.org/api");
        assert_eq!(config.channels.ttl, Duration::from_secs(30 * 60));
        assert_eq!(config.dispatch.cooldown, Duration::from_secs(90));
        assert_eq!(config.pipeline.convert.as_ref().map(|c| c.program()), Some("pandoc"));
    }

    #[test]
    fn missing_callback_address_is_rejected() {
        let err = compose(None, EnvConfig::default(), ConfigMetadata::default()).unwrap_err();
        assert!(matches!(
            err,
            ConfigLoadError::GuardRail(ConfigGuardRailError::MissingCallbackAddress)
        ));
    }

    #[test]
    fn short_channel_ids_are_rejected() {
        let file = file_from("[channels]\nid_length = 6\n");
        let err =
            compose(Some(file), env_with_callback(), ConfigMetadata::default()).unwrap_err();
        assert!(matches!(
            err,
            ConfigLoadError::GuardRail(ConfigGuardRailError::ChannelIdTooShort { actual: 6, .. })
        ));
    }

    #[test]
    fn zero_cooldown_is_rejected() {
        let env = EnvConfig {
            debounce_cooldown: Some("0s".into()),
            ..env_with_callback()
        };
        let err = compose(None, env, ConfigMetadata::default()).unwrap_err();
        assert!(matches!(err, ConfigLoadError::GuardRail(ConfigGuardRailError::ZeroCooldown)));
    }

    #[test]
    fn channel_ttl_beyond_one_day_is_rejected() {
        let env = EnvConfig {
            channel_ttl: Some("280000years".into()),
            ..env_with_callback()
        };
        let err = compose(None, env, ConfigMetadata::default()).unwrap_err();
        assert!(matches!(
            err,
            ConfigLoadError::GuardRail(ConfigGuardRailError::ChannelTtlTooLong { .. })
        ));
    }

    #[test]
    fn unparseable_duration_names_the_key() {
        let env = EnvConfig {
            channel_ttl: Some("soon".into()),
            ..env_with_callback()
        };
        let err = compose(None, env, ConfigMetadata::default()).unwrap_err();
        match err {
            ConfigLoadError::InvalidDuration { key, value, .. } => {
                assert_eq!(key, "channels.ttl");
                assert_eq!(value, "soon");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn empty_command_is_rejected() {
        let file = file_from("[pipeline]\npublish = []\n");
        let err =
            compose(Some(file), env_with_callback(), ConfigMetadata::default()).unwrap_err();
        assert!(matches!(err, ConfigLoadError::EmptyCommand { key: "pipeline.publish" }));
    }

    #[test]
    fn plain_http_callback_warns() {
        let env = EnvConfig {
            callback_address: Some("http://localhost:9000/api".into()),
            ..EnvConfig::default()
        };
        let load = compose(None, env, ConfigMetadata::default()).unwrap();
        assert!(load.warnings.items.iter().any(|w| w.message.contains("plain http")));
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let loader = ConfigLoader::new()
            .with_config_path("/nonexistent/postwatch.toml")
            .with_env_file("/nonexistent/.env");
        let err = loader.load().unwrap_err();
        assert!(matches!(err, ConfigLoadError::MissingConfig { .. }));
    }
}
