use std::time::Duration;

use postwatch_core::channel::MIN_CHANNEL_ID_LEN;
use thiserror::Error;
use url::Url;

use super::models::Config;

/// Longest lifetime the Drive API grants a file watch channel.
const MAX_CHANNEL_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Error)]
pub enum ConfigGuardRailError {
    #[error("channels.callback_address is required")]
    MissingCallbackAddress,
    #[error("channels.callback_address '{address}' is not a valid http(s) URL")]
    InvalidCallbackAddress { address: String },
    #[error("channels.id_length must be at least {min}, got {actual}")]
    ChannelIdTooShort { min: usize, actual: usize },
    #[error("dispatch.cooldown must be greater than zero")]
    ZeroCooldown,
    #[error("drive.page_size must be between 1 and 1000, got {0}")]
    InvalidPageSize(u32),
    #[error("channels.ttl of {ttl} exceeds the one day maximum")]
    ChannelTtlTooLong { ttl: String },
}

#[derive(Debug, Clone)]
pub struct ConfigWarning {
    pub message: String,
    pub hint: Option<String>,
}

#[derive(Debug, Default, Clone)]
pub struct ConfigWarnings {
    pub items: Vec<ConfigWarning>,
}

impl ConfigWarnings {
    pub fn push<S: Into<String>>(&mut self, message: S) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: None,
        });
    }

    pub fn push_with_hint<S: Into<String>, H: Into<String>>(&mut self, message: S, hint: H) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: Some(hint.into()),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn extend(&mut self, other: ConfigWarnings) {
        self.items.extend(other.items);
    }
}

pub fn apply_guard_rails(config: &Config) -> Result<ConfigWarnings, ConfigGuardRailError> {
    let mut warnings = ConfigWarnings::default();

    let address = config.channels.callback_address.trim();
    if address.is_empty() {
        return Err(ConfigGuardRailError::MissingCallbackAddress);
    }
    match Url::parse(address) {
        Ok(url) if url.scheme() == "https" => {}
        Ok(url) if url.scheme() == "http" => warnings.push_with_hint(
            "callback address uses plain http",
            "Drive only delivers notifications to https endpoints with a valid certificate",
        ),
        _ => {
            return Err(ConfigGuardRailError::InvalidCallbackAddress {
                address: address.to_string(),
            });
        }
    }

    if config.channels.id_length < MIN_CHANNEL_ID_LEN {
        return Err(ConfigGuardRailError::ChannelIdTooShort {
            min: MIN_CHANNEL_ID_LEN,
            actual: config.channels.id_length,
        });
    }

    if config.dispatch.cooldown.is_zero() {
        return Err(ConfigGuardRailError::ZeroCooldown);
    }

    if !(1..=1000).contains(&config.drive.page_size) {
        return Err(ConfigGuardRailError::InvalidPageSize(config.drive.page_size));
    }

    if config.channels.ttl > MAX_CHANNEL_TTL {
        return Err(ConfigGuardRailError::ChannelTtlTooLong {
            ttl: humantime::format_duration(config.channels.ttl).to_string(),
        });
    }

    let pipeline = &config.pipeline;
    if pipeline.convert.is_none()
        && pipeline.thumbnail.is_none()
        && pipeline.regenerate.is_none()
        && pipeline.publish.is_none()
    {
        warnings.push_with_hint(
            "no pipeline commands configured; updates will only be downloaded",
            "set pipeline.convert / thumbnail / regenerate / publish",
        );
    }

    Ok(warnings)
}
