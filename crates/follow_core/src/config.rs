use std::{path::Path, time::Duration};

use anyhow::Context;
use ::config::{Config, Environment, File};
use serde::Deserialize;
use shared::protocol::DEFAULT_FOLLOW_ME_CHANNEL;

use crate::FollowError;

const DEFAULT_RETRY_INTERVAL_MS: u64 = 1_000;
const DEFAULT_RETRY_DEADLINE_TICKS: u32 = 30;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FollowSettings {
    pub channel_name: String,
    pub retry_interval_ms: u64,
    pub retry_deadline_ticks: u32,
}

impl Default for FollowSettings {
    fn default() -> Self {
        Self {
            channel_name: DEFAULT_FOLLOW_ME_CHANNEL.into(),
            retry_interval_ms: DEFAULT_RETRY_INTERVAL_MS,
            retry_deadline_ticks: DEFAULT_RETRY_DEADLINE_TICKS,
        }
    }
}

impl FollowSettings {
    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    pub fn validate(&self) -> Result<(), FollowError> {
        if self.channel_name.trim().is_empty() {
            return Err(FollowError::InvalidSettings(
                "channel_name must not be empty".into(),
            ));
        }
        if self.retry_interval_ms == 0 {
            return Err(FollowError::InvalidSettings(
                "retry_interval_ms must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// Loads settings from `path` (or an optional `follow.toml` in the working
/// directory) and applies `APP__*` environment overrides on top.
pub fn load_settings(path: Option<&Path>) -> anyhow::Result<FollowSettings> {
    let file_source = match path {
        Some(path) => File::from(path.to_path_buf()).required(true),
        None => File::with_name("follow").required(false),
    };

    let settings: FollowSettings = Config::builder()
        .add_source(file_source)
        .add_source(
            Environment::with_prefix("APP")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .context("failed to read follow settings")?
        .try_deserialize()
        .context("failed to parse follow settings")?;

    settings.validate()?;
    Ok(settings)
}
