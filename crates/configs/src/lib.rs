//! # configs
//!
//! Layered settings: built-in defaults, then an optional `tipline.toml`, then
//! `TIPLINE_`-prefixed environment variables (`__` separates sections, e.g.
//! `TIPLINE_SECURITY__ENCRYPTION_KEY`). A `.env` file is loaded first if
//! present.

use config::{Config, Environment, File, FileFormat};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;
use zeroize::Zeroizing;

pub const ENCRYPTION_KEY_LEN: usize = 32;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("encryption key must be {hex_len} hex characters or {len} raw bytes, got {actual} characters", hex_len = ENCRYPTION_KEY_LEN * 2, len = ENCRYPTION_KEY_LEN)]
    EncryptionKey { actual: usize },

    #[error("failed to generate an encryption key: {0}")]
    Entropy(String),
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub tips: TipSettings,
    pub security: SecuritySettings,
    pub storage: StorageSettings,
    pub moderation: ModerationSettings,
    pub sweeps: SweepSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Deserialize)]
pub struct ServerSettings {
    pub bind_addr: String,
    /// Honour `X-Forwarded-For` / `X-Real-IP`. Only safe behind a proxy
    /// that overwrites them.
    pub trust_forwarded_headers: bool,
}

#[derive(Debug, Deserialize)]
pub struct TipSettings {
    pub max_length: usize,
    pub per_hour: u32,
    pub recent_capacity: usize,
    pub listing_limit: usize,
    pub pending_batch: usize,
}

#[derive(Debug, Deserialize)]
pub struct SecuritySettings {
    #[serde(default)]
    pub encryption_key: Option<SecretString>,
    #[serde(default)]
    pub admin_password_hash: Option<SecretString>,
    pub retain_submitter_address: bool,
}

#[derive(Debug, Deserialize)]
pub struct StorageSettings {
    /// e.g. `sqlite://tipline.db`. Unset runs memory-only.
    #[serde(default)]
    pub database_url: Option<String>,
    pub write_timeout_ms: u64,
}

#[derive(Debug, Deserialize)]
pub struct ModerationSettings {
    pub timeout_ms: u64,
}

#[derive(Debug, Deserialize)]
pub struct SweepSettings {
    pub rate_limit_secs: u64,
    pub ban_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
}

#[derive(Debug, Deserialize)]
pub struct LoggingSettings {
    pub format: LogFormat,
    /// `EnvFilter` directives; `RUST_LOG` wins when set
    pub filter: String,
}

impl Settings {
    /// Loads `.env`, `tipline.toml` and the environment, in that order.
    pub fn load() -> Result<Self, ConfigError> {
        // A missing .env is normal outside development.
        let _ = dotenvy::dotenv();

        let config = defaults()?
            .add_source(File::with_name("tipline").required(false))
            .add_source(
                Environment::with_prefix("TIPLINE")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        Self::finish(config)
    }

    /// Defaults overlaid with a TOML document, without touching the
    /// environment.
    pub fn from_toml_str(toml: &str) -> Result<Self, ConfigError> {
        let config = defaults()?
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?;
        Self::finish(config)
    }

    fn finish(config: Config) -> Result<Self, ConfigError> {
        let settings: Settings = config.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("tips.max_length", self.tips.max_length as u64),
            ("tips.per_hour", self.tips.per_hour as u64),
            ("tips.recent_capacity", self.tips.recent_capacity as u64),
            ("tips.listing_limit", self.tips.listing_limit as u64),
            ("tips.pending_batch", self.tips.pending_batch as u64),
            ("storage.write_timeout_ms", self.storage.write_timeout_ms),
            ("moderation.timeout_ms", self.moderation.timeout_ms),
            ("sweeps.rate_limit_secs", self.sweeps.rate_limit_secs),
            ("sweeps.ban_secs", self.sweeps.ban_secs),
        ];
        if let Some((key, _)) = positive.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::Invalid(format!("{key} must be greater than zero")));
        }
        Ok(())
    }

    /// Key bytes for the identity cipher. Generates an ephemeral key when none
    /// is configured, which makes every stored identity unreadable after a
    /// restart.
    pub fn encryption_key(&self) -> Result<Zeroizing<Vec<u8>>, ConfigError> {
        resolve_encryption_key(self.security.encryption_key.as_ref())
    }
}

impl StorageSettings {
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

impl ModerationSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl SweepSettings {
    pub fn rate_limit_interval(&self) -> Duration {
        Duration::from_secs(self.rate_limit_secs)
    }

    pub fn ban_interval(&self) -> Duration {
        Duration::from_secs(self.ban_secs)
    }
}

fn defaults() -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
    Ok(Config::builder()
        .set_default("server.bind_addr", "0.0.0.0:8080")?
        .set_default("server.trust_forwarded_headers", false)?
        .set_default("tips.max_length", 1000)?
        .set_default("tips.per_hour", 10)?
        .set_default("tips.recent_capacity", 100)?
        .set_default("tips.listing_limit", 20)?
        .set_default("tips.pending_batch", 3)?
        .set_default("security.retain_submitter_address", false)?
        .set_default("storage.write_timeout_ms", 3000)?
        .set_default("moderation.timeout_ms", 5000)?
        .set_default("sweeps.rate_limit_secs", 300)?
        .set_default("sweeps.ban_secs", 600)?
        .set_default("logging.format", "json")?
        .set_default("logging.filter", "info,tower_http=info")?)
}

/// Accepts 64 hex characters or exactly 32 raw bytes. Anything else is an
/// error rather than a silently derived key.
pub fn resolve_encryption_key(
    raw: Option<&SecretString>,
) -> Result<Zeroizing<Vec<u8>>, ConfigError> {
    let raw = raw.map(|s| s.expose_secret()).filter(|s| !s.is_empty());

    let Some(raw) = raw else {
        warn!(
            "no encryption key configured, generating an ephemeral one; \
             identities issued now cannot be revealed after a restart"
        );
        let mut key = Zeroizing::new(vec![0u8; ENCRYPTION_KEY_LEN]);
        getrandom::getrandom(key.as_mut_slice()).map_err(|e| ConfigError::Entropy(e.to_string()))?;
        return Ok(key);
    };

    if raw.len() == ENCRYPTION_KEY_LEN * 2 {
        if let Ok(decoded) = hex::decode(raw) {
            return Ok(Zeroizing::new(decoded));
        }
    }
    if raw.len() == ENCRYPTION_KEY_LEN {
        return Ok(Zeroizing::new(raw.as_bytes().to_vec()));
    }

    Err(ConfigError::EncryptionKey { actual: raw.len() })
}
