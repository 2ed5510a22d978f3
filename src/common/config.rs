//! Configuration schema, defaults, and layered loading.
//!
//! Precedence: defaults < config file < environment < CLI
use anyhow::{ensure, Context, Result};
use directories::ProjectDirs;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Protocol version stamped on every outbound envelope.
pub const PROTOCOL_VERSION: &str = "12.33";

const DEFAULT_POLL_TIMEOUT_SECS: u64 = 2 * 60 * 60;
const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;
const MAX_POLL_TIMEOUT_SECS: u64 = 24 * 60 * 60;

pub fn config_path() -> PathBuf {
    ProjectDirs::from("", "", "batchdrop")
        .map(|p| p.config_dir().join("config.toml"))
        .unwrap_or_else(|| PathBuf::from("batchdrop.toml"))
}

fn data_dir() -> PathBuf {
    ProjectDirs::from("", "", "batchdrop")
        .map(|p| p.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("batchdrop-data"))
}

/// Remote store backend used for handoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    #[default]
    Sftp,
    Local,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Where outbound session documents are assembled.
    pub request_dir: PathBuf,
    /// Where retrieved responses land.
    pub response_dir: PathBuf,
    pub merchant_id: String,
    /// Applied to batch items that carry no report group of their own.
    pub report_group: String,
}

impl Default for SessionSettings {
    fn default() -> Self {
        let base = data_dir();
        Self {
            request_dir: base.join("requests"),
            response_dir: base.join("responses"),
            merchant_id: String::new(),
            report_group: "Default Report Group".to_string(),
        }
    }
}

/// Merchant credentials embedded in the envelope authentication block.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncryptionSettings {
    pub enabled: bool,
    /// Processor public key id used as encryption recipient.
    pub recipient_key_id: String,
    /// Passphrase unlocking the merchant secret key for responses.
    pub passphrase: String,
    pub gpg_binary: String,
    /// Optional GNUPGHOME override.
    pub gpg_home: Option<PathBuf>,
}

impl Default for EncryptionSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            recipient_key_id: String::new(),
            passphrase: String::new(),
            gpg_binary: "gpg".to_string(),
            gpg_home: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SftpSettings {
    pub host: String,
    pub port: u16,
    pub username: String,
    /// Private key for non-interactive authentication.
    pub identity_file: Option<PathBuf>,
    pub sftp_binary: String,
    pub connect_timeout_secs: u64,
}

impl Default for SftpSettings {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 22,
            username: String::new(),
            identity_file: None,
            sftp_binary: "sftp".to_string(),
            connect_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollSettings {
    pub timeout_secs: u64,
    pub interval_secs: u64,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_POLL_TIMEOUT_SECS,
            interval_secs: DEFAULT_POLL_INTERVAL_SECS,
        }
    }
}

impl PollSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    pub kind: StoreKind,
    /// Root directory used by the local store backend.
    pub local_root: PathBuf,
    /// Remove the processor's result from the store once downloaded.
    pub delete_after_retrieve: bool,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            kind: StoreKind::Sftp,
            local_root: data_dir().join("remote"),
            delete_after_retrieve: true,
        }
    }
}

/// Fully resolved application configuration after all layers merge.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub session: SessionSettings,
    pub credentials: Credentials,
    pub encryption: EncryptionSettings,
    pub store: StoreSettings,
    pub sftp: SftpSettings,
    pub poll: PollSettings,
}

impl AppConfig {
    /// Validates cross-field constraints and rejects unusable values.
    pub fn validate(&self) -> Result<()> {
        ensure!(
            !self.credentials.user.trim().is_empty(),
            "Invalid config: credentials.user must be set"
        );
        ensure!(
            !self.credentials.password.is_empty(),
            "Invalid config: credentials.password must be set"
        );
        if self.encryption.enabled {
            ensure!(
                !self.encryption.recipient_key_id.trim().is_empty(),
                "Invalid config: encryption.recipient_key_id is required when encryption is enabled"
            );
        }
        ensure!(
            self.poll.interval_secs > 0,
            "Invalid config: poll.interval_secs must be > 0"
        );
        ensure!(
            self.poll.timeout_secs <= MAX_POLL_TIMEOUT_SECS,
            "Invalid config: poll.timeout_secs must be <= {MAX_POLL_TIMEOUT_SECS}"
        );
        ensure!(
            self.poll.interval_secs <= self.poll.timeout_secs,
            "Invalid config: poll.interval_secs must be <= poll.timeout_secs"
        );
        if self.store.kind == StoreKind::Sftp {
            ensure!(
                !self.sftp.host.trim().is_empty(),
                "Invalid config: sftp.host must be set for the sftp store"
            );
            ensure!(
                !self.sftp.username.trim().is_empty(),
                "Invalid config: sftp.username must be set for the sftp store"
            );
        }
        Ok(())
    }
}

/// Runtime overrides supplied on the command line.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConfigOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store: Option<StoreKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encrypt: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

/// Loads config from defaults/file/env, then applies CLI overrides and validates.
pub fn load_config(overrides: &ConfigOverrides) -> Result<AppConfig> {
    let config = load_layers(overrides)?;
    config.validate()?;
    Ok(config)
}

/// Merges every layer without validating, for commands that run before
/// credentials are configured.
pub fn load_layers(overrides: &ConfigOverrides) -> Result<AppConfig> {
    let path = config_path();

    let config: AppConfig = Figment::new()
        .merge(Serialized::defaults(AppConfig::default()))
        .merge(Toml::file(&path))
        .merge(Env::prefixed("BATCHDROP_").split("__"))
        .extract()
        .context("Failed to load configuration")?;

    Ok(apply_overrides(config, overrides))
}

/// Applies runtime overrides to a loaded config.
pub fn apply_overrides(mut config: AppConfig, overrides: &ConfigOverrides) -> AppConfig {
    if let Some(store) = overrides.store {
        config.store.kind = store;
    }
    if let Some(encrypt) = overrides.encrypt {
        config.encryption.enabled = encrypt;
    }
    if let Some(timeout) = overrides.timeout_secs {
        config.poll.timeout_secs = timeout;
    }
    config
}
