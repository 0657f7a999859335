//! Settings file management

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::BrokerError;
use crate::filesys::file::File;
use crate::logs::LogLevel;
use crate::utils::parse_bool;

/// Enables rewriting stored HCL from the current service definition
pub const ENV_BROKERPAK_UPDATES_ENABLED: &str = "BROKERPAK_UPDATES_ENABLED";

/// Enables the legacy upgrade path before update, deprovision and unbind
pub const ENV_TERRAFORM_UPGRADES_ENABLED: &str = "TERRAFORM_UPGRADES_ENABLED";

/// Broker settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Emit JSON log records on stdout
    #[serde(default)]
    pub log_json: bool,

    /// IaC engine binaries
    #[serde(default)]
    pub tf_binaries: TfBinariesSettings,

    /// Rewrite stored HCL on update, unbind, deprovision and upgrade
    #[serde(default)]
    pub dynamic_hcl_enabled: bool,

    /// Run the version ladder before update, deprovision and unbind
    #[serde(default)]
    pub tf_upgrades_enabled: bool,

    /// Interval between state store polls while waiting on a job
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Root of the file store and logs
    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,
}

fn default_poll_interval() -> u64 {
    1
}

fn default_storage_dir() -> PathBuf {
    PathBuf::from("/var/lib/tfbroker")
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            log_json: false,
            tf_binaries: TfBinariesSettings::default(),
            dynamic_hcl_enabled: false,
            tf_upgrades_enabled: false,
            poll_interval_secs: default_poll_interval(),
            storage_dir: default_storage_dir(),
        }
    }
}

/// Where the engine binaries live and which versions to run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TfBinariesSettings {
    /// Directory holding `versions/<version>/tofu` and provider plugins
    #[serde(default = "default_binaries_dir")]
    pub dir: PathBuf,

    /// Version used for new deployments
    #[serde(default = "default_version")]
    pub default_version: String,

    /// Versions applied in order when upgrading old state
    #[serde(default)]
    pub upgrade_path: Vec<String>,

    /// Provider address rewrites applied to existing state
    #[serde(default)]
    pub provider_replacements: BTreeMap<String, String>,

    /// Extra environment passed to every engine run
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

fn default_binaries_dir() -> PathBuf {
    PathBuf::from("/opt/tfbroker/binaries")
}

fn default_version() -> String {
    "1.6.0".to_string()
}

impl Default for TfBinariesSettings {
    fn default() -> Self {
        Self {
            dir: default_binaries_dir(),
            default_version: default_version(),
            upgrade_path: Vec::new(),
            provider_replacements: BTreeMap::new(),
            params: BTreeMap::new(),
        }
    }
}

impl Settings {
    /// Read settings from `file`, falling back to defaults when it does not exist
    pub async fn load(file: &File) -> Result<Self, BrokerError> {
        if !file.exists().await {
            debug!("settings file {} not found, using defaults", file.path().display());
            return Ok(Self::default());
        }
        file.read_json().await
    }

    /// Apply overrides from the process environment
    pub fn apply_env_overrides(&mut self) -> Result<(), BrokerError> {
        self.apply_env_overrides_with(|key| std::env::var(key).ok())
    }

    /// Apply overrides using `lookup` to read variables
    pub fn apply_env_overrides_with<F>(&mut self, lookup: F) -> Result<(), BrokerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(enabled) = env_bool(&lookup, ENV_BROKERPAK_UPDATES_ENABLED)? {
            self.dynamic_hcl_enabled = enabled;
        }
        if let Some(enabled) = env_bool(&lookup, ENV_TERRAFORM_UPGRADES_ENABLED)? {
            self.tf_upgrades_enabled = enabled;
        }

        let csb = lookup(crate::logs::ENV_CSB_LOG_LEVEL);
        let gsb = lookup(crate::logs::ENV_GSB_DEBUG);
        self.log_level = LogLevel::resolve(csb.as_deref(), gsb.as_deref(), self.log_level.clone());
        Ok(())
    }
}

fn env_bool<F>(lookup: &F, key: &str) -> Result<Option<bool>, BrokerError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(value) if value.trim().is_empty() => Ok(None),
        Some(value) => parse_bool(&value).map(Some).ok_or_else(|| {
            BrokerError::Config(format!("{} must be a boolean, got {:?}", key, value))
        }),
    }
}
