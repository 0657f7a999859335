//! Application configuration options

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use semver::Version;

use crate::errors::BrokerError;
use crate::logs::LogOptions;
use crate::storage::layout::StorageLayout;
use crate::storage::settings::{Settings, TfBinariesSettings};
use crate::utils::parse_version;

/// Main broker options, resolved from [`Settings`]
#[derive(Debug, Clone)]
pub struct BrokerOptions {
    /// Engine binaries and versions
    pub binaries: TfBinariesContext,

    /// Process-wide feature switches, read-only after startup
    pub flags: FeatureFlags,

    /// Interval between store polls while waiting on a job
    pub poll_interval: Duration,

    /// Storage configuration
    pub layout: StorageLayout,

    /// Logging configuration
    pub logging: LogOptions,
}

impl BrokerOptions {
    pub fn from_settings(settings: &Settings) -> Result<Self, BrokerError> {
        let layout = StorageLayout::new(settings.storage_dir.clone());

        Ok(Self {
            binaries: TfBinariesContext::from_settings(&settings.tf_binaries)?,
            flags: FeatureFlags {
                dynamic_hcl_enabled: settings.dynamic_hcl_enabled,
                tf_upgrades_enabled: settings.tf_upgrades_enabled,
            },
            poll_interval: Duration::from_secs(settings.poll_interval_secs.max(1)),
            logging: LogOptions {
                log_level: settings.log_level.clone(),
                stdout: true,
                log_dir: Some(layout.logs_dir().path().to_path_buf()),
                json_format: settings.log_json,
            },
            layout,
        })
    }
}

impl Default for BrokerOptions {
    fn default() -> Self {
        Self {
            binaries: TfBinariesContext::default(),
            flags: FeatureFlags::default(),
            poll_interval: Duration::from_secs(1),
            layout: StorageLayout::default(),
            logging: LogOptions::default(),
        }
    }
}

/// Feature switches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeatureFlags {
    /// `BROKERPAK_UPDATES_ENABLED`
    pub dynamic_hcl_enabled: bool,

    /// `TERRAFORM_UPGRADES_ENABLED`
    pub tf_upgrades_enabled: bool,
}

impl FeatureFlags {
    /// Stored HCL is rewritten when either switch is on
    pub fn hcl_updates_enabled(&self) -> bool {
        self.dynamic_hcl_enabled || self.tf_upgrades_enabled
    }
}

/// Engine binaries with parsed versions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TfBinariesContext {
    pub dir: PathBuf,
    pub default_version: Version,
    /// Strictly ascending
    pub upgrade_path: Vec<Version>,
    pub provider_replacements: BTreeMap<String, String>,
    pub params: BTreeMap<String, String>,
}

impl TfBinariesContext {
    pub fn from_settings(settings: &TfBinariesSettings) -> Result<Self, BrokerError> {
        let default_version = parse_version(&settings.default_version).map_err(|e| {
            BrokerError::Config(format!(
                "invalid default version {:?}: {}",
                settings.default_version, e
            ))
        })?;

        let upgrade_path = settings
            .upgrade_path
            .iter()
            .map(|v| {
                parse_version(v).map_err(|e| {
                    BrokerError::Config(format!("invalid upgrade path version {:?}: {}", v, e))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        if let Some(pair) = upgrade_path.windows(2).find(|pair| pair[0] >= pair[1]) {
            return Err(BrokerError::Config(format!(
                "upgrade path must be strictly ascending: {} is followed by {}",
                pair[0], pair[1]
            )));
        }

        Ok(Self {
            dir: settings.dir.clone(),
            default_version,
            upgrade_path,
            provider_replacements: settings.provider_replacements.clone(),
            params: settings.params.clone(),
        })
    }
}

impl Default for TfBinariesContext {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("/opt/tfbroker/binaries"),
            default_version: Version::new(1, 6, 0),
            upgrade_path: Vec::new(),
            provider_replacements: BTreeMap::new(),
            params: BTreeMap::new(),
        }
    }
}
