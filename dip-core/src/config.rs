//! Per-DIP settings stored at `<base>/dip-config.json`.
//!
//! The file is optional; every field falls back to its default when absent.

use crate::error::Result;
use crate::package::PackageOptions;
use crate::record::DCTERMS_FORMAT;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub const CONFIG_FILE: &str = "dip-config.json";

/// Settings for connectors and deposits made from one DIP.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DipConfig {
    /// Metadata format sent by metadata-only deposits unless overridden.
    #[serde(default = "default_metadata_format")]
    pub default_metadata_format: String,
    /// Delete package artifacts after a successful deposit.
    #[serde(default)]
    pub remove_packages: bool,
    /// HTTP timeout for repository requests, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_metadata_format() -> String {
    DCTERMS_FORMAT.to_string()
}

fn default_timeout_secs() -> u64 {
    300
}

fn default_user_agent() -> String {
    format!("dip/{}", env!("CARGO_PKG_VERSION"))
}

impl Default for DipConfig {
    fn default() -> Self {
        Self {
            default_metadata_format: default_metadata_format(),
            remove_packages: false,
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

impl DipConfig {
    /// Load the config of the DIP at `base_dir`, or defaults if there is none.
    pub fn load(base_dir: &Path) -> Result<Self> {
        let config_path = base_dir.join(CONFIG_FILE);
        if !config_path.exists() {
            return Ok(Self::default());
        }
        let data = fs::read_to_string(&config_path)?;
        let config: DipConfig = serde_json::from_str(&data)?;
        Ok(config)
    }

    pub fn save(&self, base_dir: &Path) -> Result<()> {
        let config_path = base_dir.join(CONFIG_FILE);
        let tmp_path = config_path.with_extension("tmp");
        let data = serde_json::to_string_pretty(self)?;
        fs::write(&tmp_path, &data)?;
        fs::rename(&tmp_path, &config_path)?;
        Ok(())
    }

    /// Package options implied by this config.
    pub fn package_options(&self) -> PackageOptions {
        PackageOptions {
            remove_artifact: self.remove_packages,
            ..PackageOptions::default()
        }
    }
}
