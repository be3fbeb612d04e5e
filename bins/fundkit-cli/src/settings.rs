//! Layered CLI settings: defaults, then the TOML file, then `FUNDKIT_*`
//! environment variables, then command-line flags.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use fundkit_core::{FeeRate, NetworkType};
use fundkit_esplora::EsploraConfig;
use fundkit_esplora::config::{DEFAULT_GAP_LIMIT, default_url};
use serde::Deserialize;

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "FUNDKIT";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Settings {
    pub network: String,
    /// Overrides the per-network Esplora server.
    #[serde(default)]
    pub esplora_url: Option<String>,
    pub fee_rate: u64,
    pub gap_limit: u32,
    pub request_timeout_secs: u64,
    pub log_level: String,
    pub log_format: String,
}

/// Values given on the command line; `None` leaves lower layers in place.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub network: Option<String>,
    pub esplora_url: Option<String>,
    pub log_level: Option<String>,
    pub log_format: Option<String>,
}

/// `<config_dir>/fundkit/config.toml`, when the platform has a config dir.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("fundkit").join("config.toml"))
}

impl Settings {
    /// Load from `path` (or the default location) and the process environment.
    pub fn load(path: Option<&Path>, overrides: &Overrides) -> Result<Self> {
        let path = path.map(Path::to_path_buf).or_else(default_config_path);
        Self::build(path.as_deref(), None, overrides)
    }

    /// `env` replaces the process environment when given.
    fn build(path: Option<&Path>, env: Option<HashMap<String, String>>, overrides: &Overrides) -> Result<Self> {
        let mut builder = Config::builder()
            .set_default("network", "regtest")?
            .set_default("fee_rate", FeeRate::DEFAULT.sat_per_vb() as i64)?
            .set_default("gap_limit", i64::from(DEFAULT_GAP_LIMIT))?
            .set_default("request_timeout_secs", 30i64)?
            .set_default("log_level", "info")?
            .set_default("log_format", "text")?;
        if let Some(path) = path {
            builder = builder.add_source(File::from(path.to_path_buf()).required(false));
        }
        let settings: Settings = builder
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true).source(env))
            .set_override_option("network", overrides.network.clone())?
            .set_override_option("esplora_url", overrides.esplora_url.clone())?
            .set_override_option("log_level", overrides.log_level.clone())?
            .set_override_option("log_format", overrides.log_format.clone())?
            .build()
            .context("failed to read settings")?
            .try_deserialize()
            .context("invalid settings")?;
        settings.network()?;
        settings.fee_rate()?;
        Ok(settings)
    }

    pub fn network(&self) -> Result<NetworkType> {
        self.network
            .parse()
            .with_context(|| format!("unsupported network {:?}", self.network))
    }

    pub fn fee_rate(&self) -> Result<FeeRate> {
        FeeRate::from_sat_per_vb(self.fee_rate).context("fee_rate must be at least 1 sat/vB")
    }

    /// Esplora connection for the configured network.
    pub fn esplora(&self) -> Result<EsploraConfig> {
        let network = self.network()?;
        let url = self
            .esplora_url
            .clone()
            .unwrap_or_else(|| default_url(network).to_string());
        Ok(EsploraConfig {
            timeout: Duration::from_secs(self.request_timeout_secs),
            gap_limit: self.gap_limit,
            ..EsploraConfig::for_network(network)
        }
        .with_url(url))
    }
}
