//! Front-end configuration, read from a RON file.
//!
//! The file is `./adgen.ron` unless `ADGEN_CONFIG` names another path. A
//! missing file means every field takes its default.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use adgen_core::{StateSettings, DEFAULT_FREE_ITEMS_PER_JOB, DEFAULT_TRANSIENT_RETRY_BUDGET};
use adgen_engine::{ClientSettings, DEFAULT_BASE_URL};
use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};

pub const CONFIG_ENV_VAR: &str = "ADGEN_CONFIG";
const DEFAULT_CONFIG_FILE: &str = "adgen.ron";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub base_url: String,
    pub poll_interval_ms: u64,
    pub transient_retry_budget: u32,
    pub export_dir: PathBuf,
    pub log_to_file: bool,
    pub free_items_per_job: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            poll_interval_ms: 2500,
            transient_retry_budget: DEFAULT_TRANSIENT_RETRY_BUDGET,
            export_dir: PathBuf::from("exports"),
            log_to_file: true,
            free_items_per_job: DEFAULT_FREE_ITEMS_PER_JOB,
        }
    }
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var_os(CONFIG_ENV_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::default());
            }
            Err(err) => {
                return Err(err).with_context(|| format!("reading config {}", path.display()));
            }
        };
        let config: AppConfig = ron::from_str(&content)
            .with_context(|| format!("parsing config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        let url = url::Url::parse(&self.base_url)
            .with_context(|| format!("base_url `{}` is not a URL", self.base_url))?;
        if !matches!(url.scheme(), "http" | "https") {
            bail!("base_url must use http or https, got `{}`", url.scheme());
        }
        if self.poll_interval_ms == 0 {
            bail!("poll_interval_ms must be positive");
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn client_settings(&self) -> ClientSettings {
        ClientSettings {
            poll_interval: self.poll_interval(),
            transient_retry_budget: self.transient_retry_budget,
            ..ClientSettings::with_base_url(self.base_url.trim_end_matches('/'))
        }
    }

    pub fn state_settings(&self) -> StateSettings {
        StateSettings {
            free_items_per_job: self.free_items_per_job,
            transient_retry_budget: self.transient_retry_budget,
        }
    }
}
