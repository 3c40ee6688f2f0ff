use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

use crate::types::TradingPair;

/// What the syncer keeps at the target location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RetentionPolicy {
    /// Overwrite `<PAIR>/latest.json` every run
    #[default]
    Latest,
    /// One object per capture, `<PAIR>/<date>/<time>.json`
    History,
    /// Top-of-book rows appended to `<PAIR>/orderbook_snapshots.csv`
    Csv,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Drive,
    Local,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub pair: TradingPair,
    #[serde(default = "default_depth")]
    pub depth: usize,
    #[serde(default = "default_exchange_url")]
    pub exchange_url: String,

    // Target location; GDRIVE_FOLDER_ID is accepted for older deployments
    pub folder_id: Option<String>,
    pub gdrive_folder_id: Option<String>,
    #[serde(default)]
    pub retention: RetentionPolicy,
    #[serde(default)]
    pub storage_backend: StorageBackend,
    #[serde(default = "default_drive_api_url")]
    pub drive_api_url: String,

    // Credential material, first one set wins
    pub credential_path: Option<PathBuf>,
    pub gdrive_sa_json: Option<String>,
    pub gdrive_access_token: Option<String>,

    #[serde(default = "default_http_timeout_sec")]
    pub http_timeout_sec: u64,
    #[serde(default = "default_run_timeout_sec")]
    pub run_timeout_sec: u64,
}

fn default_depth() -> usize {
    10
}
fn default_exchange_url() -> String {
    "https://api.kraken.com".into()
}
fn default_drive_api_url() -> String {
    "https://www.googleapis.com".into()
}
fn default_http_timeout_sec() -> u64 {
    15
}
fn default_run_timeout_sec() -> u64 {
    240
}

impl Settings {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_environment(config::Environment::default())
    }

    fn from_environment(env: config::Environment) -> anyhow::Result<Self> {
        let c = config::Config::builder()
            .add_source(env.ignore_empty(true))
            .build()
            .context("read environment")?;
        let s: Settings = c.try_deserialize().context("parse settings from environment")?;
        s.validate()?;
        Ok(s)
    }

    fn validate(&self) -> anyhow::Result<()> {
        self.folder_id()?;
        anyhow::ensure!(self.depth > 0, "DEPTH must be at least 1");
        anyhow::ensure!(self.http_timeout_sec > 0, "HTTP_TIMEOUT_SEC must be at least 1");
        anyhow::ensure!(self.run_timeout_sec > 0, "RUN_TIMEOUT_SEC must be at least 1");
        Ok(())
    }

    /// Folder id (drive) or root directory (local) snapshots are written under.
    pub fn folder_id(&self) -> anyhow::Result<&str> {
        non_blank(&self.folder_id)
            .or_else(|| non_blank(&self.gdrive_folder_id))
            .context("FOLDER_ID (or GDRIVE_FOLDER_ID) must be set")
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_sec)
    }

    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.run_timeout_sec)
    }
}

fn non_blank(v: &Option<String>) -> Option<&str> {
    v.as_deref().map(str::trim).filter(|s| !s.is_empty())
}
