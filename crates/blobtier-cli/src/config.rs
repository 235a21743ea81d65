use std::path::{Path, PathBuf};

use anyhow::Context;
use blobtier_layout::ChunkLayout;
use blobtier_remote::HttpOriginConfig;
use serde::{Deserialize, Serialize};

use crate::cli::Cli;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Process-local; contents are lost on exit.
    Memory,
    #[default]
    Sqlite,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub backend: BackendKind,
    pub db_path: PathBuf,
    pub layout: ChunkLayout,
    /// Origin consulted on local misses; none means local-only.
    pub remote: Option<HttpOriginConfig>,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Sqlite,
            db_path: PathBuf::from("blobtier.db"),
            layout: ChunkLayout::default(),
            remote: None,
        }
    }
}

impl CliConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    /// Config file (or defaults) with command-line overrides applied.
    pub fn resolve(cli: &Cli) -> anyhow::Result<Self> {
        let mut config = match &cli.config {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        if let Some(db) = &cli.db {
            config.backend = BackendKind::Sqlite;
            config.db_path = db.clone();
        }
        if let Some(url) = &cli.remote {
            let remote = config.remote.get_or_insert_with(HttpOriginConfig::default);
            remote.base_url = url.clone();
        }
        Ok(config)
    }

    pub fn to_toml(&self) -> anyhow::Result<String> {
        toml::to_string_pretty(self).context("serializing config")
    }
}
