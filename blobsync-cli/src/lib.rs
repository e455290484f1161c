//! Support code for the `blobsync` command-line client.
//!
//! The client identifies itself with a persistent id stored next to its
//! configuration, and reads optional settings from a JSON file.

use anyhow::{bail, Context, Result};
use blobsync_sync::{FileApiOptions, LockHandlerOptions, SynchronizerConfig};
use blobsync_types::{ClientId, LockClientType};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::info;

/// Settings read from the configuration file. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub file_api: FileApiOptions,
    pub lock: LockHandlerOptions,
    pub max_resource_size: Option<u64>,
    pub download_concurrency: Option<usize>,
}

impl CliConfig {
    /// Reads `path`, or returns the defaults when no file is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Builds the synchronizer configuration of a CLI client.
    pub fn into_synchronizer_config(self, client_id: ClientId) -> SynchronizerConfig {
        let defaults = SynchronizerConfig::default();
        SynchronizerConfig {
            client_type: LockClientType::Cli,
            client_id,
            max_resource_size: self.max_resource_size,
            download_concurrency: self
                .download_concurrency
                .unwrap_or(defaults.download_concurrency),
            lock: self.lock,
            file_api: self.file_api,
            ..defaults
        }
    }
}

/// Reads the client id stored at `path`, creating one on first use.
pub fn load_or_generate_client_id(path: &Path) -> Result<ClientId> {
    if path.exists() {
        let text = fs::read_to_string(path).context("Failed to read client id file")?;
        let id = text.trim();
        if !ClientId::is_valid(id) {
            bail!("Invalid client id in {}: {id:?}", path.display());
        }
        return Ok(ClientId::from(id));
    }
    let id = ClientId::new();
    info!("Generating new client id at {:?}", path);
    fs::write(path, id.as_str()).context("Failed to write client id file")?;
    Ok(id)
}
