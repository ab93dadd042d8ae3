//! # Configuration
//!
//! Optional `fraudgraph.toml` describing where the dataset lives, how the
//! loader batches it, and where the server binds. Every key has a default;
//! unknown keys are rejected.
//!
//! ```toml
//! [data]
//! dir = "data/dgraph"
//! transaction_flow = "edges_transactions_flow.csv"
//!
//! [loader]
//! batch_size = 500
//! parallel = false
//!
//! [server]
//! port = 9090
//! ```

use fraudgraph_core::{FraudGraphError, LoaderOptions};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// File read when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "fraudgraph.toml";

/// Largest configuration file accepted (1 MB).
const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024;

// =============================================================================
// APP CONFIG
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub data: DataConfig,
    pub loader: LoaderConfig,
    pub server: ServerConfig,
}

impl AppConfig {
    /// Parse a configuration document.
    pub fn from_toml(text: &str) -> Result<Self, FraudGraphError> {
        toml::from_str(text).map_err(|e| {
            FraudGraphError::DeserializationError(format!("invalid configuration: {}", e))
        })
    }

    /// Load the configuration.
    ///
    /// An explicit path must exist. Without one, [`DEFAULT_CONFIG_FILE`] is
    /// read from the working directory when present, defaults otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self, FraudGraphError> {
        let (path, required) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
        };

        if !path.exists() {
            if required {
                return Err(FraudGraphError::IoError(format!(
                    "configuration file {:?} not found",
                    path
                )));
            }
            tracing::debug!(path = %path.display(), "no configuration file, using defaults");
            return Ok(Self::default());
        }

        let metadata = std::fs::metadata(&path)
            .map_err(|e| FraudGraphError::IoError(format!("Cannot read file metadata: {}", e)))?;
        if metadata.len() > MAX_CONFIG_FILE_SIZE {
            return Err(FraudGraphError::IoError(format!(
                "configuration file size {} bytes exceeds maximum allowed {} bytes",
                metadata.len(),
                MAX_CONFIG_FILE_SIZE
            )));
        }

        let text = std::fs::read_to_string(&path)
            .map_err(|e| FraudGraphError::IoError(format!("Read config: {}", e)))?;
        let config = Self::from_toml(&text)?;
        tracing::info!(path = %path.display(), "configuration loaded");
        Ok(config)
    }
}

// =============================================================================
// SECTIONS
// =============================================================================

/// Dataset directory and one file name per source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DataConfig {
    pub dir: PathBuf,
    pub users: String,
    pub accounts: String,
    pub devices: String,
    pub ips: String,
    pub documents: String,
    pub transactions: String,
    pub user_accounts: String,
    pub user_devices: String,
    pub user_ips: String,
    pub user_documents: String,
    pub device_ips: String,
    pub transaction_flow: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("data/dgraph"),
            users: "nodes_users.csv".to_string(),
            accounts: "nodes_accounts.csv".to_string(),
            devices: "nodes_devices.csv".to_string(),
            ips: "nodes_ips.csv".to_string(),
            documents: "nodes_documents.csv".to_string(),
            transactions: "nodes_transactions.csv".to_string(),
            user_accounts: "edges_users_accounts.csv".to_string(),
            user_devices: "edges_users_devices.csv".to_string(),
            user_ips: "edges_users_ips.csv".to_string(),
            user_documents: "edges_users_documents.csv".to_string(),
            device_ips: "edges_devices_ips.csv".to_string(),
            transaction_flow: "edges_transactions_flow.csv".to_string(),
        }
    }
}

impl DataConfig {
    #[must_use]
    pub fn path(&self, file: &str) -> PathBuf {
        self.dir.join(file)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoaderConfig {
    pub batch_size: usize,
    pub commit_attempts: usize,
    pub parallel: bool,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        let options = LoaderOptions::default();
        Self {
            batch_size: options.batch_size,
            commit_attempts: options.commit_attempts,
            parallel: options.parallel,
        }
    }
}

impl From<LoaderConfig> for LoaderOptions {
    fn from(config: LoaderConfig) -> Self {
        Self {
            batch_size: config.batch_size.max(1),
            commit_attempts: config.commit_attempts.max(1),
            parallel: config.parallel,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
