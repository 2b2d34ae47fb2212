//! Host configuration, loaded from JSON.

use std::path::Path;

use crate::error::HostError;
use crate::types::{Namespace, Version};

fn default_runtime_version() -> String {
    "0.0.0".to_string()
}

fn default_initial_batch_size() -> u32 {
    100
}

fn default_event_buffer() -> usize {
    16
}

/// Settings for a hosted runtime. Every field has a default.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HostConfig {
    /// Hex-encoded runtime namespace.
    #[serde(default)]
    pub runtime_id: Option<String>,
    /// Version the runtime reports, `major.minor.patch`.
    #[serde(default = "default_runtime_version")]
    pub runtime_version: String,
    /// Batch size hint advertised through schedule control. `0` disables the feature.
    #[serde(default = "default_initial_batch_size")]
    pub initial_batch_size: u32,
    /// Capacity of each event subscriber's queue.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
    /// Inputs longer than this are rejected by CheckTx.
    #[serde(default)]
    pub max_tx_size: Option<usize>,
}

impl Default for HostConfig {
    fn default() -> Self {
        HostConfig {
            runtime_id: None,
            runtime_version: default_runtime_version(),
            initial_batch_size: default_initial_batch_size(),
            event_buffer: default_event_buffer(),
            max_tx_size: None,
        }
    }
}

impl HostConfig {
    pub fn from_json_str(s: &str) -> Result<Self, HostError> {
        let config: HostConfig =
            serde_json::from_str(s).map_err(|e| HostError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, HostError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| HostError::Config(format!("reading {}: {}", path.display(), e)))?;
        Self::from_json_str(&contents)
    }

    pub fn validate(&self) -> Result<(), HostError> {
        if self.event_buffer == 0 {
            return Err(HostError::Config("event_buffer must be greater than zero".into()));
        }
        self.version()?;
        self.namespace()?;
        Ok(())
    }

    pub fn version(&self) -> Result<Version, HostError> {
        self.runtime_version.parse().map_err(HostError::Config)
    }

    /// Configured namespace, or the all-zero namespace when unset.
    pub fn namespace(&self) -> Result<Namespace, HostError> {
        match &self.runtime_id {
            Some(id) => Namespace::from_hex(id).map_err(HostError::Config),
            None => Ok(Namespace::default()),
        }
    }
}
