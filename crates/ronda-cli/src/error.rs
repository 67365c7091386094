use std::io;

use ronda_core::config::ConfigError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] ronda_core::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("No incident payload provided")]
    EmptyPayload,
    #[error("Incident payload must be a JSON object")]
    PayloadNotObject,
    #[error("Invalid incident ID: {0}")]
    InvalidIncidentId(String),
    #[error("Incident not found: {0}")]
    IncidentNotFound(String),
    #[error("Sync is not configured. Set RONDA_REMOTE_URL (and RONDA_REMOTE_TOKEN if required).")]
    SyncNotConfigured,
}
