use thiserror::Error;

#[derive(Debug, Error)]
pub enum DropsError {
    #[error("Source unavailable: {source_name}: {message}")]
    SourceUnavailable { source_name: String, message: String },

    #[error("All drops sources failed to load")]
    AllSourcesUnavailable,

    #[error("Command {command} failed: {message}")]
    CommandFailed { command: String, message: String },

    #[error("No mine-all queue is running")]
    NoActiveQueue,

    #[error("Unknown game: {0}")]
    UnknownGame(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("JSON error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DropsError {
    pub fn command(command: &str, err: impl std::fmt::Display) -> Self {
        DropsError::CommandFailed {
            command: command.to_string(),
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, DropsError>;
