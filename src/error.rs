use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CrnError {
    #[error("Snapshot {path} could not be opened, please check this path: {source}")]
    SnapshotNotFound {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Snapshot {path} could not be read, please check its keys: {reason}")]
    MalformedSnapshot { path: PathBuf, reason: String },

    #[error("Snapshot {path} holds tensors incompatible with the model: {}", .errors.join("; "))]
    IncompatibleTensors { path: PathBuf, errors: Vec<String> },

    #[error("Snapshot {path} could not be written: {reason}")]
    SnapshotWrite { path: PathBuf, reason: String },

    #[error("Invalid model configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, CrnError>;
