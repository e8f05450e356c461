use crate::disease::Category;
use std::path::PathBuf;

/// Errors surfaced by [`crate::Classifier::classify`]. Everything else that
/// can go wrong inside the fallback chain is recovered locally.
#[derive(Debug, thiserror::Error)]
pub enum ClassifyError {
    #[error("no image provided")]
    NoImageProvided,
    #[error("could not decode image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("could not read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    #[error("image {id} not found in {category}")]
    NotFound { id: String, category: Category },
    #[error("{filename} is not a supported image")]
    InvalidImage { filename: String },
    #[error("could not store image bytes: {0}")]
    Blob(#[from] std::io::Error),
    #[error("could not read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("folder import failed: {0}")]
    Import(String),
}

/// Failure reading or writing the durable key/value slot. The dataset store
/// logs these and carries on with its in-memory state.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("storage read failed for {key}: {source}")]
    Read {
        key: String,
        #[source]
        source: std::io::Error,
    },
    #[error("storage write failed for {key}: {source}")]
    Write {
        key: String,
        #[source]
        source: std::io::Error,
    },
    #[error("stored dataset is malformed: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}
