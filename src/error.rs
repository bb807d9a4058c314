use std::path::PathBuf;

/// Everything that can stop an evaluation run.
#[derive(Debug, thiserror::Error)]
pub enum EvalError {
    #[error("Unable to read config file {0}: {1}")]
    ConfigLoad(PathBuf, #[source] std::io::Error),
    #[error("Malformed config file {0}: {1}")]
    ConfigParse(PathBuf, #[source] serde_yaml::Error),
    #[error("Missing config key {0}")]
    MissingConfigKey(String),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("{0}")]
    Checkpoint(String),
    #[error("Unknown dataset {0}: no {1} key in the config")]
    UnknownDataset(String, String),
    #[error("Dataset {0}: {1}")]
    Dataset(String, String),
    #[error("{0}")]
    Invariant(String),
    #[error("Unable to read image {0}: {1}")]
    Image(PathBuf, #[source] image::ImageError),
    #[error("Unable to write image {0}: {1}")]
    ImageWrite(PathBuf, #[source] image::ImageError),
    #[error("Unable to parse clicks in {0}: {1}")]
    Clicks(PathBuf, #[source] serde_json::Error),
    #[error("Model error: {0}")]
    Model(#[from] anyhow::Error),
    #[error("Device error: {0}")]
    Device(#[from] candle_core::Error),
    #[error("Pickle error: {0}")]
    Pickle(#[from] serde_pickle::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = EvalError> = std::result::Result<T, E>;
