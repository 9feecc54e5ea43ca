use sipm_common::{MalformedWaveform, Real, SourceError};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigurationError {
    #[error("{name} must lie strictly between 0 and 100, got {value}")]
    PercentageOutOfRange { name: &'static str, value: Real },
    #[error("{name} must be a finite time greater than zero, got {value}")]
    InvalidTime { name: &'static str, value: Real },
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum EstimationError {
    #[error("No valid waveform reached threshold estimation")]
    EmptyRun,
    #[error("Cannot estimate the {0} band from an empty distribution")]
    EmptyInput(&'static str),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ClassificationError {
    #[error(transparent)]
    Malformed(#[from] MalformedWaveform),
}

/// A unit of parallel work terminated abnormally.
#[derive(Debug, Error, Clone, PartialEq)]
#[error("Worker terminated abnormally: {message}")]
pub struct WorkerFailure {
    pub message: String,
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Cannot serialise cache entry: {0}")]
    Serialisation(#[from] serde_json::Error),
    #[error("Cache entry {0} is not valid")]
    Corrupt(String),
    #[error("Cache entry {0} was written for different inputs")]
    Collision(String),
}

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Invalid analysis parameters: {0}")]
    Configuration(#[from] ConfigurationError),
    #[error("Source error: {0}")]
    Source(#[from] SourceError),
    #[error("Threshold estimation failed: {0}")]
    Estimation(#[from] EstimationError),
    #[error("Run cancelled before thresholds could be estimated")]
    Cancelled,
    #[error("Cannot build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}
