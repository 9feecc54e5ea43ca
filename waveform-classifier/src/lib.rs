//! Classifies SiPM waveforms as accepted, rejected or afterpulse.
//!
//! A run reads every waveform in a source, estimates global thresholds from
//! the whole population, then classifies each waveform against them.
//! Completed runs are cached by a fingerprint of their inputs.
pub mod cache;
pub mod classifier;
pub mod error;
pub mod orchestrator;
pub mod parameters;
pub mod peak_detection;
pub mod pipeline;
pub mod results;
pub mod thresholds;

pub use cache::{CacheStore, DirectoryCache, Fingerprint, MemoryCache};
pub use classifier::{Category, Classifier, WaveformResult};
pub use error::AnalysisError;
pub use orchestrator::CancellationToken;
pub use parameters::{AnalysisParameterArgs, AnalysisParameters, ExecutionPolicy};
pub use pipeline::{AnalysisEngine, RunOutcome};
pub use results::AnalysisResults;
pub use thresholds::Thresholds;
