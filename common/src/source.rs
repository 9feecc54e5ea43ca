//! Defines the interface through which waveforms are supplied to the classifier.
use crate::{MalformedWaveform, Waveform};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Identity of one input file, as seen by the directory listing.
///
/// Two listings of the same directory compare equal exactly when no file
/// was added, removed, resized or touched in between.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FileIdentity {
    pub name: String,
    pub size: u64,
    /// Modification time in nanoseconds since the Unix epoch, or zero if unavailable.
    pub modified_ns: u128,
}

impl FileIdentity {
    pub fn new(name: impl Into<String>, size: u64, modified_ns: u128) -> Self {
        Self {
            name: name.into(),
            size,
            modified_ns,
        }
    }
}

/// The result of listing a source.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SourceListing {
    /// Waveform files, in original listing order.
    pub waveforms: Vec<FileIdentity>,
    /// Other files which influence how waveforms are decoded, e.g. the run metadata.
    pub auxiliary: Vec<FileIdentity>,
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Cannot list {path}: {source}")]
    Listing {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid glob pattern: {0}")]
    Pattern(String),
    #[error("Cannot read {name}: {source}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Cannot parse {name}, line {line}: {message}")]
    Parse {
        name: String,
        line: usize,
        message: String,
    },
    #[error("{name}: {source}")]
    Malformed {
        name: String,
        #[source]
        source: MalformedWaveform,
    },
}

/// Supplies waveforms to the classifier.
///
/// Listing is expected to be cheap, as it happens before every cache lookup.
/// Reading is only performed when the cache misses, and may be called
/// concurrently from several worker threads.
pub trait WaveformSource: Sync {
    fn list(&self) -> Result<SourceListing, SourceError>;

    fn read(&self, file: &FileIdentity) -> Result<Waveform, SourceError>;
}
