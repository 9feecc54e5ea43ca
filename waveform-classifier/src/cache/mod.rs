//! Content-addressed storage of completed runs.
mod directory;
mod fingerprint;
mod memory;

pub use directory::DirectoryCache;
pub use fingerprint::Fingerprint;
pub use memory::MemoryCache;

use crate::{error::CacheError, parameters::AnalysisParameters, results::AnalysisResults};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOutcome {
    Stored,
    /// An entry for this fingerprint already exists and was left untouched.
    AlreadyPresent,
}

/// A summary of one stored entry.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntryInfo {
    pub digest: String,
    pub created: DateTime<Utc>,
    pub file_count: usize,
    pub parameters: AnalysisParameters,
}

/// A self-contained, independently deletable cache entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct CacheEntry {
    pub(crate) fingerprint: Fingerprint,
    pub(crate) results: AnalysisResults,
}

impl CacheEntry {
    pub(crate) fn info(&self) -> CacheEntryInfo {
        let metadata = self.results.metadata();
        CacheEntryInfo {
            digest: self.fingerprint.digest.clone(),
            created: metadata.created,
            file_count: metadata.file_count,
            parameters: metadata.parameters.clone(),
        }
    }
}

/// Stores [AnalysisResults] by [Fingerprint].
///
/// Entries are immutable once written: storing under a fingerprint which is
/// already present leaves the existing entry in place.
pub trait CacheStore: Send + Sync {
    /// Returns the results stored under `fingerprint`, if any.
    /// # Error Modes
    /// - Emits [CacheError::Corrupt] if an entry exists but cannot be decoded.
    ///   Callers should treat this as a miss.
    fn lookup(&self, fingerprint: &Fingerprint) -> Result<Option<AnalysisResults>, CacheError>;

    fn store(
        &self,
        fingerprint: &Fingerprint,
        results: &AnalysisResults,
    ) -> Result<StoreOutcome, CacheError>;

    /// Every valid entry, newest first.
    fn list(&self) -> Result<Vec<CacheEntryInfo>, CacheError>;

    /// Removes every entry, returning how many there were.
    fn clear(&self) -> Result<usize, CacheError>;
}

impl<C: CacheStore + ?Sized> CacheStore for Box<C> {
    fn lookup(&self, fingerprint: &Fingerprint) -> Result<Option<AnalysisResults>, CacheError> {
        (**self).lookup(fingerprint)
    }

    fn store(
        &self,
        fingerprint: &Fingerprint,
        results: &AnalysisResults,
    ) -> Result<StoreOutcome, CacheError> {
        (**self).store(fingerprint, results)
    }

    fn list(&self) -> Result<Vec<CacheEntryInfo>, CacheError> {
        (**self).list()
    }

    fn clear(&self) -> Result<usize, CacheError> {
        (**self).clear()
    }
}

fn newest_first(entries: &mut [CacheEntryInfo]) {
    entries.sort_by(|a, b| b.created.cmp(&a.created).then_with(|| a.digest.cmp(&b.digest)));
}
