use crate::{
    classifier::{Category, WaveformResult},
    parameters::AnalysisParameters,
    thresholds::Thresholds,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sipm_common::FileIdentity;
use std::{collections::BTreeSet, fmt};
use strum::{Display, EnumIter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumIter)]
pub enum ExclusionReason {
    /// The file could not be read or parsed.
    Unreadable,
    /// The file was parsed but its contents are inconsistent or non-finite.
    Malformed,
    /// The unit of work processing the file terminated abnormally.
    WorkerFailure,
    /// The run was cancelled before the file was processed.
    NotProcessed,
}

/// A file which is in none of the category lists, and why.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exclusion {
    pub index: usize,
    pub file: FileIdentity,
    pub reason: ExclusionReason,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub parameters: AnalysisParameters,
    pub file_count: usize,
    pub created: DateTime<Utc>,
    /// Hex digest of the fingerprint this run was computed for.
    pub fingerprint: String,
    /// False if the run was cancelled before every file was processed.
    pub complete: bool,
}

/// Everything a run produces.
///
/// Each classified file appears in exactly one category list, and each
/// unclassified file in `exclusions`. Lists are ordered by position in the
/// original listing. Only the favourites may change after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResults {
    accepted: Vec<WaveformResult>,
    rejected: Vec<WaveformResult>,
    afterpulse: Vec<WaveformResult>,
    favorites: BTreeSet<String>,
    exclusions: Vec<Exclusion>,
    thresholds: Thresholds,
    metadata: RunMetadata,
}

impl AnalysisResults {
    pub fn new(
        results: impl IntoIterator<Item = WaveformResult>,
        mut exclusions: Vec<Exclusion>,
        thresholds: Thresholds,
        metadata: RunMetadata,
    ) -> Self {
        let mut accepted = Vec::new();
        let mut rejected = Vec::new();
        let mut afterpulse = Vec::new();
        for result in results {
            match result.category {
                Category::Accepted => accepted.push(result),
                Category::Rejected => rejected.push(result),
                Category::Afterpulse => afterpulse.push(result),
            }
        }
        for list in [&mut accepted, &mut rejected, &mut afterpulse] {
            list.sort_by_key(|result| result.index);
        }
        exclusions.sort_by_key(|exclusion| exclusion.index);
        Self {
            accepted,
            rejected,
            afterpulse,
            favorites: BTreeSet::new(),
            exclusions,
            thresholds,
            metadata,
        }
    }

    pub fn category(&self, category: Category) -> &[WaveformResult] {
        match category {
            Category::Accepted => &self.accepted,
            Category::Rejected => &self.rejected,
            Category::Afterpulse => &self.afterpulse,
        }
    }

    pub fn accepted(&self) -> &[WaveformResult] {
        &self.accepted
    }

    pub fn rejected(&self) -> &[WaveformResult] {
        &self.rejected
    }

    pub fn afterpulse(&self) -> &[WaveformResult] {
        &self.afterpulse
    }

    pub fn exclusions(&self) -> &[Exclusion] {
        &self.exclusions
    }

    /// The thresholds every classified file was judged against.
    ///
    /// If the run was cancelled while statistics were still being gathered,
    /// these were estimated from only the waveforms read before cancellation,
    /// and no file was classified against them.
    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    pub fn metadata(&self) -> &RunMetadata {
        &self.metadata
    }

    fn all(&self) -> impl Iterator<Item = &WaveformResult> {
        self.accepted
            .iter()
            .chain(&self.rejected)
            .chain(&self.afterpulse)
    }

    pub fn find(&self, file: &str) -> Option<&WaveformResult> {
        self.all().find(|result| result.file.name == file)
    }

    pub fn category_of(&self, file: &str) -> Option<Category> {
        self.find(file).map(|result| result.category)
    }

    /// Marks a classified file as a favourite. Returns false if no such file was classified.
    pub fn add_favorite(&mut self, file: &str) -> bool {
        if self.find(file).is_none() {
            return false;
        }
        self.favorites.insert(file.to_owned());
        true
    }

    /// Returns true if the file was a favourite.
    pub fn remove_favorite(&mut self, file: &str) -> bool {
        self.favorites.remove(file)
    }

    pub fn is_favorite(&self, file: &str) -> bool {
        self.favorites.contains(file)
    }

    /// The favourite results, in original listing order.
    pub fn favorites(&self) -> Vec<&WaveformResult> {
        let mut favorites: Vec<_> = self
            .all()
            .filter(|result| self.favorites.contains(&result.file.name))
            .collect();
        favorites.sort_by_key(|result| result.index);
        favorites
    }

    /// Rejected waveforms in which more than one peak was detected before baseline filtering.
    pub fn rejected_with_multiple_peaks(&self) -> impl Iterator<Item = &WaveformResult> {
        self.rejected
            .iter()
            .filter(|result| result.detected_peak_count > 1)
    }

    /// Surviving peaks over every accepted and afterpulse waveform.
    pub fn total_peaks(&self) -> usize {
        self.accepted
            .iter()
            .chain(&self.afterpulse)
            .map(|result| result.peaks.len())
            .sum()
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            processed: self.accepted.len() + self.rejected.len() + self.afterpulse.len(),
            excluded: self.exclusions.len(),
            accepted: self.accepted.len(),
            rejected: self.rejected.len(),
            afterpulse: self.afterpulse.len(),
            complete: self.metadata.complete,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub processed: usize,
    pub excluded: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub afterpulse: usize,
    pub complete: bool,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Processed {} files ({} excluded): {} accepted, {} rejected, {} afterpulse",
            self.processed, self.excluded, self.accepted, self.rejected, self.afterpulse
        )?;
        if !self.complete {
            write!(f, " [incomplete]")?;
        }
        Ok(())
    }
}
