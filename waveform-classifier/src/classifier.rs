use crate::{
    error::ClassificationError,
    parameters::AnalysisParameters,
    peak_detection::{PeakSet, find_peaks},
    thresholds::Thresholds,
};
use serde::{Deserialize, Serialize};
use sipm_common::{FileIdentity, Real, Waveform};
use strum::{Display, EnumIter};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display, EnumIter,
)]
pub enum Category {
    /// Exactly one pulse, inside the main zone.
    Accepted,
    /// No pulse inside the main zone.
    Rejected,
    /// A pulse inside the main zone, and at least one other.
    Afterpulse,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PeakSummary {
    /// Relative to the trigger, in seconds.
    pub time: Real,
    pub amplitude: Real,
}

/// The classification of one waveform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaveformResult {
    /// Position of the file in the original listing.
    pub index: usize,
    pub file: FileIdentity,
    pub category: Category,
    /// Peaks surviving the baseline filter.
    pub peaks: PeakSet,
    /// Peaks detected before the baseline filter, after saturated peaks were collapsed.
    pub detected_peak_count: usize,
    pub main_zone_peak_count: usize,
    /// The highest surviving peak.
    pub primary_peak: Option<PeakSummary>,
}

/// Classifies waveforms against a fixed set of thresholds.
#[derive(Debug, Clone)]
pub struct Classifier<'a> {
    parameters: &'a AnalysisParameters,
    thresholds: &'a Thresholds,
}

impl<'a> Classifier<'a> {
    pub fn new(parameters: &'a AnalysisParameters, thresholds: &'a Thresholds) -> Self {
        Self {
            parameters,
            thresholds,
        }
    }

    /// Assigns exactly one [Category] to `waveform`.
    /// # Error Modes
    /// - Emits [ClassificationError::Malformed] if the waveform is inconsistent
    ///   or contains non-finite values.
    #[tracing::instrument(skip_all, level = "trace", fields(file = %file.name, category))]
    pub fn classify(
        &self,
        index: usize,
        file: &FileIdentity,
        waveform: &Waveform,
    ) -> Result<WaveformResult, ClassificationError> {
        waveform.validate()?;

        let detected = find_peaks(waveform.samples(), &self.parameters.detection_for(waveform))
            .collapse_saturated(self.parameters.saturation_level(self.thresholds.global_max));
        let peaks = detected.filtered(|peak| !self.thresholds.baseline.contains(peak.amplitude));
        let main_zone_peak_count = peaks
            .iter()
            .filter(|peak| {
                self.thresholds
                    .main_zone
                    .contains(waveform.time_at(peak.index as Real))
            })
            .count();

        let category = match (main_zone_peak_count, peaks.len()) {
            (0, _) => Category::Rejected,
            (1, 1) => Category::Accepted,
            _ => Category::Afterpulse,
        };
        tracing::Span::current().record("category", category.to_string());

        let primary_peak = peaks.highest().map(|peak| PeakSummary {
            time: waveform.time_at(peak.index as Real),
            amplitude: peak.amplitude,
        });

        Ok(WaveformResult {
            index,
            file: file.clone(),
            category,
            detected_peak_count: detected.len(),
            main_zone_peak_count,
            primary_peak,
            peaks,
        })
    }
}
