//! Global decision thresholds, estimated once per run from every waveform.
use crate::{
    error::EstimationError,
    parameters::{AnalysisParameters, BaselinePolicy},
    peak_detection::find_peaks,
};
use serde::{Deserialize, Serialize};
use sipm_common::{Real, Waveform};
use std::fmt;

/// The `q`th percentile of `sorted`, interpolating linearly between the closest ranks.
///
/// Returns `None` if `sorted` is empty. `q` is clamped to `[0, 100]`.
pub fn percentile(sorted: &[Real], q: Real) -> Option<Real> {
    let last = sorted.len().checked_sub(1)?;
    let position = q.clamp(0.0, 100.0) / 100.0 * last as Real;
    let below = position.floor() as usize;
    let above = position.ceil() as usize;
    let low = *sorted.get(below)?;
    let high = *sorted.get(above)?;
    Some(low + (high - low) * (position - below as Real))
}

/// An inclusive interval. A band whose bounds are equal contains exactly one value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Band {
    pub low: Real,
    pub high: Real,
}

impl Band {
    /// The symmetric central interval holding `pct` percent of `values`.
    pub fn central(values: &[Real], pct: Real) -> Option<Self> {
        let mut sorted = values.to_vec();
        sorted.sort_by(Real::total_cmp);
        let tail = (100.0 - pct) / 2.0;
        let low = percentile(&sorted, tail)?;
        let high = percentile(&sorted, 100.0 - tail)?;
        Some(Self {
            low,
            high: high.max(low),
        })
    }

    pub fn contains(&self, value: Real) -> bool {
        self.low <= value && value <= self.high
    }
}

impl fmt::Display for Band {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:.6e}, {:.6e}]", self.low, self.high)
    }
}

/// What phase 1 extracts from a single waveform.
#[derive(Debug, Clone, PartialEq)]
pub struct WaveformStatistics {
    /// Samples contributing to the baseline distribution.
    pub baseline_samples: Vec<Real>,
    /// Time of the largest sample, relative to the trigger.
    pub max_time: Real,
    /// Times of every detected peak except the highest.
    pub secondary_times: Vec<Real>,
    pub min_amplitude: Real,
    pub max_amplitude: Real,
}

impl WaveformStatistics {
    /// Runs an unfiltered detection pass over `waveform`.
    ///
    /// The waveform must already have been validated, so that it is non-empty
    /// and contains only finite samples.
    pub fn collect(waveform: &Waveform, parameters: &AnalysisParameters) -> Self {
        let samples = waveform.samples();
        let (max_index, max_amplitude) = samples.iter().copied().enumerate().fold(
            (0, Real::NEG_INFINITY),
            |(best_index, best), (index, x)| {
                if x > best { (index, x) } else { (best_index, best) }
            },
        );
        let min_amplitude = samples.iter().copied().fold(Real::INFINITY, Real::min);

        let peaks = find_peaks(samples, &parameters.detection_for(waveform));
        let highest = peaks.highest().map(|peak| peak.index);
        let secondary_times = peaks
            .iter()
            .filter(|peak| Some(peak.index) != highest)
            .map(|peak| waveform.time_at(peak.index as Real))
            .collect();

        let baseline_samples = match parameters.baseline_policy() {
            BaselinePolicy::AllSamples => samples.to_vec(),
            BaselinePolicy::ExcludePeakRegions => samples
                .iter()
                .enumerate()
                .filter(|&(index, _)| {
                    let position = index as Real;
                    !peaks
                        .iter()
                        .any(|peak| peak.left <= position && position <= peak.right)
                })
                .map(|(_, &x)| x)
                .collect(),
        };

        Self {
            baseline_samples,
            max_time: waveform.time_at(max_index as Real),
            secondary_times,
            min_amplitude,
            max_amplitude,
        }
    }
}

/// The merged phase 1 statistics of every valid waveform in a run, in file order.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateStatistics {
    pub amplitudes: Vec<Real>,
    pub max_times: Vec<Real>,
    pub secondary_times: Vec<Real>,
    pub global_min: Real,
    pub global_max: Real,
    pub waveform_count: usize,
}

impl Default for AggregateStatistics {
    fn default() -> Self {
        Self {
            amplitudes: Vec::new(),
            max_times: Vec::new(),
            secondary_times: Vec::new(),
            global_min: Real::INFINITY,
            global_max: Real::NEG_INFINITY,
            waveform_count: 0,
        }
    }
}

impl AggregateStatistics {
    pub fn push(&mut self, statistics: WaveformStatistics) {
        self.amplitudes.extend(statistics.baseline_samples);
        self.max_times.push(statistics.max_time);
        self.secondary_times.extend(statistics.secondary_times);
        self.global_min = self.global_min.min(statistics.min_amplitude);
        self.global_max = self.global_max.max(statistics.max_amplitude);
        self.waveform_count += 1;
    }
}

impl FromIterator<WaveformStatistics> for AggregateStatistics {
    fn from_iter<I: IntoIterator<Item = WaveformStatistics>>(iter: I) -> Self {
        let mut aggregate = Self::default();
        for statistics in iter {
            aggregate.push(statistics);
        }
        aggregate
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    /// Amplitudes inside this band are noise.
    pub baseline: Band,
    /// The times at which the primary pulse is expected.
    pub main_zone: Band,
    /// The times at which secondary pulses were seen, if any were.
    pub afterpulse: Option<Band>,
    /// The largest amplitude seen in the run, from which the saturation level is derived.
    pub global_max: Real,
}

impl Thresholds {
    /// Estimates the global thresholds from the aggregate of every waveform.
    /// # Error Modes
    /// - Emits [EstimationError::EmptyRun] if there are no waveforms.
    /// - Emits [EstimationError::EmptyInput] if a band's distribution is empty.
    #[tracing::instrument(skip_all, fields(num_waveforms = statistics.waveform_count))]
    pub fn estimate(
        statistics: &AggregateStatistics,
        parameters: &AnalysisParameters,
    ) -> Result<Self, EstimationError> {
        if statistics.waveform_count == 0 {
            return Err(EstimationError::EmptyRun);
        }
        let baseline = Band::central(&statistics.amplitudes, parameters.baseline_pct())
            .ok_or(EstimationError::EmptyInput("baseline"))?;
        let main_zone = Band::central(&statistics.max_times, parameters.main_zone_pct())
            .ok_or(EstimationError::EmptyInput("main zone"))?;
        let afterpulse = Band::central(&statistics.secondary_times, parameters.afterpulse_pct());

        tracing::info!(%baseline, %main_zone, afterpulse = ?afterpulse, "Thresholds estimated");
        Ok(Self {
            baseline,
            main_zone,
            afterpulse,
            global_max: statistics.global_max,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameters::AnalysisParameterArgs;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn percentile_interpolates() {
        let sorted = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_approx_eq!(percentile(&sorted, 0.0).expect("value"), 1.0);
        assert_approx_eq!(percentile(&sorted, 50.0).expect("value"), 3.0);
        assert_approx_eq!(percentile(&sorted, 100.0).expect("value"), 5.0);
        assert_approx_eq!(percentile(&sorted, 12.5).expect("value"), 1.5);
        assert_eq!(percentile(&[], 50.0), None);
        assert_eq!(percentile(&[7.0], 30.0), Some(7.0));
    }

    #[test]
    fn central_band_is_symmetric() {
        let values: Vec<Real> = (0..=100).map(Real::from).collect();
        let band = Band::central(&values, 80.0).expect("band");
        assert_approx_eq!(band.low, 10.0);
        assert_approx_eq!(band.high, 90.0);
    }

    #[test]
    fn central_band_ignores_order() {
        let band = Band::central(&[5.0, 1.0, 3.0, 2.0, 4.0], 50.0).expect("band");
        assert_approx_eq!(band.low, 2.0);
        assert_approx_eq!(band.high, 4.0);
    }

    #[test]
    fn degenerate_band_is_a_point() {
        let band = Band::central(&[0.25; 40], 85.0).expect("band");
        assert_eq!(band.low, 0.25);
        assert_eq!(band.high, 0.25);
        assert!(band.contains(0.25));
        assert!(!band.contains(0.250_000_1));
    }

    #[test]
    fn empty_run_is_an_error() {
        let result = Thresholds::estimate(
            &AggregateStatistics::default(),
            &AnalysisParameters::default(),
        );
        assert_eq!(result, Err(EstimationError::EmptyRun));
    }

    fn waveform_with_pulses(pulses: &[(usize, Real)]) -> Waveform {
        let mut samples = vec![0.0; 400];
        for &(centre, height) in pulses {
            for (i, sample) in samples.iter_mut().enumerate() {
                let distance = i.abs_diff(centre) as Real;
                if distance < 30.0 {
                    *sample += height * (1.0 - distance / 30.0);
                }
            }
        }
        // 10 ns per sample, trigger at the centre.
        Waveform::new(samples, 1e-8, 2e-6)
    }

    #[test]
    fn statistics_of_one_waveform() {
        let waveform = waveform_with_pulses(&[(200, 0.05), (300, 0.02)]);
        let statistics = WaveformStatistics::collect(&waveform, &AnalysisParameters::default());
        assert_approx_eq!(statistics.max_time, 0.0, 1e-12);
        assert_eq!(statistics.secondary_times.len(), 1);
        assert_approx_eq!(statistics.secondary_times[0], 1e-6, 1e-12);
        assert_approx_eq!(statistics.max_amplitude, 0.05);
        assert_approx_eq!(statistics.min_amplitude, 0.0);
        assert_eq!(statistics.baseline_samples.len(), 400);
    }

    #[test]
    fn excluding_peaks_shrinks_the_baseline_distribution() {
        let waveform = waveform_with_pulses(&[(200, 0.05)]);
        let parameters = AnalysisParameters::try_from(AnalysisParameterArgs {
            baseline_policy: BaselinePolicy::ExcludePeakRegions,
            ..Default::default()
        })
        .expect("parameters are valid");
        let statistics = WaveformStatistics::collect(&waveform, &parameters);
        // Half prominence is crossed at 185 and 215, inclusive.
        assert_eq!(statistics.baseline_samples.len(), 400 - 31);
        assert!(statistics.baseline_samples.iter().all(|&x| x < 0.025));
    }

    #[test]
    fn estimate_from_aggregate() {
        let parameters = AnalysisParameters::default();
        let aggregate: AggregateStatistics = [
            waveform_with_pulses(&[(200, 0.05)]),
            waveform_with_pulses(&[(201, 0.04), (320, 0.01)]),
            waveform_with_pulses(&[(199, 0.06)]),
        ]
        .iter()
        .map(|waveform| WaveformStatistics::collect(waveform, &parameters))
        .collect();
        assert_eq!(aggregate.waveform_count, 3);
        assert_approx_eq!(aggregate.global_max, 0.06);

        let thresholds = Thresholds::estimate(&aggregate, &parameters).expect("thresholds");
        assert!(thresholds.baseline.low <= thresholds.baseline.high);
        assert!(thresholds.main_zone.low >= -1e-8 - 1e-12);
        assert!(thresholds.main_zone.high <= 1e-8 + 1e-12);
        assert!(thresholds.main_zone.low < 0.0 && thresholds.main_zone.high > 0.0);
        let afterpulse = thresholds.afterpulse.expect("one secondary peak");
        assert_approx_eq!(afterpulse.low, 1.2e-6, 1e-12);
        assert_eq!(afterpulse.low, afterpulse.high);
    }

    #[test]
    fn no_secondary_peaks_means_no_afterpulse_band() {
        let parameters = AnalysisParameters::default();
        let aggregate: AggregateStatistics = std::iter::once(WaveformStatistics::collect(
            &waveform_with_pulses(&[(200, 0.05)]),
            &parameters,
        ))
        .collect();
        let thresholds = Thresholds::estimate(&aggregate, &parameters).expect("thresholds");
        assert_eq!(thresholds.afterpulse, None);
    }
}
