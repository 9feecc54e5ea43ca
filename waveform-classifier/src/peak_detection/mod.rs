//! Stateless peak finding over a single amplitude sequence.
//!
//! Candidates are the local maxima of the trace. They are thinned by
//! [DetectionParameters::min_distance], then by prominence, then by width at half
//! prominence, so that identical inputs always produce identical peak sets.
mod maxima;
mod prominence;

use crate::parameters::DetectionParameters;
use serde::{Deserialize, Serialize};
use sipm_common::{Real, SampleIndex};

/// A detected peak.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Peak {
    pub index: SampleIndex,
    pub amplitude: Real,
    /// Width at half prominence, in samples.
    pub width: Real,
    pub prominence: Real,
    /// Interpolated position where the leading edge crosses half prominence.
    pub left: Real,
    /// Interpolated position where the trailing edge crosses half prominence.
    pub right: Real,
}

/// Peaks of one waveform, in ascending index order.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeakSet(Vec<Peak>);

impl PeakSet {
    pub fn iter(&self) -> impl Iterator<Item = &Peak> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The highest peak. Ties go to the earliest.
    pub fn highest(&self) -> Option<&Peak> {
        self.0
            .iter()
            .reduce(|best, peak| if peak.amplitude > best.amplitude { peak } else { best })
    }

    /// Retains only the peaks for which `keep` returns true.
    pub fn filtered(&self, keep: impl Fn(&Peak) -> bool) -> Self {
        Self(self.0.iter().filter(|peak| keep(peak)).copied().collect())
    }

    /// Collapses peaks at or above `level` into the single highest of them.
    ///
    /// A saturated pulse often shows as a flat top broken by digitiser noise,
    /// which would otherwise be read as several pulses.
    pub fn collapse_saturated(&self, level: Real) -> Self {
        let saturated = self.0.iter().filter(|peak| peak.amplitude >= level).count();
        if saturated < 2 {
            return self.clone();
        }
        let keep = self
            .filtered(|peak| peak.amplitude >= level)
            .highest()
            .map(|peak| peak.index);
        self.filtered(|peak| peak.amplitude < level || Some(peak.index) == keep)
    }
}

impl FromIterator<Peak> for PeakSet {
    fn from_iter<I: IntoIterator<Item = Peak>>(iter: I) -> Self {
        let mut peaks: Vec<Peak> = iter.into_iter().collect();
        peaks.sort_by_key(|peak| peak.index);
        Self(peaks)
    }
}

impl<'a> IntoIterator for &'a PeakSet {
    type Item = &'a Peak;
    type IntoIter = std::slice::Iter<'a, Peak>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Finds the peaks of `samples` meeting every criterion in `parameters`.
/// # Parameters
/// - samples: the amplitude sequence, which should contain only finite values.
/// - parameters: the minimum prominence, width and separation of a peak.
pub fn find_peaks(samples: &[Real], parameters: &DetectionParameters) -> PeakSet {
    let maxima = maxima::local_maxima(samples);
    let maxima = maxima::suppress_by_distance(samples, &maxima, parameters.min_distance);
    maxima
        .into_iter()
        .filter_map(|index| {
            let prominence = prominence::prominence(samples, index);
            if prominence.value < parameters.min_prominence {
                return None;
            }
            let half_width = prominence::half_width(samples, index, &prominence);
            (half_width.width() >= parameters.min_width as Real).then_some(Peak {
                index,
                amplitude: samples[index],
                width: half_width.width(),
                prominence: prominence.value,
                left: half_width.left,
                right: half_width.right,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A triangular pulse of the given half-width, centred on `centre`.
    fn add_pulse(samples: &mut [Real], centre: usize, height: Real, half_width: usize) {
        for (i, sample) in samples.iter_mut().enumerate() {
            let distance = i.abs_diff(centre);
            if distance < half_width {
                *sample += height * (1.0 - distance as Real / half_width as Real);
            }
        }
    }

    fn detection(min_prominence: Real, min_width: usize, min_distance: usize) -> DetectionParameters {
        DetectionParameters {
            min_prominence,
            min_width,
            min_distance,
        }
    }

    #[test]
    fn single_pulse() {
        let mut samples = vec![0.0; 100];
        add_pulse(&mut samples, 40, 0.05, 10);
        let peaks = find_peaks(&samples, &detection(0.001, 2, 1));
        assert_eq!(peaks.len(), 1);
        let peak = peaks.highest().expect("one peak");
        assert_eq!(peak.index, 40);
        assert_eq!(peak.amplitude, 0.05);
        assert!((peak.width - 10.0).abs() < 1e-9);
    }

    #[test]
    fn narrow_spike_is_rejected_by_width() {
        let mut samples = vec![0.0; 100];
        add_pulse(&mut samples, 40, 0.05, 10);
        samples[70] = 0.04;
        let peaks = find_peaks(&samples, &detection(0.001, 2, 1));
        assert_eq!(peaks.iter().map(|p| p.index).collect::<Vec<_>>(), vec![40]);

        let peaks = find_peaks(&samples, &detection(0.001, 0, 1));
        assert_eq!(peaks.iter().map(|p| p.index).collect::<Vec<_>>(), vec![40, 70]);
    }

    #[test]
    fn small_ripple_is_rejected_by_prominence() {
        let mut samples = vec![0.0; 100];
        add_pulse(&mut samples, 40, 0.05, 10);
        add_pulse(&mut samples, 80, 0.0005, 5);
        let peaks = find_peaks(&samples, &detection(0.001, 2, 1));
        assert_eq!(peaks.len(), 1);
    }

    #[test]
    fn close_peaks_are_suppressed_by_distance() {
        let mut samples = vec![0.0; 100];
        add_pulse(&mut samples, 40, 0.05, 5);
        add_pulse(&mut samples, 50, 0.03, 5);
        let near = find_peaks(&samples, &detection(0.001, 2, 20));
        assert_eq!(near.iter().map(|p| p.index).collect::<Vec<_>>(), vec![40]);
        let far = find_peaks(&samples, &detection(0.001, 2, 5));
        assert_eq!(far.iter().map(|p| p.index).collect::<Vec<_>>(), vec![40, 50]);
    }

    #[test]
    fn deterministic() {
        let samples: Vec<Real> = (0..500).map(|i| ((i as Real) * 0.37).sin()).collect();
        let parameters = detection(0.1, 1, 3);
        assert_eq!(find_peaks(&samples, &parameters), find_peaks(&samples, &parameters));
    }

    #[test]
    fn saturated_peaks_collapse() {
        let mut samples = vec![0.0; 120];
        add_pulse(&mut samples, 20, 0.099, 6);
        add_pulse(&mut samples, 40, 0.1, 6);
        add_pulse(&mut samples, 80, 0.02, 6);
        let peaks = find_peaks(&samples, &detection(0.001, 2, 1));
        assert_eq!(peaks.len(), 3);

        let collapsed = peaks.collapse_saturated(0.095);
        assert_eq!(
            collapsed.iter().map(|p| p.index).collect::<Vec<_>>(),
            vec![40, 80]
        );
        assert_eq!(peaks.collapse_saturated(0.2), peaks);
    }
}
