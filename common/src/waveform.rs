use crate::{Real, SampleIndex};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum MalformedWaveform {
    #[error("Waveform contains no samples")]
    Empty,
    #[error("Waveform declares {declared} samples but contains {actual}")]
    SampleCountMismatch { declared: usize, actual: usize },
    #[error("Non-finite sample {value} at index {index}")]
    NonFiniteSample { index: SampleIndex, value: Real },
    #[error("Invalid sample interval {0}")]
    InvalidSampleInterval(Real),
    #[error("Non-finite trigger offset {0}")]
    NonFiniteTriggerOffset(Real),
}

/// One captured amplitude-vs-time trace.
///
/// The time of sample `i`, relative to the trigger, is
/// `i * sample_interval - trigger_offset`.
#[derive(Debug, Clone, PartialEq)]
pub struct Waveform {
    samples: Vec<Real>,
    sample_interval: Real,
    trigger_offset: Real,
    point_count: usize,
}

impl Waveform {
    /// Creates a waveform whose declared point count is the number of samples given.
    pub fn new(samples: Vec<Real>, sample_interval: Real, trigger_offset: Real) -> Self {
        let point_count = samples.len();
        Self {
            samples,
            sample_interval,
            trigger_offset,
            point_count,
        }
    }

    /// Creates a waveform whose declared point count comes from the file header,
    /// which may disagree with the number of samples actually present.
    pub fn with_point_count(
        samples: Vec<Real>,
        sample_interval: Real,
        trigger_offset: Real,
        point_count: usize,
    ) -> Self {
        Self {
            samples,
            sample_interval,
            trigger_offset,
            point_count,
        }
    }

    pub fn samples(&self) -> &[Real] {
        &self.samples
    }

    pub fn sample_interval(&self) -> Real {
        self.sample_interval
    }

    pub fn trigger_offset(&self) -> Real {
        self.trigger_offset
    }

    pub fn point_count(&self) -> usize {
        self.point_count
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Converts a (possibly fractional) sample position into a time relative to the trigger.
    pub fn time_at(&self, index: Real) -> Real {
        index * self.sample_interval - self.trigger_offset
    }

    /// Converts a duration into a whole number of samples, rounding down.
    pub fn duration_to_samples(&self, duration: Real) -> usize {
        (duration / self.sample_interval).floor().max(0.0) as usize
    }

    /// Checks the waveform is dimensionally consistent and contains only finite values.
    pub fn validate(&self) -> Result<(), MalformedWaveform> {
        if self.samples.is_empty() {
            return Err(MalformedWaveform::Empty);
        }
        if self.point_count != self.samples.len() {
            return Err(MalformedWaveform::SampleCountMismatch {
                declared: self.point_count,
                actual: self.samples.len(),
            });
        }
        if !self.sample_interval.is_finite() || self.sample_interval <= 0.0 {
            return Err(MalformedWaveform::InvalidSampleInterval(
                self.sample_interval,
            ));
        }
        if !self.trigger_offset.is_finite() {
            return Err(MalformedWaveform::NonFiniteTriggerOffset(
                self.trigger_offset,
            ));
        }
        if let Some((index, &value)) = self
            .samples
            .iter()
            .enumerate()
            .find(|(_, value)| !value.is_finite())
        {
            return Err(MalformedWaveform::NonFiniteSample { index, value });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_waveform() {
        let waveform = Waveform::new(vec![0.0, 1.0, 0.5], 1e-9, 1e-9);
        assert_eq!(waveform.validate(), Ok(()));
        assert_eq!(waveform.len(), 3);
    }

    #[test]
    fn empty_waveform() {
        let waveform = Waveform::new(vec![], 1e-9, 0.0);
        assert_eq!(waveform.validate(), Err(MalformedWaveform::Empty));
    }

    #[test]
    fn mismatched_point_count() {
        let waveform = Waveform::with_point_count(vec![0.0, 1.0], 1e-9, 0.0, 3);
        assert_eq!(
            waveform.validate(),
            Err(MalformedWaveform::SampleCountMismatch {
                declared: 3,
                actual: 2
            })
        );
    }

    #[test]
    fn non_finite_sample() {
        let waveform = Waveform::new(vec![0.0, Real::INFINITY, 1.0], 1e-9, 0.0);
        assert!(matches!(
            waveform.validate(),
            Err(MalformedWaveform::NonFiniteSample { index: 1, .. })
        ));
    }

    #[test]
    fn bad_sample_interval() {
        let waveform = Waveform::new(vec![0.0], 0.0, 0.0);
        assert_eq!(
            waveform.validate(),
            Err(MalformedWaveform::InvalidSampleInterval(0.0))
        );
    }

    #[test]
    fn time_axis() {
        let waveform = Waveform::new(vec![0.0; 11], 0.5, 2.5);
        assert_eq!(waveform.time_at(0.0), -2.5);
        assert_eq!(waveform.time_at(5.0), 0.0);
        assert_eq!(waveform.time_at(10.0), 2.5);
        assert_eq!(waveform.duration_to_samples(1.2), 2);
    }
}
