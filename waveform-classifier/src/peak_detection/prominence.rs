use sipm_common::{Real, SampleIndex};

/// How far a peak stands above the terrain separating it from any higher sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(super) struct Prominence {
    pub(super) value: Real,
    pub(super) left_base: SampleIndex,
    pub(super) right_base: SampleIndex,
}

/// Measures the prominence of the peak at `peak`.
///
/// Each base is the lowest sample between the peak and the nearest sample
/// higher than it on that side (or the end of the trace). The prominence is
/// the height of the peak above the higher of its two bases.
pub(super) fn prominence(samples: &[Real], peak: SampleIndex) -> Prominence {
    let height = samples[peak];

    let mut left_base = peak;
    let mut left_min = height;
    for i in (0..=peak).rev() {
        if samples[i] > height {
            break;
        }
        if samples[i] < left_min {
            left_min = samples[i];
            left_base = i;
        }
    }

    let mut right_base = peak;
    let mut right_min = height;
    for (i, &sample) in samples.iter().enumerate().skip(peak) {
        if sample > height {
            break;
        }
        if sample < right_min {
            right_min = sample;
            right_base = i;
        }
    }

    Prominence {
        value: height - left_min.max(right_min),
        left_base,
        right_base,
    }
}

/// Interpolated sample positions where a peak crosses half its prominence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(super) struct HalfWidth {
    pub(super) left: Real,
    pub(super) right: Real,
}

impl HalfWidth {
    pub(super) fn width(&self) -> Real {
        self.right - self.left
    }
}

/// Measures the width of a peak at half its prominence, never looking beyond its bases.
pub(super) fn half_width(
    samples: &[Real],
    peak: SampleIndex,
    prominence: &Prominence,
) -> HalfWidth {
    let level = samples[peak] - prominence.value / 2.0;

    let mut i = peak;
    while prominence.left_base < i && level < samples[i] {
        i -= 1;
    }
    let mut left = i as Real;
    if samples[i] < level {
        left += (level - samples[i]) / (samples[i + 1] - samples[i]);
    }

    let mut i = peak;
    while i < prominence.right_base && level < samples[i] {
        i += 1;
    }
    let mut right = i as Real;
    if samples[i] < level {
        right -= (level - samples[i]) / (samples[i - 1] - samples[i]);
    }

    HalfWidth { left, right }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn isolated_peak() {
        let samples = [0.0, 1.0, 4.0, 1.0, 0.0];
        let prominence = prominence(&samples, 2);
        assert_approx_eq!(prominence.value, 4.0);
        assert_eq!(prominence.left_base, 0);
        assert_eq!(prominence.right_base, 4);

        let width = half_width(&samples, 2, &prominence);
        assert_approx_eq!(width.left, 4.0 / 3.0);
        assert_approx_eq!(width.right, 8.0 / 3.0);
        assert_approx_eq!(width.width(), 4.0 / 3.0);
    }

    #[test]
    fn shoulder_is_bounded_by_higher_peak() {
        // The peak at 1 is separated from the higher peak at 5 by the dip at 3.
        let samples = [0.0, 2.0, 1.5, 1.0, 3.0, 5.0, 0.0];
        let prominence = prominence(&samples, 1);
        assert_approx_eq!(prominence.value, 1.0);
        assert_eq!(prominence.left_base, 0);
        assert_eq!(prominence.right_base, 3);
    }

    #[test]
    fn higher_base_wins() {
        let samples = [1.0, 3.0, 0.0];
        let prominence = prominence(&samples, 1);
        assert_approx_eq!(prominence.value, 2.0);
    }
}
