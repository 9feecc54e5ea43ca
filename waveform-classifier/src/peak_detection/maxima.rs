use sipm_common::{Real, SampleIndex};
use std::cmp::Ordering;

/// Finds every local maximum, including flat-topped ones.
///
/// A plateau is reported once, at its midpoint (rounded down). Maxima at
/// either end of the trace are never reported, as their shape is unknown.
pub(super) fn local_maxima(samples: &[Real]) -> Vec<SampleIndex> {
    let mut maxima = Vec::new();
    let Some(last) = samples.len().checked_sub(1) else {
        return maxima;
    };
    let mut i = 1;
    while i < last {
        if samples[i - 1] < samples[i] {
            let mut ahead = i + 1;
            while ahead < last && samples[ahead] == samples[i] {
                ahead += 1;
            }
            if samples[ahead] < samples[i] {
                maxima.push((i + ahead - 1) / 2);
                i = ahead;
            }
        }
        i += 1;
    }
    maxima
}

/// Removes smaller maxima lying closer than `distance` samples to a larger one.
///
/// Maxima are visited from highest to lowest, so a maximum is only ever
/// suppressed by one that is at least as high. Ties are broken in favour of the
/// later index, which keeps the result independent of evaluation order.
pub(super) fn suppress_by_distance(
    samples: &[Real],
    maxima: &[SampleIndex],
    distance: usize,
) -> Vec<SampleIndex> {
    if distance <= 1 {
        return maxima.to_vec();
    }
    let mut keep = vec![true; maxima.len()];
    let mut by_height: Vec<usize> = (0..maxima.len()).collect();
    by_height.sort_by(|&a, &b| {
        samples[maxima[a]]
            .partial_cmp(&samples[maxima[b]])
            .unwrap_or(Ordering::Equal)
    });

    for &j in by_height.iter().rev() {
        if !keep[j] {
            continue;
        }
        for k in (0..j).rev() {
            if maxima[j] - maxima[k] >= distance {
                break;
            }
            keep[k] = false;
        }
        for k in (j + 1)..maxima.len() {
            if maxima[k] - maxima[j] >= distance {
                break;
            }
            keep[k] = false;
        }
    }

    maxima
        .iter()
        .zip(keep)
        .filter_map(|(&index, keep)| keep.then_some(index))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_maxima() {
        let samples = [0.0, 1.0, 0.0, 2.0, 1.0, 3.0];
        assert_eq!(local_maxima(&samples), vec![1, 3]);
    }

    #[test]
    fn plateau_midpoint() {
        let samples = [0.0, 1.0, 1.0, 1.0, 1.0, 0.0];
        assert_eq!(local_maxima(&samples), vec![2]);
    }

    #[test]
    fn rising_plateau_is_not_a_maximum() {
        let samples = [0.0, 1.0, 1.0, 2.0, 0.0];
        assert_eq!(local_maxima(&samples), vec![3]);
    }

    #[test]
    fn short_traces() {
        assert!(local_maxima(&[]).is_empty());
        assert!(local_maxima(&[1.0]).is_empty());
        assert!(local_maxima(&[0.0, 1.0]).is_empty());
    }

    #[test]
    fn distance_keeps_highest() {
        let samples = [0.0, 1.0, 0.0, 3.0, 0.0, 2.0, 0.0, 0.0, 0.0, 1.0, 0.0];
        let maxima = local_maxima(&samples);
        assert_eq!(maxima, vec![1, 3, 5, 9]);
        assert_eq!(suppress_by_distance(&samples, &maxima, 3), vec![3, 9]);
        assert_eq!(suppress_by_distance(&samples, &maxima, 1), maxima);
    }

    #[test]
    fn distance_ties_prefer_later() {
        let samples = [0.0, 1.0, 0.0, 1.0, 0.0];
        let maxima = local_maxima(&samples);
        assert_eq!(suppress_by_distance(&samples, &maxima, 3), vec![3]);
    }
}
