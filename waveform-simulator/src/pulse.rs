use sipm_common::Real;

/// A bi-exponential pulse, `f(t) = A(e^{-t/d} - e^{-t/r})`, scaled so its
/// maximum equals `height`.
#[derive(Debug, Clone, PartialEq)]
pub struct Pulse {
    start: Real,
    rise: Real,
    decay: Real,
    coef: Real,
}

impl Pulse {
    /// `decay` must exceed `rise`, both in seconds.
    pub fn new(start: Real, rise: Real, decay: Real, height: Real) -> Self {
        let shape_at_peak = Self::shape(Self::rise_to_peak(rise, decay), rise, decay);
        Self {
            start,
            rise,
            decay,
            coef: height / shape_at_peak,
        }
    }

    /// Builds a pulse whose maximum falls at `peak_time`.
    pub fn peaking_at(peak_time: Real, rise: Real, decay: Real, height: Real) -> Self {
        Self::new(
            peak_time - Self::rise_to_peak(rise, decay),
            rise,
            decay,
            height,
        )
    }

    /// Time from the start of the pulse to its maximum, where f'(t) = 0.
    fn rise_to_peak(rise: Real, decay: Real) -> Real {
        decay * rise / (decay - rise) * Real::ln(decay / rise)
    }

    fn shape(t: Real, rise: Real, decay: Real) -> Real {
        Real::exp(-t / decay) - Real::exp(-t / rise)
    }

    pub fn peak_time(&self) -> Real {
        self.start + Self::rise_to_peak(self.rise, self.decay)
    }

    pub fn value(&self, time: Real) -> Real {
        if time < self.start {
            0.0
        } else {
            self.coef * Self::shape(time - self.start, self.rise, self.decay)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn maximum_is_height_at_peak_time() {
        let pulse = Pulse::peaking_at(5e-6, 2e-8, 3e-7, 0.05);
        assert_approx_eq!(pulse.peak_time(), 5e-6);
        assert_approx_eq!(pulse.value(5e-6), 0.05);
        assert!(pulse.value(5e-6 - 1e-8) < 0.05);
        assert!(pulse.value(5e-6 + 1e-8) < 0.05);
    }

    #[test]
    fn zero_before_start_and_decays_after() {
        let pulse = Pulse::new(1e-6, 2e-8, 3e-7, 0.05);
        assert_eq!(pulse.value(0.0), 0.0);
        assert_eq!(pulse.value(1e-6), 0.0);
        assert!(pulse.value(4e-6) < 0.05 * 1e-3);
        assert!(pulse.value(4e-6) > 0.0);
    }
}
