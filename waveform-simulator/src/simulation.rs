use crate::pulse::Pulse;
use clap::Args;
use rand::{
    Rng, SeedableRng,
    distr::{Uniform, uniform},
    rngs::StdRng,
};
use rand_distr::{Distribution, Exp, Normal};
use sipm_common::{RUN_METADATA_FILE_NAME, Real};
use std::{
    fs,
    path::{Path, PathBuf},
};
use strum::{Display, EnumIter};
use thiserror::Error;
use tracing::{debug, info};
use waveform_reader::{RunMetadata, write_waveform_file};

/// The time base setting records a tenth of the window.
const DIVISIONS_PER_WINDOW: Real = 10.0;

/// Afterpulses never begin sooner than this after the primary pulse, in seconds.
const MIN_AFTERPULSE_DELAY: Real = 1e-6;

#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("Invalid simulation setting: {0}")]
    InvalidConfig(String),
    #[error("Invalid normal distribution: {0}")]
    NormalDistribution(#[from] rand_distr::NormalError),
    #[error("Invalid exponential distribution: {0}")]
    ExpDistribution(#[from] rand_distr::ExpError),
    #[error("Invalid uniform distribution: {0}")]
    UniformDistribution(#[from] uniform::Error),
    #[error("Cannot write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// What a simulated waveform actually contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum Truth {
    /// One pulse at the trigger.
    Single,
    /// A pulse at the trigger followed by a smaller, delayed one.
    Afterpulse,
    /// A single pulse well before the trigger.
    Dark,
}

#[derive(Debug, Clone, Args)]
pub struct SimulationConfig {
    /// Number of waveform files to generate
    #[clap(long, default_value_t = 100)]
    pub count: usize,

    /// Samples per waveform
    #[clap(long, default_value_t = 2000)]
    pub points: usize,

    /// Length of the acquisition window, in seconds. The trigger is at its centre
    #[clap(long, default_value_t = 1e-5)]
    pub window: Real,

    /// Standard deviation of the gaussian baseline noise, in volts
    #[clap(long, default_value_t = 0.001)]
    pub noise: Real,

    /// Mean height of a primary pulse, in volts
    #[clap(long, default_value_t = 0.05)]
    pub pulse_height: Real,

    /// Relative standard deviation of pulse heights
    #[clap(long, default_value_t = 0.05)]
    pub height_spread: Real,

    /// Pulse rise time constant, in seconds
    #[clap(long, default_value_t = 2e-8)]
    pub rise_time: Real,

    /// Pulse decay time constant, in seconds
    #[clap(long, default_value_t = 3e-7)]
    pub decay_time: Real,

    /// Standard deviation of the primary pulse time about the trigger, in seconds
    #[clap(long, default_value_t = 1e-8)]
    pub trigger_jitter: Real,

    /// Probability that a triggered waveform also carries an afterpulse
    #[clap(long, default_value_t = 0.2)]
    pub afterpulse_probability: Real,

    /// Mean delay of an afterpulse beyond the minimum, in seconds
    #[clap(long, default_value_t = 1.5e-6)]
    pub afterpulse_delay: Real,

    /// Afterpulse height as a fraction of the primary pulse height
    #[clap(long, default_value_t = 0.6)]
    pub afterpulse_fraction: Real,

    /// Probability that a waveform holds only an untriggered dark pulse
    #[clap(long, default_value_t = 0.05)]
    pub dark_probability: Real,

    /// If set, samples are clipped at this level, in volts
    #[clap(long)]
    pub saturation: Option<Real>,

    /// Seed for the random number generator
    #[clap(long, default_value_t = 0)]
    pub seed: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            count: 100,
            points: 2000,
            window: 1e-5,
            noise: 0.001,
            pulse_height: 0.05,
            height_spread: 0.05,
            rise_time: 2e-8,
            decay_time: 3e-7,
            trigger_jitter: 1e-8,
            afterpulse_probability: 0.2,
            afterpulse_delay: 1.5e-6,
            afterpulse_fraction: 0.6,
            dark_probability: 0.05,
            saturation: None,
            seed: 0,
        }
    }
}

fn probability(name: &str, value: Real) -> Result<(), SimulationError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(SimulationError::InvalidConfig(format!(
            "{name} must lie in [0, 1], got {value}"
        )))
    }
}

/// Normal distributions in `rand_distr` accept a negative standard deviation.
fn spread(name: &str, value: Real) -> Result<(), SimulationError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(SimulationError::InvalidConfig(format!(
            "{name} must be finite and not negative, got {value}"
        )))
    }
}

impl SimulationConfig {
    pub fn sample_interval(&self) -> Real {
        self.window / self.points as Real
    }

    pub fn trigger_offset(&self) -> Real {
        self.window / 2.0
    }

    fn validate(&self) -> Result<(), SimulationError> {
        if self.points < 2 {
            return Err(SimulationError::InvalidConfig(
                "points must be at least 2".to_owned(),
            ));
        }
        if !(self.window.is_finite() && self.window > 0.0) {
            return Err(SimulationError::InvalidConfig(format!(
                "window must be a positive time, got {}",
                self.window
            )));
        }
        if !(self.rise_time > 0.0 && self.decay_time > self.rise_time) {
            return Err(SimulationError::InvalidConfig(
                "decay time must exceed a positive rise time".to_owned(),
            ));
        }
        spread("noise", self.noise)?;
        spread("height spread", self.height_spread)?;
        spread("trigger jitter", self.trigger_jitter)?;
        probability("afterpulse probability", self.afterpulse_probability)?;
        probability("dark probability", self.dark_probability)?;
        Ok(())
    }

    /// The run metadata file describing this acquisition.
    pub fn run_metadata(&self) -> RunMetadata {
        let mut metadata = RunMetadata::default();
        metadata.set(
            "Time base scale",
            self.window / DIVISIONS_PER_WINDOW,
            Some("s"),
        );
        metadata.set("Trigger (0.5PE)", self.pulse_height / 2.0, Some("v"));
        metadata.set(
            "Resolucion(SRATE)",
            self.points as Real / self.window,
            Some("Sa/s"),
        );
        metadata.set("Num de puntos(real)", self.points, None);
        metadata
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimulatedWaveform {
    pub name: String,
    pub truth: Truth,
    pub trigger_offset: Real,
    pub samples: Vec<Real>,
}

/// Generates `config.count` waveforms. The same config always yields the same waveforms.
pub fn simulate(config: &SimulationConfig) -> Result<Vec<SimulatedWaveform>, SimulationError> {
    config.validate()?;

    let mut rng = StdRng::seed_from_u64(config.seed);
    let noise = Normal::new(0.0, config.noise)?;
    let jitter = Normal::new(0.0, config.trigger_jitter)?;
    let heights = Normal::new(1.0, config.height_spread)?;
    let delays = Exp::new(1.0 / config.afterpulse_delay)?;
    let trigger = config.trigger_offset();
    let dark_times = Uniform::new(0.05 * config.window, trigger - 0.2 * config.window)?;
    let latest_afterpulse = config.window - MIN_AFTERPULSE_DELAY;
    let interval = config.sample_interval();

    let mut waveforms = Vec::with_capacity(config.count);
    for index in 0..config.count {
        let truth = if rng.random_bool(config.dark_probability) {
            Truth::Dark
        } else if rng.random_bool(config.afterpulse_probability) {
            Truth::Afterpulse
        } else {
            Truth::Single
        };

        let height = config.pulse_height * heights.sample(&mut rng).max(0.1);
        let pulse = |peak_time, height| {
            Pulse::peaking_at(peak_time, config.rise_time, config.decay_time, height)
        };
        let pulses = match truth {
            Truth::Single => vec![pulse(trigger + jitter.sample(&mut rng), height)],
            Truth::Afterpulse => {
                let primary = trigger + jitter.sample(&mut rng);
                let delay = MIN_AFTERPULSE_DELAY + delays.sample(&mut rng);
                let secondary = (primary + delay).min(latest_afterpulse);
                vec![
                    pulse(primary, height),
                    pulse(secondary, height * config.afterpulse_fraction),
                ]
            }
            Truth::Dark => vec![pulse(dark_times.sample(&mut rng), height)],
        };

        let samples = (0..config.points)
            .map(|i| {
                let time = i as Real * interval;
                let value = pulses.iter().map(|pulse| pulse.value(time)).sum::<Real>()
                    + noise.sample(&mut rng);
                match config.saturation {
                    Some(level) => value.min(level),
                    None => value,
                }
            })
            .collect();

        waveforms.push(SimulatedWaveform {
            name: format!("waveform_{index:05}.txt"),
            truth,
            trigger_offset: trigger,
            samples,
        });
    }
    Ok(waveforms)
}

/// Simulates a run and writes it to `dir` as waveform files plus a run metadata file.
/// # Error Modes
/// - Emits [SimulationError::InvalidConfig] or a distribution error if `config` is unusable.
/// - Emits [SimulationError::Io] if the directory or a file cannot be written.
#[tracing::instrument(skip_all, fields(dir = %dir.display(), count = config.count))]
pub fn write_run(
    dir: &Path,
    config: &SimulationConfig,
) -> Result<Vec<SimulatedWaveform>, SimulationError> {
    let io_error = |path: &Path| {
        let path = path.to_path_buf();
        move |source: std::io::Error| SimulationError::Io { path, source }
    };

    let waveforms = simulate(config)?;
    fs::create_dir_all(dir).map_err(io_error(dir))?;

    let metadata_path = dir.join(RUN_METADATA_FILE_NAME);
    config
        .run_metadata()
        .write(&metadata_path)
        .map_err(io_error(&metadata_path))?;

    for waveform in &waveforms {
        let path = dir.join(&waveform.name);
        write_waveform_file(&path, waveform.trigger_offset, &waveform.samples)
            .map_err(io_error(&path))?;
        debug!(name = %waveform.name, truth = %waveform.truth, "Written");
    }
    info!("Simulated run written");
    Ok(waveforms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use strum::IntoEnumIterator;
    use waveform_reader::{DirectorySource, load_waveform_file};

    fn small() -> SimulationConfig {
        SimulationConfig {
            count: 40,
            points: 500,
            ..Default::default()
        }
    }

    #[test]
    fn same_seed_same_waveforms() {
        let a = simulate(&small()).expect("simulation should succeed");
        let b = simulate(&small()).expect("simulation should succeed");
        assert_eq!(a, b);
        let c = simulate(&SimulationConfig { seed: 1, ..small() }).expect("simulation should succeed");
        assert_ne!(a, c);
    }

    #[test]
    fn every_kind_appears() {
        let config = SimulationConfig {
            count: 200,
            points: 100,
            dark_probability: 0.2,
            afterpulse_probability: 0.4,
            ..Default::default()
        };
        let waveforms = simulate(&config).expect("simulation should succeed");
        assert_eq!(waveforms.len(), 200);
        for truth in Truth::iter() {
            assert!(waveforms.iter().any(|w| w.truth == truth), "no {truth}");
        }
        assert!(waveforms.iter().all(|w| w.samples.len() == 100));
    }

    #[test]
    fn primary_pulse_peaks_at_trigger() {
        let config = SimulationConfig {
            count: 1,
            noise: 0.0,
            trigger_jitter: 0.0,
            height_spread: 0.0,
            afterpulse_probability: 0.0,
            dark_probability: 0.0,
            ..Default::default()
        };
        let waveform = &simulate(&config).expect("simulation should succeed")[0];
        assert_eq!(waveform.truth, Truth::Single);
        let (index, &max) = waveform
            .samples
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .expect("samples");
        assert_eq!(index, 1000);
        assert_approx_eq!(max, 0.05, 1e-4);
    }

    #[test]
    fn saturation_clips() {
        let config = SimulationConfig {
            saturation: Some(0.03),
            ..small()
        };
        let waveforms = simulate(&config).expect("simulation should succeed");
        assert!(waveforms.iter().flat_map(|w| &w.samples).all(|&s| s <= 0.03));
    }

    #[test]
    fn invalid_settings_are_rejected() {
        let bad = [
            SimulationConfig { points: 1, ..small() },
            SimulationConfig { window: -1.0, ..small() },
            SimulationConfig { decay_time: 1e-9, ..small() },
            SimulationConfig { dark_probability: 1.5, ..small() },
            SimulationConfig { noise: -0.1, ..small() },
            SimulationConfig { noise: Real::NAN, ..small() },
            SimulationConfig { trigger_jitter: -1e-9, ..small() },
        ];
        for config in bad {
            assert!(
                matches!(simulate(&config), Err(SimulationError::InvalidConfig(_))),
                "{config:?}"
            );
        }
    }

    #[test]
    fn written_run_reads_back() {
        let dir = tempfile::tempdir().expect("temp dir should be created");
        let config = small();
        let waveforms = write_run(dir.path(), &config).expect("run should be written");

        let source = DirectorySource::new(dir.path()).expect("source should open");
        let metadata = source.metadata().expect("metadata should be present");
        assert_approx_eq!(
            metadata.sample_interval().expect("interval"),
            config.sample_interval()
        );
        assert_eq!(metadata.num_points(), Some(500));

        let file = load_waveform_file(&dir.path().join(&waveforms[3].name)).expect("file should load");
        assert_approx_eq!(file.trigger_offset, config.trigger_offset());
        assert_eq!(file.samples, waveforms[3].samples);
    }
}
