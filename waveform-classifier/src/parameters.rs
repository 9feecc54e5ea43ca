use crate::error::ConfigurationError;
use clap::{ArgAction, Args, ValueEnum};
use serde::{Deserialize, Serialize};
use sipm_common::{Real, Waveform};
use std::num::NonZeroUsize;

pub const DEFAULT_PROMINENCE_PCT: Real = 2.0;
pub const DEFAULT_MIN_WIDTH: Real = 0.2e-6;
pub const DEFAULT_MIN_DISTANCE: Real = 0.05e-6;
pub const DEFAULT_BASELINE_PCT: Real = 85.0;
pub const DEFAULT_MAIN_ZONE_PCT: Real = 99.0;
pub const DEFAULT_AFTERPULSE_PCT: Real = 80.0;
pub const DEFAULT_SATURATION_PCT: Real = 95.0;
pub const DEFAULT_PARALLEL_THRESHOLD: usize = 50;

/// Which amplitude samples make up the distribution the baseline band is taken from.
#[derive(
    Default, Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum, strum::Display,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum BaselinePolicy {
    /// Every sample of every waveform, including those inside pulses.
    #[default]
    AllSamples,
    /// Every sample except those within the half-prominence width of a detected peak.
    #[value(name = "exclude-peaks")]
    #[strum(serialize = "exclude-peaks")]
    #[serde(rename = "exclude-peaks")]
    ExcludePeakRegions,
}

/// Analysis parameters as supplied on the command line.
#[derive(Debug, Clone, Args)]
pub struct AnalysisParameterArgs {
    /// Minimum peak prominence, as a percentage of each waveform's amplitude range.
    #[clap(long, env = "SIPM_PROMINENCE_PCT", default_value_t = DEFAULT_PROMINENCE_PCT)]
    pub prominence_pct: Real,

    /// Minimum peak width at half prominence, in seconds.
    #[clap(long, env = "SIPM_MIN_WIDTH", default_value_t = DEFAULT_MIN_WIDTH)]
    pub min_width: Real,

    /// Minimum distance between neighbouring peaks, in seconds.
    #[clap(long, env = "SIPM_MIN_DISTANCE", default_value_t = DEFAULT_MIN_DISTANCE)]
    pub min_distance: Real,

    /// Percentage of the amplitude distribution treated as the noise floor.
    #[clap(long, env = "SIPM_BASELINE_PCT", default_value_t = DEFAULT_BASELINE_PCT)]
    pub baseline_pct: Real,

    /// Percentage of the largest-sample time distribution forming the main zone.
    #[clap(long, env = "SIPM_MAIN_ZONE_PCT", default_value_t = DEFAULT_MAIN_ZONE_PCT)]
    pub main_zone_pct: Real,

    /// Percentage of the secondary peak time distribution forming the afterpulse zone.
    #[clap(long, env = "SIPM_AFTERPULSE_PCT", default_value_t = DEFAULT_AFTERPULSE_PCT)]
    pub afterpulse_pct: Real,

    /// Peaks at or above this percentage of the global maximum are treated as saturated.
    #[clap(long, env = "SIPM_SATURATION_PCT", default_value_t = DEFAULT_SATURATION_PCT)]
    pub saturation_pct: Real,

    /// Samples used to estimate the baseline band.
    #[clap(long, value_enum, default_value_t = BaselinePolicy::AllSamples)]
    pub baseline_policy: BaselinePolicy,
}

impl Default for AnalysisParameterArgs {
    fn default() -> Self {
        Self {
            prominence_pct: DEFAULT_PROMINENCE_PCT,
            min_width: DEFAULT_MIN_WIDTH,
            min_distance: DEFAULT_MIN_DISTANCE,
            baseline_pct: DEFAULT_BASELINE_PCT,
            main_zone_pct: DEFAULT_MAIN_ZONE_PCT,
            afterpulse_pct: DEFAULT_AFTERPULSE_PCT,
            saturation_pct: DEFAULT_SATURATION_PCT,
            baseline_policy: BaselinePolicy::default(),
        }
    }
}

/// A validated, complete set of analysis parameters.
///
/// Every field takes part in the cache fingerprint, so values can only be
/// obtained through [TryFrom<AnalysisParameterArgs>], which rejects out of range
/// values rather than clamping them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AnalysisParameters {
    prominence_pct: Real,
    min_width: Real,
    min_distance: Real,
    baseline_pct: Real,
    main_zone_pct: Real,
    afterpulse_pct: Real,
    saturation_pct: Real,
    baseline_policy: BaselinePolicy,
}

fn percentage(name: &'static str, value: Real) -> Result<Real, ConfigurationError> {
    if value > 0.0 && value < 100.0 {
        Ok(value)
    } else {
        Err(ConfigurationError::PercentageOutOfRange { name, value })
    }
}

fn time(name: &'static str, value: Real) -> Result<Real, ConfigurationError> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(ConfigurationError::InvalidTime { name, value })
    }
}

impl TryFrom<AnalysisParameterArgs> for AnalysisParameters {
    type Error = ConfigurationError;

    fn try_from(args: AnalysisParameterArgs) -> Result<Self, Self::Error> {
        Ok(Self {
            prominence_pct: percentage("prominence-pct", args.prominence_pct)?,
            min_width: time("min-width", args.min_width)?,
            min_distance: time("min-distance", args.min_distance)?,
            baseline_pct: percentage("baseline-pct", args.baseline_pct)?,
            main_zone_pct: percentage("main-zone-pct", args.main_zone_pct)?,
            afterpulse_pct: percentage("afterpulse-pct", args.afterpulse_pct)?,
            saturation_pct: percentage("saturation-pct", args.saturation_pct)?,
            baseline_policy: args.baseline_policy,
        })
    }
}

impl Default for AnalysisParameters {
    fn default() -> Self {
        let args = AnalysisParameterArgs::default();
        Self {
            prominence_pct: args.prominence_pct,
            min_width: args.min_width,
            min_distance: args.min_distance,
            baseline_pct: args.baseline_pct,
            main_zone_pct: args.main_zone_pct,
            afterpulse_pct: args.afterpulse_pct,
            saturation_pct: args.saturation_pct,
            baseline_policy: args.baseline_policy,
        }
    }
}

impl AnalysisParameters {
    pub fn prominence_pct(&self) -> Real {
        self.prominence_pct
    }

    pub fn min_width(&self) -> Real {
        self.min_width
    }

    pub fn min_distance(&self) -> Real {
        self.min_distance
    }

    pub fn baseline_pct(&self) -> Real {
        self.baseline_pct
    }

    pub fn main_zone_pct(&self) -> Real {
        self.main_zone_pct
    }

    pub fn afterpulse_pct(&self) -> Real {
        self.afterpulse_pct
    }

    pub fn saturation_pct(&self) -> Real {
        self.saturation_pct
    }

    pub fn baseline_policy(&self) -> BaselinePolicy {
        self.baseline_policy
    }

    /// The amplitude at or above which a peak counts as saturated.
    pub fn saturation_level(&self, global_max: Real) -> Real {
        self.saturation_pct / 100.0 * global_max
    }

    /// Converts the physical detection criteria into sample units for one waveform.
    pub fn detection_for(&self, waveform: &Waveform) -> DetectionParameters {
        let (min, max) = waveform
            .samples()
            .iter()
            .fold((Real::INFINITY, Real::NEG_INFINITY), |(min, max), &x| {
                (min.min(x), max.max(x))
            });
        let range = if min <= max { max - min } else { 0.0 };
        DetectionParameters {
            min_prominence: self.prominence_pct / 100.0 * range,
            min_width: waveform.duration_to_samples(self.min_width),
            min_distance: waveform.duration_to_samples(self.min_distance).max(1),
        }
    }
}

/// Peak detection criteria expressed in amplitude and sample units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionParameters {
    pub min_prominence: Real,
    pub min_width: usize,
    /// Always at least one.
    pub min_distance: usize,
}

/// How work is scheduled. None of these settings change the results of a run.
#[derive(Debug, Clone, Args)]
pub struct ExecutionPolicy {
    /// Classify every waveform on the calling thread.
    #[clap(long = "sequential", action = ArgAction::SetFalse)]
    pub parallel: bool,

    /// Collections with more units of work than this are processed by the worker pool.
    #[clap(long, default_value_t = DEFAULT_PARALLEL_THRESHOLD)]
    pub parallel_threshold: usize,

    /// Size of the worker pool. Defaults to the available parallelism.
    #[clap(long)]
    pub threads: Option<NonZeroUsize>,
}

impl Default for ExecutionPolicy {
    fn default() -> Self {
        Self {
            parallel: true,
            parallel_threshold: DEFAULT_PARALLEL_THRESHOLD,
            threads: None,
        }
    }
}

impl ExecutionPolicy {
    pub fn sequential() -> Self {
        Self {
            parallel: false,
            ..Default::default()
        }
    }

    /// Always uses the worker pool, whatever the number of units.
    pub fn always_parallel(threads: Option<NonZeroUsize>) -> Self {
        Self {
            parallel: true,
            parallel_threshold: 0,
            threads,
        }
    }
}
