pub mod metrics;
pub mod source;
pub mod tracer;
mod waveform;

pub use source::{FileIdentity, SourceError, SourceListing, WaveformSource};
pub use waveform::{MalformedWaveform, Waveform};

/// Amplitudes (volts) and times (seconds) are both carried as this type.
pub type Real = f64;

/// Position of a sample within a waveform.
pub type SampleIndex = usize;

/// Name of the optional run metadata file which sits alongside the waveform files.
pub const RUN_METADATA_FILE_NAME: &str = "DATA.txt";
