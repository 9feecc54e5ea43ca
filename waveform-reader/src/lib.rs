//! Reads directories of text waveform captures.
//!
//! Each directory holds one file per trigger in the format described in [loader],
//! and optionally a run metadata file describing the acquisition setup.
mod directory;
pub mod loader;
pub mod metadata;

pub use directory::DirectorySource;
pub use loader::{WaveformFile, load_waveform_file, parse_waveform, write_waveform_file};
pub use metadata::{MetadataEntry, RunMetadata};
