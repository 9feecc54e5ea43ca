use crate::parameters::AnalysisParameters;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sipm_common::{FileIdentity, Real, SourceListing};
use std::fmt;

/// Bumped whenever the meaning of a cached result changes.
const KEY_FORMAT: &str = "sipm-waveform-classifier/1";

/// Identifies a run by everything that can influence its results.
///
/// `key` is a canonical text encoding of the sorted input file identities and
/// every analysis parameter (as exact bit patterns), and `digest` is its
/// SHA-256. Two runs share a digest only if their keys are identical, which
/// stores verify by comparing keys on every lookup.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint {
    pub digest: String,
    pub key: String,
}

fn file_line(kind: &str, file: &FileIdentity) -> String {
    format!(
        "{kind} {}:{} {} {}",
        file.name.len(),
        file.name,
        file.size,
        file.modified_ns
    )
}

fn real_line(name: &str, value: Real) -> String {
    format!("{name} {:016x}", value.to_bits())
}

fn canonical_key(listing: &SourceListing, parameters: &AnalysisParameters) -> String {
    let mut lines = vec![
        KEY_FORMAT.to_owned(),
        real_line("prominence-pct", parameters.prominence_pct()),
        real_line("min-width", parameters.min_width()),
        real_line("min-distance", parameters.min_distance()),
        real_line("baseline-pct", parameters.baseline_pct()),
        real_line("main-zone-pct", parameters.main_zone_pct()),
        real_line("afterpulse-pct", parameters.afterpulse_pct()),
        real_line("saturation-pct", parameters.saturation_pct()),
        format!("baseline-policy {}", parameters.baseline_policy()),
    ];

    let mut waveforms: Vec<_> = listing.waveforms.iter().collect();
    waveforms.sort();
    lines.push(format!("waveforms {}", waveforms.len()));
    lines.extend(waveforms.into_iter().map(|file| file_line("w", file)));

    let mut auxiliary: Vec<_> = listing.auxiliary.iter().collect();
    auxiliary.sort();
    lines.push(format!("auxiliary {}", auxiliary.len()));
    lines.extend(auxiliary.into_iter().map(|file| file_line("a", file)));

    lines.join("\n")
}

impl Fingerprint {
    pub fn new(listing: &SourceListing, parameters: &AnalysisParameters) -> Self {
        let key = canonical_key(listing, parameters);
        let digest = format!("{:x}", Sha256::digest(key.as_bytes()));
        Self { digest, key }
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.digest)
    }
}
