//! Parses the optional run metadata file written alongside the waveforms.
//!
//! Each line has the form `key: value [unit]`. Keys are matched exactly,
//! so both the acquisition software's labels and plain English aliases are
//! accepted by the typed accessors.
use sipm_common::{Real, SourceError};
use std::{
    fs::File,
    io::{BufRead, BufReader, Write},
    path::Path,
};

const TIME_BASE_SCALE: &[&str] = &["Time base scale", "time_base_scale"];
const TRIGGER_VOLTAGE: &[&str] = &["Trigger (0.5PE)", "trigger_voltage"];
const SAMPLE_RATE: &[&str] = &["Resolucion(SRATE)", "Sample rate", "sample_rate"];
const NUM_POINTS: &[&str] = &["Num de puntos(real)", "Number of points", "num_points"];
const TEMPERATURE: &[&str] = &["Temperatura", "Temperature", "temperature"];
const DEVICE_MODEL: &[&str] = &["Modelo", "Model", "device_model"];

/// The acquisition window spans this many divisions of the time base.
const DIVISIONS_PER_WINDOW: Real = 10.0;

/// One `key: value [unit]` entry.
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataEntry {
    pub key: String,
    pub value: String,
    pub unit: Option<String>,
}

/// Acquisition setup, in the order the entries appear in the file.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RunMetadata {
    entries: Vec<MetadataEntry>,
}

impl RunMetadata {
    pub fn parse<R: BufRead>(name: &str, reader: R) -> Result<Self, SourceError> {
        let mut entries = Vec::new();
        for line in reader.lines() {
            let line = line.map_err(|source| SourceError::Io {
                name: name.to_owned(),
                source,
            })?;
            let Some((key, rest)) = line.split_once(':') else {
                continue;
            };
            let key = key.trim();
            if key.is_empty() {
                continue;
            }
            let mut rest = rest.split_whitespace();
            let value = rest.next().unwrap_or_default().to_owned();
            let unit = rest.next().map(ToOwned::to_owned);
            entries.push(MetadataEntry {
                key: key.to_owned(),
                value,
                unit,
            });
        }
        Ok(Self { entries })
    }

    #[tracing::instrument(skip_all, fields(path = %path.display()))]
    pub fn load(path: &Path) -> Result<Self, SourceError> {
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();
        let file = File::open(path).map_err(|source| SourceError::Io {
            name: name.clone(),
            source,
        })?;
        let metadata = Self::parse(&name, BufReader::new(file))?;
        tracing::debug!(entries = metadata.entries.len(), "Loaded run metadata");
        Ok(metadata)
    }

    pub fn write(&self, path: &Path) -> std::io::Result<()> {
        let mut file = File::create(path)?;
        for entry in &self.entries {
            match &entry.unit {
                Some(unit) => writeln!(file, "{}: {} {unit}", entry.key, entry.value)?,
                None => writeln!(file, "{}: {}", entry.key, entry.value)?,
            }
        }
        file.flush()
    }

    /// Appends an entry, replacing the value of any existing entry with the same key.
    pub fn set(&mut self, key: &str, value: impl ToString, unit: Option<&str>) {
        let entry = MetadataEntry {
            key: key.to_owned(),
            value: value.to_string(),
            unit: unit.map(ToOwned::to_owned),
        };
        match self.entries.iter_mut().find(|e| e.key == key) {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
    }

    pub fn entries(&self) -> &[MetadataEntry] {
        &self.entries
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.key == key)
            .map(|e| e.value.as_str())
    }

    fn first_of(&self, keys: &[&str]) -> Option<&str> {
        keys.iter().find_map(|key| self.get(key))
    }

    fn real_of(&self, keys: &[&str]) -> Option<Real> {
        self.first_of(keys)
            .and_then(|value| value.parse::<Real>().ok())
            .filter(|value| value.is_finite())
    }

    pub fn time_base_scale(&self) -> Option<Real> {
        self.real_of(TIME_BASE_SCALE)
    }

    /// The full acquisition window, in seconds.
    pub fn window_time(&self) -> Option<Real> {
        self.time_base_scale()
            .map(|scale| scale * DIVISIONS_PER_WINDOW)
    }

    pub fn trigger_voltage(&self) -> Option<Real> {
        self.real_of(TRIGGER_VOLTAGE)
    }

    pub fn sample_rate(&self) -> Option<Real> {
        self.real_of(SAMPLE_RATE)
    }

    pub fn num_points(&self) -> Option<usize> {
        // Some instruments write the count as a float, e.g. "4081.0".
        self.real_of(NUM_POINTS)
            .filter(|points| *points >= 1.0)
            .map(|points| points as usize)
    }

    pub fn temperature(&self) -> Option<Real> {
        self.real_of(TEMPERATURE)
    }

    pub fn device_model(&self) -> Option<&str> {
        self.first_of(DEVICE_MODEL)
    }

    /// The time between samples implied by the metadata, if it implies one.
    pub fn sample_interval(&self) -> Option<Real> {
        let interval = match (self.window_time(), self.num_points()) {
            (Some(window), Some(points)) => window / points as Real,
            _ => 1.0 / self.sample_rate()?,
        };
        (interval.is_finite() && interval > 0.0).then_some(interval)
    }
}
