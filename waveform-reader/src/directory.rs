use crate::{loader::load_waveform_file, metadata::RunMetadata};
use glob::{MatchOptions, Pattern};
use sipm_common::{
    FileIdentity, RUN_METADATA_FILE_NAME, SourceError, SourceListing, Waveform, WaveformSource,
};
use std::{
    fs,
    path::{Path, PathBuf},
    time::UNIX_EPOCH,
};
use tracing::{debug, warn};

const DEFAULT_PATTERN: &str = "*.txt";

/// Supplies every waveform file in one directory, in file name order.
pub struct DirectorySource {
    dir: PathBuf,
    pattern: String,
    metadata: Option<RunMetadata>,
}

impl DirectorySource {
    /// Opens `dir`, loading its run metadata file if there is one.
    /// # Error Modes
    /// - Emits [SourceError::Listing] if `dir` is not a readable directory.
    /// - Emits [SourceError::Io] if the run metadata file exists but cannot be read.
    #[tracing::instrument(skip_all, fields(dir = %dir.as_ref().display()))]
    pub fn new(dir: impl AsRef<Path>) -> Result<Self, SourceError> {
        let dir = dir.as_ref().to_path_buf();
        fs::read_dir(&dir).map_err(|source| SourceError::Listing {
            path: dir.clone(),
            source,
        })?;

        let metadata_path = dir.join(RUN_METADATA_FILE_NAME);
        let metadata = if metadata_path.is_file() {
            Some(RunMetadata::load(&metadata_path)?)
        } else {
            debug!("No run metadata found, sample interval will be inferred per file");
            None
        };

        Ok(Self {
            dir,
            pattern: DEFAULT_PATTERN.to_owned(),
            metadata,
        })
    }

    /// Restricts the listing to file names matching `pattern`.
    pub fn with_pattern(mut self, pattern: &str) -> Result<Self, SourceError> {
        Pattern::new(pattern).map_err(|e| SourceError::Pattern(e.to_string()))?;
        self.pattern = pattern.to_owned();
        Ok(self)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn metadata(&self) -> Option<&RunMetadata> {
        self.metadata.as_ref()
    }

    fn name_of(&self, path: &Path) -> String {
        path.strip_prefix(&self.dir)
            .unwrap_or(path)
            .to_string_lossy()
            .to_string()
    }

    fn identify(&self, path: &Path, metadata: &fs::Metadata) -> FileIdentity {
        let modified_ns = metadata
            .modified()
            .ok()
            .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
            .map(|duration| duration.as_nanos())
            .unwrap_or_default();
        FileIdentity::new(self.name_of(path), metadata.len(), modified_ns)
    }

    /// Identity of a file which matched the pattern but could not be inspected.
    /// Reading it reports the underlying error.
    fn unidentified(&self, path: &Path) -> FileIdentity {
        FileIdentity::new(self.name_of(path), 0, 0)
    }
}

impl WaveformSource for DirectorySource {
    #[tracing::instrument(skip_all, fields(dir = %self.dir.display(), num_files))]
    fn list(&self) -> Result<SourceListing, SourceError> {
        let pattern = format!(
            "{}/{}",
            Pattern::escape(&self.dir.to_string_lossy()),
            self.pattern
        );
        let options = MatchOptions {
            require_literal_leading_dot: true,
            ..Default::default()
        };
        let paths = glob::glob_with(&pattern, options)
            .map_err(|e| SourceError::Pattern(e.to_string()))?;

        let mut waveforms = Vec::new();
        for entry in paths {
            let path = match entry {
                Ok(path) => path,
                Err(e) => {
                    warn!("Cannot inspect {}: {}", e.path().display(), e.error());
                    waveforms.push(self.unidentified(e.path()));
                    continue;
                }
            };
            if path
                .file_name()
                .is_some_and(|name| name == RUN_METADATA_FILE_NAME)
            {
                continue;
            }
            match fs::metadata(&path) {
                Ok(metadata) if metadata.is_file() => {
                    waveforms.push(self.identify(&path, &metadata))
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("Cannot inspect {}: {e}", path.display());
                    waveforms.push(self.unidentified(&path));
                }
            }
        }
        waveforms.sort_by(|a, b| a.name.cmp(&b.name));
        tracing::Span::current().record("num_files", waveforms.len());

        let metadata_path = self.dir.join(RUN_METADATA_FILE_NAME);
        let auxiliary = match fs::metadata(&metadata_path) {
            Ok(metadata) if metadata.is_file() => vec![self.identify(&metadata_path, &metadata)],
            _ => Vec::new(),
        };

        Ok(SourceListing {
            waveforms,
            auxiliary,
        })
    }

    fn read(&self, file: &FileIdentity) -> Result<Waveform, SourceError> {
        let waveform_file = load_waveform_file(&self.dir.join(&file.name)).map_err(|e| match e {
            SourceError::Io { source, .. } => SourceError::Io {
                name: file.name.clone(),
                source,
            },
            other => other,
        })?;
        Ok(waveform_file.into_waveform(self.metadata.as_ref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::write_waveform_file;
    use assert_approx_eq::assert_approx_eq;

    fn populate(dir: &Path) {
        for i in [2, 0, 1] {
            write_waveform_file(
                &dir.join(format!("run_{i}.txt")),
                1e-6,
                &[0.0, i as f64, 0.0, 0.0],
            )
            .expect("waveform should be written");
        }
        fs::write(dir.join(".hidden.txt"), "1e-06\n1\n0.0\n").expect("hidden file");
        fs::write(dir.join("notes.csv"), "not a waveform").expect("notes file");
    }

    #[test]
    fn lists_in_name_order() {
        let dir = tempfile::tempdir().expect("temp dir should be created");
        populate(dir.path());

        let source = DirectorySource::new(dir.path()).expect("source should open");
        let listing = source.list().expect("listing should succeed");
        let names: Vec<_> = listing.waveforms.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["run_0.txt", "run_1.txt", "run_2.txt"]);
        assert!(listing.auxiliary.is_empty());
    }

    #[test]
    fn metadata_is_auxiliary_and_sets_interval() {
        let dir = tempfile::tempdir().expect("temp dir should be created");
        populate(dir.path());
        fs::write(
            dir.path().join(RUN_METADATA_FILE_NAME),
            "Time base scale: 2e-7 s\nNum de puntos(real): 4\n",
        )
        .expect("metadata should be written");

        let source = DirectorySource::new(dir.path()).expect("source should open");
        let listing = source.list().expect("listing should succeed");
        assert_eq!(listing.waveforms.len(), 3);
        assert_eq!(listing.auxiliary.len(), 1);
        assert_eq!(listing.auxiliary[0].name, RUN_METADATA_FILE_NAME);

        let waveform = source
            .read(&listing.waveforms[1])
            .expect("waveform should be read");
        assert_approx_eq!(waveform.sample_interval(), 5e-7);
        assert_eq!(waveform.samples(), &[0.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn custom_pattern() {
        let dir = tempfile::tempdir().expect("temp dir should be created");
        populate(dir.path());

        let source = DirectorySource::new(dir.path())
            .and_then(|source| source.with_pattern("run_[01].txt"))
            .expect("source should open");
        let listing = source.list().expect("listing should succeed");
        assert_eq!(listing.waveforms.len(), 2);
    }

    #[test]
    fn invalid_pattern() {
        let dir = tempfile::tempdir().expect("temp dir should be created");
        let result = DirectorySource::new(dir.path()).and_then(|s| s.with_pattern("run_[.txt"));
        assert!(matches!(result, Err(SourceError::Pattern(_))));
    }

    #[test]
    fn missing_directory() {
        let dir = tempfile::tempdir().expect("temp dir should be created");
        let result = DirectorySource::new(dir.path().join("absent"));
        assert!(matches!(result, Err(SourceError::Listing { .. })));
    }

    #[test]
    fn identity_tracks_size() {
        let dir = tempfile::tempdir().expect("temp dir should be created");
        populate(dir.path());
        let source = DirectorySource::new(dir.path()).expect("source should open");
        let before = source.list().expect("listing should succeed");

        write_waveform_file(&dir.path().join("run_0.txt"), 1e-6, &[0.0; 40])
            .expect("waveform should be rewritten");
        let after = source.list().expect("listing should succeed");
        assert_ne!(before.waveforms[0], after.waveforms[0]);
        assert_eq!(before.waveforms[1..], after.waveforms[1..]);
    }

    #[cfg(unix)]
    #[test]
    fn uninspectable_file_is_listed_and_fails_to_read() {
        let dir = tempfile::tempdir().expect("temp dir should be created");
        populate(dir.path());
        std::os::unix::fs::symlink(dir.path().join("absent.txt"), dir.path().join("run_3.txt"))
            .expect("symlink should be created");

        let source = DirectorySource::new(dir.path()).expect("source should open");
        let listing = source.list().expect("listing should succeed");
        let names: Vec<_> = listing.waveforms.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["run_0.txt", "run_1.txt", "run_2.txt", "run_3.txt"]);
        assert_eq!(listing.waveforms[3], FileIdentity::new("run_3.txt", 0, 0));
        assert!(matches!(
            source.read(&listing.waveforms[3]),
            Err(SourceError::Io { .. })
        ));
    }
}
