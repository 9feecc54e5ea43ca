use super::{CacheEntry, CacheEntryInfo, CacheStore, Fingerprint, StoreOutcome, newest_first};
use crate::{error::CacheError, results::AnalysisResults};
use std::{
    fs::{self, File},
    io::{BufReader, BufWriter, ErrorKind, Write},
    path::{Path, PathBuf},
    sync::atomic::{AtomicU64, Ordering},
};
use tracing::{debug, info, warn};

const ENTRY_EXTENSION: &str = "json";
const TEMP_EXTENSION: &str = "tmp";

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Keeps one JSON file per entry in a dedicated directory.
///
/// Entries are written to a hidden temporary file which is then renamed over
/// the entry's path, so a reader only ever sees a complete entry or none.
#[derive(Debug, Clone)]
pub struct DirectoryCache {
    dir: PathBuf,
}

enum Existing {
    Absent,
    Valid(Box<CacheEntry>),
    Corrupt,
}

impl DirectoryCache {
    /// The directory is created on the first store.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, digest: &str) -> PathBuf {
        self.dir.join(format!("{digest}.{ENTRY_EXTENSION}"))
    }

    fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> CacheError + '_ {
        move |source| CacheError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    fn read_entry(path: &Path) -> Result<Existing, CacheError> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Existing::Absent),
            Err(e) => return Err(Self::io_error(path)(e)),
        };
        match serde_json::from_reader::<_, CacheEntry>(BufReader::new(file)) {
            Ok(entry) => Ok(Existing::Valid(Box::new(entry))),
            Err(e) => {
                warn!("Cache entry {} is unreadable: {e}", path.display());
                Ok(Existing::Corrupt)
            }
        }
    }

    fn write_entry(&self, path: &Path, entry: &CacheEntry) -> Result<(), CacheError> {
        fs::create_dir_all(&self.dir).map_err(Self::io_error(&self.dir))?;
        let temp_path = self.dir.join(format!(
            ".{}.{}.{}.{TEMP_EXTENSION}",
            entry.fingerprint.digest,
            std::process::id(),
            TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));

        let result = File::create(&temp_path)
            .map_err(Self::io_error(&temp_path))
            .and_then(|file| {
                let mut writer = BufWriter::new(file);
                serde_json::to_writer(&mut writer, entry)?;
                writer.flush().map_err(Self::io_error(&temp_path))?;
                writer
                    .get_ref()
                    .sync_all()
                    .map_err(Self::io_error(&temp_path))
            })
            .and_then(|_| fs::rename(&temp_path, path).map_err(Self::io_error(path)));

        if result.is_err() {
            // Best effort, the temporary file is never read.
            let _ = fs::remove_file(&temp_path);
        }
        result
    }

    fn entry_paths(&self) -> Result<Vec<PathBuf>, CacheError> {
        let dir = match fs::read_dir(&self.dir) {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Self::io_error(&self.dir)(e)),
        };
        let mut paths = Vec::new();
        for entry in dir {
            let path = entry.map_err(Self::io_error(&self.dir))?.path();
            if path.is_file() {
                paths.push(path);
            }
        }
        Ok(paths)
    }

    fn is_entry(path: &Path) -> bool {
        path.extension().is_some_and(|ext| ext == ENTRY_EXTENSION)
            && !path
                .file_name()
                .is_some_and(|name| name.to_string_lossy().starts_with('.'))
    }

    fn is_temporary(path: &Path) -> bool {
        path.extension().is_some_and(|ext| ext == TEMP_EXTENSION)
            && path
                .file_name()
                .is_some_and(|name| name.to_string_lossy().starts_with('.'))
    }
}

impl CacheStore for DirectoryCache {
    #[tracing::instrument(skip_all, fields(digest = %fingerprint.digest))]
    fn lookup(&self, fingerprint: &Fingerprint) -> Result<Option<AnalysisResults>, CacheError> {
        match Self::read_entry(&self.entry_path(&fingerprint.digest))? {
            Existing::Absent => Ok(None),
            Existing::Corrupt => Err(CacheError::Corrupt(fingerprint.digest.clone())),
            Existing::Valid(entry) if entry.fingerprint.key != fingerprint.key => {
                warn!("Cache entry was written for different inputs, ignoring it");
                Ok(None)
            }
            Existing::Valid(entry) => Ok(Some(entry.results)),
        }
    }

    #[tracing::instrument(skip_all, fields(digest = %fingerprint.digest))]
    fn store(
        &self,
        fingerprint: &Fingerprint,
        results: &AnalysisResults,
    ) -> Result<StoreOutcome, CacheError> {
        let path = self.entry_path(&fingerprint.digest);
        match Self::read_entry(&path)? {
            Existing::Valid(entry) if entry.fingerprint.key == fingerprint.key => {
                debug!("Entry already present");
                return Ok(StoreOutcome::AlreadyPresent);
            }
            Existing::Valid(_) => return Err(CacheError::Collision(fingerprint.digest.clone())),
            Existing::Corrupt => info!("Replacing corrupt entry"),
            Existing::Absent => {}
        }
        let entry = CacheEntry {
            fingerprint: fingerprint.clone(),
            results: results.clone(),
        };
        self.write_entry(&path, &entry)?;
        debug!("Entry stored");
        Ok(StoreOutcome::Stored)
    }

    fn list(&self) -> Result<Vec<CacheEntryInfo>, CacheError> {
        let mut infos = Vec::new();
        for path in self.entry_paths()? {
            if !Self::is_entry(&path) {
                continue;
            }
            if let Existing::Valid(entry) = Self::read_entry(&path)? {
                infos.push(entry.info());
            }
        }
        newest_first(&mut infos);
        Ok(infos)
    }

    #[tracing::instrument(skip_all, fields(dir = %self.dir.display()))]
    fn clear(&self) -> Result<usize, CacheError> {
        let mut removed = 0;
        for path in self.entry_paths()? {
            let is_entry = Self::is_entry(&path);
            if is_entry || Self::is_temporary(&path) {
                fs::remove_file(&path).map_err(Self::io_error(&path))?;
                removed += usize::from(is_entry);
            }
        }
        info!(removed, "Cache cleared");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::results::tests::results;

    fn fingerprint(digest: &str) -> Fingerprint {
        Fingerprint {
            digest: digest.to_owned(),
            key: format!("key for {digest}"),
        }
    }

    #[test]
    fn round_trip_is_exact() {
        let dir = tempfile::tempdir().expect("temp dir should be created");
        let cache = DirectoryCache::new(dir.path().join("cache"));
        let fp = fingerprint("aa11");

        assert!(cache.lookup(&fp).expect("lookup").is_none());
        assert_eq!(cache.store(&fp, &results()).expect("store"), StoreOutcome::Stored);
        assert_eq!(cache.lookup(&fp).expect("lookup"), Some(results()));
        assert!(cache.dir().join("aa11.json").is_file());
    }

    #[test]
    fn valid_entries_are_never_overwritten() {
        let dir = tempfile::tempdir().expect("temp dir should be created");
        let cache = DirectoryCache::new(dir.path());
        let fp = fingerprint("aa11");
        cache.store(&fp, &results()).expect("store");

        let mut other = results();
        other.add_favorite("wave_0.txt");
        assert_eq!(
            cache.store(&fp, &other).expect("store"),
            StoreOutcome::AlreadyPresent
        );
        assert_eq!(cache.lookup(&fp).expect("lookup"), Some(results()));
    }

    #[test]
    fn corrupt_entry_is_reported_then_replaced() {
        let dir = tempfile::tempdir().expect("temp dir should be created");
        let cache = DirectoryCache::new(dir.path());
        let fp = fingerprint("bb22");
        fs::write(dir.path().join("bb22.json"), "{\"fingerprint\": {\"dig").expect("write");

        assert!(matches!(cache.lookup(&fp), Err(CacheError::Corrupt(_))));
        assert!(cache.list().expect("list").is_empty());
        assert_eq!(cache.store(&fp, &results()).expect("store"), StoreOutcome::Stored);
        assert_eq!(cache.lookup(&fp).expect("lookup"), Some(results()));
    }

    #[test]
    fn foreign_key_is_a_miss() {
        let dir = tempfile::tempdir().expect("temp dir should be created");
        let cache = DirectoryCache::new(dir.path());
        cache.store(&fingerprint("cc33"), &results()).expect("store");
        let colliding = Fingerprint {
            digest: "cc33".to_owned(),
            key: "something else".to_owned(),
        };
        assert_eq!(cache.lookup(&colliding).expect("lookup"), None);
        assert!(matches!(
            cache.store(&colliding, &results()),
            Err(CacheError::Collision(_))
        ));
    }

    #[test]
    fn no_temporary_files_remain() {
        let dir = tempfile::tempdir().expect("temp dir should be created");
        let cache = DirectoryCache::new(dir.path());
        cache.store(&fingerprint("dd44"), &results()).expect("store");
        let names: Vec<_> = fs::read_dir(dir.path())
            .expect("read dir")
            .map(|entry| entry.expect("entry").file_name())
            .collect();
        assert_eq!(names, vec!["dd44.json"]);
    }

    #[test]
    fn list_and_clear() {
        let dir = tempfile::tempdir().expect("temp dir should be created");
        let cache = DirectoryCache::new(dir.path());
        assert!(cache.list().expect("list").is_empty());
        cache.store(&fingerprint("ee55"), &results()).expect("store");
        cache.store(&fingerprint("ff66"), &results()).expect("store");
        fs::write(dir.path().join(".ff66.1.2.tmp"), "partial").expect("write");
        fs::write(dir.path().join("notes.md"), "kept").expect("write");

        let listed = cache.list().expect("list");
        assert_eq!(
            listed.iter().map(|info| info.digest.as_str()).collect::<Vec<_>>(),
            vec!["ee55", "ff66"]
        );
        assert_eq!(cache.clear().expect("clear"), 2);
        assert!(cache.list().expect("list").is_empty());
        assert!(dir.path().join("notes.md").is_file());
        assert!(!dir.path().join(".ff66.1.2.tmp").exists());
    }

    #[test]
    fn missing_directory_is_empty() {
        let dir = tempfile::tempdir().expect("temp dir should be created");
        let cache = DirectoryCache::new(dir.path().join("absent"));
        assert!(cache.list().expect("list").is_empty());
        assert_eq!(cache.clear().expect("clear"), 0);
    }
}
