use super::{CacheEntry, CacheEntryInfo, CacheStore, Fingerprint, StoreOutcome, newest_first};
use crate::{error::CacheError, results::AnalysisResults};
use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard, PoisonError},
};

/// Keeps entries in memory for the lifetime of the process.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        // The map is never left half-updated, so a poisoned lock is still usable.
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}

impl CacheStore for MemoryCache {
    fn lookup(&self, fingerprint: &Fingerprint) -> Result<Option<AnalysisResults>, CacheError> {
        Ok(self
            .entries()
            .get(&fingerprint.digest)
            .filter(|entry| entry.fingerprint.key == fingerprint.key)
            .map(|entry| entry.results.clone()))
    }

    fn store(
        &self,
        fingerprint: &Fingerprint,
        results: &AnalysisResults,
    ) -> Result<StoreOutcome, CacheError> {
        let mut entries = self.entries();
        if let Some(existing) = entries.get(&fingerprint.digest) {
            if existing.fingerprint.key != fingerprint.key {
                return Err(CacheError::Collision(fingerprint.digest.clone()));
            }
            return Ok(StoreOutcome::AlreadyPresent);
        }
        entries.insert(
            fingerprint.digest.clone(),
            CacheEntry {
                fingerprint: fingerprint.clone(),
                results: results.clone(),
            },
        );
        Ok(StoreOutcome::Stored)
    }

    fn list(&self) -> Result<Vec<CacheEntryInfo>, CacheError> {
        let mut infos: Vec<_> = self.entries().values().map(CacheEntry::info).collect();
        newest_first(&mut infos);
        Ok(infos)
    }

    fn clear(&self) -> Result<usize, CacheError> {
        let mut entries = self.entries();
        let count = entries.len();
        entries.clear();
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::results::tests::results;

    fn fingerprint(digest: &str, key: &str) -> Fingerprint {
        Fingerprint {
            digest: digest.to_owned(),
            key: key.to_owned(),
        }
    }

    #[test]
    fn round_trip() {
        let cache = MemoryCache::new();
        let fp = fingerprint("d1", "k1");
        assert_eq!(cache.lookup(&fp).expect("lookup"), None);
        assert_eq!(cache.store(&fp, &results()).expect("store"), StoreOutcome::Stored);
        assert_eq!(cache.lookup(&fp).expect("lookup"), Some(results()));
    }

    #[test]
    fn entries_are_immutable() {
        let cache = MemoryCache::new();
        let fp = fingerprint("d1", "k1");
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
    fn key_mismatch_is_a_miss() {
        let cache = MemoryCache::new();
        cache.store(&fingerprint("d1", "k1"), &results()).expect("store");
        let colliding = fingerprint("d1", "k2");
        assert_eq!(cache.lookup(&colliding).expect("lookup"), None);
        assert!(matches!(
            cache.store(&colliding, &results()),
            Err(CacheError::Collision(_))
        ));
    }

    #[test]
    fn list_and_clear() {
        let cache = MemoryCache::new();
        cache.store(&fingerprint("d1", "k1"), &results()).expect("store");
        cache.store(&fingerprint("d2", "k2"), &results()).expect("store");
        let listed = cache.list().expect("list");
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].file_count, 6);
        assert_eq!(cache.clear().expect("clear"), 2);
        assert!(cache.is_empty());
    }
}
