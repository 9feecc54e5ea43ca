//! The two-phase analysis of one source.
//!
//! Phase 1 gathers statistics from every waveform and estimates the global
//! thresholds. Only once it has finished for all waveforms does phase 2
//! classify each waveform against those thresholds.
use crate::{
    cache::{CacheStore, Fingerprint, StoreOutcome},
    classifier::{Classifier, WaveformResult},
    error::{AnalysisError, CacheError, ClassificationError},
    orchestrator::{CancellationToken, Orchestrator, UnitOutcome, WorkMapper},
    parameters::{AnalysisParameterArgs, AnalysisParameters, ExecutionPolicy},
    results::{AnalysisResults, Exclusion, ExclusionReason, RunMetadata},
    thresholds::{AggregateStatistics, Thresholds, WaveformStatistics},
};
use chrono::Utc;
use metrics::counter;
use sipm_common::{
    FileIdentity, SourceError, Waveform, WaveformSource,
    metrics::{
        cache_lookups::{self, LookupOutcome},
        failures::{self, FailureKind},
        files_excluded::{self, ExclusionKind},
        names::{CACHE_LOOKUPS, FAILURES, FILES_EXCLUDED, FILES_PROCESSED, RUNS_COMPLETED},
    },
};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub results: AnalysisResults,
    pub from_cache: bool,
}

struct Loaded<'a> {
    index: usize,
    file: &'a FileIdentity,
    waveform: Waveform,
}

fn exclusion_kind(reason: ExclusionReason) -> ExclusionKind {
    match reason {
        ExclusionReason::Unreadable => ExclusionKind::Unreadable,
        ExclusionReason::Malformed => ExclusionKind::Malformed,
        ExclusionReason::WorkerFailure => ExclusionKind::WorkerFailure,
        ExclusionReason::NotProcessed => ExclusionKind::NotProcessed,
    }
}

fn source_reason(error: &SourceError) -> ExclusionReason {
    match error {
        SourceError::Parse { .. } | SourceError::Malformed { .. } => ExclusionReason::Malformed,
        SourceError::Listing { .. } | SourceError::Pattern(_) | SourceError::Io { .. } => {
            ExclusionReason::Unreadable
        }
    }
}

/// Collects the files which drop out of a run, logging each one as it goes.
#[derive(Default)]
struct Exclusions(Vec<Exclusion>);

impl Exclusions {
    fn push(&mut self, index: usize, file: &FileIdentity, reason: ExclusionReason, detail: String) {
        match reason {
            ExclusionReason::NotProcessed => debug!(file = %file.name, "Not processed"),
            _ => warn!(file = %file.name, %reason, "Excluded: {detail}"),
        }
        counter!(FILES_EXCLUDED, &[files_excluded::get_label(exclusion_kind(reason))]).increment(1);
        self.0.push(Exclusion {
            index,
            file: file.clone(),
            reason,
            detail,
        });
    }

    fn not_processed(&mut self, index: usize, file: &FileIdentity) {
        self.push(
            index,
            file,
            ExclusionReason::NotProcessed,
            "Run cancelled".to_owned(),
        );
    }

    fn is_complete(&self) -> bool {
        !self
            .0
            .iter()
            .any(|exclusion| exclusion.reason == ExclusionReason::NotProcessed)
    }
}

/// Runs analyses with fixed parameters, consulting and populating a cache.
pub struct AnalysisEngine<C, M = Orchestrator> {
    parameters: AnalysisParameters,
    mapper: M,
    cache: C,
}

impl<C: CacheStore> AnalysisEngine<C> {
    pub fn new(
        parameters: AnalysisParameters,
        policy: &ExecutionPolicy,
        cache: C,
    ) -> Result<Self, AnalysisError> {
        Ok(Self::with_mapper(parameters, Orchestrator::new(policy)?, cache))
    }

    /// Validates `args` before building the engine.
    /// # Error Modes
    /// - Emits [AnalysisError::Configuration] if any parameter is out of range.
    pub fn from_args(
        args: AnalysisParameterArgs,
        policy: &ExecutionPolicy,
        cache: C,
    ) -> Result<Self, AnalysisError> {
        Self::new(AnalysisParameters::try_from(args)?, policy, cache)
    }
}

impl<C: CacheStore, M: WorkMapper> AnalysisEngine<C, M> {
    /// Builds an engine which runs both phases through `mapper`.
    pub fn with_mapper(parameters: AnalysisParameters, mapper: M, cache: C) -> Self {
        Self {
            parameters,
            mapper,
            cache,
        }
    }

    pub fn parameters(&self) -> &AnalysisParameters {
        &self.parameters
    }

    pub fn cache(&self) -> &C {
        &self.cache
    }

    /// Analyses every waveform in `source`, or returns the cached results of an
    /// identical earlier run.
    /// # Error Modes
    /// - Emits [AnalysisError::Source] if the source cannot be listed.
    /// - Emits [AnalysisError::Estimation] if no valid waveform reaches phase 1.
    /// - Emits [AnalysisError::Cancelled] if cancellation leaves phase 1 with no statistics.
    ///
    /// Problems with individual files never fail the run, they are recorded
    /// as exclusions in the results instead.
    #[tracing::instrument(skip_all, fields(num_files, digest, from_cache))]
    pub fn run<S: WaveformSource + ?Sized>(
        &self,
        source: &S,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, AnalysisError> {
        let listing = source.list()?;
        let fingerprint = Fingerprint::new(&listing, &self.parameters);
        let span = tracing::Span::current();
        span.record("num_files", listing.waveforms.len());
        span.record("digest", fingerprint.digest.as_str());

        if let Some(results) = self.lookup(&fingerprint) {
            span.record("from_cache", true);
            info!("Serving results from cache");
            return Ok(RunOutcome {
                results,
                from_cache: true,
            });
        }
        span.record("from_cache", false);

        let mut exclusions = Exclusions::default();
        let (loaded, statistics) = self.gather(source, &listing.waveforms, cancel, &mut exclusions);
        let thresholds = match Thresholds::estimate(&statistics, &self.parameters) {
            Ok(thresholds) => thresholds,
            Err(_) if cancel.is_cancelled() && statistics.waveform_count == 0 => {
                return Err(AnalysisError::Cancelled);
            }
            Err(e) => {
                counter!(
                    FAILURES,
                    &[failures::get_label(FailureKind::EstimationFailed)]
                )
                .increment(1);
                return Err(e.into());
            }
        };
        let results = self.classify_all(&loaded, &thresholds, cancel, &mut exclusions);

        let complete = exclusions.is_complete();
        counter!(FILES_PROCESSED).increment(results.len() as u64);
        let results = AnalysisResults::new(
            results,
            exclusions.0,
            thresholds,
            RunMetadata {
                parameters: self.parameters.clone(),
                file_count: listing.waveforms.len(),
                created: Utc::now(),
                fingerprint: fingerprint.digest.clone(),
                complete,
            },
        );
        info!("{}", results.summary());

        if complete {
            self.store(&fingerprint, &results);
        } else {
            warn!("Run was cancelled, results are partial and will not be cached");
        }
        counter!(RUNS_COMPLETED).increment(1);
        Ok(RunOutcome {
            results,
            from_cache: false,
        })
    }

    fn lookup(&self, fingerprint: &Fingerprint) -> Option<AnalysisResults> {
        let (outcome, results) = match self.cache.lookup(fingerprint) {
            Ok(Some(results)) => (LookupOutcome::Hit, Some(results)),
            Ok(None) => (LookupOutcome::Miss, None),
            Err(e @ CacheError::Corrupt(_)) => {
                warn!("{e}, recomputing");
                counter!(
                    FAILURES,
                    &[failures::get_label(FailureKind::CacheCorruption)]
                )
                .increment(1);
                (LookupOutcome::Corrupt, None)
            }
            Err(e) => {
                warn!("Cache lookup failed, recomputing: {e}");
                (LookupOutcome::Miss, None)
            }
        };
        counter!(CACHE_LOOKUPS, &[cache_lookups::get_label(outcome)]).increment(1);
        results
    }

    fn store(&self, fingerprint: &Fingerprint, results: &AnalysisResults) {
        match self.cache.store(fingerprint, results) {
            Ok(StoreOutcome::Stored) => debug!("Results cached"),
            Ok(StoreOutcome::AlreadyPresent) => debug!("Results were already cached"),
            Err(e) => {
                warn!("Cannot cache results: {e}");
                counter!(
                    FAILURES,
                    &[failures::get_label(FailureKind::CacheWriteFailed)]
                )
                .increment(1);
            }
        }
    }

    /// Reads, validates and summarises every file in one pass of the mapper.
    /// Each waveform is kept for classification.
    #[tracing::instrument(skip_all, fields(num_files = files.len()))]
    fn gather<'a, S: WaveformSource + ?Sized>(
        &self,
        source: &S,
        files: &'a [FileIdentity],
        cancel: &CancellationToken,
        exclusions: &mut Exclusions,
    ) -> (Vec<Loaded<'a>>, AggregateStatistics) {
        let parameters = &self.parameters;
        let outcome = self.mapper.map_indexed(files, cancel, |_, file| {
            let waveform = source.read(file)?;
            waveform
                .validate()
                .map_err(|source| SourceError::Malformed {
                    name: file.name.clone(),
                    source,
                })?;
            let statistics = WaveformStatistics::collect(&waveform, parameters);
            Ok::<_, SourceError>((waveform, statistics))
        });

        // Every waveform's statistics are in hand before any threshold is estimated.
        let mut loaded = Vec::with_capacity(files.len());
        let mut aggregate = AggregateStatistics::default();
        for (index, (file, unit)) in files.iter().zip(outcome.units).enumerate() {
            match unit {
                UnitOutcome::Completed(Ok((waveform, statistics))) => {
                    aggregate.push(statistics);
                    loaded.push(Loaded {
                        index,
                        file,
                        waveform,
                    });
                }
                UnitOutcome::Completed(Err(e)) => {
                    exclusions.push(index, file, source_reason(&e), e.to_string())
                }
                UnitOutcome::Failed(e) => {
                    exclusions.push(index, file, ExclusionReason::WorkerFailure, e.to_string())
                }
                UnitOutcome::Skipped => exclusions.not_processed(index, file),
            }
        }
        (loaded, aggregate)
    }

    #[tracing::instrument(skip_all, fields(num_waveforms = loaded.len()))]
    fn classify_all(
        &self,
        loaded: &[Loaded<'_>],
        thresholds: &Thresholds,
        cancel: &CancellationToken,
        exclusions: &mut Exclusions,
    ) -> Vec<WaveformResult> {
        let classifier = Classifier::new(&self.parameters, thresholds);
        let outcome = self.mapper.map_indexed(loaded, cancel, |_, item| {
            classifier.classify(item.index, item.file, &item.waveform)
        });

        let mut results = Vec::with_capacity(loaded.len());
        for (item, unit) in loaded.iter().zip(outcome.units) {
            match unit {
                UnitOutcome::Completed(Ok(result)) => results.push(result),
                UnitOutcome::Completed(Err(ClassificationError::Malformed(e))) => exclusions.push(
                    item.index,
                    item.file,
                    ExclusionReason::Malformed,
                    e.to_string(),
                ),
                UnitOutcome::Failed(e) => exclusions.push(
                    item.index,
                    item.file,
                    ExclusionReason::WorkerFailure,
                    e.to_string(),
                ),
                UnitOutcome::Skipped => exclusions.not_processed(item.index, item.file),
            }
        }
        results
    }
}
