pub mod names {
    pub const CACHE_LOOKUPS: &str = "sipm_waveform_cache_lookups";
    pub const FAILURES: &str = "sipm_waveform_failures";
    pub const FILES_EXCLUDED: &str = "sipm_waveform_files_excluded";
    pub const FILES_PROCESSED: &str = "sipm_waveform_files_processed";
    pub const RUNS_COMPLETED: &str = "sipm_waveform_runs_completed";
}

pub fn describe_metrics() {
    metrics::describe_counter!(
        names::CACHE_LOOKUPS,
        metrics::Unit::Count,
        "Number of cache lookups, by outcome"
    );
    metrics::describe_counter!(
        names::FAILURES,
        metrics::Unit::Count,
        "Number of failures encountered"
    );
    metrics::describe_counter!(
        names::FILES_EXCLUDED,
        metrics::Unit::Count,
        "Number of waveform files excluded from classification, by reason"
    );
    metrics::describe_counter!(
        names::FILES_PROCESSED,
        metrics::Unit::Count,
        "Number of waveform files classified"
    );
    metrics::describe_counter!(
        names::RUNS_COMPLETED,
        metrics::Unit::Count,
        "Number of analysis runs completed"
    );
}

pub mod cache_lookups {
    #[derive(Debug, Clone, Copy, Eq, Hash, PartialEq)]
    pub enum LookupOutcome {
        Hit,
        Miss,
        Corrupt,
    }

    // Label building function
    pub fn get_label(outcome: LookupOutcome) -> (&'static str, &'static str) {
        (
            "outcome",
            match outcome {
                LookupOutcome::Hit => "hit",
                LookupOutcome::Miss => "miss",
                LookupOutcome::Corrupt => "corrupt",
            },
        )
    }
}

pub mod files_excluded {
    #[derive(Debug, Clone, Copy, Eq, Hash, PartialEq)]
    pub enum ExclusionKind {
        Unreadable,
        Malformed,
        WorkerFailure,
        NotProcessed,
    }

    // Label building function
    pub fn get_label(kind: ExclusionKind) -> (&'static str, &'static str) {
        (
            "reason",
            match kind {
                ExclusionKind::Unreadable => "unreadable",
                ExclusionKind::Malformed => "malformed",
                ExclusionKind::WorkerFailure => "worker_failure",
                ExclusionKind::NotProcessed => "not_processed",
            },
        )
    }
}

pub mod failures {
    #[derive(Debug, Clone, Copy, Eq, Hash, PartialEq)]
    pub enum FailureKind {
        CacheCorruption,
        CacheWriteFailed,
        EstimationFailed,
        WorkerPanicked,
    }

    // Label building function
    pub fn get_label(failure_kind: FailureKind) -> (&'static str, &'static str) {
        (
            "failure_kind",
            match failure_kind {
                FailureKind::CacheCorruption => "cache_corruption",
                FailureKind::CacheWriteFailed => "cache_write_failed",
                FailureKind::EstimationFailed => "estimation_failed",
                FailureKind::WorkerPanicked => "worker_panicked",
            },
        )
    }
}
