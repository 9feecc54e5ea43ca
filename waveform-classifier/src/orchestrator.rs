//! Maps a function over independent units of work, either on the calling
//! thread or across a worker pool, with cooperative cancellation.
use crate::{error::WorkerFailure, parameters::ExecutionPolicy};
use metrics::counter;
use rayon::{ThreadPool, ThreadPoolBuildError, ThreadPoolBuilder, prelude::*};
use sipm_common::metrics::{
    failures::{self, FailureKind},
    names::FAILURES,
};
use std::{
    any::Any,
    num::NonZeroUsize,
    panic::{self, AssertUnwindSafe},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};
use tracing::{debug, error};

/// A flag shared between the coordinator and whoever may ask it to stop.
///
/// Cancellation is cooperative: work already in progress runs to completion,
/// but no new unit is started once the flag is set.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum UnitOutcome<R> {
    Completed(R),
    Failed(WorkerFailure),
    /// Never started, because cancellation was requested first.
    Skipped,
}

/// The outcome of every unit, in the order the units were supplied.
#[derive(Debug, Clone, PartialEq)]
pub struct MapOutcome<R> {
    pub units: Vec<UnitOutcome<R>>,
}

impl<R> MapOutcome<R> {
    /// True if any unit was skipped.
    pub fn cancelled(&self) -> bool {
        self.skipped() > 0
    }

    pub fn skipped(&self) -> usize {
        self.units
            .iter()
            .filter(|unit| matches!(unit, UnitOutcome::Skipped))
            .count()
    }
}

/// Maps `f` over a collection, preserving input order in the outcome.
pub trait WorkMapper {
    fn map_indexed<T, R, F>(&self, items: &[T], cancel: &CancellationToken, f: F) -> MapOutcome<R>
    where
        T: Sync,
        R: Send,
        F: Fn(usize, &T) -> R + Sync;
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|message| message.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_owned())
}

fn run_unit<T, R, F>(index: usize, item: &T, cancel: &CancellationToken, f: &F) -> UnitOutcome<R>
where
    F: Fn(usize, &T) -> R,
{
    if cancel.is_cancelled() {
        return UnitOutcome::Skipped;
    }
    match panic::catch_unwind(AssertUnwindSafe(|| f(index, item))) {
        Ok(result) => UnitOutcome::Completed(result),
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!(index, "Unit of work panicked: {message}");
            counter!(
                FAILURES,
                &[failures::get_label(FailureKind::WorkerPanicked)]
            )
            .increment(1);
            UnitOutcome::Failed(WorkerFailure { message })
        }
    }
}

/// Runs every unit on the calling thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct Sequential;

impl WorkMapper for Sequential {
    fn map_indexed<T, R, F>(&self, items: &[T], cancel: &CancellationToken, f: F) -> MapOutcome<R>
    where
        T: Sync,
        R: Send,
        F: Fn(usize, &T) -> R + Sync,
    {
        MapOutcome {
            units: items
                .iter()
                .enumerate()
                .map(|(index, item)| run_unit(index, item, cancel, &f))
                .collect(),
        }
    }
}

/// Runs units on a dedicated pool of worker threads.
pub struct ThreadPoolMapper {
    pool: ThreadPool,
}

impl ThreadPoolMapper {
    /// Builds a pool of `threads` workers, or one per available core if `None`.
    pub fn new(threads: Option<NonZeroUsize>) -> Result<Self, ThreadPoolBuildError> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads.map(NonZeroUsize::get).unwrap_or_default())
            .thread_name(|index| format!("waveform-worker-{index}"))
            .build()?;
        Ok(Self { pool })
    }

    pub fn num_threads(&self) -> usize {
        self.pool.current_num_threads()
    }
}

impl WorkMapper for ThreadPoolMapper {
    fn map_indexed<T, R, F>(&self, items: &[T], cancel: &CancellationToken, f: F) -> MapOutcome<R>
    where
        T: Sync,
        R: Send,
        F: Fn(usize, &T) -> R + Sync,
    {
        let units = self.pool.install(|| {
            items
                .par_iter()
                .enumerate()
                .with_max_len(1)
                .map(|(index, item)| run_unit(index, item, cancel, &f))
                .collect()
        });
        MapOutcome { units }
    }
}

/// Chooses between sequential and pooled execution by workload size.
pub struct Orchestrator {
    pool: Option<ThreadPoolMapper>,
    parallel_threshold: usize,
}

impl Orchestrator {
    pub fn new(policy: &ExecutionPolicy) -> Result<Self, ThreadPoolBuildError> {
        let pool = policy
            .parallel
            .then(|| ThreadPoolMapper::new(policy.threads))
            .transpose()?;
        Ok(Self {
            pool,
            parallel_threshold: policy.parallel_threshold,
        })
    }
}

impl WorkMapper for Orchestrator {
    fn map_indexed<T, R, F>(&self, items: &[T], cancel: &CancellationToken, f: F) -> MapOutcome<R>
    where
        T: Sync,
        R: Send,
        F: Fn(usize, &T) -> R + Sync,
    {
        match &self.pool {
            Some(pool) if items.len() > self.parallel_threshold => {
                debug!(
                    units = items.len(),
                    threads = pool.num_threads(),
                    "Dispatching to worker pool"
                );
                pool.map_indexed(items, cancel, f)
            }
            _ => {
                debug!(units = items.len(), "Running sequentially");
                Sequential.map_indexed(items, cancel, f)
            }
        }
    }
}
