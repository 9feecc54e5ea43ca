use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use itertools::Itertools;
use sipm_common::{init_tracer, metrics::describe_metrics};
use std::path::PathBuf;
use tracing::{error, info, level_filters::LevelFilter, warn};
use waveform_classifier::{
    AnalysisEngine, AnalysisParameterArgs, AnalysisResults, CacheStore,
    CancellationToken, DirectoryCache, ExecutionPolicy, MemoryCache, RunOutcome,
    results::ExclusionReason,
};
use waveform_reader::DirectorySource;

#[derive(Debug, Parser)]
#[clap(author, version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Classify every waveform in a directory
    Analyse(Analyse),

    /// Inspect or empty the results cache
    #[command(subcommand)]
    Cache(CacheCommand),
}

#[derive(Debug, Args)]
struct Analyse {
    /// Directory of waveform files
    dir: PathBuf,

    /// Glob selecting the waveform files within the directory
    #[clap(long)]
    pattern: Option<String>,

    /// Directory holding cached results
    #[clap(long, env = "SIPM_CACHE_DIR", default_value = ".cache")]
    cache_dir: PathBuf,

    /// Neither read nor write the results cache
    #[clap(long)]
    no_cache: bool,

    #[clap(flatten)]
    parameters: AnalysisParameterArgs,

    #[clap(flatten)]
    execution: ExecutionPolicy,
}

#[derive(Debug, Args)]
struct CacheDir {
    /// Directory holding cached results
    #[clap(long, env = "SIPM_CACHE_DIR", default_value = ".cache")]
    cache_dir: PathBuf,
}

#[derive(Debug, Subcommand)]
enum CacheCommand {
    /// List cached runs, newest first
    List(CacheDir),

    /// Remove every cached run
    Clear(CacheDir),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let _tracer = init_tracer!(LevelFilter::INFO);
    describe_metrics();

    match cli.command {
        Command::Analyse(args) => analyse(args).await,
        Command::Cache(CacheCommand::List(args)) => list_cache(&DirectoryCache::new(args.cache_dir)),
        Command::Cache(CacheCommand::Clear(args)) => {
            let removed = DirectoryCache::new(&args.cache_dir).clear()?;
            println!("Removed {removed} cached run(s) from {}", args.cache_dir.display());
            Ok(())
        }
    }
}

async fn analyse(args: Analyse) -> Result<()> {
    let mut source = DirectorySource::new(&args.dir)?;
    if let Some(pattern) = &args.pattern {
        source = source.with_pattern(pattern)?;
    }
    let cache: Box<dyn CacheStore> = if args.no_cache {
        Box::new(MemoryCache::new())
    } else {
        Box::new(DirectoryCache::new(&args.cache_dir))
    };
    let engine = AnalysisEngine::from_args(args.parameters, &args.execution, cache)?;

    let cancel = CancellationToken::new();
    let mut run = tokio::task::spawn_blocking({
        let cancel = cancel.clone();
        move || engine.run(&source, &cancel)
    });

    let outcome = tokio::select! {
        outcome = &mut run => outcome,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, finishing work in progress");
            cancel.cancel();
            run.await
        }
    };
    let outcome = outcome.context("Analysis task terminated abnormally")?;

    match outcome {
        Ok(outcome) => {
            print_report(&outcome);
            Ok(())
        }
        Err(e) => {
            error!("{e}");
            Err(e.into())
        }
    }
}

fn print_report(RunOutcome { results, from_cache }: &RunOutcome) {
    let metadata = results.metadata();
    if *from_cache {
        info!(created = %metadata.created, "Results served from cache");
    }
    println!("{}", results.summary());

    let thresholds = results.thresholds();
    println!("Baseline band:   {} V", thresholds.baseline);
    println!("Main zone:       {} s", thresholds.main_zone);
    match &thresholds.afterpulse {
        Some(band) => println!("Afterpulse zone: {band} s"),
        None => println!("Afterpulse zone: none observed"),
    }
    println!("Total peaks:     {}", results.total_peaks());
    println!(
        "Rejected with multiple peaks: {}",
        results.rejected_with_multiple_peaks().count()
    );

    print_exclusions(results);
}

fn print_exclusions(results: &AnalysisResults) {
    let exclusions = results.exclusions();
    if exclusions.is_empty() {
        return;
    }
    let counts = exclusions.iter().counts_by(|exclusion| exclusion.reason);
    println!(
        "Excluded: {}",
        counts
            .iter()
            .sorted_by_key(|(reason, _)| reason.to_string())
            .map(|(reason, count)| format!("{count} {reason}"))
            .join(", ")
    );
    for exclusion in exclusions
        .iter()
        .filter(|exclusion| exclusion.reason != ExclusionReason::NotProcessed)
    {
        println!(
            "  {} [{}]: {}",
            exclusion.file.name, exclusion.reason, exclusion.detail
        );
    }
}

fn list_cache(cache: &DirectoryCache) -> Result<()> {
    let entries = cache.list()?;
    if entries.is_empty() {
        println!("No cached runs in {}", cache.dir().display());
        return Ok(());
    }
    for entry in entries {
        println!(
            "{}  {}  {} file(s)  {}",
            entry.created.format("%Y-%m-%d %H:%M:%S"),
            entry.digest,
            entry.file_count,
            serde_json::to_string(&entry.parameters)?
        );
    }
    Ok(())
}
