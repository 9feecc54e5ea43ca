use anyhow::Result;
use clap::Parser;
use sipm_common::init_tracer;
use std::path::PathBuf;
use strum::IntoEnumIterator;
use tracing::{info, level_filters::LevelFilter};
use waveform_simulator::{SimulationConfig, Truth, write_run};

#[derive(Debug, Parser)]
#[clap(author, version, about)]
struct Cli {
    /// Directory to write the waveform files and run metadata to
    out_dir: PathBuf,

    #[clap(flatten)]
    config: SimulationConfig,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let _tracer = init_tracer!(LevelFilter::INFO);

    let waveforms = write_run(&cli.out_dir, &cli.config)?;
    for truth in Truth::iter() {
        let count = waveforms.iter().filter(|w| w.truth == truth).count();
        info!(%truth, count);
    }
    println!(
        "Wrote {} waveform(s) to {}",
        waveforms.len(),
        cli.out_dir.display()
    );
    Ok(())
}
