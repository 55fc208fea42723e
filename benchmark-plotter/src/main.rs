use benchmark_plotter::render::ChartsRsSink;
use benchmark_plotter::report::load_manifest;
use benchmark_plotter::report::render_report;
use clap::Parser;
use std::error::Error;
use std::fs;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
struct Cli {
  /// Experiment directory written by the runner, i.e. `<output>/<workload>/<threads>`.
  experiment: PathBuf,

  /// Where to write the charts. Defaults to the experiment directory.
  #[arg(long)]
  output: Option<PathBuf>,
}

fn main() -> Result<(), Box<dyn Error>> {
  tracing_subscriber::fmt::init();

  let cli = Cli::parse();
  let output = cli.output.unwrap_or_else(|| cli.experiment.clone());
  fs::create_dir_all(&output)?;

  let manifest = load_manifest(&cli.experiment)?;
  info!(
    workload = %manifest.workload,
    implementations = manifest.implementations.len(),
    runs = manifest.runs,
    "loaded manifest"
  );

  let mut sink = ChartsRsSink::new();
  let summary = render_report(&manifest, &cli.experiment, &output, &mut sink)?;

  let index = output.join("index.html");
  fs::write(&index, sink.index(&output).into_string())?;
  info!(
    rendered = ?summary.rendered,
    skipped = ?summary.skipped,
    charts = sink.written().len(),
    index = %index.display(),
    "report complete"
  );
  Ok(())
}
