use benchmark_types::RunDescriptor;
use benchmark_types::MANIFEST_FILE;
use chrono::Local;
use clap::Parser;
use experiment::Experiment;
use std::error::Error;
use std::fs;
use std::path::PathBuf;
use tracing::info;

pub mod experiment;
pub mod run;

/*

# Benchmark runner

Sweeps every workload and worker count of an experiment file. For each combination it writes the manifest, populates the backup database once, and then runs every setup `runs` times against a fresh copy of it:

  <output>/<workload>/<threads>/config.json
  <output>/<workload>/<threads>/<results_dir>/<run>/ycsb.txt
  <output>/<workload>/<threads>/<results_dir>/<run>/dstat.csv

The plotter takes `<output>/<workload>/<threads>` as its input.

*/

#[derive(Parser)]
struct Cli {
  /// Experiment description (YAML).
  experiment: PathBuf,

  /// Output directory. Defaults to `profiling-<month>-<day>-<hour>-<minute>-<second>`.
  #[arg(long)]
  output: Option<PathBuf>,

  /// Setups to run (comma-separated ids). If not specified, runs all setups.
  #[arg(long)]
  setups: Option<String>,

  /// Skips populating the database. Useful when a previous invocation has already loaded the backup with the same workload.
  #[arg(long)]
  skip_load: bool,
}

fn main() -> Result<(), Box<dyn Error>> {
  tracing_subscriber::fmt::init();

  let cli = Cli::parse();
  let experiment: Experiment = serde_yaml::from_str(&fs::read_to_string(&cli.experiment)?)?;
  let output = cli.output.unwrap_or_else(|| {
    PathBuf::from(format!(
      "profiling-{}",
      Local::now().format("%m-%d-%H-%M-%S")
    ))
  });
  let ids: Option<Vec<String>> = cli
    .setups
    .map(|s| s.split(',').map(|s| s.trim().to_string()).collect());
  let setups = experiment.selected_setups(ids.as_deref())?;
  info!(
    output = %output.display(),
    setups = ?setups.iter().map(|s| &s.id).collect::<Vec<_>>(),
    "running experiment"
  );

  fs::create_dir_all(&experiment.db_backup)?;
  for workload in &experiment.workloads {
    for &threads in &experiment.threads {
      let base = experiment.base_config(workload, threads)?;
      let experiment_dir = RunDescriptor::experiment_dir(&output, workload, threads);
      fs::create_dir_all(&experiment_dir)?;
      let manifest = experiment.manifest(workload, &base, &setups)?;
      fs::write(
        experiment_dir.join(MANIFEST_FILE),
        serde_json::to_string_pretty(&manifest)?,
      )?;

      if cli.skip_load {
        info!(workload = %workload, threads, "skipping load");
      } else {
        run::load(&experiment.load_config(&base))?;
      };

      for setup in &setups {
        let config = experiment.setup_config(&base, setup)?;
        for r in 0..experiment.runs {
          info!(setup = %setup.id, workload = %workload, threads, run = r + 1, runs = experiment.runs, "starting run");
          let descriptor = RunDescriptor {
            implementation: setup.results_dir.clone(),
            workload: workload.clone(),
            threads,
            run: r,
          };
          run::execute(&experiment, setup, &config, &descriptor.dir(&output))?;
        }
      }
    }
  }

  info!("experiment complete");
  Ok(())
}
