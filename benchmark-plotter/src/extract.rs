use crate::dstat;
use crate::metric::LatencyStat;
use crate::metric::Metric;
use crate::series::average_runs;
use crate::series::fit;
use crate::series::per_tick_deltas;
use crate::series::ratio;
use crate::series::zero_from;
use crate::status;
use crate::status::Scope;
use crate::status::Snapshot;
use crate::ExtractError;
use ahash::HashMap;
use benchmark_types::run_dir;
use benchmark_types::Manifest;
use benchmark_types::DSTAT_FILE;
use benchmark_types::STATUS_LOG_FILE;
use std::fs;
use std::io;
use std::path::Path;
use tracing::debug;

/*

# Extraction

Every run of an implementation is read in lockstep: the i-th snapshot of each run forms tick i, and ticks stop at the shortest run. A value that is absent from a run's snapshot contributes 0 to the tick but still counts towards the number of runs it is averaged over.

Counters (hits, reads, operations) are cumulative, so they are averaged first and then differenced into per-tick rates. Latencies describe the interval itself and are used as is.

*/

#[derive(Clone, Debug, Default, PartialEq)]
pub struct MetricSeries {
  /// Empty for metrics that are only measured machine-wide.
  pub per_worker: Vec<Vec<f64>>,
  pub overall: Vec<f64>,
}

#[derive(Clone, Debug, Default)]
pub struct ImplementationMetrics {
  metrics: HashMap<Metric, MetricSeries>,
}

impl ImplementationMetrics {
  pub fn get(&self, metric: Metric) -> Option<&MetricSeries> {
    self.metrics.get(&metric)
  }

  pub fn insert(&mut self, metric: Metric, series: MetricSeries) {
    self.metrics.insert(metric, series);
  }
}

fn read_file(path: &Path) -> Result<String, ExtractError> {
  fs::read_to_string(path).map_err(|source| match source.kind() {
    io::ErrorKind::NotFound => ExtractError::MissingFile(path.to_path_buf()),
    _ => ExtractError::Io {
      path: path.to_path_buf(),
      source,
    },
  })
}

/// Parsed status logs of every run under `results_dir`.
pub fn read_status_logs(results_dir: &Path, runs: usize) -> Result<Vec<Vec<Snapshot>>, ExtractError> {
  (0..runs)
    .map(|run| {
      let path = run_dir(results_dir, run).join(STATUS_LOG_FILE);
      let snapshots = status::parse_log(&read_file(&path)?);
      debug!(path = %path.display(), snapshots = snapshots.len(), "read status log");
      Ok(snapshots)
    })
    .collect()
}

/// User CPU samples of every run under `results_dir`.
pub fn read_dstat_logs(results_dir: &Path, runs: usize) -> Result<Vec<Vec<f64>>, ExtractError> {
  (0..runs)
    .map(|run| {
      let path = run_dir(results_dir, run).join(DSTAT_FILE);
      Ok(dstat::parse_log(&read_file(&path)?))
    })
    .collect()
}

fn lockstep(runs: &[Vec<Snapshot>], value: impl Fn(&Snapshot) -> Option<f64>) -> Vec<f64> {
  let values: Vec<Vec<f64>> = runs
    .iter()
    .map(|snapshots| snapshots.iter().map(|s| value(s).unwrap_or(0.0)).collect())
    .collect();
  average_runs(&values)
}

fn count(runs: &[Vec<Snapshot>], scope: Scope, op: &str) -> Vec<f64> {
  lockstep(runs, |s| s.block(scope)?.count(op))
}

fn scopes(workers: usize) -> impl Iterator<Item = Scope> {
  (0..workers).map(Scope::Worker).chain([Scope::Global])
}

fn split_overall(mut series: Vec<Vec<f64>>) -> MetricSeries {
  let overall = series.pop().unwrap_or_default();
  MetricSeries {
    per_worker: series,
    overall,
  }
}

pub fn hit_ratio(runs: &[Vec<Snapshot>], workers: usize, len: usize) -> MetricSeries {
  split_overall(
    scopes(workers)
      .map(|scope| {
        let hits = per_tick_deltas(&count(runs, scope, "READ-PASSED"));
        let reads = per_tick_deltas(&count(runs, scope, "READ"));
        fit(ratio(&hits, &reads), len)
      })
      .collect(),
  )
}

/// Operations completed per tick.
pub fn throughput(runs: &[Vec<Snapshot>], workers: usize, len: usize) -> MetricSeries {
  split_overall(
    scopes(workers)
      .map(|scope| {
        let ops = lockstep(runs, |s| Some(s.block(scope)?.operations? as f64));
        fit(per_tick_deltas(&ops), len)
      })
      .collect(),
  )
}

/// `stop_ticks[i]` is the first tick at which worker i is idle. Its latency is 0 from then on.
pub fn lookup_latency(
  runs: &[Vec<Snapshot>],
  stat: LatencyStat,
  stop_ticks: &[u64],
  len: usize,
) -> MetricSeries {
  split_overall(
    scopes(stop_ticks.len())
      .map(|scope| {
        let mut latency = fit(
          lockstep(runs, |s| s.block(scope)?.section("READ")?.field(stat.field())),
          len,
        );
        if let Scope::Worker(i) = scope {
          zero_from(&mut latency, stop_ticks[i] as usize);
        };
        latency
      })
      .collect(),
  )
}

pub fn cpu_usage(runs: &[Vec<f64>], len: usize) -> MetricSeries {
  MetricSeries {
    per_worker: Vec::new(),
    overall: fit(average_runs(runs), len),
  }
}

/// Reads every run of one implementation and extracts all metrics, each `total_execution_time` samples long.
pub fn extract_implementation(
  manifest: &Manifest,
  results_dir: &Path,
) -> Result<ImplementationMetrics, ExtractError> {
  let workers = manifest.threads()?;
  let len = manifest.total_execution_time() as usize;
  let stop_ticks = (0..workers)
    .map(|i| manifest.stop_tick(i))
    .collect::<Result<Vec<_>, _>>()?;

  let status_logs = read_status_logs(results_dir, manifest.runs)?;
  let dstat_logs = read_dstat_logs(results_dir, manifest.runs)?;

  let mut metrics = ImplementationMetrics::default();
  metrics.insert(Metric::HitRatio, hit_ratio(&status_logs, workers, len));
  metrics.insert(Metric::Throughput, throughput(&status_logs, workers, len));
  for stat in LatencyStat::ALL {
    metrics.insert(
      Metric::Latency(stat),
      lookup_latency(&status_logs, stat, &stop_ticks, len),
    );
  }
  metrics.insert(Metric::Cpu, cpu_usage(&dstat_logs, len));
  Ok(metrics)
}
