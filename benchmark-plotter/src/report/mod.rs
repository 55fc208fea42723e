#[cfg(test)]
pub mod tests;

use crate::extract::extract_implementation;
use crate::extract::ImplementationMetrics;
use crate::metric::Metric;
use crate::render::ChartSink;
use crate::render::HitRatioWithChart;
use crate::render::Line;
use crate::render::MetricPerOtherChart;
use crate::render::OverallChart;
use crate::render::ScatterPoints;
use crate::series;
use crate::ExtractError;
use crate::ReportError;
use ahash::HashMap;
use ahash::HashMapExt;
use benchmark_types::ConfigError;
use benchmark_types::ImplementationManifest;
use benchmark_types::Manifest;
use benchmark_types::MANIFEST_FILE;
use std::fs;
use std::io;
use std::path::Path;
use tracing::info;
use tracing::warn;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReportSummary {
  /// Ids of implementations that were drawn.
  pub rendered: Vec<String>,
  /// Ids of implementations whose results were incomplete.
  pub skipped: Vec<String>,
}

pub fn load_manifest(experiment_dir: &Path) -> Result<Manifest, ExtractError> {
  let path = experiment_dir.join(MANIFEST_FILE);
  let raw = fs::read_to_string(&path).map_err(|source| match source.kind() {
    io::ErrorKind::NotFound => ExtractError::MissingFile(path.clone()),
    _ => ExtractError::Io {
      path: path.clone(),
      source,
    },
  })?;
  serde_json::from_str(&raw).map_err(|source| ExtractError::InvalidManifest { path, source })
}

/// Legend label of each worker's key popularity, e.g. `Zipf (0.9)` or `Uniform`.
pub fn distribution_labels(manifest: &Manifest, workers: usize) -> Result<Vec<String>, ExtractError> {
  (0..workers)
    .map(|i| match manifest.worker_param("requestdistribution", i) {
      Some("zipfian") => Ok(match manifest.worker_param("zipfian_const", i) {
        Some(c) => format!("Zipf ({c})"),
        None => "Zipf".to_string(),
      }),
      Some("uniform") => Ok("Uniform".to_string()),
      Some(other) => Err(ExtractError::Manifest(ConfigError::InvalidDistribution(
        other.to_string(),
      ))),
      None => Err(ExtractError::MissingDistribution { worker: i }),
    })
    .collect()
}

struct Extracted<'m> {
  implementation: &'m ImplementationManifest,
  metrics: ImplementationMetrics,
}

impl<'m> Extracted<'m> {
  fn per_worker(&self, metric: Metric) -> &[Vec<f64>] {
    self
      .metrics
      .get(metric)
      .map(|s| s.per_worker.as_slice())
      .unwrap_or(&[])
  }

  fn overall(&self, metric: Metric) -> Vec<f64> {
    self
      .metrics
      .get(metric)
      .map(|s| s.overall.clone())
      .unwrap_or_default()
  }
}

/// Highest value each worker reaches in any implementation, for every per-worker metric.
fn per_worker_maxima(extracted: &[Extracted], workers: usize) -> HashMap<Metric, Vec<f64>> {
  let mut maxima = HashMap::new();
  for metric in Metric::all().into_iter().filter(|m| m.per_worker()) {
    let per_worker = (0..workers)
      .map(|i| {
        extracted
          .iter()
          .filter_map(|e| e.per_worker(metric).get(i))
          .map(|s| series::max(s))
          .fold(0.0, f64::max)
      })
      .collect();
    maxima.insert(metric, per_worker);
  }
  maxima
}

/// Points of `y` against `x`, ordered by `x`.
fn scatter(x: &[f64], y: &[f64]) -> Vec<(f64, f64)> {
  let mut points: Vec<(f64, f64)> = x.iter().copied().zip(y.iter().copied()).collect();
  points.sort_by(|a, b| a.0.total_cmp(&b.0));
  points
}

/// Extracts every implementation of the experiment under `experiment_dir` and hands the charts to `sink`.
///
/// Overall charts go directly into `output_dir`, and the per-implementation charts into `output_dir/<results_dir>`. Implementations with missing results are skipped.
pub fn render_report(
  manifest: &Manifest,
  experiment_dir: &Path,
  output_dir: &Path,
  sink: &mut dyn ChartSink,
) -> Result<ReportSummary, ReportError> {
  let workers = manifest.threads()?;
  let distributions = distribution_labels(manifest, workers)?;
  let phases = manifest.phases.as_slice().to_vec();

  let mut summary = ReportSummary::default();
  let mut extracted = Vec::new();
  for implementation in &manifest.implementations {
    let results_dir = experiment_dir.join(&implementation.results_dir);
    match extract_implementation(manifest, &results_dir) {
      Ok(metrics) => {
        summary.rendered.push(implementation.id.clone());
        extracted.push(Extracted {
          implementation,
          metrics,
        });
      }
      Err(ExtractError::MissingFile(path)) => {
        warn!(
          implementation = %implementation.id,
          missing = %path.display(),
          "results are incomplete, check whether the implementation is still running; skipping it"
        );
        summary.skipped.push(implementation.id.clone());
      }
      Err(e) => return Err(e.into()),
    };
  }
  if extracted.is_empty() {
    warn!(experiment = %experiment_dir.display(), "no implementation has results, nothing to plot");
    return Ok(summary);
  };

  for metric in Metric::all() {
    sink.overall(output_dir, &OverallChart {
      metric,
      phases: phases.clone(),
      lines: extracted
        .iter()
        .map(|e| Line {
          name: e.implementation.name.clone(),
          values: e.overall(metric),
        })
        .collect(),
    })?;
  }

  let maxima = per_worker_maxima(&extracted, workers);
  let hit_ratio_max = &maxima[&Metric::HitRatio];
  for e in &extracted {
    let dir = output_dir.join(&e.implementation.results_dir);
    let hit_ratio = e.per_worker(Metric::HitRatio);
    for metric in Metric::all() {
      if metric == Metric::HitRatio || !metric.per_worker() {
        continue;
      };
      let other_max = &maxima[&metric];
      for (worker, (hr, other)) in hit_ratio.iter().zip(e.per_worker(metric)).enumerate() {
        sink.hit_ratio_with(&dir, &HitRatioWithChart {
          implementation: e.implementation.name.clone(),
          metric,
          worker,
          distribution: distributions[worker].clone(),
          phases: phases.clone(),
          hit_ratio: hr.clone(),
          other: other.clone(),
          hit_ratio_max: hit_ratio_max[worker],
          other_max: other_max[worker],
          phase_means: series::phase_means(other, &phases),
          // Floors above the axis maximum are not drawn.
          qos: e
            .implementation
            .hit_ratio_floor(worker)
            .filter(|q| *q <= hit_ratio_max[worker]),
        })?;
      }
    }

    sink.metric_per_other(&dir, &MetricPerOtherChart {
      implementation: e.implementation.name.clone(),
      x: Metric::HitRatio,
      y: Metric::Throughput,
      workers: hit_ratio
        .iter()
        .zip(e.per_worker(Metric::Throughput))
        .enumerate()
        .map(|(worker, (hr, tp))| ScatterPoints {
          name: format!("Worker {worker}: {}", distributions[worker]),
          points: scatter(hr, tp),
        })
        .collect(),
    })?;
    info!(implementation = %e.implementation.id, "rendered");
  }
  Ok(summary)
}
