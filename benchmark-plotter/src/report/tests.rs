use crate::metric::Metric;
use crate::render::ChartSink;
use crate::render::HitRatioWithChart;
use crate::render::MetricPerOtherChart;
use crate::render::OverallChart;
use crate::report::distribution_labels;
use crate::report::load_manifest;
use crate::report::render_report;
use crate::ExtractError;
use crate::RenderError;
use benchmark_types::ImplementationManifest;
use benchmark_types::Manifest;
use benchmark_types::PhaseSchedule;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use tracing_test::traced_test;

#[derive(Default)]
struct RecordingSink {
  overall: Vec<(PathBuf, OverallChart)>,
  hit_ratio_with: Vec<(PathBuf, HitRatioWithChart)>,
  metric_per_other: Vec<(PathBuf, MetricPerOtherChart)>,
}

impl ChartSink for RecordingSink {
  fn overall(&mut self, dir: &Path, chart: &OverallChart) -> Result<(), RenderError> {
    self.overall.push((dir.to_path_buf(), chart.clone()));
    Ok(())
  }

  fn hit_ratio_with(&mut self, dir: &Path, chart: &HitRatioWithChart) -> Result<(), RenderError> {
    self.hit_ratio_with.push((dir.to_path_buf(), chart.clone()));
    Ok(())
  }

  fn metric_per_other(&mut self, dir: &Path, chart: &MetricPerOtherChart) -> Result<(), RenderError> {
    self.metric_per_other.push((dir.to_path_buf(), chart.clone()));
    Ok(())
  }
}

fn implementation(id: &str, qos: Option<BTreeMap<usize, f64>>) -> ImplementationManifest {
  ImplementationManifest {
    id: id.to_string(),
    name: id.to_uppercase(),
    results_dir: format!("{id}-results"),
    qos,
  }
}

fn manifest(implementations: Vec<ImplementationManifest>) -> Manifest {
  Manifest {
    workload: "read-only".to_string(),
    phases: PhaseSchedule::new(vec![0, 2, 4]).unwrap(),
    ycsb: [
      ("threadcount", "2"),
      ("requestdistribution.0", "zipfian"),
      ("zipfian_const.0", "0.9"),
      ("requestdistribution.1", "uniform"),
      ("sleepafterload.0", "0"),
      ("maxexecutiontime.0", "4"),
      ("sleepafterload.1", "0"),
      ("maxexecutiontime.1", "2"),
    ]
    .iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect(),
    runs: 2,
    implementations,
  }
}

fn block(name: &str, ops: u64, reads: u64, hits: u64) -> String {
  format!("{name} {{ {ops} operations; [READ: Count={reads} Avg=5 99=9] [READ-PASSED: Count={hits}] }}")
}

/// Writes `runs` identical runs where every worker reads `step` keys per tick and hits on `hit_step` of them.
fn write_results(dir: &Path, runs: usize, step: u64, hit_step: u64) {
  for run in 0..runs {
    let run_dir = dir.join(run.to_string());
    fs::create_dir_all(&run_dir).unwrap();
    let log: String = (0..6)
      .map(|t| {
        let (reads, hits) = (t * step, t * hit_step);
        format!(
          "{t} sec: {} {} {}\n",
          block("global", reads * 2, reads * 2, hits * 2),
          block("worker-0", reads, reads, hits),
          block("worker-1", reads, reads, hits),
        )
      })
      .collect();
    fs::write(run_dir.join("ycsb.txt"), log).unwrap();
    fs::write(
      run_dir.join("dstat.csv"),
      "h\nh\n0 0|10 0 90 0 0|0 0\n0 0|20 0 80 0 0|0 0\n0 0|30 0 70 0 0|0 0\n0 0|40 0 60 0 0|0 0\n",
    )
    .unwrap();
  }
}

#[traced_test]
#[test]
fn test_missing_implementation_is_skipped() {
  let experiment = tempfile::tempdir().unwrap();
  let output = tempfile::tempdir().unwrap();
  let m = manifest(vec![implementation("cachelib", None), implementation("holpaca", None)]);
  write_results(&experiment.path().join("cachelib-results"), 2, 10, 5);
  // Only one of the two runs finished.
  write_results(&experiment.path().join("holpaca-results"), 1, 10, 5);

  let mut sink = RecordingSink::default();
  let summary = render_report(&m, experiment.path(), output.path(), &mut sink).unwrap();

  assert_eq!(summary.rendered, vec!["cachelib".to_string()]);
  assert_eq!(summary.skipped, vec!["holpaca".to_string()]);
  assert!(logs_contain("results are incomplete"));

  assert_eq!(sink.overall.len(), Metric::all().len());
  for (dir, chart) in &sink.overall {
    assert_eq!(dir, output.path());
    assert_eq!(chart.lines.len(), 1);
    assert_eq!(chart.lines[0].name, "CACHELIB");
    assert_eq!(chart.lines[0].values.len(), 4);
  }
  // Throughput and 7 latencies, for each of the 2 workers.
  assert_eq!(sink.hit_ratio_with.len(), 8 * 2);
  assert!(sink
    .hit_ratio_with
    .iter()
    .all(|(dir, _)| dir == &output.path().join("cachelib-results")));
  assert_eq!(sink.metric_per_other.len(), 1);
}

#[traced_test]
#[test]
fn test_nothing_to_render() {
  let experiment = tempfile::tempdir().unwrap();
  let m = manifest(vec![implementation("cachelib", None)]);
  let mut sink = RecordingSink::default();
  let summary = render_report(&m, experiment.path(), experiment.path(), &mut sink).unwrap();
  assert!(summary.rendered.is_empty());
  assert!(sink.overall.is_empty());
  assert!(logs_contain("nothing to plot"));
}

#[test]
fn test_hit_ratio_with_charts() {
  let experiment = tempfile::tempdir().unwrap();
  let m = manifest(vec![
    implementation("cachelib", Some(BTreeMap::from([(0, 0.75), (1, 0.1)]))),
    implementation("holpaca", None),
  ]);
  write_results(&experiment.path().join("cachelib-results"), 2, 10, 5);
  write_results(&experiment.path().join("holpaca-results"), 2, 10, 8);

  let mut sink = RecordingSink::default();
  render_report(&m, experiment.path(), experiment.path(), &mut sink).unwrap();

  let throughput: Vec<&HitRatioWithChart> = sink
    .hit_ratio_with
    .iter()
    .map(|(_, c)| c)
    .filter(|c| c.implementation == "CACHELIB" && c.metric == Metric::Throughput)
    .collect();
  assert_eq!(throughput.len(), 2);

  let w0 = throughput[0];
  assert_eq!(w0.worker, 0);
  assert_eq!(w0.distribution, "Zipf (0.9)");
  assert_eq!(w0.hit_ratio, vec![0.5, 0.5, 0.5, 0.5]);
  assert_eq!(w0.other, vec![10.0, 10.0, 10.0, 10.0]);
  // Shared with the other implementation, which hits more often.
  assert_eq!(w0.hit_ratio_max, 0.8);
  assert_eq!(w0.other_max, 10.0);
  // Only tick 1 lies strictly inside phase [0, 2], and tick 3 inside [2, 4].
  assert_eq!(w0.phase_means, vec![10.0, 10.0]);
  assert_eq!(w0.qos, Some(0.25));

  let w1 = throughput[1];
  assert_eq!(w1.distribution, "Uniform");
  // 0.9 is above every hit ratio this worker reached.
  assert_eq!(w1.qos, None);

  let latency = sink
    .hit_ratio_with
    .iter()
    .map(|(_, c)| c)
    .find(|c| c.metric == Metric::Latency(crate::metric::LatencyStat::Avg) && c.worker == 1)
    .unwrap();
  // Worker 1 stops at tick 2.
  assert_eq!(latency.other, vec![5.0, 5.0, 0.0, 0.0]);

  let scatter = &sink.metric_per_other[0].1;
  assert_eq!(scatter.workers.len(), 2);
  assert_eq!(scatter.workers[0].name, "Worker 0: Zipf (0.9)");
  assert!(scatter.workers[0]
    .points
    .windows(2)
    .all(|w| w[0].0 <= w[1].0));
}

#[test]
fn test_distribution_labels() {
  let mut m = manifest(vec![]);
  assert_eq!(
    distribution_labels(&m, 2).unwrap(),
    vec!["Zipf (0.9)".to_string(), "Uniform".to_string()]
  );
  m.ycsb.remove("requestdistribution.1");
  assert!(matches!(
    distribution_labels(&m, 2),
    Err(ExtractError::MissingDistribution { worker: 1 })
  ));
  m.ycsb.insert("requestdistribution".to_string(), "uniform".to_string());
  assert_eq!(distribution_labels(&m, 2).unwrap()[1], "Uniform");
}

#[test]
fn test_load_manifest() {
  let dir = tempfile::tempdir().unwrap();
  assert!(matches!(
    load_manifest(dir.path()),
    Err(ExtractError::MissingFile(_))
  ));
  fs::write(dir.path().join("config.json"), "{").unwrap();
  assert!(matches!(
    load_manifest(dir.path()),
    Err(ExtractError::InvalidManifest { .. })
  ));
  let m = manifest(vec![implementation("cachelib", None)]);
  fs::write(dir.path().join("config.json"), serde_json::to_string(&m).unwrap()).unwrap();
  let loaded = load_manifest(dir.path()).unwrap();
  assert_eq!(loaded.implementations[0].results_dir, "cachelib-results");
  assert_eq!(loaded.threads().unwrap(), 2);
}
