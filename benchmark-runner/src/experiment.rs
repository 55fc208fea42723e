use benchmark_types::ycsb::RequestDistribution;
use benchmark_types::ycsb::StatusTag;
use benchmark_types::ycsb::YcsbConfig;
use benchmark_types::ConfigError;
use benchmark_types::ImplementationManifest;
use benchmark_types::Manifest;
use benchmark_types::PhaseSchedule;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::fmt::Display;
use std::path::Path;
use std::path::PathBuf;

/*

# Experiment file

One YAML file describes a whole experiment: the benchmark parameters shared by every setup, the workloads and worker counts to sweep, and the setups (implementations) to compare. Every combination of workload and worker count becomes one experiment directory holding a manifest and the results of every setup.

Per-worker parameters accept either a single value that applies to every worker, or a list with exactly one value per worker:

  request_distribution: zipfian
  zipfian_coefficients: [0, 0.7, 0.9, 1.2]

*/

/// Parameters recorded in the manifest that the plotter derives worker timing from. Setups cannot override them.
const MANIFEST_TIMING_PARAMS: [&str; 3] = ["threadcount", "sleepafterload", "maxexecutiontime"];

fn is_timing_param(key: &str) -> bool {
  MANIFEST_TIMING_PARAMS.iter().any(|p| {
    key == *p
      || key
        .strip_prefix(p)
        .map_or(false, |rest| rest.starts_with('.'))
  })
}

/// A value that is either shared by all workers or given per worker.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum PerWorker<T> {
  All(T),
  Each(Vec<T>),
}

impl<T: Clone> PerWorker<T> {
  /// Lists are passed through unchanged; their length is validated by the configuration builder.
  pub fn resolve(&self, workers: usize) -> Vec<T> {
    match self {
      PerWorker::All(v) => vec![v.clone(); workers],
      PerWorker::Each(v) => v.clone(),
    }
  }
}

/// A YAML scalar passed through as a benchmark parameter.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Scalar {
  Bool(bool),
  Int(i64),
  Float(f64),
  Str(String),
}

impl Display for Scalar {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Scalar::Bool(v) => write!(f, "{v}"),
      Scalar::Int(v) => write!(f, "{v}"),
      Scalar::Float(v) => write!(f, "{v}"),
      Scalar::Str(v) => write!(f, "{v}"),
    }
  }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct PoolSpec {
  pub name: String,
  pub relsize: f64,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackendSpec {
  Rocksdb,
  Cachelib {
    size: u64,
    /// Defaults to one equally sized pool per worker, named after the worker.
    #[serde(default)]
    pools: Option<Vec<PoolSpec>>,
    #[serde(default)]
    pool_resizer: bool,
    #[serde(default)]
    pool_optimizer: bool,
  },
  CachelibHolpaca {
    hosts: Vec<String>,
  },
}

impl BackendSpec {
  fn apply(&self, config: &mut YcsbConfig, db: &Path) -> Result<(), ConfigError> {
    match self {
      BackendSpec::Rocksdb => {
        config.rocksdb(db, false);
      }
      BackendSpec::Cachelib {
        size,
        pools,
        pool_resizer,
        pool_optimizer,
      } => {
        let pools: Vec<(String, f64)> = match pools {
          Some(pools) => pools.iter().map(|p| (p.name.clone(), p.relsize)).collect(),
          None => (0..config.threads())
            .map(|i| ((i + 1).to_string(), 1.0 / config.threads() as f64))
            .collect(),
        };
        config.cachelib(*size, &pools, *pool_resizer, *pool_optimizer)?;
      }
      BackendSpec::CachelibHolpaca { hosts } => {
        config.cachelib_holpaca(hosts)?;
      }
    };
    Ok(())
  }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct YcsbParams {
  pub delay_after_load: PerWorker<u64>,
  pub max_execution_time: PerWorker<u64>,
  pub operation_count: u64,
  pub record_count: u64,
  /// Share of the key space owned by each worker. Defaults to equal shares.
  #[serde(default)]
  pub key_distribution: Option<Vec<f64>>,
  #[serde(default = "default_status_interval")]
  pub status_interval: u64,
  pub request_distribution: PerWorker<RequestDistribution>,
  #[serde(default)]
  pub zipfian_coefficients: Option<PerWorker<f64>>,
  pub object_size: u64,
}

fn default_status_interval() -> u64 {
  1
}

fn default_status_to_print() -> Vec<StatusTag> {
  vec![StatusTag::Read, StatusTag::ReadPassed]
}

fn default_runs() -> usize {
  1
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Setup {
  pub id: String,
  /// Display name used in charts.
  pub name: String,
  pub results_dir: String,
  /// Shell command run before every run, e.g. to start a cache server.
  #[serde(default)]
  pub setup: Option<String>,
  /// Shell command run after every run.
  #[serde(default)]
  pub cleanup: Option<String>,
  /// Long-running shell command kept alive for the duration of every run.
  #[serde(default)]
  pub controller: Option<String>,
  #[serde(default)]
  pub backend: Option<BackendSpec>,
  /// Passed to the benchmark as `-p key=value`, after every other parameter.
  #[serde(default)]
  pub params: BTreeMap<String, Scalar>,
  /// Tolerated miss ratio per worker index.
  #[serde(default)]
  pub qos: Option<BTreeMap<usize, f64>>,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Experiment {
  pub executable: PathBuf,
  pub workloads_dir: PathBuf,
  pub workloads: Vec<String>,
  /// Worker counts to sweep.
  pub threads: Vec<usize>,
  #[serde(default = "default_runs")]
  pub runs: usize,
  /// Database used by the runs. It is restored from `db_backup` before each one.
  pub db: PathBuf,
  /// Database populated by the load phase.
  pub db_backup: PathBuf,
  /// Caps the benchmark's memory through a transient systemd scope, e.g. `2200M`.
  #[serde(default)]
  pub memory_limit: Option<String>,
  #[serde(default = "default_status_to_print")]
  pub status_to_print: Vec<StatusTag>,
  pub ycsb: YcsbParams,
  pub backend: BackendSpec,
  pub setups: Vec<Setup>,
}

impl Experiment {
  /// Configuration shared by every setup of one workload and worker count.
  pub fn base_config(&self, workload: &str, threads: usize) -> Result<YcsbConfig, ConfigError> {
    let p = &self.ycsb;
    let key_distribution = p
      .key_distribution
      .clone()
      .unwrap_or_else(|| vec![1.0 / threads as f64; threads]);
    let mut config = YcsbConfig::new(&self.executable, threads)?;
    config
      .delay_after_load(&p.delay_after_load.resolve(threads))?
      .max_execution_time(&p.max_execution_time.resolve(threads))?
      .operation_count(p.operation_count)?
      .record_count(p.record_count, &key_distribution)?
      .status_interval(p.status_interval)?
      .request_distribution(&p.request_distribution.resolve(threads))?;
    if let Some(coefficients) = &p.zipfian_coefficients {
      config.zipfian_coefficients(&coefficients.resolve(threads))?;
    };
    config
      .object_size(p.object_size)?
      .workload(self.workloads_dir.join(workload))?
      .status_to_print(self.status_to_print.clone())
      .load(false)
      .rocksdb(&self.db, false);
    self.backend.apply(&mut config, &self.db)?;
    Ok(config)
  }

  /// Populates the backup database from scratch without printing any status.
  pub fn load_config(&self, base: &YcsbConfig) -> YcsbConfig {
    let mut config = base.clone();
    config
      .load(true)
      .rocksdb(&self.db_backup, true)
      .status_to_print(Vec::new());
    config
  }

  pub fn setup_config(&self, base: &YcsbConfig, setup: &Setup) -> Result<YcsbConfig, ConfigError> {
    if let Some(key) = setup.params.keys().find(|k| is_timing_param(k)) {
      return Err(ConfigError::InvalidParamKey(key.clone()));
    };
    let mut config = base.clone();
    if let Some(backend) = &setup.backend {
      backend.apply(&mut config, &self.db)?;
    };
    for (key, value) in &setup.params {
      config.param_override(key, value)?;
    }
    Ok(config)
  }

  pub fn phases(&self, threads: usize) -> Result<PhaseSchedule, ConfigError> {
    PhaseSchedule::from_worker_timings(
      &self.ycsb.delay_after_load.resolve(threads),
      &self.ycsb.max_execution_time.resolve(threads),
    )
  }

  pub fn manifest(
    &self,
    workload: &str,
    base: &YcsbConfig,
    setups: &[&Setup],
  ) -> Result<Manifest, ConfigError> {
    Ok(Manifest {
      workload: workload.to_string(),
      phases: self.phases(base.threads())?,
      ycsb: base.params_map(),
      runs: self.runs,
      implementations: setups
        .iter()
        .map(|s| ImplementationManifest {
          id: s.id.clone(),
          name: s.name.clone(),
          results_dir: s.results_dir.clone(),
          qos: s.qos.clone(),
        })
        .collect(),
    })
  }

  /// All setups, or only those named in `ids` in the order they appear in the file.
  pub fn selected_setups(&self, ids: Option<&[String]>) -> Result<Vec<&Setup>, ConfigError> {
    let Some(ids) = ids else {
      return Ok(self.setups.iter().collect());
    };
    if let Some(unknown) = ids.iter().find(|id| !self.setups.iter().any(|s| &s.id == *id)) {
      return Err(ConfigError::InvalidParamValue {
        key: "setups".to_string(),
        value: unknown.clone(),
      });
    };
    Ok(self.setups.iter().filter(|s| ids.contains(&s.id)).collect())
  }
}

#[cfg(test)]
mod tests {
  use super::Experiment;
  use super::PerWorker;
  use super::Scalar;
  use benchmark_types::ycsb::Backend;
  use benchmark_types::ycsb::RequestDistribution;
  use benchmark_types::ConfigError;
  use std::fs;
  use tempfile::TempDir;

  fn yaml(dir: &TempDir, extra: &str) -> String {
    fs::create_dir_all(dir.path().join("workloads")).unwrap();
    fs::write(dir.path().join("workloads/read-only"), "readproportion=1\n").unwrap();
    format!(
      r#"
executable: build/ycsb
workloads_dir: {root}/workloads
workloads: [read-only]
threads: [4]
runs: 2
db: {root}/db
db_backup: {root}/db-backup
ycsb:
  delay_after_load: [0, 50, 150, 250]
  max_execution_time: [350, 50, 50, 50]
  operation_count: 1000000
  record_count: 2000000
  request_distribution: [uniform, zipfian, zipfian, zipfian]
  zipfian_coefficients: [0, 0.7, 0.9, 1.2]
  object_size: 1000
backend:
  type: cachelib
  size: 2000000000
setups:
  - id: cachelib
    name: CacheLib
    results_dir: cachelib
    cleanup: ./utils.sh clean-heap
    qos:
      1: 0.25
  - id: holpaca
    name: CacheLib-Holpaca
    results_dir: cachelib-holpaca
    controller: ./controller --port 6000
    backend:
      type: cachelib_holpaca
      hosts: ["h:6000", "h:6001", "h:6002", "h:6003"]
    params:
      holpaca.period: 5
      rocksdb.use_direct_reads: false
{extra}"#,
      root = dir.path().display(),
    )
  }

  fn experiment(dir: &TempDir, extra: &str) -> Experiment {
    serde_yaml::from_str(&yaml(dir, extra)).unwrap()
  }

  #[test]
  fn test_per_worker_values() {
    let all: PerWorker<u64> = serde_yaml::from_str("3").unwrap();
    assert_eq!(all.resolve(3), vec![3, 3, 3]);
    let each: PerWorker<RequestDistribution> = serde_yaml::from_str("[uniform, zipfian]").unwrap();
    assert_eq!(each.resolve(5), vec![RequestDistribution::Uniform, RequestDistribution::Zipfian]);
    assert!(serde_yaml::from_str::<PerWorker<RequestDistribution>>("pareto").is_err());
  }

  #[test]
  fn test_scalar_params() {
    let params: Vec<Scalar> = serde_yaml::from_str("[true, 5, 0.5, on]").unwrap();
    let rendered: Vec<String> = params.iter().map(|p| p.to_string()).collect();
    assert_eq!(rendered, vec!["true", "5", "0.5", "on"]);
  }

  #[test]
  fn test_base_config() {
    let dir = tempfile::tempdir().unwrap();
    let e = experiment(&dir, "");
    let base = e.base_config("read-only", 4).unwrap();
    assert_eq!(base.backend(), Some(Backend::CacheLib));
    assert_eq!(base.param("threadcount"), Some("4"));
    assert_eq!(base.param("sleepafterload.3"), Some("250"));
    assert_eq!(base.param("request_key_domain_end.3"), Some("1999999"));
    assert_eq!(base.param("cachelib.pool.name.0"), Some("1"));
    assert_eq!(base.param("cachelib.pool.relsize.0"), Some("0.25"));
    assert_eq!(
      base.param("rocksdb.dbname").map(|s| s.to_string()),
      Some(dir.path().join("db").display().to_string())
    );
    let args = base.to_args().unwrap();
    assert_eq!(args[..4], ["build/ycsb", "-run", "-db", "cachelib"]);
    assert!(args.windows(3).any(|w| w == ["-s", "READ", "READ-PASSED"]));
  }

  #[test]
  fn test_missing_workload() {
    let dir = tempfile::tempdir().unwrap();
    let e = experiment(&dir, "");
    assert!(matches!(
      e.base_config("write-heavy", 4),
      Err(ConfigError::WorkloadNotFound(_))
    ));
  }

  #[test]
  fn test_worker_count_mismatch() {
    let dir = tempfile::tempdir().unwrap();
    let e = experiment(&dir, "");
    assert_eq!(
      e.base_config("read-only", 2).unwrap_err(),
      ConfigError::LengthMismatch {
        param: "sleepafterload",
        expected: 2,
        got: 4,
      }
    );
  }

  #[test]
  fn test_load_config() {
    let dir = tempfile::tempdir().unwrap();
    let e = experiment(&dir, "");
    let base = e.base_config("read-only", 4).unwrap();
    let load = e.load_config(&base);
    assert!(load.is_load());
    assert!(!base.is_load());
    assert_eq!(load.param("rocksdb.destroy"), Some("true"));
    assert_eq!(base.param("rocksdb.destroy"), Some("false"));
    let command = load.to_command().unwrap();
    assert!(command.contains(" -load "));
    assert!(!command.contains(" -s "));
  }

  #[test]
  fn test_setup_config_overrides() {
    let dir = tempfile::tempdir().unwrap();
    let e = experiment(&dir, "");
    let base = e.base_config("read-only", 4).unwrap();
    let holpaca = e.setup_config(&base, &e.setups[1]).unwrap();
    assert_eq!(holpaca.backend(), Some(Backend::CacheLibHolpaca));
    assert_eq!(holpaca.param("holpaca.host.2"), Some("h:6002"));
    assert_eq!(holpaca.param("cachelib.size"), None);
    assert_eq!(holpaca.param("holpaca.period"), Some("5"));
    assert_eq!(holpaca.param("rocksdb.use_direct_reads"), Some("false"));
    // The base is untouched.
    assert_eq!(base.param("cachelib.size"), Some("2000000000"));
    assert_eq!(base.param("rocksdb.use_direct_reads"), Some("true"));

    let cachelib = e.setup_config(&base, &e.setups[0]).unwrap();
    assert_eq!(cachelib.to_args(), base.to_args());
  }

  #[test]
  fn test_setup_cannot_override_worker_timing() {
    let dir = tempfile::tempdir().unwrap();
    let e = experiment(&dir, "");
    let base = e.base_config("read-only", 4).unwrap();
    for key in ["sleepafterload.1", "maxexecutiontime", "threadcount"] {
      let mut setup = e.setups[0].clone();
      setup.params.insert(key.to_string(), Scalar::Int(10));
      assert_eq!(
        e.setup_config(&base, &setup).unwrap_err(),
        ConfigError::InvalidParamKey(key.to_string())
      );
    }
    let mut setup = e.setups[0].clone();
    setup
      .params
      .insert("maxexecutiontimeout".to_string(), Scalar::Int(10));
    assert!(e.setup_config(&base, &setup).is_ok());
  }

  #[test]
  fn test_manifest() {
    let dir = tempfile::tempdir().unwrap();
    let e = experiment(&dir, "");
    let base = e.base_config("read-only", 4).unwrap();
    let setups = e.selected_setups(None).unwrap();
    let m = e.manifest("read-only", &base, &setups).unwrap();
    assert_eq!(m.phases.as_slice(), &[0, 50, 100, 150, 200, 250, 300, 350]);
    assert_eq!(m.runs, 2);
    assert_eq!(m.threads().unwrap(), 4);
    assert_eq!(m.stop_tick(1).unwrap(), 100);
    assert_eq!(m.implementations.len(), 2);
    assert_eq!(m.implementations[0].hit_ratio_floor(1), Some(0.75));
    assert_eq!(m.implementations[1].qos, None);
  }

  #[test]
  fn test_selected_setups() {
    let dir = tempfile::tempdir().unwrap();
    let e = experiment(&dir, "");
    let ids = vec!["holpaca".to_string()];
    let selected = e.selected_setups(Some(ids.as_slice())).unwrap();
    assert_eq!(selected.len(), 1);
    assert_eq!(selected[0].name, "CacheLib-Holpaca");
    let ids = vec!["redis".to_string()];
    assert!(e.selected_setups(Some(ids.as_slice())).is_err());
  }

  #[test]
  fn test_unknown_fields_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    assert!(serde_yaml::from_str::<Experiment>(&yaml(&dir, "memory_limt: 2G")).is_err());
  }

  #[test]
  fn test_memory_limit() {
    let dir = tempfile::tempdir().unwrap();
    let e = experiment(&dir, "memory_limit: 2200M");
    assert_eq!(e.memory_limit.as_deref(), Some("2200M"));
  }
}
