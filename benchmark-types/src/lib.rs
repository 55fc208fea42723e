use serde::Deserialize;
use serde::Serialize;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt;
use std::fmt::Display;
use std::path::Path;
use std::path::PathBuf;

pub mod ycsb;

pub const MANIFEST_FILE: &str = "config.json";
pub const STATUS_LOG_FILE: &str = "ycsb.txt";
pub const DSTAT_FILE: &str = "dstat.csv";

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
  LengthMismatch {
    param: &'static str,
    expected: usize,
    got: usize,
  },
  OutOfRange {
    param: &'static str,
    requirement: &'static str,
  },
  WeightsDoNotSumToOne {
    param: &'static str,
    sum: f64,
  },
  EmptyKeyRange {
    worker: usize,
  },
  DuplicatePoolName(String),
  InvalidParamKey(String),
  InvalidParamValue {
    key: String,
    value: String,
  },
  MissingParam(String),
  InvalidStatusTag(String),
  InvalidDistribution(String),
  WorkloadNotFound(PathBuf),
  MissingBackend,
  MissingWorkload,
  PhasesNotAscending {
    index: usize,
  },
}

impl Display for ConfigError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ConfigError::LengthMismatch {
        param,
        expected,
        got,
      } => write!(
        f,
        "{param} must have one value per worker (expected {expected}, got {got})"
      ),
      ConfigError::OutOfRange { param, requirement } => write!(f, "{param} {requirement}"),
      ConfigError::WeightsDoNotSumToOne { param, sum } => {
        write!(f, "{param} must sum to 1 (got {sum})")
      }
      ConfigError::EmptyKeyRange { worker } => {
        write!(f, "worker {worker} would be assigned an empty key range")
      }
      ConfigError::DuplicatePoolName(name) => write!(f, "pool name {name:?} is used more than once"),
      ConfigError::InvalidParamKey(key) => write!(f, "invalid parameter name {key:?}"),
      ConfigError::InvalidParamValue { key, value } => {
        write!(f, "parameter {key} has invalid value {value:?}")
      }
      ConfigError::MissingParam(key) => write!(f, "parameter {key} is not set"),
      ConfigError::InvalidStatusTag(tag) => write!(
        f,
        "unknown status tag {tag:?} (expected an operation such as READ, optionally suffixed with -PASSED or -FAILED, or ALL)"
      ),
      ConfigError::InvalidDistribution(dist) => write!(
        f,
        "unknown request distribution {dist:?} (expected uniform or zipfian)"
      ),
      ConfigError::WorkloadNotFound(path) => {
        write!(f, "workload {} does not exist", path.display())
      }
      ConfigError::MissingBackend => write!(f, "no storage backend has been selected"),
      ConfigError::MissingWorkload => write!(f, "no workload file has been set"),
      ConfigError::PhasesNotAscending { index } => {
        write!(f, "phase {index} is earlier than the phase before it")
      }
    }
  }
}

impl Error for ConfigError {}

/// Ascending phase boundaries in seconds. The last boundary is the total execution time.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(try_from = "Vec<u64>", into = "Vec<u64>")]
pub struct PhaseSchedule(Vec<u64>);

impl PhaseSchedule {
  pub fn new(phases: Vec<u64>) -> Result<Self, ConfigError> {
    if phases.is_empty() {
      return Err(ConfigError::OutOfRange {
        param: "phases",
        requirement: "must contain at least one phase",
      });
    };
    if let Some(index) = phases.windows(2).position(|w| w[1] < w[0]) {
      return Err(ConfigError::PhasesNotAscending { index: index + 1 });
    };
    Ok(Self(phases))
  }

  /// Each worker contributes its start (`delay`) and its stop (`delay + duration`).
  pub fn from_worker_timings(delays: &[u64], durations: &[u64]) -> Result<Self, ConfigError> {
    if delays.len() != durations.len() {
      return Err(ConfigError::LengthMismatch {
        param: "maxexecutiontime",
        expected: delays.len(),
        got: durations.len(),
      });
    };
    let mut phases: Vec<u64> = delays
      .iter()
      .copied()
      .chain(delays.iter().zip(durations).map(|(d, m)| d + m))
      .collect();
    phases.sort_unstable();
    phases.dedup();
    Self::new(phases)
  }

  pub fn as_slice(&self) -> &[u64] {
    &self.0
  }

  pub fn total_execution_time(&self) -> u64 {
    self.0.last().copied().unwrap_or(0)
  }
}

impl TryFrom<Vec<u64>> for PhaseSchedule {
  type Error = ConfigError;

  fn try_from(phases: Vec<u64>) -> Result<Self, Self::Error> {
    Self::new(phases)
  }
}

impl From<PhaseSchedule> for Vec<u64> {
  fn from(phases: PhaseSchedule) -> Self {
    phases.0
  }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ImplementationManifest {
  pub id: String,
  /// Display name used in legends and titles.
  pub name: String,
  /// Directory name under the experiment directory holding one subdirectory per run.
  pub results_dir: String,
  /// Tolerated miss ratio per worker index.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub qos: Option<BTreeMap<usize, f64>>,
}

impl ImplementationManifest {
  /// QoS is configured as a miss ratio but drawn as a hit ratio floor.
  pub fn hit_ratio_floor(&self, worker: usize) -> Option<f64> {
    self.qos.as_ref()?.get(&worker).map(|miss| 1.0 - miss)
  }
}

/// Written by the runner next to the results, and read back by the plotter.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
  pub workload: String,
  pub phases: PhaseSchedule,
  pub ycsb: BTreeMap<String, String>,
  pub runs: usize,
  pub implementations: Vec<ImplementationManifest>,
}

impl Manifest {
  pub fn param(&self, key: &str) -> Option<&str> {
    self.ycsb.get(key).map(|v| v.as_str())
  }

  /// Looks up `key.<worker>` first, then the un-indexed `key` that applies to all workers.
  pub fn worker_param(&self, key: &str, worker: usize) -> Option<&str> {
    self
      .param(&format!("{key}.{worker}"))
      .or_else(|| self.param(key))
  }

  fn parse_param<T: std::str::FromStr>(&self, key: &str, raw: &str) -> Result<T, ConfigError> {
    raw.parse().map_err(|_| ConfigError::InvalidParamValue {
      key: key.to_string(),
      value: raw.to_string(),
    })
  }

  pub fn threads(&self) -> Result<usize, ConfigError> {
    let raw = self
      .param("threadcount")
      .ok_or_else(|| ConfigError::MissingParam("threadcount".to_string()))?;
    self.parse_param("threadcount", raw)
  }

  pub fn total_execution_time(&self) -> u64 {
    self.phases.total_execution_time()
  }

  /// First tick at which the worker no longer issues requests.
  pub fn stop_tick(&self, worker: usize) -> Result<u64, ConfigError> {
    let (Some(delay), Some(duration)) = (
      self.worker_param("sleepafterload", worker),
      self.worker_param("maxexecutiontime", worker),
    ) else {
      return Ok(self.total_execution_time());
    };
    let delay: u64 = self.parse_param("sleepafterload", delay)?;
    let parsed: u64 = self.parse_param("maxexecutiontime", duration)?;
    delay
      .checked_add(parsed)
      .ok_or_else(|| ConfigError::InvalidParamValue {
        key: format!("maxexecutiontime.{worker}"),
        value: duration.to_string(),
      })
  }
}

/// One execution of the benchmark for one implementation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunDescriptor {
  /// The implementation's `results_dir`.
  pub implementation: String,
  pub workload: String,
  pub threads: usize,
  pub run: usize,
}

impl RunDescriptor {
  pub fn experiment_dir(root: &Path, workload: &str, threads: usize) -> PathBuf {
    root.join(workload).join(threads.to_string())
  }

  pub fn dir(&self, root: &Path) -> PathBuf {
    run_dir(
      &Self::experiment_dir(root, &self.workload, self.threads).join(&self.implementation),
      self.run,
    )
  }
}

pub fn run_dir(results_dir: &Path, run: usize) -> PathBuf {
  results_dir.join(run.to_string())
}
