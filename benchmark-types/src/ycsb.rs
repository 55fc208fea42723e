use crate::ConfigError;
use serde::Deserialize;
use serde::Serialize;
use std::collections::BTreeMap;
use std::collections::HashSet;
use std::fmt;
use std::ops::Range;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use strum::Display;
use strum::EnumString;

const WEIGHT_SUM_TOLERANCE: f64 = 1e-9;

/*

# YCSB configuration

Builds the command line of the multi-tenant YCSB executable. Every worker (tenant) gets its own key range, request distribution and timing, passed as `-p <param>.<worker>=<value>`. Every setter validates its whole input before writing anything, so a rejected call leaves the configuration untouched.

*/

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Display, EnumString, Deserialize, Serialize)]
#[serde(try_from = "String", into = "String")]
pub enum StatusTag {
  #[strum(serialize = "INSERT")]
  Insert,
  #[strum(serialize = "READ")]
  Read,
  #[strum(serialize = "UPDATE")]
  Update,
  #[strum(serialize = "SCAN")]
  Scan,
  #[strum(serialize = "READMODIFYWRITE")]
  ReadModifyWrite,
  #[strum(serialize = "DELETE")]
  Delete,
  #[strum(serialize = "INSERT-PASSED")]
  InsertPassed,
  #[strum(serialize = "READ-PASSED")]
  ReadPassed,
  #[strum(serialize = "UPDATE-PASSED")]
  UpdatePassed,
  #[strum(serialize = "SCAN-PASSED")]
  ScanPassed,
  #[strum(serialize = "READMODIFYWRITE-PASSED")]
  ReadModifyWritePassed,
  #[strum(serialize = "DELETE-PASSED")]
  DeletePassed,
  #[strum(serialize = "INSERT-FAILED")]
  InsertFailed,
  #[strum(serialize = "READ-FAILED")]
  ReadFailed,
  #[strum(serialize = "UPDATE-FAILED")]
  UpdateFailed,
  #[strum(serialize = "SCAN-FAILED")]
  ScanFailed,
  #[strum(serialize = "READMODIFYWRITE-FAILED")]
  ReadModifyWriteFailed,
  #[strum(serialize = "DELETE-FAILED")]
  DeleteFailed,
  #[strum(serialize = "ALL")]
  All,
}

impl TryFrom<String> for StatusTag {
  type Error = ConfigError;

  fn try_from(raw: String) -> Result<Self, Self::Error> {
    raw.parse().map_err(|_| ConfigError::InvalidStatusTag(raw))
  }
}

impl From<StatusTag> for String {
  fn from(tag: StatusTag) -> Self {
    tag.to_string()
  }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Display, EnumString, Deserialize, Serialize)]
#[strum(serialize_all = "lowercase")]
#[serde(try_from = "String", into = "String")]
pub enum RequestDistribution {
  Uniform,
  Zipfian,
}

impl TryFrom<String> for RequestDistribution {
  type Error = ConfigError;

  fn try_from(raw: String) -> Result<Self, Self::Error> {
    raw.parse().map_err(|_| ConfigError::InvalidDistribution(raw))
  }
}

impl From<RequestDistribution> for String {
  fn from(dist: RequestDistribution) -> Self {
    dist.to_string()
  }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Backend {
  /// Embedded engine without a cache in front of it.
  RocksDb,
  /// In-process cache with one pool per worker.
  CacheLib,
  /// Cache whose pools are managed by a remote controller.
  CacheLibHolpaca,
}

impl Backend {
  pub fn db_name(self) -> &'static str {
    match self {
      Backend::RocksDb => "rocksdb",
      Backend::CacheLib => "cachelib",
      Backend::CacheLibHolpaca => "cachelib-holpaca",
    }
  }

  /// Parameters owned by this backend. The embedded engine's parameters are also the backing store configuration of both caches, so they are never cleared by a later selection.
  fn exclusive_param_prefix(self) -> Option<&'static str> {
    match self {
      Backend::RocksDb => None,
      Backend::CacheLib => Some("cachelib."),
      Backend::CacheLibHolpaca => Some("holpaca."),
    }
  }
}

/// Parameters in insertion order. Setting an existing key keeps its position.
#[derive(Clone, Debug, Default)]
struct Params(Vec<(String, String)>);

impl Params {
  fn set(&mut self, key: impl Into<String>, value: impl ToString) {
    let key = key.into();
    let value = value.to_string();
    match self.0.iter_mut().find(|(k, _)| *k == key) {
      Some(entry) => entry.1 = value,
      None => self.0.push((key, value)),
    };
  }

  fn get(&self, key: &str) -> Option<&str> {
    self
      .0
      .iter()
      .find(|(k, _)| k == key)
      .map(|(_, v)| v.as_str())
  }

  fn remove_prefixed(&mut self, prefix: &str) {
    self.0.retain(|(k, _)| !k.starts_with(prefix));
  }
}

fn on_off(enabled: bool) -> &'static str {
  if enabled {
    "on"
  } else {
    "off"
  }
}

fn check_weights(param: &'static str, weights: &[f64]) -> Result<(), ConfigError> {
  if !weights.iter().all(|w| w.is_finite() && *w > 0.0) {
    return Err(ConfigError::OutOfRange {
      param,
      requirement: "must only contain finite weights greater than 0",
    });
  };
  let sum: f64 = weights.iter().sum();
  if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
    return Err(ConfigError::WeightsDoNotSumToOne { param, sum });
  };
  Ok(())
}

/// Splits `[0, record_count)` into one contiguous range per weight, in order. Each range gets `floor(weight * record_count)` keys, except the last which takes whatever remains so that the ranges cover the whole domain.
pub fn partition_keys(record_count: u64, weights: &[f64]) -> Result<Vec<Range<u64>>, ConfigError> {
  check_weights("key distribution", weights)?;
  let mut ranges = Vec::with_capacity(weights.len());
  let mut start = 0;
  for (worker, weight) in weights.iter().enumerate() {
    let end = if worker + 1 == weights.len() {
      record_count
    } else {
      (start + (weight * record_count as f64) as u64).min(record_count)
    };
    if end <= start {
      return Err(ConfigError::EmptyKeyRange { worker });
    };
    ranges.push(start..end);
    start = end;
  }
  Ok(ranges)
}

#[derive(Clone, Debug)]
pub struct YcsbConfig {
  // Shared by all copies.
  executable: Arc<PathBuf>,
  threads: usize,
  params: Params,
  backend: Option<Backend>,
  workload: Option<PathBuf>,
  status_to_print: Vec<StatusTag>,
  load: bool,
}

impl YcsbConfig {
  pub fn new(executable: impl Into<PathBuf>, threads: usize) -> Result<Self, ConfigError> {
    if threads == 0 {
      return Err(ConfigError::OutOfRange {
        param: "threadcount",
        requirement: "must be greater than 0",
      });
    };
    let mut params = Params::default();
    params.set("threadcount", threads);
    Ok(Self {
      executable: Arc::new(executable.into()),
      threads,
      params,
      backend: None,
      workload: None,
      status_to_print: Vec::new(),
      load: false,
    })
  }

  pub fn threads(&self) -> usize {
    self.threads
  }

  pub fn executable(&self) -> &Path {
    &self.executable
  }

  pub fn backend(&self) -> Option<Backend> {
    self.backend
  }

  pub fn is_load(&self) -> bool {
    self.load
  }

  pub fn param(&self, key: &str) -> Option<&str> {
    self.params.get(key)
  }

  pub fn params(&self) -> impl Iterator<Item = (&str, &str)> {
    self.params.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
  }

  /// Snapshot of the parameters for the experiment manifest.
  pub fn params_map(&self) -> BTreeMap<String, String> {
    self.params.0.iter().cloned().collect()
  }

  fn check_per_worker(&self, param: &'static str, got: usize) -> Result<(), ConfigError> {
    if got != self.threads {
      return Err(ConfigError::LengthMismatch {
        param,
        expected: self.threads,
        got,
      });
    };
    Ok(())
  }

  fn set_per_worker<T: fmt::Display>(&mut self, param: &str, values: &[T]) {
    for (i, v) in values.iter().enumerate() {
      self.params.set(format!("{param}.{i}"), v);
    }
  }

  /// Seconds each worker waits after the load phase before issuing requests.
  pub fn delay_after_load(&mut self, delays: &[u64]) -> Result<&mut Self, ConfigError> {
    self.check_per_worker("sleepafterload", delays.len())?;
    self.set_per_worker("sleepafterload", delays);
    Ok(self)
  }

  pub fn max_execution_time(&mut self, secs: &[u64]) -> Result<&mut Self, ConfigError> {
    self.check_per_worker("maxexecutiontime", secs.len())?;
    if secs.iter().any(|s| *s == 0) {
      return Err(ConfigError::OutOfRange {
        param: "maxexecutiontime",
        requirement: "must be greater than 0",
      });
    };
    self.set_per_worker("maxexecutiontime", secs);
    Ok(self)
  }

  pub fn operation_count(&mut self, count: u64) -> Result<&mut Self, ConfigError> {
    if count == 0 {
      return Err(ConfigError::OutOfRange {
        param: "operationcount",
        requirement: "must be greater than 0",
      });
    };
    self.params.set("operationcount", count);
    Ok(self)
  }

  /// Sets the record count and gives each worker a disjoint slice of the key space, sized by `key_distribution`. The same slice is used for inserts and for requests.
  pub fn record_count(
    &mut self,
    record_count: u64,
    key_distribution: &[f64],
  ) -> Result<&mut Self, ConfigError> {
    if record_count == 0 {
      return Err(ConfigError::OutOfRange {
        param: "recordcount",
        requirement: "must be greater than 0",
      });
    };
    self.check_per_worker("key distribution", key_distribution.len())?;
    let ranges = partition_keys(record_count, key_distribution)?;
    self.params.set("recordcount", record_count);
    for (i, range) in ranges.into_iter().enumerate() {
      self
        .params
        .set(format!("request_key_domain_start.{i}"), range.start);
      self.params.set(format!("insertstart.{i}"), range.start);
      self
        .params
        .set(format!("request_key_domain_end.{i}"), range.end - 1);
    }
    Ok(self)
  }

  pub fn status_interval(&mut self, secs: u64) -> Result<&mut Self, ConfigError> {
    if secs == 0 {
      return Err(ConfigError::OutOfRange {
        param: "status.interval",
        requirement: "must be greater than 0",
      });
    };
    self.params.set("status.interval", secs);
    Ok(self)
  }

  pub fn request_distribution(
    &mut self,
    distributions: &[RequestDistribution],
  ) -> Result<&mut Self, ConfigError> {
    self.check_per_worker("requestdistribution", distributions.len())?;
    self.set_per_worker("requestdistribution", distributions);
    Ok(self)
  }

  pub fn zipfian_coefficients(&mut self, coefficients: &[f64]) -> Result<&mut Self, ConfigError> {
    self.check_per_worker("zipfian_const", coefficients.len())?;
    if !coefficients.iter().all(|c| c.is_finite() && *c >= 0.0) {
      return Err(ConfigError::OutOfRange {
        param: "zipfian_const",
        requirement: "must be finite and greater than or equal to 0",
      });
    };
    self.set_per_worker("zipfian_const", coefficients);
    Ok(self)
  }

  pub fn workload(&mut self, path: impl Into<PathBuf>) -> Result<&mut Self, ConfigError> {
    let path = path.into();
    if !path.exists() {
      return Err(ConfigError::WorkloadNotFound(path));
    };
    self.workload = Some(path);
    Ok(self)
  }

  /// An empty list disables status output.
  pub fn status_to_print(&mut self, tags: Vec<StatusTag>) -> &mut Self {
    self.status_to_print = tags;
    self
  }

  pub fn load(&mut self, load: bool) -> &mut Self {
    self.load = load;
    self
  }

  fn select_backend(&mut self, backend: Backend) {
    for other in [Backend::CacheLib, Backend::CacheLibHolpaca] {
      if other != backend {
        if let Some(prefix) = other.exclusive_param_prefix() {
          self.params.remove_prefixed(prefix);
        };
      };
    }
    self.backend = Some(backend);
  }

  pub fn rocksdb(&mut self, db: impl AsRef<Path>, destroy: bool) -> &mut Self {
    self.select_backend(Backend::RocksDb);
    let p = &mut self.params;
    p.set("rocksdb.dbname", db.as_ref().display());
    p.set("rocksdb.destroy", destroy);
    p.set("rocksdb.write_buffer_size", 134217728u64);
    p.set("rocksdb.max_write_buffer_number", 2);
    p.set("rocksdb.level0_file_number_compaction_trigger", 4);
    p.set("rocksdb.compression", "no");
    p.set("rocksdb.max_background_flushes", 1);
    p.set("rocksdb.max_background_compactions", 3);
    p.set("rocksdb.use_direct_reads", true);
    p.set("rocksdb.use_direct_io_for_flush_compaction", true);
    self
  }

  /// `pools` holds one `(name, relative size)` pair per worker, in worker order.
  pub fn cachelib(
    &mut self,
    size: u64,
    pools: &[(String, f64)],
    pool_resizer: bool,
    pool_optimizer: bool,
  ) -> Result<&mut Self, ConfigError> {
    if size == 0 {
      return Err(ConfigError::OutOfRange {
        param: "cachelib.size",
        requirement: "must be greater than 0",
      });
    };
    self.check_per_worker("cachelib.pool", pools.len())?;
    let mut seen = HashSet::new();
    if let Some((name, _)) = pools.iter().find(|(name, _)| !seen.insert(name)) {
      return Err(ConfigError::DuplicatePoolName(name.clone()));
    };
    let weights: Vec<f64> = pools.iter().map(|(_, w)| *w).collect();
    check_weights("cachelib.pool.relsize", &weights)?;

    self.select_backend(Backend::CacheLib);
    self.params.set("cachelib.size", size);
    self.params.set("cachelib.poolresizer", on_off(pool_resizer));
    self
      .params
      .set("cachelib.pooloptimizer", on_off(pool_optimizer));
    for (i, (name, relsize)) in pools.iter().enumerate() {
      self.params.set(format!("cachelib.pool.name.{i}"), name);
      self.params.set(format!("cachelib.pool.relsize.{i}"), relsize);
    }
    Ok(self)
  }

  /// One controller-facing endpoint per worker.
  pub fn cachelib_holpaca(&mut self, hosts: &[String]) -> Result<&mut Self, ConfigError> {
    self.check_per_worker("holpaca.host", hosts.len())?;
    if hosts.iter().any(|h| h.trim().is_empty()) {
      return Err(ConfigError::OutOfRange {
        param: "holpaca.host",
        requirement: "must not contain empty addresses",
      });
    };
    self.select_backend(Backend::CacheLibHolpaca);
    self.set_per_worker("holpaca.host", hosts);
    Ok(self)
  }

  /// Every record has a single field of exactly `size` bytes.
  pub fn object_size(&mut self, size: u64) -> Result<&mut Self, ConfigError> {
    if size == 0 {
      return Err(ConfigError::OutOfRange {
        param: "fieldlength",
        requirement: "must be greater than 0",
      });
    };
    self.params.set("fieldlength", size);
    self.params.set("readallfields", false);
    self.params.set("fieldcount", 1);
    Ok(self)
  }

  /// Passthrough for parameters without a dedicated setter.
  pub fn param_override(
    &mut self,
    key: &str,
    value: impl ToString,
  ) -> Result<&mut Self, ConfigError> {
    if key.is_empty() || key.contains(|c: char| c.is_whitespace() || c == '=') {
      return Err(ConfigError::InvalidParamKey(key.to_string()));
    };
    self.params.set(key, value);
    Ok(self)
  }

  pub fn to_args(&self) -> Result<Vec<String>, ConfigError> {
    let backend = self.backend.ok_or(ConfigError::MissingBackend)?;
    let workload = self.workload.as_ref().ok_or(ConfigError::MissingWorkload)?;
    let mut args = vec![
      self.executable.display().to_string(),
      if self.load { "-load" } else { "-run" }.to_string(),
      "-db".to_string(),
      backend.db_name().to_string(),
      "-P".to_string(),
      workload.display().to_string(),
      "-threads".to_string(),
      self.threads.to_string(),
    ];
    if !self.status_to_print.is_empty() {
      args.push("-s".to_string());
      args.extend(self.status_to_print.iter().map(|t| t.to_string()));
    };
    for (k, v) in self.params() {
      args.push("-p".to_string());
      args.push(format!("{k}={v}"));
    }
    Ok(args)
  }

  pub fn to_command(&self) -> Result<String, ConfigError> {
    Ok(self.to_args()?.join(" "))
  }
}
