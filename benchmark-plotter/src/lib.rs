use benchmark_types::ConfigError;
use std::error::Error;
use std::fmt;
use std::fmt::Display;
use std::io;
use std::path::PathBuf;

pub mod dstat;
pub mod extract;
pub mod metric;
pub mod render;
pub mod report;
pub mod series;
pub mod status;

#[derive(Debug)]
pub enum ExtractError {
  /// The run has not finished (or failed) and left no file behind.
  MissingFile(PathBuf),
  Io { path: PathBuf, source: io::Error },
  InvalidManifest { path: PathBuf, source: serde_json::Error },
  Manifest(ConfigError),
  MissingDistribution { worker: usize },
}

impl Display for ExtractError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ExtractError::MissingFile(path) => write!(f, "{} does not exist", path.display()),
      ExtractError::Io { path, source } => write!(f, "failed to read {}: {source}", path.display()),
      ExtractError::InvalidManifest { path, source } => {
        write!(f, "failed to parse manifest {}: {source}", path.display())
      }
      ExtractError::Manifest(e) => write!(f, "invalid manifest: {e}"),
      ExtractError::MissingDistribution { worker } => {
        write!(f, "no request distribution found for worker {worker}")
      }
    }
  }
}

impl Error for ExtractError {}

impl From<ConfigError> for ExtractError {
  fn from(e: ConfigError) -> Self {
    ExtractError::Manifest(e)
  }
}

#[derive(Debug)]
pub enum RenderError {
  Chart(String),
  Io { path: PathBuf, source: io::Error },
}

impl Display for RenderError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      RenderError::Chart(e) => write!(f, "failed to draw chart: {e}"),
      RenderError::Io { path, source } => write!(f, "failed to write {}: {source}", path.display()),
    }
  }
}

impl Error for RenderError {}

#[derive(Debug)]
pub enum ReportError {
  Extract(ExtractError),
  Render(RenderError),
}

impl Display for ReportError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ReportError::Extract(e) => write!(f, "{e}"),
      ReportError::Render(e) => write!(f, "{e}"),
    }
  }
}

impl Error for ReportError {}

impl From<ExtractError> for ReportError {
  fn from(e: ExtractError) -> Self {
    ReportError::Extract(e)
  }
}

impl From<RenderError> for ReportError {
  fn from(e: RenderError) -> Self {
    ReportError::Render(e)
  }
}

impl From<ConfigError> for ReportError {
  fn from(e: ConfigError) -> Self {
    ReportError::Extract(e.into())
  }
}
