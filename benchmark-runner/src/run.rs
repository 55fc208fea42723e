use crate::experiment::Experiment;
use crate::experiment::Setup;
use benchmark_types::ycsb::YcsbConfig;
use benchmark_types::ConfigError;
use benchmark_types::DSTAT_FILE;
use benchmark_types::STATUS_LOG_FILE;
use std::error::Error;
use std::fmt;
use std::fmt::Display;
use std::fs;
use std::fs::File;
use std::io;
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::path::PathBuf;
use std::process::Child;
use std::process::Command;
use std::process::ExitStatus;
use std::process::Stdio;
use tracing::info;
use tracing::warn;
use walkdir::WalkDir;

#[derive(Debug)]
pub enum RunError {
  Config(ConfigError),
  Io { path: PathBuf, source: io::Error },
  Spawn { command: String, source: io::Error },
  CommandFailed { command: String, status: ExitStatus },
}

impl Display for RunError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      RunError::Config(e) => write!(f, "{e}"),
      RunError::Io { path, source } => write!(f, "{}: {source}", path.display()),
      RunError::Spawn { command, source } => write!(f, "failed to start `{command}`: {source}"),
      RunError::CommandFailed { command, status } => {
        write!(f, "`{command}` failed with status {status}")
      }
    }
  }
}

impl Error for RunError {}

impl From<ConfigError> for RunError {
  fn from(e: ConfigError) -> Self {
    RunError::Config(e)
  }
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> RunError + '_ {
  move |source| RunError::Io {
    path: path.to_path_buf(),
    source,
  }
}

/// Replaces `db` with a fresh copy of `backup`.
pub fn restore_db(backup: &Path, db: &Path) -> Result<(), RunError> {
  if db.exists() {
    fs::remove_dir_all(db).map_err(io_error(db))?;
  };
  for entry in WalkDir::new(backup) {
    let entry = entry.map_err(|e| RunError::Io {
      path: backup.to_path_buf(),
      source: e.into(),
    })?;
    let Ok(rel) = entry.path().strip_prefix(backup) else {
      continue;
    };
    let target = db.join(rel);
    if entry.file_type().is_dir() {
      fs::create_dir_all(&target).map_err(io_error(&target))?;
    } else {
      fs::copy(entry.path(), &target).map_err(io_error(&target))?;
    };
  }
  Ok(())
}

fn shell(script: &str) -> Command {
  let mut cmd = Command::new("bash");
  cmd.arg("-c").arg(script);
  cmd
}

fn wait(command: String, mut cmd: Command) -> Result<(), RunError> {
  let status = cmd
    .status()
    .map_err(|source| RunError::Spawn {
      command: command.clone(),
      source,
    })?;
  if !status.success() {
    return Err(RunError::CommandFailed { command, status });
  };
  Ok(())
}

/// Runs a setup or cleanup script to completion. Its output is discarded.
pub fn run_script(script: &str) -> Result<(), RunError> {
  info!(script, "running script");
  let mut cmd = shell(script);
  cmd.stdout(Stdio::null());
  wait(script.to_string(), cmd)
}

fn spawn(command: String, mut cmd: Command) -> Result<Child, RunError> {
  cmd
    .spawn()
    .map_err(|source| RunError::Spawn { command, source })
}

fn stop(name: &str, mut child: Child) {
  if let Err(err) = child.kill() {
    warn!(name, error = %err, "failed to kill background process");
  };
  if let Err(err) = child.wait() {
    warn!(name, error = %err, "failed to reap background process");
  };
}

/// Starts a long-running controller as the leader of its own process group.
pub fn spawn_controller(script: &str) -> Result<Child, RunError> {
  let mut cmd = shell(script);
  cmd.stdout(Stdio::null()).process_group(0);
  spawn(script.to_string(), cmd)
}

/// Kills the controller together with every process it forked.
pub fn stop_controller(mut child: Child) {
  let pgid = child.id() as libc::pid_t;
  if unsafe { libc::killpg(pgid, libc::SIGKILL) } != 0 {
    warn!(pgid, error = %io::Error::last_os_error(), "failed to kill controller process group");
  };
  if let Err(err) = child.wait() {
    warn!(error = %err, "failed to reap controller");
  };
}

/// The full command line of the benchmark, confined to `memory_limit` when one is set.
pub fn benchmark_args(config: &YcsbConfig, memory_limit: Option<&str>) -> Result<Vec<String>, RunError> {
  let mut args = Vec::new();
  if let Some(limit) = memory_limit {
    args.extend([
      "systemd-run".to_string(),
      "--scope".to_string(),
      "-p".to_string(),
      format!("MemoryMax={limit}"),
      "--user".to_string(),
    ]);
  };
  args.extend(config.to_args()?);
  Ok(args)
}

fn benchmark(args: &[String]) -> Command {
  let mut cmd = Command::new(&args[0]);
  cmd.args(&args[1..]);
  cmd
}

/// Populates the backup database. The benchmark's output is discarded.
pub fn load(config: &YcsbConfig) -> Result<(), RunError> {
  let args = benchmark_args(config, None)?;
  info!(command = %args.join(" "), "populating database");
  let mut cmd = benchmark(&args);
  cmd.stdout(Stdio::null());
  wait(args.join(" "), cmd)?;
  info!("database populated");
  Ok(())
}

/// One run of one setup. The status log and dstat samples are written into `dir`.
pub fn execute(
  experiment: &Experiment,
  setup: &Setup,
  config: &YcsbConfig,
  dir: &Path,
) -> Result<(), RunError> {
  fs::create_dir_all(dir).map_err(io_error(dir))?;
  info!(setup = %setup.id, dir = %dir.display(), "restoring database");
  restore_db(&experiment.db_backup, &experiment.db)?;
  if let Some(script) = &setup.setup {
    run_script(script)?;
  };

  let controller = match &setup.controller {
    Some(script) => Some(spawn_controller(script)?),
    None => None,
  };

  let dstat_path = dir.join(DSTAT_FILE);
  let dstat_out = File::create(&dstat_path).map_err(io_error(&dstat_path))?;
  let mut dstat_cmd = Command::new("dstat");
  dstat_cmd.arg("-rcdgmn").stdout(dstat_out);
  let dstat = spawn("dstat -rcdgmn".to_string(), dstat_cmd)?;

  let args = benchmark_args(config, experiment.memory_limit.as_deref())?;
  let log_path = dir.join(STATUS_LOG_FILE);
  let result = File::create(&log_path)
    .map_err(io_error(&log_path))
    .and_then(|log| {
      info!(setup = %setup.id, command = %args.join(" "), "running benchmark");
      let mut cmd = benchmark(&args);
      cmd.stdout(log);
      wait(args.join(" "), cmd)
    });

  // Background processes are stopped even if the benchmark failed.
  let cleanup = match &setup.cleanup {
    Some(script) => run_script(script),
    None => Ok(()),
  };
  stop("dstat", dstat);
  if let Some(controller) = controller {
    stop_controller(controller);
  };
  result?;
  cleanup?;
  info!(setup = %setup.id, dir = %dir.display(), "run complete");
  Ok(())
}
