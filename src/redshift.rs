//! Driving the external `redshift` binary.

use std::ffi::OsStr;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, sleep};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::config::validate_temperature;
use crate::error::{Result, SchedulerError};
use crate::schedule::OperatingMode;

pub const DEFAULT_PROGRAM: &str = "redshift";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

const WAIT_STEP: Duration = Duration::from_millis(20);

/// Puts the display into a given mode.
///
/// Implementations must be idempotent: applying the mode that is already
/// active leaves the display exactly as it was.
#[cfg_attr(test, mockall::automock)]
pub trait ProcessController {
    fn apply(&mut self, mode: OperatingMode) -> Result<()>;
}

/// How a bounded child process ended.
#[derive(Debug)]
pub struct Finished {
    pub status: ExitStatus,
    /// Trimmed stderr output, lossily decoded.
    pub stderr: String,
}

impl Finished {
    fn into_result(self, program: &Path) -> Result<()> {
        if self.status.success() {
            Ok(())
        } else {
            Err(SchedulerError::ExitStatus {
                program: program.display().to_string(),
                status: self.status,
                stderr: self.stderr,
            })
        }
    }
}

/// Runs `program` with `args`, waiting at most `timeout` for it to exit.
/// A child still running at the deadline is killed and reaped. A timeout
/// too large to express as a deadline never expires.
pub fn run_bounded<I, S>(program: &Path, args: I, timeout: Duration) -> Result<Finished>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let name = program.display().to_string();
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| SchedulerError::Spawn {
            program: name.clone(),
            source: e,
        })?;

    // Drained on its own thread so a chatty child cannot fill the pipe
    let stderr = child.stderr.take().map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            String::from_utf8_lossy(&buf).trim().to_string()
        })
    });

    let deadline = Instant::now().checked_add(timeout);
    loop {
        match child.try_wait() {
            Ok(Some(status)) => {
                let stderr = stderr
                    .and_then(|reader| reader.join().ok())
                    .unwrap_or_default();
                if !stderr.is_empty() {
                    debug!("{} stderr: {}", name, stderr);
                }
                return Ok(Finished { status, stderr });
            }
            Ok(None) => {
                if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                    reap(&mut child, &name);
                    return Err(SchedulerError::Timeout { program: name, timeout });
                }
                sleep(WAIT_STEP);
            }
            Err(e) => {
                reap(&mut child, &name);
                return Err(e.into());
            }
        }
    }
}

fn reap(child: &mut Child, name: &str) {
    if let Err(e) = child.kill() {
        debug!("Failed to kill {}: {}", name, e);
    }
    if let Err(e) = child.wait() {
        debug!("Failed to reap {}: {}", name, e);
    }
}

/// [`run_bounded`] that also treats a non-zero exit as an error.
pub fn run_checked<I, S>(program: &Path, args: I, timeout: Duration) -> Result<()>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    run_bounded(program, args, timeout)?.into_result(program)
}

/// One-shot redshift invocations.
///
/// Any running instance (for example one left in continuous mode by another
/// front-end) is terminated first. A temperature is then set with
/// `redshift -P -O <K>`, where `-P` resets the existing gamma ramps so that
/// repeating the call does not compound the adjustment. `Off` resets the
/// display with `redshift -x`.
#[derive(Debug, Clone)]
pub struct Redshift {
    program: PathBuf,
    timeout: Duration,
}

impl Default for Redshift {
    fn default() -> Self {
        Redshift::new(DEFAULT_PROGRAM, DEFAULT_TIMEOUT)
    }
}

impl Redshift {
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Redshift {
            program: program.into(),
            timeout,
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    // Process name as seen by pkill
    fn process_name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| DEFAULT_PROGRAM.to_string())
    }

    /// Terminate running instances. Exact name match so this daemon, whose
    /// own name starts with "redshift", is never hit.
    pub fn kill_running(&self) -> Result<()> {
        let name = self.process_name();
        match run_bounded(Path::new("pkill"), ["-x", name.as_str()], self.timeout) {
            // 1 means nothing matched
            Ok(finished) if finished.status.code() == Some(1) => Ok(()),
            Ok(finished) => finished.into_result(Path::new("pkill")),
            Err(SchedulerError::Spawn { source, .. }) if source.kind() == ErrorKind::NotFound => {
                warn!("pkill not available, cannot stop running {} instances", name);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    pub fn set_temperature(&self, kelvin: u32) -> Result<()> {
        let kelvin = validate_temperature("target", kelvin)?;
        self.kill_running()?;
        run_checked(&self.program, ["-P", "-O", &kelvin.to_string()], self.timeout)?;
        debug!("{} set to {}K", self.program.display(), kelvin);
        Ok(())
    }

    pub fn reset(&self) -> Result<()> {
        self.kill_running()?;
        run_checked(&self.program, ["-x"], self.timeout)?;
        debug!("{} reset", self.program.display());
        Ok(())
    }
}

impl ProcessController for Redshift {
    fn apply(&mut self, mode: OperatingMode) -> Result<()> {
        match mode.temperature() {
            Some(kelvin) => self.set_temperature(kelvin),
            None => self.reset(),
        }
    }
}
