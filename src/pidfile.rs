//! Single-instance guard for the daemon.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{Result, SchedulerError};

pub const DEFAULT_PID_PATH: &str = "/tmp/redshift-scheduler.pid";

/// Holds the PID file for the lifetime of the process and removes it on drop.
#[derive(Debug)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    pub fn acquire(path: impl Into<PathBuf>) -> Result<PidFile> {
        let path = path.into();

        if let Some(pid) = read_pid(&path) {
            if pid != std::process::id() as i32 && process_alive(pid) {
                return Err(SchedulerError::AlreadyRunning(pid));
            }
            debug!("Removing stale PID file {:?} (PID {})", path, pid);
        }
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(SchedulerError::FileWrite { path, source: e }),
        }

        let write_err = |source| SchedulerError::FileWrite {
            path: path.clone(),
            source,
        };
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(write_err)?;
        writeln!(file, "{}", std::process::id()).map_err(write_err)?;

        debug!("PID file written: {:?}", path);
        Ok(PidFile { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!("Failed to remove PID file {:?}: {}", self.path, e);
        }
    }
}

fn read_pid(path: &Path) -> Option<i32> {
    fs::read_to_string(path).ok()?.trim().parse().ok()
}

fn process_alive(pid: i32) -> bool {
    // kill(0, ..) and negative PIDs address process groups
    if pid <= 0 {
        return false;
    }
    // SAFETY: signal 0 performs only the existence and permission check.
    if unsafe { libc::kill(pid, 0) } == 0 {
        return true;
    }
    io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}
