//! Error type shared by every part of the scheduler.

use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;

pub type Result<T> = std::result::Result<T, SchedulerError>;

#[derive(thiserror::Error, Debug)]
pub enum SchedulerError {
    // Configuration
    #[error("Config file not found: {0}")]
    ConfigMissing(PathBuf),

    #[error("Failed to read config {path}: {source}")]
    ConfigRead { path: PathBuf, source: io::Error },

    #[error("Failed to parse config: {0}")]
    ConfigParse(#[from] serde_json::Error),

    #[error("Invalid time of day {value:?}: {reason}")]
    InvalidTime { value: String, reason: &'static str },

    #[error("Invalid {field} temperature {value}K (must be {min}-{max}K)")]
    InvalidTemperature {
        field: &'static str,
        value: u32,
        min: u32,
        max: u32,
    },

    #[error("Failed to write {path}: {source}")]
    FileWrite { path: PathBuf, source: io::Error },

    // External processes
    #[error("Failed to start {program}: {source}")]
    Spawn { program: String, source: io::Error },

    #[error("{program} exited with {status}{}", stderr_suffix(.stderr))]
    ExitStatus {
        program: String,
        status: ExitStatus,
        stderr: String,
    },

    #[error("{program} did not finish within {timeout:?}")]
    Timeout { program: String, timeout: Duration },

    // Lifecycle
    #[error("Another instance is running (PID {0})")]
    AlreadyRunning(i32),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl SchedulerError {
    /// True for failures that the controller recovers from by substituting a
    /// fallback configuration.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SchedulerError::ConfigMissing(_)
                | SchedulerError::ConfigRead { .. }
                | SchedulerError::ConfigParse(_)
                | SchedulerError::InvalidTime { .. }
                | SchedulerError::InvalidTemperature { .. }
        )
    }

    /// True for failures of the external colour tool, retried on the next tick.
    pub fn is_process_error(&self) -> bool {
        matches!(
            self,
            SchedulerError::Spawn { .. }
                | SchedulerError::ExitStatus { .. }
                | SchedulerError::Timeout { .. }
        )
    }
}

fn stderr_suffix(stderr: &str) -> String {
    if stderr.is_empty() {
        String::new()
    } else {
        format!(": {}", stderr)
    }
}
