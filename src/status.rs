//! Status file read by the tray applet and the `status` subcommand.
//!
//! Format: the mode (`day`, `night` or `off`) on the first line, the applied
//! temperature on the second line unless the mode is `off`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::config::write_atomic;
use crate::error::Result;
use crate::schedule::OperatingMode;

pub const DEFAULT_STATUS_PATH: &str = "/tmp/redshift-scheduler.status";

#[derive(Debug, Clone)]
pub struct StatusFile {
    path: PathBuf,
}

impl StatusFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        StatusFile { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write(&self, mode: OperatingMode) -> Result<()> {
        let contents = match mode.temperature() {
            Some(kelvin) => format!("{}\n{}\n", mode.label(), kelvin),
            None => format!("{}\n", mode.label()),
        };
        write_atomic(&self.path, contents.as_bytes())
    }

    pub fn read(&self) -> Result<OperatingMode> {
        let contents = fs::read_to_string(&self.path)?;
        parse(&contents).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unrecognised status file {}", self.path.display()),
            )
            .into()
        })
    }
}

fn parse(contents: &str) -> Option<OperatingMode> {
    let mut lines = contents.lines().map(str::trim);
    let label = lines.next()?;
    let mut temperature = || lines.next().and_then(|l| l.parse::<u32>().ok());
    match label {
        "off" => Some(OperatingMode::Off),
        "day" => temperature().map(OperatingMode::Day),
        "night" => temperature().map(OperatingMode::Night),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_and_read() {
        let dir = TempDir::new().unwrap();
        let status = StatusFile::new(dir.path().join("status"));

        status.write(OperatingMode::Night(4800)).unwrap();
        assert_eq!(fs::read_to_string(status.path()).unwrap(), "night\n4800\n");
        assert_eq!(status.read().unwrap(), OperatingMode::Night(4800));

        status.write(OperatingMode::Off).unwrap();
        assert_eq!(status.read().unwrap(), OperatingMode::Off);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(parse("day\n5800"), Some(OperatingMode::Day(5800)));
        assert_eq!(parse("night"), None);
        assert_eq!(parse("on\n4800"), None);
        assert_eq!(parse(""), None);
    }

    #[test]
    fn test_read_missing() {
        let dir = TempDir::new().unwrap();
        let status = StatusFile::new(dir.path().join("absent"));
        assert!(status.read().is_err());
    }
}
