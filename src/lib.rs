//! Night/day scheduling for the `redshift` colour temperature tool.
//!
//! [`schedule::evaluate`] decides which mode the display should be in at a
//! given time of day; [`controller::PollingController`] polls it and drives
//! the external tool only when that mode changes.

pub mod clock;
pub mod config;
pub mod controller;
pub mod error;
pub mod notify;
pub mod pidfile;
pub mod redshift;
pub mod schedule;
pub mod shutdown;
pub mod status;

pub use clock::{Clock, LocalClock, TimeOfDay};
pub use config::{Config, ConfigSource, FileConfigSource};
pub use controller::{PollingController, TickOutcome};
pub use error::{Result, SchedulerError};
pub use schedule::{evaluate, OperatingMode, Temperatures, Window};
pub use shutdown::Shutdown;
