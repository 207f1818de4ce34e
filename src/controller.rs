//! The poll loop: evaluate the schedule once per tick and drive the external
//! tool only when the wanted mode differs from the one last applied.
//!
//! Nothing in here is fatal. A config that cannot be read is replaced by the
//! last one that could (or the defaults), and a failed apply leaves the
//! recorded mode untouched so the next tick tries the same transition again.

use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::config::{Config, ConfigSource};
use crate::error::Result;
use crate::notify::{transition_message, Notifier};
use crate::redshift::ProcessController;
use crate::schedule::{evaluate, OperatingMode};
use crate::shutdown::Shutdown;
use crate::status::StatusFile;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

// Repeated failures are logged on the first occurrence and then every Nth
const LOG_EVERY: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Applying,
    Sleeping,
}

/// What a single tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Applied(OperatingMode),
    Unchanged(OperatingMode),
    Failed(OperatingMode),
}

/// Mode the external tool was last successfully put into. `None` until the
/// first apply succeeds, so the first tick always acts.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ControllerState {
    pub last_applied: Option<OperatingMode>,
}

pub struct PollingController<S, P, N, K> {
    source: S,
    process: P,
    notifier: N,
    clock: K,
    status: Option<StatusFile>,
    poll_interval: Duration,
    state: ControllerState,
    phase: Phase,
    last_good: Option<Config>,
    config_failures: u32,
    apply_failures: u32,
}

impl<S, P, N, K> PollingController<S, P, N, K>
where
    S: ConfigSource,
    P: ProcessController,
    N: Notifier,
    K: Clock,
{
    pub fn new(source: S, process: P, notifier: N, clock: K, poll_interval: Duration) -> Self {
        PollingController {
            source,
            process,
            notifier,
            clock,
            status: None,
            poll_interval,
            state: ControllerState::default(),
            phase: Phase::Idle,
            last_good: None,
            config_failures: 0,
            apply_failures: 0,
        }
    }

    pub fn with_status_file(mut self, status: StatusFile) -> Self {
        self.status = Some(status);
        self
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Fresh configuration, or the best fallback when it cannot be loaded.
    pub fn current_config(&mut self) -> Config {
        match self.source.load() {
            Ok(config) => {
                if self.config_failures > 0 {
                    info!("Config readable again after {} failed attempts", self.config_failures);
                    self.config_failures = 0;
                }
                self.last_good = Some(config.clone());
                config
            }
            Err(e) => {
                self.config_failures += 1;
                let fallback = match &self.last_good {
                    Some(config) => (config.clone(), "last loaded"),
                    None => (Config::default(), "default"),
                };
                if self.config_failures == 1 || self.config_failures % LOG_EVERY == 0 {
                    warn!(
                        "Config unavailable ({}), using {} configuration (failures: {})",
                        e, fallback.1, self.config_failures
                    );
                }
                fallback.0
            }
        }
    }

    pub fn tick(&mut self) -> TickOutcome {
        self.phase = Phase::Idle;
        let config = self.current_config();
        let now = self.clock.now();
        let desired = evaluate(now, &config.schedule, config.enabled, &config.temps);

        if self.state.last_applied == Some(desired) {
            debug!("{}: {} unchanged", now, desired);
            return TickOutcome::Unchanged(desired);
        }

        self.phase = Phase::Applying;
        let outcome = match self.apply(desired) {
            Ok(()) => {
                if self.apply_failures > 0 {
                    info!("Applied {} after {} failed attempts", desired, self.apply_failures);
                    self.apply_failures = 0;
                }
                info!("{}: switched to {} (schedule {})", now, desired, config.schedule);
                TickOutcome::Applied(desired)
            }
            Err(e) => {
                self.apply_failures += 1;
                if self.apply_failures == 1 || self.apply_failures % LOG_EVERY == 0 {
                    error!(
                        "Failed to apply {} (attempt {}): {} - retrying next poll",
                        desired, self.apply_failures, e
                    );
                }
                TickOutcome::Failed(desired)
            }
        };
        self.phase = Phase::Idle;
        outcome
    }

    /// Poll until `shutdown` fires, then turn the colour adjustment off.
    pub fn run(&mut self, shutdown: &Shutdown) {
        info!("Polling every {:?}", self.poll_interval);
        while !shutdown.is_triggered() {
            self.tick();
            self.phase = Phase::Sleeping;
            if shutdown.wait_timeout(self.poll_interval) {
                break;
            }
        }
        self.phase = Phase::Idle;

        info!("Shutdown requested");
        if let Err(e) = self.shutdown() {
            error!("Failed to disable colour adjustment on exit: {}", e);
        }
    }

    /// Drive the tool to `Off` regardless of what was applied last.
    pub fn shutdown(&mut self) -> Result<()> {
        self.phase = Phase::Applying;
        let result = self.apply(OperatingMode::Off);
        self.phase = Phase::Idle;
        result
    }

    fn apply(&mut self, mode: OperatingMode) -> Result<()> {
        self.process.apply(mode)?;
        self.state.last_applied = Some(mode);

        self.notifier.notify(&transition_message(mode));
        if let Some(status) = &self.status {
            if let Err(e) = status.write(mode) {
                warn!("Failed to write status file {:?}: {}", status.path(), e);
            }
        }
        Ok(())
    }
}
