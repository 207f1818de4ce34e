//! Desktop notifications on mode changes.

use std::path::Path;
use std::time::Duration;

use tracing::debug;

use crate::redshift::run_checked;
use crate::schedule::OperatingMode;

const NOTIFY_TIMEOUT: Duration = Duration::from_secs(5);
const SUMMARY: &str = "Redshift";

/// Fire-and-forget notification sink. Must never fail the caller.
#[cfg_attr(test, mockall::automock)]
pub trait Notifier {
    fn notify(&mut self, message: &str);
}

pub fn transition_message(mode: OperatingMode) -> String {
    match mode.temperature() {
        Some(kelvin) => format!("Redshift: {}K mode", kelvin),
        None => "Redshift disabled".to_string(),
    }
}

/// Sends notifications through `notify-send`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NotifySend;

impl Notifier for NotifySend {
    fn notify(&mut self, message: &str) {
        if let Err(e) = run_checked(Path::new("notify-send"), [SUMMARY, message], NOTIFY_TIMEOUT) {
            debug!("Notification not delivered: {}", e);
        }
    }
}

impl<T: Notifier + ?Sized> Notifier for Box<T> {
    fn notify(&mut self, message: &str) {
        (**self).notify(message)
    }
}

/// Drops every notification (`--no-notify`).
#[derive(Debug, Default, Clone, Copy)]
pub struct Silent;

impl Notifier for Silent {
    fn notify(&mut self, _message: &str) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        assert_eq!(transition_message(OperatingMode::Night(4800)), "Redshift: 4800K mode");
        assert_eq!(transition_message(OperatingMode::Day(5800)), "Redshift: 5800K mode");
        assert_eq!(transition_message(OperatingMode::Off), "Redshift disabled");
    }
}
