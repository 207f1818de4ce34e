//! Night/day window evaluation.
//!
//! A window is the half-open interval `[start, stop)` on the 24 hour clock.
//! When `start >= stop` the interval wraps past midnight, so `start == stop`
//! covers the whole day.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::clock::TimeOfDay;

pub const DEFAULT_START: TimeOfDay = TimeOfDay::hm(21, 0);
pub const DEFAULT_STOP: TimeOfDay = TimeOfDay::hm(8, 0);
pub const DEFAULT_DAY_TEMP: u32 = 5800;
pub const DEFAULT_NIGHT_TEMP: u32 = 4800;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Window {
    #[serde(with = "hhmm")]
    pub start: TimeOfDay,
    #[serde(with = "hhmm")]
    pub stop: TimeOfDay,
}

impl Window {
    pub fn new(start: TimeOfDay, stop: TimeOfDay) -> Self {
        Window { start, stop }
    }

    pub fn wraps_midnight(&self) -> bool {
        self.start >= self.stop
    }

    /// Night-mode membership of `now`.
    pub fn contains(&self, now: TimeOfDay) -> bool {
        if self.wraps_midnight() {
            now >= self.start || now < self.stop
        } else {
            self.start <= now && now < self.stop
        }
    }
}

impl Default for Window {
    fn default() -> Self {
        Window::new(DEFAULT_START, DEFAULT_STOP)
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.stop)
    }
}

/// Target temperatures in Kelvin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Temperatures {
    pub day: u32,
    pub night: u32,
}

impl Default for Temperatures {
    fn default() -> Self {
        Temperatures {
            day: DEFAULT_DAY_TEMP,
            night: DEFAULT_NIGHT_TEMP,
        }
    }
}

/// What the external tool should be doing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperatingMode {
    Day(u32),
    Night(u32),
    /// Colour adjustment disabled. How that is expressed to the tool is up to
    /// the process controller.
    Off,
}

impl OperatingMode {
    pub fn temperature(&self) -> Option<u32> {
        match *self {
            OperatingMode::Day(t) | OperatingMode::Night(t) => Some(t),
            OperatingMode::Off => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            OperatingMode::Day(_) => "day",
            OperatingMode::Night(_) => "night",
            OperatingMode::Off => "off",
        }
    }
}

impl fmt::Display for OperatingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.temperature() {
            Some(t) => write!(f, "{} ({}K)", self.label(), t),
            None => f.write_str(self.label()),
        }
    }
}

pub fn evaluate(now: TimeOfDay, window: &Window, enabled: bool, temps: &Temperatures) -> OperatingMode {
    if !enabled {
        OperatingMode::Off
    } else if window.contains(now) {
        OperatingMode::Night(temps.night)
    } else {
        OperatingMode::Day(temps.day)
    }
}

// Window times live in the JSON file as "HH:MM" strings
mod hhmm {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    use crate::clock::TimeOfDay;

    pub fn serialize<S: Serializer>(time: &TimeOfDay, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(time)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<TimeOfDay, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(D::Error::custom)
    }
}
