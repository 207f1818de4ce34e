//! Wall-clock time of day at minute resolution.

use std::fmt;
use std::str::FromStr;

use chrono::{Local, Timelike};

use crate::error::SchedulerError;

pub const MINUTES_PER_DAY: u16 = 24 * 60;

/// Minutes since local midnight, always in `0..1440`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeOfDay(u16);

impl TimeOfDay {
    pub const MIDNIGHT: TimeOfDay = TimeOfDay(0);

    /// Compile-time constructor for known-good constants.
    pub const fn hm(hour: u16, minute: u16) -> Self {
        assert!(hour < 24 && minute < 60);
        TimeOfDay(hour * 60 + minute)
    }

    pub fn new(hour: u32, minute: u32) -> Option<Self> {
        if hour < 24 && minute < 60 {
            Some(TimeOfDay((hour * 60 + minute) as u16))
        } else {
            None
        }
    }

    pub fn from_minutes(minutes: u16) -> Option<Self> {
        (minutes < MINUTES_PER_DAY).then_some(TimeOfDay(minutes))
    }

    pub fn minutes(self) -> u16 {
        self.0
    }

    pub fn hour(self) -> u16 {
        self.0 / 60
    }

    pub fn minute(self) -> u16 {
        self.0 % 60
    }

    /// Every minute of the day, in order.
    pub fn all() -> impl Iterator<Item = TimeOfDay> {
        (0..MINUTES_PER_DAY).map(TimeOfDay)
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour(), self.minute())
    }
}

impl FromStr for TimeOfDay {
    type Err = SchedulerError;

    // Accepts "H:MM" and "HH:MM"
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason| SchedulerError::InvalidTime {
            value: s.to_string(),
            reason,
        };

        let (hour, minute) = s.trim().split_once(':').ok_or_else(|| invalid("expected HH:MM"))?;
        let digits = |part: &str| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit());
        if !digits(hour) || hour.len() > 2 || !digits(minute) || minute.len() != 2 {
            return Err(invalid("expected HH:MM"));
        }

        let hour: u32 = hour.parse().map_err(|_| invalid("expected HH:MM"))?;
        let minute: u32 = minute.parse().map_err(|_| invalid("expected HH:MM"))?;
        if hour > 23 {
            return Err(invalid("hour must be 0-23"));
        }
        if minute > 59 {
            return Err(invalid("minute must be 0-59"));
        }

        Ok(TimeOfDay((hour * 60 + minute) as u16))
    }
}

/// Source of the current time of day.
pub trait Clock {
    fn now(&self) -> TimeOfDay;
}

/// Local wall clock. No timezone handling beyond what the system reports.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalClock;

impl Clock for LocalClock {
    fn now(&self) -> TimeOfDay {
        let now = Local::now();
        TimeOfDay((now.hour() * 60 + now.minute()) as u16)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str) -> TimeOfDay {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_and_display() {
        assert_eq!(t("21:00").minutes(), 21 * 60);
        assert_eq!(t("08:05").minutes(), 8 * 60 + 5);
        assert_eq!(t("8:05").to_string(), "08:05");
        assert_eq!(t("00:00"), TimeOfDay::MIDNIGHT);
        assert_eq!(t("23:59").to_string(), "23:59");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for bad in ["", "21", "24:00", "12:60", "12:5", "ab:cd", "-1:00", "12:00:00", "123:00"] {
            let err = bad.parse::<TimeOfDay>().unwrap_err();
            assert!(err.is_config_error(), "{bad:?} gave {err}");
        }
    }

    #[test]
    fn test_ordering_is_numeric() {
        // "9:00" would sort after "10:00" as a string
        assert!(t("9:00") < t("10:00"));
        assert!(t("23:59") > t("00:01"));
    }

    #[test]
    fn test_constructors() {
        assert_eq!(TimeOfDay::new(23, 59).map(|x| x.minutes()), Some(1439));
        assert_eq!(TimeOfDay::new(24, 0), None);
        assert_eq!(TimeOfDay::from_minutes(1440), None);
        assert_eq!(TimeOfDay::all().count(), 1440);
    }

    #[test]
    fn test_local_clock_in_range() {
        assert!(LocalClock.now().minutes() < MINUTES_PER_DAY);
    }
}
