//! Active-hours guard.

use chrono::{DateTime, Local, TimeZone, Timelike};

use crate::error::ConfigError;

/// Local-time hours `[start_hour, end_hour)` during which a run may work.
///
/// `start_hour > end_hour` wraps past midnight (e.g. 22 → 6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunWindow {
    start_hour: u32,
    end_hour: u32,
}

impl RunWindow {
    pub fn new(start_hour: u32, end_hour: u32) -> Result<Self, ConfigError> {
        if start_hour > 23 || end_hour > 24 {
            return Err(ConfigError::invalid(
                "TRIAGE_ACTIVE_START_HOUR",
                format!("hours out of range: {start_hour}..{end_hour}"),
            ));
        }
        if start_hour == end_hour {
            return Err(ConfigError::invalid(
                "TRIAGE_ACTIVE_END_HOUR",
                "active window is empty",
            ));
        }
        Ok(Self {
            start_hour,
            end_hour,
        })
    }

    pub fn contains_hour(&self, hour: u32) -> bool {
        if self.start_hour < self.end_hour {
            (self.start_hour..self.end_hour).contains(&hour)
        } else {
            hour >= self.start_hour || hour < self.end_hour
        }
    }

    pub fn is_open_at<Tz: TimeZone>(&self, at: &DateTime<Tz>) -> bool {
        self.contains_hour(at.hour())
    }

    pub fn is_open_now(&self) -> bool {
        self.is_open_at(&Local::now())
    }
}

impl Default for RunWindow {
    fn default() -> Self {
        Self {
            start_hour: 9,
            end_hour: 23,
        }
    }
}
