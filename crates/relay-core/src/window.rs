use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{errors::Error, Result};

/// Inclusive time range during which posts are relayed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MonitoringWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowPhase {
    NotStarted,
    Active,
    Ended,
}

/// Snapshot of the window relative to a point in time.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct WindowStatus {
    pub now: DateTime<Utc>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub phase: WindowPhase,
    pub active: bool,
    pub days_until_start: i64,
    pub days_until_end: i64,
    pub days_since_end: i64,
}

impl MonitoringWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        if start > end {
            return Err(Error::Config(format!(
                "monitoring window starts after it ends ({start} > {end})"
            )));
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.start <= ts && ts <= self.end
    }

    pub fn status(&self, now: DateTime<Utc>) -> WindowStatus {
        let phase = if now < self.start {
            WindowPhase::NotStarted
        } else if now > self.end {
            WindowPhase::Ended
        } else {
            WindowPhase::Active
        };

        let days_until_start = if now < self.start {
            (self.start - now).num_days()
        } else {
            0
        };
        let days_until_end = if now < self.end {
            (self.end - now).num_days()
        } else {
            0
        };
        let days_since_end = if now > self.end {
            (now - self.end).num_days()
        } else {
            0
        };

        WindowStatus {
            now,
            start: self.start,
            end: self.end,
            phase,
            active: phase == WindowPhase::Active,
            days_until_start,
            days_until_end,
            days_since_end,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn window() -> MonitoringWindow {
        MonitoringWindow::new(
            Utc.with_ymd_and_hms(2025, 8, 17, 20, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2026, 8, 17, 20, 0, 0).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn contains_is_inclusive_at_both_edges() {
        let w = window();
        assert!(w.contains(w.start));
        assert!(w.contains(w.end));
        assert!(!w.contains(w.start - Duration::seconds(1)));
        assert!(!w.contains(w.end + Duration::seconds(1)));
    }

    #[test]
    fn rejects_inverted_window() {
        let w = window();
        assert!(MonitoringWindow::new(w.end, w.start).is_err());
        assert!(MonitoringWindow::new(w.start, w.start).is_ok());
    }

    #[test]
    fn status_counts_whole_days() {
        let w = window();

        let before = w.status(w.start - Duration::hours(50));
        assert_eq!(before.phase, WindowPhase::NotStarted);
        assert!(!before.active);
        assert_eq!(before.days_until_start, 2);

        let during = w.status(w.end - Duration::hours(30));
        assert_eq!(during.phase, WindowPhase::Active);
        assert!(during.active);
        assert_eq!(during.days_until_start, 0);
        assert_eq!(during.days_until_end, 1);

        let after = w.status(w.end + Duration::days(3));
        assert_eq!(after.phase, WindowPhase::Ended);
        assert_eq!(after.days_until_end, 0);
        assert_eq!(after.days_since_end, 3);
    }
}
