//! Wall-clock access for date validation and analysis ids.

use chrono::{DateTime, Local, NaiveDate, Utc};

/// Source of the current date and time.
pub trait Clock {
    /// Current local calendar date.
    fn today(&self) -> NaiveDate;

    /// Milliseconds since the Unix epoch.
    fn now_millis(&self) -> i64;
}

/// The system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }

    fn now_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// A clock frozen at one instant, for deterministic runs.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    instant: DateTime<Utc>,
}

impl FixedClock {
    /// Freeze the clock at midnight UTC of `date`.
    pub fn at_date(date: NaiveDate) -> Self {
        Self {
            instant: date.and_time(chrono::NaiveTime::MIN).and_utc(),
        }
    }
}

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.instant.date_naive()
    }

    fn now_millis(&self) -> i64 {
        self.instant.timestamp_millis()
    }
}

/// Whole days from `date` to `today`; negative when `date` is in the future.
pub fn days_between(date: NaiveDate, today: NaiveDate) -> i64 {
    (today - date).num_days()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_clock() {
        let date = NaiveDate::from_ymd_opt(2024, 7, 1).unwrap();
        let clock = FixedClock::at_date(date);
        assert_eq!(clock.today(), date);
        assert_eq!(clock.now_millis(), 1_719_792_000_000);
    }

    #[test]
    fn test_days_between() {
        let today = NaiveDate::from_ymd_opt(2024, 7, 1).unwrap();
        assert_eq!(days_between(today, today), 0);
        assert_eq!(
            days_between(NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(), today),
            30
        );
        assert_eq!(days_between(today.succ_opt().unwrap(), today), -1);
    }
}
