use chrono::{DateTime, Datelike, Months, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};
use serde::{Deserialize, Serialize};

/// A contiguous date range over which news is aggregated into one summary set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Period {
    Daily,
    Weekly,
    /// Reserved. Rejected by the pipeline entry point.
    Monthly,
}

impl std::fmt::Display for Period {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Daily => write!(f, "daily"),
            Self::Weekly => write!(f, "weekly"),
            Self::Monthly => write!(f, "monthly"),
        }
    }
}

impl Period {
    /// Whether `date` is a valid start for this period type: weekly periods
    /// start on Mondays, monthly periods on the 1st.
    pub fn is_valid_start(&self, date: NaiveDate) -> bool {
        match self {
            Self::Daily => true,
            Self::Weekly => date.weekday() == Weekday::Mon,
            Self::Monthly => date.day() == 1,
        }
    }

    /// Exclusive end date of the period starting at `start`.
    pub fn exclusive_end(&self, start: NaiveDate) -> NaiveDate {
        match self {
            Self::Daily => start + chrono::Duration::days(1),
            Self::Weekly => start + chrono::Duration::days(7),
            Self::Monthly => {
                // 1st of the next month; Months handles December rollover.
                let first = start.with_day(1).unwrap_or(start);
                first + Months::new(1)
            }
        }
    }

    /// Midnight UTC of the exclusive end date, the instant a period is
    /// considered fully elapsed.
    pub fn exclusive_end_instant(&self, start: NaiveDate) -> DateTime<Utc> {
        let end = self.exclusive_end(start);
        Utc.from_utc_datetime(&end.and_time(NaiveTime::MIN))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn daily_accepts_any_start() {
        assert!(Period::Daily.is_valid_start(d(2025, 5, 19)));
        assert!(Period::Daily.is_valid_start(d(2025, 5, 20)));
    }

    #[test]
    fn weekly_start_must_be_monday() {
        assert!(Period::Weekly.is_valid_start(d(2025, 5, 19)));
        assert!(!Period::Weekly.is_valid_start(d(2025, 5, 20)));
    }

    #[test]
    fn monthly_start_must_be_first() {
        assert!(Period::Monthly.is_valid_start(d(2025, 5, 1)));
        assert!(!Period::Monthly.is_valid_start(d(2025, 5, 2)));
    }

    #[test]
    fn weekly_end_is_seven_days_out() {
        assert_eq!(Period::Weekly.exclusive_end(d(2025, 5, 19)), d(2025, 5, 26));
    }

    #[test]
    fn daily_end_is_next_day() {
        assert_eq!(Period::Daily.exclusive_end(d(2025, 5, 31)), d(2025, 6, 1));
    }

    #[test]
    fn monthly_end_rolls_over_december() {
        assert_eq!(Period::Monthly.exclusive_end(d(2025, 12, 1)), d(2026, 1, 1));
    }

    #[test]
    fn end_instant_is_midnight_utc() {
        let instant = Period::Daily.exclusive_end_instant(d(2025, 5, 19));
        assert_eq!(instant.to_rfc3339(), "2025-05-20T00:00:00+00:00");
    }
}
