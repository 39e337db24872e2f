//! Conversions of an obtained timestamp into [`chrono`] date-time types
//!
//! Only successful results convert, a failed exchange yields `None`.
use chrono::{DateTime, Local, TimeZone, Utc};

use crate::TimestampResult;

impl TimestampResult {
    /// UTC date-time with millisecond precision
    #[must_use]
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        if !self.is_success() {
            return None;
        }

        Utc.timestamp_millis_opt(self.unix_millis).single()
    }

    /// Date-time in the system time zone
    #[must_use]
    pub fn to_local_datetime(&self) -> Option<DateTime<Local>> {
        self.to_datetime().map(|time| time.with_timezone(&Local))
    }
}

#[cfg(test)]
mod utils_tests {
    use crate::{adjusted_timestamp, ResultCode, TimestampResult};
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_to_datetime() {
        let result = adjusted_timestamp(2_208_988_800_500, 1_700_000_000_010);
        let time = result.to_datetime().unwrap();

        assert_eq!((2023, 11, 14), (time.year(), time.month(), time.day()));
        assert_eq!(
            (result.hour, result.minute, result.second),
            (
                i64::from(time.hour()),
                i64::from(time.minute()),
                i64::from(time.second())
            )
        );
        assert_eq!(510, time.timestamp_subsec_millis());
    }

    #[test]
    fn test_failed_result_has_no_datetime() {
        let result = TimestampResult::failed(ResultCode::ReceiveFailed);

        assert!(result.to_datetime().is_none());
        assert!(result.to_local_datetime().is_none());
    }
}
