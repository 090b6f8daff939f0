//! Exchange-hours gating for classes that do not trade around the clock.

use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};

/// Regular US equities session in UTC: Monday through Friday,
/// 14:30 to 21:00. Holidays are not modeled; a closed-holiday fetch
/// simply returns an empty book upstream.
pub fn equities_open(now: DateTime<Utc>) -> bool {
    match now.weekday() {
        Weekday::Sat | Weekday::Sun => return false,
        _ => {}
    }
    let minutes = now.hour() * 60 + now.minute();
    (14 * 60 + 30..21 * 60).contains(&minutes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_weekday_session_open() {
        // Wednesday 15:00 UTC
        let t = Utc.with_ymd_and_hms(2024, 6, 12, 15, 0, 0).unwrap();
        assert!(equities_open(t));
    }

    #[test]
    fn test_weekday_pre_open_closed() {
        let t = Utc.with_ymd_and_hms(2024, 6, 12, 14, 29, 0).unwrap();
        assert!(!equities_open(t));
        let open = Utc.with_ymd_and_hms(2024, 6, 12, 14, 30, 0).unwrap();
        assert!(equities_open(open));
    }

    #[test]
    fn test_after_close_and_weekend_closed() {
        let close = Utc.with_ymd_and_hms(2024, 6, 12, 21, 0, 0).unwrap();
        assert!(!equities_open(close));
        // Saturday midday
        let sat = Utc.with_ymd_and_hms(2024, 6, 15, 16, 0, 0).unwrap();
        assert!(!equities_open(sat));
    }
}
