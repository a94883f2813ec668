use chrono::{DateTime, Duration, Utc};

/// Render a message timestamp as a short sidebar label, relative to `now`:
///
/// - same calendar day: clock time, e.g. "3:45 PM"
/// - previous calendar day: "Yesterday"
/// - less than 7 days elapsed: weekday, e.g. "Tue"
/// - anything older: month and day, e.g. "Mar 5"
///
/// Bucket checks run in this order, so a timestamp 6 days old that happens to
/// fall on yesterday's date can never occur and each input lands in exactly
/// one bucket. All arithmetic is in UTC.
pub fn format_chat_time(ts: DateTime<Utc>, now: DateTime<Utc>) -> String {
    if ts.date_naive() == now.date_naive() {
        return ts.format("%-I:%M %p").to_string();
    }

    if let Some(yesterday) = now.date_naive().pred_opt() {
        if ts.date_naive() == yesterday {
            return "Yesterday".to_string();
        }
    }

    if now.signed_duration_since(ts) < Duration::days(7) {
        return ts.format("%a").to_string();
    }

    ts.format("%b %-d").to_string()
}

/// Millisecond epoch timestamps come out of the store; bad values render as
/// the epoch rather than failing the whole listing.
pub fn millis_to_utc(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn same_day_renders_clock_time() {
        let now = utc(2024, 3, 15, 20, 0);
        assert_eq!(format_chat_time(utc(2024, 3, 15, 15, 45), now), "3:45 PM");
        assert_eq!(format_chat_time(utc(2024, 3, 15, 9, 5), now), "9:05 AM");
    }

    #[test]
    fn midnight_boundary_is_not_today() {
        // 30 hours ago but the previous calendar day
        let now = utc(2024, 3, 15, 6, 0);
        assert_eq!(format_chat_time(utc(2024, 3, 14, 0, 0), now), "Yesterday");
    }

    #[test]
    fn yesterday_beats_weekday() {
        let now = utc(2024, 3, 15, 12, 0);
        assert_eq!(format_chat_time(utc(2024, 3, 14, 23, 59), now), "Yesterday");
    }

    #[test]
    fn within_week_renders_weekday() {
        let now = utc(2024, 3, 15, 12, 0); // a Friday
        assert_eq!(format_chat_time(utc(2024, 3, 12, 12, 0), now), "Tue");
        assert_eq!(format_chat_time(utc(2024, 3, 9, 13, 0), now), "Sat");
    }

    #[test]
    fn exactly_seven_days_renders_date() {
        let now = utc(2024, 3, 15, 12, 0);
        assert_eq!(format_chat_time(utc(2024, 3, 8, 12, 0), now), "Mar 8");
    }

    #[test]
    fn older_renders_month_day() {
        let now = utc(2024, 3, 15, 12, 0);
        assert_eq!(format_chat_time(utc(2024, 3, 5, 12, 0), now), "Mar 5");
        assert_eq!(format_chat_time(utc(2023, 12, 25, 12, 0), now), "Dec 25");
    }

    #[test]
    fn year_boundary_yesterday() {
        let now = utc(2024, 1, 1, 8, 0);
        assert_eq!(format_chat_time(utc(2023, 12, 31, 22, 0), now), "Yesterday");
    }

    #[test]
    fn bad_millis_fall_back_to_epoch() {
        assert_eq!(millis_to_utc(i64::MAX).timestamp_millis(), 0);
        assert_eq!(millis_to_utc(1_710_500_000_000).timestamp_millis(), 1_710_500_000_000);
    }
}
