use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};

/// Midnight (UTC) of the day containing `at`.
#[must_use]
pub fn start_of_day(at: DateTime<Utc>) -> DateTime<Utc> {
    Utc.from_utc_datetime(&at.date_naive().and_hms_opt(0, 0, 0).expect("valid midnight"))
}

/// Most recent Sunday midnight (UTC) at or before `at`. This is the
/// weekly anchor for aggregation and resets.
#[must_use]
pub fn start_of_week(at: DateTime<Utc>) -> DateTime<Utc> {
    start_of_day(at) - Duration::days(i64::from(at.weekday().num_days_from_sunday()))
}

/// Weekday with Sunday = 0, the numbering recorded in weekly records.
#[must_use]
pub fn day_of_week(at: DateTime<Utc>) -> u8 {
    at.weekday().num_days_from_sunday() as u8
}
