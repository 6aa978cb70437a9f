use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One closed span of attention within the current browsing session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionTiming {
    pub hostname: String,
    /// Whole seconds attributed to `hostname`.
    pub time_spent: u64,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub start_time: DateTime<Utc>,
}

/// A span bucketed under the calendar day it occurred on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyTiming {
    pub hostname: String,
    pub time_spent: u64,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    /// Midnight (UTC) of the day this span belongs to.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub day_start: DateTime<Utc>,
}

/// A span bucketed under the calendar week it occurred on.
///
/// `day_of_week` uses Sunday = 0 at write time; consumers remap to their
/// own week-start convention when rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyTiming {
    pub hostname: String,
    pub time_spent: u64,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    /// Sunday midnight (UTC) anchoring the week this span belongs to.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub week_start: DateTime<Utc>,
    pub day_of_week: u8,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn session_timing_serializes_with_wire_field_names() {
        let timing = SessionTiming {
            hostname: "example.com".to_string(),
            time_spent: 42,
            start_time: Utc.with_ymd_and_hms(2024, 3, 4, 12, 0, 0).unwrap(),
        };

        let value = serde_json::to_value(&timing).unwrap();
        assert_eq!(value["hostname"], "example.com");
        assert_eq!(value["timeSpent"], 42);
        // Timestamps travel as epoch milliseconds.
        assert_eq!(value["startTime"], 1_709_553_600_000_i64);
    }

    #[test]
    fn weekly_timing_roundtrips() {
        let timing = WeeklyTiming {
            hostname: "news.ycombinator.com".to_string(),
            time_spent: 300,
            timestamp: Utc.with_ymd_and_hms(2024, 3, 6, 9, 30, 0).unwrap(),
            week_start: Utc.with_ymd_and_hms(2024, 3, 3, 0, 0, 0).unwrap(),
            day_of_week: 3,
        };

        let encoded = serde_json::to_string(&timing).unwrap();
        let decoded: WeeklyTiming = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, timing);
    }
}
