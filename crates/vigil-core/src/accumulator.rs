use crate::calendar::{day_of_week, start_of_day, start_of_week};
use crate::reset::WeekResetScheduler;
use crate::tracker::ActiveContext;
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use vigil_store::{DailyTiming, SessionTiming, Store, StoreExt, WeeklyTiming};

/// One attributable slice of a closed span. A commit produces one slice,
/// or two when the span crosses a midnight boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
struct SubInterval {
    seconds: u64,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

/// Split a closed span at the midnight boundary, if it crosses one.
///
/// The two slices' seconds sum exactly to the span's elapsed seconds.
/// Only one boundary is handled per commit: a span longer than a day is
/// split at the final midnight before `end`, which live event sources
/// never produce anyway. A span ending exactly at midnight belongs
/// wholly to the earlier day and stays one slice.
fn split_span(start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<SubInterval> {
    let elapsed = u64::try_from((end - start).num_seconds()).unwrap_or(0);
    let boundary = start_of_day(end);
    if elapsed == 0 || boundary <= start || boundary == end {
        return vec![SubInterval {
            seconds: elapsed,
            start,
            end,
        }];
    }

    let before = u64::try_from((boundary - start).num_seconds())
        .unwrap_or(0)
        .min(elapsed);
    vec![
        SubInterval {
            seconds: before,
            start,
            end: boundary,
        },
        SubInterval {
            seconds: elapsed - before,
            start: boundary,
            end,
        },
    ]
}

/// Converts a closed context span into timing records.
///
/// Each slice is appended as one session, one daily, and one weekly
/// record, after running the weekly reset check. Aggregates are
/// re-fetched immediately before every append: other handlers may have
/// run while an earlier await was suspended.
pub struct IntervalAccumulator {
    store: Arc<dyn Store>,
    reset: WeekResetScheduler,
}

impl IntervalAccumulator {
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        let reset = WeekResetScheduler::new(store.clone());
        Self { store, reset }
    }

    /// Record the elapsed time of `context` ending at `end_time`.
    ///
    /// # Errors
    ///
    /// Returns an error if the durable store fails; no partial slice is
    /// retried.
    pub async fn commit(&self, context: &ActiveContext, end_time: DateTime<Utc>) -> Result<()> {
        for slice in split_span(context.start_time, end_time) {
            // The reset check runs at each slice's start, so a slice from
            // the old week still appends to the old-week aggregate and
            // the rollover clears it when the new week's slice begins.
            self.reset.check_reset(slice.start).await?;

            let mut aggregates = self.store.aggregates().await?;
            aggregates.session.push(SessionTiming {
                hostname: context.hostname.clone(),
                time_spent: slice.seconds,
                start_time: slice.start,
            });
            aggregates.daily.push(DailyTiming {
                hostname: context.hostname.clone(),
                time_spent: slice.seconds,
                timestamp: slice.end,
                day_start: start_of_day(slice.start),
            });
            aggregates.weekly.push(WeeklyTiming {
                hostname: context.hostname.clone(),
                time_spent: slice.seconds,
                timestamp: slice.end,
                week_start: start_of_week(slice.start),
                day_of_week: day_of_week(slice.start),
            });
            self.store.save_aggregates(&aggregates).await?;

            log::debug!(
                "committed {}s for {} (day {})",
                slice.seconds,
                context.hostname,
                start_of_day(slice.start)
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::TargetId;
    use chrono::TimeZone;
    use vigil_store::MemoryStore;

    fn context(hostname: &str, start: DateTime<Utc>) -> ActiveContext {
        ActiveContext {
            target: TargetId(1),
            hostname: hostname.to_string(),
            start_time: start,
        }
    }

    #[test]
    fn same_day_span_is_one_slice() {
        let start = Utc.with_ymd_and_hms(2024, 3, 6, 10, 0, 0).unwrap();
        let end = start + chrono::Duration::seconds(42);
        let slices = split_span(start, end);
        assert_eq!(slices.len(), 1);
        assert_eq!(slices[0].seconds, 42);
    }

    #[test]
    fn midnight_crossing_span_splits_exactly() {
        let start = Utc.with_ymd_and_hms(2024, 3, 6, 23, 59, 50).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 3, 7, 0, 0, 10).unwrap();
        let slices = split_span(start, end);
        assert_eq!(slices.len(), 2);
        assert_eq!(slices[0].seconds, 10);
        assert_eq!(slices[1].seconds, 10);
        assert_eq!(slices[0].seconds + slices[1].seconds, 20);
        assert_eq!(slices[0].end, Utc.with_ymd_and_hms(2024, 3, 7, 0, 0, 0).unwrap());
    }

    #[test]
    fn backwards_span_clamps_to_zero() {
        let start = Utc.with_ymd_and_hms(2024, 3, 6, 10, 0, 0).unwrap();
        let end = start - chrono::Duration::seconds(5);
        let slices = split_span(start, end);
        assert_eq!(slices.len(), 1);
        assert_eq!(slices[0].seconds, 0);
    }

    #[test]
    fn span_ending_exactly_at_midnight_stays_one_slice() {
        let start = Utc.with_ymd_and_hms(2024, 3, 6, 23, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 3, 7, 0, 0, 0).unwrap();
        let slices = split_span(start, end);
        assert_eq!(slices.len(), 1);
        assert_eq!(slices[0].seconds, 3600);
        assert_eq!(slices[0].end, end);
    }

    #[test]
    fn multi_day_span_splits_once_at_final_midnight() {
        let start = Utc.with_ymd_and_hms(2024, 3, 4, 12, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 3, 7, 6, 0, 0).unwrap();
        let slices = split_span(start, end);
        assert_eq!(slices.len(), 2);
        assert_eq!(slices[1].start, Utc.with_ymd_and_hms(2024, 3, 7, 0, 0, 0).unwrap());
        let elapsed = u64::try_from((end - start).num_seconds()).unwrap();
        assert_eq!(slices[0].seconds + slices[1].seconds, elapsed);
    }

    #[tokio::test]
    async fn commit_appends_one_record_per_aggregate() {
        let store = Arc::new(MemoryStore::new());
        let accumulator = IntervalAccumulator::new(store.clone());
        let start = Utc.with_ymd_and_hms(2024, 3, 6, 10, 0, 0).unwrap();

        accumulator
            .commit(&context("example.com", start), start + chrono::Duration::seconds(42))
            .await
            .unwrap();

        let aggregates = store.aggregates().await.unwrap();
        assert_eq!(aggregates.session.len(), 1);
        assert_eq!(aggregates.daily.len(), 1);
        assert_eq!(aggregates.weekly.len(), 1);
        assert_eq!(aggregates.session[0].hostname, "example.com");
        assert_eq!(aggregates.session[0].time_spent, 42);
        assert_eq!(aggregates.weekly[0].day_of_week, 3);
    }

    #[tokio::test]
    async fn midnight_crossing_commit_yields_two_daily_records() {
        let store = Arc::new(MemoryStore::new());
        let accumulator = IntervalAccumulator::new(store.clone());
        let start = Utc.with_ymd_and_hms(2024, 3, 6, 23, 59, 50).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 3, 7, 0, 0, 10).unwrap();

        accumulator.commit(&context("a.com", start), end).await.unwrap();

        let aggregates = store.aggregates().await.unwrap();
        assert_eq!(aggregates.daily.len(), 2);
        assert_eq!(aggregates.daily[0].time_spent, 10);
        assert_eq!(
            aggregates.daily[0].day_start,
            Utc.with_ymd_and_hms(2024, 3, 6, 0, 0, 0).unwrap()
        );
        assert_eq!(aggregates.daily[1].time_spent, 10);
        assert_eq!(
            aggregates.daily[1].day_start,
            Utc.with_ymd_and_hms(2024, 3, 7, 0, 0, 0).unwrap()
        );
        assert_eq!(
            aggregates.daily[0].time_spent + aggregates.daily[1].time_spent,
            20
        );
    }

    #[tokio::test]
    async fn multi_day_commit_buckets_the_long_slice_under_its_start_day() {
        let store = Arc::new(MemoryStore::new());
        let accumulator = IntervalAccumulator::new(store.clone());
        let start = Utc.with_ymd_and_hms(2024, 3, 4, 12, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 3, 7, 6, 0, 0).unwrap();

        accumulator.commit(&context("a.com", start), end).await.unwrap();

        // The slice before the final midnight keeps its real start, so
        // it is bucketed under the day the span began.
        let aggregates = store.aggregates().await.unwrap();
        assert_eq!(aggregates.daily.len(), 2);
        assert_eq!(
            aggregates.daily[0].day_start,
            Utc.with_ymd_and_hms(2024, 3, 4, 0, 0, 0).unwrap()
        );
        assert_eq!(
            aggregates.daily[1].day_start,
            Utc.with_ymd_and_hms(2024, 3, 7, 0, 0, 0).unwrap()
        );
    }

    #[tokio::test]
    async fn week_boundary_crossing_commit_keeps_only_new_week_records() {
        let store = Arc::new(MemoryStore::new());
        let accumulator = IntervalAccumulator::new(store.clone());

        // Reset marker from the old week (2024-03-09 is a Saturday).
        let friday = Utc.with_ymd_and_hms(2024, 3, 8, 17, 0, 0).unwrap();
        store.record_week_reset(friday, &[]).await.unwrap();

        let saturday_night = Utc.with_ymd_and_hms(2024, 3, 9, 23, 59, 50).unwrap();
        let sunday_morning = Utc.with_ymd_and_hms(2024, 3, 10, 0, 0, 10).unwrap();
        accumulator
            .commit(&context("a.com", saturday_night), sunday_morning)
            .await
            .unwrap();

        // The pre-boundary slice lands in the old week's aggregate and
        // the rollover triggered by the post-boundary slice clears it;
        // only the new week's record survives.
        let aggregates = store.aggregates().await.unwrap();
        assert_eq!(aggregates.weekly.len(), 1);
        assert_eq!(
            aggregates.weekly[0].week_start,
            Utc.with_ymd_and_hms(2024, 3, 10, 0, 0, 0).unwrap()
        );
        assert_eq!(aggregates.weekly[0].time_spent, 10);
        // Daily records are untouched by the rollover, and the marker
        // carries the instant the new week's slice began.
        assert_eq!(aggregates.daily.len(), 2);
        assert_eq!(
            store.last_week_reset().await.unwrap(),
            Some(Utc.with_ymd_and_hms(2024, 3, 10, 0, 0, 0).unwrap())
        );
    }

    #[tokio::test]
    async fn commits_run_the_weekly_reset_first() {
        let store = Arc::new(MemoryStore::new());
        let accumulator = IntervalAccumulator::new(store.clone());

        // A record from the previous week, with a stale reset marker.
        let last_friday = Utc.with_ymd_and_hms(2024, 3, 8, 17, 0, 0).unwrap();
        let mut aggregates = store.aggregates().await.unwrap();
        aggregates.weekly.push(WeeklyTiming {
            hostname: "old.com".to_string(),
            time_spent: 600,
            timestamp: last_friday,
            week_start: Utc.with_ymd_and_hms(2024, 3, 3, 0, 0, 0).unwrap(),
            day_of_week: 5,
        });
        store.save_aggregates(&aggregates).await.unwrap();
        store.record_week_reset(last_friday, &aggregates.weekly).await.unwrap();

        // Committing in the next week clears the stale weekly records.
        let monday = Utc.with_ymd_and_hms(2024, 3, 11, 9, 0, 0).unwrap();
        accumulator
            .commit(&context("new.com", monday), monday + chrono::Duration::seconds(30))
            .await
            .unwrap();

        let aggregates = store.aggregates().await.unwrap();
        assert_eq!(aggregates.weekly.len(), 1);
        assert_eq!(aggregates.weekly[0].hostname, "new.com");
    }
}
