use crate::calendar::start_of_week;
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use vigil_store::{Store, StoreExt};

/// Decides when the weekly aggregate rolls over.
///
/// The anchor is the most recent Sunday midnight (UTC). A reset clears
/// the weekly aggregate only; session timings are cleared on process
/// start instead, and daily records carry their own `day_start` so
/// consumers window them without a rollover.
pub struct WeekResetScheduler {
    store: Arc<dyn Store>,
}

impl WeekResetScheduler {
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Clear the weekly aggregate if `now` has crossed a weekly boundary
    /// the last reset predates. Idempotent within a week; must run
    /// before every append so no aggregate silently spans a boundary.
    ///
    /// Returns whether a reset happened.
    ///
    /// # Errors
    ///
    /// Returns an error if the durable store fails.
    pub async fn check_reset(&self, now: DateTime<Utc>) -> Result<bool> {
        let boundary = start_of_week(now);
        let last_reset = self.store.last_week_reset().await?;
        if last_reset.is_some_and(|at| at >= boundary) {
            return Ok(false);
        }

        self.store.record_week_reset(now, &[]).await?;
        log::info!("weekly aggregate reset (boundary {boundary})");
        Ok(true)
    }
}
