use crate::models::{DailyTiming, SessionTiming, WeeklyTiming};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::broadcast;

/// The fixed set of durable keys the tracker reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreKey {
    SessionTimings,
    DailyTimings,
    WeeklyTimings,
    BlockedSites,
    LastWeekReset,
}

impl StoreKey {
    pub const ALL: [Self; 5] = [
        Self::SessionTimings,
        Self::DailyTimings,
        Self::WeeklyTimings,
        Self::BlockedSites,
        Self::LastWeekReset,
    ];

    /// Wire name, shared with the presentation layer.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SessionTimings => "sessionTimings",
            Self::DailyTimings => "dailyTimings",
            Self::WeeklyTimings => "weeklyTimings",
            Self::BlockedSites => "blockedSites",
            Self::LastWeekReset => "lastWeekReset",
        }
    }

    #[must_use]
    pub fn from_wire_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|key| key.as_str() == name)
    }
}

/// Batch of keys touched by a completed `set`.
#[derive(Debug, Clone)]
pub struct StoreChange {
    pub keys: Vec<StoreKey>,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(String),
    #[error("store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Asynchronous durable key-value store.
///
/// Semantics the tracker depends on: `get` may return values that are
/// stale by the time the future resolves, `set` is last-write-wins per
/// key, and both may suspend the caller while other handlers run.
#[async_trait]
pub trait Store: Send + Sync {
    /// Fetch the current values for `keys`. Absent keys are omitted from
    /// the result map.
    async fn get(&self, keys: &[StoreKey]) -> Result<HashMap<StoreKey, Value>, StoreError>;

    /// Write all `entries`, acknowledging once durable (best effort).
    async fn set(&self, entries: Vec<(StoreKey, Value)>) -> Result<(), StoreError>;

    /// Subscribe to change notifications for completed writes.
    fn subscribe(&self) -> broadcast::Receiver<StoreChange>;
}

fn decode_or_default<T: DeserializeOwned + Default>(
    values: &HashMap<StoreKey, Value>,
    key: StoreKey,
) -> Result<T, StoreError> {
    match values.get(&key) {
        Some(value) => Ok(serde_json::from_value(value.clone())?),
        None => Ok(T::default()),
    }
}

fn encode<T: Serialize>(key: StoreKey, value: &T) -> Result<(StoreKey, Value), StoreError> {
    Ok((key, serde_json::to_value(value)?))
}

/// All three aggregate collections, fetched together so a commit can
/// read-modify-append in one round trip.
#[derive(Debug, Clone, Default)]
pub struct Aggregates {
    pub session: Vec<SessionTiming>,
    pub daily: Vec<DailyTiming>,
    pub weekly: Vec<WeeklyTiming>,
}

/// Typed accessors over the raw key-value surface.
#[async_trait]
pub trait StoreExt: Store {
    async fn aggregates(&self) -> Result<Aggregates, StoreError> {
        let values = self
            .get(&[
                StoreKey::SessionTimings,
                StoreKey::DailyTimings,
                StoreKey::WeeklyTimings,
            ])
            .await?;
        Ok(Aggregates {
            session: decode_or_default(&values, StoreKey::SessionTimings)?,
            daily: decode_or_default(&values, StoreKey::DailyTimings)?,
            weekly: decode_or_default(&values, StoreKey::WeeklyTimings)?,
        })
    }

    async fn save_aggregates(&self, aggregates: &Aggregates) -> Result<(), StoreError> {
        self.set(vec![
            encode(StoreKey::SessionTimings, &aggregates.session)?,
            encode(StoreKey::DailyTimings, &aggregates.daily)?,
            encode(StoreKey::WeeklyTimings, &aggregates.weekly)?,
        ])
        .await
    }

    async fn blocked_sites(&self) -> Result<Vec<String>, StoreError> {
        let values = self.get(&[StoreKey::BlockedSites]).await?;
        decode_or_default(&values, StoreKey::BlockedSites)
    }

    async fn save_blocked_sites(&self, sites: &[String]) -> Result<(), StoreError> {
        self.set(vec![encode(StoreKey::BlockedSites, &sites)?])
            .await
    }

    async fn last_week_reset(&self) -> Result<Option<DateTime<Utc>>, StoreError> {
        let values = self.get(&[StoreKey::LastWeekReset]).await?;
        let millis: Option<i64> = decode_or_default(&values, StoreKey::LastWeekReset)?;
        Ok(millis.and_then(|ms| Utc.timestamp_millis_opt(ms).single()))
    }

    async fn record_week_reset(
        &self,
        reset_at: DateTime<Utc>,
        weekly: &[WeeklyTiming],
    ) -> Result<(), StoreError> {
        self.set(vec![
            encode(StoreKey::WeeklyTimings, &weekly)?,
            encode(StoreKey::LastWeekReset, &reset_at.timestamp_millis())?,
        ])
        .await
    }

    async fn clear_session_timings(&self) -> Result<(), StoreError> {
        self.set(vec![encode(
            StoreKey::SessionTimings,
            &Vec::<SessionTiming>::new(),
        )?])
        .await
    }

    /// Full clear of every aggregate, for the "reset stats" affordance.
    /// The blocklist and reset marker survive.
    async fn clear_all_aggregates(&self) -> Result<(), StoreError> {
        self.save_aggregates(&Aggregates::default()).await
    }
}

impl<S: Store + ?Sized> StoreExt for S {}
