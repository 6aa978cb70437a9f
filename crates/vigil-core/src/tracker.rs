use crate::surface::TargetId;
use chrono::{DateTime, Utc};

/// The single context currently accruing time. Replaced wholesale on
/// every adoption, never partially mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveContext {
    pub target: TargetId,
    pub hostname: String,
    pub start_time: DateTime<Utc>,
}

/// Holds the active context and decides when the outgoing one must be
/// committed. Pure state transitions; the engine performs the commits
/// these return.
#[derive(Debug, Default)]
pub struct ActiveContextTracker {
    current: Option<ActiveContext>,
}

impl ActiveContextTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn current(&self) -> Option<&ActiveContext> {
        self.current.as_ref()
    }

    #[must_use]
    pub fn is_current_target(&self, target: TargetId) -> bool {
        self.current
            .as_ref()
            .is_some_and(|context| context.target == target)
    }

    /// Adopt a new context, returning the outgoing one (which the caller
    /// must commit with the same `now`).
    pub fn adopt(
        &mut self,
        target: TargetId,
        hostname: String,
        now: DateTime<Utc>,
    ) -> Option<ActiveContext> {
        self.current.replace(ActiveContext {
            target,
            hostname,
            start_time: now,
        })
    }

    /// Clear the active context, returning it for the final commit.
    /// Used on target removal, focus loss, and process stop.
    pub fn clear(&mut self) -> Option<ActiveContext> {
        self.current.take()
    }

    /// Restart the in-flight span at `now` after a forced commit, so the
    /// next natural commit does not double-count the flushed prefix.
    pub fn restamp(&mut self, now: DateTime<Utc>) {
        if let Some(context) = self.current.as_mut() {
            context.start_time = now;
        }
    }
}
