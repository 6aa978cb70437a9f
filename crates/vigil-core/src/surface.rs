use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identifier for an observable browsing surface (a tab, in the
/// usual embedding).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetId(pub u32);

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "target#{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub struct TargetInfo {
    pub id: TargetId,
    pub url: String,
}

/// The host shell's view of live targets. All lookups are
/// possibly-stale snapshots; a target can disappear between a lookup
/// and the next call.
#[async_trait]
pub trait TargetSurface: Send + Sync {
    /// Enumerate all currently-known targets.
    async fn list(&self) -> Result<Vec<TargetInfo>>;

    /// Look up a single target. Absent targets are `None`, not an error.
    async fn get(&self, id: TargetId) -> Result<Option<TargetInfo>>;

    /// The currently focused target, if any.
    async fn focused(&self) -> Result<Option<TargetInfo>>;

    /// Terminate a target. Closing one that no longer exists is success.
    async fn close(&self, id: TargetId) -> Result<()>;
}

/// User-facing banner surface. One banner per target; `show` on a
/// target with a visible banner replaces it.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn show(&self, target: TargetId, message: &str) -> Result<()>;
    async fn clear(&self, target: TargetId) -> Result<()>;
}
