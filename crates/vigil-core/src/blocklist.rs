use anyhow::Result;
use std::collections::HashSet;
use std::sync::Arc;
use vigil_store::{Store, StoreExt};

/// Outcome of a blocklist update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockChange {
    /// Hostname newly blocked; the engine fans out to matching targets.
    Added,
    Removed,
    /// Already in the requested state; nothing was written.
    Unchanged,
}

/// Maintains the hostname blocklist: a durable list plus an in-memory
/// cache so `is_blocked` never suspends the calling handler.
pub struct BlockPolicy {
    store: Arc<dyn Store>,
    cache: HashSet<String>,
}

impl BlockPolicy {
    /// Load the policy, priming the cache from the durable list.
    ///
    /// # Errors
    ///
    /// Returns an error if the durable store fails.
    pub async fn load(store: Arc<dyn Store>) -> Result<Self> {
        let cache = store.blocked_sites().await?.into_iter().collect();
        Ok(Self { store, cache })
    }

    /// Exact, case-sensitive membership test.
    #[must_use]
    pub fn is_blocked(&self, hostname: &str) -> bool {
        self.cache.contains(hostname)
    }

    /// Add or remove `hostname` from the durable blocklist. A no-op when
    /// the hostname is already in the requested state.
    ///
    /// # Errors
    ///
    /// Returns an error if the durable write fails; the cache is only
    /// updated after the write is acknowledged.
    pub async fn set_blocked(&mut self, hostname: &str, should_block: bool) -> Result<BlockChange> {
        if should_block == self.cache.contains(hostname) {
            return Ok(BlockChange::Unchanged);
        }

        // Read-modify-write against the durable list, preserving the
        // insertion order the presentation layer displays.
        let mut sites = self.store.blocked_sites().await?;
        if should_block {
            if !sites.iter().any(|site| site == hostname) {
                sites.push(hostname.to_string());
            }
        } else {
            sites.retain(|site| site != hostname);
        }
        self.store.save_blocked_sites(&sites).await?;

        let change = if should_block {
            self.cache.insert(hostname.to_string());
            log::info!("blocked {hostname}");
            BlockChange::Added
        } else {
            self.cache.remove(hostname);
            log::info!("unblocked {hostname}");
            BlockChange::Removed
        };
        Ok(change)
    }

    /// Re-read the durable list, e.g. after a change notification or on
    /// process start.
    ///
    /// # Errors
    ///
    /// Returns an error if the durable store fails.
    pub async fn refresh(&mut self) -> Result<()> {
        self.cache = self.store.blocked_sites().await?.into_iter().collect();
        Ok(())
    }
}
