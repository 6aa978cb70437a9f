use crate::blocklist::BlockPolicy;
use crate::surface::{Notifier, TargetId, TargetSurface};
use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Which pending timer fired for a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    Close,
    Snooze,
}

/// A timer expiry, delivered back through the engine's event loop so the
/// handling step is atomic over shared state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerFire {
    pub target: TargetId,
    pub kind: TimerKind,
}

#[derive(Debug, Clone)]
pub struct NotifyConfig {
    /// How long a banner stays up before the target is closed.
    pub close_delay: Duration,
    /// How long Snooze defers the next banner.
    pub snooze_delay: Duration,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            close_delay: Duration::from_secs(10),
            snooze_delay: Duration::from_secs(300),
        }
    }
}

/// Cancels its timer task when dropped, so replacing or removing a
/// target's state always cancels the pending timer.
struct PendingTimer(JoinHandle<()>);

impl Drop for PendingTimer {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Per-target lifecycle. Absence from the state map is the idle state;
/// `Unblocked` and `Closed` outcomes remove the entry.
enum TargetState {
    /// Banner is visible and a close timer is armed.
    Notified {
        hostname: String,
        _timer: PendingTimer,
    },
    /// Banner dismissed; a snooze timer will re-show it.
    Snoozed {
        hostname: String,
        _timer: PendingTimer,
    },
}

fn banner_message(hostname: &str, close_delay: Duration) -> String {
    let name = hostname.strip_prefix("www.").unwrap_or(hostname);
    let name = name.strip_suffix(".com").unwrap_or(name);
    format!(
        "{name} is blocked. It will close in {} seconds.\nGreat job maintaining your screentime habits!",
        close_delay.as_secs()
    )
}

/// Per-target notification-closure state machine for blocked hosts.
///
/// Guarantees at most one live banner per target. Timer expiries are
/// messages, not callbacks: handling happens when the engine drains the
/// receiver returned by [`NotifyMachine::new`], and every expiry
/// re-checks the block policy before acting, so an unblock between arm
/// and fire stands the timer down.
pub struct NotifyMachine {
    notifier: Arc<dyn Notifier>,
    targets: Arc<dyn TargetSurface>,
    config: NotifyConfig,
    states: HashMap<TargetId, TargetState>,
    timer_tx: mpsc::UnboundedSender<TimerFire>,
}

impl NotifyMachine {
    #[must_use]
    pub fn new(
        notifier: Arc<dyn Notifier>,
        targets: Arc<dyn TargetSurface>,
        config: NotifyConfig,
    ) -> (Self, mpsc::UnboundedReceiver<TimerFire>) {
        let (timer_tx, timer_rx) = mpsc::unbounded_channel();
        let machine = Self {
            notifier,
            targets,
            config,
            states: HashMap::new(),
            timer_tx,
        };
        (machine, timer_rx)
    }

    /// Whether a banner is currently displayed for `target`.
    #[must_use]
    pub fn has_live_banner(&self, target: TargetId) -> bool {
        matches!(self.states.get(&target), Some(TargetState::Notified { .. }))
    }

    /// Whether `target` is anywhere in the lifecycle (banner up or
    /// snoozed). The fan-out guard uses this so a snoozed target does
    /// not get a second banner.
    #[must_use]
    pub fn is_tracked(&self, target: TargetId) -> bool {
        self.states.contains_key(&target)
    }

    /// A blocked hostname was observed for `target`: show the banner and
    /// arm the close timer. No-op when the target is already tracked.
    ///
    /// # Errors
    ///
    /// Returns an error if the notification surface fails; no state is
    /// recorded in that case.
    pub async fn notify(&mut self, target: TargetId, hostname: &str) -> Result<()> {
        if self.is_tracked(target) {
            return Ok(());
        }
        self.show_and_arm(target, hostname).await
    }

    /// The user pressed Snooze: dismiss the banner without closing and
    /// defer the next one. No-op unless a banner is live.
    ///
    /// # Errors
    ///
    /// Returns an error if the notification surface fails.
    pub async fn snooze(&mut self, target: TargetId) -> Result<()> {
        let Some(TargetState::Notified { hostname, .. }) = self.states.get(&target) else {
            return Ok(());
        };
        let hostname = hostname.clone();

        // Removing the entry cancels the close timer.
        self.states.remove(&target);
        self.notifier.clear(target).await?;
        let timer = self.arm(target, TimerKind::Snooze);
        self.states.insert(
            target,
            TargetState::Snoozed {
                hostname,
                _timer: timer,
            },
        );
        log::info!("snoozed banner for {target}");
        Ok(())
    }

    /// The user pressed Unblock: cancel the close timer, dismiss the
    /// banner, and return the hostname so the caller can clear it from
    /// the block policy (the unblock is global by hostname).
    ///
    /// # Errors
    ///
    /// Returns an error if the notification surface fails.
    pub async fn unblock(&mut self, target: TargetId) -> Result<Option<String>> {
        let Some(TargetState::Notified { hostname, .. }) = self.states.get(&target) else {
            return Ok(None);
        };
        let hostname = hostname.clone();

        self.states.remove(&target);
        self.notifier.clear(target).await?;
        log::info!("unblock requested for {hostname} via {target}");
        Ok(Some(hostname))
    }

    /// Resolve a fired timer against the current block policy. Stale
    /// fires (state already replaced or removed) are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the notification or target surface fails.
    pub async fn handle_timer(&mut self, fire: TimerFire, policy: &BlockPolicy) -> Result<()> {
        match fire.kind {
            TimerKind::Close => {
                let Some(TargetState::Notified { hostname, .. }) = self.states.get(&fire.target)
                else {
                    return Ok(());
                };
                let hostname = hostname.clone();

                self.states.remove(&fire.target);
                self.notifier.clear(fire.target).await?;
                if policy.is_blocked(&hostname) {
                    self.targets.close(fire.target).await?;
                    log::info!("closed {} ({hostname} is blocked)", fire.target);
                } else {
                    log::debug!("{hostname} unblocked before close fired; leaving {}", fire.target);
                }
            }
            TimerKind::Snooze => {
                let Some(TargetState::Snoozed { hostname, .. }) = self.states.get(&fire.target)
                else {
                    return Ok(());
                };
                let hostname = hostname.clone();

                self.states.remove(&fire.target);
                if policy.is_blocked(&hostname) {
                    self.show_and_arm(fire.target, &hostname).await?;
                } else {
                    log::debug!("{hostname} unblocked during snooze; dropping {}", fire.target);
                }
            }
        }
        Ok(())
    }

    /// The target disappeared externally: cancel pending timers and drop
    /// its state. Never errors.
    pub fn forget(&mut self, target: TargetId) {
        if self.states.remove(&target).is_some() {
            log::debug!("dropped notification state for {target}");
        }
    }

    /// Drop all state and timers. Used on process start: in-memory timer
    /// handles do not survive a restart, so notification state is
    /// rebuilt from the durable blocklist instead.
    pub fn reset(&mut self) {
        self.states.clear();
    }

    async fn show_and_arm(&mut self, target: TargetId, hostname: &str) -> Result<()> {
        self.notifier
            .show(target, &banner_message(hostname, self.config.close_delay))
            .await?;
        let timer = self.arm(target, TimerKind::Close);
        self.states.insert(
            target,
            TargetState::Notified {
                hostname: hostname.to_string(),
                _timer: timer,
            },
        );
        log::info!("banner shown for {hostname} on {target}");
        Ok(())
    }

    fn arm(&self, target: TargetId, kind: TimerKind) -> PendingTimer {
        let delay = match kind {
            TimerKind::Close => self.config.close_delay,
            TimerKind::Snooze => self.config.snooze_delay,
        };
        let tx = self.timer_tx.clone();
        PendingTimer(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // Receiver gone means the engine is shutting down.
            let _ = tx.send(TimerFire { target, kind });
        }))
    }
}
