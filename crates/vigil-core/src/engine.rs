use crate::accumulator::IntervalAccumulator;
use crate::blocklist::{BlockChange, BlockPolicy};
use crate::clock::Clock;
use crate::events::BrowserEvent;
use crate::hostname::hostname_from_url;
use crate::notify::{NotifyConfig, NotifyMachine, TimerFire};
use crate::surface::{Notifier, TargetId, TargetSurface};
use crate::tracker::{ActiveContext, ActiveContextTracker};
use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use vigil_store::{Store, StoreExt, StoreKey};

/// Control-surface requests from the presentation layer. Every request
/// carries a reply channel so callers get an explicit success or
/// failure instead of hanging on a lost write.
enum Control {
    FlushCurrentSpan {
        reply: oneshot::Sender<Result<()>>,
    },
    ToggleBlock {
        hostname: String,
        should_block: bool,
        reply: oneshot::Sender<Result<()>>,
    },
    ClearStats {
        reply: oneshot::Sender<Result<()>>,
    },
    Shutdown,
}

enum EngineMsg {
    Event(BrowserEvent),
    Control(Control),
}

/// Cloneable handle for delivering events and control requests to a
/// running [`Engine`].
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineMsg>,
}

impl EngineHandle {
    /// Deliver an event from the host shell.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine has stopped.
    pub async fn deliver(&self, event: BrowserEvent) -> Result<()> {
        self.tx
            .send(EngineMsg::Event(event))
            .await
            .map_err(|_| anyhow!("engine stopped"))
    }

    /// Force a commit of the in-flight span, acknowledging once the
    /// durable write completes. The span restarts at the flush instant.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine has stopped or the durable write
    /// fails.
    pub async fn flush_current_span(&self) -> Result<()> {
        self.request(|reply| Control::FlushCurrentSpan { reply })
            .await
    }

    /// Add or remove a hostname from the blocklist, fanning out banners
    /// to matching targets on activation.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine has stopped or the durable write
    /// fails.
    pub async fn toggle_block(&self, hostname: &str, should_block: bool) -> Result<()> {
        let hostname = hostname.to_string();
        self.request(move |reply| Control::ToggleBlock {
            hostname,
            should_block,
            reply,
        })
        .await
    }

    /// Clear every aggregate (the presentation layer's "reset stats").
    ///
    /// # Errors
    ///
    /// Returns an error if the engine has stopped or the durable write
    /// fails.
    pub async fn clear_stats(&self) -> Result<()> {
        self.request(|reply| Control::ClearStats { reply }).await
    }

    /// Stop the engine, committing the in-flight span first.
    pub async fn shutdown(&self) {
        let _ = self.tx.send(EngineMsg::Control(Control::Shutdown)).await;
    }

    async fn request<F>(&self, make: F) -> Result<()>
    where
        F: FnOnce(oneshot::Sender<Result<()>>) -> Control,
    {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(EngineMsg::Control(make(reply)))
            .await
            .map_err(|_| anyhow!("engine stopped"))?;
        response
            .await
            .map_err(|_| anyhow!("engine dropped the acknowledgment"))?
    }
}

/// The tracker's event loop.
///
/// A single task owns all mutable state; events, timer expiries, and
/// control requests are drained one at a time, so each handler step is
/// atomic over the active context, the blocklist cache, and the
/// notification states. The only suspension points inside a step are
/// store awaits, and commit logic re-fetches aggregates after them.
pub struct Engine {
    store: Arc<dyn Store>,
    targets: Arc<dyn TargetSurface>,
    clock: Arc<dyn Clock>,
    accumulator: IntervalAccumulator,
    policy: BlockPolicy,
    notify: NotifyMachine,
    tracker: ActiveContextTracker,
    rx: mpsc::Receiver<EngineMsg>,
    timer_rx: mpsc::UnboundedReceiver<TimerFire>,
}

impl Engine {
    /// Wire up an engine against the host shell's surfaces.
    ///
    /// # Errors
    ///
    /// Returns an error if priming the blocklist cache from the store
    /// fails.
    pub async fn new(
        store: Arc<dyn Store>,
        targets: Arc<dyn TargetSurface>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        config: NotifyConfig,
    ) -> Result<(Self, EngineHandle)> {
        let (tx, rx) = mpsc::channel(64);
        let policy = BlockPolicy::load(store.clone()).await?;
        let (notify, timer_rx) = NotifyMachine::new(notifier, targets.clone(), config);
        let engine = Self {
            accumulator: IntervalAccumulator::new(store.clone()),
            store,
            targets,
            clock,
            policy,
            notify,
            tracker: ActiveContextTracker::new(),
            rx,
            timer_rx,
        };
        Ok((engine, EngineHandle { tx }))
    }

    /// Run until shutdown or until every handle is dropped. Handler
    /// failures are logged and never stop the loop.
    pub async fn run(mut self) {
        let mut store_changes = self.store.subscribe();
        log::info!("tracker engine started");

        loop {
            tokio::select! {
                msg = self.rx.recv() => match msg {
                    Some(EngineMsg::Event(event)) => {
                        if let Err(err) = self.handle_event(event).await {
                            log::error!("event handler failed: {err:#}");
                        }
                    }
                    Some(EngineMsg::Control(control)) => {
                        if !self.handle_control(control).await {
                            break;
                        }
                    }
                    None => break,
                },
                Some(fire) = self.timer_rx.recv() => {
                    if let Err(err) = self.notify.handle_timer(fire, &self.policy).await {
                        log::error!("timer handler failed: {err:#}");
                    }
                }
                change = store_changes.recv() => {
                    if let Ok(change) = change {
                        if change.keys.contains(&StoreKey::BlockedSites) {
                            if let Err(err) = self.policy.refresh().await {
                                log::warn!("blocklist refresh failed: {err:#}");
                            }
                        }
                    }
                }
            }
        }

        // Commit whatever was in flight before stopping.
        self.commit_and_clear(self.clock.now()).await;
        log::info!("tracker engine stopped");
    }

    async fn handle_event(&mut self, event: BrowserEvent) -> Result<()> {
        match event {
            BrowserEvent::ContextActivated { target, url }
            | BrowserEvent::ContextUrlChanged { target, url } => {
                self.on_context_change(target, &url).await
            }
            BrowserEvent::ContextRemoved { target } => {
                self.notify.forget(target);
                if self.tracker.is_current_target(target) {
                    self.commit_and_clear(self.clock.now()).await;
                }
                Ok(())
            }
            BrowserEvent::FocusChanged { target: None } => {
                self.commit_and_clear(self.clock.now()).await;
                Ok(())
            }
            BrowserEvent::FocusChanged {
                target: Some(target),
            } => {
                // Resolve the URL through the surface; a target that
                // vanished in the meantime is simply not an observation.
                match self.targets.get(target).await? {
                    Some(info) => self.on_context_change(target, &info.url).await,
                    None => Ok(()),
                }
            }
            BrowserEvent::ProcessStarted => self.on_process_started().await,
            BrowserEvent::SnoozePressed { target } => self.notify.snooze(target).await,
            BrowserEvent::UnblockPressed { target } => {
                if let Some(hostname) = self.notify.unblock(target).await? {
                    // Global by hostname; other targets' armed timers
                    // resolve against the updated policy at fire time.
                    self.policy.set_blocked(&hostname, false).await?;
                }
                Ok(())
            }
        }
    }

    /// Returns false when the engine should stop.
    async fn handle_control(&mut self, control: Control) -> bool {
        match control {
            Control::FlushCurrentSpan { reply } => {
                let result = self.flush_current_span().await;
                let _ = reply.send(result);
            }
            Control::ToggleBlock {
                hostname,
                should_block,
                reply,
            } => {
                let result = self.apply_block_toggle(&hostname, should_block).await;
                let _ = reply.send(result);
            }
            Control::ClearStats { reply } => {
                let result = self
                    .store
                    .clear_all_aggregates()
                    .await
                    .map_err(Into::into);
                let _ = reply.send(result);
            }
            Control::Shutdown => return false,
        }
        true
    }

    async fn on_context_change(&mut self, target: TargetId, url: &str) -> Result<()> {
        let Some(hostname) = hostname_from_url(url) else {
            return Ok(());
        };
        let now = self.clock.now();

        if self.policy.is_blocked(&hostname) {
            // Never adopted: no time accrues to a blocked hostname. The
            // previous context keeps accruing until the next adoption.
            return self.notify.notify(target, &hostname).await;
        }

        if let Some(outgoing) = self.tracker.adopt(target, hostname, now) {
            self.commit_or_log(&outgoing, now).await;
        }
        Ok(())
    }

    async fn on_process_started(&mut self) -> Result<()> {
        // Timer handles never survive a restart; rebuild from durable
        // state instead of trusting what memory claims.
        self.notify.reset();
        self.policy.refresh().await?;
        self.store.clear_session_timings().await?;

        if let Some(info) = self.targets.focused().await? {
            self.on_context_change(info.id, &info.url).await?;
        }
        Ok(())
    }

    async fn flush_current_span(&mut self) -> Result<()> {
        let now = self.clock.now();
        let Some(context) = self.tracker.current().cloned() else {
            return Ok(());
        };
        self.accumulator.commit(&context, now).await?;
        self.tracker.restamp(now);
        Ok(())
    }

    async fn apply_block_toggle(&mut self, hostname: &str, should_block: bool) -> Result<()> {
        let change = self.policy.set_blocked(hostname, should_block).await?;
        if change != BlockChange::Added {
            return Ok(());
        }

        // The active context may itself be on the newly blocked host;
        // commit it now so nothing more accrues there.
        if self
            .tracker
            .current()
            .is_some_and(|context| context.hostname == hostname)
        {
            self.commit_and_clear(self.clock.now()).await;
        }

        for info in self.targets.list().await? {
            if hostname_from_url(&info.url).as_deref() != Some(hostname) {
                continue;
            }
            if self.notify.is_tracked(info.id) {
                continue;
            }
            self.notify.notify(info.id, hostname).await?;
        }
        Ok(())
    }

    async fn commit_and_clear(&mut self, now: DateTime<Utc>) {
        if let Some(context) = self.tracker.clear() {
            self.commit_or_log(&context, now).await;
        }
    }

    /// Commit failures must not wedge adoption of the next context, so
    /// they are logged here rather than propagated.
    async fn commit_or_log(&self, context: &ActiveContext, now: DateTime<Utc>) {
        if let Err(err) = self.accumulator.commit(context, now).await {
            log::error!(
                "failed to commit {}s span for {}: {err:#}",
                (now - context.start_time).num_seconds(),
                context.hostname
            );
        }
    }
}
