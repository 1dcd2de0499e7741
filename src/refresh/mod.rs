//! Background revalidation of cached records
//!
//! One task per record kind. Each task wakes on its poll interval and on
//! focus signals; all loads go through the store, so a key already being
//! fetched by a view or a mutation is joined rather than loaded twice.

use crate::cache::{CacheKey, SessionStore};
use crate::client::KeyLoader;
use crate::config::SyncConfig;
use crate::model::RecordKind;
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Signals fanned out to every refresh task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshSignal {
    /// The application regained foreground focus
    Focus,
    Shutdown,
}

/// Outcome of one revalidation pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshReport {
    pub refreshed: usize,
    pub failed: usize,
}

/// Decides which cached keys to revalidate and when.
#[derive(Clone)]
pub struct RefreshPolicy {
    store: Arc<SessionStore>,
    loader: KeyLoader,
    config: Arc<SyncConfig>,
}

impl RefreshPolicy {
    pub fn new(store: Arc<SessionStore>, loader: KeyLoader, config: Arc<SyncConfig>) -> Self {
        Self { store, loader, config }
    }

    /// Revalidate every cached key of `kind`, fresh or not.
    pub async fn poll_kind(&self, kind: RecordKind) -> RefreshReport {
        let keys = self
            .store
            .keys_where(|k| k.kind == kind && self.store.get(k).is_some());
        self.revalidate_keys(kind, keys, None).await
    }

    /// Revalidate the keys of `kind` that are stale or past their freshness
    /// window. Does nothing when focus revalidation is disabled for the kind.
    pub async fn focus_kind(&self, kind: RecordKind) -> RefreshReport {
        let refresh = self.config.refresh_for(kind);
        if !refresh.revalidate_on_focus {
            return RefreshReport::default();
        }

        let max_age = Some(refresh.stale_after());
        let keys = self
            .store
            .keys_where(|k| k.kind == kind && self.store.needs_refresh(k, max_age));
        self.revalidate_keys(kind, keys, max_age).await
    }

    async fn revalidate_keys(
        &self,
        kind: RecordKind,
        keys: Vec<CacheKey>,
        max_age: Option<std::time::Duration>,
    ) -> RefreshReport {
        if keys.is_empty() {
            return RefreshReport::default();
        }

        let loads = keys.iter().map(|key| async move {
            let result = match max_age {
                Some(_) => self.store.fetch(key, max_age, || self.loader.load(key)).await,
                None => self.store.revalidate(key, || self.loader.load(key)).await,
            };
            if let Err(e) = &result {
                warn!(key = %key, error = %e, "Background revalidation failed");
            }
            result.is_ok()
        });

        let outcomes = join_all(loads).await;
        let refreshed = outcomes.iter().filter(|ok| **ok).count();
        let report = RefreshReport {
            refreshed,
            failed: outcomes.len() - refreshed,
        };

        debug!(
            kind = %kind,
            refreshed = report.refreshed,
            failed = report.failed,
            "Revalidation pass finished"
        );
        report
    }

    /// Spawn one refresh task per record kind.
    ///
    /// Must be called from within a tokio runtime. Dropping the returned
    /// handle aborts the tasks.
    pub fn start(self) -> RefreshHandle {
        let (signals, _) = broadcast::channel(16);

        let tasks = RecordKind::ALL
            .iter()
            .map(|&kind| {
                let policy = self.clone();
                let receiver = signals.subscribe();
                tokio::spawn(async move { policy.run(kind, receiver).await })
            })
            .collect();

        info!(kinds = RecordKind::ALL.len(), "Refresh policy started");
        RefreshHandle { signals, tasks }
    }

    async fn run(self, kind: RecordKind, mut signals: broadcast::Receiver<RefreshSignal>) {
        let mut poll = self.config.refresh_for(kind).poll_interval().map(|period| {
            // First tick one period from now; the view just loaded
            let mut tick = interval_at(Instant::now() + period, period);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            tick
        });

        loop {
            tokio::select! {
                _ = next_tick(&mut poll) => {
                    self.poll_kind(kind).await;
                }
                signal = signals.recv() => match signal {
                    Ok(RefreshSignal::Focus) | Err(RecvError::Lagged(_)) => {
                        self.focus_kind(kind).await;
                    }
                    Ok(RefreshSignal::Shutdown) | Err(RecvError::Closed) => {
                        debug!(kind = %kind, "Refresh task stopping");
                        break;
                    }
                },
            }
        }
    }
}

async fn next_tick(poll: &mut Option<Interval>) {
    match poll {
        Some(tick) => {
            tick.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// Handle to the running refresh tasks
pub struct RefreshHandle {
    signals: broadcast::Sender<RefreshSignal>,
    tasks: Vec<JoinHandle<()>>,
}

impl RefreshHandle {
    /// Report that the application regained focus
    pub fn focus(&self) {
        // No receivers once every task has exited
        let _ = self.signals.send(RefreshSignal::Focus);
    }

    /// Stop every task, waiting for in-progress passes to finish
    pub async fn shutdown(mut self) {
        let _ = self.signals.send(RefreshSignal::Shutdown);
        for task in std::mem::take(&mut self.tasks) {
            if let Err(e) = task.await {
                warn!(error = %e, "Refresh task ended abnormally");
            }
        }
        info!("Refresh policy stopped");
    }
}

impl Drop for RefreshHandle {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}
