//! VisibilityWatcher: feeds UI events into one domain.
//!
//! Activity only touches the tracker. A hidden→visible transition also
//! triggers an immediate out-of-band refresh; any visibility change
//! re-evaluates the schedule.
//!
//! Activity travels on a bounded `broadcast` channel and may be dropped
//! under load. Visibility travels on a `watch` channel: a slow listener
//! only ever skips intermediate states, never the latest one.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use inbox_core::Visibility;

use crate::context::refresh_and_reschedule;
use crate::coordinator::{Coordinator, monotonic_now};
use crate::domain::Domain;
use crate::scheduler::Scheduler;

const ACTIVITY_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    PointerDown,
    KeyDown,
    Scroll,
}

impl std::str::FromStr for ActivityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pointer_down" | "pointer-down" | "pointer" => Ok(Self::PointerDown),
            "key_down" | "key-down" | "key" => Ok(Self::KeyDown),
            "scroll" => Ok(Self::Scroll),
            other => Err(format!("unknown activity kind: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "value", rename_all = "snake_case")]
pub enum UiEvent {
    Activity(ActivityKind),
    VisibilityChanged(Visibility),
}

/// UI event bus shared by every mounted domain.
pub struct EventBus {
    activity: broadcast::Sender<ActivityKind>,
    visibility: watch::Sender<Visibility>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            activity: broadcast::channel(ACTIVITY_CAPACITY).0,
            visibility: watch::channel(Visibility::Visible).0,
        }
    }

    /// Deliver an event; returns the number of attached listeners.
    pub fn publish(&self, event: UiEvent) -> usize {
        match event {
            UiEvent::Activity(kind) => self.activity.send(kind).unwrap_or(0),
            UiEvent::VisibilityChanged(visibility) => {
                self.visibility.send_replace(visibility);
                self.visibility.receiver_count()
            }
        }
    }

    pub fn receiver_count(&self) -> usize {
        self.activity.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

pub fn event_bus() -> EventBus {
    EventBus::new()
}

/// Listener attached to the event bus for one domain.
pub struct VisibilityWatcher {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl VisibilityWatcher {
    pub fn attach<D: Domain>(
        events: &EventBus,
        coordinator: Arc<Coordinator<D>>,
        scheduler: Arc<Scheduler<D>>,
    ) -> Self {
        let cancel = CancellationToken::new();
        let activity = events.activity.subscribe();
        let visibility = events.visibility.subscribe();
        let task = tokio::spawn(listen(
            activity,
            visibility,
            coordinator,
            scheduler,
            cancel.clone(),
        ));
        Self { cancel, task }
    }

    /// Drop the subscription and wait for the listener task to exit.
    pub async fn detach(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            tracing::warn!("visibility watcher task failed: {e}");
        }
    }
}

async fn listen<D: Domain>(
    mut activity: broadcast::Receiver<ActivityKind>,
    mut visibility: watch::Receiver<Visibility>,
    coordinator: Arc<Coordinator<D>>,
    scheduler: Arc<Scheduler<D>>,
    cancel: CancellationToken,
) {
    // Foreground refresh runs beside the loop so events keep draining.
    let mut foreground: Option<JoinHandle<()>> = None;
    // Adopt whatever state the bus already holds; no fetch for it.
    let initial = *visibility.borrow_and_update();
    on_visibility(initial, &coordinator, &scheduler);
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            changed = visibility.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *visibility.borrow_and_update();
                if on_visibility(state, &coordinator, &scheduler) {
                    if foreground.as_ref().is_some_and(|t| !t.is_finished()) {
                        tracing::debug!(domain = %D::KIND, "foreground refresh already running");
                        continue;
                    }
                    foreground = Some(tokio::spawn(foreground_refresh(
                        Arc::clone(&coordinator),
                        Arc::clone(&scheduler),
                    )));
                }
            }
            event = activity.recv() => match event {
                Ok(kind) => {
                    coordinator.touch(monotonic_now());
                    tracing::trace!(domain = %D::KIND, ?kind, "activity");
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(domain = %D::KIND, skipped, "activity listener lagged");
                    coordinator.touch(monotonic_now());
                }
                Err(RecvError::Closed) => break,
            },
        }
    }
    if let Some(task) = foreground {
        task.abort();
        let _ = task.await;
    }
    tracing::debug!(domain = %D::KIND, "visibility watcher detached");
}

/// Apply a visibility state. Returns `true` when it became visible and a
/// foreground refresh is due.
fn on_visibility<D: Domain>(
    visibility: Visibility,
    coordinator: &Coordinator<D>,
    scheduler: &Scheduler<D>,
) -> bool {
    if !coordinator.set_visibility(visibility) {
        return false;
    }
    tracing::debug!(domain = %D::KIND, visibility = visibility.as_str(), "visibility changed");
    if visibility.is_visible() {
        coordinator.touch(monotonic_now());
    }
    scheduler.restart_if_active();
    visibility.is_visible()
}

async fn foreground_refresh<D: Domain>(coordinator: Arc<Coordinator<D>>, scheduler: Arc<Scheduler<D>>) {
    let outcome = refresh_and_reschedule(&coordinator, &scheduler).await;
    tracing::debug!(domain = %D::KIND, ?outcome, "foreground refresh finished");
}
