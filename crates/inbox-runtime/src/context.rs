//! DomainContext: the per-domain surface UI consumers talk to.
//!
//! Composes the coordinator, the scheduler and the visibility watcher,
//! and owns their lifecycle (mount on login, teardown on logout).

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;

use inbox_api::ApiError;
use inbox_core::RefreshStatus;

use crate::coordinator::{Coordinator, RefreshOutcome, monotonic_now};
use crate::domain::Domain;
use crate::scheduler::Scheduler;
use crate::watcher::{EventBus, VisibilityWatcher};

#[derive(Debug, Clone, Copy)]
pub struct ContextOptions {
    pub auto_refresh_enabled: bool,
    pub fetch_deadline: Duration,
}

pub struct DomainContext<D: Domain> {
    coordinator: Arc<Coordinator<D>>,
    scheduler: Arc<Scheduler<D>>,
    scheduler_task: Mutex<Option<JoinHandle<()>>>,
    watcher: Mutex<Option<VisibilityWatcher>>,
}

impl<D: Domain> DomainContext<D> {
    /// Build the context, attach the watcher to `events` and arm the first timer.
    pub fn mount(domain: D, options: ContextOptions, events: &EventBus) -> Arc<Self> {
        let coordinator = Arc::new(Coordinator::new(
            domain,
            options.auto_refresh_enabled,
            options.fetch_deadline,
            monotonic_now(),
        ));
        let (scheduler, task) = Scheduler::spawn(Arc::clone(&coordinator));
        let watcher =
            VisibilityWatcher::attach(events, Arc::clone(&coordinator), Arc::clone(&scheduler));
        scheduler.start();
        tracing::info!(
            domain = %D::KIND,
            auto_refresh = options.auto_refresh_enabled,
            "refresh context mounted"
        );
        Arc::new(Self {
            coordinator,
            scheduler,
            scheduler_task: Mutex::new(Some(task)),
            watcher: Mutex::new(Some(watcher)),
        })
    }

    /// Detach listeners, cancel the timer and any in-flight batch, and wait
    /// for the background tasks to end. Idempotent.
    pub async fn unmount(&self) {
        let watcher = self.watcher.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(watcher) = watcher {
            watcher.detach().await;
        }
        self.scheduler.shutdown();
        self.coordinator.cancel();
        let task = self
            .scheduler_task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(task) = task
            && let Err(e) = task.await
        {
            tracing::warn!(domain = %D::KIND, "scheduler task failed: {e}");
        }
        tracing::info!(domain = %D::KIND, "refresh context unmounted");
    }

    pub fn status(&self) -> RefreshStatus {
        self.coordinator
            .snapshot(self.scheduler.remaining(), self.scheduler.phase())
    }

    pub fn data(&self) -> D::Data {
        self.coordinator.data()
    }

    pub fn coordinator(&self) -> &Arc<Coordinator<D>> {
        &self.coordinator
    }

    #[cfg(test)]
    pub fn scheduler(&self) -> &Arc<Scheduler<D>> {
        &self.scheduler
    }

    /// Toggle auto refresh and immediately re-evaluate the schedule.
    pub fn set_auto_refresh_enabled(&self, enabled: bool) {
        if self.coordinator.set_auto_refresh_enabled(enabled) {
            tracing::info!(domain = %D::KIND, enabled, "auto refresh toggled");
            self.scheduler.restart_if_active();
        }
    }

    /// Manual refresh. Leaves the pending timer alone unless the batch
    /// changed a policy input.
    pub async fn refresh_all(&self) -> RefreshOutcome {
        refresh_and_reschedule(&self.coordinator, &self.scheduler).await
    }

    /// Run a local mutation and reschedule if it moved the unread count.
    pub(crate) fn mutate<R>(
        &self,
        f: impl FnOnce(&mut D::Data, &mut inbox_core::RefreshState) -> R,
    ) -> R {
        let before = self.policy_key();
        let result = self.coordinator.update(f);
        self.reschedule_if_changed(before);
        result
    }

    /// React to an error from a user-initiated mutation.
    pub(crate) fn note_error(&self, error: &ApiError) {
        if error.is_unauthorized() {
            tracing::warn!(domain = %D::KIND, "authentication lost during mutation");
            self.coordinator.mark_unauthenticated();
            self.scheduler.stop();
        }
    }

    fn policy_key(&self) -> PolicyKey {
        policy_key(&self.coordinator)
    }

    fn reschedule_if_changed(&self, before: PolicyKey) {
        if policy_key(&self.coordinator) != before {
            self.scheduler.restart_if_active();
        }
    }
}

/// Policy inputs that warrant cancel-and-recompute when they change.
/// Activity age is deliberately absent: the next tick picks it up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PolicyKey {
    auto_refresh_enabled: bool,
    unread_count: u64,
    tab_visible: bool,
    has_active_conversation: bool,
    authenticated: bool,
}

fn policy_key<D: Domain>(coordinator: &Coordinator<D>) -> PolicyKey {
    let input = coordinator.policy_input(monotonic_now());
    PolicyKey {
        auto_refresh_enabled: input.auto_refresh_enabled,
        unread_count: input.unread_count,
        tab_visible: input.tab_visible,
        has_active_conversation: input.has_active_conversation,
        authenticated: coordinator.is_authenticated(),
    }
}

/// Out-of-band refresh shared by manual triggers and the visibility watcher.
pub(crate) async fn refresh_and_reschedule<D: Domain>(
    coordinator: &Coordinator<D>,
    scheduler: &Scheduler<D>,
) -> RefreshOutcome {
    let before = policy_key(coordinator);
    let outcome = coordinator.refresh_all().await;
    if outcome == RefreshOutcome::Unauthenticated {
        scheduler.stop();
    } else if policy_key(coordinator) != before {
        scheduler.restart_if_active();
    }
    outcome
}
