//! FetchCoordinator: runs one domain's batch with a re-entrancy guard.
//!
//! Overlapping triggers (timer, manual refresh, tab foreground) collapse
//! into the batch already in flight. Sub-fetch failures are swallowed and
//! logged; the guard is released on every exit path, including deadline
//! expiry and teardown cancellation.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use inbox_core::{
    ActivityTracker, PolicyInput, RefreshState, RefreshStatus, SchedulePhase, Visibility,
    compute_interval,
};

use crate::domain::Domain;

/// Default upper bound on a whole batch.
pub const DEFAULT_FETCH_DEADLINE: Duration = Duration::from_secs(30);

/// Monotonic "now" taken from the tokio clock, so paused-time tests and
/// timers agree on activity ages.
pub fn monotonic_now() -> Instant {
    tokio::time::Instant::now().into_std()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RefreshOutcome {
    /// The batch ran to completion; `all_ok` is false on partial failure.
    Completed { all_ok: bool },
    /// Another batch was in flight; this trigger collapsed into it.
    AlreadyRunning,
    /// The batch exceeded the fetch deadline.
    TimedOut,
    /// Teardown cancelled the batch.
    Cancelled,
    /// The domain lost authentication; no requests were made.
    Unauthenticated,
}

/// Mutable per-domain state. Only locked for synchronous sections.
struct Shared<T> {
    state: RefreshState,
    data: T,
    activity: ActivityTracker,
    visibility: Visibility,
}

/// Clears the in-flight flag on drop.
struct InFlightGuard<'a>(&'a AtomicBool);

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct Coordinator<D: Domain> {
    domain: D,
    shared: Mutex<Shared<D::Data>>,
    in_flight: AtomicBool,
    deadline: Duration,
    cancel: CancellationToken,
}

impl<D: Domain> Coordinator<D> {
    pub fn new(domain: D, auto_refresh_enabled: bool, deadline: Duration, now: Instant) -> Self {
        Self {
            domain,
            shared: Mutex::new(Shared {
                state: RefreshState::new(auto_refresh_enabled),
                data: D::Data::default(),
                activity: ActivityTracker::new(now),
                visibility: Visibility::Visible,
            }),
            in_flight: AtomicBool::new(false),
            deadline,
            cancel: CancellationToken::new(),
        }
    }

    pub fn domain(&self) -> &D {
        &self.domain
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Shared<D::Data>> {
        // A poisoned lock only means a panic elsewhere; the data is still usable.
        self.shared.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Run one batch unless one is already in flight.
    pub async fn refresh_all(&self) -> RefreshOutcome {
        let Some(guard) = InFlightGuard::acquire(&self.in_flight) else {
            tracing::debug!(domain = %D::KIND, "refresh already in flight, collapsing");
            return RefreshOutcome::AlreadyRunning;
        };
        if !self.lock().state.authenticated {
            return RefreshOutcome::Unauthenticated;
        }

        let started = tokio::time::Instant::now();
        let report = tokio::select! {
            biased;
            () = self.cancel.cancelled() => {
                tracing::debug!(domain = %D::KIND, "refresh cancelled by teardown");
                return RefreshOutcome::Cancelled;
            }
            result = tokio::time::timeout(self.deadline, self.domain.fetch()) => match result {
                Ok(report) => report,
                Err(_) => {
                    tracing::warn!(
                        domain = %D::KIND,
                        deadline_ms = self.deadline.as_millis() as u64,
                        "refresh exceeded deadline"
                    );
                    let mut sh = self.lock();
                    sh.state.record_batch(Some("batch deadline exceeded".to_string()), Utc::now());
                    return RefreshOutcome::TimedOut;
                }
            },
        };

        let all_ok = report.all_ok();
        let unauthorized = report.unauthorized();
        let first_error = report.first_error();
        {
            let mut sh = self.lock();
            if unauthorized {
                tracing::warn!(domain = %D::KIND, "authentication lost, clearing domain state");
                sh.state.mark_unauthenticated();
                sh.state.record_batch(first_error, Utc::now());
                sh.data = D::Data::default();
            } else {
                let Shared { state, data, .. } = &mut *sh;
                if let Some(unread) = self.domain.apply(data, report.patch) {
                    state.unread_count = unread;
                }
                state.record_batch(first_error, Utc::now());
            }
        }
        drop(guard);

        tracing::debug!(
            domain = %D::KIND,
            all_ok,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "refresh complete"
        );

        if unauthorized {
            RefreshOutcome::Unauthenticated
        } else {
            RefreshOutcome::Completed { all_ok }
        }
    }

    /// Delay until the next scheduled batch, `None` when nothing should be armed.
    pub fn next_interval(&self, now: Instant) -> Option<Duration> {
        let sh = self.lock();
        if !sh.state.authenticated {
            return None;
        }
        let input = self.policy_input_locked(&sh, now);
        compute_interval(self.domain.table(), &input)
    }

    pub fn policy_input(&self, now: Instant) -> PolicyInput {
        let sh = self.lock();
        self.policy_input_locked(&sh, now)
    }

    fn policy_input_locked(&self, sh: &Shared<D::Data>, now: Instant) -> PolicyInput {
        sh.state.policy_input(
            sh.visibility,
            sh.activity.since(now),
            self.domain.has_active_conversation(&sh.data),
        )
    }

    /// Record user activity. Does not reschedule.
    pub fn touch(&self, now: Instant) -> bool {
        self.lock().activity.touch(now)
    }

    #[cfg(test)]
    pub fn last_activity_at(&self) -> Instant {
        self.lock().activity.last_activity_at()
    }

    /// Returns `true` if the visibility actually changed.
    pub fn set_visibility(&self, visibility: Visibility) -> bool {
        let mut sh = self.lock();
        let changed = sh.visibility != visibility;
        sh.visibility = visibility;
        changed
    }

    #[cfg(test)]
    pub fn visibility(&self) -> Visibility {
        self.lock().visibility
    }

    /// Returns `true` if the setting actually changed.
    pub fn set_auto_refresh_enabled(&self, enabled: bool) -> bool {
        let mut sh = self.lock();
        let changed = sh.state.auto_refresh_enabled != enabled;
        sh.state.auto_refresh_enabled = enabled;
        changed
    }

    pub fn is_refreshing(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    #[cfg(test)]
    pub fn unread_count(&self) -> u64 {
        self.lock().state.unread_count
    }

    pub fn is_authenticated(&self) -> bool {
        self.lock().state.authenticated
    }

    #[cfg(test)]
    pub fn state(&self) -> RefreshState {
        self.lock().state.clone()
    }

    pub fn data(&self) -> D::Data {
        self.lock().data.clone()
    }

    /// Apply a local mutation (mark read, clear, ...) to data and state together.
    pub fn update<R>(&self, f: impl FnOnce(&mut D::Data, &mut RefreshState) -> R) -> R {
        let mut sh = self.lock();
        let Shared { state, data, .. } = &mut *sh;
        f(data, state)
    }

    /// Treat the domain as logged out: clear data and stop accepting batches.
    pub fn mark_unauthenticated(&self) {
        let mut sh = self.lock();
        sh.state.mark_unauthenticated();
        sh.data = D::Data::default();
    }

    /// Cancel any in-flight batch. Used on teardown only.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn snapshot(&self, next_refresh_in: Option<Duration>, phase: SchedulePhase) -> RefreshStatus {
        let is_refreshing = self.is_refreshing();
        let sh = self.lock();
        RefreshStatus {
            domain: D::KIND,
            auto_refresh_enabled: sh.state.auto_refresh_enabled,
            is_refreshing,
            last_refresh: sh.state.last_refresh,
            unread_count: sh.state.unread_count,
            authenticated: sh.state.authenticated,
            visibility: sh.visibility,
            consecutive_failures: sh.state.consecutive_failures,
            last_error: sh.state.last_error.clone(),
            next_refresh_in_ms: next_refresh_in.map(|d| d.as_millis() as u64),
            phase,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::MessagesDomain;
    use crate::notifications::NotificationsDomain;
    use crate::testutil::FakeBackend;
    use std::sync::Arc;

    fn messages(backend: &Arc<FakeBackend>) -> Coordinator<MessagesDomain<Arc<FakeBackend>>> {
        Coordinator::new(
            MessagesDomain::new(Arc::clone(backend)),
            true,
            DEFAULT_FETCH_DEADLINE,
            monotonic_now(),
        )
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn refresh_applies_batch() {
        let backend = Arc::new(FakeBackend::new().with_unread_messages(3));
        let coord = messages(&backend);

        let outcome = coord.refresh_all().await;
        assert_eq!(outcome, RefreshOutcome::Completed { all_ok: true });
        assert_eq!(coord.unread_count(), 3);
        assert!(coord.state().last_refresh.is_some());
        assert!(!coord.is_refreshing());
        assert_eq!(backend.calls("messages.inbox"), 1);
        assert_eq!(backend.calls("messages.sent"), 1);
        assert_eq!(backend.calls("messages.unread_count"), 1);
        assert_eq!(backend.calls("messages.conversations"), 1);
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn overlapping_refresh_collapses() {
        let backend = Arc::new(FakeBackend::new().with_delay(Duration::from_secs(2)));
        let coord = messages(&backend);

        let (a, b) = tokio::join!(coord.refresh_all(), coord.refresh_all());
        assert_eq!(a, RefreshOutcome::Completed { all_ok: true });
        assert_eq!(b, RefreshOutcome::AlreadyRunning);
        assert_eq!(backend.calls("messages.inbox"), 1, "exactly one batch");

        // Guard released: a later refresh runs again.
        assert_eq!(
            coord.refresh_all().await,
            RefreshOutcome::Completed { all_ok: true }
        );
        assert_eq!(backend.calls("messages.inbox"), 2);
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn partial_failure_applies_rest_and_releases_guard() {
        let backend = Arc::new(
            FakeBackend::new()
                .with_unread_messages(2)
                .with_failing("messages.conversations"),
        );
        let coord = messages(&backend);

        let outcome = coord.refresh_all().await;
        assert_eq!(outcome, RefreshOutcome::Completed { all_ok: false });
        assert_eq!(coord.unread_count(), 2, "successful sub-fetches still applied");
        assert_eq!(coord.data().inbox.len(), 2);
        let state = coord.state();
        assert!(state.last_refresh.is_none(), "partial batch is not a refresh");
        assert_eq!(state.consecutive_failures, 1);
        assert!(
            state
                .last_error
                .as_deref()
                .is_some_and(|e| e.starts_with("conversations:"))
        );
        assert!(!coord.is_refreshing());
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn deadline_releases_guard() {
        let backend = Arc::new(FakeBackend::new().with_delay(Duration::from_secs(120)));
        let coord = Coordinator::new(
            MessagesDomain::new(Arc::clone(&backend)),
            true,
            Duration::from_secs(5),
            monotonic_now(),
        );

        assert_eq!(coord.refresh_all().await, RefreshOutcome::TimedOut);
        assert!(!coord.is_refreshing());
        assert_eq!(coord.state().consecutive_failures, 1);
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn cancel_aborts_in_flight_batch() {
        let backend = Arc::new(FakeBackend::new().with_delay(Duration::from_secs(10)));
        let coord = Arc::new(messages(&backend));

        let task = {
            let coord = Arc::clone(&coord);
            tokio::spawn(async move { coord.refresh_all().await })
        };
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(coord.is_refreshing());
        coord.cancel();

        assert_eq!(task.await.expect("join"), RefreshOutcome::Cancelled);
        assert!(!coord.is_refreshing());
        assert!(coord.state().last_refresh.is_none());
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn unauthorized_clears_state() {
        let backend = Arc::new(FakeBackend::new().with_unread_messages(4));
        let coord = messages(&backend);
        coord.refresh_all().await;
        assert_eq!(coord.unread_count(), 4);

        backend.set_unauthorized(true);
        assert_eq!(coord.refresh_all().await, RefreshOutcome::Unauthenticated);
        assert_eq!(coord.unread_count(), 0);
        assert!(coord.data().inbox.is_empty());
        assert!(!coord.is_authenticated());
        assert_eq!(coord.next_interval(monotonic_now()), None, "no timer when logged out");

        // Further refreshes make no requests.
        let before = backend.calls("messages.inbox");
        assert_eq!(coord.refresh_all().await, RefreshOutcome::Unauthenticated);
        assert_eq!(backend.calls("messages.inbox"), before);
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn next_interval_follows_unread() {
        let backend = Arc::new(FakeBackend::new());
        let coord = Coordinator::new(
            NotificationsDomain::in_memory(Arc::clone(&backend)),
            true,
            DEFAULT_FETCH_DEADLINE,
            monotonic_now(),
        );
        // Mount counts as activity.
        assert_eq!(coord.next_interval(monotonic_now()), Some(Duration::from_secs(45)));

        backend.set_unread_notifications(2);
        coord.refresh_all().await;
        assert_eq!(coord.next_interval(monotonic_now()), Some(Duration::from_secs(15)));

        assert!(coord.set_visibility(Visibility::Hidden));
        assert!(!coord.set_visibility(Visibility::Hidden));
        assert_eq!(coord.next_interval(monotonic_now()), Some(Duration::from_secs(180)));

        assert!(coord.set_auto_refresh_enabled(false));
        assert_eq!(coord.next_interval(monotonic_now()), None);
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn snapshot_reflects_state() {
        let backend = Arc::new(FakeBackend::new().with_unread_messages(1));
        let coord = messages(&backend);
        coord.refresh_all().await;
        let status = coord.snapshot(Some(Duration::from_millis(9_500)), SchedulePhase::TimerArmed);
        assert_eq!(status.domain, inbox_core::DomainKind::Messages);
        assert_eq!(status.unread_count, 1);
        assert!(!status.is_refreshing);
        assert!(!status.is_degraded());
        assert_eq!(status.next_refresh_in_ms, Some(9_500));
        assert_eq!(status.phase, SchedulePhase::TimerArmed);
    }
}
