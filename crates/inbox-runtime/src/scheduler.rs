//! RefreshScheduler: one self-rearming timer per domain.
//!
//! The pending timer lives in a single-slot `watch` channel, so arming a
//! new one always replaces the previous one. A dedicated task sleeps on
//! whatever is in the slot, claims it when it fires, runs the batch and
//! re-arms from the freshly updated state.
//!
//! ```text
//!            start()                fire
//!   Idle ───────────► TimerArmed ─────────► FetchInFlight
//!    ▲   (policy None)     │ stop()              │ batch done
//!    └─────────────────────┼─────────────────────┤ start() again
//!                          ▼                     ▼
//!                       Stopped ◄──── stop() while in flight
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use inbox_core::SchedulePhase;

use crate::coordinator::{Coordinator, monotonic_now};
use crate::domain::Domain;

/// The one pending timer of a domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArmedTimer {
    pub deadline: Instant,
    pub interval: Duration,
    /// Increases with every arm; distinguishes a replaced timer from the current one.
    pub seq: u64,
}

pub struct Scheduler<D: Domain> {
    coordinator: Arc<Coordinator<D>>,
    timer: watch::Sender<Option<ArmedTimer>>,
    phase: watch::Sender<SchedulePhase>,
    active: AtomicBool,
    ticking: AtomicBool,
    seq: AtomicU64,
    ticks: AtomicU64,
    shutdown: CancellationToken,
}

impl<D: Domain> Scheduler<D> {
    /// Create the scheduler and spawn its timer task. Nothing is armed
    /// until [`Scheduler::start`] is called.
    pub fn spawn(coordinator: Arc<Coordinator<D>>) -> (Arc<Self>, JoinHandle<()>) {
        let (timer, _) = watch::channel(None);
        let (phase, _) = watch::channel(SchedulePhase::Idle);
        let scheduler = Arc::new(Self {
            coordinator,
            timer,
            phase,
            active: AtomicBool::new(false),
            ticking: AtomicBool::new(false),
            seq: AtomicU64::new(0),
            ticks: AtomicU64::new(0),
            shutdown: CancellationToken::new(),
        });
        let task = tokio::spawn(Arc::clone(&scheduler).run());
        (scheduler, task)
    }

    /// Cancel any pending timer and arm a fresh one from the current policy.
    pub fn start(&self) {
        if self.shutdown.is_cancelled() {
            return;
        }
        self.active.store(true, Ordering::Release);
        self.arm();
    }

    /// Recompute only if the scheduler is running; a stopped scheduler stays stopped.
    pub fn restart_if_active(&self) {
        if self.is_active() {
            self.start();
        }
    }

    /// Cancel the pending timer. No reschedule happens until `start()`.
    pub fn stop(&self) {
        self.active.store(false, Ordering::Release);
        self.timer.send_replace(None);
        self.settle_phase();
        tracing::debug!(domain = %D::KIND, "scheduler stopped");
    }

    /// Stop and end the timer task.
    pub fn shutdown(&self) {
        self.stop();
        self.shutdown.cancel();
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn pending(&self) -> Option<ArmedTimer> {
        *self.timer.borrow()
    }

    /// Remaining time on the pending timer.
    pub fn remaining(&self) -> Option<Duration> {
        self.pending()
            .map(|t| t.deadline.saturating_duration_since(Instant::now()))
    }

    pub fn phase(&self) -> SchedulePhase {
        *self.phase.borrow()
    }

    #[cfg(test)]
    pub fn subscribe_phase(&self) -> watch::Receiver<SchedulePhase> {
        self.phase.subscribe()
    }

    /// Number of timer fires so far.
    #[cfg(test)]
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Acquire)
    }

    fn arm(&self) {
        let now = Instant::now();
        let armed = self
            .coordinator
            .next_interval(monotonic_now())
            .map(|interval| ArmedTimer {
                deadline: now + interval,
                interval,
                seq: self.seq.fetch_add(1, Ordering::AcqRel) + 1,
            });
        self.timer.send_replace(armed);
        self.settle_phase();
        match armed {
            Some(t) => tracing::debug!(
                domain = %D::KIND,
                interval_ms = t.interval.as_millis() as u64,
                "refresh timer armed"
            ),
            None => tracing::debug!(domain = %D::KIND, "auto refresh off, no timer armed"),
        }
    }

    fn settle_phase(&self) {
        let phase = if self.ticking.load(Ordering::Acquire) {
            SchedulePhase::FetchInFlight
        } else if !self.is_active() {
            SchedulePhase::Stopped
        } else if self.pending().is_some() {
            SchedulePhase::TimerArmed
        } else {
            SchedulePhase::Idle
        };
        self.phase.send_replace(phase);
    }

    async fn run(self: Arc<Self>) {
        let mut rx = self.timer.subscribe();
        loop {
            let current = *rx.borrow_and_update();
            let Some(armed) = current else {
                tokio::select! {
                    () = self.shutdown.cancelled() => break,
                    changed = rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
                continue;
            };

            tokio::select! {
                () = self.shutdown.cancelled() => break,
                changed = rx.changed() => {
                    // Replaced or cleared: re-read the slot.
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                () = tokio::time::sleep_until(armed.deadline) => {}
            }

            // Claim the timer only if it is still the one we slept on.
            let claimed = self.timer.send_if_modified(|slot| {
                if slot.map(|t| t.seq) == Some(armed.seq) {
                    *slot = None;
                    true
                } else {
                    false
                }
            });
            if !claimed {
                continue;
            }

            tokio::select! {
                () = self.shutdown.cancelled() => break,
                () = self.tick() => {}
            }
        }
        self.ticking.store(false, Ordering::Release);
        self.settle_phase();
        tracing::debug!(domain = %D::KIND, "scheduler task exited");
    }

    async fn tick(&self) {
        let tick = self.ticks.fetch_add(1, Ordering::AcqRel) + 1;
        self.ticking.store(true, Ordering::Release);
        self.settle_phase();

        // The coordinator is the re-entrancy guard: a tick during a manual
        // refresh collapses into it and simply re-arms.
        let outcome = self.coordinator.refresh_all().await;
        tracing::debug!(domain = %D::KIND, tick, ?outcome, "scheduled refresh finished");

        self.ticking.store(false, Ordering::Release);
        if self.is_active() && !self.shutdown.is_cancelled() {
            self.arm();
        } else {
            self.settle_phase();
        }
    }
}
