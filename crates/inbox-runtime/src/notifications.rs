//! Notifications domain: the notification list plus local dismissal.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use serde::Serialize;

use inbox_api::{ApiError, NotificationsBackend};
use inbox_core::types::count_unread_notifications;
use inbox_core::{DomainKind, Notification};

use crate::context::DomainContext;
use crate::dismissed::{DismissedError, DismissedStore};
use crate::domain::{Domain, FetchReport};

#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct NotificationsData {
    /// Server notifications minus the locally dismissed ones.
    pub items: Vec<Notification>,
    /// Unread notifications hidden by dismissal; the server count still includes them.
    #[serde(skip)]
    pub dismissed_unread: u64,
}

#[derive(Debug, Default)]
pub struct NotificationsPatch {
    pub list: Option<Vec<Notification>>,
    pub unread: Option<u64>,
}

pub struct NotificationsDomain<B> {
    backend: B,
    dismissed: Arc<Mutex<DismissedStore>>,
}

impl<B: NotificationsBackend> NotificationsDomain<B> {
    pub fn new(backend: B, dismissed: DismissedStore) -> Self {
        Self {
            backend,
            dismissed: Arc::new(Mutex::new(dismissed)),
        }
    }

    /// Dismissals are kept for the lifetime of the process only.
    #[cfg(test)]
    pub fn in_memory(backend: B) -> Self {
        Self::new(backend, DismissedStore::in_memory())
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn store(&self) -> MutexGuard<'_, DismissedStore> {
        lock_store(&self.dismissed)
    }
}

fn lock_store(store: &Mutex<DismissedStore>) -> MutexGuard<'_, DismissedStore> {
    store.lock().unwrap_or_else(|e| e.into_inner())
}

impl<B: NotificationsBackend> Domain for NotificationsDomain<B> {
    type Data = NotificationsData;
    type Patch = NotificationsPatch;

    const KIND: DomainKind = DomainKind::Notifications;

    async fn fetch(&self) -> FetchReport<NotificationsPatch> {
        let (list, unread) = tokio::join!(self.backend.list(), self.backend.unread_count());
        let mut report = FetchReport::new(NotificationsPatch::default());
        let list = report.take(Self::KIND, "list", list);
        let unread = report.take(Self::KIND, "unread_count", unread);
        report.patch = NotificationsPatch { list, unread };
        report
    }

    fn apply(&self, data: &mut NotificationsData, patch: NotificationsPatch) -> Option<u64> {
        if let Some(list) = patch.list {
            let store = self.store();
            let (hidden, visible): (Vec<_>, Vec<_>) =
                list.into_iter().partition(|n| store.contains(&n.id));
            data.dismissed_unread = count_unread_notifications(&hidden);
            data.items = visible;
            if patch.unread.is_none() {
                return Some(count_unread_notifications(&data.items));
            }
        }
        patch
            .unread
            .map(|count| count.saturating_sub(data.dismissed_unread))
    }
}

// ─── Notification operations ──────────────────────────────────────

/// Mark one item read in local data; returns whether it was unread.
fn mark_item_read(items: &mut [Notification], id: &str) -> bool {
    let mut was_unread = false;
    for item in items.iter_mut().filter(|n| n.id == id) {
        if item.is_unread() {
            was_unread = true;
            item.read_at = Some(Utc::now());
        }
    }
    was_unread
}

/// Remove one item from local data; returns whether it was unread.
fn remove_item(items: &mut Vec<Notification>, id: &str) -> bool {
    let was_unread = items.iter().any(|n| n.id == id && n.is_unread());
    items.retain(|n| n.id != id);
    was_unread
}

impl<B: NotificationsBackend> DomainContext<NotificationsDomain<B>> {
    fn backend(&self) -> &B {
        self.coordinator().domain().backend()
    }

    pub async fn mark_read(&self, id: &str) -> Result<(), ApiError> {
        if let Err(e) = self.backend().mark_read(id).await {
            self.note_error(&e);
            return Err(e);
        }
        self.mutate(|data, state| {
            if mark_item_read(&mut data.items, id) {
                state.unread_count = state.unread_count.saturating_sub(1);
            }
        });
        Ok(())
    }

    pub async fn mark_all_read(&self) -> Result<(), ApiError> {
        if let Err(e) = self.backend().mark_all_read().await {
            self.note_error(&e);
            return Err(e);
        }
        let now = Utc::now();
        self.mutate(|data, state| {
            for item in data.items.iter_mut().filter(|n| n.is_unread()) {
                item.read_at = Some(now);
            }
            data.dismissed_unread = 0;
            state.unread_count = 0;
        });
        Ok(())
    }

    pub async fn delete(&self, id: &str) -> Result<(), ApiError> {
        if let Err(e) = self.backend().delete(id).await {
            self.note_error(&e);
            return Err(e);
        }
        self.mutate(|data, state| {
            if remove_item(&mut data.items, id) {
                state.unread_count = state.unread_count.saturating_sub(1);
            }
        });
        Ok(())
    }

    /// Hide a notification locally and remember it across restarts.
    /// Returns `false` if it was already dismissed.
    pub async fn dismiss(&self, id: &str) -> Result<bool, DismissedError> {
        // The store writes to disk; keep that off the runtime threads.
        let store = Arc::clone(&self.coordinator().domain().dismissed);
        let owned = id.to_string();
        let inserted =
            tokio::task::spawn_blocking(move || lock_store(&store).insert(&owned)).await??;
        if !inserted {
            return Ok(false);
        }
        self.mutate(|data, state| {
            if remove_item(&mut data.items, id) {
                data.dismissed_unread += 1;
                state.unread_count = state.unread_count.saturating_sub(1);
            }
        });
        tracing::info!(id, "notification dismissed");
        Ok(true)
    }
}

pub type SharedNotificationsContext<B> = Arc<DomainContext<NotificationsDomain<B>>>;

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::context::ContextOptions;
    use crate::coordinator::DEFAULT_FETCH_DEADLINE;
    use crate::dismissed::DISMISSED_FILE;
    use crate::testutil::{FakeBackend, notification};
    use crate::watcher::{EventBus, event_bus};

    type Ctx = SharedNotificationsContext<Arc<FakeBackend>>;

    fn mount_with(domain: NotificationsDomain<Arc<FakeBackend>>) -> (Ctx, EventBus) {
        let bus = event_bus();
        let ctx = DomainContext::mount(
            domain,
            ContextOptions {
                auto_refresh_enabled: true,
                fetch_deadline: DEFAULT_FETCH_DEADLINE,
            },
            &bus,
        );
        (ctx, bus)
    }

    fn mount(backend: &Arc<FakeBackend>) -> (Ctx, EventBus) {
        mount_with(NotificationsDomain::in_memory(Arc::clone(backend)))
    }

    fn ids(ctx: &Ctx) -> Vec<String> {
        ctx.data().items.into_iter().map(|n| n.id).collect()
    }

    #[test]
    fn apply_subtracts_dismissed_unread() {
        let mut store = DismissedStore::in_memory();
        store.insert("b").expect("insert");
        let domain = NotificationsDomain::new(Arc::new(FakeBackend::new()), store);

        let mut data = NotificationsData::default();
        let unread = domain.apply(
            &mut data,
            NotificationsPatch {
                list: Some(vec![
                    notification("a", false),
                    notification("b", false),
                    notification("c", true),
                ]),
                unread: Some(2),
            },
        );
        assert_eq!(unread, Some(1));
        assert_eq!(data.items.len(), 2);
        assert_eq!(data.dismissed_unread, 1);

        // List failed: the count is still corrected by the last known hidden unread.
        let unread = domain.apply(
            &mut data,
            NotificationsPatch {
                list: None,
                unread: Some(5),
            },
        );
        assert_eq!(unread, Some(4));
        assert_eq!(data.items.len(), 2, "items kept");
    }

    #[test]
    fn apply_counts_list_when_count_failed() {
        let domain = NotificationsDomain::in_memory(Arc::new(FakeBackend::new()));
        let mut data = NotificationsData::default();
        let unread = domain.apply(
            &mut data,
            NotificationsPatch {
                list: Some(vec![notification("a", false), notification("b", true)]),
                unread: None,
            },
        );
        assert_eq!(unread, Some(1));
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn mark_read_relaxes_cadence() {
        let backend = Arc::new(FakeBackend::new().with_unread_notifications(1));
        let (ctx, _bus) = mount(&backend);
        ctx.refresh_all().await;
        assert_eq!(ctx.status().unread_count, 1);
        assert_eq!(
            ctx.scheduler().pending().map(|t| t.interval),
            Some(Duration::from_secs(15))
        );

        ctx.mark_read("n1").await.expect("mark read");
        assert_eq!(ctx.status().unread_count, 0);
        assert!(ctx.data().items.iter().all(|n| !n.is_unread()));
        assert_eq!(
            ctx.scheduler().pending().map(|t| t.interval),
            Some(Duration::from_secs(45))
        );
        ctx.unmount().await;
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn mark_all_read_and_delete() {
        let backend = Arc::new(FakeBackend::new().with_unread_notifications(3));
        let (ctx, _bus) = mount(&backend);
        ctx.refresh_all().await;

        ctx.delete("n3").await.expect("delete");
        assert_eq!(ids(&ctx), vec!["n1", "n2"]);
        assert_eq!(ctx.status().unread_count, 2);

        ctx.mark_all_read().await.expect("mark all");
        assert_eq!(ctx.status().unread_count, 0);
        assert_eq!(backend.calls("notifications.mark_all_read"), 1);
        ctx.unmount().await;
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn dismissed_items_stay_hidden_across_refreshes() {
        let backend = Arc::new(FakeBackend::new().with_unread_notifications(3));
        let (ctx, _bus) = mount(&backend);
        ctx.refresh_all().await;
        assert_eq!(ctx.status().unread_count, 3);

        assert!(ctx.dismiss("n1").await.expect("dismiss"));
        assert!(!ctx.dismiss("n1").await.expect("dismiss again"));
        assert_eq!(ids(&ctx), vec!["n2", "n3"]);
        assert_eq!(ctx.status().unread_count, 2);

        ctx.refresh_all().await;
        assert_eq!(ids(&ctx), vec!["n2", "n3"]);
        assert_eq!(ctx.status().unread_count, 2, "server count minus dismissed");
        ctx.unmount().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn dismiss_is_on_disk_when_it_returns() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = Arc::new(FakeBackend::new());
        let store = DismissedStore::load(dir.path()).expect("load");
        let (ctx, _bus) = mount_with(NotificationsDomain::new(Arc::clone(&backend), store));

        assert!(ctx.dismiss("n7").await.expect("dismiss"));
        let on_disk =
            std::fs::read_to_string(dir.path().join(DISMISSED_FILE)).expect("read store");
        assert!(on_disk.contains("\"n7\""), "{on_disk}");
        ctx.unmount().await;
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn dismissals_survive_remount() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = Arc::new(FakeBackend::new().with_unread_notifications(2));

        let store = DismissedStore::load(dir.path()).expect("load");
        let (ctx, _bus) = mount_with(NotificationsDomain::new(Arc::clone(&backend), store));
        ctx.refresh_all().await;
        ctx.dismiss("n2").await.expect("dismiss");
        ctx.unmount().await;

        let store = DismissedStore::load(dir.path()).expect("reload");
        let (ctx, _bus) = mount_with(NotificationsDomain::new(Arc::clone(&backend), store));
        ctx.refresh_all().await;
        assert_eq!(ids(&ctx), vec!["n1"]);
        assert_eq!(ctx.status().unread_count, 1);
        ctx.unmount().await;
    }
}
