//! Inbox session: both domain contexts plus the shared UI event bus.
//!
//! Mounted once credentials are available, unmounted on logout or shutdown.

use std::sync::Arc;
use std::time::Duration;

use inbox_api::{MessagesBackend, NotificationsBackend};
use inbox_core::{DomainKind, RefreshStatus};

use crate::context::{ContextOptions, DomainContext};
use crate::coordinator::{DEFAULT_FETCH_DEADLINE, RefreshOutcome};
use crate::dismissed::DismissedStore;
use crate::messages::{MessagesDomain, SharedMessagesContext};
use crate::notifications::{NotificationsDomain, SharedNotificationsContext};
use crate::watcher::{EventBus, UiEvent, event_bus};

#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    pub messages_auto_refresh: bool,
    pub notifications_auto_refresh: bool,
    pub fetch_deadline: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            messages_auto_refresh: true,
            notifications_auto_refresh: true,
            fetch_deadline: DEFAULT_FETCH_DEADLINE,
        }
    }
}

pub struct Inbox<B: MessagesBackend + NotificationsBackend> {
    events: EventBus,
    messages: SharedMessagesContext<Arc<B>>,
    notifications: SharedNotificationsContext<Arc<B>>,
}

impl<B> Inbox<B>
where
    B: MessagesBackend + NotificationsBackend,
{
    pub fn mount(backend: Arc<B>, dismissed: DismissedStore, config: SessionConfig) -> Self {
        let events = event_bus();
        let messages = DomainContext::mount(
            MessagesDomain::new(Arc::clone(&backend)),
            ContextOptions {
                auto_refresh_enabled: config.messages_auto_refresh,
                fetch_deadline: config.fetch_deadline,
            },
            &events,
        );
        let notifications = DomainContext::mount(
            NotificationsDomain::new(backend, dismissed),
            ContextOptions {
                auto_refresh_enabled: config.notifications_auto_refresh,
                fetch_deadline: config.fetch_deadline,
            },
            &events,
        );
        Self {
            events,
            messages,
            notifications,
        }
    }

    pub async fn unmount(&self) {
        tokio::join!(self.messages.unmount(), self.notifications.unmount());
    }

    pub fn messages(&self) -> &SharedMessagesContext<Arc<B>> {
        &self.messages
    }

    pub fn notifications(&self) -> &SharedNotificationsContext<Arc<B>> {
        &self.notifications
    }

    /// Manual refresh of both domains, concurrently.
    pub async fn refresh_everything(&self) -> (RefreshOutcome, RefreshOutcome) {
        tokio::join!(self.messages.refresh_all(), self.notifications.refresh_all())
    }

    pub async fn refresh(&self, kind: DomainKind) -> RefreshOutcome {
        match kind {
            DomainKind::Messages => self.messages.refresh_all().await,
            DomainKind::Notifications => self.notifications.refresh_all().await,
        }
    }

    pub fn set_auto_refresh_enabled(&self, kind: DomainKind, enabled: bool) {
        match kind {
            DomainKind::Messages => self.messages.set_auto_refresh_enabled(enabled),
            DomainKind::Notifications => self.notifications.set_auto_refresh_enabled(enabled),
        }
    }

    /// Broadcast a UI event to every attached watcher. Returns the number of listeners.
    pub fn publish(&self, event: UiEvent) -> usize {
        self.events.publish(event)
    }

    pub fn status(&self) -> Vec<RefreshStatus> {
        vec![self.messages.status(), self.notifications.status()]
    }
}
