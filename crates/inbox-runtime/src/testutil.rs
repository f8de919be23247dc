//! Fake HTTP backend for tests.
//! Counts calls per operation and can inject delays, failures and 401s.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use inbox_api::{ApiError, MessagesBackend, NotificationsBackend};
use inbox_core::{Conversation, Message, MessageId, NewMessage, Notification};

pub struct FakeBackend {
    calls: Mutex<HashMap<&'static str, usize>>,
    failing: Mutex<HashSet<&'static str>>,
    unauthorized: AtomicBool,
    delay: Duration,
    unread_messages: AtomicU64,
    unread_notifications: AtomicU64,
    sent: Mutex<Vec<NewMessage>>,
}

impl Default for FakeBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeBackend {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(HashMap::new()),
            failing: Mutex::new(HashSet::new()),
            unauthorized: AtomicBool::new(false),
            delay: Duration::ZERO,
            unread_messages: AtomicU64::new(0),
            unread_notifications: AtomicU64::new(0),
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Every operation sleeps this long before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_failing(self, operation: &'static str) -> Self {
        self.set_failing(operation, true);
        self
    }

    pub fn with_unread_messages(self, n: u64) -> Self {
        self.set_unread_messages(n);
        self
    }

    pub fn with_unread_notifications(self, n: u64) -> Self {
        self.set_unread_notifications(n);
        self
    }

    pub fn set_failing(&self, operation: &'static str, failing: bool) {
        let mut set = self.failing.lock().expect("lock");
        if failing {
            set.insert(operation);
        } else {
            set.remove(operation);
        }
    }

    pub fn set_unauthorized(&self, on: bool) {
        self.unauthorized.store(on, Ordering::SeqCst);
    }

    pub fn set_unread_messages(&self, n: u64) {
        self.unread_messages.store(n, Ordering::SeqCst);
    }

    pub fn set_unread_notifications(&self, n: u64) {
        self.unread_notifications.store(n, Ordering::SeqCst);
    }

    pub fn calls(&self, operation: &str) -> usize {
        self.calls
            .lock()
            .expect("lock")
            .get(operation)
            .copied()
            .unwrap_or(0)
    }

    pub fn sent(&self) -> Vec<NewMessage> {
        self.sent.lock().expect("lock").clone()
    }

    async fn enter(&self, operation: &'static str) -> Result<(), ApiError> {
        *self.calls.lock().expect("lock").entry(operation).or_default() += 1;
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.unauthorized.load(Ordering::SeqCst) {
            return Err(ApiError::Unauthorized);
        }
        if self.failing.lock().expect("lock").contains(operation) {
            return Err(ApiError::Status {
                code: 503,
                body: format!("{operation} unavailable"),
            });
        }
        Ok(())
    }

    fn messages(&self) -> Vec<Message> {
        let unread = self.unread_messages.load(Ordering::SeqCst);
        // Always at least two messages; the first `unread` are unread.
        let total = unread.max(2);
        (1..=total)
            .map(|i| message(i as i64, i > unread))
            .collect()
    }

    fn notifications(&self) -> Vec<Notification> {
        let unread = self.unread_notifications.load(Ordering::SeqCst);
        let total = unread.max(2);
        (1..=total)
            .map(|i| notification(&format!("n{i}"), i > unread))
            .collect()
    }
}

pub fn message(id: MessageId, read: bool) -> Message {
    serde_json::from_value(serde_json::json!({
        "id": id,
        "subject": format!("subject {id}"),
        "content": "body",
        "read": read,
    }))
    .expect("valid message")
}

pub fn notification(id: &str, read: bool) -> Notification {
    let read_at = if read {
        serde_json::json!("2024-05-01T08:00:00Z")
    } else {
        serde_json::Value::Null
    };
    serde_json::from_value(serde_json::json!({
        "id": id,
        "title": "Proposal update",
        "message": format!("notification {id}"),
        "read_at": read_at,
    }))
    .expect("valid notification")
}

impl MessagesBackend for FakeBackend {
    async fn list_inbox(&self) -> Result<Vec<Message>, ApiError> {
        self.enter("messages.inbox").await?;
        Ok(self.messages())
    }

    async fn list_sent(&self) -> Result<Vec<Message>, ApiError> {
        self.enter("messages.sent").await?;
        Ok(vec![message(100, true)])
    }

    async fn unread_count(&self) -> Result<u64, ApiError> {
        self.enter("messages.unread_count").await?;
        Ok(self.unread_messages.load(Ordering::SeqCst))
    }

    async fn list_conversations(&self) -> Result<Vec<Conversation>, ApiError> {
        self.enter("messages.conversations").await?;
        Ok(vec![
            serde_json::from_value(serde_json::json!({
                "other_user_id": 7,
                "other_user_name": "Review Division",
                "unread_count": self.unread_messages.load(Ordering::SeqCst),
            }))
            .expect("valid conversation"),
        ])
    }

    async fn conversation(&self, other_user_id: i64) -> Result<Vec<Message>, ApiError> {
        self.enter("messages.conversation").await?;
        Ok(vec![message(other_user_id * 10, true)])
    }

    async fn send(&self, message: &NewMessage) -> Result<(), ApiError> {
        self.enter("messages.send").await?;
        self.sent.lock().expect("lock").push(message.clone());
        Ok(())
    }

    async fn mark_read(&self, _id: MessageId) -> Result<(), ApiError> {
        self.enter("messages.mark_read").await?;
        let n = self.unread_messages.load(Ordering::SeqCst);
        self.unread_messages.store(n.saturating_sub(1), Ordering::SeqCst);
        Ok(())
    }

    async fn mark_all_read(&self) -> Result<(), ApiError> {
        self.enter("messages.mark_all_read").await?;
        self.unread_messages.store(0, Ordering::SeqCst);
        Ok(())
    }

    async fn clear_all(&self) -> Result<(), ApiError> {
        self.enter("messages.clear").await?;
        self.unread_messages.store(0, Ordering::SeqCst);
        Ok(())
    }
}

impl NotificationsBackend for FakeBackend {
    async fn list(&self) -> Result<Vec<Notification>, ApiError> {
        self.enter("notifications.list").await?;
        Ok(self.notifications())
    }

    async fn unread_count(&self) -> Result<u64, ApiError> {
        self.enter("notifications.unread_count").await?;
        Ok(self.unread_notifications.load(Ordering::SeqCst))
    }

    async fn mark_read(&self, _id: &str) -> Result<(), ApiError> {
        self.enter("notifications.mark_read").await?;
        let n = self.unread_notifications.load(Ordering::SeqCst);
        self.unread_notifications
            .store(n.saturating_sub(1), Ordering::SeqCst);
        Ok(())
    }

    async fn mark_all_read(&self) -> Result<(), ApiError> {
        self.enter("notifications.mark_all_read").await?;
        self.unread_notifications.store(0, Ordering::SeqCst);
        Ok(())
    }

    async fn delete(&self, _id: &str) -> Result<(), ApiError> {
        self.enter("notifications.delete").await?;
        Ok(())
    }
}
