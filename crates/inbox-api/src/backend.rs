//! Backend traits for the two refresh domains.
//!
//! One method per server operation. Futures must be `Send` so callers can
//! drive them from spawned tasks.

use std::future::Future;

use inbox_core::{Conversation, Message, MessageId, NewMessage, Notification};

use crate::error::ApiError;

pub trait MessagesBackend: Send + Sync + 'static {
    fn list_inbox(&self) -> impl Future<Output = Result<Vec<Message>, ApiError>> + Send;

    fn list_sent(&self) -> impl Future<Output = Result<Vec<Message>, ApiError>> + Send;

    fn unread_count(&self) -> impl Future<Output = Result<u64, ApiError>> + Send;

    fn list_conversations(
        &self,
    ) -> impl Future<Output = Result<Vec<Conversation>, ApiError>> + Send;

    /// Full thread with one other user. Fetched on demand, never batched.
    fn conversation(
        &self,
        other_user_id: i64,
    ) -> impl Future<Output = Result<Vec<Message>, ApiError>> + Send;

    fn send(&self, message: &NewMessage) -> impl Future<Output = Result<(), ApiError>> + Send;

    fn mark_read(&self, id: MessageId) -> impl Future<Output = Result<(), ApiError>> + Send;

    fn mark_all_read(&self) -> impl Future<Output = Result<(), ApiError>> + Send;

    fn clear_all(&self) -> impl Future<Output = Result<(), ApiError>> + Send;
}

pub trait NotificationsBackend: Send + Sync + 'static {
    fn list(&self) -> impl Future<Output = Result<Vec<Notification>, ApiError>> + Send;

    fn unread_count(&self) -> impl Future<Output = Result<u64, ApiError>> + Send;

    fn mark_read(&self, id: &str) -> impl Future<Output = Result<(), ApiError>> + Send;

    fn mark_all_read(&self) -> impl Future<Output = Result<(), ApiError>> + Send;

    fn delete(&self, id: &str) -> impl Future<Output = Result<(), ApiError>> + Send;
}

/// Shared backends: contexts hold `Arc<B>` so the same client serves both domains.
impl<T: MessagesBackend> MessagesBackend for std::sync::Arc<T> {
    fn list_inbox(&self) -> impl Future<Output = Result<Vec<Message>, ApiError>> + Send {
        (**self).list_inbox()
    }

    fn list_sent(&self) -> impl Future<Output = Result<Vec<Message>, ApiError>> + Send {
        (**self).list_sent()
    }

    fn unread_count(&self) -> impl Future<Output = Result<u64, ApiError>> + Send {
        MessagesBackend::unread_count(&**self)
    }

    fn list_conversations(
        &self,
    ) -> impl Future<Output = Result<Vec<Conversation>, ApiError>> + Send {
        (**self).list_conversations()
    }

    fn conversation(
        &self,
        other_user_id: i64,
    ) -> impl Future<Output = Result<Vec<Message>, ApiError>> + Send {
        (**self).conversation(other_user_id)
    }

    fn send(&self, message: &NewMessage) -> impl Future<Output = Result<(), ApiError>> + Send {
        (**self).send(message)
    }

    fn mark_read(&self, id: MessageId) -> impl Future<Output = Result<(), ApiError>> + Send {
        MessagesBackend::mark_read(&**self, id)
    }

    fn mark_all_read(&self) -> impl Future<Output = Result<(), ApiError>> + Send {
        MessagesBackend::mark_all_read(&**self)
    }

    fn clear_all(&self) -> impl Future<Output = Result<(), ApiError>> + Send {
        (**self).clear_all()
    }
}

impl<T: NotificationsBackend> NotificationsBackend for std::sync::Arc<T> {
    fn list(&self) -> impl Future<Output = Result<Vec<Notification>, ApiError>> + Send {
        (**self).list()
    }

    fn unread_count(&self) -> impl Future<Output = Result<u64, ApiError>> + Send {
        NotificationsBackend::unread_count(&**self)
    }

    fn mark_read(&self, id: &str) -> impl Future<Output = Result<(), ApiError>> + Send {
        NotificationsBackend::mark_read(&**self, id)
    }

    fn mark_all_read(&self) -> impl Future<Output = Result<(), ApiError>> + Send {
        NotificationsBackend::mark_all_read(&**self)
    }

    fn delete(&self, id: &str) -> impl Future<Output = Result<(), ApiError>> + Send {
        (**self).delete(id)
    }
}
