//! Messages domain: inbox, sent box, conversations and the open thread.

use std::sync::Arc;

use serde::Serialize;

use inbox_api::{ApiError, MessagesBackend};
use inbox_core::types::count_unread_messages;
use inbox_core::{Conversation, DomainKind, Message, MessageId, NewMessage};

use crate::context::DomainContext;
use crate::coordinator::RefreshOutcome;
use crate::domain::{Domain, FetchReport};

/// The conversation the user currently has open.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Thread {
    pub other_user_id: i64,
    pub messages: Vec<Message>,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct MessagesData {
    pub inbox: Vec<Message>,
    pub sent: Vec<Message>,
    pub conversations: Vec<Conversation>,
    pub thread: Option<Thread>,
}

#[derive(Debug, Default)]
pub struct MessagesPatch {
    pub inbox: Option<Vec<Message>>,
    pub sent: Option<Vec<Message>>,
    pub unread: Option<u64>,
    pub conversations: Option<Vec<Conversation>>,
}

pub struct MessagesDomain<B> {
    backend: B,
}

impl<B: MessagesBackend> MessagesDomain<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }
}

impl<B: MessagesBackend> Domain for MessagesDomain<B> {
    type Data = MessagesData;
    type Patch = MessagesPatch;

    const KIND: DomainKind = DomainKind::Messages;

    async fn fetch(&self) -> FetchReport<MessagesPatch> {
        let (inbox, sent, unread, conversations) = tokio::join!(
            self.backend.list_inbox(),
            self.backend.list_sent(),
            self.backend.unread_count(),
            self.backend.list_conversations(),
        );
        let mut report = FetchReport::new(MessagesPatch::default());
        let inbox = report.take(Self::KIND, "inbox", inbox);
        let sent = report.take(Self::KIND, "sent", sent);
        let unread = report.take(Self::KIND, "unread_count", unread);
        let conversations = report.take(Self::KIND, "conversations", conversations);
        report.patch = MessagesPatch {
            inbox,
            sent,
            unread,
            conversations,
        };
        report
    }

    fn apply(&self, data: &mut MessagesData, patch: MessagesPatch) -> Option<u64> {
        let local_unread = patch.inbox.as_deref().map(count_unread_messages);
        if let Some(inbox) = patch.inbox {
            data.inbox = inbox;
        }
        if let Some(sent) = patch.sent {
            data.sent = sent;
        }
        if let Some(conversations) = patch.conversations {
            data.conversations = conversations;
        }
        // The count endpoint is authoritative; the inbox is the fallback.
        patch.unread.or(local_unread)
    }

    fn has_active_conversation(&self, data: &MessagesData) -> bool {
        data.thread.is_some()
    }
}

// ─── Message operations ───────────────────────────────────────────

impl<B: MessagesBackend> DomainContext<MessagesDomain<B>> {
    fn backend(&self) -> &B {
        self.coordinator().domain().backend()
    }

    /// Send a message. Failures go back to the caller; success triggers an
    /// immediate refresh so the sent box and threads catch up.
    pub async fn send(&self, message: NewMessage) -> Result<RefreshOutcome, ApiError> {
        if let Err(e) = self.backend().send(&message).await {
            tracing::warn!(recipient_id = message.recipient_id, error = %e, "send failed");
            self.note_error(&e);
            return Err(e);
        }
        tracing::info!(recipient_id = message.recipient_id, "message sent");
        Ok(self.refresh_all().await)
    }

    /// Open the thread with `other_user_id`. Tightens the cadence while
    /// the user keeps interacting with it.
    pub async fn open_conversation(&self, other_user_id: i64) -> Result<Vec<Message>, ApiError> {
        let messages = match self.backend().conversation(other_user_id).await {
            Ok(messages) => messages,
            Err(e) => {
                self.note_error(&e);
                return Err(e);
            }
        };
        self.mutate(|data, _| {
            data.thread = Some(Thread {
                other_user_id,
                messages: messages.clone(),
            });
        });
        Ok(messages)
    }

    pub fn close_conversation(&self) {
        self.mutate(|data, _| data.thread = None);
    }

    pub async fn mark_read(&self, id: MessageId) -> Result<(), ApiError> {
        if let Err(e) = self.backend().mark_read(id).await {
            self.note_error(&e);
            return Err(e);
        }
        self.mutate(|data, state| {
            let mut was_unread = false;
            for message in data.inbox.iter_mut().filter(|m| m.id == id) {
                was_unread |= !message.read;
                message.read = true;
            }
            if let Some(thread) = &mut data.thread {
                for message in thread.messages.iter_mut().filter(|m| m.id == id) {
                    message.read = true;
                }
            }
            if was_unread {
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
        self.mutate(|data, state| {
            data.inbox.iter_mut().for_each(|m| m.read = true);
            data.conversations.iter_mut().for_each(|c| c.unread_count = 0);
            if let Some(thread) = &mut data.thread {
                thread.messages.iter_mut().for_each(|m| m.read = true);
            }
            state.unread_count = 0;
        });
        Ok(())
    }

    /// Delete every message server-side and reset local state to empty.
    pub async fn clear_all(&self) -> Result<(), ApiError> {
        if let Err(e) = self.backend().clear_all().await {
            self.note_error(&e);
            return Err(e);
        }
        self.mutate(|data, state| {
            *data = MessagesData::default();
            state.unread_count = 0;
        });
        tracing::info!("all messages cleared");
        Ok(())
    }
}

pub type SharedMessagesContext<B> = Arc<DomainContext<MessagesDomain<B>>>;
