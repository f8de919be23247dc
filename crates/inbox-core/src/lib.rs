//! inbox-core: pure refresh-policy logic for the proposal-management inbox.
//! Records, per-domain refresh bookkeeping, the interval policy and the
//! activity tracker. No tokio, no IO.

pub mod activity;
pub mod error;
pub mod policy;
pub mod types;

pub use activity::ActivityTracker;
pub use error::CoreError;
pub use policy::{
    ConversationRule, IntervalTable, MESSAGES_TABLE, NOTIFICATIONS_TABLE, PolicyInput,
    compute_interval,
};
pub use types::{
    Conversation, DomainKind, Message, MessageId, NewMessage, Notification, NotificationId,
    RefreshState, RefreshStatus, SchedulePhase, Visibility,
};
