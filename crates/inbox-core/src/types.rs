use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;
use crate::policy::PolicyInput;

// ─── Domain & Visibility ──────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DomainKind {
    Messages,
    Notifications,
}

impl DomainKind {
    pub const ALL: [Self; 2] = [Self::Messages, Self::Notifications];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Messages => "messages",
            Self::Notifications => "notifications",
        }
    }
}

impl fmt::Display for DomainKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DomainKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "messages" | "message" => Ok(Self::Messages),
            "notifications" | "notification" => Ok(Self::Notifications),
            _ => Err(CoreError::UnknownDomain(s.to_string())),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Visible,
    Hidden,
}

impl Visibility {
    pub fn is_visible(self) -> bool {
        self == Self::Visible
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Visible => "visible",
            Self::Hidden => "hidden",
        }
    }
}

impl FromStr for Visibility {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "visible" | "shown" => Ok(Self::Visible),
            "hidden" => Ok(Self::Hidden),
            _ => Err(CoreError::UnknownVisibility(s.to_string())),
        }
    }
}

// ─── Records ──────────────────────────────────────────────────────

pub type MessageId = i64;
pub type NotificationId = String;

/// A direct message between two users. Only `id` and `read` are
/// interpreted; everything else is carried through for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    #[serde(default)]
    pub sender_id: Option<i64>,
    #[serde(default)]
    pub recipient_id: Option<i64>,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, rename = "type")]
    pub message_type: Option<String>,
    #[serde(default)]
    pub read: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Summary of the thread with one other user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub other_user_id: i64,
    #[serde(default)]
    pub other_user_name: Option<String>,
    #[serde(default)]
    pub last_message: Option<String>,
    #[serde(default)]
    pub unread_count: u64,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub message: String,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub read_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Notification {
    pub fn is_unread(&self) -> bool {
        self.read_at.is_none()
    }
}

/// Outgoing message body for the send operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMessage {
    pub recipient_id: i64,
    pub subject: String,
    pub content: String,
    #[serde(rename = "type", default = "default_message_type")]
    pub message_type: String,
}

fn default_message_type() -> String {
    "general".to_string()
}

/// Count of inbox messages not yet read.
pub fn count_unread_messages(messages: &[Message]) -> u64 {
    messages.iter().filter(|m| !m.read).count() as u64
}

/// Count of notifications without a `read_at` timestamp.
pub fn count_unread_notifications<'a>(
    notifications: impl IntoIterator<Item = &'a Notification>,
) -> u64 {
    notifications.into_iter().filter(|n| n.is_unread()).count() as u64
}

// ─── Refresh bookkeeping ──────────────────────────────────────────

/// Per-domain refresh bookkeeping, owned by the domain context.
///
/// `is_refreshing` and the activity timestamp live outside this struct:
/// the former is an atomic guard, the latter is an [`crate::ActivityTracker`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshState {
    pub auto_refresh_enabled: bool,
    pub last_refresh: Option<DateTime<Utc>>,
    pub unread_count: u64,
    pub authenticated: bool,
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
}

impl RefreshState {
    pub fn new(auto_refresh_enabled: bool) -> Self {
        Self {
            auto_refresh_enabled,
            last_refresh: None,
            unread_count: 0,
            authenticated: true,
            consecutive_failures: 0,
            last_error: None,
        }
    }

    /// Record the end of a batch. `last_refresh` only moves when every
    /// sub-fetch succeeded; any failure bumps the failure streak.
    pub fn record_batch(&mut self, first_error: Option<String>, now: DateTime<Utc>) {
        match first_error {
            None => {
                self.last_refresh = Some(now);
                self.consecutive_failures = 0;
                self.last_error = None;
            }
            Some(err) => {
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                self.last_error = Some(err);
            }
        }
    }

    /// Drop everything learned from the server after authentication loss.
    pub fn mark_unauthenticated(&mut self) {
        self.authenticated = false;
        self.unread_count = 0;
        self.last_refresh = None;
    }

    pub fn policy_input(
        &self,
        visibility: Visibility,
        since_activity: std::time::Duration,
        has_active_conversation: bool,
    ) -> PolicyInput {
        PolicyInput {
            auto_refresh_enabled: self.auto_refresh_enabled,
            unread_count: self.unread_count,
            tab_visible: visibility.is_visible(),
            since_activity,
            has_active_conversation,
        }
    }
}

/// Where a domain's refresh timer currently stands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulePhase {
    #[default]
    Idle,
    TimerArmed,
    FetchInFlight,
    Stopped,
}

/// Read-only snapshot handed to UI surfaces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshStatus {
    pub domain: DomainKind,
    pub auto_refresh_enabled: bool,
    pub is_refreshing: bool,
    pub last_refresh: Option<DateTime<Utc>>,
    pub unread_count: u64,
    pub authenticated: bool,
    pub visibility: Visibility,
    /// Non-zero when the most recent batches had failing sub-fetches.
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
    /// Remaining time on the pending timer, if one is armed.
    pub next_refresh_in_ms: Option<u64>,
    #[serde(default)]
    pub phase: SchedulePhase,
}

impl RefreshStatus {
    pub fn is_degraded(&self) -> bool {
        self.consecutive_failures > 0
    }
}
