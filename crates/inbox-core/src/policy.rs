//! Adaptive refresh interval policy.
//!
//! Maps the current refresh inputs of one domain to the delay before the
//! next scheduled batch, or `None` when automatic refresh is off.
//! Rules are evaluated in order and the first match wins:
//!
//! ```text
//! disabled            -> None
//! tab hidden          -> hidden
//! unread > 0          -> urgent
//! conversation + recent activity (domains with a conversation rule)
//!                     -> conversation
//! recent activity     -> recent
//! otherwise           -> idle
//! ```

use std::time::Duration;

use crate::types::DomainKind;

/// Faster cadence while the user is working inside an open conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConversationRule {
    /// Activity must be more recent than this for the rule to apply.
    pub window: Duration,
    pub interval: Duration,
}

/// Per-domain interval constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntervalTable {
    pub hidden: Duration,
    pub urgent: Duration,
    pub conversation: Option<ConversationRule>,
    pub recent_window: Duration,
    pub recent: Duration,
    pub idle: Duration,
}

pub const MESSAGES_TABLE: IntervalTable = IntervalTable {
    hidden: Duration::from_secs(120),
    urgent: Duration::from_secs(10),
    conversation: Some(ConversationRule {
        window: Duration::from_secs(30),
        interval: Duration::from_secs(15),
    }),
    recent_window: Duration::from_secs(60),
    recent: Duration::from_secs(30),
    idle: Duration::from_secs(60),
};

pub const NOTIFICATIONS_TABLE: IntervalTable = IntervalTable {
    hidden: Duration::from_secs(180),
    urgent: Duration::from_secs(15),
    conversation: None,
    recent_window: Duration::from_secs(60),
    recent: Duration::from_secs(45),
    idle: Duration::from_secs(90),
};

impl IntervalTable {
    pub fn for_domain(kind: DomainKind) -> &'static IntervalTable {
        match kind {
            DomainKind::Messages => &MESSAGES_TABLE,
            DomainKind::Notifications => &NOTIFICATIONS_TABLE,
        }
    }
}

/// Everything the policy looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolicyInput {
    pub auto_refresh_enabled: bool,
    pub unread_count: u64,
    pub tab_visible: bool,
    /// Time elapsed since the last recorded user activity.
    pub since_activity: Duration,
    /// Ignored by tables without a conversation rule.
    pub has_active_conversation: bool,
}

pub fn compute_interval(table: &IntervalTable, input: &PolicyInput) -> Option<Duration> {
    if !input.auto_refresh_enabled {
        return None;
    }
    if !input.tab_visible {
        return Some(table.hidden);
    }
    if input.unread_count > 0 {
        return Some(table.urgent);
    }
    if let Some(rule) = table.conversation
        && input.has_active_conversation
        && input.since_activity < rule.window
    {
        return Some(rule.interval);
    }
    if input.since_activity < table.recent_window {
        return Some(table.recent);
    }
    Some(table.idle)
}
