//! Plain-text rendering for CLI subcommands.

use chrono::{DateTime, Utc};

use inbox_core::{RefreshStatus, SchedulePhase};

/// Relative-time helper: seconds -> human string.
pub fn relative_time(seconds: i64) -> String {
    let s = seconds.unsigned_abs();
    if s < 60 {
        "just now".to_string()
    } else if s < 3600 {
        format!("{}m ago", s / 60)
    } else if s < 86400 {
        format!("{}h ago", s / 3600)
    } else {
        format!("{}d ago", s / 86400)
    }
}

/// Countdown for the pending timer: `"in 45s"`, `"in 2m"`.
pub fn countdown(ms: u64) -> String {
    let secs = ms.div_ceil(1000);
    if secs < 120 {
        format!("in {secs}s")
    } else {
        format!("in {}m", secs / 60)
    }
}

/// Resolve --color flag to bool.
pub fn resolve_color(color: &str) -> bool {
    use std::io::IsTerminal;
    match color {
        "always" => true,
        "never" => false,
        _ => std::io::stdout().is_terminal(),
    }
}

fn paint(text: &str, code: &str, color: bool) -> String {
    if color {
        format!("\x1b[{code}m{text}\x1b[0m")
    } else {
        text.to_string()
    }
}

/// One line per domain.
///
/// ```text
/// messages       3 unread  next in 10s  refreshed 2m ago
/// notifications  0 unread  auto off     refreshed just now  [2 failures: list: HTTP 503]
/// ```
pub fn format_status(statuses: &[RefreshStatus], now: DateTime<Utc>, color: bool) -> String {
    statuses
        .iter()
        .map(|s| format_status_line(s, now, color))
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_status_line(status: &RefreshStatus, now: DateTime<Utc>, color: bool) -> String {
    let mut line = format!("{:<14}", status.domain.as_str());
    if !status.authenticated {
        line.push_str(&paint(" logged out", "2", color));
        return line;
    }

    let unread = format!("{} unread", status.unread_count);
    if status.unread_count > 0 {
        line.push_str(&paint(&format!(" {unread:<9}"), "1;33", color));
    } else {
        line.push_str(&format!(" {unread:<9}"));
    }

    let schedule = if status.is_refreshing {
        "refreshing".to_string()
    } else if status.phase == SchedulePhase::Stopped {
        "stopped".to_string()
    } else if !status.auto_refresh_enabled {
        "auto off".to_string()
    } else {
        match status.next_refresh_in_ms {
            Some(ms) => format!("next {}", countdown(ms)),
            None => "idle".to_string(),
        }
    };
    line.push_str(&format!("  {schedule:<12}"));

    let refreshed = match status.last_refresh {
        Some(at) => format!("refreshed {}", relative_time((now - at).num_seconds())),
        None => "never refreshed".to_string(),
    };
    line.push_str(&format!(" {refreshed}"));

    if status.visibility == inbox_core::Visibility::Hidden {
        line.push_str("  (hidden)");
    }
    if status.is_degraded() {
        let detail = status.last_error.as_deref().unwrap_or("unknown error");
        let plural = if status.consecutive_failures == 1 { "" } else { "s" };
        line.push_str(&paint(
            &format!(
                "  [{} failure{plural}: {detail}]",
                status.consecutive_failures
            ),
            "31",
            color,
        ));
    }
    line
}

/// Render `messages.list` output.
pub fn format_messages(data: &serde_json::Value) -> String {
    let mut out = Vec::new();
    let inbox = data["inbox"].as_array().cloned().unwrap_or_default();
    if inbox.is_empty() {
        out.push("(inbox empty)".to_string());
    }
    for message in &inbox {
        let marker = if message["read"].as_bool() == Some(false) {
            "*"
        } else {
            " "
        };
        out.push(format!(
            "{marker} #{:<6} {}",
            message["id"],
            message["subject"].as_str().unwrap_or("")
        ));
    }
    if let Some(thread) = data["thread"].as_object() {
        let count = thread
            .get("messages")
            .and_then(|m| m.as_array())
            .map_or(0, Vec::len);
        out.push(format!(
            "open conversation with user {} ({count} messages)",
            thread.get("other_user_id").cloned().unwrap_or_default()
        ));
    }
    out.join("\n")
}

/// Render `notifications.list` output.
pub fn format_notifications(data: &serde_json::Value) -> String {
    let items = data["items"].as_array().cloned().unwrap_or_default();
    if items.is_empty() {
        return "(no notifications)".to_string();
    }
    items
        .iter()
        .map(|n| {
            let marker = if n["read_at"].is_null() { "*" } else { " " };
            format!(
                "{marker} {:<10} {}",
                n["id"].as_str().unwrap_or("?"),
                n["title"].as_str().unwrap_or("")
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
