//! CLI definition using clap derive.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "inboxd", about = "Adaptive refresh daemon for the proposal inbox")]
pub struct Cli {
    /// UDS socket path (default: $XDG_RUNTIME_DIR/inboxd/inboxd.sock)
    #[arg(long, short = 's', global = true)]
    pub socket_path: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the daemon (refresh loops + UDS server)
    Daemon(DaemonOpts),
    /// Show refresh state for both domains
    Status(ColorOpts),
    /// Refresh now, bypassing the timer
    Refresh(DomainOpts),
    /// Turn automatic refresh on or off
    AutoRefresh(AutoRefreshOpts),
    /// Report user activity
    Activity(ActivityOpts),
    /// Report view visibility (visible or hidden)
    Visibility(VisibilityOpts),
    /// Send a message
    Send(SendOpts),
    /// Mark one message or notification as read
    MarkRead(ItemOpts),
    /// Mark every item of a domain as read
    MarkAllRead(DomainArg),
    /// Delete every message
    Clear,
    /// Hide a notification permanently
    Dismiss(IdOpts),
    /// Print messages or notifications
    List(ListOpts),
    /// Live status view
    Watch(WatchOpts),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DomainChoice {
    Messages,
    Notifications,
}

impl DomainChoice {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Messages => "messages",
            Self::Notifications => "notifications",
        }
    }
}

#[derive(Args)]
pub struct DaemonOpts {
    /// Base URL of the proposal-management API
    #[arg(long, env = "INBOXD_BASE_URL")]
    pub base_url: String,

    /// Bearer token attached to every request
    #[arg(long, env = "INBOXD_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Per-request HTTP timeout in seconds
    #[arg(long, default_value = "15")]
    pub request_timeout_secs: u64,

    /// Upper bound on one refresh batch in seconds
    #[arg(long, default_value = "30")]
    pub fetch_deadline_secs: u64,

    /// Directory for persisted state (dismissed notifications)
    #[arg(long, env = "INBOXD_STATE_DIR")]
    pub state_dir: Option<PathBuf>,

    /// Start with automatic message refresh disabled
    #[arg(long)]
    pub no_auto_refresh_messages: bool,

    /// Start with automatic notification refresh disabled
    #[arg(long)]
    pub no_auto_refresh_notifications: bool,
}

#[derive(Args)]
pub struct ColorOpts {
    /// Color output: auto, always, never
    #[arg(long, default_value = "auto")]
    pub color: String,
}

#[derive(Args)]
pub struct DomainOpts {
    /// Limit to one domain (default: both)
    #[arg(long, short = 'd', value_enum)]
    pub domain: Option<DomainChoice>,
}

#[derive(Args)]
pub struct DomainArg {
    #[arg(value_enum)]
    pub domain: DomainChoice,
}

#[derive(Args)]
pub struct AutoRefreshOpts {
    /// on or off
    #[arg(value_parser = parse_switch, action = clap::ArgAction::Set)]
    pub enabled: bool,

    /// Limit to one domain (default: both)
    #[arg(long, short = 'd', value_enum)]
    pub domain: Option<DomainChoice>,
}

#[derive(Args)]
pub struct ActivityOpts {
    /// pointer-down, key-down or scroll
    #[arg(default_value = "pointer-down")]
    pub kind: String,
}

#[derive(Args)]
pub struct VisibilityOpts {
    /// visible or hidden
    pub state: String,
}

#[derive(Args)]
pub struct SendOpts {
    /// Recipient user id
    #[arg(long, short = 'r')]
    pub to: i64,

    #[arg(long)]
    pub subject: String,

    /// Message body
    pub content: String,

    #[arg(long = "type", default_value = "general")]
    pub message_type: String,
}

#[derive(Args)]
pub struct ItemOpts {
    #[arg(value_enum)]
    pub domain: DomainChoice,

    /// Message id (numeric) or notification id
    pub id: String,
}

#[derive(Args)]
pub struct IdOpts {
    pub id: String,
}

#[derive(Args)]
pub struct ListOpts {
    #[arg(value_enum)]
    pub domain: DomainChoice,

    /// Print raw JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct WatchOpts {
    /// Redraw interval in seconds
    #[arg(long, default_value = "1")]
    pub interval: u64,

    /// Color output: auto, always, never
    #[arg(long, default_value = "auto")]
    pub color: String,
}

fn parse_switch(s: &str) -> Result<bool, String> {
    match s.to_ascii_lowercase().as_str() {
        "on" | "true" | "enable" | "enabled" => Ok(true),
        "off" | "false" | "disable" | "disabled" => Ok(false),
        other => Err(format!("expected on or off, got {other}")),
    }
}

/// Default socket path using $USER for per-user isolation.
pub fn default_socket_path() -> String {
    if let Ok(dir) = std::env::var("XDG_RUNTIME_DIR") {
        return format!("{dir}/inboxd/inboxd.sock");
    }
    let user = std::env::var("USER").unwrap_or_else(|_| "unknown".to_string());
    format!("/tmp/inboxd-{user}/inboxd.sock")
}

/// Default state directory: $XDG_STATE_HOME/inboxd, else ~/.local/state/inboxd.
pub fn default_state_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("XDG_STATE_HOME") {
        return PathBuf::from(dir).join("inboxd");
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".local/state/inboxd")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_daemon_defaults() {
        let cli = Cli::try_parse_from(["inboxd", "daemon", "--base-url", "http://localhost:8000"])
            .expect("parse");
        let Command::Daemon(opts) = cli.command else {
            panic!("expected daemon");
        };
        assert_eq!(opts.base_url, "http://localhost:8000");
        assert_eq!(opts.request_timeout_secs, 15);
        assert_eq!(opts.fetch_deadline_secs, 30);
        assert!(!opts.no_auto_refresh_messages);
    }

    #[test]
    fn parses_auto_refresh_switch() {
        let cli = Cli::try_parse_from(["inboxd", "auto-refresh", "off", "-d", "notifications"])
            .expect("parse");
        let Command::AutoRefresh(opts) = cli.command else {
            panic!("expected auto-refresh");
        };
        assert!(!opts.enabled);
        assert_eq!(opts.domain, Some(DomainChoice::Notifications));

        assert!(Cli::try_parse_from(["inboxd", "auto-refresh", "maybe"]).is_err());
    }

    #[test]
    fn parses_send_and_global_socket() {
        let cli = Cli::try_parse_from([
            "inboxd",
            "send",
            "--to",
            "12",
            "--subject",
            "Revision",
            "See comments",
            "-s",
            "/tmp/x.sock",
        ])
        .expect("parse");
        assert_eq!(cli.socket_path.as_deref(), Some("/tmp/x.sock"));
        let Command::Send(opts) = cli.command else {
            panic!("expected send");
        };
        assert_eq!(opts.to, 12);
        assert_eq!(opts.message_type, "general");
    }

    #[test]
    fn socket_path_is_per_user() {
        let path = default_socket_path();
        assert!(path.ends_with("inboxd.sock"));
    }
}
