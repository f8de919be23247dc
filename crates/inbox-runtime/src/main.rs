//! inboxd: adaptive refresh daemon and CLI for the proposal inbox.
//! Single binary: `inboxd daemon` runs the refresh loops and the UDS
//! server; every other subcommand is a thin RPC client.

use clap::Parser;

mod cli;
mod client;
mod context;
mod coordinator;
mod daemon;
mod dismissed;
mod display;
mod domain;
mod messages;
mod notifications;
mod scheduler;
mod server;
mod session;
#[cfg(test)]
mod testutil;
mod watcher;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();
    let socket_path = args.socket_path.unwrap_or_else(cli::default_socket_path);

    match args.command {
        cli::Command::Daemon(opts) => {
            let filter = std::env::var("INBOXD_LOG")
                .or_else(|_| std::env::var("RUST_LOG"))
                .unwrap_or_else(|_| "info".to_string());
            tracing_subscriber::fmt()
                .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
                .init();

            tracing::info!("inboxd daemon starting");
            daemon::run_daemon(opts, &socket_path).await?;
        }
        cli::Command::Status(opts) => {
            client::cmd_status(&socket_path, &opts.color).await?;
        }
        cli::Command::Refresh(opts) => {
            client::cmd_refresh(&socket_path, opts.domain).await?;
        }
        cli::Command::AutoRefresh(opts) => {
            client::cmd_auto_refresh(&socket_path, opts.enabled, opts.domain).await?;
        }
        cli::Command::Activity(opts) => {
            let kind: watcher::ActivityKind = opts.kind.parse().map_err(anyhow::Error::msg)?;
            client::cmd_event(&socket_path, "activity", serde_json::json!({"kind": kind}))
                .await?;
        }
        cli::Command::Visibility(opts) => {
            let state: inbox_core::Visibility = opts.state.parse()?;
            client::cmd_event(
                &socket_path,
                "visibility",
                serde_json::json!({"state": state}),
            )
            .await?;
        }
        cli::Command::Send(opts) => {
            let message = inbox_core::NewMessage {
                recipient_id: opts.to,
                subject: opts.subject,
                content: opts.content,
                message_type: opts.message_type,
            };
            client::cmd_send(&socket_path, &message).await?;
        }
        cli::Command::MarkRead(opts) => {
            client::cmd_mark_read(&socket_path, opts.domain, &opts.id).await?;
        }
        cli::Command::MarkAllRead(opts) => {
            client::cmd_mark_all_read(&socket_path, opts.domain).await?;
        }
        cli::Command::Clear => {
            client::cmd_clear(&socket_path).await?;
        }
        cli::Command::Dismiss(opts) => {
            client::cmd_dismiss(&socket_path, &opts.id).await?;
        }
        cli::Command::List(opts) => {
            client::cmd_list(&socket_path, opts.domain, opts.json).await?;
        }
        cli::Command::Watch(opts) => {
            client::cmd_watch(&socket_path, opts.interval, &opts.color).await?;
        }
    }

    Ok(())
}
