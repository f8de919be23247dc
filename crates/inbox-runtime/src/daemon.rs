//! `inboxd daemon`: mount the session, serve RPC, tear down on signal.

use std::sync::Arc;
use std::time::Duration;

use inbox_api::HttpClient;

use crate::cli::{DaemonOpts, default_state_dir};
use crate::dismissed::DismissedStore;
use crate::server;
use crate::session::{Inbox, SessionConfig};

fn build_client(opts: &DaemonOpts) -> anyhow::Result<HttpClient> {
    let mut client = HttpClient::new(
        &opts.base_url,
        Duration::from_secs(opts.request_timeout_secs),
    )?;
    if let Some(token) = opts.token.as_deref().filter(|t| !t.is_empty()) {
        client = client.with_token(token);
    } else {
        tracing::warn!("no API token configured; requests are sent unauthenticated");
    }
    Ok(client)
}

pub(crate) fn session_config(opts: &DaemonOpts) -> SessionConfig {
    SessionConfig {
        messages_auto_refresh: !opts.no_auto_refresh_messages,
        notifications_auto_refresh: !opts.no_auto_refresh_notifications,
        fetch_deadline: Duration::from_secs(opts.fetch_deadline_secs.max(1)),
    }
}

pub async fn run_daemon(opts: DaemonOpts, socket_path: &str) -> anyhow::Result<()> {
    let client = build_client(&opts)?;
    let state_dir = opts.state_dir.clone().unwrap_or_else(default_state_dir);
    let dismissed = DismissedStore::load(&state_dir)?;
    tracing::info!(
        base_url = %client.base_url(),
        state_dir = %state_dir.display(),
        dismissed = dismissed.len(),
        "mounting inbox session"
    );

    let inbox = Arc::new(Inbox::mount(
        Arc::new(client),
        dismissed,
        session_config(&opts),
    ));

    // Start UDS server
    let server_inbox = Arc::clone(&inbox);
    let server_socket = socket_path.to_string();
    let mut server_handle = tokio::spawn(async move {
        if let Err(e) = server::run_server(&server_socket, server_inbox).await {
            tracing::error!("UDS server error: {e}");
        }
    });

    // Wait for shutdown signal (ctrl-c or SIGTERM)
    let shutdown = async {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            let mut sigterm =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                    .expect("failed to register SIGTERM handler");
            tokio::select! {
                _ = ctrl_c => tracing::info!("received ctrl-c, shutting down"),
                _ = sigterm.recv() => tracing::info!("received SIGTERM, shutting down"),
            }
        }

        #[cfg(not(unix))]
        {
            ctrl_c.await.ok();
            tracing::info!("received ctrl-c, shutting down");
        }
    };

    tokio::select! {
        () = shutdown => {}
        _ = &mut server_handle => {
            tracing::warn!("server exited unexpectedly");
        }
    }

    server_handle.abort();
    inbox.unmount().await;

    // Cleanup socket
    let _ = std::fs::remove_file(socket_path);
    tracing::info!("daemon stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    use crate::cli::{Cli, Command};

    fn daemon_opts(args: &[&str]) -> DaemonOpts {
        let mut argv = vec!["inboxd", "daemon", "--base-url", "https://pms.example.org"];
        argv.extend_from_slice(args);
        match Cli::try_parse_from(argv).expect("parse").command {
            Command::Daemon(opts) => opts,
            _ => panic!("expected daemon"),
        }
    }

    #[test]
    fn session_config_from_flags() {
        let config = session_config(&daemon_opts(&[
            "--no-auto-refresh-notifications",
            "--fetch-deadline-secs",
            "5",
        ]));
        assert!(config.messages_auto_refresh);
        assert!(!config.notifications_auto_refresh);
        assert_eq!(config.fetch_deadline, Duration::from_secs(5));
    }

    #[test]
    fn build_client_rejects_bad_url() {
        let mut opts = daemon_opts(&[]);
        opts.base_url = "ftp://pms.example.org".into();
        assert!(build_client(&opts).is_err());
    }
}
