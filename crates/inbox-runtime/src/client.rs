//! UDS JSON-RPC client for CLI subcommands.

use std::time::Duration;

use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

use inbox_core::RefreshStatus;

use crate::cli::DomainChoice;
use crate::display;

pub(crate) async fn rpc_call(socket_path: &str, method: &str, params: Value) -> anyhow::Result<Value> {
    let stream = UnixStream::connect(socket_path)
        .await
        .map_err(|e| anyhow::anyhow!("cannot connect to daemon at {socket_path}: {e}"))?;

    let (reader, mut writer) = stream.into_split();

    let request = json!({
        "jsonrpc": "2.0",
        "method": method,
        "params": params,
        "id": 1,
    });
    let mut req = serde_json::to_string(&request)?;
    req.push('\n');
    writer.write_all(req.as_bytes()).await?;
    writer.shutdown().await?;

    let mut reader = BufReader::new(reader);
    let mut line = String::new();
    reader.read_line(&mut line).await?;

    let response: Value = serde_json::from_str(line.trim())?;

    if let Some(error) = response.get("error") {
        let message = error["message"].as_str().unwrap_or("unknown error");
        anyhow::bail!("RPC error {}: {message}", error["code"]);
    }

    Ok(response["result"].clone())
}

async fn fetch_status(socket_path: &str) -> anyhow::Result<Vec<RefreshStatus>> {
    let result = rpc_call(socket_path, "status", json!({})).await?;
    Ok(serde_json::from_value(result)?)
}

fn domain_params(domain: Option<DomainChoice>) -> Value {
    match domain {
        Some(d) => json!({"domain": d.as_str()}),
        None => json!({}),
    }
}

/// `inboxd status`
pub async fn cmd_status(socket_path: &str, color: &str) -> anyhow::Result<()> {
    let statuses = fetch_status(socket_path).await?;
    let use_color = display::resolve_color(color);
    println!(
        "{}",
        display::format_status(&statuses, chrono::Utc::now(), use_color)
    );
    Ok(())
}

/// `inboxd refresh [-d domain]`
pub async fn cmd_refresh(socket_path: &str, domain: Option<DomainChoice>) -> anyhow::Result<()> {
    let result = rpc_call(socket_path, "refresh", domain_params(domain)).await?;
    if let Some(outcomes) = result.as_object() {
        for (domain, outcome) in outcomes {
            let label = outcome["outcome"].as_str().unwrap_or("unknown");
            let partial = outcome["all_ok"] == Value::Bool(false);
            if partial {
                println!("{domain}: {label} (some requests failed)");
            } else {
                println!("{domain}: {label}");
            }
        }
    }
    Ok(())
}

/// `inboxd auto-refresh on|off [-d domain]`
pub async fn cmd_auto_refresh(
    socket_path: &str,
    enabled: bool,
    domain: Option<DomainChoice>,
) -> anyhow::Result<()> {
    let mut params = domain_params(domain);
    params["enabled"] = Value::Bool(enabled);
    let result = rpc_call(socket_path, "set_auto_refresh", params).await?;
    let statuses: Vec<RefreshStatus> = serde_json::from_value(result)?;
    println!(
        "{}",
        display::format_status(&statuses, chrono::Utc::now(), false)
    );
    Ok(())
}

/// `inboxd activity` / `inboxd visibility`
pub async fn cmd_event(socket_path: &str, method: &str, params: Value) -> anyhow::Result<()> {
    let result = rpc_call(socket_path, method, params).await?;
    println!("delivered to {} listener(s)", result["listeners"]);
    Ok(())
}

/// `inboxd send --to ID --subject S BODY`
pub async fn cmd_send(socket_path: &str, message: &inbox_core::NewMessage) -> anyhow::Result<()> {
    rpc_call(socket_path, "messages.send", serde_json::to_value(message)?).await?;
    println!("sent to user {}", message.recipient_id);
    Ok(())
}

/// `inboxd mark-read DOMAIN ID`
pub async fn cmd_mark_read(socket_path: &str, domain: DomainChoice, id: &str) -> anyhow::Result<()> {
    let params = match domain {
        DomainChoice::Messages => {
            let id: i64 = id
                .parse()
                .map_err(|_| anyhow::anyhow!("message id must be numeric, got {id}"))?;
            json!({"id": id})
        }
        DomainChoice::Notifications => json!({"id": id}),
    };
    rpc_call(socket_path, &format!("{}.mark_read", domain.as_str()), params).await?;
    Ok(())
}

/// `inboxd mark-all-read DOMAIN`
pub async fn cmd_mark_all_read(socket_path: &str, domain: DomainChoice) -> anyhow::Result<()> {
    rpc_call(socket_path, &format!("{}.mark_all_read", domain.as_str()), json!({})).await?;
    Ok(())
}

/// `inboxd clear`
pub async fn cmd_clear(socket_path: &str) -> anyhow::Result<()> {
    rpc_call(socket_path, "messages.clear", json!({})).await?;
    println!("all messages cleared");
    Ok(())
}

/// `inboxd dismiss ID`
pub async fn cmd_dismiss(socket_path: &str, id: &str) -> anyhow::Result<()> {
    let result = rpc_call(socket_path, "notifications.dismiss", json!({"id": id})).await?;
    if result["dismissed"] == Value::Bool(true) {
        println!("dismissed {id}");
    } else {
        println!("{id} was already dismissed");
    }
    Ok(())
}

/// `inboxd list DOMAIN [--json]`
pub async fn cmd_list(socket_path: &str, domain: DomainChoice, raw: bool) -> anyhow::Result<()> {
    let result = rpc_call(socket_path, &format!("{}.list", domain.as_str()), json!({})).await?;
    if raw {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }
    let output = match domain {
        DomainChoice::Messages => display::format_messages(&result),
        DomainChoice::Notifications => display::format_notifications(&result),
    };
    println!("{output}");
    Ok(())
}

/// `inboxd watch`: live status view.
pub async fn cmd_watch(socket_path: &str, interval: u64, color: &str) -> anyhow::Result<()> {
    let use_color = display::resolve_color(color);

    loop {
        // Clear screen + cursor home
        print!("\x1b[2J\x1b[H");

        match fetch_status(socket_path).await {
            Ok(statuses) => {
                println!(
                    "{}",
                    display::format_status(&statuses, chrono::Utc::now(), use_color)
                );
            }
            Err(e) => {
                println!("Cannot connect to daemon: {e}");
            }
        }

        if use_color {
            println!("\n\x1b[2minboxd watch (Ctrl-C to quit)\x1b[0m");
        } else {
            println!("\ninboxd watch (Ctrl-C to quit)");
        }

        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(interval.max(1))) => {}
            _ = tokio::signal::ctrl_c() => { break; }
        }
    }

    Ok(())
}
