//! UDS JSON-RPC server: minimal hand-rolled implementation.
//! Connection-per-request, newline-delimited JSON.

use std::sync::Arc;

use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixListener;

use inbox_api::{ApiError, MessagesBackend, NotificationsBackend};
use inbox_core::{DomainKind, NewMessage, Visibility};

use crate::dismissed::DismissedError;
use crate::session::Inbox;
use crate::watcher::{ActivityKind, UiEvent};

/// JSON-RPC level failure of a single request.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("method not found: {0}")]
    MethodNotFound(String),
    #[error("invalid params: {0}")]
    InvalidParams(String),
    #[error("invalid params: {0}")]
    Core(#[from] inbox_core::CoreError),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Dismissed(#[from] DismissedError),
}

impl RpcError {
    pub fn code(&self) -> i64 {
        match self {
            Self::MethodNotFound(_) => -32601,
            Self::InvalidParams(_) | Self::Core(_) => -32602,
            Self::Api(e) if e.is_unauthorized() => -32001,
            Self::Api(_) => -32000,
            Self::Dismissed(_) => -32002,
        }
    }
}

/// Run the UDS JSON-RPC server.
pub async fn run_server<B>(socket_path: &str, inbox: Arc<Inbox<B>>) -> anyhow::Result<()>
where
    B: MessagesBackend + NotificationsBackend,
{
    // Create socket directory with mode 0700
    let socket_dir = std::path::Path::new(socket_path)
        .parent()
        .ok_or_else(|| anyhow::anyhow!("invalid socket path"))?;

    std::fs::create_dir_all(socket_dir)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(socket_dir, std::fs::Permissions::from_mode(0o700))?;
    }

    // Check for stale socket
    if std::path::Path::new(socket_path).exists() {
        if tokio::net::UnixStream::connect(socket_path).await.is_err() {
            std::fs::remove_file(socket_path)?;
            tracing::info!("removed stale socket at {socket_path}");
        } else {
            anyhow::bail!("another daemon is already running at {socket_path}");
        }
    }

    let listener = UnixListener::bind(socket_path)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))?;
    }

    tracing::info!("UDS server listening on {socket_path}");

    loop {
        let (stream, _) = listener.accept().await?;
        let inbox = Arc::clone(&inbox);
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, inbox).await {
                tracing::debug!("connection error: {e}");
            }
        });
    }
}

async fn handle_connection<B>(
    stream: tokio::net::UnixStream,
    inbox: Arc<Inbox<B>>,
) -> anyhow::Result<()>
where
    B: MessagesBackend + NotificationsBackend,
{
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();
    reader.read_line(&mut line).await?;

    let request: Value = serde_json::from_str(line.trim())?;
    let method = request["method"].as_str().unwrap_or("");
    let id = request["id"].clone();

    let response = match dispatch(&inbox, method, &request["params"]).await {
        Ok(result) => json!({
            "jsonrpc": "2.0",
            "result": result,
            "id": id,
        }),
        Err(e) => {
            tracing::debug!(method, error = %e, "rpc request failed");
            json!({
                "jsonrpc": "2.0",
                "error": {"code": e.code(), "message": e.to_string()},
                "id": id,
            })
        }
    };
    let mut resp = serde_json::to_string(&response)?;
    resp.push('\n');
    writer.write_all(resp.as_bytes()).await?;

    Ok(())
}

/// Route one request to the session.
pub(crate) async fn dispatch<B>(
    inbox: &Inbox<B>,
    method: &str,
    params: &Value,
) -> Result<Value, RpcError>
where
    B: MessagesBackend + NotificationsBackend,
{
    let messages = inbox.messages();
    let notifications = inbox.notifications();
    let result = match method {
        "status" => to_value(inbox.status())?,
        "refresh" => match domain_param(params)? {
            None => {
                let (m, n) = inbox.refresh_everything().await;
                json!({"messages": m, "notifications": n})
            }
            Some(kind) => json!({ (kind.as_str()): inbox.refresh(kind).await }),
        },
        "set_auto_refresh" => {
            let enabled = bool_param(params, "enabled")?;
            let kinds = match domain_param(params)? {
                Some(kind) => vec![kind],
                None => DomainKind::ALL.to_vec(),
            };
            for kind in kinds {
                inbox.set_auto_refresh_enabled(kind, enabled);
            }
            to_value(inbox.status())?
        }
        "activity" => {
            let kind = match params.get("kind").and_then(Value::as_str) {
                Some(kind) => kind
                    .parse::<ActivityKind>()
                    .map_err(RpcError::InvalidParams)?,
                None => ActivityKind::PointerDown,
            };
            json!({"listeners": inbox.publish(UiEvent::Activity(kind))})
        }
        "visibility" => {
            let visibility: Visibility = str_param(params, "state")?.parse()?;
            json!({"listeners": inbox.publish(UiEvent::VisibilityChanged(visibility))})
        }

        // ─── messages ───
        "messages.list" => to_value(messages.data())?,
        "messages.conversation" => match params.get("other_user_id").and_then(Value::as_i64) {
            Some(other_user_id) => to_value(messages.open_conversation(other_user_id).await?)?,
            None => {
                messages.close_conversation();
                Value::Null
            }
        },
        "messages.send" => {
            let message: NewMessage = serde_json::from_value(params.clone())
                .map_err(|e| RpcError::InvalidParams(e.to_string()))?;
            to_value(messages.send(message).await?)?
        }
        "messages.mark_read" => {
            messages.mark_read(i64_param(params, "id")?).await?;
            json!({"ok": true})
        }
        "messages.mark_all_read" => {
            messages.mark_all_read().await?;
            json!({"ok": true})
        }
        "messages.clear" => {
            messages.clear_all().await?;
            json!({"ok": true})
        }

        // ─── notifications ───
        "notifications.list" => to_value(notifications.data())?,
        "notifications.mark_read" => {
            notifications.mark_read(str_param(params, "id")?).await?;
            json!({"ok": true})
        }
        "notifications.mark_all_read" => {
            notifications.mark_all_read().await?;
            json!({"ok": true})
        }
        "notifications.delete" => {
            notifications.delete(str_param(params, "id")?).await?;
            json!({"ok": true})
        }
        "notifications.dismiss" => {
            let dismissed = notifications.dismiss(str_param(params, "id")?).await?;
            json!({"dismissed": dismissed})
        }
        other => return Err(RpcError::MethodNotFound(other.to_string())),
    };
    Ok(result)
}

// ─── Param helpers ────────────────────────────────────────────────

fn to_value<T: serde::Serialize>(value: T) -> Result<Value, RpcError> {
    serde_json::to_value(value).map_err(|e| RpcError::InvalidParams(e.to_string()))
}

/// `None` means every domain (`"all"` or absent).
fn domain_param(params: &Value) -> Result<Option<DomainKind>, RpcError> {
    match params.get("domain").and_then(Value::as_str) {
        None | Some("all") => Ok(None),
        Some(s) => Ok(Some(s.parse()?)),
    }
}

fn str_param<'a>(params: &'a Value, key: &str) -> Result<&'a str, RpcError> {
    params
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| RpcError::InvalidParams(format!("missing string param `{key}`")))
}

fn i64_param(params: &Value, key: &str) -> Result<i64, RpcError> {
    params
        .get(key)
        .and_then(Value::as_i64)
        .ok_or_else(|| RpcError::InvalidParams(format!("missing integer param `{key}`")))
}

fn bool_param(params: &Value, key: &str) -> Result<bool, RpcError> {
    params
        .get(key)
        .and_then(Value::as_bool)
        .ok_or_else(|| RpcError::InvalidParams(format!("missing boolean param `{key}`")))
}
