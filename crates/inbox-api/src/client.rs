//! reqwest-backed implementation of the backend traits.

use std::time::Duration;

use reqwest::header::ACCEPT;
use reqwest::{Method, StatusCode, Url};
use serde_json::Value;

use inbox_core::{Conversation, Message, MessageId, NewMessage, Notification};

use crate::backend::{MessagesBackend, NotificationsBackend};
use crate::decode::{decode_collection, decode_count};
use crate::error::ApiError;

/// Maximum number of response-body characters kept in error messages.
const ERROR_BODY_LIMIT: usize = 200;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// HTTP client for the proposal-management API.
#[derive(Debug, Clone)]
pub struct HttpClient {
    http: reqwest::Client,
    base_url: Url,
    token: Option<String>,
}

impl HttpClient {
    /// Build a client for `base_url` with a per-request timeout.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let base_url = normalize_base_url(base_url)?;
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url,
            token: None,
        })
    }

    /// Attach a bearer credential to every request.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Append `segments` to the base path. Each segment is percent-encoded,
    /// so `/`, `?` and `#` inside an id never change the route.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| ApiError::InvalidUrl(format!("{}: cannot be a base", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn request(
        &self,
        method: Method,
        segments: &[&str],
        body: Option<&Value>,
    ) -> Result<reqwest::Response, ApiError> {
        let url = self.endpoint(segments)?;
        tracing::trace!(%method, %url, "api request");

        let mut req = self
            .http
            .request(method, url)
            .header(ACCEPT, "application/json");
        if let Some(ref token) = self.token {
            req = req.bearer_auth(token);
        }
        if let Some(body) = body {
            req = req.json(body);
        }

        let resp = req.send().await?;
        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(ApiError::Unauthorized);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ApiError::Status {
                code: status.as_u16(),
                body: truncate(body.trim(), ERROR_BODY_LIMIT),
            });
        }
        Ok(resp)
    }

    async fn get_value(&self, segments: &[&str]) -> Result<Value, ApiError> {
        let resp = self.request(Method::GET, segments, None).await?;
        let bytes = resp.bytes().await?;
        if bytes.is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn execute(
        &self,
        method: Method,
        segments: &[&str],
        body: Option<&Value>,
    ) -> Result<(), ApiError> {
        self.request(method, segments, body).await.map(drop)
    }
}

/// Reject ids that would be dropped or resolved as dot segments.
fn id_segment(id: &str) -> Result<&str, ApiError> {
    match id {
        "" | "." | ".." => Err(ApiError::InvalidUrl(format!("invalid id: {id:?}"))),
        _ => Ok(id),
    }
}

fn normalize_base_url(raw: &str) -> Result<Url, ApiError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ApiError::InvalidUrl("empty base url".to_string()));
    }
    // Url::join replaces the last segment unless the base ends with '/'.
    let with_slash = if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{trimmed}/")
    };
    let url = Url::parse(&with_slash).map_err(|e| ApiError::InvalidUrl(format!("{raw}: {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(ApiError::InvalidUrl(format!("unsupported scheme: {scheme}"))),
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let head: String = text.chars().take(max_chars).collect();
        format!("{head}\u{2026}")
    }
}

impl MessagesBackend for HttpClient {
    async fn list_inbox(&self) -> Result<Vec<Message>, ApiError> {
        let value = self.get_value(&["api", "messages", "inbox"]).await?;
        decode_collection(value, "messages")
    }

    async fn list_sent(&self) -> Result<Vec<Message>, ApiError> {
        let value = self.get_value(&["api", "messages", "sent"]).await?;
        decode_collection(value, "messages")
    }

    async fn unread_count(&self) -> Result<u64, ApiError> {
        decode_count(&self.get_value(&["api", "messages", "unread-count"]).await?)
    }

    async fn list_conversations(&self) -> Result<Vec<Conversation>, ApiError> {
        let value = self.get_value(&["api", "messages", "conversations"]).await?;
        decode_collection(value, "conversations")
    }

    async fn conversation(&self, other_user_id: i64) -> Result<Vec<Message>, ApiError> {
        let other = other_user_id.to_string();
        let value = self
            .get_value(&["api", "messages", "conversation", &other])
            .await?;
        decode_collection(value, "messages")
    }

    async fn send(&self, message: &NewMessage) -> Result<(), ApiError> {
        let body = serde_json::to_value(message)?;
        self.execute(Method::POST, &["api", "messages"], Some(&body))
            .await
    }

    async fn mark_read(&self, id: MessageId) -> Result<(), ApiError> {
        let id = id.to_string();
        self.execute(Method::PUT, &["api", "messages", &id, "read"], None)
            .await
    }

    async fn mark_all_read(&self) -> Result<(), ApiError> {
        self.execute(Method::PUT, &["api", "messages", "read-all"], None)
            .await
    }

    async fn clear_all(&self) -> Result<(), ApiError> {
        self.execute(Method::DELETE, &["api", "messages"], None)
            .await
    }
}

impl NotificationsBackend for HttpClient {
    async fn list(&self) -> Result<Vec<Notification>, ApiError> {
        let value = self.get_value(&["api", "notifications"]).await?;
        decode_collection(value, "notifications")
    }

    async fn unread_count(&self) -> Result<u64, ApiError> {
        decode_count(&self.get_value(&["api", "notifications", "unread-count"]).await?)
    }

    async fn mark_read(&self, id: &str) -> Result<(), ApiError> {
        let id = id_segment(id)?;
        self.execute(Method::PUT, &["api", "notifications", id, "read"], None)
            .await
    }

    async fn mark_all_read(&self) -> Result<(), ApiError> {
        self.execute(Method::PUT, &["api", "notifications", "read-all"], None)
            .await
    }

    async fn delete(&self, id: &str) -> Result<(), ApiError> {
        let id = id_segment(id)?;
        self.execute(Method::DELETE, &["api", "notifications", id], None)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_gets_trailing_slash() {
        let client = HttpClient::new("https://rpms.example.edu/portal", DEFAULT_TIMEOUT)
            .expect("client");
        assert_eq!(client.base_url().as_str(), "https://rpms.example.edu/portal/");
        let url = client
            .endpoint(&["api", "messages", "inbox"])
            .expect("endpoint");
        assert_eq!(
            url.as_str(),
            "https://rpms.example.edu/portal/api/messages/inbox"
        );
    }

    #[test]
    fn ids_stay_inside_their_segment() {
        let client = HttpClient::new("https://pms.example.org", DEFAULT_TIMEOUT).expect("client");
        let url = |segments: &[&str]| client.endpoint(segments).expect("endpoint").to_string();

        assert_eq!(
            url(&["api", "notifications", "../messages"]),
            "https://pms.example.org/api/notifications/..%2Fmessages"
        );
        assert_eq!(
            url(&["api", "notifications", "a?x=1", "read"]),
            "https://pms.example.org/api/notifications/a%3Fx=1/read"
        );
        assert_eq!(
            url(&["api", "notifications", "a/b#c"]),
            "https://pms.example.org/api/notifications/a%2Fb%23c"
        );
    }

    #[test]
    fn dot_ids_are_rejected() {
        for id in ["", ".", ".."] {
            assert!(matches!(id_segment(id), Err(ApiError::InvalidUrl(_))), "{id:?}");
        }
        assert_eq!(id_segment("n-42").expect("plain id"), "n-42");
    }

    #[tokio::test]
    async fn traversal_id_never_reaches_the_network() {
        let client = HttpClient::new("http://127.0.0.1:9", DEFAULT_TIMEOUT).expect("client");
        let err = NotificationsBackend::delete(&client, "..")
            .await
            .expect_err("rejected");
        assert!(matches!(err, ApiError::InvalidUrl(_)));
    }

    #[test]
    fn rejects_bad_base_urls() {
        assert!(matches!(
            HttpClient::new("", DEFAULT_TIMEOUT),
            Err(ApiError::InvalidUrl(_))
        ));
        assert!(matches!(
            HttpClient::new("ftp://example.com", DEFAULT_TIMEOUT),
            Err(ApiError::InvalidUrl(_))
        ));
        assert!(HttpClient::new("not a url", DEFAULT_TIMEOUT).is_err());
    }

    #[test]
    fn with_token_sets_credential() {
        let client = HttpClient::new("http://localhost:8000", DEFAULT_TIMEOUT)
            .expect("client")
            .with_token("secret");
        assert_eq!(client.token.as_deref(), Some("secret"));
    }

    #[test]
    fn truncate_long_bodies() {
        assert_eq!(truncate("short", 10), "short");
        let long = "x".repeat(300);
        let out = truncate(&long, ERROR_BODY_LIMIT);
        assert_eq!(out.chars().count(), ERROR_BODY_LIMIT + 1);
        assert!(out.ends_with('\u{2026}'));
    }
}
