//! inbox-api: HTTP IO boundary for the messaging and notification endpoints.
//! Backend traits enable fake injection in tests; `HttpClient` is the
//! reqwest-backed implementation. No refresh logic lives here.

pub mod backend;
pub mod client;
pub mod decode;
pub mod error;

pub use backend::{MessagesBackend, NotificationsBackend};
pub use client::HttpClient;
pub use error::ApiError;
