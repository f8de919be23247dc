//! Domain abstraction: what differs between messages and notifications.
//!
//! A domain supplies its interval table, its batch of read operations and
//! the merge of a batch into local data. Everything else (guarding,
//! scheduling, visibility) is shared and generic over `D: Domain`.

use std::future::Future;

use serde::Serialize;

use inbox_api::ApiError;
use inbox_core::{DomainKind, IntervalTable};

/// One failed sub-fetch inside a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchFailure {
    pub operation: &'static str,
    pub unauthorized: bool,
    pub message: String,
}

/// Result of one batch: whatever succeeded, plus the failures.
#[derive(Debug)]
pub struct FetchReport<P> {
    pub patch: P,
    pub failures: Vec<FetchFailure>,
}

impl<P> FetchReport<P> {
    pub fn new(patch: P) -> Self {
        Self {
            patch,
            failures: Vec::new(),
        }
    }

    /// Keep a successful sub-fetch result, or log and record its failure.
    /// Failures never abort the rest of the batch.
    pub fn take<T>(
        &mut self,
        kind: DomainKind,
        operation: &'static str,
        result: Result<T, ApiError>,
    ) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(domain = %kind, operation, error = %e, "sub-fetch failed");
                self.failures.push(FetchFailure {
                    operation,
                    unauthorized: e.is_unauthorized(),
                    message: e.to_string(),
                });
                None
            }
        }
    }

    pub fn all_ok(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn unauthorized(&self) -> bool {
        self.failures.iter().any(|f| f.unauthorized)
    }

    /// `"<operation>: <error>"` for the first failure, if any.
    pub fn first_error(&self) -> Option<String> {
        self.failures
            .first()
            .map(|f| format!("{}: {}", f.operation, f.message))
    }
}

pub trait Domain: Send + Sync + 'static {
    /// Local data rendered by UI surfaces.
    type Data: Default + Clone + Serialize + Send + Sync + 'static;
    /// Partial batch result; `None` fields were not fetched successfully.
    type Patch: Send + 'static;

    const KIND: DomainKind;

    fn table(&self) -> &'static IntervalTable {
        IntervalTable::for_domain(Self::KIND)
    }

    /// Run every read operation of the batch concurrently.
    fn fetch(&self) -> impl Future<Output = FetchReport<Self::Patch>> + Send;

    /// Merge a batch into local data. Returns the unread count to publish,
    /// or `None` to keep the previous one.
    fn apply(&self, data: &mut Self::Data, patch: Self::Patch) -> Option<u64>;

    fn has_active_conversation(&self, _data: &Self::Data) -> bool {
        false
    }
}
