//! Request and failure journals.
//!
//! The failure journal is what a test inspects after a run to explain a
//! broken page: every unhandled request and every responder error lands
//! there with a timestamp. It survives `reset()`; the request journal does
//! not.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::rule::{HttpMethod, MockRequest};

/// Entries kept per journal before the oldest are dropped.
pub const JOURNAL_CAPACITY: usize = 4096;

/// Why a request was recorded as a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// No installed rule matched
    Unhandled,
    /// A rule matched but its responder returned an error
    ResponderError,
    /// The request body could not be read
    BodyRead,
}

/// One failed request.
#[derive(Debug, Clone, Serialize)]
pub struct FailureRecord {
    /// When the request arrived
    pub at: DateTime<Utc>,
    /// Failure category
    pub kind: FailureKind,
    /// Request method
    pub method: HttpMethod,
    /// Request path
    pub path: String,
    /// Raw query string
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    /// Diagnostic message, as sent in the response body
    pub message: String,
}

/// One intercepted request.
#[derive(Debug, Clone, Serialize)]
pub struct RequestRecord {
    /// When the request arrived
    pub at: DateTime<Utc>,
    /// Request method
    pub method: HttpMethod,
    /// Request path
    pub path: String,
    /// Raw query string
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    /// Response status sent
    pub status: u16,
    /// Description of the rule that answered, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule: Option<String>,
}

/// Bounded, thread-safe journals of requests and failures.
#[derive(Debug, Default)]
pub struct Journal {
    // std Mutex: held only to push or copy, never across an await.
    requests: Mutex<VecDeque<RequestRecord>>,
    failures: Mutex<VecDeque<FailureRecord>>,
}

fn push_bounded<T>(queue: &Mutex<VecDeque<T>>, item: T) {
    let mut queue = queue.lock().unwrap_or_else(PoisonError::into_inner);
    if queue.len() == JOURNAL_CAPACITY {
        queue.pop_front();
    }
    queue.push_back(item);
}

impl Journal {
    /// Creates empty journals.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an answered request.
    pub fn record_request(&self, request: &MockRequest, status: u16, rule: Option<String>) {
        push_bounded(
            &self.requests,
            RequestRecord {
                at: Utc::now(),
                method: request.method,
                path: request.path.clone(),
                query: request.query.clone(),
                status,
                rule,
            },
        );
    }

    /// Records a failure.
    pub fn record_failure(&self, request: &MockRequest, kind: FailureKind, message: &str) {
        push_bounded(
            &self.failures,
            FailureRecord {
                at: Utc::now(),
                kind,
                method: request.method,
                path: request.path.clone(),
                query: request.query.clone(),
                message: message.to_string(),
            },
        );
    }

    /// Requests in arrival order.
    #[must_use]
    pub fn requests(&self) -> Vec<RequestRecord> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    /// Failures in arrival order.
    #[must_use]
    pub fn failures(&self) -> Vec<FailureRecord> {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    /// Drains the failure journal.
    pub fn take_failures(&self) -> Vec<FailureRecord> {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect()
    }

    /// Clears the request journal.
    pub fn clear_requests(&self) {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}
