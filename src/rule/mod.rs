//! Intercept rules
//!
//! An [`InterceptRule`] binds an HTTP method and a [`UrlPattern`] to a
//! [`Responder`]. Rules are installed into the
//! [`MockServer`](crate::server::MockServer), which resolves each request
//! against the most recently installed matching rule.
//!
//! # Architecture
//!
//! - [`HttpMethod`]: method filter (`Any` for catch-alls)
//! - [`UrlPattern`]: path template, glob, regex or predicate
//! - [`MockRequest`] / [`MockResponse`]: buffered request, canned response
//! - [`Responder`]: async seam producing a response for a request

pub mod method;
pub mod pattern;
pub mod request;
pub mod response;

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

pub use method::HttpMethod;
pub use pattern::{PathTemplate, UrlPattern};
pub use request::{MockRequest, PathParams};
pub use response::{MockResponse, ResponseBody};

use crate::error::RespondError;

// ============================================================================
// Responder
// ============================================================================

/// Produces the response for an intercepted request.
///
/// Implementations may be asynchronous (e.g. to inspect a request body
/// before choosing a payload). The server awaits one responder per request
/// and never holds its rule lock across the call.
#[async_trait]
pub trait Responder: Send + Sync {
    /// Answers `request`. `request.params` holds the parameters captured by
    /// the rule's pattern.
    ///
    /// # Errors
    ///
    /// Any error is answered with a 500 and recorded as a failure.
    async fn respond(&self, request: &MockRequest) -> Result<MockResponse, RespondError>;
}

#[async_trait]
impl Responder for MockResponse {
    async fn respond(&self, _request: &MockRequest) -> Result<MockResponse, RespondError> {
        Ok(self.clone())
    }
}

/// Responder backed by a synchronous closure.
pub struct FnResponder<F>(F);

#[async_trait]
impl<F> Responder for FnResponder<F>
where
    F: Fn(&MockRequest) -> Result<MockResponse, RespondError> + Send + Sync,
{
    async fn respond(&self, request: &MockRequest) -> Result<MockResponse, RespondError> {
        (self.0)(request)
    }
}

/// Wraps a closure as a [`Responder`].
pub const fn from_fn<F>(f: F) -> FnResponder<F>
where
    F: Fn(&MockRequest) -> Result<MockResponse, RespondError> + Send + Sync,
{
    FnResponder(f)
}

// ============================================================================
// InterceptRule
// ============================================================================

/// A method + URL matcher paired with a responder.
pub struct InterceptRule {
    method: HttpMethod,
    pattern: UrlPattern,
    responder: Arc<dyn Responder>,
    once: bool,
    consumed: AtomicBool,
}

impl InterceptRule {
    /// Creates a rule.
    pub fn new(
        method: HttpMethod,
        pattern: impl Into<UrlPattern>,
        responder: impl Responder + 'static,
    ) -> Self {
        Self {
            method,
            pattern: pattern.into(),
            responder: Arc::new(responder),
            once: false,
            consumed: AtomicBool::new(false),
        }
    }

    /// `GET` rule.
    pub fn get(pattern: impl Into<UrlPattern>, responder: impl Responder + 'static) -> Self {
        Self::new(HttpMethod::Get, pattern, responder)
    }

    /// `POST` rule.
    pub fn post(pattern: impl Into<UrlPattern>, responder: impl Responder + 'static) -> Self {
        Self::new(HttpMethod::Post, pattern, responder)
    }

    /// `PUT` rule.
    pub fn put(pattern: impl Into<UrlPattern>, responder: impl Responder + 'static) -> Self {
        Self::new(HttpMethod::Put, pattern, responder)
    }

    /// `PATCH` rule.
    pub fn patch(pattern: impl Into<UrlPattern>, responder: impl Responder + 'static) -> Self {
        Self::new(HttpMethod::Patch, pattern, responder)
    }

    /// `DELETE` rule.
    pub fn delete(pattern: impl Into<UrlPattern>, responder: impl Responder + 'static) -> Self {
        Self::new(HttpMethod::Delete, pattern, responder)
    }

    /// Rule matching any method.
    pub fn any(pattern: impl Into<UrlPattern>, responder: impl Responder + 'static) -> Self {
        Self::new(HttpMethod::Any, pattern, responder)
    }

    /// Makes the rule single-use: after answering one request it stops
    /// matching and older rules for the same URL take over again.
    #[must_use]
    pub fn once(mut self) -> Self {
        self.once = true;
        self
    }

    /// The rule's method filter.
    #[must_use]
    pub const fn method(&self) -> HttpMethod {
        self.method
    }

    /// The rule's URL pattern.
    #[must_use]
    pub const fn pattern(&self) -> &UrlPattern {
        &self.pattern
    }

    /// Whether a single-use rule has already answered.
    #[must_use]
    pub fn is_consumed(&self) -> bool {
        self.once && self.consumed.load(Ordering::SeqCst)
    }

    /// Tests method and URL, returning captured parameters on a match.
    ///
    /// Does not consider or change the single-use state; see
    /// [`try_claim`](Self::try_claim).
    #[must_use]
    pub fn captures(&self, request: &MockRequest) -> Option<PathParams> {
        if !self.method.accepts(request.method) {
            return None;
        }
        self.pattern.captures(request)
    }

    /// Claims the rule for one request.
    ///
    /// Always succeeds for ordinary rules. For single-use rules exactly one
    /// caller wins, even under concurrent requests.
    pub fn try_claim(&self) -> bool {
        !self.once
            || self
                .consumed
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
    }

    /// Shared handle to the responder, so callers can drop locks before
    /// awaiting it.
    #[must_use]
    pub fn responder(&self) -> Arc<dyn Responder> {
        Arc::clone(&self.responder)
    }

    /// `METHOD pattern` key. Two rules with the same route shadow each
    /// other.
    #[must_use]
    pub fn route(&self) -> String {
        format!("{} {}", self.method, self.pattern)
    }

    /// Short description used in logs and listings.
    #[must_use]
    pub fn describe(&self) -> String {
        let suffix = if self.once { " (once)" } else { "" };
        format!("{}{suffix}", self.route())
    }
}

impl fmt::Debug for InterceptRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptRule")
            .field("method", &self.method)
            .field("pattern", &self.pattern)
            .field("once", &self.once)
            .finish_non_exhaustive()
    }
}
