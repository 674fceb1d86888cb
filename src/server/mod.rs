//! Mock server lifecycle
//!
//! One [`MockServer`] per test process. The application under test points
//! its backend base URL at the server; every request it issues is resolved
//! against the installed [`InterceptRule`]s, newest first.
//!
//! The server runs in one of three modes:
//!
//! - **inert**: the test-environment gate is off; every operation is a
//!   no-op and nothing listens.
//! - **in-memory**: active without a listener; driven through
//!   [`MockServer::router`] or [`MockServer::handle`].
//! - **bound**: [`MockServer::create`] bound an axum listener.

pub mod control;
pub mod journal;

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError, RwLock, Weak};
use std::time::Instant;

use axum::Router;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{MockConfig, UnhandledPolicy};
use crate::dispatch::ScenarioDispatcher;
use crate::error::ServerError;
use crate::observability::metrics::{self, RequestOutcome};
use crate::rule::{HttpMethod, InterceptRule, MockRequest, MockResponse};

pub use journal::{FailureKind, FailureRecord, Journal, RequestRecord};

/// Largest request body the server buffers.
pub const MAX_BODY_SIZE: usize = 10 * 1024 * 1024;

// ============================================================================
// Shared state
// ============================================================================

/// State shared between the server handle and its axum handlers.
pub(crate) struct ServerShared {
    rules: RwLock<Vec<Arc<InterceptRule>>>,
    unhandled: UnhandledPolicy,
    journal: Journal,
    dispatcher: OnceLock<Weak<ScenarioDispatcher>>,
}

impl ServerShared {
    fn new(unhandled: UnhandledPolicy) -> Self {
        Self {
            rules: RwLock::new(Vec::new()),
            unhandled,
            journal: Journal::new(),
            dispatcher: OnceLock::new(),
        }
    }

    fn rule_count(&self) -> usize {
        self.rules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub(crate) fn dispatcher(&self) -> Option<Arc<ScenarioDispatcher>> {
        self.dispatcher.get().and_then(Weak::upgrade)
    }

    pub(crate) const fn journal(&self) -> &Journal {
        &self.journal
    }

    /// Resolves `request` against the installed rules and answers it.
    async fn answer(&self, request: MockRequest) -> MockResponse {
        let started = Instant::now();

        // Newest rule first; the lock is released before the responder runs.
        let matched = {
            let rules = self.rules.read().unwrap_or_else(PoisonError::into_inner);
            rules.iter().rev().find_map(|rule| {
                let params = rule.captures(&request)?;
                rule.try_claim()
                    .then(|| (rule.responder(), params, rule.describe()))
            })
        };

        let Some((responder, params, rule)) = matched else {
            return self.unhandled(&request, started);
        };

        let request = request.with_params(params);
        match responder.respond(&request).await {
            Ok(response) => {
                debug!(
                    method = %request.method,
                    path = %request.path,
                    rule = %rule,
                    status = response.status,
                    "request answered"
                );
                self.journal
                    .record_request(&request, response.status, Some(rule));
                metrics::record_request(RequestOutcome::Matched, started.elapsed());
                response
            }
            Err(e) => {
                let message = format!(
                    "mock responder failed for {} {}: {e}",
                    request.method, request.path
                );
                error!(
                    method = %request.method,
                    path = %request.path,
                    rule = %rule,
                    error = %e,
                    "mock responder failed"
                );
                self.journal
                    .record_failure(&request, FailureKind::ResponderError, &message);
                self.journal.record_request(&request, 500, Some(rule));
                metrics::record_request(RequestOutcome::ResponderError, started.elapsed());
                MockResponse::text(500, message)
            }
        }
    }

    fn unhandled(&self, request: &MockRequest, started: Instant) -> MockResponse {
        let message = format!(
            "no mock matched this request: {} {}",
            request.method, request.path
        );
        let status = match self.unhandled {
            UnhandledPolicy::Error => {
                error!(
                    method = %request.method,
                    path = %request.path,
                    query = request.query.as_deref().unwrap_or(""),
                    "unhandled request"
                );
                500
            }
            UnhandledPolicy::Warn => {
                warn!(
                    method = %request.method,
                    path = %request.path,
                    query = request.query.as_deref().unwrap_or(""),
                    "unhandled request"
                );
                404
            }
        };
        self.journal
            .record_failure(request, FailureKind::Unhandled, &message);
        self.journal.record_request(request, status, None);
        metrics::record_request(RequestOutcome::Unhandled, started.elapsed());
        MockResponse::text(status, message)
    }
}

// ============================================================================
// MockServer
// ============================================================================

/// Handle to the process-wide interception server.
pub struct MockServer {
    shared: Option<Arc<ServerShared>>,
    local_addr: Option<SocketAddr>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
    shut_down: AtomicBool,
}

impl MockServer {
    /// Creates the server.
    ///
    /// With the test-environment gate off this returns an inert handle.
    /// Otherwise it binds `config.bind_addr` right away and starts serving
    /// with no rules installed.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the listener cannot bind.
    pub async fn create(config: &MockConfig) -> Result<Self, ServerError> {
        if !config.test_env {
            info!("test environment gate is off; mock server is inert");
            return Ok(Self::inert());
        }

        let listener = TcpListener::bind(&config.bind_addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: config.bind_addr.clone(),
                source,
            })?;
        let local_addr = listener.local_addr().map_err(ServerError::LocalAddr)?;

        let shared = Arc::new(ServerShared::new(config.unhandled));
        let router = build_router(Arc::clone(&shared));
        let cancel = CancellationToken::new();

        let server_cancel = cancel.clone();
        let task = tokio::spawn(async move {
            info!(%local_addr, "mock server listening");
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(async move { server_cancel.cancelled().await })
                .await
            {
                error!(error = %e, "mock server stopped with an error");
            }
            debug!("mock server shut down");
        });

        Ok(Self {
            shared: Some(shared),
            local_addr: Some(local_addr),
            cancel,
            task: Mutex::new(Some(task)),
            shut_down: AtomicBool::new(false),
        })
    }

    /// A handle on which every operation is a no-op.
    #[must_use]
    pub fn inert() -> Self {
        Self {
            shared: None,
            local_addr: None,
            cancel: CancellationToken::new(),
            task: Mutex::new(None),
            shut_down: AtomicBool::new(false),
        }
    }

    /// An active server without a listener.
    #[must_use]
    pub fn in_memory(unhandled: UnhandledPolicy) -> Self {
        Self {
            shared: Some(Arc::new(ServerShared::new(unhandled))),
            local_addr: None,
            cancel: CancellationToken::new(),
            task: Mutex::new(None),
            shut_down: AtomicBool::new(false),
        }
    }

    /// Whether the server intercepts anything at all.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.shared.is_some()
    }

    /// Axum router serving interception and control routes, or `None` when
    /// inert.
    #[must_use]
    pub fn router(&self) -> Option<Router> {
        self.shared.as_ref().map(|s| build_router(Arc::clone(s)))
    }

    /// Answers `request` directly, bypassing HTTP. `None` when inert.
    pub async fn handle(&self, request: MockRequest) -> Option<MockResponse> {
        match &self.shared {
            Some(shared) => Some(shared.answer(request).await),
            None => None,
        }
    }

    /// Removes every installed rule. Does not restart the listener.
    pub fn reset(&self) {
        let Some(shared) = &self.shared else { return };
        shared
            .rules
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        shared.journal.clear_requests();
        metrics::set_rules_installed(0);
        debug!("intercept rules cleared");
    }

    /// Appends rules; later rules shadow earlier ones.
    pub fn use_rules(&self, rules: Vec<InterceptRule>) {
        let Some(shared) = &self.shared else { return };
        let count = {
            let mut installed = shared.rules.write().unwrap_or_else(PoisonError::into_inner);
            installed.extend(rules.into_iter().map(Arc::new));
            installed.len()
        };
        metrics::set_rules_installed(count);
    }

    /// Number of installed rules, consumed single-use rules included.
    #[must_use]
    pub fn rules_installed(&self) -> usize {
        self.shared.as_ref().map_or(0, |s| s.rule_count())
    }

    /// Routes of the installed rules, see [`InterceptRule::route`].
    #[must_use]
    pub fn installed_routes(&self) -> HashSet<String> {
        self.shared.as_ref().map_or_else(HashSet::new, |s| {
            s.rules
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .iter()
                .map(|r| r.route())
                .collect()
        })
    }

    /// Bound listener address.
    #[must_use]
    pub const fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Base URL for the application under test (`http://host:port`).
    #[must_use]
    pub fn base_url(&self) -> Option<String> {
        self.local_addr.map(|addr| format!("http://{addr}"))
    }

    /// Unhandled requests and responder errors, oldest first.
    #[must_use]
    pub fn failures(&self) -> Vec<FailureRecord> {
        self.shared
            .as_ref()
            .map_or_else(Vec::new, |s| s.journal.failures())
    }

    /// Drains the failure journal.
    pub fn take_failures(&self) -> Vec<FailureRecord> {
        self.shared
            .as_ref()
            .map_or_else(Vec::new, |s| s.journal.take_failures())
    }

    /// Requests answered since the last [`reset`](Self::reset).
    #[must_use]
    pub fn requests(&self) -> Vec<RequestRecord> {
        self.shared
            .as_ref()
            .map_or_else(Vec::new, |s| s.journal.requests())
    }

    /// Stops the listener. Safe to call any number of times.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        self.cancel.cancel();
        if self.local_addr.is_some() {
            info!("mock server shutting down");
        }
    }

    /// Whether [`shutdown`](Self::shutdown) has been called.
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    /// Waits for shutdown and for the listener task to finish.
    pub async fn closed(&self) {
        self.cancel.cancelled().await;
        let task = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task
            && let Err(e) = task.await
        {
            warn!(error = %e, "mock server task did not finish cleanly");
        }
    }

    /// Links the dispatcher so the control routes can drive it.
    pub(crate) fn attach_dispatcher(&self, dispatcher: &Arc<ScenarioDispatcher>) {
        let Some(shared) = &self.shared else { return };
        if shared.dispatcher.set(Arc::downgrade(dispatcher)).is_err() {
            warn!("a scenario dispatcher is already attached; ignoring the new one");
        }
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for MockServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockServer")
            .field("active", &self.is_active())
            .field("local_addr", &self.local_addr)
            .field("rules", &self.rules_installed())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Signals
// ============================================================================

static SIGNALS_INSTALLED: AtomicBool = AtomicBool::new(false);

/// Shuts `server` down on SIGINT or SIGTERM.
///
/// Registers at most once per process; returns `false` if a handler was
/// already installed. The signal streams are registered before this
/// returns, so a signal sent afterwards is never missed. Must be called
/// from within a tokio runtime.
pub fn install_signal_shutdown(server: Arc<MockServer>) -> bool {
    if SIGNALS_INSTALLED.swap(true, Ordering::SeqCst) {
        return false;
    }
    let signals = ShutdownSignals::register();
    tokio::spawn(async move {
        signals.recv().await;
        info!("signal received");
        server.shutdown();
    });
    true
}

struct ShutdownSignals {
    #[cfg(unix)]
    streams: Option<(tokio::signal::unix::Signal, tokio::signal::unix::Signal)>,
}

impl ShutdownSignals {
    fn register() -> Self {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};
            let interrupt = signal(SignalKind::interrupt());
            let terminate = signal(SignalKind::terminate());
            let streams = match (interrupt, terminate) {
                (Ok(int), Ok(term)) => Some((int, term)),
                (Err(e), _) | (_, Err(e)) => {
                    warn!(error = %e, "failed to register signal handlers; Ctrl+C only");
                    None
                }
            };
            Self { streams }
        }
        #[cfg(not(unix))]
        {
            Self {}
        }
    }

    async fn recv(self) {
        #[cfg(unix)]
        {
            if let Some((mut int, mut term)) = self.streams {
                tokio::select! {
                    _ = int.recv() => {}
                    _ = term.recv() => {}
                }
                return;
            }
        }
        let _ = tokio::signal::ctrl_c().await;
    }
}

// ============================================================================
// Router
// ============================================================================

fn build_router(shared: Arc<ServerShared>) -> Router {
    control::routes()
        .fallback(intercept)
        .with_state(shared)
}

/// Fallback handler: everything that is not a control route.
async fn intercept(State(shared): State<Arc<ServerShared>>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let path_and_query = parts.uri.path_and_query().map_or("/", |pq| pq.as_str());
    let mut mock = MockRequest::new(HttpMethod::from(&parts.method), path_and_query);
    mock.headers = parts.headers;

    match axum::body::to_bytes(body, MAX_BODY_SIZE).await {
        Ok(bytes) => mock.body = bytes,
        Err(e) => {
            let message = format!("failed to read request body: {e}");
            warn!(method = %mock.method, path = %mock.path, error = %e, "request body rejected");
            shared
                .journal
                .record_failure(&mock, FailureKind::BodyRead, &message);
            return (StatusCode::BAD_REQUEST, message).into_response();
        }
    }

    shared.answer(mock).await.into_response()
}

// ============================================================================
// Tests
// ============================================================================
