//! Prometheus metrics.
//!
//! Label values come from closed enums, never from request data, so label
//! cardinality stays fixed no matter what the application under test sends.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::error::MockGateError;

/// Guard against double-initialization of the recorder.
static METRICS_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// How an intercepted request was answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    /// A rule matched and its responder succeeded
    Matched,
    /// No rule matched
    Unhandled,
    /// A rule matched but its responder failed
    ResponderError,
}

impl RequestOutcome {
    /// Label value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Matched => "matched",
            Self::Unhandled => "unhandled",
            Self::ResponderError => "responder_error",
        }
    }
}

/// Result of one dispatch call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchLabel {
    /// Scenario rules installed
    Activated,
    /// Unknown scenario, defaults installed
    DefaultsOnly,
    /// No `testCaseId` in the URL
    NoScenario,
    /// Mock layer is gated off
    Inactive,
    /// Dispatch returned an error
    Failed,
}

impl DispatchLabel {
    /// Label value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Activated => "activated",
            Self::DefaultsOnly => "defaults_only",
            Self::NoScenario => "no_scenario",
            Self::Inactive => "inactive",
            Self::Failed => "failed",
        }
    }
}

/// Installs the global metrics recorder.
///
/// With `Some(port)` a Prometheus scrape endpoint is served on
/// `127.0.0.1:<port>`; with `None` the recorder is installed without one.
/// Later calls are no-ops.
///
/// # Errors
///
/// Returns `MockGateError::Io` if the recorder or listener cannot be
/// installed.
pub fn init_metrics(port: Option<u16>) -> Result<(), MockGateError> {
    if METRICS_INITIALIZED.swap(true, Ordering::SeqCst) {
        tracing::debug!("metrics already initialized, skipping");
        return Ok(());
    }
    port.map_or_else(
        || PrometheusBuilder::new().install_recorder().map(|_| ()),
        |p| {
            PrometheusBuilder::new()
                .with_http_listener(([127, 0, 0, 1], p))
                .install()
        },
    )
    .map_err(|e| MockGateError::Io(std::io::Error::other(e.to_string())))?;

    describe_metrics();
    Ok(())
}

fn describe_metrics() {
    describe_counter!(
        "mockgate_requests_total",
        "Intercepted requests by outcome"
    );
    describe_histogram!(
        "mockgate_request_duration_ms",
        "Time spent answering an intercepted request"
    );
    describe_counter!(
        "mockgate_dispatch_total",
        "Scenario dispatch calls by outcome"
    );
    describe_gauge!(
        "mockgate_rules_installed",
        "Intercept rules currently installed"
    );
}

/// Records one intercepted request.
pub fn record_request(outcome: RequestOutcome, duration: Duration) {
    counter!("mockgate_requests_total", "outcome" => outcome.as_str()).increment(1);
    histogram!("mockgate_request_duration_ms").record(duration.as_secs_f64() * 1000.0);
}

/// Records one dispatch call.
pub fn record_dispatch(outcome: DispatchLabel) {
    counter!("mockgate_dispatch_total", "outcome" => outcome.as_str()).increment(1);
}

/// Sets the installed-rules gauge.
#[allow(clippy::cast_precision_loss)]
pub fn set_rules_installed(count: usize) {
    gauge!("mockgate_rules_installed").set(count as f64);
}
