//! `mockgate serve`: run the mock server until a shutdown signal.

use std::sync::Arc;

use tracing::info;
use url::form_urlencoded;

use crate::cli::args::ServeArgs;
use crate::defaults::install_defaults;
use crate::dispatch::{ARGS_PARAM, SCENARIO_PARAM, ScenarioDispatcher};
use crate::error::MockGateError;
use crate::fixtures::FixtureStore;
use crate::observability::metrics::init_metrics;
use crate::scenarios;
use crate::server::{MockServer, install_signal_shutdown};

/// Starts the server and blocks until it shuts down.
///
/// The defaults are installed before the listener is announced, so a
/// browser that loads a page without `testCaseId` still gets reference
/// data.
///
/// # Errors
///
/// Returns an error if the configuration is invalid, the fixtures or the
/// scenario catalogue fail to load, the listener cannot bind, or the
/// `--scenario` activation fails.
pub async fn run(args: &ServeArgs) -> Result<(), MockGateError> {
    let config = args.to_config()?;

    if let Some(port) = config.metrics_port {
        init_metrics(Some(port))?;
        info!(port, "prometheus exporter listening");
    }

    let fixtures = Arc::new(FixtureStore::with_overrides(config.fixtures_dir.as_deref())?);
    let registry = Arc::new(scenarios::registry()?);
    info!(
        scenarios = registry.len(),
        fixtures = fixtures.len(),
        "scenario catalogue loaded"
    );

    let server = Arc::new(MockServer::create(&config).await?);
    let dispatcher = ScenarioDispatcher::new(
        Arc::clone(&server),
        registry,
        Arc::clone(&fixtures),
        config.strict_scenarios,
    );
    install_defaults(&server, &fixtures)?;

    if let Some(id) = &args.scenario {
        let outcome = dispatcher.dispatch(&startup_navigation(id, args.args.as_deref()))?;
        info!(?outcome, "startup scenario applied");
    }

    install_signal_shutdown(Arc::clone(&server));

    if let Some(base_url) = server.base_url() {
        info!(%base_url, strict = config.strict_scenarios, "mock server ready");
    }

    server.closed().await;
    // The server only holds a weak reference to its dispatcher.
    drop(dispatcher);
    info!("mock server stopped");
    Ok(())
}

/// Navigation URL equivalent to `?testCaseId=<id>&args=<args>`.
fn startup_navigation(id: &str, args: Option<&str>) -> String {
    let mut query = form_urlencoded::Serializer::new(String::new());
    query.append_pair(SCENARIO_PARAM, id);
    if let Some(args) = args {
        query.append_pair(ARGS_PARAM, args);
    }
    format!("/?{}", query.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::parse_navigation;

    #[test]
    fn startup_navigation_round_trips_args() {
        let url = startup_navigation("CCCheckYourInformation", Some("GBR-2022-CC-1,a b&c"));
        let nav = parse_navigation(&url).unwrap().unwrap();
        assert_eq!(nav.scenario.as_str(), "CCCheckYourInformation");
        assert_eq!(nav.args.as_slice(), ["GBR-2022-CC-1", "a b&c"]);
    }

    #[test]
    fn startup_navigation_without_args() {
        let nav = parse_navigation(&startup_navigation("DashboardNoDocuments", None))
            .unwrap()
            .unwrap();
        assert_eq!(nav.args.as_slice(), [""]);
    }
}
