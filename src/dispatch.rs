//! Scenario dispatcher
//!
//! Turns a page-navigation URL into an installed rule set. A test selects
//! a scenario by navigating to any page with `testCaseId=<id>` and,
//! optionally, `args=<comma-separated values>` in the query string:
//!
//! ```text
//! /create-catch-certificate/GBR-2022-CC-D1630FF88/check-your-information
//!     ?testCaseId=CCCheckYourInformation&args=GBR-2022-CC-D1630FF88
//! ```
//!
//! Activation always runs in the same order: clear the server, reset the
//! sequencing state, install the defaults, then install the scenario's
//! rules on top.

use std::sync::{Arc, Mutex, PoisonError, RwLock};

use serde::Serialize;
use tracing::{error, info, warn};
use url::Url;

use crate::defaults::install_defaults;
use crate::error::DispatchError;
use crate::fixtures::FixtureStore;
use crate::observability::metrics::{self, DispatchLabel};
use crate::registry::{Registry, ScenarioArgs, ScenarioContext, ScenarioId};
use crate::server::MockServer;
use crate::state::ScenarioState;

/// Query parameter selecting the scenario.
pub const SCENARIO_PARAM: &str = "testCaseId";
/// Query parameter carrying scenario arguments.
pub const ARGS_PARAM: &str = "args";

/// Base used to resolve path-only navigation URLs.
const RELATIVE_BASE: &str = "http://localhost/";

/// Scenario selection read from a navigation URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Navigation {
    /// Selected scenario
    pub scenario: ScenarioId,
    /// Decoded, comma-split arguments
    pub args: ScenarioArgs,
}

/// Reads `testCaseId` and `args` from `url`.
///
/// `url` may be absolute or a path with query. Returns `Ok(None)` when
/// there is no (or an empty) `testCaseId`. The `args` value is
/// URL-decoded once and split on `,`; elements are not decoded again.
///
/// # Errors
///
/// Returns [`DispatchError::InvalidUrl`] if `url` cannot be parsed.
pub fn parse_navigation(url: &str) -> Result<Option<Navigation>, DispatchError> {
    let parsed = Url::parse(url)
        .or_else(|e| match e {
            url::ParseError::RelativeUrlWithoutBase => Url::parse(RELATIVE_BASE)?.join(url),
            other => Err(other),
        })
        .map_err(|source| DispatchError::InvalidUrl {
            url: url.to_string(),
            source,
        })?;

    let mut scenario = None;
    let mut args = None;
    for (key, value) in parsed.query_pairs() {
        if key == SCENARIO_PARAM && scenario.is_none() {
            scenario = Some(value.into_owned());
        } else if key == ARGS_PARAM && args.is_none() {
            args = Some(value.into_owned());
        }
    }

    Ok(scenario.filter(|s| !s.is_empty()).map(|id| Navigation {
        scenario: ScenarioId::new(id),
        args: args.map_or_else(ScenarioArgs::default, |a| ScenarioArgs::parse(&a)),
    }))
}

/// What a dispatch call did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DispatchOutcome {
    /// The mock layer is gated off; nothing was touched
    Inactive,
    /// The URL carries no `testCaseId`; nothing was touched
    NoScenario,
    /// Defaults plus the scenario's rules are installed
    Activated {
        /// Activated scenario
        scenario: ScenarioId,
        /// Arguments passed to its factory
        args: ScenarioArgs,
        /// Rules installed in total
        rules: usize,
    },
    /// The scenario is unknown; only the defaults are installed
    DefaultsOnly {
        /// Requested scenario
        scenario: ScenarioId,
        /// Closest registered id
        #[serde(skip_serializing_if = "Option::is_none")]
        suggestion: Option<String>,
        /// Rules installed in total
        rules: usize,
    },
}

impl DispatchOutcome {
    const fn label(&self) -> DispatchLabel {
        match self {
            Self::Inactive => DispatchLabel::Inactive,
            Self::NoScenario => DispatchLabel::NoScenario,
            Self::Activated { .. } => DispatchLabel::Activated,
            Self::DefaultsOnly { .. } => DispatchLabel::DefaultsOnly,
        }
    }
}

/// Selects and installs scenarios on a [`MockServer`].
pub struct ScenarioDispatcher {
    server: Arc<MockServer>,
    registry: Arc<Registry>,
    fixtures: Arc<FixtureStore>,
    state: Arc<ScenarioState>,
    strict: bool,
    current: RwLock<Option<ScenarioId>>,
    // Serializes activations so two navigations cannot interleave their
    // reset and install steps.
    activation: Mutex<()>,
}

impl ScenarioDispatcher {
    /// Creates a dispatcher and attaches it to `server`'s control routes.
    ///
    /// With `strict` set, unknown scenario ids fail dispatch instead of
    /// falling back to the defaults.
    #[must_use]
    pub fn new(
        server: Arc<MockServer>,
        registry: Arc<Registry>,
        fixtures: Arc<FixtureStore>,
        strict: bool,
    ) -> Arc<Self> {
        let dispatcher = Arc::new(Self {
            server,
            registry,
            fixtures,
            state: Arc::new(ScenarioState::new()),
            strict,
            current: RwLock::new(None),
            activation: Mutex::new(()),
        });
        dispatcher.server.attach_dispatcher(&dispatcher);
        dispatcher
    }

    /// Dispatches a navigation URL.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::InvalidUrl`] for an unparseable URL, unless the
    ///   server is inert
    /// - [`DispatchError::UnknownScenario`] in strict mode
    /// - [`DispatchError::Defaults`] if the baseline fixtures are missing
    /// - [`DispatchError::Factory`] if the scenario's factory fails; the
    ///   defaults stay installed
    pub fn dispatch(&self, url: &str) -> Result<DispatchOutcome, DispatchError> {
        let result = self.dispatch_inner(url);
        metrics::record_dispatch(
            result
                .as_ref()
                .map_or(DispatchLabel::Failed, DispatchOutcome::label),
        );
        result
    }

    fn dispatch_inner(&self, url: &str) -> Result<DispatchOutcome, DispatchError> {
        // Outside the test environment even a malformed URL is a no-op.
        if !self.server.is_active() {
            return Ok(DispatchOutcome::Inactive);
        }
        let Some(Navigation { scenario, args }) = parse_navigation(url)? else {
            return Ok(DispatchOutcome::NoScenario);
        };

        let Some(factory) = self.registry.lookup(scenario.as_str()) else {
            return self.activate_defaults_only(scenario);
        };

        let _guard = self
            .activation
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        self.prepare()?;
        let ctx = ScenarioContext::new(Arc::clone(&self.fixtures), Arc::clone(&self.state));
        let rules = factory(&args, &ctx).map_err(|source| {
            error!(scenario = %scenario, error = %source, "scenario factory failed");
            DispatchError::Factory {
                id: scenario.to_string(),
                source,
            }
        })?;
        self.server.use_rules(rules);
        let installed = self.server.rules_installed();
        self.set_current(Some(scenario.clone()));

        info!(
            scenario = %scenario,
            args = ?args.as_slice(),
            rules = installed,
            "scenario activated"
        );
        Ok(DispatchOutcome::Activated {
            scenario,
            args,
            rules: installed,
        })
    }

    fn activate_defaults_only(
        &self,
        scenario: ScenarioId,
    ) -> Result<DispatchOutcome, DispatchError> {
        let suggestion = self.registry.suggest(scenario.as_str());
        if self.strict {
            return Err(DispatchError::UnknownScenario {
                id: scenario.to_string(),
                suggestion,
            });
        }

        warn!(
            scenario = %scenario,
            suggestion = suggestion.as_deref().unwrap_or(""),
            "unknown scenario; installing defaults only"
        );

        let _guard = self
            .activation
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        self.prepare()?;
        Ok(DispatchOutcome::DefaultsOnly {
            scenario,
            suggestion,
            rules: self.server.rules_installed(),
        })
    }

    /// Clears rules and sequencing state, then installs the defaults.
    fn prepare(&self) -> Result<(), DispatchError> {
        self.set_current(None);
        self.server.reset();
        self.state.reset_all();
        install_defaults(&self.server, &self.fixtures)?;
        Ok(())
    }

    fn set_current(&self, scenario: Option<ScenarioId>) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = scenario;
    }

    /// Resets every sequence and counter without touching installed rules.
    pub fn reset_all_scenario_state(&self) {
        self.state.reset_all();
        info!("scenario state reset");
    }

    /// Scenario installed by the last successful activation.
    #[must_use]
    pub fn current_scenario(&self) -> Option<ScenarioId> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Sequencing state handed to factories.
    #[must_use]
    pub const fn state(&self) -> &Arc<ScenarioState> {
        &self.state
    }

    /// The scenario registry.
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// The server this dispatcher drives.
    #[must_use]
    pub const fn server(&self) -> &Arc<MockServer> {
        &self.server
    }
}

impl std::fmt::Debug for ScenarioDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScenarioDispatcher")
            .field("scenarios", &self.registry.len())
            .field("strict", &self.strict)
            .field("current", &self.current_scenario())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UnhandledPolicy;
    use crate::error::ScenarioError;
    use crate::registry::ScenarioModule;
    use crate::rule::{HttpMethod, InterceptRule, MockRequest, MockResponse, from_fn};
    use crate::state::{Step, Transition};
    use proptest::prelude::*;
    use serde_json::json;
    use std::sync::Mutex as StdMutex;

    fn get(path: &str) -> MockRequest {
        MockRequest::new(HttpMethod::Get, path)
    }

    /// Registry whose scenarios record the args they were given.
    fn test_registry(seen: Arc<StdMutex<Vec<Vec<String>>>>) -> Registry {
        let module = ScenarioModule::new("test")
            .scenario("Record", move |args, _ctx| {
                seen.lock().unwrap().push(args.as_slice().to_vec());
                Ok(vec![InterceptRule::get(
                    "/v1/user/details",
                    MockResponse::ok_json(json!({"shadowed": true})),
                )])
            })
            .scenario("Toggle", |_args, ctx| {
                let seq = ctx.sequence("toggle", Transition::Alternate);
                Ok(vec![InterceptRule::get(
                    "/v1/toggle",
                    from_fn(move |_req: &MockRequest| {
                        Ok(match seq.advance() {
                            Step::First => MockResponse::text(200, "first"),
                            Step::Second => MockResponse::text(200, "second"),
                        })
                    }),
                )])
            })
            .scenario("Broken", |_args, _ctx| {
                Err(ScenarioError::InvalidArgument {
                    value: String::new(),
                    reason: "always fails".to_string(),
                })
            });
        Registry::merge([module]).unwrap()
    }

    fn setup(strict: bool) -> (Arc<ScenarioDispatcher>, Arc<StdMutex<Vec<Vec<String>>>>) {
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let server = Arc::new(MockServer::in_memory(UnhandledPolicy::Error));
        let dispatcher = ScenarioDispatcher::new(
            server,
            Arc::new(test_registry(Arc::clone(&seen))),
            Arc::new(FixtureStore::embedded().unwrap()),
            strict,
        );
        (dispatcher, seen)
    }

    fn text(resp: &MockResponse) -> &str {
        match &resp.body {
            crate::rule::ResponseBody::Text(t) => t.as_str(),
            other => panic!("expected text body, got {other:?}"),
        }
    }

    #[test]
    fn parse_relative_url() {
        let nav = parse_navigation("/dashboard?testCaseId=Record&args=a,b")
            .unwrap()
            .unwrap();
        assert_eq!(nav.scenario.as_str(), "Record");
        assert_eq!(nav.args.as_slice(), &["a", "b"]);
    }

    #[test]
    fn parse_absolute_url() {
        let nav = parse_navigation("http://localhost:3001/x?testCaseId=Record")
            .unwrap()
            .unwrap();
        assert_eq!(nav.args, ScenarioArgs::default());
    }

    #[test]
    fn parse_without_scenario() {
        assert_eq!(parse_navigation("/dashboard?args=a").unwrap(), None);
        assert_eq!(parse_navigation("/dashboard?testCaseId=").unwrap(), None);
    }

    #[test]
    fn parse_decodes_args_once() {
        let nav = parse_navigation("/?testCaseId=X&args=a%2Cb,c%252Cd")
            .unwrap()
            .unwrap();
        assert_eq!(nav.args.as_slice(), &["a", "b", "c%2Cd"]);
    }

    #[test]
    fn parse_document_number_literally() {
        let nav = parse_navigation("/?testCaseId=X&args=GBR-2022-CC-D1630FF88")
            .unwrap()
            .unwrap();
        assert_eq!(nav.args.as_slice(), &["GBR-2022-CC-D1630FF88"]);
    }

    #[test]
    fn parse_rejects_invalid_url() {
        assert!(matches!(
            parse_navigation("http://[broken/?testCaseId=X"),
            Err(DispatchError::InvalidUrl { .. })
        ));
    }

    proptest! {
        #[test]
        fn args_survive_encoding(args in prop::collection::vec("[a-zA-Z0-9 %&=+/-]{0,12}", 1..5)) {
            let joined = args.join(",");
            let query = url::form_urlencoded::Serializer::new(String::new())
                .append_pair(SCENARIO_PARAM, "X")
                .append_pair(ARGS_PARAM, &joined)
                .finish();
            let nav = parse_navigation(&format!("/page?{query}")).unwrap().unwrap();
            prop_assert_eq!(nav.args.as_slice(), args.as_slice());
        }
    }

    #[tokio::test]
    async fn activation_layers_scenario_over_defaults() {
        let (dispatcher, seen) = setup(false);
        let outcome = dispatcher.dispatch("/?testCaseId=Record").unwrap();
        assert!(matches!(outcome, DispatchOutcome::Activated { .. }));
        assert_eq!(seen.lock().unwrap().as_slice(), &[vec![String::new()]]);

        let server = dispatcher.server();
        let shadowed = server.handle(get("/v1/user/details")).await.unwrap();
        assert_eq!(shadowed.json_body().unwrap()["shadowed"], true);
        let default = server.handle(get("/reference/api/v1/countries")).await.unwrap();
        assert_eq!(default.status, 200);
        assert_eq!(
            dispatcher.current_scenario().map(|s| s.to_string()).as_deref(),
            Some("Record")
        );
    }

    #[test]
    fn args_reach_factory_literally() {
        let (dispatcher, seen) = setup(false);
        dispatcher
            .dispatch("/?testCaseId=Record&args=GBR-2022-CC-D1630FF88")
            .unwrap();
        assert_eq!(
            seen.lock().unwrap().as_slice(),
            &[vec!["GBR-2022-CC-D1630FF88".to_string()]]
        );
    }

    #[tokio::test]
    async fn sequence_restarts_on_new_activation() {
        let (dispatcher, _) = setup(false);
        let server = Arc::clone(dispatcher.server());

        dispatcher.dispatch("/?testCaseId=Toggle").unwrap();
        assert_eq!(text(&server.handle(get("/v1/toggle")).await.unwrap()), "first");
        assert_eq!(text(&server.handle(get("/v1/toggle")).await.unwrap()), "second");

        dispatcher.dispatch("/?testCaseId=Toggle").unwrap();
        assert_eq!(text(&server.handle(get("/v1/toggle")).await.unwrap()), "first");
    }

    #[tokio::test]
    async fn reset_all_scenario_state_restarts_sequences() {
        let (dispatcher, _) = setup(false);
        let server = Arc::clone(dispatcher.server());
        dispatcher.dispatch("/?testCaseId=Toggle").unwrap();
        server.handle(get("/v1/toggle")).await;

        dispatcher.reset_all_scenario_state();
        assert_eq!(text(&server.handle(get("/v1/toggle")).await.unwrap()), "first");
        assert_eq!(server.rules_installed(), 11);
    }

    #[tokio::test]
    async fn unknown_scenario_installs_defaults_only() {
        let (dispatcher, _) = setup(false);
        dispatcher.dispatch("/?testCaseId=Toggle").unwrap();

        let outcome = dispatcher.dispatch("/?testCaseId=Togle").unwrap();
        match outcome {
            DispatchOutcome::DefaultsOnly {
                suggestion, rules, ..
            } => {
                assert_eq!(suggestion.as_deref(), Some("Toggle"));
                assert_eq!(rules, 10);
            }
            other => panic!("expected defaults only, got {other:?}"),
        }
        let server = dispatcher.server();
        assert_eq!(server.handle(get("/v1/notification")).await.unwrap().status, 200);
        assert_eq!(server.handle(get("/v1/toggle")).await.unwrap().status, 500);
        assert!(dispatcher.current_scenario().is_none());
    }

    #[test]
    fn strict_mode_rejects_unknown_scenario() {
        let (dispatcher, _) = setup(true);
        dispatcher.server().use_rules(vec![InterceptRule::get(
            "/v1/keep",
            MockResponse::empty(200),
        )]);
        assert!(matches!(
            dispatcher.dispatch("/?testCaseId=Nope"),
            Err(DispatchError::UnknownScenario { .. })
        ));
        // Nothing was reset.
        assert_eq!(dispatcher.server().rules_installed(), 1);
    }

    #[test]
    fn no_scenario_touches_nothing() {
        let (dispatcher, _) = setup(false);
        dispatcher.server().use_rules(vec![InterceptRule::get(
            "/v1/keep",
            MockResponse::empty(200),
        )]);
        assert_eq!(
            dispatcher.dispatch("/dashboard").unwrap(),
            DispatchOutcome::NoScenario
        );
        assert_eq!(dispatcher.server().rules_installed(), 1);
    }

    #[test]
    fn factory_failure_leaves_defaults() {
        let (dispatcher, _) = setup(false);
        assert!(matches!(
            dispatcher.dispatch("/?testCaseId=Broken"),
            Err(DispatchError::Factory { .. })
        ));
        assert_eq!(dispatcher.server().rules_installed(), 10);
    }

    #[test]
    fn inert_server_is_inactive() {
        let dispatcher = ScenarioDispatcher::new(
            Arc::new(MockServer::inert()),
            Arc::new(test_registry(Arc::new(StdMutex::new(Vec::new())))),
            Arc::new(FixtureStore::embedded().unwrap()),
            false,
        );
        assert_eq!(
            dispatcher.dispatch("/?testCaseId=Record").unwrap(),
            DispatchOutcome::Inactive
        );
        assert_eq!(
            dispatcher.dispatch("http://[broken/?testCaseId=X").unwrap(),
            DispatchOutcome::Inactive
        );
    }

    #[test]
    fn active_server_rejects_malformed_url() {
        let dispatcher = ScenarioDispatcher::new(
            Arc::new(MockServer::in_memory(UnhandledPolicy::Error)),
            Arc::new(test_registry(Arc::new(StdMutex::new(Vec::new())))),
            Arc::new(FixtureStore::embedded().unwrap()),
            false,
        );
        assert!(matches!(
            dispatcher.dispatch("http://[broken/?testCaseId=X"),
            Err(DispatchError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn outcome_serializes_with_tag() {
        let outcome = DispatchOutcome::Activated {
            scenario: ScenarioId::new("X"),
            args: ScenarioArgs::default(),
            rules: 3,
        };
        assert_eq!(
            serde_json::to_value(&outcome).unwrap(),
            json!({"outcome": "activated", "scenario": "X", "args": [""], "rules": 3})
        );
    }
}
