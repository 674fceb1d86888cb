//! Handler factory registry
//!
//! Maps a [`ScenarioId`] to the [`HandlerFactory`] that builds its intercept
//! rules. Journeys contribute [`ScenarioModule`]s (one partial map per page
//! flow); [`Registry::merge`] combines them and refuses duplicate ids.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::error::{RegistryError, ScenarioError};
use crate::fixtures::FixtureStore;
use crate::rule::{InterceptRule, MockResponse};
use crate::state::{Counter, ScenarioState, Sequence, Transition};

// ============================================================================
// Identifiers and arguments
// ============================================================================

/// Opaque identifier of one test scenario (the `testCaseId` query value).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ScenarioId(String);

impl ScenarioId {
    /// Creates an id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for ScenarioId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ScenarioId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Ordered scenario arguments (the comma-split `args` query value).
///
/// Absent `args` yields a single empty string, so `first()` is always
/// present and factories treat `""` as "use the default".
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ScenarioArgs(Vec<String>);

impl ScenarioArgs {
    /// Wraps already-split arguments.
    #[must_use]
    pub const fn new(args: Vec<String>) -> Self {
        Self(args)
    }

    /// Splits an already-decoded `args` value on `,`.
    #[must_use]
    pub fn parse(decoded: &str) -> Self {
        Self(decoded.split(',').map(str::to_string).collect())
    }

    /// Argument at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&str> {
        self.0.get(index).map(String::as_str)
    }

    /// Argument at `index` if present and non-empty.
    #[must_use]
    pub fn non_empty(&self, index: usize) -> Option<&str> {
        self.get(index).filter(|s| !s.is_empty())
    }

    /// Argument at `index`, required to be non-empty.
    ///
    /// # Errors
    ///
    /// Returns [`ScenarioError::MissingArgument`] when absent or empty.
    pub fn require(&self, index: usize, name: &'static str) -> Result<&str, ScenarioError> {
        self.non_empty(index)
            .ok_or(ScenarioError::MissingArgument { index, name })
    }

    /// All arguments.
    #[must_use]
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

impl Default for ScenarioArgs {
    fn default() -> Self {
        Self(vec![String::new()])
    }
}

// ============================================================================
// Factory context
// ============================================================================

/// What a handler factory may use while building rules: fixtures and the
/// dispatcher-owned sequencing state.
#[derive(Debug, Clone)]
pub struct ScenarioContext {
    fixtures: Arc<FixtureStore>,
    state: Arc<ScenarioState>,
}

impl ScenarioContext {
    /// Creates a context.
    #[must_use]
    pub const fn new(fixtures: Arc<FixtureStore>, state: Arc<ScenarioState>) -> Self {
        Self { fixtures, state }
    }

    /// The fixture store.
    #[must_use]
    pub fn fixtures(&self) -> &FixtureStore {
        &self.fixtures
    }

    /// `200` response carrying the named fixture.
    ///
    /// # Errors
    ///
    /// Returns [`ScenarioError::Fixture`] for unknown fixtures.
    pub fn ok(&self, fixture: &str) -> Result<MockResponse, ScenarioError> {
        self.respond(200, fixture)
    }

    /// Response with `status` carrying the named fixture.
    ///
    /// # Errors
    ///
    /// Returns [`ScenarioError::Fixture`] for unknown fixtures.
    pub fn respond(&self, status: u16, fixture: &str) -> Result<MockResponse, ScenarioError> {
        Ok(self.fixtures.response(status, fixture)?)
    }

    /// Named two-step sequence (see [`crate::state`]).
    #[must_use]
    pub fn sequence(&self, name: &str, policy: Transition) -> Arc<Sequence> {
        self.state.sequence(name, policy)
    }

    /// Named call counter.
    #[must_use]
    pub fn counter(&self, name: &str) -> Arc<Counter> {
        self.state.counter(name)
    }
}

// ============================================================================
// Factories and modules
// ============================================================================

/// Builds the intercept rules of one scenario.
///
/// Stored once in the registry; every activation calls the same instance.
pub type HandlerFactory = Arc<
    dyn Fn(&ScenarioArgs, &ScenarioContext) -> Result<Vec<InterceptRule>, ScenarioError>
        + Send
        + Sync,
>;

/// A named partial map of scenarios contributed by one journey or page flow.
pub struct ScenarioModule {
    name: &'static str,
    entries: Vec<(ScenarioId, HandlerFactory)>,
}

impl ScenarioModule {
    /// Creates an empty module.
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            entries: Vec::new(),
        }
    }

    /// Registers a scenario.
    #[must_use]
    pub fn scenario<F>(mut self, id: &str, factory: F) -> Self
    where
        F: Fn(&ScenarioArgs, &ScenarioContext) -> Result<Vec<InterceptRule>, ScenarioError>
            + Send
            + Sync
            + 'static,
    {
        self.entries.push((ScenarioId::new(id), Arc::new(factory)));
        self
    }

    /// Module name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Number of scenarios in the module.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the module registers nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for ScenarioModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScenarioModule")
            .field("name", &self.name)
            .field("scenarios", &self.entries.len())
            .finish()
    }
}

// ============================================================================
// Registry
// ============================================================================

struct RegistryEntry {
    id: ScenarioId,
    module: &'static str,
    factory: HandlerFactory,
}

/// Flat, immutable `ScenarioId -> HandlerFactory` map.
pub struct Registry {
    entries: Vec<RegistryEntry>,
    index: HashMap<ScenarioId, usize>,
}

impl Registry {
    /// Merges modules into one registry, preserving registration order.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateScenario`] naming both modules when
    /// an id is registered twice (across modules or within one), and
    /// [`RegistryError::EmptyId`] for empty ids.
    pub fn merge(modules: impl IntoIterator<Item = ScenarioModule>) -> Result<Self, RegistryError> {
        let mut entries: Vec<RegistryEntry> = Vec::new();
        let mut index: HashMap<ScenarioId, usize> = HashMap::new();

        for module in modules {
            for (id, factory) in module.entries {
                if id.as_str().is_empty() {
                    return Err(RegistryError::EmptyId {
                        module: module.name.to_string(),
                    });
                }
                if let Some(&existing) = index.get(&id) {
                    return Err(RegistryError::DuplicateScenario {
                        id: id.to_string(),
                        first: entries[existing].module.to_string(),
                        second: module.name.to_string(),
                    });
                }
                index.insert(id.clone(), entries.len());
                entries.push(RegistryEntry {
                    id,
                    module: module.name,
                    factory,
                });
            }
        }

        Ok(Self { entries, index })
    }

    /// Factory registered for `id`; `None` means "defaults only".
    #[must_use]
    pub fn lookup(&self, id: &str) -> Option<&HandlerFactory> {
        self.index.get(id).map(|&i| &self.entries[i].factory)
    }

    /// Module that registered `id`.
    #[must_use]
    pub fn module_of(&self, id: &str) -> Option<&'static str> {
        self.index.get(id).map(|&i| self.entries[i].module)
    }

    /// All ids in registration order.
    #[must_use]
    pub fn ids(&self) -> Vec<&ScenarioId> {
        self.entries.iter().map(|e| &e.id).collect()
    }

    /// `(module, id)` pairs in registration order.
    #[must_use]
    pub fn listing(&self) -> Vec<(&'static str, &ScenarioId)> {
        self.entries.iter().map(|e| (e.module, &e.id)).collect()
    }

    /// Number of registered scenarios.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Closest registered id within Damerau-Levenshtein distance 3.
    #[must_use]
    pub fn suggest(&self, id: &str) -> Option<String> {
        self.entries
            .iter()
            .map(|e| (e.id.as_str(), strsim::damerau_levenshtein(id, e.id.as_str())))
            .filter(|(_, dist)| *dist <= 3)
            .min_by_key(|(_, dist)| *dist)
            .map(|(name, _)| name.to_string())
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("scenarios", &self.entries.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::MockResponse;

    fn one_rule(
        _args: &ScenarioArgs,
        _ctx: &ScenarioContext,
    ) -> Result<Vec<InterceptRule>, ScenarioError> {
        Ok(vec![InterceptRule::get("/v1/x", MockResponse::empty(200))])
    }

    fn ctx() -> ScenarioContext {
        ScenarioContext::new(
            Arc::new(FixtureStore::embedded().unwrap()),
            Arc::new(ScenarioState::new()),
        )
    }

    #[test]
    fn default_args_is_single_empty_string() {
        assert_eq!(ScenarioArgs::default().as_slice(), &[String::new()]);
    }

    #[test]
    fn parse_splits_on_commas() {
        let args = ScenarioArgs::parse("a,b,,c");
        assert_eq!(args.as_slice(), &["a", "b", "", "c"]);
        assert_eq!(args.non_empty(2), None);
    }

    #[test]
    fn parse_keeps_document_number_whole() {
        let args = ScenarioArgs::parse("GBR-2022-CC-D1630FF88");
        assert_eq!(args.as_slice(), &["GBR-2022-CC-D1630FF88"]);
    }

    #[test]
    fn require_rejects_empty() {
        let args = ScenarioArgs::default();
        assert!(matches!(
            args.require(0, "documentNumber"),
            Err(ScenarioError::MissingArgument { index: 0, .. })
        ));
    }

    #[test]
    fn merge_and_lookup() {
        let a = ScenarioModule::new("a").scenario("One", one_rule);
        let b = ScenarioModule::new("b").scenario("Two", one_rule);
        let registry = Registry::merge([a, b]).unwrap();

        assert_eq!(registry.len(), 2);
        assert!(registry.lookup("One").is_some());
        assert!(registry.lookup("Three").is_none());
        assert_eq!(registry.module_of("Two"), Some("b"));
        let ids: Vec<&str> = registry.ids().iter().map(|i| i.as_str()).collect();
        assert_eq!(ids, ["One", "Two"]);
    }

    #[test]
    fn merge_rejects_duplicates_across_modules() {
        let a = ScenarioModule::new("catch-certificate").scenario("Dup", one_rule);
        let b = ScenarioModule::new("storage-document").scenario("Dup", one_rule);
        match Registry::merge([a, b]) {
            Err(RegistryError::DuplicateScenario { id, first, second }) => {
                assert_eq!(id, "Dup");
                assert_eq!(first, "catch-certificate");
                assert_eq!(second, "storage-document");
            }
            other => panic!("expected duplicate error, got {other:?}"),
        }
    }

    #[test]
    fn merge_rejects_duplicates_within_module() {
        let a = ScenarioModule::new("a")
            .scenario("Dup", one_rule)
            .scenario("Dup", one_rule);
        assert!(Registry::merge([a]).is_err());
    }

    #[test]
    fn merge_rejects_empty_id() {
        let a = ScenarioModule::new("a").scenario("", one_rule);
        assert!(matches!(
            Registry::merge([a]),
            Err(RegistryError::EmptyId { .. })
        ));
    }

    #[test]
    fn factory_is_stable_across_lookups() {
        let registry =
            Registry::merge([ScenarioModule::new("a").scenario("One", one_rule)]).unwrap();
        let first = registry.lookup("One").unwrap();
        let second = registry.lookup("One").unwrap();
        assert!(Arc::ptr_eq(first, second));
        let rules = first(&ScenarioArgs::default(), &ctx()).unwrap();
        assert_eq!(rules.len(), 1);
    }

    #[test]
    fn suggest_finds_typos() {
        let registry = Registry::merge([ScenarioModule::new("a")
            .scenario("PSAddCatchDetails", one_rule)
            .scenario("SDAddStorageFacilities", one_rule)])
        .unwrap();
        assert_eq!(
            registry.suggest("PSAddCatchDetail").as_deref(),
            Some("PSAddCatchDetails")
        );
        assert_eq!(registry.suggest("CompletelyDifferent"), None);
    }

    #[test]
    fn context_fixture_errors_surface() {
        assert!(matches!(
            ctx().ok("does_not_exist"),
            Err(ScenarioError::Fixture(_))
        ));
    }
}
