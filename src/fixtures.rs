//! Fixture store
//!
//! Named, opaque response payloads. The baseline set is embedded in the
//! binary; a fixture directory can be layered on top at startup, replacing
//! embedded fixtures of the same name.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, info};

use crate::error::FixtureError;
use crate::rule::MockResponse;

/// Payload format of a fixture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixtureKind {
    /// JSON document
    Json,
    /// Plain text
    Text,
}

/// Embedded fixtures: `(name, kind, content)`.
const EMBEDDED: &[(&str, FixtureKind, &str)] = &[
    (
        "account_details",
        FixtureKind::Json,
        include_str!("../fixtures/account_details.json"),
    ),
    (
        "cc_document",
        FixtureKind::Json,
        include_str!("../fixtures/cc_document.json"),
    ),
    (
        "cc_exporter_details",
        FixtureKind::Json,
        include_str!("../fixtures/cc_exporter_details.json"),
    ),
    (
        "cc_exporter_details_errors",
        FixtureKind::Json,
        include_str!("../fixtures/cc_exporter_details_errors.json"),
    ),
    (
        "cc_landings",
        FixtureKind::Json,
        include_str!("../fixtures/cc_landings.json"),
    ),
    (
        "cc_submit_success",
        FixtureKind::Json,
        include_str!("../fixtures/cc_submit_success.json"),
    ),
    (
        "cc_submit_validation_failures",
        FixtureKind::Json,
        include_str!("../fixtures/cc_submit_validation_failures.json"),
    ),
    (
        "cc_transport",
        FixtureKind::Json,
        include_str!("../fixtures/cc_transport.json"),
    ),
    (
        "cc_transport_types",
        FixtureKind::Json,
        include_str!("../fixtures/cc_transport_types.json"),
    ),
    (
        "commodity_codes",
        FixtureKind::Json,
        include_str!("../fixtures/commodity_codes.json"),
    ),
    (
        "countries",
        FixtureKind::Json,
        include_str!("../fixtures/countries.json"),
    ),
    (
        "documents_catch_certificates",
        FixtureKind::Json,
        include_str!("../fixtures/documents_catch_certificates.json"),
    ),
    (
        "documents_empty",
        FixtureKind::Json,
        include_str!("../fixtures/documents_empty.json"),
    ),
    (
        "documents_processing_statements",
        FixtureKind::Json,
        include_str!("../fixtures/documents_processing_statements.json"),
    ),
    (
        "documents_storage_documents",
        FixtureKind::Json,
        include_str!("../fixtures/documents_storage_documents.json"),
    ),
    (
        "notification",
        FixtureKind::Json,
        include_str!("../fixtures/notification.json"),
    ),
    (
        "presentations",
        FixtureKind::Json,
        include_str!("../fixtures/presentations.json"),
    ),
    (
        "ps_catches_one",
        FixtureKind::Json,
        include_str!("../fixtures/ps_catches_one.json"),
    ),
    (
        "ps_catches_two",
        FixtureKind::Json,
        include_str!("../fixtures/ps_catches_two.json"),
    ),
    (
        "ps_consignment",
        FixtureKind::Json,
        include_str!("../fixtures/ps_consignment.json"),
    ),
    (
        "ps_document",
        FixtureKind::Json,
        include_str!("../fixtures/ps_document.json"),
    ),
    (
        "ps_plant_details",
        FixtureKind::Json,
        include_str!("../fixtures/ps_plant_details.json"),
    ),
    (
        "sd_catches",
        FixtureKind::Json,
        include_str!("../fixtures/sd_catches.json"),
    ),
    (
        "sd_document",
        FixtureKind::Json,
        include_str!("../fixtures/sd_document.json"),
    ),
    (
        "sd_storage_facilities",
        FixtureKind::Json,
        include_str!("../fixtures/sd_storage_facilities.json"),
    ),
    (
        "sd_transport_truck",
        FixtureKind::Json,
        include_str!("../fixtures/sd_transport_truck.json"),
    ),
    (
        "service_unavailable",
        FixtureKind::Text,
        include_str!("../fixtures/service_unavailable.txt"),
    ),
    (
        "species",
        FixtureKind::Json,
        include_str!("../fixtures/species.json"),
    ),
    (
        "states",
        FixtureKind::Json,
        include_str!("../fixtures/states.json"),
    ),
    (
        "unauthorised",
        FixtureKind::Json,
        include_str!("../fixtures/unauthorised.json"),
    ),
    (
        "user_attributes",
        FixtureKind::Json,
        include_str!("../fixtures/user_attributes.json"),
    ),
    (
        "user_attributes_not_accepted",
        FixtureKind::Json,
        include_str!("../fixtures/user_attributes_not_accepted.json"),
    ),
    (
        "user_details",
        FixtureKind::Json,
        include_str!("../fixtures/user_details.json"),
    ),
];

/// A stored payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Fixture {
    /// Parsed JSON payload
    Json(Value),
    /// Text payload
    Text(String),
}

impl Fixture {
    /// Parses `content` according to `kind`.
    fn parse(kind: FixtureKind, content: &str, origin: &Path) -> Result<Self, FixtureError> {
        match kind {
            FixtureKind::Json => serde_json::from_str(content)
                .map(Self::Json)
                .map_err(|source| FixtureError::Parse {
                    path: origin.to_path_buf(),
                    source,
                }),
            FixtureKind::Text => Ok(Self::Text(content.trim_end().to_string())),
        }
    }
}

/// Name-addressed collection of fixtures.
#[derive(Debug, Clone, Default)]
pub struct FixtureStore {
    fixtures: HashMap<String, Fixture>,
}

impl FixtureStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding every embedded fixture.
    ///
    /// # Errors
    ///
    /// Returns [`FixtureError::Parse`] if an embedded JSON fixture is
    /// malformed.
    pub fn embedded() -> Result<Self, FixtureError> {
        let mut store = Self::new();
        for (name, kind, content) in EMBEDDED {
            let fixture = Fixture::parse(*kind, content, Path::new(name))?;
            store.insert(*name, fixture);
        }
        Ok(store)
    }

    /// The embedded fixtures with `dir`, if given, layered on top.
    ///
    /// # Errors
    ///
    /// Returns an error if an embedded fixture is malformed or `dir`
    /// cannot be loaded.
    pub fn with_overrides(dir: Option<&Path>) -> Result<Self, FixtureError> {
        let mut store = Self::embedded()?;
        if let Some(dir) = dir {
            let loaded = store.load_dir(dir)?;
            info!(dir = %dir.display(), loaded, "loaded fixture overrides");
        }
        Ok(store)
    }

    /// Loads every file under `dir` (recursively), replacing fixtures of
    /// the same name. Returns the number of files loaded.
    ///
    /// A file's name is its path relative to `dir` without extension, using
    /// `/` separators (`ps/catches_two.json` → `ps/catches_two`). `.json`
    /// files are parsed; anything else is stored as text.
    ///
    /// # Errors
    ///
    /// Returns an error if a file cannot be read or a `.json` file does not
    /// parse.
    pub fn load_dir(&mut self, dir: &Path) -> Result<usize, FixtureError> {
        let pattern = format!("{}/**/*", glob::Pattern::escape(&dir.to_string_lossy()));
        let mut loaded = 0;
        for entry in glob::glob(&pattern)? {
            let path = entry.map_err(|e| FixtureError::Read {
                path: e.path().to_path_buf(),
                source: e.into(),
            })?;
            if !path.is_file() {
                continue;
            }
            let Some(name) = fixture_name(dir, &path) else {
                continue;
            };
            let content = std::fs::read_to_string(&path).map_err(|source| FixtureError::Read {
                path: path.clone(),
                source,
            })?;
            let kind = if path.extension().is_some_and(|e| e == "json") {
                FixtureKind::Json
            } else {
                FixtureKind::Text
            };
            let fixture = Fixture::parse(kind, &content, &path)?;
            debug!(fixture = %name, path = %path.display(), "loaded fixture");
            self.insert(name, fixture);
            loaded += 1;
        }
        Ok(loaded)
    }

    /// Adds or replaces a fixture.
    pub fn insert(&mut self, name: impl Into<String>, fixture: Fixture) {
        self.fixtures.insert(name.into(), fixture);
    }

    /// Looks up a fixture by name.
    ///
    /// # Errors
    ///
    /// Returns [`FixtureError::NotFound`] with the closest known name as a
    /// suggestion.
    pub fn get(&self, name: &str) -> Result<&Fixture, FixtureError> {
        self.fixtures
            .get(name)
            .ok_or_else(|| FixtureError::NotFound {
                name: name.to_string(),
                suggestion: self.suggest(name),
            })
    }

    /// Returns a fixture as a JSON value. Text fixtures become JSON strings.
    ///
    /// # Errors
    ///
    /// Returns [`FixtureError::NotFound`] for unknown names.
    pub fn json(&self, name: &str) -> Result<Value, FixtureError> {
        Ok(match self.get(name)? {
            Fixture::Json(v) => v.clone(),
            Fixture::Text(t) => Value::String(t.clone()),
        })
    }

    /// Builds a response with `status` whose body is the named fixture.
    ///
    /// # Errors
    ///
    /// Returns [`FixtureError::NotFound`] for unknown names.
    pub fn response(&self, status: u16, name: &str) -> Result<MockResponse, FixtureError> {
        Ok(match self.get(name)? {
            Fixture::Json(v) => MockResponse::json(status, v.clone()),
            Fixture::Text(t) => MockResponse::text(status, t.clone()),
        })
    }

    /// All fixture names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.fixtures.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Number of fixtures in the store.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fixtures.len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fixtures.is_empty()
    }

    /// Closest known name within Damerau-Levenshtein distance 3.
    fn suggest(&self, name: &str) -> Option<String> {
        self.fixtures
            .keys()
            .map(|k| (k, strsim::damerau_levenshtein(name, k)))
            .filter(|(_, dist)| *dist <= 3)
            .min_by_key(|(_, dist)| *dist)
            .map(|(k, _)| k.clone())
    }
}

/// Relative, extension-less, `/`-separated name for `path` under `dir`.
fn fixture_name(dir: &Path, path: &Path) -> Option<String> {
    let relative: PathBuf = path.strip_prefix(dir).ok()?.with_extension("");
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn embedded_fixtures_parse() {
        let store = FixtureStore::embedded().unwrap();
        assert_eq!(store.len(), EMBEDDED.len());
        assert!(store.names().contains(&"ps_catches_two"));
    }

    #[test]
    fn json_fixture_response() {
        let store = FixtureStore::embedded().unwrap();
        let resp = store.response(200, "ps_catches_two").unwrap();
        assert_eq!(resp.status, 200);
        let catches = resp.json_body().unwrap()["catches"].as_array().unwrap();
        assert_eq!(catches.len(), 2);
    }

    #[test]
    fn text_fixture_response() {
        let store = FixtureStore::embedded().unwrap();
        let resp = store.response(503, "service_unavailable").unwrap();
        assert_eq!(
            resp.body,
            crate::rule::ResponseBody::Text("Service unavailable".to_string())
        );
    }

    #[test]
    fn missing_fixture_suggests_near_name() {
        let store = FixtureStore::embedded().unwrap();
        let err = store.get("ps_catches_tw").unwrap_err();
        match err {
            FixtureError::NotFound { suggestion, .. } => {
                assert_eq!(suggestion.as_deref(), Some("ps_catches_two"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn load_dir_overrides_and_nests() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("countries.json"), r#"["Atlantis"]"#).unwrap();
        std::fs::create_dir(dir.path().join("ps")).unwrap();
        std::fs::write(dir.path().join("ps/extra.txt"), "hello\n").unwrap();

        let mut store = FixtureStore::embedded().unwrap();
        let loaded = store.load_dir(dir.path()).unwrap();

        assert_eq!(loaded, 2);
        assert_eq!(store.json("countries").unwrap(), json!(["Atlantis"]));
        assert_eq!(store.json("ps/extra").unwrap(), json!("hello"));
    }

    #[test]
    fn load_dir_rejects_bad_json() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("broken.json"), "{").unwrap();
        let mut store = FixtureStore::new();
        assert!(matches!(
            store.load_dir(dir.path()),
            Err(FixtureError::Parse { .. })
        ));
    }
}
