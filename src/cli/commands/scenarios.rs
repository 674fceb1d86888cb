//! `mockgate scenarios`: inspect and verify the scenario catalogue.

use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info};

use crate::cli::args::{OutputFormat, ScenariosCheckArgs, ScenariosListArgs};
use crate::config::UnhandledPolicy;
use crate::dispatch::{DispatchOutcome, ScenarioDispatcher};
use crate::error::{ConfigError, MockGateError};
use crate::fixtures::FixtureStore;
use crate::registry::Registry;
use crate::scenarios;
use crate::server::MockServer;

#[derive(Debug, Serialize)]
struct ListedScenario<'a> {
    module: &'static str,
    id: &'a str,
}

#[derive(Debug, Serialize)]
struct CheckedScenario {
    id: String,
    rules: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Print registered scenario ids, grouped by module.
///
/// # Errors
///
/// Returns an error if the catalogue has duplicate ids or `--module` names
/// no module.
pub fn list(args: &ScenariosListArgs) -> Result<(), MockGateError> {
    let registry = scenarios::registry()?;
    let listed = listing(&registry, args.module.as_deref())?;

    match args.format {
        OutputFormat::Human => {
            let mut current = None;
            for entry in &listed {
                if current != Some(entry.module) {
                    println!("{}", entry.module);
                    current = Some(entry.module);
                }
                println!("  {}", entry.id);
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&listed)?);
        }
    }
    Ok(())
}

fn listing<'a>(
    registry: &'a Registry,
    module: Option<&str>,
) -> Result<Vec<ListedScenario<'a>>, ConfigError> {
    let listed: Vec<ListedScenario<'a>> = registry
        .listing()
        .into_iter()
        .filter(|(m, _)| module.is_none_or(|wanted| wanted == *m))
        .map(|(module, id)| ListedScenario {
            module,
            id: id.as_str(),
        })
        .collect();

    match module {
        Some(wanted) if listed.is_empty() => Err(ConfigError::InvalidValue {
            field: "--module".to_string(),
            value: wanted.to_string(),
            expected: format!("one of: {}", module_names().join(", ")),
        }),
        _ => Ok(listed),
    }
}

fn module_names() -> Vec<&'static str> {
    scenarios::all_modules().iter().map(|m| m.name()).collect()
}

/// Activate every registered scenario once against an in-memory server.
///
/// Catches duplicate ids, missing fixtures and factories that reject their
/// default arguments without starting a listener.
///
/// # Errors
///
/// Returns the registry error for duplicate ids, or the first dispatch
/// error after reporting every failing scenario.
pub fn check(args: &ScenariosCheckArgs) -> Result<(), MockGateError> {
    let registry = Arc::new(scenarios::registry()?);
    let fixtures = Arc::new(FixtureStore::with_overrides(args.fixtures.as_deref())?);
    let server = Arc::new(MockServer::in_memory(UnhandledPolicy::Error));
    let dispatcher = ScenarioDispatcher::new(server, Arc::clone(&registry), fixtures, true);

    let mut results = Vec::with_capacity(registry.len());
    let mut first_error = None;
    for id in registry.ids() {
        let url = format!("/?testCaseId={id}");
        match dispatcher.dispatch(&url) {
            Ok(DispatchOutcome::Activated { rules, .. }) => {
                info!(scenario = %id, rules, "scenario ok");
                results.push(CheckedScenario {
                    id: id.to_string(),
                    rules: Some(rules),
                    error: None,
                });
            }
            Ok(other) => {
                // An id with query metacharacters never reaches its factory.
                let message = format!("unexpected outcome {other:?}");
                error!(scenario = %id, "{message}");
                results.push(CheckedScenario {
                    id: id.to_string(),
                    rules: None,
                    error: Some(message),
                });
            }
            Err(e) => {
                error!(scenario = %id, error = %e, "scenario failed");
                results.push(CheckedScenario {
                    id: id.to_string(),
                    rules: None,
                    error: Some(e.to_string()),
                });
                first_error.get_or_insert(e);
            }
        }
    }

    match args.format {
        OutputFormat::Human => {
            for r in &results {
                match (&r.error, r.rules) {
                    (Some(e), _) => println!("FAIL {}: {e}", r.id),
                    (None, Some(rules)) => println!("ok   {} ({rules} rules)", r.id),
                    (None, None) => println!("ok   {}", r.id),
                }
            }
            let failed = results.iter().filter(|r| r.error.is_some()).count();
            println!("{} scenarios, {failed} failed", results.len());
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&results)?);
        }
    }

    first_error.map_or(Ok(()), |e| Err(e.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::parse_navigation;

    fn navigable(id: &str) -> bool {
        parse_navigation(&format!("/?testCaseId={id}"))
            .ok()
            .flatten()
            .is_some_and(|nav| nav.scenario.as_str() == id)
    }

    #[test]
    fn listing_filters_by_module() {
        let registry = scenarios::registry().unwrap();
        let listed = listing(&registry, Some("processing-statement")).unwrap();
        assert!(!listed.is_empty());
        assert!(listed.iter().all(|s| s.module == "processing-statement"));
        assert!(listed.iter().any(|s| s.id == "PSAddCatchDetailsRemoveCatch"));
    }

    #[test]
    fn listing_unknown_module_names_the_known_ones() {
        let registry = scenarios::registry().unwrap();
        let err = listing(&registry, Some("no-such-journey")).unwrap_err();
        assert!(err.to_string().contains("catch-certificate"));
    }

    #[test]
    fn listing_everything() {
        let registry = scenarios::registry().unwrap();
        assert_eq!(listing(&registry, None).unwrap().len(), registry.len());
    }

    #[test]
    fn every_id_is_navigable() {
        let registry = scenarios::registry().unwrap();
        for id in registry.ids() {
            assert!(navigable(id.as_str()), "{id}");
        }
    }

    #[test]
    fn check_passes_for_embedded_catalogue() {
        let args = ScenariosCheckArgs {
            fixtures: None,
            format: OutputFormat::Json,
        };
        check(&args).unwrap();
    }

    #[test]
    fn check_fails_when_an_override_breaks_a_fixture() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("countries.json"), "{").unwrap();
        let args = ScenariosCheckArgs {
            fixtures: Some(dir.path().to_path_buf()),
            format: OutputFormat::Human,
        };
        assert!(matches!(check(&args), Err(MockGateError::Fixture(_))));
    }
}
