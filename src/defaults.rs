//! Default rule set
//!
//! The baseline every scenario starts from: notification banner,
//! reference data, identity details and user attributes. Installed first,
//! so scenario rules for the same method and URL shadow these.

use tracing::debug;

use crate::error::FixtureError;
use crate::fixtures::FixtureStore;
use crate::rule::{InterceptRule, MockRequest, from_fn};
use crate::server::MockServer;

/// Builds the default rules from `fixtures`.
///
/// # Errors
///
/// Returns [`FixtureError::NotFound`] if a baseline fixture is missing.
pub fn default_rules(fixtures: &FixtureStore) -> Result<Vec<InterceptRule>, FixtureError> {
    let user_attributes = fixtures.response(200, "user_attributes")?;

    Ok(vec![
        InterceptRule::get("/v1/notification", fixtures.response(200, "notification")?),
        InterceptRule::get(
            "/reference/api/v1/countries",
            fixtures.response(200, "countries")?,
        ),
        InterceptRule::get("/reference/api/v1/species", fixtures.response(200, "species")?),
        InterceptRule::get(
            "/reference/api/v1/commodities",
            fixtures.response(200, "commodity_codes")?,
        ),
        InterceptRule::get(
            "/reference/api/v1/presentations",
            fixtures.response(200, "presentations")?,
        ),
        InterceptRule::get("/reference/api/v1/states", fixtures.response(200, "states")?),
        InterceptRule::get("/v1/user/details", fixtures.response(200, "user_details")?),
        InterceptRule::get(
            "/v1/account/details",
            fixtures.response(200, "account_details")?,
        ),
        InterceptRule::get("/v1/userAttributes", user_attributes.clone()),
        // Saving an attribute answers with the stored attributes.
        InterceptRule::post(
            "/v1/userAttributes",
            from_fn(move |req: &MockRequest| {
                let _: serde_json::Value = req.json()?;
                Ok(user_attributes.clone())
            }),
        ),
    ])
}

/// Installs the default rules on `server`.
///
/// A default whose method and pattern are already installed is skipped, so
/// calling this again without a `reset()` never shadows a scenario rule.
///
/// # Errors
///
/// Returns [`FixtureError::NotFound`] if a baseline fixture is missing.
pub fn install_defaults(server: &MockServer, fixtures: &FixtureStore) -> Result<(), FixtureError> {
    if !server.is_active() {
        return Ok(());
    }
    let installed = server.installed_routes();
    let rules: Vec<InterceptRule> = default_rules(fixtures)?
        .into_iter()
        .filter(|rule| !installed.contains(&rule.route()))
        .collect();
    debug!(rules = rules.len(), "installing default rules");
    if !rules.is_empty() {
        server.use_rules(rules);
    }
    Ok(())
}
