//! Scenarios shared by every journey: dashboards, outages and account state.

use crate::error::ScenarioError;
use crate::registry::{ScenarioArgs, ScenarioContext, ScenarioModule};
use crate::rule::{InterceptRule, UrlPattern};

/// Paths that keep answering while the backend is down: the banner is
/// served by a separate service.
const OUTAGE_EXEMPT: &[&str] = &["/v1/notification"];

type Rules = Result<Vec<InterceptRule>, ScenarioError>;

/// Registers the common scenarios.
#[must_use]
pub fn module() -> ScenarioModule {
    ScenarioModule::new("common")
        .scenario("DashboardCatchCertificates", |_, ctx| {
            dashboard(ctx, "catchCertificate", "documents_catch_certificates")
        })
        .scenario("DashboardProcessingStatements", |_, ctx| {
            dashboard(ctx, "processingStatement", "documents_processing_statements")
        })
        .scenario("DashboardStorageDocuments", |_, ctx| {
            dashboard(ctx, "storageDocument", "documents_storage_documents")
        })
        .scenario("DashboardNoDocuments", no_documents)
        .scenario("BackendUnavailable", backend_unavailable)
        .scenario("UserAttributesNotAccepted", |_, ctx| {
            Ok(vec![InterceptRule::get(
                "/v1/userAttributes",
                ctx.ok("user_attributes_not_accepted")?,
            )])
        })
}

fn dashboard(ctx: &ScenarioContext, doc_type: &str, fixture: &str) -> Rules {
    Ok(vec![InterceptRule::get(
        format!("/v1/documents?type={doc_type}"),
        ctx.ok(fixture)?,
    )])
}

fn no_documents(_args: &ScenarioArgs, ctx: &ScenarioContext) -> Rules {
    Ok(vec![InterceptRule::get("/v1/documents", ctx.ok("documents_empty")?)])
}

fn backend_unavailable(_args: &ScenarioArgs, ctx: &ScenarioContext) -> Rules {
    let unavailable = ctx.respond(503, "service_unavailable")?;
    Ok(vec![InterceptRule::any(
        UrlPattern::predicate(|req| {
            req.path.starts_with("/v1/") && !OUTAGE_EXEMPT.contains(&req.path.as_str())
        }),
        unavailable,
    )])
}
