//! Catch certificate journey.

use serde::Deserialize;
use serde_json::json;

use super::{document_number, with_document_number};
use crate::error::ScenarioError;
use crate::registry::{ScenarioArgs, ScenarioContext, ScenarioModule};
use crate::rule::{InterceptRule, MockRequest, MockResponse, from_fn};

/// Draft used when a scenario gets no document number.
pub const DEFAULT_DOCUMENT: &str = "GBR-2023-CC-0123456789";

/// Submission attempts that fail before `CCCheckYourInformationSubmitRetry`
/// succeeds, unless the second argument says otherwise.
const DEFAULT_FAILED_SUBMISSIONS: u64 = 1;

type Rules = Result<Vec<InterceptRule>, ScenarioError>;

/// Body of `POST .../exporter-details`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExporterDetailsBody {
    exporter_full_name: String,
    #[serde(default)]
    exporter_company_name: Option<String>,
    address_one: String,
    #[serde(default)]
    town_city: Option<String>,
    postcode: String,
}

impl ExporterDetailsBody {
    fn is_complete(&self) -> bool {
        [&self.exporter_full_name, &self.address_one, &self.postcode]
            .iter()
            .all(|field| !field.trim().is_empty())
    }
}

/// Registers the catch certificate scenarios.
#[must_use]
pub fn module() -> ScenarioModule {
    ScenarioModule::new("catch-certificate")
        .scenario("CCAddExporterDetails", |args, ctx| exporter_details(args, ctx, false))
        .scenario("CCAddExporterDetailsValidationError", |args, ctx| {
            exporter_details(args, ctx, true)
        })
        .scenario("CCCheckYourInformation", check_your_information)
        .scenario(
            "CCCheckYourInformationValidationFailures",
            check_your_information_validation_failures,
        )
        .scenario("CCCheckYourInformationSubmitRetry", submit_retry)
        .scenario("DoYouHaveAdditionalTransportTypes", transport_types)
        .scenario(
            "DoYouHaveAdditionalTransportTypesEmptyTransport",
            transport_types_empty_first,
        )
        .scenario("CCAddLandingsUnauthorised", landings_unauthorised)
}

fn base(doc: &str) -> String {
    format!("/v1/export-certificates/{doc}")
}

fn exporter_details(args: &ScenarioArgs, ctx: &ScenarioContext, reject: bool) -> Rules {
    let doc = document_number(args, DEFAULT_DOCUMENT)?;
    let url = format!("{}/exporter-details", base(&doc));
    let errors = ctx.respond(400, "cc_exporter_details_errors")?;

    Ok(vec![
        InterceptRule::get(url.as_str(), ctx.ok("cc_exporter_details")?),
        InterceptRule::post(
            url.as_str(),
            from_fn(move |req: &MockRequest| {
                let body: ExporterDetailsBody = req.json()?;
                if reject || !body.is_complete() {
                    return Ok(errors.clone());
                }
                Ok(MockResponse::ok_json(json!({
                    "exporterFullName": body.exporter_full_name,
                    "exporterCompanyName": body.exporter_company_name,
                    "addressOne": body.address_one,
                    "townCity": body.town_city,
                    "postcode": body.postcode,
                })))
            }),
        ),
    ])
}

/// Everything the summary page reads for `doc`.
fn summary_rules(doc: &str, ctx: &ScenarioContext) -> Rules {
    let document = with_document_number(ctx.fixtures().json("cc_document")?, doc);
    Ok(vec![
        InterceptRule::get(
            format!("/v1/catch-certificates/{doc}"),
            MockResponse::ok_json(document),
        ),
        InterceptRule::get(
            format!("{}/exporter-details", base(doc)),
            ctx.ok("cc_exporter_details")?,
        ),
        InterceptRule::get(format!("{}/landings", base(doc)), ctx.ok("cc_landings")?),
        InterceptRule::get(
            format!("{}/transportations", base(doc)),
            ctx.ok("cc_transport")?,
        ),
    ])
}

fn submitted(doc: &str, ctx: &ScenarioContext) -> Result<MockResponse, ScenarioError> {
    let mut body = with_document_number(ctx.fixtures().json("cc_submit_success")?, doc);
    if let Some(obj) = body.as_object_mut() {
        obj.insert(
            "uri".to_string(),
            json!(format!("/pdf/export-certificates/{doc}.pdf")),
        );
    }
    Ok(MockResponse::ok_json(body))
}

fn check_your_information(args: &ScenarioArgs, ctx: &ScenarioContext) -> Rules {
    let doc = document_number(args, DEFAULT_DOCUMENT)?;
    let mut rules = summary_rules(&doc, ctx)?;
    rules.push(InterceptRule::post(
        format!("{}/validate", base(&doc)),
        submitted(&doc, ctx)?,
    ));
    Ok(rules)
}

fn check_your_information_validation_failures(args: &ScenarioArgs, ctx: &ScenarioContext) -> Rules {
    let doc = document_number(args, DEFAULT_DOCUMENT)?;
    let mut rules = summary_rules(&doc, ctx)?;
    rules.push(InterceptRule::post(
        format!("{}/validate", base(&doc)),
        ctx.respond(400, "cc_submit_validation_failures")?,
    ));
    Ok(rules)
}

/// The first submissions fail with 503; later ones succeed.
///
/// `args[1]` sets how many attempts fail.
fn submit_retry(args: &ScenarioArgs, ctx: &ScenarioContext) -> Rules {
    let doc = document_number(args, DEFAULT_DOCUMENT)?;
    let failures = match args.non_empty(1) {
        Some(n) => n.parse::<u64>().map_err(|e| ScenarioError::InvalidArgument {
            value: n.to_string(),
            reason: format!("failed submission count: {e}"),
        })?,
        None => DEFAULT_FAILED_SUBMISSIONS,
    };

    let attempts = ctx.counter("cc-submit-attempts");
    let unavailable = ctx.respond(503, "service_unavailable")?;
    let success = submitted(&doc, ctx)?;

    let mut rules = summary_rules(&doc, ctx)?;
    rules.push(InterceptRule::post(
        format!("{}/validate", base(&doc)),
        from_fn(move |_req: &MockRequest| {
            if attempts.increment() <= failures {
                Ok(unavailable.clone())
            } else {
                Ok(success.clone())
            }
        }),
    ));
    Ok(rules)
}

fn transport_types(args: &ScenarioArgs, ctx: &ScenarioContext) -> Rules {
    let doc = document_number(args, DEFAULT_DOCUMENT)?;
    Ok(vec![InterceptRule::get(
        format!("{}/transport-types", base(&doc)),
        ctx.ok("cc_transport_types")?,
    )])
}

/// The first read finds no transport; the page then re-reads the list.
fn transport_types_empty_first(args: &ScenarioArgs, ctx: &ScenarioContext) -> Rules {
    let doc = document_number(args, DEFAULT_DOCUMENT)?;
    let mut rules = transport_types(args, ctx)?;
    rules.push(
        InterceptRule::get(
            format!("{}/transport-types", base(&doc)),
            MockResponse::ok_json(json!([])),
        )
        .once(),
    );
    Ok(rules)
}

fn landings_unauthorised(args: &ScenarioArgs, ctx: &ScenarioContext) -> Rules {
    let doc = document_number(args, DEFAULT_DOCUMENT)?;
    let forbidden = ctx.respond(403, "unauthorised")?;
    let landings = format!("{}/landings", base(&doc));
    Ok(vec![
        InterceptRule::get(landings.as_str(), forbidden.clone()),
        InterceptRule::post(landings.as_str(), forbidden),
    ])
}
