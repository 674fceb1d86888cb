//! Processing statement journey.

use serde::Deserialize;
use serde_json::json;

use super::{document_number, with_document_number};
use crate::error::ScenarioError;
use crate::registry::{ScenarioArgs, ScenarioContext, ScenarioModule};
use crate::rule::{InterceptRule, MockRequest, MockResponse, from_fn};
use crate::state::{Step, Transition};

/// Draft used when a scenario gets no document number.
pub const DEFAULT_DOCUMENT: &str = "GBR-2023-PS-0123456789";

type Rules = Result<Vec<InterceptRule>, ScenarioError>;

/// Body of `POST .../catches`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CatchBody {
    species: String,
    catch_certificate_number: String,
    total_weight_landed: String,
    export_weight_before_processing: String,
    export_weight_after_processing: String,
}

impl CatchBody {
    fn weights_are_numeric(&self) -> bool {
        [
            &self.total_weight_landed,
            &self.export_weight_before_processing,
            &self.export_weight_after_processing,
        ]
        .iter()
        .all(|w| w.trim().parse::<f64>().is_ok())
    }
}

/// Body of `POST .../plant-details`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlantDetailsBody {
    plant_approval_number: String,
    plant_name: String,
}

/// Registers the processing statement scenarios.
#[must_use]
pub fn module() -> ScenarioModule {
    ScenarioModule::new("processing-statement")
        .scenario("PSAddCatchDetails", add_catch_details)
        .scenario("PSAddCatchDetailsRemoveCatch", remove_catch)
        .scenario(
            "PSAddConsignmentDetailsSaveAndContinueUnauthorised",
            consignment_unauthorised_on_second_save,
        )
        .scenario("PSAddPlantDetails", plant_details)
        .scenario("PSCheckYourInformation", check_your_information)
}

fn base(doc: &str) -> String {
    format!("/v1/processing-statement/{doc}")
}

fn document_rule(doc: &str, ctx: &ScenarioContext) -> Result<InterceptRule, ScenarioError> {
    let document = with_document_number(ctx.fixtures().json("ps_document")?, doc);
    Ok(InterceptRule::get(base(doc), MockResponse::ok_json(document)))
}

fn add_catch_details(args: &ScenarioArgs, ctx: &ScenarioContext) -> Rules {
    let doc = document_number(args, DEFAULT_DOCUMENT)?;
    let catches = format!("{}/catches", base(&doc));
    let after_add = ctx.ok("ps_catches_two")?;
    let rejected = MockResponse::json(
        400,
        json!({ "totalWeightLanded": "error.totalWeightLanded.number.base" }),
    );

    Ok(vec![
        document_rule(&doc, ctx)?,
        InterceptRule::get(catches.as_str(), ctx.ok("ps_catches_one")?),
        InterceptRule::post(
            catches.as_str(),
            from_fn(move |req: &MockRequest| {
                let body: CatchBody = req.json()?;
                if body.species.is_empty()
                    || body.catch_certificate_number.is_empty()
                    || !body.weights_are_numeric()
                {
                    return Ok(rejected.clone());
                }
                Ok(after_add.clone())
            }),
        ),
    ])
}

/// The catch list alternates between two rows and one row: the page reads
/// it, the user removes a catch, the page reads it again.
fn remove_catch(args: &ScenarioArgs, ctx: &ScenarioContext) -> Rules {
    let doc = document_number(args, DEFAULT_DOCUMENT)?;
    let catches = format!("{}/catches", base(&doc));
    let two = ctx.ok("ps_catches_two")?;
    let one = ctx.ok("ps_catches_one")?;
    let listing = ctx.sequence("ps-remove-catch", Transition::Alternate);

    Ok(vec![
        document_rule(&doc, ctx)?,
        InterceptRule::get(
            catches.as_str(),
            from_fn(move |_req: &MockRequest| {
                Ok(match listing.advance() {
                    Step::First => two.clone(),
                    Step::Second => one.clone(),
                })
            }),
        ),
        InterceptRule::delete(
            format!("{catches}/:catchId"),
            from_fn(|req: &MockRequest| {
                Ok(MockResponse::ok_json(json!({ "removed": req.param("catchId")? })))
            }),
        ),
    ])
}

/// First save succeeds; every later save is refused.
fn consignment_unauthorised_on_second_save(args: &ScenarioArgs, ctx: &ScenarioContext) -> Rules {
    let doc = document_number(args, DEFAULT_DOCUMENT)?;
    let consignment = format!("{}/consignment", base(&doc));
    let saved = ctx.ok("ps_consignment")?;
    let forbidden = ctx.respond(403, "unauthorised")?;
    let saves = ctx.sequence("ps-consignment-save", Transition::Latch);

    Ok(vec![
        document_rule(&doc, ctx)?,
        InterceptRule::get(consignment.as_str(), ctx.ok("ps_consignment")?),
        InterceptRule::post(
            consignment.as_str(),
            from_fn(move |_req: &MockRequest| {
                Ok(match saves.advance() {
                    Step::First => saved.clone(),
                    Step::Second => forbidden.clone(),
                })
            }),
        ),
    ])
}

fn plant_details(args: &ScenarioArgs, ctx: &ScenarioContext) -> Rules {
    let doc = document_number(args, DEFAULT_DOCUMENT)?;
    let url = format!("{}/plant-details", base(&doc));
    let stored = ctx.ok("ps_plant_details")?;

    Ok(vec![
        document_rule(&doc, ctx)?,
        InterceptRule::get(url.as_str(), stored.clone()),
        InterceptRule::post(
            url.as_str(),
            from_fn(move |req: &MockRequest| {
                let body: PlantDetailsBody = req.json()?;
                if body.plant_approval_number.trim().is_empty()
                    || body.plant_name.trim().is_empty()
                {
                    return Ok(MockResponse::json(
                        400,
                        json!({ "plantApprovalNumber": "error.plantApprovalNumber.string.empty" }),
                    ));
                }
                Ok(stored.clone())
            }),
        ),
    ])
}

fn check_your_information(args: &ScenarioArgs, ctx: &ScenarioContext) -> Rules {
    let doc = document_number(args, DEFAULT_DOCUMENT)?;
    let b = base(&doc);
    Ok(vec![
        document_rule(&doc, ctx)?,
        InterceptRule::get(format!("{b}/catches"), ctx.ok("ps_catches_one")?),
        InterceptRule::get(format!("{b}/consignment"), ctx.ok("ps_consignment")?),
        InterceptRule::get(format!("{b}/plant-details"), ctx.ok("ps_plant_details")?),
        InterceptRule::post(
            format!("{b}/validate"),
            MockResponse::ok_json(json!({
                "documentNumber": doc,
                "status": "COMPLETE",
                "uri": format!("/pdf/processing-statements/{doc}.pdf"),
            })),
        ),
    ])
}
