//! Storage document journey.

use serde::Deserialize;
use serde_json::json;

use super::{document_number, with_document_number};
use crate::error::ScenarioError;
use crate::registry::{ScenarioArgs, ScenarioContext, ScenarioModule};
use crate::rule::{InterceptRule, MockRequest, MockResponse, from_fn};

/// Draft used when a scenario gets no document number.
pub const DEFAULT_DOCUMENT: &str = "GBR-2023-SD-0123456789";

type Rules = Result<Vec<InterceptRule>, ScenarioError>;

/// Body of `POST .../catches` (one product line).
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProductBody {
    product: String,
    commodity_code: String,
    certificate_number: String,
    product_weight: String,
}

/// Body of `POST .../transport`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransportBody {
    vehicle: String,
    #[serde(default)]
    registration_number: Option<String>,
}

/// Body of `POST .../storage-facilities`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StorageFacilityBody {
    facility_name: String,
    facility_postcode: String,
}

/// Registers the storage document scenarios.
#[must_use]
pub fn module() -> ScenarioModule {
    ScenarioModule::new("storage-document")
        .scenario("SDAddProductToThisConsignment", add_product)
        .scenario("SDAddTransportDetailsTruck", transport_truck)
        .scenario("SDAddStorageFacilities", storage_facilities)
        .scenario("SDAddTransportDetailsUnauthorised", transport_unauthorised)
        .scenario("SDCheckYourInformation", check_your_information)
}

fn base(doc: &str) -> String {
    format!("/v1/storage-document/{doc}")
}

fn document_rule(doc: &str, ctx: &ScenarioContext) -> Result<InterceptRule, ScenarioError> {
    let document = with_document_number(ctx.fixtures().json("sd_document")?, doc);
    Ok(InterceptRule::get(base(doc), MockResponse::ok_json(document)))
}

fn add_product(args: &ScenarioArgs, ctx: &ScenarioContext) -> Rules {
    let doc = document_number(args, DEFAULT_DOCUMENT)?;
    let url = format!("{}/catches", base(&doc));
    let stored = ctx.ok("sd_catches")?;

    Ok(vec![
        document_rule(&doc, ctx)?,
        InterceptRule::get(url.as_str(), stored.clone()),
        InterceptRule::post(
            url.as_str(),
            from_fn(move |req: &MockRequest| {
                let body: ProductBody = req.json()?;
                let mut errors = serde_json::Map::new();
                if body.product.trim().is_empty() {
                    errors.insert("product".into(), json!("error.product.string.empty"));
                }
                if body.commodity_code.trim().is_empty() {
                    errors.insert(
                        "commodityCode".into(),
                        json!("error.commodityCode.string.empty"),
                    );
                }
                if body.certificate_number.trim().is_empty() {
                    errors.insert(
                        "certificateNumber".into(),
                        json!("error.certificateNumber.string.empty"),
                    );
                }
                if body.product_weight.trim().parse::<f64>().is_err() {
                    errors.insert("productWeight".into(), json!("error.productWeight.number.base"));
                }
                if errors.is_empty() {
                    Ok(stored.clone())
                } else {
                    Ok(MockResponse::json(400, errors.into()))
                }
            }),
        ),
    ])
}

fn transport_rules(doc: &str, ctx: &ScenarioContext, save: MockResponse) -> Rules {
    let url = format!("{}/transport", base(doc));
    Ok(vec![
        document_rule(doc, ctx)?,
        InterceptRule::get(url.as_str(), ctx.ok("sd_transport_truck")?),
        InterceptRule::post(
            url.as_str(),
            from_fn(move |req: &MockRequest| {
                let body: TransportBody = req.json()?;
                if body.vehicle == "truck"
                    && body.registration_number.as_deref().is_none_or(str::is_empty)
                {
                    return Ok(MockResponse::json(
                        400,
                        json!({ "registrationNumber": "error.registrationNumber.any.required" }),
                    ));
                }
                Ok(save.clone())
            }),
        ),
    ])
}

fn transport_truck(args: &ScenarioArgs, ctx: &ScenarioContext) -> Rules {
    let doc = document_number(args, DEFAULT_DOCUMENT)?;
    transport_rules(&doc, ctx, ctx.ok("sd_transport_truck")?)
}

fn transport_unauthorised(args: &ScenarioArgs, ctx: &ScenarioContext) -> Rules {
    let doc = document_number(args, DEFAULT_DOCUMENT)?;
    transport_rules(&doc, ctx, ctx.respond(403, "unauthorised")?)
}

fn storage_facilities(args: &ScenarioArgs, ctx: &ScenarioContext) -> Rules {
    let doc = document_number(args, DEFAULT_DOCUMENT)?;
    let url = format!("{}/storage-facilities", base(&doc));
    let stored = ctx.ok("sd_storage_facilities")?;

    Ok(vec![
        document_rule(&doc, ctx)?,
        InterceptRule::get(url.as_str(), stored.clone()),
        InterceptRule::post(
            url.as_str(),
            from_fn(move |req: &MockRequest| {
                let body: Vec<StorageFacilityBody> = req.json()?;
                if body.is_empty()
                    || body.iter().any(|f| {
                        f.facility_name.trim().is_empty() || f.facility_postcode.trim().is_empty()
                    })
                {
                    return Ok(MockResponse::json(
                        400,
                        json!({ "storageFacilities": "error.storageFacilities.array.min" }),
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
        InterceptRule::get(format!("{b}/catches"), ctx.ok("sd_catches")?),
        InterceptRule::get(format!("{b}/transport"), ctx.ok("sd_transport_truck")?),
        InterceptRule::get(
            format!("{b}/storage-facilities"),
            ctx.ok("sd_storage_facilities")?,
        ),
        InterceptRule::post(
            format!("{b}/validate"),
            MockResponse::ok_json(json!({
                "documentNumber": doc,
                "status": "COMPLETE",
                "uri": format!("/pdf/storage-documents/{doc}.pdf"),
            })),
        ),
    ])
}
