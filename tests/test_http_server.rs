mod common;

use common::TestServer;
use mockgate::config::UnhandledPolicy;
use serde_json::{Value, json};

const PS_DOC: &str = "GBR-2023-PS-0123456789";

// ============================================================================
// Dispatch
// ============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn dispatch_route_activates_scenario() {
    let server = TestServer::start_default().await;

    let resp = server
        .navigate("/create-catch-certificate/catch-certificates?testCaseId=DashboardNoDocuments")
        .await;
    assert_eq!(resp.status(), 200);
    let outcome: Value = resp.json().await.unwrap();
    assert_eq!(outcome["outcome"], "activated");
    assert_eq!(outcome["scenario"], "DashboardNoDocuments");

    let health = server.get_json("/__mockgate/health").await;
    assert_eq!(health["scenario"], "DashboardNoDocuments");
    assert_eq!(health["rules"], outcome["rules"]);

    server.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn navigation_without_scenario_changes_nothing() {
    let server = TestServer::start_default().await;
    server.navigate("/?testCaseId=DashboardNoDocuments").await;
    let before = server.server.rules_installed();

    let outcome: Value = server
        .navigate("/create-processing-statement/add-catch-details")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(outcome["outcome"], "no_scenario");
    assert_eq!(server.server.rules_installed(), before);

    server.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn unknown_scenario_installs_defaults_only() {
    let server = TestServer::start_default().await;

    let outcome: Value = server
        .navigate("/?testCaseId=PSAddCatchDetailsRemoveCatc")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(outcome["outcome"], "defaults_only");
    assert_eq!(outcome["suggestion"], "PSAddCatchDetailsRemoveCatch");

    let countries = server.get("/reference/api/v1/countries").await;
    assert_eq!(countries.status(), 200);

    let catches = server
        .get(&format!("/v1/processing-statement/{PS_DOC}/catches"))
        .await;
    assert_eq!(catches.status(), 500);

    server.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn strict_mode_rejects_unknown_scenario() {
    let server = TestServer::start(UnhandledPolicy::Error, true).await;
    server.navigate("/?testCaseId=DashboardNoDocuments").await;

    let resp = server.navigate("/?testCaseId=NoSuchScenario").await;
    assert_eq!(resp.status(), 404);
    let body: Value = resp.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("NoSuchScenario"));

    // The previous scenario is still active.
    let health = server.get_json("/__mockgate/health").await;
    assert_eq!(health["scenario"], "DashboardNoDocuments");

    server.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn args_are_used_literally() {
    let server = TestServer::start_default().await;
    let doc = "GBR-2022-CC-D1630FF88";

    let outcome: Value = server
        .navigate(&format!(
            "/create-catch-certificate/{doc}/check-your-information?testCaseId=CCCheckYourInformation&args={doc}"
        ))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(outcome["args"], json!([doc]));

    let document = server
        .get_json(&format!("/v1/catch-certificates/{doc}"))
        .await;
    assert_eq!(document["documentNumber"], doc);

    // Another document number has no rule.
    let other = server
        .get("/v1/catch-certificates/GBR-2022-CC-000000000")
        .await;
    assert_eq!(other.status(), 500);

    server.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn encoded_document_number_matches_its_rules() {
    let server = TestServer::start_default().await;

    let outcome: Value = server
        .navigate("/?testCaseId=CCCheckYourInformation&args=GBR%202022")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(outcome["args"], json!(["GBR 2022"]));

    let resp = server.get("/v1/catch-certificates/GBR%202022").await;
    assert_eq!(resp.status(), 200);
    let document: Value = resp.json().await.unwrap();
    assert_eq!(document["documentNumber"], "GBR 2022");

    server.shutdown().await;
}

// ============================================================================
// Sequenced responses
// ============================================================================

async fn catch_count(server: &TestServer) -> usize {
    server
        .get_json(&format!("/v1/processing-statement/{PS_DOC}/catches"))
        .await["catches"]
        .as_array()
        .unwrap()
        .len()
}

#[tokio::test(flavor = "multi_thread")]
async fn remove_catch_alternates_and_restarts_on_navigation() {
    let server = TestServer::start_default().await;
    server
        .navigate("/?testCaseId=PSAddCatchDetailsRemoveCatch")
        .await;

    assert_eq!(catch_count(&server).await, 2);
    let removed = server
        .client
        .delete(server.url(&format!(
            "/v1/processing-statement/{PS_DOC}/catches/catch-1"
        )))
        .send()
        .await
        .unwrap();
    assert_eq!(removed.status(), 200);
    assert_eq!(catch_count(&server).await, 1);
    assert_eq!(catch_count(&server).await, 2);

    // Navigating again starts the sequence from the beginning.
    server
        .navigate("/?testCaseId=PSAddCatchDetailsRemoveCatch")
        .await;
    assert_eq!(catch_count(&server).await, 2);
    assert_eq!(catch_count(&server).await, 1);

    server.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn reset_state_route_restarts_sequences() {
    let server = TestServer::start_default().await;
    server
        .navigate("/?testCaseId=PSAddCatchDetailsRemoveCatch")
        .await;
    assert_eq!(catch_count(&server).await, 2);

    let reset = server
        .client
        .post(server.url("/__mockgate/reset-state"))
        .send()
        .await
        .unwrap();
    assert_eq!(reset.status(), 204);
    assert_eq!(catch_count(&server).await, 2);

    server.shutdown().await;
}

// ============================================================================
// Unhandled requests
// ============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn unhandled_request_is_500_with_diagnostic() {
    let server = TestServer::start_default().await;
    server.navigate("/?testCaseId=DashboardNoDocuments").await;

    let resp = server.get("/v1/not-mocked?x=1").await;
    assert_eq!(resp.status(), 500);
    let text = resp.text().await.unwrap();
    assert!(text.contains("GET"), "{text}");
    assert!(text.contains("/v1/not-mocked"), "{text}");

    let failures = server.get_json("/__mockgate/failures").await;
    let failures = failures.as_array().unwrap();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0]["kind"], "unhandled");
    assert_eq!(failures[0]["path"], "/v1/not-mocked");

    server.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn warn_policy_answers_404() {
    let server = TestServer::start(UnhandledPolicy::Warn, false).await;
    let resp = server.get("/v1/not-mocked").await;
    assert_eq!(resp.status(), 404);
    server.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn request_journal_lists_answered_calls() {
    let server = TestServer::start_default().await;
    server.navigate("/?testCaseId=DashboardNoDocuments").await;
    server.get("/v1/notification").await;

    let requests = server.get_json("/__mockgate/requests").await;
    let paths: Vec<&str> = requests
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|r| r["path"].as_str())
        .collect();
    assert!(paths.contains(&"/v1/notification"), "{paths:?}");

    server.shutdown().await;
}

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn shutdown_is_idempotent_and_closes_listener() {
    let server = TestServer::start_default().await;
    let url = server.url("/__mockgate/health");
    let client = server.client.clone();
    let inner = std::sync::Arc::clone(&server.server);

    server.shutdown().await;
    inner.shutdown();
    assert!(inner.is_shut_down());
    assert!(client.get(url).send().await.is_err());
}
