//! Control routes under `/__mockgate/`.
//!
//! Lets an out-of-process browser runner select scenarios and read the
//! journals. Registered as explicit routes, so they always take precedence
//! over the interception fallback.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use super::ServerShared;
use crate::error::DispatchError;

/// Body of `POST /__mockgate/dispatch`.
#[derive(Debug, Deserialize)]
pub struct DispatchBody {
    /// Navigation URL carrying `testCaseId` and optional `args`
    pub url: String,
}

pub(super) fn routes() -> Router<Arc<ServerShared>> {
    Router::new()
        .route("/__mockgate/dispatch", post(dispatch))
        .route("/__mockgate/reset-state", post(reset_state))
        .route("/__mockgate/failures", get(failures))
        .route("/__mockgate/requests", get(requests))
        .route("/__mockgate/health", get(health))
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

const fn dispatch_status(err: &DispatchError) -> StatusCode {
    match err {
        DispatchError::InvalidUrl { .. } => StatusCode::BAD_REQUEST,
        DispatchError::UnknownScenario { .. } => StatusCode::NOT_FOUND,
        DispatchError::Defaults(_) | DispatchError::Factory { .. } => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

async fn dispatch(
    State(shared): State<Arc<ServerShared>>,
    Json(body): Json<DispatchBody>,
) -> Response {
    let Some(dispatcher) = shared.dispatcher() else {
        return error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "no scenario dispatcher is attached to this server",
        );
    };
    match dispatcher.dispatch(&body.url) {
        Ok(outcome) => Json(outcome).into_response(),
        Err(e) => {
            warn!(url = %body.url, error = %e, "dispatch via control route failed");
            error_response(dispatch_status(&e), e.to_string())
        }
    }
}

async fn reset_state(State(shared): State<Arc<ServerShared>>) -> Response {
    match shared.dispatcher() {
        Some(dispatcher) => {
            dispatcher.reset_all_scenario_state();
            StatusCode::NO_CONTENT.into_response()
        }
        None => error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "no scenario dispatcher is attached to this server",
        ),
    }
}

async fn failures(State(shared): State<Arc<ServerShared>>) -> Response {
    Json(shared.journal().failures()).into_response()
}

async fn requests(State(shared): State<Arc<ServerShared>>) -> Response {
    Json(shared.journal().requests()).into_response()
}

async fn health(State(shared): State<Arc<ServerShared>>) -> Response {
    let scenario = shared
        .dispatcher()
        .and_then(|d| d.current_scenario())
        .map(|id| id.to_string());
    Json(json!({
        "status": "ok",
        "rules": shared.rule_count(),
        "scenario": scenario,
    }))
    .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UnhandledPolicy;
    use crate::server::MockServer;
    use axum::body::Body;
    use axum::http::Request;
    use tower::util::ServiceExt;

    async fn json_body(resp: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn dispatch_without_dispatcher_is_503() {
        let server = MockServer::in_memory(UnhandledPolicy::Error);
        let req = Request::builder()
            .method("POST")
            .uri("/__mockgate/dispatch")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"url":"/?testCaseId=X"}"#))
            .unwrap();
        let resp = server.router().unwrap().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn dispatch_rejects_missing_url_field() {
        let server = MockServer::in_memory(UnhandledPolicy::Error);
        let req = Request::builder()
            .method("POST")
            .uri("/__mockgate/dispatch")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"href":"/"}"#))
            .unwrap();
        let resp = server.router().unwrap().oneshot(req).await.unwrap();
        assert!(resp.status().is_client_error());
    }

    #[tokio::test]
    async fn health_reports_rule_count() {
        let server = MockServer::in_memory(UnhandledPolicy::Error);
        server.use_rules(vec![crate::rule::InterceptRule::get(
            "/v1/a",
            crate::rule::MockResponse::empty(200),
        )]);
        let req = Request::builder()
            .uri("/__mockgate/health")
            .body(Body::empty())
            .unwrap();
        let resp = server.router().unwrap().oneshot(req).await.unwrap();
        let body = json_body(resp).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["rules"], 1);
        assert!(body["scenario"].is_null());
    }

    #[tokio::test]
    async fn failures_lists_unhandled_requests() {
        let server = MockServer::in_memory(UnhandledPolicy::Error);
        let router = server.router().unwrap();
        let miss = Request::builder()
            .uri("/v1/missing")
            .body(Body::empty())
            .unwrap();
        router.clone().oneshot(miss).await.unwrap();

        let req = Request::builder()
            .uri("/__mockgate/failures")
            .body(Body::empty())
            .unwrap();
        let body = json_body(router.oneshot(req).await.unwrap()).await;
        assert_eq!(body[0]["path"], "/v1/missing");
        assert_eq!(body[0]["kind"], "unhandled");
    }

    #[test]
    fn dispatch_error_statuses() {
        assert_eq!(
            dispatch_status(&DispatchError::UnknownScenario {
                id: "X".to_string(),
                suggestion: None
            }),
            StatusCode::NOT_FOUND
        );
    }
}
