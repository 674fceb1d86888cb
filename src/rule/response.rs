//! Canned responses returned by intercept rules.

use axum::body::Body;
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::Value;

/// Response body variants the application under test can receive.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    /// No body
    Empty,
    /// JSON payload (`application/json`)
    Json(Value),
    /// Plain text payload (`text/plain`)
    Text(String),
}

/// A response produced by a responder.
#[derive(Debug, Clone, PartialEq)]
pub struct MockResponse {
    /// HTTP status code
    pub status: u16,
    /// Extra headers, applied after the content type
    pub headers: Vec<(String, String)>,
    /// Response body
    pub body: ResponseBody,
}

impl MockResponse {
    /// JSON response with the given status.
    #[must_use]
    pub const fn json(status: u16, value: Value) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: ResponseBody::Json(value),
        }
    }

    /// `200 OK` JSON response.
    #[must_use]
    pub const fn ok_json(value: Value) -> Self {
        Self::json(200, value)
    }

    /// Plain-text response with the given status.
    #[must_use]
    pub fn text(status: u16, text: impl Into<String>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: ResponseBody::Text(text.into()),
        }
    }

    /// Bodiless response with the given status.
    #[must_use]
    pub const fn empty(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: ResponseBody::Empty,
        }
    }

    /// Adds a response header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Returns the JSON body, if this is a JSON response.
    #[must_use]
    pub const fn json_body(&self) -> Option<&Value> {
        match &self.body {
            ResponseBody::Json(v) => Some(v),
            _ => None,
        }
    }
}

impl IntoResponse for MockResponse {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let (content_type, body) = match self.body {
            ResponseBody::Empty => (None, Body::empty()),
            ResponseBody::Json(value) => (
                Some("application/json"),
                Body::from(serde_json::to_vec(&value).unwrap_or_default()),
            ),
            ResponseBody::Text(text) => (Some("text/plain; charset=utf-8"), Body::from(text)),
        };

        let mut response = Response::new(body);
        *response.status_mut() = status;
        let headers = response.headers_mut();
        if let Some(ct) = content_type {
            headers.insert(
                axum::http::header::CONTENT_TYPE,
                HeaderValue::from_static(ct),
            );
        }
        for (name, value) in self.headers {
            // Header names and values come from scenario code; skip anything
            // that is not a legal header rather than failing the response.
            if let (Ok(name), Ok(value)) = (
                HeaderName::try_from(name.as_str()),
                HeaderValue::try_from(value.as_str()),
            ) {
                headers.insert(name, value);
            }
        }
        response
    }
}
