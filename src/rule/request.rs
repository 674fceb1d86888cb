//! Intercepted request representation.

use std::collections::BTreeMap;

use axum::http::HeaderMap;
use bytes::Bytes;
use serde::de::DeserializeOwned;

use super::method::HttpMethod;
use crate::error::RespondError;

/// Path parameters captured by a template pattern, e.g. `:documentNumber`.
pub type PathParams = BTreeMap<String, String>;

/// A request issued by the application under test, fully buffered.
#[derive(Debug, Clone)]
pub struct MockRequest {
    /// Request method
    pub method: HttpMethod,
    /// Request path, without query string
    pub path: String,
    /// Raw query string, if any
    pub query: Option<String>,
    /// Request headers
    pub headers: HeaderMap,
    /// Request body
    pub body: Bytes,
    /// Parameters captured by the matching rule's pattern
    pub params: PathParams,
}

impl MockRequest {
    /// Creates a bodiless request for `method` and `path_and_query`.
    ///
    /// The query string, if present, is split off the path.
    #[must_use]
    pub fn new(method: HttpMethod, path_and_query: &str) -> Self {
        let (path, query) = match path_and_query.split_once('?') {
            Some((p, q)) => (p.to_string(), Some(q.to_string())),
            None => (path_and_query.to_string(), None),
        };
        Self {
            method,
            path,
            query,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            params: PathParams::new(),
        }
    }

    /// Sets the request body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Replaces the captured path parameters.
    #[must_use]
    pub fn with_params(mut self, params: PathParams) -> Self {
        self.params = params;
        self
    }

    /// Returns a captured path parameter.
    ///
    /// # Errors
    ///
    /// Returns [`RespondError::MissingParam`] when the matching pattern did
    /// not capture `name`.
    pub fn param(&self, name: &str) -> Result<&str, RespondError> {
        self.params
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| RespondError::MissingParam(name.to_string()))
    }

    /// Returns the first decoded value of query parameter `name`.
    #[must_use]
    pub fn query_param(&self, name: &str) -> Option<String> {
        let query = self.query.as_deref()?;
        url::form_urlencoded::parse(query.as_bytes())
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
    }

    /// Returns all decoded query pairs in order.
    #[must_use]
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        self.query.as_deref().map_or_else(Vec::new, |q| {
            url::form_urlencoded::parse(q.as_bytes())
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect()
        })
    }

    /// Deserializes the body into the endpoint's typed schema.
    ///
    /// # Errors
    ///
    /// Returns [`RespondError::InvalidBody`] when the body is empty, is not
    /// JSON, or does not fit `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, RespondError> {
        if self.body.is_empty() {
            return Err(RespondError::InvalidBody {
                message: "empty body".to_string(),
            });
        }
        serde_json::from_slice(&self.body).map_err(|e| RespondError::InvalidBody {
            message: e.to_string(),
        })
    }

    /// Returns the body as UTF-8 text.
    ///
    /// # Errors
    ///
    /// Returns [`RespondError::InvalidBody`] for non-UTF-8 bodies.
    pub fn text(&self) -> Result<&str, RespondError> {
        std::str::from_utf8(&self.body).map_err(|e| RespondError::InvalidBody {
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Body {
        name: String,
    }

    #[test]
    fn new_splits_query() {
        let req = MockRequest::new(HttpMethod::Get, "/v1/documents?type=catchCertificate");
        assert_eq!(req.path, "/v1/documents");
        assert_eq!(req.query.as_deref(), Some("type=catchCertificate"));
        assert_eq!(req.query_param("type").as_deref(), Some("catchCertificate"));
    }

    #[test]
    fn query_param_is_decoded() {
        let req = MockRequest::new(HttpMethod::Get, "/x?q=a%20b&q=c");
        assert_eq!(req.query_param("q").as_deref(), Some("a b"));
        assert_eq!(req.query_pairs().len(), 2);
    }

    #[test]
    fn json_body_is_typed() {
        let req = MockRequest::new(HttpMethod::Post, "/x").with_body(r#"{"name":"Jo"}"#);
        let body: Body = req.json().unwrap();
        assert_eq!(body.name, "Jo");
    }

    #[test]
    fn json_body_rejects_wrong_shape() {
        let req = MockRequest::new(HttpMethod::Post, "/x").with_body(r#"{"nom":"Jo"}"#);
        let err = req.json::<Body>().unwrap_err();
        assert!(matches!(err, RespondError::InvalidBody { .. }));
    }

    #[test]
    fn json_body_rejects_empty() {
        let req = MockRequest::new(HttpMethod::Post, "/x");
        assert!(req.json::<Body>().is_err());
    }

    #[test]
    fn missing_param_is_an_error() {
        let req = MockRequest::new(HttpMethod::Get, "/x");
        assert!(matches!(
            req.param("documentNumber"),
            Err(RespondError::MissingParam(_))
        ));
    }
}
