//! HTTP method matching for intercept rules.

use std::fmt;

use axum::http::Method;
use serde::{Deserialize, Serialize};

/// HTTP method an intercept rule answers.
///
/// `Any` matches every method and is used by catch-all rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    /// `GET`
    Get,
    /// `POST`
    Post,
    /// `PUT`
    Put,
    /// `PATCH`
    Patch,
    /// `DELETE`
    Delete,
    /// `HEAD`
    Head,
    /// `OPTIONS`
    Options,
    /// Matches every method
    Any,
}

impl HttpMethod {
    /// Returns whether a rule registered for `self` answers a request
    /// made with `request`.
    #[must_use]
    pub fn accepts(self, request: Self) -> bool {
        self == Self::Any || self == request
    }

    /// Upper-case method name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
            Self::Any => "*",
        }
    }
}

impl From<&Method> for HttpMethod {
    /// Unusual methods (e.g. `TRACE`) map to `Any`, which only catch-all
    /// rules accept.
    fn from(method: &Method) -> Self {
        match *method {
            Method::GET => Self::Get,
            Method::POST => Self::Post,
            Method::PUT => Self::Put,
            Method::PATCH => Self::Patch,
            Method::DELETE => Self::Delete,
            Method::HEAD => Self::Head,
            Method::OPTIONS => Self::Options,
            _ => Self::Any,
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
