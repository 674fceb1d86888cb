//! URL matching for intercept rules.
//!
//! A [`UrlPattern`] is evaluated against the path (and, for path templates
//! carrying a query, the query string) of an intercepted request. Path
//! templates capture `:name` / `{name}` segments into [`PathParams`].
//! Request path segments are percent-decoded before they are compared or
//! captured; glob and regex patterns see the raw path.

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use super::request::{MockRequest, PathParams};
use crate::error::PatternError;

/// Predicate form of a URL matcher.
pub type RequestPredicate = Arc<dyn Fn(&MockRequest) -> bool + Send + Sync>;

/// One segment of a [`PathTemplate`].
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
}

/// A path with optional parameter segments and required query pairs.
///
/// Built from strings such as `/v1/catch-certificates/:documentNumber` or
/// `http://backend/v1/documents?type=catchCertificate`. Scheme and host of
/// absolute URLs are dropped: the mock server only ever sees paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTemplate {
    segments: Vec<Segment>,
    query: Vec<(String, String)>,
}

impl PathTemplate {
    /// Parses a template. Never fails: anything that is not a parameter
    /// segment is a literal.
    #[must_use]
    pub fn parse(input: &str) -> Self {
        let without_origin = strip_origin(input);
        let (path, query) = match without_origin.split_once('?') {
            Some((p, q)) => (p, Some(q)),
            None => (without_origin, None),
        };

        let segments = path
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| {
                if let Some(name) = s.strip_prefix(':') {
                    Segment::Param(name.to_string())
                } else if let Some(name) = s.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
                    Segment::Param(name.to_string())
                } else {
                    Segment::Literal(s.to_string())
                }
            })
            .collect();

        let query = query.map_or_else(Vec::new, |q| {
            url::form_urlencoded::parse(q.as_bytes())
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect()
        });

        Self { segments, query }
    }

    /// Returns whether the template has any parameter segment.
    #[must_use]
    pub fn has_params(&self) -> bool {
        self.segments
            .iter()
            .any(|s| matches!(s, Segment::Param(_)))
    }

    /// Matches `request` and returns the captured parameters.
    #[must_use]
    pub fn captures(&self, request: &MockRequest) -> Option<PathParams> {
        let mut parts = request.path.split('/').filter(|s| !s.is_empty());
        let mut params = PathParams::new();

        for segment in &self.segments {
            let part = decode_segment(parts.next()?);
            match segment {
                Segment::Literal(lit) => {
                    if *lit != part {
                        return None;
                    }
                }
                Segment::Param(name) => {
                    params.insert(name.clone(), part.into_owned());
                }
            }
        }
        if parts.next().is_some() {
            return None;
        }

        if !self.query.is_empty() {
            let pairs = request.query_pairs();
            if !self.query.iter().all(|required| pairs.contains(required)) {
                return None;
            }
        }

        Some(params)
    }
}

impl fmt::Display for PathTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            f.write_str("/")?;
        }
        for segment in &self.segments {
            match segment {
                Segment::Literal(lit) => write!(f, "/{lit}")?,
                Segment::Param(name) => write!(f, "/:{name}")?,
            }
        }
        for (i, (k, v)) in self.query.iter().enumerate() {
            let sep = if i == 0 { '?' } else { '&' };
            write!(f, "{sep}{k}={v}")?;
        }
        Ok(())
    }
}

/// Percent-decodes one path segment. `+` is a literal plus in a path.
fn decode_segment(raw: &str) -> Cow<'_, str> {
    if !raw.contains('%') {
        return Cow::Borrowed(raw);
    }
    // A lone key decodes exactly like a path segment once the characters
    // the form parser treats specially are escaped.
    let escaped = raw
        .replace('+', "%2B")
        .replace('&', "%26")
        .replace('=', "%3D");
    url::form_urlencoded::parse(escaped.as_bytes())
        .next()
        .map_or(Cow::Borrowed(raw), |(key, _)| Cow::Owned(key.into_owned()))
}

/// Drops `scheme://host[:port]` from an absolute URL.
fn strip_origin(input: &str) -> &str {
    input.find("://").map_or(input, |idx| {
        let rest = &input[idx + 3..];
        rest.find('/').map_or("/", |slash| &rest[slash..])
    })
}

/// How an intercept rule decides whether a request's URL is its own.
#[derive(Clone)]
pub enum UrlPattern {
    /// Exact path or path template, optionally with required query pairs
    Path(PathTemplate),
    /// Glob over the request path (`/v1/*/catches`)
    Glob(glob::Pattern),
    /// Regular expression over the request path
    Regex(regex::Regex),
    /// Arbitrary predicate over the whole request
    Predicate(RequestPredicate),
}

impl UrlPattern {
    /// Path pattern (exact or templated).
    #[must_use]
    pub fn path(template: &str) -> Self {
        Self::Path(PathTemplate::parse(template))
    }

    /// Glob pattern over the request path.
    ///
    /// # Errors
    ///
    /// Returns [`PatternError::Glob`] for an invalid glob.
    pub fn glob(pattern: &str) -> Result<Self, PatternError> {
        glob::Pattern::new(pattern)
            .map(Self::Glob)
            .map_err(|source| PatternError::Glob {
                pattern: pattern.to_string(),
                source,
            })
    }

    /// Regex pattern over the request path.
    ///
    /// Regex compilation is size-limited so a pathological pattern cannot
    /// stall scenario activation.
    ///
    /// # Errors
    ///
    /// Returns [`PatternError::Regex`] for an invalid regex.
    pub fn regex(pattern: &str) -> Result<Self, PatternError> {
        regex::RegexBuilder::new(pattern)
            .size_limit(1 << 20)
            .build()
            .map(Self::Regex)
            .map_err(|source| PatternError::Regex {
                pattern: pattern.to_string(),
                source,
            })
    }

    /// Predicate pattern.
    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn(&MockRequest) -> bool + Send + Sync + 'static,
    {
        Self::Predicate(Arc::new(f))
    }

    /// Compiles a pattern from its string form.
    ///
    /// `regex:` and `glob:` prefixes select those matchers; anything else is
    /// a path template.
    ///
    /// # Errors
    ///
    /// Returns an error if a regex or glob is invalid.
    pub fn compile(input: &str) -> Result<Self, PatternError> {
        if let Some(re) = input.strip_prefix("regex:") {
            Self::regex(re)
        } else if let Some(g) = input.strip_prefix("glob:") {
            Self::glob(g)
        } else {
            Ok(Self::path(input))
        }
    }

    /// Tests `request` against the pattern, returning captured parameters
    /// on a match.
    #[must_use]
    pub fn captures(&self, request: &MockRequest) -> Option<PathParams> {
        match self {
            Self::Path(template) => template.captures(request),
            Self::Glob(pattern) => pattern.matches(&request.path).then(PathParams::new),
            Self::Regex(re) => re.captures(&request.path).map(|caps| {
                re.capture_names()
                    .flatten()
                    .filter_map(|name| {
                        caps.name(name)
                            .map(|m| (name.to_string(), m.as_str().to_string()))
                    })
                    .collect()
            }),
            Self::Predicate(f) => f(request).then(PathParams::new),
        }
    }
}

impl From<&str> for UrlPattern {
    fn from(template: &str) -> Self {
        Self::path(template)
    }
}

impl From<String> for UrlPattern {
    fn from(template: String) -> Self {
        Self::path(&template)
    }
}

impl fmt::Display for UrlPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(t) => write!(f, "{t}"),
            Self::Glob(p) => write!(f, "glob:{}", p.as_str()),
            Self::Regex(re) => write!(f, "regex:{}", re.as_str()),
            Self::Predicate(_) => f.write_str("<predicate>"),
        }
    }
}

impl fmt::Debug for UrlPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UrlPattern({self})")
    }
}
