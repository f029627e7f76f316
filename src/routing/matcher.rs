//! Route matching logic.
//!
//! # Responsibilities
//! - Parse path patterns with named `:param` segments
//! - Match method + path, extracting parameters
//! - Render upstream path templates from extracted parameters
//!
//! # Design Decisions
//! - Literal segments match ASCII case-insensitively; captured
//!   parameters keep the request's case
//! - A trailing slash on the request path is ignored
//! - A parameter matches exactly one non-empty segment
//! - No regex to guarantee O(n) matching

use axum::http::Method;
use thiserror::Error;

/// Errors raised while parsing a path pattern.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PatternError {
    #[error("pattern must start with '/'")]
    MissingLeadingSlash,
    #[error("empty parameter name")]
    EmptyParam,
    #[error("duplicate parameter ':{0}'")]
    DuplicateParam(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
}

/// Parameters captured from the request path, in pattern order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathParams(Vec<(String, String)>);

impl PathParams {
    /// Value of a captured parameter.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A compiled path pattern such as `/v1/devices/:id/attribute`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    raw: String,
    segments: Vec<Segment>,
}

impl PathPattern {
    pub fn parse(pattern: &str) -> Result<Self, PatternError> {
        if !pattern.starts_with('/') {
            return Err(PatternError::MissingLeadingSlash);
        }

        let mut segments = Vec::new();
        for part in split_path(pattern) {
            match part.strip_prefix(':') {
                Some("") => return Err(PatternError::EmptyParam),
                Some(name) => {
                    let duplicate = segments
                        .iter()
                        .any(|s| matches!(s, Segment::Param(existing) if existing == name));
                    if duplicate {
                        return Err(PatternError::DuplicateParam(name.to_string()));
                    }
                    segments.push(Segment::Param(name.to_string()));
                }
                None => segments.push(Segment::Literal(part.to_string())),
            }
        }

        Ok(Self {
            raw: pattern.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Match a request path, returning the captured parameters.
    pub fn matches(&self, path: &str) -> Option<PathParams> {
        let mut parts = split_path(path);
        let mut params = Vec::new();

        for segment in &self.segments {
            let part = parts.next()?;
            match segment {
                Segment::Literal(expected) if expected.eq_ignore_ascii_case(part) => {}
                Segment::Literal(_) => return None,
                Segment::Param(_) if part.is_empty() => return None,
                Segment::Param(name) => params.push((name.clone(), part.to_string())),
            }
        }

        if parts.next().is_some() {
            return None;
        }
        Some(PathParams(params))
    }

    /// Substitute captured parameters into this pattern.
    /// Unknown parameters are left as written.
    pub fn render(&self, params: &PathParams) -> String {
        if self.segments.is_empty() {
            return "/".to_string();
        }
        let mut out = String::new();
        for segment in &self.segments {
            out.push('/');
            match segment {
                Segment::Literal(lit) => out.push_str(lit),
                Segment::Param(name) => match params.get(name) {
                    Some(value) => out.push_str(value),
                    None => {
                        out.push(':');
                        out.push_str(name);
                    }
                },
            }
        }
        out
    }
}

fn split_path(path: &str) -> impl Iterator<Item = &str> {
    let trimmed = path.strip_prefix('/').unwrap_or(path);
    let trimmed = trimmed.strip_suffix('/').unwrap_or(trimmed);
    (!trimmed.is_empty())
        .then(|| trimmed.split('/'))
        .into_iter()
        .flatten()
}

/// Matches a request's method and path.
#[derive(Debug, Clone)]
pub struct RouteMatcher {
    method: Method,
    pattern: PathPattern,
}

impl RouteMatcher {
    pub fn new(method: Method, pattern: PathPattern) -> Self {
        Self { method, pattern }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn pattern(&self) -> &PathPattern {
        &self.pattern
    }

    /// Returns the captured parameters if the request matches.
    pub fn matches(&self, method: &Method, path: &str) -> Option<PathParams> {
        if *method != self.method {
            return None;
        }
        self.pattern.matches(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_pattern() {
        let pattern = PathPattern::parse("/v1/users/me.json").unwrap();

        assert!(pattern.matches("/v1/users/me.json").is_some());
        assert!(pattern.matches("/v1/users/me.json/").is_some());
        assert!(pattern.matches("/v1/users").is_none());
        assert!(pattern.matches("/v1/users/me.json/extra").is_none());
    }

    #[test]
    fn test_param_extraction() {
        let pattern = PathPattern::parse("/v2/devices/:deviceid/events.json").unwrap();

        let params = pattern.matches("/v2/devices/abc123/events.json").unwrap();
        assert_eq!(params.get("deviceid"), Some("abc123"));
        assert_eq!(params.get("other"), None);

        assert!(pattern.matches("/v2/devices//events.json").is_none());
    }

    #[test]
    fn test_literals_ignore_case() {
        let pattern = PathPattern::parse("/v1/devices/:registration_id/Config.json").unwrap();

        let params = pattern.matches("/V1/DEVICES/AbC01/config.JSON").unwrap();
        assert_eq!(params.get("registration_id"), Some("AbC01"));
        assert!(pattern.matches("/v1/devicez/AbC01/config.json").is_none());
    }

    #[test]
    fn test_root_pattern() {
        let pattern = PathPattern::parse("/").unwrap();
        assert!(pattern.matches("/").is_some());
        assert!(pattern.matches("/a").is_none());
    }

    #[test]
    fn test_render() {
        let pattern = PathPattern::parse("/v1/apps/:id/unregister.json").unwrap();
        let params = PathPattern::parse("/x/:id")
            .unwrap()
            .matches("/x/42")
            .unwrap();
        assert_eq!(pattern.render(&params), "/v1/apps/42/unregister.json");
        assert_eq!(
            pattern.render(&PathParams::default()),
            "/v1/apps/:id/unregister.json"
        );
    }

    #[test]
    fn test_invalid_patterns() {
        assert_eq!(
            PathPattern::parse("v1/x"),
            Err(PatternError::MissingLeadingSlash)
        );
        assert_eq!(PathPattern::parse("/v1/:"), Err(PatternError::EmptyParam));
        assert_eq!(
            PathPattern::parse("/:id/:id"),
            Err(PatternError::DuplicateParam("id".into()))
        );
    }

    #[test]
    fn test_method_must_match() {
        let matcher = RouteMatcher::new(Method::POST, PathPattern::parse("/v1/profile").unwrap());
        assert!(matcher.matches(&Method::POST, "/v1/profile").is_some());
        assert!(matcher.matches(&Method::GET, "/v1/profile").is_none());
    }
}
