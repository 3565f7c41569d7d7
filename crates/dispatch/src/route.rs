//! Route records and the path patterns they match.
//!
//! A pattern is written as a path template whose segments are either literals, named
//! captures (`:id`), optional captures (`:?page`) or a trailing wildcard (`*rest`):
//!
//! ```
//! use micro_dispatch::PathPattern;
//!
//! let pattern: PathPattern = "/files/:owner/*rest".parse().unwrap();
//! let arguments = pattern.extract(&["files", "bob", "a", "b%20c"]).unwrap();
//! assert_eq!(arguments["owner"], "bob");
//! assert_eq!(arguments["rest"], "a/b c");
//! ```

use crate::controller::{ActionSignature, ControllerHandle, HandlerId};
use crate::RouterError;
use http::Method;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Arguments bound from, or substituted into, a path pattern.
pub type Arguments = BTreeMap<String, String>;

/// Splits a request path into its non-empty segments.
pub fn path_parts(path: &str) -> Vec<String> {
    path.split('/').filter(|part| !part.is_empty()).map(str::to_owned).collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Capture(String),
    Optional(String),
    Wildcard(String),
}

impl Segment {
    fn parse(template: &str, raw: &str) -> Result<Self, RouterError> {
        let (segment, name) = if let Some(name) = raw.strip_prefix(":?") {
            (Segment::Optional(name.to_owned()), name)
        } else if let Some(name) = raw.strip_prefix(':') {
            (Segment::Capture(name.to_owned()), name)
        } else if let Some(name) = raw.strip_prefix('*') {
            (Segment::Wildcard(name.to_owned()), name)
        } else {
            return Ok(Segment::Literal(raw.to_owned()));
        };

        if name.is_empty() {
            return Err(RouterError::invalid_pattern(template, format!("segment '{raw}' has no name")));
        }
        Ok(segment)
    }

    /// the capture name, if the segment binds one
    pub fn name(&self) -> Option<&str> {
        match self {
            Segment::Literal(_) => None,
            Segment::Capture(name) | Segment::Optional(name) | Segment::Wildcard(name) => Some(name),
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Literal(literal) => f.write_str(literal),
            Segment::Capture(name) => write!(f, ":{name}"),
            Segment::Optional(name) => write!(f, ":?{name}"),
            Segment::Wildcard(name) => write!(f, "*{name}"),
        }
    }
}

/// A parsed path template.
///
/// Invariants checked at parse time: at most one wildcard and only as the last segment,
/// unique capture names, and optional captures followed only by optional captures or the
/// wildcard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    segments: Vec<Segment>,
}

impl PathPattern {
    pub fn parse(template: &str) -> Result<Self, RouterError> {
        let segments =
            template.split('/').filter(|raw| !raw.is_empty()).map(|raw| Segment::parse(template, raw)).collect::<Result<Vec<_>, _>>()?;

        let mut names = HashSet::new();
        let mut optional_seen = false;
        for (index, segment) in segments.iter().enumerate() {
            if let Some(name) = segment.name()
                && !names.insert(name)
            {
                return Err(RouterError::invalid_pattern(template, format!("capture '{name}' appears more than once")));
            }

            match segment {
                Segment::Wildcard(_) if index + 1 != segments.len() => {
                    return Err(RouterError::invalid_pattern(template, "wildcard must be the last segment"));
                }
                Segment::Literal(_) | Segment::Capture(_) if optional_seen => {
                    return Err(RouterError::invalid_pattern(
                        template,
                        format!("segment '{segment}' follows an optional capture"),
                    ));
                }
                Segment::Optional(_) => optional_seen = true,
                _ => {}
            }
        }

        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn capture_names(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(Segment::name)
    }

    /// Matches `parts` against the pattern in lock-step and binds the captures.
    ///
    /// Literals compare case-sensitively, captures consume one URL-decoded part, and the
    /// wildcard takes every remaining part (possibly none) joined by `/`. Absent optional
    /// captures are left out of the result. Returns `None` when the shapes don't line up.
    pub fn extract<S: AsRef<str>>(&self, parts: &[S]) -> Option<Arguments> {
        let mut arguments = Arguments::new();
        let mut parts = parts.iter().map(AsRef::as_ref);

        for segment in &self.segments {
            match segment {
                Segment::Literal(literal) => {
                    if parts.next() != Some(literal.as_str()) {
                        return None;
                    }
                }
                Segment::Capture(name) => {
                    let part = parts.next()?;
                    arguments.insert(name.clone(), decode(part));
                }
                Segment::Optional(name) => {
                    if let Some(part) = parts.next() {
                        arguments.insert(name.clone(), decode(part));
                    }
                }
                Segment::Wildcard(name) => {
                    let rest = parts.by_ref().map(decode).collect::<Vec<_>>();
                    arguments.insert(name.clone(), rest.join("/"));
                }
            }
        }

        if parts.next().is_some() {
            return None;
        }
        Some(arguments)
    }

    /// Builds a concrete path, URL-encoding every substituted value.
    ///
    /// Every named capture must be supplied with a non-empty value. Optional captures are
    /// emitted in order until the first one that is missing or empty. Arguments the pattern does not use are ignored.
    pub fn assign(&self, arguments: &Arguments) -> Result<String, RouterError> {
        self.fill(arguments).map(|(path, _used)| path)
    }

    /// same as [`PathPattern::assign`], also reporting which arguments were consumed
    pub(crate) fn fill<'a>(&'a self, arguments: &Arguments) -> Result<(String, HashSet<&'a str>), RouterError> {
        let mut path = String::new();
        let mut used = HashSet::new();
        let mut optional_missing = false;

        for segment in &self.segments {
            match segment {
                Segment::Literal(literal) => {
                    path.push('/');
                    path.push_str(literal);
                }
                Segment::Capture(name) => {
                    let value = arguments
                        .get(name)
                        .filter(|value| !value.is_empty())
                        .ok_or_else(|| RouterError::missing_argument(self, name))?;
                    path.push('/');
                    path.push_str(&urlencoding::encode(value));
                    used.insert(name.as_str());
                }
                Segment::Optional(name) => match arguments.get(name) {
                    Some(value) if !optional_missing && !value.is_empty() => {
                        path.push('/');
                        path.push_str(&urlencoding::encode(value));
                        used.insert(name.as_str());
                    }
                    _ => optional_missing = true,
                },
                Segment::Wildcard(name) => {
                    if let Some(value) = arguments.get(name).filter(|_| !optional_missing) {
                        for part in value.split('/').filter(|part| !part.is_empty()) {
                            path.push('/');
                            path.push_str(&urlencoding::encode(part));
                        }
                        used.insert(name.as_str());
                    }
                }
            }
        }

        if path.is_empty() {
            path.push('/');
        }
        Ok((path, used))
    }
}

fn decode(part: &str) -> String {
    urlencoding::decode(part).map_or_else(|_| part.to_owned(), |decoded| decoded.into_owned())
}

impl FromStr for PathPattern {
    type Err = RouterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PathPattern::parse(s)
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return f.write_str("/");
        }
        for segment in &self.segments {
            write!(f, "/{segment}")?;
        }
        Ok(())
    }
}

/// HTTP method a route answers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteMethod {
    Any,
    Exact(Method),
}

impl RouteMethod {
    #[inline]
    pub fn matches(&self, method: &Method) -> bool {
        match self {
            RouteMethod::Any => true,
            RouteMethod::Exact(expected) => expected == method,
        }
    }
}

impl From<Method> for RouteMethod {
    fn from(method: Method) -> Self {
        RouteMethod::Exact(method)
    }
}

impl fmt::Display for RouteMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteMethod::Any => f.write_str("*"),
            RouteMethod::Exact(method) => write!(f, "{method}"),
        }
    }
}

/// One `(method, pattern, controller#action)` binding. Built at registration, never mutated.
#[derive(Clone)]
pub struct Route {
    method: RouteMethod,
    pattern: PathPattern,
    handler: HandlerId,
    signature: ActionSignature,
    target: Arc<dyn ControllerHandle>,
}

impl Route {
    pub(crate) fn new(
        method: RouteMethod,
        pattern: PathPattern,
        signature: ActionSignature,
        target: Arc<dyn ControllerHandle>,
    ) -> Self {
        Self { method, pattern, handler: target.id(), signature, target }
    }

    pub fn method(&self) -> &RouteMethod {
        &self.method
    }

    pub fn pattern(&self) -> &PathPattern {
        &self.pattern
    }

    pub fn handler(&self) -> HandlerId {
        self.handler
    }

    pub fn action(&self) -> &'static str {
        self.signature.name()
    }

    pub fn signature(&self) -> &ActionSignature {
        &self.signature
    }

    pub(crate) fn target(&self) -> &dyn ControllerHandle {
        self.target.as_ref()
    }

    /// see [`PathPattern::extract`]
    pub fn extract_arguments<S: AsRef<str>>(&self, parts: &[S]) -> Option<Arguments> {
        self.pattern.extract(parts)
    }

    /// see [`PathPattern::assign`]
    pub fn assign_arguments(&self, arguments: &Arguments) -> Result<String, RouterError> {
        self.pattern.assign(arguments)
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("pattern", &self.pattern.to_string())
            .field("handler", &self.handler)
            .field("action", &self.action())
            .finish()
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} -> {}#{}", self.method, self.pattern, self.handler, self.action())
    }
}
