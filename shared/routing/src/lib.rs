//! Ordered route table used by the function host.
//!
//! Routes are matched in registration order; the first route whose path and
//! method both match wins.

use http::Method;
use std::collections::HashMap;

#[derive(Debug)]
enum PathSegment {
    Static(String),
    Param(String),
}

#[derive(Debug)]
struct Path {
    segments: Vec<PathSegment>,
    has_trailing_splat: bool,
}

impl Path {
    /// Parses a path pattern string into a Path struct
    /// Supports:
    /// - Static segments: "/api/orders"
    /// - Dynamic parameters: "/api/orders/{id}"
    /// - Trailing splat: "/api/orders/*"
    fn parse(path_str: &str) -> Self {
        let mut normalized_path = path_str.trim().trim_matches('/');

        let mut has_trailing_splat = false;
        if normalized_path == "*" {
            has_trailing_splat = true;
            normalized_path = "";
        } else if let Some(stripped) = normalized_path.strip_suffix("/*") {
            has_trailing_splat = true;
            normalized_path = stripped;
        }

        let segments: Vec<PathSegment> = if normalized_path.is_empty() {
            vec![]
        } else {
            normalized_path
                .split('/')
                .map(|s| {
                    if let Some(stripped) = s.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
                        PathSegment::Param(stripped.to_string())
                    } else {
                        PathSegment::Static(s.to_string())
                    }
                })
                .collect()
        };

        Path {
            segments,
            has_trailing_splat,
        }
    }

    /// Matches a request path against this path pattern.
    /// Static segments compare case-insensitively.
    fn matches<'a>(&self, request_path: &'a str) -> Option<HashMap<String, &'a str>> {
        let normalized_path = request_path.trim().trim_matches('/');

        let request_segments: Vec<&'a str> = if normalized_path.is_empty() {
            vec![]
        } else {
            normalized_path.split('/').collect()
        };

        let mut params = HashMap::new();

        for (i, seg) in self.segments.iter().enumerate() {
            let req_segment = *request_segments.get(i)?;
            match seg {
                PathSegment::Static(s) => {
                    if !req_segment.eq_ignore_ascii_case(s) {
                        return None;
                    }
                }
                PathSegment::Param(name) => {
                    if req_segment.is_empty() {
                        return None;
                    }
                    params.insert(name.clone(), req_segment);
                }
            }
        }

        if self.has_trailing_splat || self.segments.len() == request_segments.len() {
            Some(params)
        } else {
            None
        }
    }
}

#[derive(Debug, PartialEq)]
pub struct RouteMatch<'a, A> {
    pub params: HashMap<String, &'a str>,
    pub action: &'a A,
}

/// Outcome of resolving a request against the table.
#[derive(Debug, PartialEq)]
pub enum Resolution<'a, A> {
    Matched(RouteMatch<'a, A>),
    /// Some route matched the path but none accepted the method.
    MethodNotAllowed,
    NotFound,
}

#[derive(Debug)]
pub struct Route<A> {
    pattern: String,
    path: Path,
    methods: Option<Vec<Method>>,
    action: A,
}

impl<A> Route<A> {
    /// Creates a route. `methods` of `None` accepts any method.
    pub fn new(pattern: impl Into<String>, methods: Option<Vec<Method>>, action: A) -> Self {
        let pattern = pattern.into();
        let path = Path::parse(&pattern);
        Self {
            pattern,
            path,
            methods,
            action,
        }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn action(&self) -> &A {
        &self.action
    }

    fn accepts(&self, method: &Method) -> bool {
        match &self.methods {
            Some(methods) => methods.contains(method),
            None => true,
        }
    }
}

pub struct RouteTable<A> {
    routes: Vec<Route<A>>,
}

impl<A> Default for RouteTable<A> {
    fn default() -> Self {
        Self { routes: Vec::new() }
    }
}

impl<A> RouteTable<A> {
    pub fn new(routes: Vec<Route<A>>) -> Self {
        Self { routes }
    }

    pub fn push(&mut self, route: Route<A>) {
        self.routes.push(route);
    }

    pub fn routes(&self) -> impl Iterator<Item = &Route<A>> {
        self.routes.iter()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Returns the first route matching both path and method.
    pub fn resolve<'a>(&'a self, method: &Method, path: &'a str) -> Resolution<'a, A> {
        let mut path_matched = false;

        for route in &self.routes {
            let Some(params) = route.path.matches(path) else {
                continue;
            };
            if route.accepts(method) {
                return Resolution::Matched(RouteMatch {
                    params,
                    action: &route.action,
                });
            }
            path_matched = true;
        }

        if path_matched {
            Resolution::MethodNotAllowed
        } else {
            Resolution::NotFound
        }
    }
}
