//! VirtualService domain types
//!
//! Only the parts of a VirtualService that decide which requests a route receives are
//! modelled: hosts, gateways and the URI matches of each HTTP route. Destinations,
//! rewrites and the rest of the spec are ignored on decode.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::id::ObjectMeta;

/// Gateway a VirtualService binds to when it names none: in-mesh sidecar traffic.
pub const MESH_GATEWAY: &str = "mesh";

/// Istio VirtualService
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VirtualService {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: VirtualServiceSpec,
}

/// VirtualService spec
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VirtualServiceSpec {
    /// Destination hosts the routes apply to
    #[serde(default)]
    pub hosts: Vec<String>,

    /// Gateways and sidecars the routes apply to; empty means `mesh`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub gateways: Vec<String>,

    /// Ordered HTTP routes; the first matching route wins at runtime
    #[serde(default)]
    pub http: Vec<HttpRoute>,
}

/// A single HTTP route. It matches a request if any of its match requests does.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HttpRoute {
    #[serde(rename = "match", default, skip_serializing_if = "Vec::is_empty")]
    pub matches: Vec<HttpMatchRequest>,
}

/// Match conditions of one route entry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HttpMatchRequest {
    /// URI condition; requests matched on headers only carry none
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<UriMatch>,
}

/// URI string match
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "StringMatchFields", into = "StringMatchFields")]
pub enum UriMatch {
    Exact(String),
    Prefix(String),
    Regex(String),
}

/// Wire shape of an Istio `StringMatch`: a oneof of three optional fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StringMatchFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    exact: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    regex: Option<String>,
}

impl TryFrom<StringMatchFields> for UriMatch {
    type Error = String;

    fn try_from(fields: StringMatchFields) -> Result<Self, Self::Error> {
        match (fields.exact, fields.prefix, fields.regex) {
            (Some(v), None, None) => Ok(UriMatch::Exact(v)),
            (None, Some(v), None) => Ok(UriMatch::Prefix(v)),
            (None, None, Some(v)) => Ok(UriMatch::Regex(v)),
            (None, None, None) => Err("uri match needs one of exact, prefix or regex".to_string()),
            _ => Err("uri match sets more than one of exact, prefix and regex".to_string()),
        }
    }
}

impl From<UriMatch> for StringMatchFields {
    fn from(uri: UriMatch) -> Self {
        match uri {
            UriMatch::Exact(v) => Self { exact: Some(v), ..Default::default() },
            UriMatch::Prefix(v) => Self { prefix: Some(v), ..Default::default() },
            UriMatch::Regex(v) => Self { regex: Some(v), ..Default::default() },
        }
    }
}

/// Kind of URI match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MatchType {
    Exact,
    Prefix,
    Regex,
}

impl fmt::Display for MatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchType::Exact => write!(f, "exact"),
            MatchType::Prefix => write!(f, "prefix"),
            MatchType::Regex => write!(f, "regex"),
        }
    }
}

impl UriMatch {
    pub fn exact(value: impl Into<String>) -> Self {
        UriMatch::Exact(value.into())
    }

    pub fn prefix(value: impl Into<String>) -> Self {
        UriMatch::Prefix(value.into())
    }

    pub fn regex(value: impl Into<String>) -> Self {
        UriMatch::Regex(value.into())
    }

    pub fn match_type(&self) -> MatchType {
        match self {
            UriMatch::Exact(_) => MatchType::Exact,
            UriMatch::Prefix(_) => MatchType::Prefix,
            UriMatch::Regex(_) => MatchType::Regex,
        }
    }

    /// The pattern string regardless of match type
    pub fn value(&self) -> &str {
        match self {
            UriMatch::Exact(v) | UriMatch::Prefix(v) | UriMatch::Regex(v) => v,
        }
    }
}

/// Rendered as `<value> <type>`, e.g. `/reviews prefix`.
impl fmt::Display for UriMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.value(), self.match_type())
    }
}

impl HttpRoute {
    /// Create a route from its URI matches
    pub fn new(matches: impl IntoIterator<Item = UriMatch>) -> Self {
        Self {
            matches: matches
                .into_iter()
                .map(|uri| HttpMatchRequest { uri: Some(uri) })
                .collect(),
        }
    }

    /// URI matches in declaration order, skipping header-only match requests
    pub fn uri_matches(&self) -> impl Iterator<Item = &UriMatch> {
        self.matches.iter().filter_map(|m| m.uri.as_ref())
    }
}

impl VirtualService {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self { metadata: ObjectMeta::new(name, namespace), spec: VirtualServiceSpec::default() }
    }

    pub fn with_hosts<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.spec.hosts = hosts.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_gateways<I, S>(mut self, gateways: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.spec.gateways = gateways.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_route(mut self, route: HttpRoute) -> Self {
        self.spec.http.push(route);
        self
    }

    pub fn namespace(&self) -> &str {
        self.metadata.namespace_or_default()
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// `name.namespace`
    pub fn qualified_name(&self) -> String {
        self.metadata.qualified_name()
    }

    /// Gateways used for grouping, with `implicit` standing in for an empty list.
    pub fn effective_gateways<'a>(&'a self, implicit: &'a str) -> Vec<&'a str> {
        if self.spec.gateways.is_empty() {
            vec![implicit]
        } else {
            let mut gateways: Vec<&str> = self.spec.gateways.iter().map(String::as_str).collect();
            gateways.sort_unstable();
            gateways.dedup();
            gateways
        }
    }

    /// Number of regex URI matches across all HTTP routes
    pub fn regex_match_count(&self) -> usize {
        self.spec
            .http
            .iter()
            .flat_map(HttpRoute::uri_matches)
            .filter(|m| m.match_type() == MatchType::Regex)
            .count()
    }
}
