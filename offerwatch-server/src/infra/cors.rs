//! CORS policy as an ordered list of origin rules, evaluated first-to-match.
//!
//! The permissive catch-all is a deliberate policy choice carried over from
//! the original deployment; it sits last in the list and can be disabled via
//! `CORS_ALLOW_ANY=false`, at which point only the explicit rules apply.

use axum::http::{HeaderValue, Method, header, request::Parts};
use tower_http::cors::{AllowOrigin, CorsLayer};

/// Origin scheme used by the packaged browser extension.
const EXTENSION_SCHEME: &str = "chrome-extension://";

/// Hosting-platform domains the dashboard is deployed under.
const HOSTING_SUFFIXES: [&str; 2] = [".netlify.app", ".onrender.com"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OriginRule {
    /// `http(s)://localhost` on any port.
    Localhost,
    /// `http(s)://127.0.0.1` on any port.
    Loopback,
    /// Any origin under the given scheme prefix.
    ExtensionScheme(&'static str),
    /// Any https origin whose host ends with the given suffix.
    DomainSuffix(&'static str),
    /// Permissive catch-all.
    AnyOrigin,
}

impl OriginRule {
    pub fn matches(&self, origin: &str) -> bool {
        match self {
            OriginRule::Localhost => host_matches(origin, "localhost"),
            OriginRule::Loopback => host_matches(origin, "127.0.0.1"),
            OriginRule::ExtensionScheme(scheme) => origin.starts_with(scheme),
            OriginRule::DomainSuffix(suffix) => strip_scheme(origin)
                .map(|host| host_only(host).ends_with(suffix))
                .unwrap_or(false),
            OriginRule::AnyOrigin => true,
        }
    }
}

fn strip_scheme(origin: &str) -> Option<&str> {
    origin
        .strip_prefix("https://")
        .or_else(|| origin.strip_prefix("http://"))
}

fn host_only(rest: &str) -> &str {
    rest.split([':', '/']).next().unwrap_or(rest)
}

fn host_matches(origin: &str, host: &str) -> bool {
    strip_scheme(origin)
        .map(|rest| host_only(rest) == host)
        .unwrap_or(false)
}

/// The policy's rule list, in evaluation order.
pub fn default_rules(allow_any: bool) -> Vec<OriginRule> {
    let mut rules = vec![
        OriginRule::Localhost,
        OriginRule::Loopback,
        OriginRule::ExtensionScheme(EXTENSION_SCHEME),
        OriginRule::DomainSuffix(HOSTING_SUFFIXES[0]),
        OriginRule::DomainSuffix(HOSTING_SUFFIXES[1]),
    ];
    if allow_any {
        rules.push(OriginRule::AnyOrigin);
    }
    rules
}

pub fn first_match<'a>(
    rules: &'a [OriginRule],
    origin: &str,
) -> Option<&'a OriginRule> {
    rules.iter().find(|rule| rule.matches(origin))
}

/// Builds the CORS layer: first-match origin predicate, credentials
/// allowed, the six permitted methods, and Content-Type + Authorization
/// headers. Pre-flight OPTIONS requests are answered for all paths.
pub fn cors_layer(rules: Vec<OriginRule>) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(
            move |origin: &HeaderValue, _parts: &Parts| {
                origin
                    .to_str()
                    .map(|origin| first_match(&rules, origin).is_some())
                    .unwrap_or(false)
            },
        ))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
            Method::PATCH,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}
