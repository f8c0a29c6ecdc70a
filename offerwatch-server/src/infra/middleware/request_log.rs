//! Request instrumentation: timing and response capture for API paths.
//!
//! Every request under [`API_PREFIX`] gets exactly one diagnostic line on
//! completion, `METHOD PATH STATUS in DURATIONms`, with the serialized JSON
//! body appended after ` :: ` when one was produced. The whole line is
//! capped at [`MAX_LINE_LEN`] characters. Logging is best-effort: it never
//! alters the response delivered to the client and never fails the request.
//!
//! Pre-flight OPTIONS requests are answered by the CORS layer, which sits
//! outside this middleware, so they produce no line.

use axum::{
    body::Body,
    extract::Request,
    http::{HeaderMap, header},
    middleware::Next,
    response::Response,
};
use std::time::Instant;
use tracing::{info, warn};

pub const API_PREFIX: &str = "/api";

/// Hard cap on one access line, ellipsis included.
pub const MAX_LINE_LEN: usize = 80;

const ELLIPSIS: char = '…';

pub async fn access_log(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let started = Instant::now();

    let response = next.run(req).await;

    if !path.starts_with(API_PREFIX) {
        return response;
    }

    let elapsed_ms = started.elapsed().as_millis();
    let status = response.status().as_u16();

    if !is_json(response.headers()) {
        info!(
            target: "http::access",
            "{}",
            format_access_line(method.as_str(), &path, status, elapsed_ms, None)
        );
        return response;
    }

    // Buffer the JSON body so the line can include it, then hand the exact
    // same bytes on to the client.
    let (parts, body) = response.into_parts();
    match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => {
            let snippet = if bytes.is_empty() {
                None
            } else {
                Some(String::from_utf8_lossy(&bytes).into_owned())
            };
            info!(
                target: "http::access",
                "{}",
                format_access_line(
                    method.as_str(),
                    &path,
                    status,
                    elapsed_ms,
                    snippet.as_deref(),
                )
            );
            Response::from_parts(parts, Body::from(bytes))
        }
        Err(err) => {
            // The body stream already failed mid-flight; the client was not
            // going to receive it either way.
            warn!(
                target: "http::access",
                method = %method,
                path = %path,
                error = %err,
                "failed to capture response body"
            );
            Response::from_parts(parts, Body::empty())
        }
    }
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.starts_with("application/json"))
        .unwrap_or(false)
}

/// Formats one access line, capped at [`MAX_LINE_LEN`] characters with a
/// trailing ellipsis when truncated.
pub fn format_access_line(
    method: &str,
    path: &str,
    status: u16,
    elapsed_ms: u128,
    body: Option<&str>,
) -> String {
    let mut line = format!("{method} {path} {status} in {elapsed_ms}ms");
    if let Some(body) = body
        && !body.is_empty()
    {
        line.push_str(" :: ");
        line.push_str(body);
    }

    if line.chars().count() <= MAX_LINE_LEN {
        return line;
    }
    let mut truncated: String =
        line.chars().take(MAX_LINE_LEN - 1).collect();
    truncated.push(ELLIPSIS);
    truncated
}
