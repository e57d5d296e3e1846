//! Shared request plumbing for the HTTP clients.

use std::time::Duration;

use coachdeck_api::{ApiError, Result};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_ERROR_BODY: usize = 500;

/// Which error variant a failing call maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upstream {
    Store,
    Collaborator(&'static str),
}

impl Upstream {
    pub fn error(self, message: impl Into<String>) -> ApiError {
        match self {
            Upstream::Store => ApiError::store(message),
            Upstream::Collaborator(service) => ApiError::collaborator(service, message),
        }
    }
}

pub fn build_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(|e| ApiError::store(format!("Failed to create HTTP client: {}", e)))
}

/// Turn a transport error into a message that says what to check.
pub fn format_reqwest_error(e: &reqwest::Error, url: &str, operation: &str) -> String {
    if e.is_timeout() {
        format!(
            "Failed to {} for {}: timeout - request took too long (check network or increase timeout)",
            operation, url
        )
    } else if e.is_connect() {
        format!(
            "Failed to {} for {}: connection error - check network connectivity and DNS resolution. Error: {}",
            operation, url, e
        )
    } else if e.is_request() {
        format!(
            "Failed to {} for {}: request error - invalid URL or malformed request. Error: {}",
            operation, url, e
        )
    } else if e.is_decode() {
        format!(
            "Failed to {} for {}: decode error - unexpected response format from server. Error: {}",
            operation, url, e
        )
    } else {
        format!("Failed to {} for {}: {}", operation, url, e)
    }
}

/// Pass a 2xx response through. Otherwise fail with the status and a
/// truncated body.
pub async fn check_status(
    response: reqwest::Response,
    url: &str,
    upstream: Upstream,
) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(upstream.error(format!(
        "HTTP {} error from {}: {}",
        status.as_u16(),
        url,
        truncate(&body, MAX_ERROR_BODY)
    )))
}

/// Read the body of a successful response.
pub async fn handle_response(
    response: reqwest::Response,
    url: &str,
    upstream: Upstream,
) -> Result<String> {
    let response = check_status(response, url, upstream).await?;
    response.text().await.map_err(|e| {
        upstream.error(format!("Failed to read response body from {}: {}", url, e))
    })
}

pub(crate) fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Send a prepared request, mapping transport failures through
/// [`format_reqwest_error`].
pub async fn send(
    request: reqwest::RequestBuilder,
    url: &str,
    operation: &str,
    upstream: Upstream,
) -> Result<String> {
    let response = request
        .send()
        .await
        .map_err(|e| upstream.error(format_reqwest_error(&e, url, operation)))?;
    handle_response(response, url, upstream).await
}

pub fn parse_json<T: serde::de::DeserializeOwned>(
    body: &str,
    url: &str,
    upstream: Upstream,
) -> Result<T> {
    serde_json::from_str(body).map_err(|e| {
        upstream.error(format!(
            "Failed to parse response from {}: {}. Body: {}",
            url,
            e,
            truncate(body, MAX_ERROR_BODY)
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("short", 50), "short");
    }

    #[test]
    fn test_upstream_maps_variant() {
        assert!(matches!(Upstream::Store.error("x"), ApiError::Store { .. }));
        assert_eq!(
            Upstream::Collaborator("payments").error("declined"),
            ApiError::collaborator("payments", "declined")
        );
    }

    #[test]
    fn test_parse_json_reports_body() {
        let err = parse_json::<Vec<u32>>("{oops", "http://x", Upstream::Store).unwrap_err();
        match err {
            ApiError::Store { message } => assert!(message.contains("{oops")),
            other => panic!("unexpected {other:?}"),
        }
    }
}
