//! HTTP transport for the analysis service.
//!
//! One POST per run, negotiated as an event stream:
//! - `text/event-stream` responses are read incrementally by the session
//! - anything else is read whole and parsed as a single JSON document
//!
//! There is no total timeout on the request; only the connect phase is
//! bounded here. Run deadlines are enforced by the session.

use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Response, StatusCode};
use serde_json::Value;
use tracing::debug;

use crate::config::{ClientConfig, EVENT_STREAM_CONTENT_TYPE};
use crate::model::AnalysisPayload;
use crate::stream::{StreamError, StreamResult};

/// Message used when a failed response carries no message of its own
pub const DEFAULT_FAILURE_MESSAGE: &str = "Failed to analyze URL";

/// Build the HTTP client used for analysis requests
pub fn build_http_client(config: &ClientConfig) -> StreamResult<Client> {
    Client::builder()
        .connect_timeout(config.connect_timeout)
        .build()
        .map_err(|e| StreamError::Transport(format!("Failed to build HTTP client: {}", e)))
}

/// Issue the analysis request for `target_url`
pub async fn send_analysis_request(
    client: &Client,
    endpoint: &str,
    target_url: &str,
) -> StreamResult<Response> {
    let body = serde_json::json!({ "url": target_url });

    let response = client
        .post(endpoint)
        .header(ACCEPT, EVENT_STREAM_CONTENT_TYPE)
        .json(&body)
        .send()
        .await?;

    debug!(status = %response.status(), endpoint, "analysis request accepted");
    Ok(response)
}

/// Whether the response declares the event-stream content type
pub fn is_event_stream(response: &Response) -> bool {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.trim().to_ascii_lowercase().starts_with(EVENT_STREAM_CONTENT_TYPE))
        .unwrap_or(false)
}

/// Read a non-streaming response as a single analysis document
pub async fn read_json_response(response: Response) -> StreamResult<AnalysisPayload> {
    let status = response.status();
    let text = response.text().await?;
    parse_json_response(status, &text)
}

/// Interpret a whole JSON response body.
///
/// Non-2xx statuses are remote failures carrying the body's `message` or
/// `error`; a body that is not JSON is a transport failure.
pub fn parse_json_response(status: StatusCode, text: &str) -> StreamResult<AnalysisPayload> {
    let value: Value = serde_json::from_str(text).map_err(|_| {
        if status.is_success() {
            StreamError::Transport("Invalid response from server".to_string())
        } else {
            StreamError::Transport(format!("HTTP error! status: {}", status.as_u16()))
        }
    })?;

    if !status.is_success() {
        let message = ["message", "error"]
            .iter()
            .filter_map(|key| value.get(*key).and_then(Value::as_str))
            .find(|m| !m.trim().is_empty())
            .unwrap_or(DEFAULT_FAILURE_MESSAGE);
        return Err(StreamError::Remote(message.to_string()));
    }

    serde_json::from_value(value)
        .map_err(|e| StreamError::Transport(format!("Invalid response from server: {}", e)))
}

/// Check whether the analysis service is reachable.
///
/// Any HTTP response (even 4xx/5xx) counts as reachable; only connection
/// failures report `false`.
pub async fn check_health(client: &Client, base_url: &str) -> StreamResult<bool> {
    match client.head(base_url).send().await {
        Ok(response) => {
            debug!(status = %response.status(), "health check response");
            Ok(true)
        }
        Err(e) if e.is_connect() || e.is_timeout() => Ok(false),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_uses_body_message() {
        let err = parse_json_response(StatusCode::INTERNAL_SERVER_ERROR, r#"{"message":"bad url"}"#)
            .unwrap_err();
        assert_eq!(err, StreamError::Remote("bad url".to_string()));
    }

    #[test]
    fn test_error_status_falls_back_to_error_field() {
        let err = parse_json_response(StatusCode::BAD_REQUEST, r#"{"error":"missing url"}"#).unwrap_err();
        assert_eq!(err.message(), "missing url");

        let err = parse_json_response(StatusCode::BAD_REQUEST, "{}").unwrap_err();
        assert_eq!(err.message(), DEFAULT_FAILURE_MESSAGE);
    }

    #[test]
    fn test_non_json_body_is_transport_error() {
        let err = parse_json_response(StatusCode::BAD_GATEWAY, "<html>502</html>").unwrap_err();
        assert_eq!(err, StreamError::Transport("HTTP error! status: 502".to_string()));

        let err = parse_json_response(StatusCode::OK, "ok").unwrap_err();
        assert!(matches!(err, StreamError::Transport(_)));
    }

    #[test]
    fn test_success_parses_payload() {
        let payload = parse_json_response(
            StatusCode::OK,
            r#"{"message":"received","executionSummary":{"total":2,"attempted":2,"successful":1,"failed":1}}"#,
        )
        .unwrap();
        assert_eq!(payload.message.as_deref(), Some("received"));
        assert_eq!(payload.execution_summary.map(|s| s.failed), Some(1));
    }
}
