//! Event classification.
//!
//! The service is not consistent about how it labels events: some carry a
//! `type` field, some only an `event:` name, some neither. Classification
//! tries, in order:
//!
//! 1. a recognised `type` field
//! 2. a recognised event name, when the payload has no `type` field
//! 3. field presence: `chunk` array, `screenshot` object, `data` field,
//!    then `message`/`progress`
//!
//! Classification is total. Anything that cannot be interpreted becomes
//! [`ClassifiedEvent::Unknown`] and is logged, never returned as an error.

use serde_json::Value;
use tracing::{debug, warn};

use super::types::{ClassifiedEvent, EventKind, Frame, ProgressEvent, ScreenshotEvent, StreamError, StreamResult};
use crate::model::{AnalysisPayload, ExecutionRecord};

/// Message used when an error event carries no text
pub const DEFAULT_ERROR_MESSAGE: &str = "Analysis failed";

/// Classify a decoded frame
pub fn classify(frame: &Frame) -> ClassifiedEvent {
    let event_name = frame.event_name.as_deref().unwrap_or("-");

    let payload: Value = match serde_json::from_str(&frame.data_text) {
        Ok(value) => value,
        Err(e) => {
            warn!(event = event_name, error = %e, "skipping frame with malformed payload");
            return ClassifiedEvent::Unknown;
        }
    };

    let Some(kind) = detect_kind(frame.event_name.as_deref(), &payload) else {
        debug!(event = event_name, "unrecognised event");
        return ClassifiedEvent::Unknown;
    };

    match build_event(kind, payload) {
        Ok(event) => event,
        Err(e) => {
            warn!(event = event_name, kind = kind.as_str(), error = %e, "skipping event");
            ClassifiedEvent::Unknown
        }
    }
}

/// Pick the event kind for a parsed payload
pub fn detect_kind(event_name: Option<&str>, payload: &Value) -> Option<EventKind> {
    let object = payload.as_object()?;

    match object.get("type") {
        Some(type_field) => {
            if let Some(kind) = type_field.as_str().and_then(EventKind::from_name) {
                return Some(kind);
            }
        }
        None => {
            if let Some(kind) = event_name.and_then(EventKind::from_name) {
                return Some(kind);
            }
        }
    }

    if object.get("chunk").is_some_and(Value::is_array) {
        Some(EventKind::ExecutionChunk)
    } else if object.get("screenshot").is_some_and(Value::is_object) {
        Some(EventKind::Screenshot)
    } else if object.contains_key("data") {
        Some(EventKind::Complete)
    } else if object.contains_key("message") || object.contains_key("progress") {
        Some(EventKind::Progress)
    } else {
        None
    }
}

fn build_event(kind: EventKind, payload: Value) -> StreamResult<ClassifiedEvent> {
    let event = match kind {
        EventKind::Progress => ClassifiedEvent::Progress(serde_json::from_value::<ProgressEvent>(payload)?),
        EventKind::Screenshot => ClassifiedEvent::Screenshot(serde_json::from_value::<ScreenshotEvent>(payload)?),
        EventKind::ExecutionChunk => {
            let chunk = payload
                .get("chunk")
                .cloned()
                .ok_or_else(|| StreamError::Protocol("execution chunk without `chunk` array".to_string()))?;
            ClassifiedEvent::ExecutionChunk(serde_json::from_value::<Vec<ExecutionRecord>>(chunk)?)
        }
        EventKind::Complete => ClassifiedEvent::Complete(complete_payload(payload)?),
        EventKind::Error => ClassifiedEvent::Error(error_message(&payload)),
    };
    Ok(event)
}

fn complete_payload(mut payload: Value) -> StreamResult<AnalysisPayload> {
    let body = match payload.as_object_mut().and_then(|o| o.remove("data")) {
        Some(data @ Value::Object(_)) => data,
        Some(Value::Null) | None => {
            // No nested document: the event itself is the payload
            if let Some(object) = payload.as_object_mut() {
                object.remove("type");
            }
            payload
        }
        Some(other) => {
            return Err(StreamError::Protocol(format!(
                "complete event `data` is not an object: {}",
                other
            )));
        }
    };
    Ok(serde_json::from_value(body)?)
}

fn error_message(payload: &Value) -> String {
    ["message", "error"]
        .iter()
        .filter_map(|key| payload.get(*key))
        .find_map(|value| match value {
            Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
            Value::Object(inner) => inner.get("message").and_then(Value::as_str).map(str::to_string),
            _ => None,
        })
        .unwrap_or_else(|| DEFAULT_ERROR_MESSAGE.to_string())
}
