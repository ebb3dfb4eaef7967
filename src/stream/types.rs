// Core types for the event-stream pipeline

use serde::{Deserialize, Serialize};

use crate::model::{AnalysisPayload, ElementInfo, ExecutionOutcome, ExecutionRecord};

/// One decoded record from the event stream, before interpretation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Value of the `event:` line, if the record carried one
    pub event_name: Option<String>,

    /// Concatenated `data:` lines, joined with `\n`
    pub data_text: String,
}

impl Frame {
    pub fn new(event_name: Option<&str>, data_text: impl Into<String>) -> Self {
        Self {
            event_name: event_name.map(str::to_string),
            data_text: data_text.into(),
        }
    }
}

/// Semantic kind of a classified event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Progress,
    Screenshot,
    ExecutionChunk,
    Complete,
    Error,
}

impl EventKind {
    /// Parse a protocol name (`type` field or `event:` name)
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim() {
            "progress" => Some(EventKind::Progress),
            "screenshot" => Some(EventKind::Screenshot),
            "execution_chunk" => Some(EventKind::ExecutionChunk),
            "complete" => Some(EventKind::Complete),
            "error" => Some(EventKind::Error),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Progress => "progress",
            EventKind::Screenshot => "screenshot",
            EventKind::ExecutionChunk => "execution_chunk",
            EventKind::Complete => "complete",
            EventKind::Error => "error",
        }
    }
}

/// A frame after classification. Exactly one kind per frame.
#[derive(Debug, Clone, PartialEq)]
pub enum ClassifiedEvent {
    Progress(ProgressEvent),
    Screenshot(ScreenshotEvent),
    ExecutionChunk(Vec<ExecutionRecord>),
    Complete(AnalysisPayload),
    Error(String),
    /// Unparseable or unrecognised payload; skipped by the store
    Unknown,
}

impl ClassifiedEvent {
    pub fn kind(&self) -> Option<EventKind> {
        match self {
            ClassifiedEvent::Progress(_) => Some(EventKind::Progress),
            ClassifiedEvent::Screenshot(_) => Some(EventKind::Screenshot),
            ClassifiedEvent::ExecutionChunk(_) => Some(EventKind::ExecutionChunk),
            ClassifiedEvent::Complete(_) => Some(EventKind::Complete),
            ClassifiedEvent::Error(_) => Some(EventKind::Error),
            ClassifiedEvent::Unknown => None,
        }
    }

    /// Whether this event ends the loading phase of a run
    pub fn is_terminal(&self) -> bool {
        matches!(self, ClassifiedEvent::Complete(_) | ClassifiedEvent::Error(_))
    }
}

/// Payload of a `progress` event
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Percent complete (0..100)
    #[serde(default, alias = "percent")]
    pub progress: Option<f64>,

    #[serde(default)]
    pub message: Option<String>,

    /// Pipeline stage, e.g. "execution"
    #[serde(default)]
    pub stage: Option<String>,

    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

/// Payload of a `screenshot` event
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScreenshotEvent {
    /// Raw screenshot value; object `{filename, url, base64}` or a bare string
    #[serde(default)]
    pub screenshot: serde_json::Value,

    #[serde(default)]
    pub step: Option<u32>,

    #[serde(default)]
    pub timestamp: Option<String>,

    #[serde(default)]
    pub element: Option<ElementInfo>,

    #[serde(default)]
    pub action: Option<String>,

    /// Inline execution outcome; lets the store synthesize a record
    #[serde(default)]
    pub execution: Option<ExecutionOutcome>,
}

/// Result type for stream operations
pub type StreamResult<T> = Result<T, StreamError>;

/// Error types for an analysis run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    /// Empty or invalid input; no request was made
    Validation(String),

    /// Connection, network, cancellation or deadline failure
    Transport(String),

    /// Malformed frame or payload; recovered per event
    Protocol(String),

    /// Explicit error reported by the analysis service
    Remote(String),
}

impl StreamError {
    /// Short message suitable for showing to the user
    pub fn message(&self) -> &str {
        match self {
            StreamError::Validation(msg)
            | StreamError::Transport(msg)
            | StreamError::Protocol(msg)
            | StreamError::Remote(msg) => msg,
        }
    }
}

impl std::fmt::Display for StreamError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamError::Validation(msg) => write!(f, "Validation error: {}", msg),
            StreamError::Transport(msg) => write!(f, "Transport error: {}", msg),
            StreamError::Protocol(msg) => write!(f, "Protocol error: {}", msg),
            StreamError::Remote(msg) => write!(f, "Analysis failed: {}", msg),
        }
    }
}

impl std::error::Error for StreamError {}

impl From<serde_json::Error> for StreamError {
    fn from(err: serde_json::Error) -> Self {
        StreamError::Protocol(err.to_string())
    }
}

impl From<reqwest::Error> for StreamError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() {
            StreamError::Transport("Failed to connect to server. Please try again.".to_string())
        } else if err.is_timeout() {
            StreamError::Transport("Request timed out".to_string())
        } else {
            StreamError::Transport(err.to_string())
        }
    }
}
