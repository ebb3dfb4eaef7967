//! Data model for an analysis run.
//!
//! Wire-facing types accept the service's camelCase JSON (with a few
//! snake_case aliases seen in older producers). [`ReconciledState`] is the
//! aggregate the rendering layer reads.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::str::FromStr;

use crate::stream::utils::normalize_image_source;

/// The page element an automation step targeted
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ElementWire", rename_all = "camelCase")]
pub struct ElementInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl ElementInfo {
    /// Best label for display: text, then tag name
    pub fn label(&self) -> Option<&str> {
        self.text
            .as_deref()
            .filter(|t| !t.is_empty())
            .or(self.tag_name.as_deref())
    }
}

// Producers send either a bare label or a full element object
#[derive(Deserialize)]
#[serde(untagged)]
enum ElementWire {
    Label(String),
    Info {
        #[serde(default)]
        text: Option<String>,
        #[serde(default, rename = "tagName", alias = "tag_name")]
        tag_name: Option<String>,
        #[serde(default)]
        category: Option<String>,
    },
}

impl From<ElementWire> for ElementInfo {
    fn from(wire: ElementWire) -> Self {
        match wire {
            ElementWire::Label(text) => ElementInfo {
                text: Some(text),
                ..Default::default()
            },
            ElementWire::Info {
                text,
                tag_name,
                category,
            } => ElementInfo {
                text,
                tag_name,
                category,
            },
        }
    }
}

/// What the planner suggested doing with an element
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionSuggestion {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purpose: Option<String>,

    /// 0..1
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,

    #[serde(default, alias = "suggested_value", skip_serializing_if = "Option::is_none")]
    pub suggested_value: Option<String>,
}

/// Outcome of actually performing a step
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,

    #[serde(default)]
    pub success: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A screenshot with its image data normalized to a displayable source
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenshotRef {
    /// `data:` URI or URL, ready to display
    pub src: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub base64: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub element: Option<ElementInfo>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
}

impl ScreenshotRef {
    /// Build from a raw screenshot value. Returns `None` when the value holds
    /// nothing displayable.
    pub fn from_value(value: &Value) -> Option<Self> {
        let src = normalize_image_source(value)?;
        let text = |key: &str| value.get(key).and_then(Value::as_str).map(str::to_string);

        Some(Self {
            src,
            filename: text("filename"),
            url: text("url"),
            base64: text("base64"),
            step: value
                .get("step")
                .and_then(Value::as_u64)
                .and_then(|s| u32::try_from(s).ok()),
            timestamp: text("timestamp"),
            element: value
                .get("element")
                .and_then(|e| ElementInfo::deserialize(e).ok()),
            action: text("action"),
        })
    }
}

fn deserialize_screenshot<'de, D>(deserializer: D) -> Result<Option<ScreenshotRef>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(ScreenshotRef::from_value))
}

/// One attempted automation step
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element: Option<ElementInfo>,

    #[serde(default, alias = "action_suggestion", skip_serializing_if = "Option::is_none")]
    pub action_suggestion: Option<ActionSuggestion>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution: Option<ExecutionOutcome>,

    #[serde(
        default,
        deserialize_with = "deserialize_screenshot",
        skip_serializing_if = "Option::is_none"
    )]
    pub screenshot: Option<ScreenshotRef>,
}

impl ExecutionRecord {
    /// `Some(success)` once the step has been executed
    pub fn succeeded(&self) -> Option<bool> {
        self.execution.as_ref().map(|e| e.success)
    }

    /// Action performed, falling back to the suggested one
    pub fn action_label(&self) -> Option<&str> {
        self.execution
            .as_ref()
            .and_then(|e| e.action.as_deref())
            .or_else(|| self.action_suggestion.as_ref().and_then(|s| s.action.as_deref()))
    }

    pub fn element_label(&self) -> &str {
        self.element
            .as_ref()
            .and_then(ElementInfo::label)
            .unwrap_or("Element")
    }

    pub fn element_text(&self) -> Option<&str> {
        self.element.as_ref().and_then(|e| e.text.as_deref())
    }
}

/// Step counters reported by the service, or derived from the records
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionSummary {
    #[serde(default)]
    pub total: u32,
    #[serde(default)]
    pub attempted: u32,
    #[serde(default)]
    pub successful: u32,
    #[serde(default)]
    pub failed: u32,
}

impl ExecutionSummary {
    pub fn from_records(records: &[ExecutionRecord]) -> Self {
        let attempted = records.iter().filter(|r| r.execution.is_some()).count() as u32;
        let successful = records.iter().filter(|r| r.succeeded() == Some(true)).count() as u32;
        Self {
            total: records.len() as u32,
            attempted,
            successful,
            failed: attempted - successful,
        }
    }
}

/// Final analysis document, from a `complete` event or a plain JSON response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Whole-page screenshot, in any shape the service sends
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_results: Option<Vec<ExecutionRecord>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_summary: Option<ExecutionSummary>,

    #[serde(default, rename = "interactiveDNA", skip_serializing_if = "Option::is_none")]
    pub interactive_dna: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_info: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accessibility: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub performance: Option<Value>,

    /// Fields this client does not interpret
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl AnalysisPayload {
    /// Displayable source for the whole-page screenshot
    pub fn screenshot_src(&self) -> Option<String> {
        self.screenshot.as_ref().and_then(normalize_image_source)
    }
}

/// Step currently executing, for live display only
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentExecution {
    #[serde(default)]
    pub current: Option<u32>,
    #[serde(default)]
    pub total: Option<u32>,
    #[serde(default)]
    pub element: Option<ElementInfo>,
    #[serde(default)]
    pub action: Option<String>,
}

impl CurrentExecution {
    pub fn describe(&self) -> String {
        let count = |n: Option<u32>| n.map(|n| n.to_string()).unwrap_or_else(|| "?".to_string());
        format!(
            "Executing {} on \"{}\" ({}/{})",
            self.action.as_deref().unwrap_or("action"),
            self.element.as_ref().and_then(ElementInfo::label).unwrap_or("element"),
            count(self.current),
            count(self.total),
        )
    }
}

/// Which execution records to show
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResultFilter {
    #[default]
    All,
    Successful,
    Failed,
}

impl ResultFilter {
    pub fn matches(&self, record: &ExecutionRecord) -> bool {
        match self {
            ResultFilter::All => true,
            ResultFilter::Successful => record.succeeded() == Some(true),
            ResultFilter::Failed => record.succeeded() == Some(false),
        }
    }
}

impl FromStr for ResultFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "all" => Ok(ResultFilter::All),
            "successful" | "success" => Ok(ResultFilter::Successful),
            "failed" | "failure" => Ok(ResultFilter::Failed),
            other => Err(format!(
                "Invalid filter '{}'. Use: all, successful, failed",
                other
            )),
        }
    }
}

impl std::fmt::Display for ResultFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResultFilter::All => write!(f, "all"),
            ResultFilter::Successful => write!(f, "successful"),
            ResultFilter::Failed => write!(f, "failed"),
        }
    }
}

/// Externally visible state of one analysis run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconciledState {
    pub is_loading: bool,
    pub error: Option<String>,
    pub success: Option<String>,

    /// 0..100, never decreases within a run
    pub progress_percent: f64,
    pub progress_log: Vec<String>,

    /// Ordered by step, then timestamp, then arrival
    pub execution_results: Vec<ExecutionRecord>,
    pub execution_summary: Option<ExecutionSummary>,
    pub final_payload: Option<AnalysisPayload>,

    /// Transient in-flight step marker; cleared on complete/error
    pub current_execution: Option<CurrentExecution>,

    /// Screenshots that arrived before the record they belong to
    pub pending_screenshots: Vec<ScreenshotRef>,
}

impl ReconciledState {
    /// Fresh state for a run that has just started
    pub fn started() -> Self {
        Self {
            is_loading: true,
            ..Default::default()
        }
    }

    /// Service-reported summary, or one derived from the accumulated records
    pub fn summary(&self) -> ExecutionSummary {
        self.execution_summary
            .unwrap_or_else(|| ExecutionSummary::from_records(&self.execution_results))
    }

    pub fn filtered_results(&self, filter: ResultFilter) -> impl Iterator<Item = &ExecutionRecord> {
        self.execution_results.iter().filter(move |r| filter.matches(r))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_from_chunk_json() {
        let record: ExecutionRecord = serde_json::from_value(json!({
            "step": 3,
            "timestamp": "2026-01-02T03:04:05Z",
            "element": {"text": "Login", "tagName": "BUTTON", "category": "auth"},
            "actionSuggestion": {"action": "click", "confidence": 0.9, "suggested_value": "x"},
            "execution": {"action": "click", "success": false, "error": "detached"},
            "screenshot": {"filename": "s3.png", "base64": "QUJD"}
        }))
        .unwrap();

        assert_eq!(record.step, Some(3));
        assert_eq!(record.element_label(), "Login");
        assert_eq!(record.succeeded(), Some(false));
        assert_eq!(
            record.action_suggestion.as_ref().unwrap().suggested_value.as_deref(),
            Some("x")
        );
        let shot = record.screenshot.unwrap();
        assert_eq!(shot.src, "data:image/png;base64,QUJD");
        assert_eq!(shot.filename.as_deref(), Some("s3.png"));
    }

    #[test]
    fn test_unusable_screenshot_is_dropped() {
        let record: ExecutionRecord =
            serde_json::from_value(json!({"step": 1, "screenshot": {"filename": "x.png"}})).unwrap();
        assert!(record.screenshot.is_none());
    }

    #[test]
    fn test_screenshot_step_out_of_range_is_ignored() {
        let shot = ScreenshotRef::from_value(&json!({"base64": "QUJD", "step": 4_294_967_297u64})).unwrap();
        assert_eq!(shot.step, None);

        let shot = ScreenshotRef::from_value(&json!({"base64": "QUJD", "step": 7})).unwrap();
        assert_eq!(shot.step, Some(7));
    }

    #[test]
    fn test_element_accepts_bare_label() {
        let element: ElementInfo = serde_json::from_value(json!("Submit")).unwrap();
        assert_eq!(element.label(), Some("Submit"));
    }

    #[test]
    fn test_action_label_falls_back_to_suggestion() {
        let record = ExecutionRecord {
            action_suggestion: Some(ActionSuggestion {
                action: Some("fill".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_eq!(record.action_label(), Some("fill"));
        assert_eq!(record.element_label(), "Element");
    }

    #[test]
    fn test_derived_summary() {
        let ok = ExecutionRecord {
            execution: Some(ExecutionOutcome {
                success: true,
                ..Default::default()
            }),
            ..Default::default()
        };
        let failed = ExecutionRecord {
            execution: Some(ExecutionOutcome::default()),
            ..Default::default()
        };
        let pending = ExecutionRecord::default();

        let summary = ExecutionSummary::from_records(&[ok, failed, pending]);
        assert_eq!(
            summary,
            ExecutionSummary {
                total: 3,
                attempted: 2,
                successful: 1,
                failed: 1
            }
        );
    }

    #[test]
    fn test_filter_parse_and_match() {
        assert_eq!("Failed".parse::<ResultFilter>(), Ok(ResultFilter::Failed));
        assert!("bogus".parse::<ResultFilter>().is_err());

        let unexecuted = ExecutionRecord::default();
        assert!(ResultFilter::All.matches(&unexecuted));
        assert!(!ResultFilter::Failed.matches(&unexecuted));
        assert!(!ResultFilter::Successful.matches(&unexecuted));
    }

    #[test]
    fn test_payload_keeps_unknown_fields() {
        let payload: AnalysisPayload = serde_json::from_value(json!({
            "message": "done",
            "interactiveDNA": {"nodes": 4},
            "lighthouse": {"score": 97}
        }))
        .unwrap();
        assert_eq!(payload.message.as_deref(), Some("done"));
        assert_eq!(payload.interactive_dna, Some(json!({"nodes": 4})));
        assert_eq!(payload.extra.get("lighthouse"), Some(&json!({"score": 97})));
    }

    #[test]
    fn test_current_execution_describe() {
        let current: CurrentExecution = serde_json::from_value(json!({
            "current": 2, "total": 5, "element": "Search", "action": "fill"
        }))
        .unwrap();
        assert_eq!(current.describe(), "Executing fill on \"Search\" (2/5)");
    }
}
