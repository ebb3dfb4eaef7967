//! Types for analysis run results.

use serde::Serialize;

use crate::model::{AnalysisPayload, ExecutionRecord, ExecutionSummary, ReconciledState, ResultFilter};

/// How a run that did not fail ended
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// The service sent its final payload
    Complete(AnalysisPayload),

    /// The stream closed without a complete or error event
    Degraded(ReconciledState),
}

impl RunOutcome {
    pub fn is_degraded(&self) -> bool {
        matches!(self, RunOutcome::Degraded(_))
    }

    pub fn payload(&self) -> Option<&AnalysisPayload> {
        match self {
            RunOutcome::Complete(payload) => Some(payload),
            RunOutcome::Degraded(state) => state.final_payload.as_ref(),
        }
    }
}

/// Serializable view of a finished run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    /// Whether the run ended without an error
    pub success: bool,

    /// Error message if failed
    pub error: Option<String>,

    /// Success message from the service
    pub message: Option<String>,

    /// True when the stream ended without a terminal event
    pub degraded: bool,

    pub progress_percent: f64,

    pub progress_log: Vec<String>,

    pub execution_summary: ExecutionSummary,

    /// Filter applied to `execution_results`
    pub filter: String,

    pub execution_results: Vec<ExecutionRecord>,
}

impl RunReport {
    pub fn from_state(state: &ReconciledState, filter: ResultFilter) -> Self {
        Self {
            success: state.error.is_none(),
            error: state.error.clone(),
            message: state.success.clone(),
            degraded: state.error.is_none() && state.success.is_none() && !state.is_loading,
            progress_percent: state.progress_percent,
            progress_log: state.progress_log.clone(),
            execution_summary: state.summary(),
            filter: filter.to_string(),
            execution_results: state.filtered_results(filter).cloned().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ExecutionOutcome;

    #[test]
    fn test_report_filters_results() {
        let mut state = ReconciledState::started();
        state.apply_execution_chunk(vec![
            ExecutionRecord {
                step: Some(1),
                execution: Some(ExecutionOutcome {
                    success: true,
                    ..Default::default()
                }),
                ..Default::default()
            },
            ExecutionRecord {
                step: Some(2),
                execution: Some(ExecutionOutcome::default()),
                ..Default::default()
            },
        ]);
        state.apply_complete(AnalysisPayload::default());

        let report = RunReport::from_state(&state, ResultFilter::Failed);
        assert!(report.success);
        assert!(!report.degraded);
        assert_eq!(report.execution_results.len(), 1);
        assert_eq!(report.execution_results[0].step, Some(2));
        assert_eq!(report.execution_summary.failed, 1);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["filter"], "failed");
        assert_eq!(json["progressPercent"], 100.0);
    }

    #[test]
    fn test_degraded_report() {
        let mut state = ReconciledState::started();
        state.finish_degraded();
        let report = RunReport::from_state(&state, ResultFilter::All);
        assert!(report.degraded);
        assert!(report.success);
    }
}
