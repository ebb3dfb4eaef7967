//! Reconciliation of classified events into a [`ReconciledState`].
//!
//! Every operation here is a merge of one event into the state. Merges are
//! idempotent for execution chunks and order-insensitive for screenshots, so a
//! recorded stream can be replayed deterministically.
//!
//! Screenshot attachment policy:
//! - match by `step` when the screenshot has one, otherwise by `timestamp`
//! - the first screenshot attached to a record is kept; later ones are dropped
//! - no match plus an inline `execution` payload synthesizes a new record
//! - no match otherwise parks the screenshot until its record arrives

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::model::{AnalysisPayload, CurrentExecution, ExecutionRecord, ReconciledState, ScreenshotRef};
use crate::runner::RunOutcome;
use crate::stream::{ClassifiedEvent, Ingest, ProgressEvent, ScreenshotEvent, StreamResult};

/// Success message used when the final payload has none
pub const DEFAULT_SUCCESS_MESSAGE: &str = "Analysis request received successfully";

/// Stage name whose metadata describes the step being executed
const EXECUTION_STAGE: &str = "execution";

/// Identity used to merge updates into an existing execution record
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RecordKey {
    Step(u32),
    Moment {
        timestamp: String,
        element_text: Option<String>,
    },
}

impl RecordKey {
    /// `None` for records with neither a step nor a timestamp
    pub fn of(record: &ExecutionRecord) -> Option<Self> {
        if let Some(step) = record.step {
            return Some(RecordKey::Step(step));
        }
        record.timestamp.as_ref().map(|timestamp| RecordKey::Moment {
            timestamp: timestamp.clone(),
            element_text: record.element_text().map(str::to_string),
        })
    }
}

/// Pure form of [`ReconciledState::apply`]
pub fn reduce(mut state: ReconciledState, event: ClassifiedEvent) -> ReconciledState {
    state.apply(event);
    state
}

impl ReconciledState {
    /// Merge one classified event
    pub fn apply(&mut self, event: ClassifiedEvent) {
        match event {
            ClassifiedEvent::Progress(progress) => self.apply_progress(progress),
            ClassifiedEvent::Screenshot(screenshot) => self.apply_screenshot(screenshot),
            ClassifiedEvent::ExecutionChunk(records) => self.apply_execution_chunk(records),
            ClassifiedEvent::Complete(payload) => self.apply_complete(payload),
            ClassifiedEvent::Error(message) => self.apply_error(message),
            ClassifiedEvent::Unknown => {}
        }
    }

    pub fn apply_progress(&mut self, event: ProgressEvent) {
        if let Some(percent) = event.progress.filter(|p| p.is_finite()) {
            // Never move backwards within a run
            self.progress_percent = self.progress_percent.max(percent.clamp(0.0, 100.0));
        }

        if let Some(message) = event.message.filter(|m| !m.trim().is_empty()) {
            self.progress_log.push(message);
        }

        if event.stage.as_deref() == Some(EXECUTION_STAGE) {
            let current = event
                .metadata
                .and_then(|meta| serde_json::from_value::<CurrentExecution>(meta).ok())
                .filter(|c| c.current.is_some() && c.total.is_some());
            if current.is_some() {
                self.current_execution = current;
            }
        }
    }

    pub fn apply_screenshot(&mut self, event: ScreenshotEvent) {
        let ScreenshotEvent {
            screenshot,
            step,
            timestamp,
            element,
            action,
            execution,
        } = event;

        let Some(mut shot) = ScreenshotRef::from_value(&screenshot) else {
            debug!(?step, "screenshot event without displayable image");
            return;
        };
        shot.step = step.or(shot.step);
        shot.timestamp = timestamp.or(shot.timestamp);
        shot.element = element.or(shot.element);
        shot.action = action.or(shot.action);

        if let Some(record) = self
            .execution_results
            .iter_mut()
            .find(|record| screenshot_targets(&shot, record))
        {
            attach_screenshot(record, shot, execution);
            return;
        }

        if let Some(execution) = execution {
            self.execution_results.push(ExecutionRecord {
                step: shot.step,
                timestamp: shot.timestamp.clone(),
                element: shot.element.clone(),
                action_suggestion: None,
                execution: Some(execution),
                screenshot: Some(shot),
            });
            sort_results(&mut self.execution_results);
            return;
        }

        if shot.step.is_none() && shot.timestamp.is_none() {
            debug!("dropping screenshot with no step or timestamp");
            return;
        }
        let already_parked = self
            .pending_screenshots
            .iter()
            .any(|parked| parked.step == shot.step && parked.timestamp == shot.timestamp);
        if already_parked {
            debug!(step = ?shot.step, "dropping duplicate screenshot");
        } else {
            self.pending_screenshots.push(shot);
        }
    }

    pub fn apply_execution_chunk(&mut self, records: Vec<ExecutionRecord>) {
        for record in records {
            let index = match RecordKey::of(&record) {
                Some(key) => {
                    let existing = self
                        .execution_results
                        .iter()
                        .position(|r| RecordKey::of(r).as_ref() == Some(&key));
                    match existing {
                        Some(index) => {
                            merge_record(&mut self.execution_results[index], record);
                            index
                        }
                        None => {
                            self.execution_results.push(record);
                            self.execution_results.len() - 1
                        }
                    }
                }
                // Keyless records only deduplicate on exact equality
                None => match self.execution_results.iter().position(|r| *r == record) {
                    Some(index) => index,
                    None => {
                        self.execution_results.push(record);
                        self.execution_results.len() - 1
                    }
                },
            };
            self.claim_pending_screenshot(index);
        }
        sort_results(&mut self.execution_results);
    }

    pub fn apply_complete(&mut self, payload: AnalysisPayload) {
        self.success = Some(
            payload
                .message
                .clone()
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_SUCCESS_MESSAGE.to_string()),
        );
        self.error = None;

        // The final snapshot is authoritative
        if let Some(results) = &payload.execution_results {
            self.execution_results = results.clone();
            for index in 0..self.execution_results.len() {
                self.claim_pending_screenshot(index);
            }
            sort_results(&mut self.execution_results);
        }
        if let Some(summary) = payload.execution_summary {
            self.execution_summary = Some(summary);
        }

        self.final_payload = Some(payload);
        self.progress_percent = 100.0;
        self.current_execution = None;
        self.is_loading = false;
    }

    /// Record a failure; accumulated results stay visible
    pub fn apply_error(&mut self, message: impl Into<String>) {
        self.error = Some(message.into());
        self.success = None;
        self.current_execution = None;
        self.is_loading = false;
    }

    /// Stream ended without a terminal event
    pub fn finish_degraded(&mut self) {
        self.current_execution = None;
        self.is_loading = false;
    }

    fn claim_pending_screenshot(&mut self, index: usize) {
        let record = &mut self.execution_results[index];
        if record.screenshot.is_some() {
            return;
        }
        if let Some(pos) = self
            .pending_screenshots
            .iter()
            .position(|shot| screenshot_targets(shot, record))
        {
            let shot = self.pending_screenshots.remove(pos);
            attach_screenshot(record, shot, None);
        }
    }
}

/// Whether a screenshot belongs to a record: by step, else by timestamp
fn screenshot_targets(shot: &ScreenshotRef, record: &ExecutionRecord) -> bool {
    match (shot.step, &shot.timestamp) {
        (Some(step), _) => record.step == Some(step),
        (None, Some(timestamp)) => record.timestamp.as_ref() == Some(timestamp),
        (None, None) => false,
    }
}

/// Attach a screenshot (first write wins) and fill fields the record lacks.
///
/// Fields that make up the record's [`RecordKey`] are never changed here.
fn attach_screenshot(
    record: &mut ExecutionRecord,
    shot: ScreenshotRef,
    execution: Option<crate::model::ExecutionOutcome>,
) {
    // Only step-keyed records may gain a timestamp or element
    if record.step.is_some() {
        if record.timestamp.is_none() {
            record.timestamp = shot.timestamp.clone();
        }
        if record.element.is_none() {
            record.element = shot.element.clone();
        }
    }
    if record.execution.is_none() {
        record.execution = execution;
    }
    if record.screenshot.is_none() {
        record.screenshot = Some(shot);
    } else {
        debug!(step = ?record.step, "record already has a screenshot, dropping new one");
    }
}

/// Field-by-field merge; newer values win except for an existing screenshot
fn merge_record(existing: &mut ExecutionRecord, newer: ExecutionRecord) {
    let ExecutionRecord {
        step,
        timestamp,
        element,
        action_suggestion,
        execution,
        screenshot,
    } = newer;

    if step.is_some() {
        existing.step = step;
    }
    if timestamp.is_some() {
        existing.timestamp = timestamp;
    }
    if element.is_some() {
        existing.element = element;
    }
    if action_suggestion.is_some() {
        existing.action_suggestion = action_suggestion;
    }
    if execution.is_some() {
        existing.execution = execution;
    }
    if existing.screenshot.is_none() {
        existing.screenshot = screenshot;
    }
}

/// Order by step, then by timestamp, then by arrival (stable)
pub fn sort_results(results: &mut [ExecutionRecord]) {
    results.sort_by_cached_key(sort_key);
}

fn sort_key(record: &ExecutionRecord) -> (u8, u32, Option<DateTime<Utc>>, Option<String>) {
    if let Some(step) = record.step {
        return (0, step, None, None);
    }
    match &record.timestamp {
        Some(raw) => match DateTime::parse_from_rfc3339(raw) {
            Ok(parsed) => (1, 0, Some(parsed.with_timezone(&Utc)), None),
            Err(_) => (2, 0, None, Some(raw.clone())),
        },
        None => (3, 0, None, None),
    }
}

/// Result of replaying a recorded stream
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayResult {
    pub state: ReconciledState,
    pub outcome: StreamResult<RunOutcome>,
}

/// Run recorded event-stream bytes through decode, classify and merge, the
/// same way a live run does
pub fn replay<I, C>(chunks: I) -> ReplayResult
where
    I: IntoIterator<Item = C>,
    C: AsRef<[u8]>,
{
    let mut state = ReconciledState::started();
    let mut ingest = Ingest::new();

    for chunk in chunks {
        for event in ingest.push(chunk.as_ref()) {
            state.apply(event);
        }
    }
    if let Some(event) = ingest.finish() {
        state.apply(event);
    }
    if ingest.terminal().is_none() {
        state.finish_degraded();
    }

    let outcome = ingest.resolve(&state);
    ReplayResult { state, outcome }
}
