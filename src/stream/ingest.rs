use super::classify::classify;
use super::decoder::FrameDecoder;
use super::types::{ClassifiedEvent, StreamError, StreamResult};
use crate::model::{AnalysisPayload, ReconciledState};
use crate::runner::RunOutcome;

/// Last terminal event seen on a stream
#[derive(Debug, Clone, PartialEq)]
pub enum Terminal {
    Complete(AnalysisPayload),
    Error(String),
}

/// Decode + classify pipeline for one event stream.
///
/// Tracks the last terminal event so the run can be resolved once the
/// transport reports end-of-stream.
#[derive(Debug, Default)]
pub struct Ingest {
    decoder: FrameDecoder,
    terminal: Option<Terminal>,
    unknown: usize,
}

impl Ingest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw transport bytes, returning the events they completed
    pub fn push(&mut self, chunk: &[u8]) -> Vec<ClassifiedEvent> {
        let frames = self.decoder.push(chunk);
        frames.iter().map(|frame| self.observe(classify(frame))).collect()
    }

    /// End of stream: classify any record left in the decoder
    pub fn finish(&mut self) -> Option<ClassifiedEvent> {
        let frame = self.decoder.flush()?;
        Some(self.observe(classify(&frame)))
    }

    pub fn terminal(&self) -> Option<&Terminal> {
        self.terminal.as_ref()
    }

    /// Frames that classified as `Unknown`
    pub fn unknown_count(&self) -> usize {
        self.unknown
    }

    pub fn frames_seen(&self) -> usize {
        self.decoder.frames_emitted()
    }

    /// Resolve the run: the final payload, the last remote error, or a
    /// degraded completion carrying the partial state
    pub fn resolve(self, state: &ReconciledState) -> StreamResult<RunOutcome> {
        match self.terminal {
            Some(Terminal::Complete(payload)) => Ok(RunOutcome::Complete(payload)),
            Some(Terminal::Error(message)) => Err(StreamError::Remote(message)),
            None => Ok(RunOutcome::Degraded(state.clone())),
        }
    }

    fn observe(&mut self, event: ClassifiedEvent) -> ClassifiedEvent {
        match &event {
            ClassifiedEvent::Complete(payload) => {
                self.terminal = Some(Terminal::Complete(payload.clone()));
            }
            ClassifiedEvent::Error(message) => {
                self.terminal = Some(Terminal::Error(message.clone()));
            }
            ClassifiedEvent::Unknown => self.unknown += 1,
            _ => {}
        }
        event
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_terminal_wins() {
        let mut ingest = Ingest::new();
        ingest.push(b"data: {\"type\":\"error\",\"message\":\"first\"}\n\n");
        ingest.push(b"data: {\"type\":\"complete\",\"data\":{\"message\":\"ok\"}}\n\n");
        assert!(matches!(ingest.terminal(), Some(Terminal::Complete(_))));

        let outcome = ingest.resolve(&ReconciledState::default());
        assert!(matches!(outcome, Ok(RunOutcome::Complete(p)) if p.message.as_deref() == Some("ok")));
    }

    #[test]
    fn test_no_terminal_is_degraded() {
        let mut ingest = Ingest::new();
        let events = ingest.push(b"data: {\"progress\":5}\n\ndata: nope\n\n");
        assert_eq!(events.len(), 2);
        assert_eq!(ingest.unknown_count(), 1);
        assert_eq!(ingest.frames_seen(), 2);
        assert!(matches!(
            ingest.resolve(&ReconciledState::default()),
            Ok(RunOutcome::Degraded(_))
        ));
    }

    #[test]
    fn test_finish_classifies_trailing_record() {
        let mut ingest = Ingest::new();
        assert!(ingest.push(b"event: error\ndata: {\"message\":\"late\"}\n").is_empty());
        assert_eq!(ingest.finish(), Some(ClassifiedEvent::Error("late".to_string())));
        assert_eq!(
            ingest.resolve(&ReconciledState::default()),
            Err(StreamError::Remote("late".to_string()))
        );
    }
}
