//! Incremental decoder for the `text/event-stream` wire format.
//!
//! Chunks may split lines (and multi-byte characters) anywhere. The decoder
//! buffers raw bytes and only interprets complete, newline-terminated lines,
//! so the frames produced are the same for every chunking of a stream.

use tracing::debug;

use super::types::Frame;

const EVENT_PREFIX: &str = "event:";
const DATA_PREFIX: &str = "data:";

/// Splits a byte stream into [`Frame`]s
#[derive(Debug, Default)]
pub struct FrameDecoder {
    /// Bytes after the last newline seen
    buffer: Vec<u8>,
    /// `event:` name of the record being accumulated
    event_name: Option<String>,
    /// `data:` lines of the record being accumulated
    data: String,
    /// Frames emitted so far
    emitted: usize,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every frame it completed
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Frame> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.buffer[start..].iter().position(|&b| b == b'\n') {
            let end = start + offset;
            let line = String::from_utf8_lossy(&self.buffer[start..end]).into_owned();
            start = end + 1;

            if let Some(frame) = self.process_line(&line) {
                frames.push(frame);
            }
        }
        self.buffer.drain(..start);

        frames
    }

    /// Convenience wrapper over [`FrameDecoder::push`] for text chunks
    pub fn push_str(&mut self, chunk: &str) -> Vec<Frame> {
        self.push(chunk.as_bytes())
    }

    /// Emit the record still being accumulated, if it has any data.
    ///
    /// Call once the transport reports end-of-stream. An unterminated trailing
    /// line is never interpreted; it is discarded.
    pub fn flush(&mut self) -> Option<Frame> {
        if !self.buffer.is_empty() {
            debug!(bytes = self.buffer.len(), "discarding unterminated trailing line");
            self.buffer.clear();
        }
        self.take_frame()
    }

    /// Number of frames emitted since construction
    pub fn frames_emitted(&self) -> usize {
        self.emitted
    }

    fn process_line(&mut self, line: &str) -> Option<Frame> {
        let line = line.strip_suffix('\r').unwrap_or(line);

        if line.is_empty() {
            return self.take_frame();
        }

        if let Some(name) = line.strip_prefix(EVENT_PREFIX) {
            let name = name.trim();
            self.event_name = (!name.is_empty()).then(|| name.to_string());
        } else if let Some(data) = line.strip_prefix(DATA_PREFIX) {
            let data = data.strip_prefix(' ').unwrap_or(data);
            if !self.data.is_empty() {
                self.data.push('\n');
            }
            self.data.push_str(data);
        }
        // Comments (":") and other fields (id:, retry:) are ignored

        None
    }

    fn take_frame(&mut self) -> Option<Frame> {
        let event_name = self.event_name.take();
        if self.data.is_empty() {
            return None;
        }

        self.emitted += 1;
        Some(Frame {
            event_name,
            data_text: std::mem::take(&mut self.data),
        })
    }
}
