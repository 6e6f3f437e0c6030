//! Rebuilds the assistant reply from the relay's chunked event stream.
//!
//! Network reads split the body anywhere: inside a UTF-8 character, inside the
//! JSON of an event, between `\r` and `\n`. The reassembler carries the
//! unterminated tail of each read into the next one and only parses complete
//! lines.

use crate::events::{self, StreamEvent};
use crate::helpers::LineDecoder;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    /// The `done` event arrived.
    Completed,
    /// The stream ended without `done`: refused, aborted or cut short.
    Truncated,
}

#[derive(Debug, Default)]
pub struct StreamReassembler {
    decoder: LineDecoder,
    text: String,
    done: bool,
    skipped: usize,
}

impl StreamReassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consumes one read and returns the fragments it completed, in order.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut fragments = Vec::new();
        for line in self.decoder.push(chunk) {
            if self.done {
                continue;
            }
            match events::parse_line(&line) {
                None => {}
                Some(Ok(event)) => self.apply(event, &mut fragments),
                Some(Err(err)) => {
                    self.skipped += 1;
                    tracing::warn!(error = %err, line = %line, "Skipping malformed stream event");
                }
            }
        }
        fragments
    }

    fn apply(&mut self, event: StreamEvent, fragments: &mut Vec<String>) {
        if !event.content.is_empty() {
            self.text.push_str(&event.content);
            fragments.push(event.content);
        }
        if event.done {
            self.done = true;
        }
    }

    /// Everything received so far.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Events that could not be parsed.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Ends the stream. An unterminated trailing line is discarded.
    pub fn finish(&mut self) -> StreamOutcome {
        let dropped = self.decoder.finish();
        if dropped > 0 {
            tracing::debug!(dropped, "Discarding unterminated trailing line");
        }
        if self.done {
            StreamOutcome::Completed
        } else {
            StreamOutcome::Truncated
        }
    }
}
