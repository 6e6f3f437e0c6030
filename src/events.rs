//! Wire format of the message relay.
//!
//! Each event is one line: the `data: ` prefix followed by a JSON object and a
//! single `\n`:
//!
//! ```text
//! data: {"content":"AQI"}
//! data: {"content":" is..."}
//! data: {"content":"","done":true}
//! ```
//!
//! The `done` event is only written once the assistant message has been
//! persisted; a stream that ends without it was cut short.

use serde::{Deserialize, Serialize};

pub const EVENT_PREFIX: &str = "data: ";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamEvent {
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub done: bool,
}

impl StreamEvent {
    pub fn content(fragment: impl Into<String>) -> Self {
        Self {
            content: fragment.into(),
            done: false,
        }
    }

    pub fn done() -> Self {
        Self {
            content: String::new(),
            done: true,
        }
    }

    /// `data: {json}\n`
    pub fn encode(&self) -> Vec<u8> {
        // a struct of a String and a bool always serializes
        let payload = serde_json::to_string(self).unwrap_or_default();
        format!("{}{}\n", EVENT_PREFIX, payload).into_bytes()
    }
}

/// Parses one complete line. `None` for lines that are not events (blank
/// lines, comments, other fields).
pub fn parse_line(line: &str) -> Option<Result<StreamEvent, serde_json::Error>> {
    let payload = line.strip_prefix(EVENT_PREFIX)?;
    Some(serde_json::from_str(payload))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_content_event() {
        let bytes = StreamEvent::content("AQI").encode();
        assert_eq!(bytes, b"data: {\"content\":\"AQI\"}\n");
    }

    #[test]
    fn test_encode_done_event() {
        let bytes = StreamEvent::done().encode();
        assert_eq!(bytes, b"data: {\"content\":\"\",\"done\":true}\n");
    }

    #[test]
    fn test_newlines_in_content_stay_escaped() {
        let bytes = StreamEvent::content("line one\nline two").encode();
        assert_eq!(bytes.iter().filter(|&&b| b == b'\n').count(), 1);
    }

    #[test]
    fn test_parse_line() {
        assert_eq!(
            parse_line("data: {\"content\":\"Hel\"}").unwrap().unwrap(),
            StreamEvent::content("Hel")
        );
        assert!(parse_line("").is_none());
        assert!(parse_line(": keep-alive").is_none());
        assert!(parse_line("data: {not json").unwrap().is_err());
    }
}
