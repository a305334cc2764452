//! Incremental server-sent event decoding
//!
//! The transport hands the relay arbitrary byte chunks; events may span chunk
//! boundaries, carry multiple `data:` lines, and use CRLF line endings. The
//! decoder buffers raw bytes, completes lines at `\n`, and emits an event at
//! each blank-line terminator. Multiple `data:` lines are joined with `\n`;
//! comment lines (leading `:`) are ignored per the SSE spec.

/// One decoded server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// Value of the `event:` field, when the remote names its events.
    pub event: Option<String>,
    /// Joined `data:` payload lines.
    pub data: String,
}

/// Streaming SSE decoder fed by transport chunks.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buf: Vec<u8>,
    event_name: Option<String>,
    data_lines: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of bytes, returning every event the chunk completed.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buf.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(newline) = self.buf.iter().position(|&b| b == b'\n') {
            // A full line is buffered before decoding, so a multi-byte
            // character split across chunks never decodes lossily.
            let line_bytes: Vec<u8> = self.buf.drain(..=newline).collect();
            let line = String::from_utf8_lossy(&line_bytes[..newline]);
            let line = line.strip_suffix('\r').unwrap_or(&line);

            if line.is_empty() {
                if let Some(event) = self.flush() {
                    events.push(event);
                }
                continue;
            }
            if line.starts_with(':') {
                continue;
            }

            let (field, value) = match line.split_once(':') {
                Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
                None => (line, ""),
            };
            match field {
                "data" => self.data_lines.push(value.to_string()),
                "event" => self.event_name = Some(value.to_string()),
                _ => {}
            }
        }
        events
    }

    fn flush(&mut self) -> Option<SseEvent> {
        if self.data_lines.is_empty() {
            self.event_name = None;
            return None;
        }
        Some(SseEvent {
            event: self.event_name.take(),
            data: std::mem::take(&mut self.data_lines).join("\n"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_single_event() {
        let mut decoder = SseDecoder::new();
        let events = decoder.feed(b"data: {\"x\":1}\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "{\"x\":1}");
        assert_eq!(events[0].event, None);
    }

    #[test]
    fn joins_multiple_data_lines() {
        let mut decoder = SseDecoder::new();
        let events = decoder.feed(b"data: one\ndata: two\n\n");
        assert_eq!(events[0].data, "one\ntwo");
    }

    #[test]
    fn captures_event_field_and_resets_it() {
        let mut decoder = SseDecoder::new();
        let events = decoder.feed(b"event: delta\ndata: a\n\ndata: b\n\n");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event.as_deref(), Some("delta"));
        assert_eq!(events[1].event, None);
    }

    #[test]
    fn skips_comments_and_unknown_fields() {
        let mut decoder = SseDecoder::new();
        let events = decoder.feed(b": keep-alive\nid: 7\nretry: 100\ndata: x\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "x");
    }

    #[test]
    fn handles_crlf_line_endings() {
        let mut decoder = SseDecoder::new();
        let events = decoder.feed(b"data: x\r\n\r\n");
        assert_eq!(events[0].data, "x");
    }

    #[test]
    fn events_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(b"da").is_empty());
        assert!(decoder.feed(b"ta: hel").is_empty());
        assert!(decoder.feed(b"lo\n").is_empty());
        let events = decoder.feed(b"\ndata: [DONE]\n\n");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].data, "hello");
        assert_eq!(events[1].data, "[DONE]");
    }

    #[test]
    fn multibyte_character_split_across_chunks() {
        let payload = "data: caf\u{e9}\n\n".as_bytes();
        // Split inside the two-byte é sequence.
        let split = payload.len() - 4;
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(&payload[..split]).is_empty());
        let events = decoder.feed(&payload[split..]);
        assert_eq!(events[0].data, "caf\u{e9}");
    }

    #[test]
    fn blank_line_without_data_emits_nothing() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(b"\n\nevent: ping\n\n").is_empty());
    }

    #[test]
    fn data_without_space_after_colon() {
        let mut decoder = SseDecoder::new();
        let events = decoder.feed(b"data:tight\n\n");
        assert_eq!(events[0].data, "tight");
    }
}
