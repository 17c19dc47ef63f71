//! Incremental `text/event-stream` parser.
//!
//! Bytes are buffered until a full line is available, so multi-byte UTF-8
//! sequences and CRLF pairs split across chunks are handled correctly.
//!
//! With a size limit, neither a pending line nor an event's accumulated data
//! grows past it. An event that would is skipped up to its terminating blank
//! line and reported as [`SseItem::Oversized`].

use bytes::{Buf, BytesMut};

const LF: u8 = b'\n';
const CR: u8 = b'\r';
const BOM: &[u8] = "\u{FEFF}".as_bytes();

/// Room for a field name and separator on top of the data limit.
const LINE_OVERHEAD: usize = 64;

/// One dispatched item of the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SseItem {
    /// A complete event.
    Event {
        /// Last event id in effect when the event was dispatched.
        id: String,
        /// Event type, `message` when the server sent none.
        event: String,
        /// Data lines joined with `\n`.
        data: String,
    },
    /// A comment line, without the leading colon.
    Comment(String),
    /// A `retry:` directive in milliseconds.
    Retry(u64),
    /// An event that exceeded the size limit and was skipped.
    Oversized {
        /// Event type seen before the limit was hit, `message` if none.
        event: String,
    },
}

/// Result of looking for the end of the buffered line.
enum Scan {
    Line { end: usize, next: usize },
    Partial { resume: usize },
}

#[derive(Debug, Default)]
pub(crate) struct SseParser {
    buffer: BytesMut,
    /// Buffer offset already known to hold no line terminator.
    scanned: usize,
    max_event_size: Option<usize>,
    started: bool,
    event_type: String,
    data: String,
    has_data: bool,
    oversized: bool,
    discarding_line: bool,
    last_event_id: String,
}

impl SseParser {
    /// A parser that skips events whose data exceeds `max_event_size` bytes.
    pub(crate) fn new(max_event_size: Option<usize>) -> Self {
        Self {
            max_event_size,
            ..Self::default()
        }
    }

    /// The id the next reconnect should resume from, if any was seen.
    pub(crate) fn last_event_id(&self) -> Option<&str> {
        (!self.last_event_id.is_empty()).then_some(self.last_event_id.as_str())
    }

    /// Feeds a chunk and returns everything it completed.
    pub(crate) fn feed(&mut self, chunk: &[u8]) -> Vec<SseItem> {
        self.buffer.extend_from_slice(chunk);

        if !self.started {
            if self.buffer.len() < BOM.len() && BOM.starts_with(&self.buffer) {
                return Vec::new();
            }
            if self.buffer.starts_with(BOM) {
                self.buffer.advance(BOM.len());
            }
            self.started = true;
        }

        let mut items = Vec::new();
        loop {
            match find_eol(&self.buffer, self.scanned) {
                Scan::Line { end, next } => {
                    let line = self.buffer.split_to(next);
                    self.scanned = 0;
                    if std::mem::take(&mut self.discarding_line) {
                        continue;
                    }
                    if self.exceeds_line_limit(end) {
                        self.skip_event();
                        continue;
                    }
                    let line = String::from_utf8_lossy(&line[..end]).into_owned();
                    if let Some(item) = self.process_line(&line) {
                        items.push(item);
                    }
                }
                Scan::Partial { resume } => {
                    if self.discarding_line || self.exceeds_line_limit(resume) {
                        // Keep a trailing CR so a following LF is not read as a blank line.
                        self.buffer.advance(resume);
                        self.scanned = 0;
                        if !self.discarding_line {
                            self.discarding_line = true;
                            self.skip_event();
                        }
                    } else {
                        self.scanned = resume;
                    }
                    break;
                }
            }
        }
        items
    }

    /// Discards a partially received event, as required when a stream ends.
    pub(crate) fn reset(&mut self) {
        self.buffer.clear();
        self.scanned = 0;
        self.started = false;
        self.event_type.clear();
        self.data.clear();
        self.has_data = false;
        self.oversized = false;
        self.discarding_line = false;
    }

    fn exceeds_line_limit(&self, len: usize) -> bool {
        self.max_event_size
            .is_some_and(|max| len > max.saturating_add(LINE_OVERHEAD))
    }

    fn skip_event(&mut self) {
        self.oversized = true;
        self.data = String::new();
        self.has_data = false;
    }

    fn process_line(&mut self, line: &str) -> Option<SseItem> {
        if line.is_empty() {
            return self.dispatch();
        }

        if let Some(comment) = line.strip_prefix(':') {
            let comment = comment.strip_prefix(' ').unwrap_or(comment);
            return Some(SseItem::Comment(comment.to_string()));
        }

        let (field, value) = match line.find(':') {
            Some(colon_pos) => {
                let value = &line[colon_pos + 1..];
                (&line[..colon_pos], value.strip_prefix(' ').unwrap_or(value))
            }
            None => (line, ""),
        };

        match field {
            "event" => self.event_type = value.to_string(),
            "data" => {
                if self.oversized {
                    return None;
                }
                let size = self.data.len() + usize::from(self.has_data) + value.len();
                if self.max_event_size.is_some_and(|max| size > max) {
                    self.skip_event();
                    return None;
                }
                if self.has_data {
                    self.data.push('\n');
                }
                self.data.push_str(value);
                self.has_data = true;
            }
            "id" => {
                if !value.contains('\0') {
                    self.last_event_id = value.to_string();
                }
            }
            "retry" => {
                if !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()) {
                    if let Ok(millis) = value.parse() {
                        return Some(SseItem::Retry(millis));
                    }
                }
            }
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseItem> {
        let event_type = std::mem::take(&mut self.event_type);
        let event = if event_type.is_empty() {
            "message".to_string()
        } else {
            event_type
        };

        if std::mem::take(&mut self.oversized) {
            return Some(SseItem::Oversized { event });
        }
        if !self.has_data {
            return None;
        }
        self.has_data = false;

        Some(SseItem::Event {
            id: self.last_event_id.clone(),
            event,
            data: std::mem::take(&mut self.data),
        })
    }
}

/// Looks for a line terminator at or after `from`.
///
/// A trailing lone CR needs more data to tell CR from CRLF, so the scan
/// resumes at it next time.
fn find_eol(bytes: &[u8], from: usize) -> Scan {
    let Some(offset) = bytes[from..].iter().position(|b| *b == LF || *b == CR) else {
        return Scan::Partial {
            resume: bytes.len(),
        };
    };
    let pos = from + offset;
    if bytes[pos] == LF {
        return Scan::Line {
            end: pos,
            next: pos + 1,
        };
    }
    match bytes.get(pos + 1) {
        None => Scan::Partial { resume: pos },
        Some(&LF) => Scan::Line {
            end: pos,
            next: pos + 2,
        },
        Some(_) => Scan::Line {
            end: pos,
            next: pos + 1,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn event(id: &str, event: &str, data: &str) -> SseItem {
        SseItem::Event {
            id: id.to_string(),
            event: event.to_string(),
            data: data.to_string(),
        }
    }

    #[test]
    fn test_basic_event() {
        let mut parser = SseParser::new(None);
        let items = parser.feed(b"id: 7\nevent: LOCATION_FEED\ndata: {\"lat\":1}\n\n");
        assert_eq!(items, vec![event("7", "LOCATION_FEED", "{\"lat\":1}")]);
        assert_eq!(parser.last_event_id(), Some("7"));
    }

    #[test]
    fn test_default_event_type_and_multiline_data() {
        let mut parser = SseParser::new(None);
        let items = parser.feed(b"data: a\ndata: b\n\n");
        assert_eq!(items, vec![event("", "message", "a\nb")]);
    }

    #[test]
    fn test_split_chunks_and_crlf() {
        let mut parser = SseParser::new(None);
        assert!(parser.feed(b"data: hel").is_empty());
        assert!(parser.feed(b"lo\r").is_empty());
        let items = parser.feed(b"\n\r\n");
        assert_eq!(items, vec![event("", "message", "hello")]);
    }

    #[test]
    fn test_multibyte_split_across_chunks() {
        let mut parser = SseParser::new(None);
        let bytes = "data: caf\u{e9}\n\n".as_bytes();
        let split = bytes.len() - 3;
        assert!(parser.feed(&bytes[..split]).is_empty());
        let items = parser.feed(&bytes[split..]);
        assert_eq!(items, vec![event("", "message", "caf\u{e9}")]);
    }

    #[test]
    fn test_comment_and_retry() {
        let mut parser = SseParser::new(None);
        let items = parser.feed(b": keep-alive\nretry: 2500\nretry: soon\n\n");
        assert_eq!(
            items,
            vec![SseItem::Comment("keep-alive".to_string()), SseItem::Retry(2500)]
        );
    }

    #[test]
    fn test_event_without_data_is_not_dispatched() {
        let mut parser = SseParser::new(None);
        assert!(parser.feed(b"event: PING\n\n").is_empty());
        let items = parser.feed(b"data: x\n\n");
        assert_eq!(items, vec![event("", "message", "x")]);
    }

    #[test]
    fn test_bom_is_skipped() {
        let mut parser = SseParser::new(None);
        let mut bytes = BOM.to_vec();
        bytes.extend_from_slice(b"data: x\n\n");
        assert_eq!(parser.feed(&bytes), vec![event("", "message", "x")]);
    }

    #[test]
    fn test_reset_drops_partial_event_but_keeps_id() {
        let mut parser = SseParser::new(None);
        parser.feed(b"id: 3\ndata: partial\n");
        parser.reset();
        let items = parser.feed(b"data: fresh\n\n");
        assert_eq!(items, vec![event("3", "message", "fresh")]);
    }

    #[test]
    fn test_overlong_line_is_discarded_while_buffering() {
        let mut parser = SseParser::new(Some(16));
        assert!(parser.feed(b"data: ").is_empty());
        for _ in 0..1000 {
            assert!(parser.feed(&[b'x'; 64]).is_empty());
            assert!(parser.buffer.len() <= 16 + LINE_OVERHEAD + 64);
        }
        let items = parser.feed(b"xxx\r");
        assert!(items.is_empty());
        let items = parser.feed(b"\ndata: more\n\ndata: ok\n\n");
        assert_eq!(
            items,
            vec![
                SseItem::Oversized {
                    event: "message".to_string()
                },
                event("", "message", "ok"),
            ]
        );
    }

    #[test]
    fn test_oversized_multiline_data_is_skipped() {
        let mut parser = SseParser::new(Some(10));
        let items = parser.feed(b"event: BIG\ndata: 123456\ndata: 7890\n");
        assert!(items.is_empty());
        assert!(parser.data.is_empty());
        let items = parser.feed(b"data: x\n\nevent: SMALL\ndata: 123456\ndata: 789\n\n");
        assert_eq!(
            items,
            vec![
                SseItem::Oversized {
                    event: "BIG".to_string()
                },
                event("", "SMALL", "123456\n789"),
            ]
        );
    }

    #[test]
    fn test_scan_resumes_after_partial_chunks() {
        let mut parser = SseParser::new(None);
        for byte in b"data: abc" {
            assert!(parser.feed(&[*byte]).is_empty());
        }
        assert_eq!(parser.scanned, parser.buffer.len());
        let items = parser.feed(b"\n\n");
        assert_eq!(items, vec![event("", "message", "abc")]);
        assert_eq!(parser.scanned, 0);
    }
}
