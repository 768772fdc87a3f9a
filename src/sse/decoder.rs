//! Event-stream framing.
//!
//! Input is whatever text has arrived so far, including the tail returned by
//! the previous call. Only complete events are returned; everything after the
//! last blank line comes back as the tail.

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawSseEvent {
    pub id: Option<String>,
    /// `"message"` unless the stream named it.
    pub event: String,
    pub data: String,
    pub retry: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Message,
    /// Heartbeat, carries nothing.
    Ping,
    /// Server finished the subscription.
    Done,
}

impl RawSseEvent {
    pub fn kind(&self) -> EventKind {
        match self.event.as_str() {
            "ping" => EventKind::Ping,
            "done" => EventKind::Done,
            _ => EventKind::Message,
        }
    }
}

#[derive(Default)]
struct PendingEvent {
    id: Option<String>,
    event: Option<String>,
    data: Option<String>,
    retry: Option<u32>,
    seen_field: bool,
}

impl PendingEvent {
    fn apply(&mut self, line: &str) {
        let Some((field, value)) = line.split_once(':') else {
            return;
        };
        let value = value.strip_prefix(' ').unwrap_or(value);
        match field {
            "id" => self.id = Some(value.to_owned()),
            "event" => self.event = Some(value.to_owned()),
            "data" => match &mut self.data {
                Some(data) => {
                    data.push('\n');
                    data.push_str(value);
                }
                None => self.data = Some(value.to_owned()),
            },
            "retry" => match value.parse() {
                Ok(retry) => self.retry = Some(retry),
                Err(_) => return,
            },
            _ => return,
        }
        self.seen_field = true;
    }

    fn take(&mut self) -> Option<RawSseEvent> {
        let pending = std::mem::take(self);
        pending.seen_field.then(|| RawSseEvent {
            id: pending.id,
            event: pending.event.unwrap_or_else(|| "message".to_owned()),
            data: pending.data.unwrap_or_default(),
            retry: pending.retry,
        })
    }
}

/// Splits `input` into complete events and the unconsumed tail.
///
/// Lines end at `\r`, `\n` or `\r\n`. A `\r` that ends the input stays in the
/// tail since its `\n` may still be on the way.
pub fn parse_sse_events(input: &str) -> (Vec<RawSseEvent>, String) {
    let mut events = Vec::new();
    let mut pending = PendingEvent::default();
    let mut rest = input;
    let mut offset = 0;
    let mut consumed = 0;

    while let Some(end) = rest.find(['\r', '\n']) {
        let bytes = rest.as_bytes();
        let terminator = match bytes[end] {
            b'\r' if end + 1 == bytes.len() => break,
            b'\r' if bytes[end + 1] == b'\n' => 2,
            _ => 1,
        };
        let line = &rest[..end];
        rest = &rest[end + terminator..];
        offset += end + terminator;

        if line.is_empty() {
            events.extend(pending.take());
            consumed = offset;
        } else {
            pending.apply(line);
        }
    }

    (events, input[consumed..].to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(events: &[RawSseEvent]) -> Vec<&str> {
        events.iter().map(|event| event.data.as_str()).collect()
    }

    #[test]
    fn separate_calls_yield_separate_messages() {
        let (first, tail) = parse_sse_events("data: hello\n\n");
        assert_eq!(tail, "");
        let (second, tail) = parse_sse_events(&format!("{tail}data: world\n\n"));
        assert_eq!(tail, "");
        assert_eq!(data(&first), ["hello"]);
        assert_eq!(data(&second), ["world"]);
        assert!(first.iter().chain(&second).all(|event| event.kind() == EventKind::Message));
        assert_eq!(first[0].event, "message");
    }

    #[test]
    fn split_chunk_is_carried_over() {
        let (events, tail) = parse_sse_events("da");
        assert!(events.is_empty());
        assert_eq!(tail, "da");
        let (events, tail) = parse_sse_events(&format!("{tail}ta: hello\n\n"));
        assert_eq!(data(&events), ["hello"]);
        assert_eq!(tail, "");
    }

    #[test]
    fn all_line_endings_are_accepted() {
        let (events, tail) = parse_sse_events("id: 1\r\ndata: a\r\n\r\nid: 2\rdata: b\r\rdata: c\n\ndata: d\r");
        assert_eq!(data(&events), ["a", "b", "c"]);
        assert_eq!(events[0].id.as_deref(), Some("1"));
        assert_eq!(events[1].id.as_deref(), Some("2"));
        assert_eq!(tail, "data: d\r");
    }

    #[test]
    fn fields_are_collected_per_event() {
        let input = "event: update\nid: 42\nretry: 1500\ndata: one\ndata: two\n\n: comment\n\nretry: soon\nevent: ping\n\n";
        let (events, tail) = parse_sse_events(input);
        assert_eq!(tail, "");
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[0],
            RawSseEvent {
                id: Some("42".into()),
                event: "update".into(),
                data: "one\ntwo".into(),
                retry: Some(1500),
            }
        );
        assert_eq!(events[1].kind(), EventKind::Ping);
        assert_eq!(events[1].retry, None);
    }

    #[test]
    fn done_is_classified() {
        let (events, _) = parse_sse_events("event: done\ndata: \n\n");
        assert_eq!(events[0].kind(), EventKind::Done);
    }

    #[test]
    fn partial_event_after_complete_one_stays_in_tail() {
        let (events, tail) = parse_sse_events("data: x\n\nid: 9\ndata: y\n");
        assert_eq!(data(&events), ["x"]);
        assert_eq!(tail, "id: 9\ndata: y\n");
    }
}
