//! Server-sent events: stream framing, reconnect backoff and the subscription
//! driver used by event-stream procedures.
//!
//! The driver performs no I/O of its own; requests go through an
//! [`SseTransport`] supplied by the caller.
pub mod decoder;
pub mod event_source;
pub mod retry;

pub use decoder::{EventKind, RawSseEvent, parse_sse_events};
pub use event_source::{
    EventSource, EventSourceOptions, ResponseError, SseController, SseRequest, SseResponse, SseTransport,
};
pub use retry::{Backoff, RetryPolicy};
