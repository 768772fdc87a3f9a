//! Subscription driver: connect, stream, back off, reconnect.
use std::future::Future;
use std::sync::Arc;

use futures::StreamExt;
use futures::stream::BoxStream;
use indexmap::IndexMap;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::app_def::HttpMethod;
use crate::error::SseError;
use crate::sse::decoder::{EventKind, parse_sse_events};
use crate::sse::retry::{Backoff, RetryPolicy};

// ————————————————————————————————————————————————————————————————————————————
// TRANSPORT
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseRequest {
    pub url: String,
    pub method: HttpMethod,
    pub headers: IndexMap<String, String>,
    pub body: Option<String>,
}

pub enum SseResponse {
    Ok {
        status: u16,
        body: BoxStream<'static, Result<Vec<u8>, SseError>>,
    },
    Error {
        status: u16,
        status_text: String,
        body: String,
    },
}

/// Performs one HTTP exchange on behalf of the driver.
pub trait SseTransport: Send + Sync {
    fn send(&self, request: SseRequest) -> impl Future<Output = Result<SseResponse, SseError>> + Send;
}

impl<T: SseTransport + ?Sized> SseTransport for Arc<T> {
    fn send(&self, request: SseRequest) -> impl Future<Output = Result<SseResponse, SseError>> + Send {
        (**self).send(request)
    }
}

/// Error envelope servers send with non-success statuses.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ResponseError {
    pub code: u16,
    pub message: String,
    pub data: Option<serde_json::Value>,
}

impl ResponseError {
    /// Best effort: missing envelope fields fall back to the HTTP status line.
    pub fn from_response(status: u16, status_text: &str, body: &str) -> Self {
        let mut error: ResponseError = serde_json::from_str(body).unwrap_or_default();
        if error.code == 0 {
            error.code = status;
        }
        if error.message.is_empty() {
            error.message = status_text.to_owned();
        }
        error
    }

    fn stream(message: impl Into<String>) -> Self {
        Self {
            code: 0,
            message: message.into(),
            data: None,
        }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// OPTIONS
// ————————————————————————————————————————————————————————————————————————————

/// Handle for stopping a subscription from a hook or another task.
#[derive(Debug, Clone, Default)]
pub struct SseController {
    token: CancellationToken,
}

impl SseController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    async fn cancelled(&self) {
        self.token.cancelled().await
    }
}

type Hook<A> = Box<dyn FnMut(A, &SseController) + Send>;

/// Subscription hooks. Every hook defaults to a no-op.
pub struct EventSourceOptions<T> {
    pub on_message: Hook<T>,
    pub on_request: Box<dyn FnMut(&SseRequest, &SseController) + Send>,
    pub on_request_error: Box<dyn FnMut(&SseError, &SseController) + Send>,
    /// Receives the status code of every response, success or not.
    pub on_response: Hook<u16>,
    pub on_response_error: Box<dyn FnMut(&ResponseError, &SseController) + Send>,
    pub on_close: Box<dyn FnMut() + Send>,
    pub retry: RetryPolicy,
}

impl<T: 'static> Default for EventSourceOptions<T> {
    fn default() -> Self {
        Self {
            on_message: Box::new(|_: T, _: &SseController| {}),
            on_request: Box::new(|_: &SseRequest, _: &SseController| {}),
            on_request_error: Box::new(|_: &SseError, _: &SseController| {}),
            on_response: Box::new(|_: u16, _: &SseController| {}),
            on_response_error: Box::new(|_: &ResponseError, _: &SseController| {}),
            on_close: Box::new(|| {}),
            retry: RetryPolicy::default(),
        }
    }
}

impl<T> EventSourceOptions<T> {
    pub fn on_message(mut self, hook: impl FnMut(T, &SseController) + Send + 'static) -> Self {
        self.on_message = Box::new(hook);
        self
    }

    pub fn on_request(mut self, hook: impl FnMut(&SseRequest, &SseController) + Send + 'static) -> Self {
        self.on_request = Box::new(hook);
        self
    }

    pub fn on_request_error(mut self, hook: impl FnMut(&SseError, &SseController) + Send + 'static) -> Self {
        self.on_request_error = Box::new(hook);
        self
    }

    pub fn on_response(mut self, hook: impl FnMut(u16, &SseController) + Send + 'static) -> Self {
        self.on_response = Box::new(hook);
        self
    }

    pub fn on_response_error(mut self, hook: impl FnMut(&ResponseError, &SseController) + Send + 'static) -> Self {
        self.on_response_error = Box::new(hook);
        self
    }

    pub fn on_close(mut self, hook: impl FnMut() + Send + 'static) -> Self {
        self.on_close = Box::new(hook);
        self
    }

    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }
}

// ————————————————————————————————————————————————————————————————————————————
// DRIVER
// ————————————————————————————————————————————————————————————————————————————

enum Attempt {
    /// Done event or cancellation.
    Finished,
    Retry,
}

pub struct EventSource<C, T, P> {
    transport: C,
    request: SseRequest,
    client_version: String,
    parse: P,
    options: EventSourceOptions<T>,
    controller: SseController,
    last_event_id: Option<String>,
    backoff: Backoff,
    attempts: u32,
}

impl<C, T, P> EventSource<C, T, P>
where
    C: SseTransport,
    P: FnMut(&str) -> Result<T, String>,
{
    pub fn new(transport: C, request: SseRequest, parse: P, options: EventSourceOptions<T>) -> Self {
        let backoff = Backoff::new(options.retry.clone());
        Self {
            transport,
            request,
            client_version: String::new(),
            parse,
            options,
            controller: SseController::new(),
            last_event_id: None,
            backoff,
            attempts: 0,
        }
    }

    /// Sent as the `client-version` header when non-empty.
    pub fn with_client_version(mut self, version: impl Into<String>) -> Self {
        self.client_version = version.into();
        self
    }

    pub fn controller(&self) -> SseController {
        self.controller.clone()
    }

    /// Runs until the server sends `done`, the controller is cancelled or the
    /// retry budget is spent. `on_close` fires exactly once on the way out.
    pub async fn run(mut self) -> Result<(), SseError> {
        let controller = self.controller.clone();
        let outcome = loop {
            if controller.is_cancelled() {
                break Ok(());
            }
            if let Attempt::Finished = self.attempt(&controller).await {
                break Ok(());
            }
            if controller.is_cancelled() {
                break Ok(());
            }
            let Some(delay) = self.backoff.next_delay() else {
                tracing::warn!(url = %self.request.url, attempts = self.attempts, "event stream retries exhausted");
                break Err(SseError::RetriesExhausted {
                    attempts: self.attempts,
                });
            };
            tracing::debug!(url = %self.request.url, delay_ms = delay.as_millis() as u64, "reconnecting event stream");
            if !delay.is_zero() {
                tokio::select! {
                    _ = controller.cancelled() => break Ok(()),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        };
        (self.options.on_close)();
        outcome
    }

    fn prepared_request(&self) -> SseRequest {
        let mut request = self.request.clone();
        request
            .headers
            .insert("Accept".to_owned(), "text/event-stream".to_owned());
        if !self.client_version.is_empty() {
            request
                .headers
                .insert("client-version".to_owned(), self.client_version.clone());
        }
        if let Some(id) = &self.last_event_id {
            request.headers.insert("Last-Event-Id".to_owned(), id.clone());
        }
        request
    }

    async fn attempt(&mut self, controller: &SseController) -> Attempt {
        let request = self.prepared_request();
        self.attempts += 1;
        (self.options.on_request)(&request, controller);
        if controller.is_cancelled() {
            return Attempt::Finished;
        }

        let response = tokio::select! {
            _ = controller.cancelled() => return Attempt::Finished,
            response = self.transport.send(request) => response,
        };
        let body = match response {
            Err(err) => {
                tracing::debug!(error = %err, "event stream request failed");
                (self.options.on_request_error)(&err, controller);
                return Attempt::Retry;
            }
            Ok(SseResponse::Error {
                status,
                status_text,
                body,
            }) => {
                (self.options.on_response)(status, controller);
                if controller.is_cancelled() {
                    return Attempt::Finished;
                }
                let error = ResponseError::from_response(status, &status_text, &body);
                (self.options.on_response_error)(&error, controller);
                return Attempt::Retry;
            }
            Ok(SseResponse::Ok { status, body }) => {
                (self.options.on_response)(status, controller);
                body
            }
        };
        if controller.is_cancelled() {
            return Attempt::Finished;
        }
        self.backoff.reset();
        self.attempts = 0;
        self.stream(body, controller).await
    }

    async fn stream(
        &mut self,
        mut body: BoxStream<'static, Result<Vec<u8>, SseError>>,
        controller: &SseController,
    ) -> Attempt {
        let mut bytes = Vec::new();
        let mut text = String::new();
        loop {
            let chunk = tokio::select! {
                _ = controller.cancelled() => return Attempt::Finished,
                chunk = body.next() => chunk,
            };
            let chunk = match chunk {
                None => return Attempt::Retry,
                Some(Err(err)) => {
                    (self.options.on_response_error)(&ResponseError::stream(err.to_string()), controller);
                    return Attempt::Retry;
                }
                Some(Ok(chunk)) => chunk,
            };

            bytes.extend_from_slice(&chunk);
            drain_utf8(&mut bytes, &mut text);

            let (events, tail) = parse_sse_events(&text);
            text = tail;
            for event in events {
                match event.kind() {
                    EventKind::Done => return Attempt::Finished,
                    EventKind::Ping => {}
                    EventKind::Message => match (self.parse)(&event.data) {
                        Ok(message) => (self.options.on_message)(message, controller),
                        Err(message) => {
                            (self.options.on_response_error)(&ResponseError::stream(message), controller);
                        }
                    },
                }
                if let Some(id) = event.id.filter(|id| !id.is_empty()) {
                    self.last_event_id = Some(id);
                }
                if controller.is_cancelled() {
                    return Attempt::Finished;
                }
            }
        }
    }
}

/// Moves every complete character from `bytes` into `text`.
///
/// Invalid sequences become U+FFFD; only a multi-byte character cut off at
/// the end of the buffer is kept back for the next chunk.
fn drain_utf8(bytes: &mut Vec<u8>, text: &mut String) {
    loop {
        match std::str::from_utf8(bytes.as_slice()) {
            Ok(all) => {
                text.push_str(all);
                bytes.clear();
                return;
            }
            Err(err) => {
                let valid = err.valid_up_to();
                text.push_str(&String::from_utf8_lossy(&bytes[..valid]));
                let Some(invalid) = err.error_len() else {
                    bytes.drain(..valid);
                    return;
                };
                text.push(char::REPLACEMENT_CHARACTER);
                bytes.drain(..valid + invalid);
            }
        }
    }
}
