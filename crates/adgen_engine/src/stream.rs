//! Subscription to a job's progress event stream.
//!
//! Bytes from the [`EventSource`] are decoded into SSE frames, turned into
//! [`ProgressEvent`]s and folded into a [`ProgressStream`] held behind a
//! mutex. Sink callbacks run while that lock is held, so once
//! [`StreamSubscription::cancel`] returns no further event reaches the sink
//! and the reducer no longer changes.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use adgen_core::{ClientError, JobKind, ProgressEvent, ProgressStream, StreamStep};
use adgen_logging::{adgen_debug, adgen_info, adgen_warn};
use futures_util::StreamExt;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::backend::EventSource;
use crate::sse::SseDecoder;

pub trait StreamSink: Send + Sync {
    /// An event the reducer accepted, with the reducer state after it.
    fn event(&self, event: &ProgressEvent, stream: &ProgressStream);

    /// The connection broke, could not be opened, or went idle.
    fn failed(&self, error: &ClientError);
}

#[derive(Clone)]
pub struct ProgressStreamConsumer {
    source: Arc<dyn EventSource>,
    idle_timeout: Duration,
}

impl ProgressStreamConsumer {
    pub fn new(source: Arc<dyn EventSource>, idle_timeout: Duration) -> Self {
        Self {
            source,
            idle_timeout,
        }
    }

    /// Opens the stream on the current tokio runtime.
    pub fn subscribe(
        &self,
        kind: JobKind,
        parameters: Value,
        sink: Arc<dyn StreamSink>,
    ) -> StreamSubscription {
        let state = Arc::new(Mutex::new(ProgressStream::new()));
        let cancel = CancellationToken::new();
        let run = StreamRun {
            source: self.source.clone(),
            state: state.clone(),
            cancel: cancel.clone(),
            sink,
            idle_timeout: self.idle_timeout,
        };
        let task = tokio::spawn(async move {
            let outcome = run.drive(kind, parameters).await;
            run.cancel.cancel();
            outcome
        });
        StreamSubscription {
            state,
            cancel,
            task,
        }
    }
}

pub struct StreamSubscription {
    state: Arc<Mutex<ProgressStream>>,
    cancel: CancellationToken,
    task: JoinHandle<Result<Value, ClientError>>,
}

impl StreamSubscription {
    pub fn cancel(&self) {
        lock(&self.state).cancel();
        self.cancel.cancel();
    }

    /// True after `cancel()` and after the stream reached a terminal event.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub fn snapshot(&self) -> ProgressStream {
        lock(&self.state).clone()
    }

    /// Waits for the stream to end: the `complete` result, or why it did not arrive.
    pub async fn outcome(self) -> Result<Value, ClientError> {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(err) if err.is_cancelled() => Err(ClientError::Cancelled),
            Err(err) => Err(ClientError::StreamError {
                message: err.to_string(),
            }),
        }
    }
}

struct StreamRun {
    source: Arc<dyn EventSource>,
    state: Arc<Mutex<ProgressStream>>,
    cancel: CancellationToken,
    sink: Arc<dyn StreamSink>,
    idle_timeout: Duration,
}

impl StreamRun {
    async fn drive(&self, kind: JobKind, parameters: Value) -> Result<Value, ClientError> {
        let opened = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(ClientError::Cancelled),
            opened = self.source.open(kind, &parameters) => opened,
        };
        let mut body = match opened {
            Ok(body) => body,
            Err(err) => return Err(self.fail(err)),
        };
        adgen_debug!("{kind} progress stream opened");

        let mut decoder = SseDecoder::new();
        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(ClientError::Cancelled),
                next = tokio::time::timeout(self.idle_timeout, body.next()) => next,
            };
            let chunk = match next {
                Ok(Some(Ok(chunk))) => chunk,
                Ok(Some(Err(err))) => return Err(self.fail(stream_error(err.to_string()))),
                Ok(None) => {
                    return Err(self.fail(stream_error("connection closed before completion")))
                }
                Err(_) => {
                    return Err(self.fail(stream_error(format!(
                        "no progress for {}s",
                        self.idle_timeout.as_secs()
                    ))))
                }
            };

            for frame in decoder.push(&chunk) {
                let event = ProgressEvent::from_wire(&frame.event, &frame.data);
                let mut stream = lock(&self.state);
                let step = stream.apply(event.clone());
                match step {
                    StreamStep::Closed => return Err(ClientError::Cancelled),
                    StreamStep::Ignored => continue,
                    _ => self.sink.event(&event, &stream),
                }
                match step {
                    StreamStep::Completed(result) => {
                        adgen_info!("{kind} progress stream complete");
                        return Ok(result);
                    }
                    StreamStep::Failed(message) => {
                        adgen_warn!("{kind} progress stream failed: {message}");
                        return Err(ClientError::StreamError { message });
                    }
                    StreamStep::Advanced | StreamStep::Ignored | StreamStep::Closed => {}
                }
            }
        }
    }

    /// Fails the reducer for a transport problem. Returns `Cancelled` instead
    /// when the subscription was already torn down.
    fn fail(&self, error: ClientError) -> ClientError {
        let mut stream = lock(&self.state);
        match stream.fail(error.to_string()) {
            StreamStep::Failed(_) => {
                adgen_warn!("progress stream failed: {error}");
                self.sink.failed(&error);
                error
            }
            _ => ClientError::Cancelled,
        }
    }
}

fn stream_error(message: impl Into<String>) -> ClientError {
    ClientError::StreamError {
        message: message.into(),
    }
}

fn lock(state: &Mutex<ProgressStream>) -> MutexGuard<'_, ProgressStream> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}
