//! The stream relay: drives one chat request end to end.
//!
//! A relay run moves through building (validate, append the user turn,
//! serialize the backend request), streaming (decode frames, forward deltas
//! verbatim), and exactly one terminal outcome: completed (commit the
//! assistant turn, emit `End`), failed (emit one `Error`), or cancelled
//! (caller gone; commit nothing, emit nothing). The backend connection is
//! scoped to the spawned task and released on every exit path.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use memchr::memchr;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::core::backend::{BackendAdapter, FrameEvent, RequestSpec};
use crate::core::message::{Attachment, Turn};
use crate::core::session::SessionStore;

/// The canonical incremental unit emitted to a caller during a stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamMessage {
    /// A verbatim content fragment; may be empty.
    Chunk(String),
    /// Terminal failure. Never followed by `End`.
    Error(String),
    /// Terminal success marker; always the last message of a healthy stream.
    End,
}

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("{0}")]
    BackendUnavailable(String),
    #[error("{0}")]
    Upstream(String),
    #[error("this backend has no image-capable model configured")]
    UnsupportedModality,
    #[error("failed to encode backend request: {0}")]
    InvalidRequest(#[from] serde_json::Error),
    #[error("backend stream interrupted: {0}")]
    Interrupted(String),
}

/// Terminal state of one relay run.
enum StreamOutcome {
    /// The backend signalled completion; carries the assembled response.
    Completed(String),
    Failed(RelayError),
    /// The caller went away mid-stream.
    Cancelled,
}

/// Reassembles complete lines from arbitrarily-split byte chunks.
#[derive(Default)]
struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    fn next_line(&mut self) -> Option<String> {
        let pos = memchr(b'\n', &self.buf)?;
        let line = String::from_utf8_lossy(&self.buf[..pos]).trim().to_string();
        self.buf.drain(..=pos);
        Some(line)
    }
}

#[derive(Clone)]
pub struct ChatRelay {
    store: SessionStore,
    adapter: Arc<dyn BackendAdapter>,
    client: reqwest::Client,
    request_timeout: Duration,
}

impl ChatRelay {
    pub fn new(
        store: SessionStore,
        adapter: Arc<dyn BackendAdapter>,
        client: reqwest::Client,
        request_timeout: Duration,
    ) -> Self {
        Self {
            store,
            adapter,
            client,
            request_timeout,
        }
    }

    /// Drive one chat turn on a spawned task, delivering canonical deltas in
    /// decode order. The channel closes after the terminal message; dropping
    /// the receiver (or cancelling the token) aborts the backend call and
    /// skips the commit.
    pub fn spawn_chat(
        &self,
        session_id: impl Into<String>,
        message: impl Into<String>,
        attachment: Option<Attachment>,
        cancel: CancellationToken,
    ) -> mpsc::Receiver<StreamMessage> {
        let (tx, rx) = mpsc::channel(32);
        let relay = self.clone();
        let session_id = session_id.into();
        let message = message.into();
        tokio::spawn(async move {
            tokio::select! {
                _ = relay.run(&session_id, message, attachment, &tx) => {}
                _ = cancel.cancelled() => {
                    debug!(session = %session_id, "caller went away, backend stream aborted");
                }
            }
        });
        rx
    }

    async fn run(
        &self,
        session_id: &str,
        message: String,
        attachment: Option<Attachment>,
        tx: &mpsc::Sender<StreamMessage>,
    ) {
        // Rejected before the user turn lands, so the transcript is untouched.
        if attachment.is_some() && !self.adapter.accepts_attachments() {
            let _ = tx
                .send(StreamMessage::Error(
                    RelayError::UnsupportedModality.to_string(),
                ))
                .await;
            return;
        }

        let session = self.store.get_or_create(session_id);
        session.append(match attachment {
            Some(attachment) => Turn::user_with_attachment(message, attachment),
            None => Turn::user(message),
        });
        let turns = session.snapshot();

        let spec = match self.adapter.chat_request(&turns) {
            Ok(spec) => spec,
            Err(err) => {
                let _ = tx.send(StreamMessage::Error(err.to_string())).await;
                return;
            }
        };

        match self.stream_backend(&spec, tx).await {
            StreamOutcome::Completed(response) => {
                session.append(Turn::assistant(response));
                let _ = tx.send(StreamMessage::End).await;
            }
            StreamOutcome::Failed(err) => {
                warn!(session = %session_id, error = %err, "relay failed");
                let _ = tx.send(StreamMessage::Error(err.to_string())).await;
            }
            StreamOutcome::Cancelled => {}
        }
    }

    async fn stream_backend(
        &self,
        spec: &RequestSpec,
        tx: &mpsc::Sender<StreamMessage>,
    ) -> StreamOutcome {
        let mut request = self
            .client
            .post(&spec.url)
            .timeout(self.request_timeout)
            .json(&spec.body);
        if let Some(token) = &spec.bearer {
            request = request.bearer_auth(token);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(err) => {
                debug!(error = %err, url = %spec.url, "backend connect failed");
                return StreamOutcome::Failed(RelayError::BackendUnavailable(
                    self.adapter.connect_hint().to_string(),
                ));
            }
        };

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<no body>".to_string());
            return StreamOutcome::Failed(RelayError::Upstream(format!(
                "backend returned {status}: {body}"
            )));
        }

        let mut stream = response.bytes_stream();
        let mut lines = LineBuffer::default();
        let mut assembled = String::new();

        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(err) => return StreamOutcome::Failed(RelayError::Interrupted(err.to_string())),
            };
            lines.push(&chunk);
            while let Some(line) = lines.next_line() {
                match self.adapter.decode_frame(&line) {
                    FrameEvent::Skip => {}
                    FrameEvent::Delta(text) => {
                        assembled.push_str(&text);
                        if tx.send(StreamMessage::Chunk(text)).await.is_err() {
                            return StreamOutcome::Cancelled;
                        }
                    }
                    FrameEvent::Done => return StreamOutcome::Completed(assembled),
                    FrameEvent::UpstreamError(message) => {
                        return StreamOutcome::Failed(RelayError::Upstream(message))
                    }
                }
            }
        }

        // A backend that closes the connection without a terminal frame is
        // treated as complete.
        StreamOutcome::Completed(assembled)
    }
}
