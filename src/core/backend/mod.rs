//! Backend protocol adapters.
//!
//! Everything backend-specific sits behind [`BackendAdapter`]: how a
//! transcript becomes that backend's request shape, and how one raw line of
//! its stream becomes a canonical [`FrameEvent`]. The relay itself never
//! sees a protocol detail.

pub mod cloud;
pub mod local;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::api::ModelSummary;
use crate::core::config::{BackendKind, Config};
use crate::core::message::Turn;
use crate::core::relay::RelayError;

/// Canonical decode result for one raw line of a backend stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameEvent {
    /// Not a complete or parseable protocol unit (blank line, keepalive,
    /// malformed JSON). Ignored by the relay; never surfaced to the caller.
    Skip,
    /// A content fragment. May be empty; empty deltas are still forwarded.
    Delta(String),
    /// The backend signalled successful completion.
    Done,
    /// The backend's own stream reported a failure.
    UpstreamError(String),
}

/// A fully-prepared backend request: endpoint, optional bearer credential,
/// serialized body.
#[derive(Debug, Clone)]
pub struct RequestSpec {
    pub url: String,
    pub bearer: Option<String>,
    pub body: serde_json::Value,
}

#[async_trait]
pub trait BackendAdapter: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Whether an image-bearing turn can be routed to a capable model.
    fn accepts_attachments(&self) -> bool;

    /// Serialize the transcript into the backend's native request shape,
    /// with the synthesized system turn prepended.
    fn chat_request(&self, turns: &[Turn]) -> Result<RequestSpec, RelayError>;

    /// Decode one raw line of the backend stream. Total over arbitrary
    /// input: anything unparseable maps to [`FrameEvent::Skip`].
    fn decode_frame(&self, line: &str) -> FrameEvent;

    /// Human-readable hint attached to connect failures.
    fn connect_hint(&self) -> &'static str;

    /// Probe the backend for its available models.
    async fn list_models(
        &self,
        client: &reqwest::Client,
        timeout: Duration,
    ) -> Result<Vec<ModelSummary>, RelayError>;
}

/// Select and construct the configured adapter.
pub fn from_config(config: &Config) -> Arc<dyn BackendAdapter> {
    match config.backend {
        BackendKind::Local => Arc::new(local::LocalChatAdapter::from_config(config)),
        BackendKind::Cloud => Arc::new(cloud::CloudCompletionAdapter::from_config(config)),
    }
}

fn endpoint_url(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// A request needs a vision-capable model when the turn being answered (the
/// most recent user turn) carries an attachment. Older attachments replayed
/// from history do not change model selection.
fn wants_vision(turns: &[Turn]) -> bool {
    turns
        .iter()
        .rev()
        .find(|turn| turn.role.is_user())
        .is_some_and(|turn| turn.has_attachment())
}

fn model_has_vision(name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    name.contains("llava") || name.contains("vision")
}
