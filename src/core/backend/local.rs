//! Adapter for the local line-delimited JSON chat protocol.
//!
//! Frames are one JSON object per line. Content lives at `message.content`;
//! completion is a boolean `done` field on the frame itself, not a sentinel
//! line. Images ride on the user message as an array of base64 strings.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crate::api::{
    LocalChatFrame, LocalChatMessage, LocalChatOptions, LocalChatRequest, LocalTagsResponse,
    ModelSummary,
};
use crate::core::config::{BackendKind, Config};
use crate::core::constants::SYSTEM_PROMPT;
use crate::core::message::{Role, Turn};
use crate::core::relay::RelayError;

use super::{endpoint_url, model_has_vision, wants_vision, BackendAdapter, FrameEvent, RequestSpec};

pub struct LocalChatAdapter {
    base_url: String,
    model: String,
    vision_model: Option<String>,
    temperature: f32,
    num_predict: u32,
}

impl LocalChatAdapter {
    pub fn from_config(config: &Config) -> Self {
        Self {
            base_url: config.base_url().to_string(),
            model: config.model().to_string(),
            vision_model: config.vision_model().map(str::to_string),
            temperature: config.temperature,
            num_predict: config.max_tokens,
        }
    }

    fn select_model(&self, turns: &[Turn]) -> Result<&str, RelayError> {
        if wants_vision(turns) {
            self.vision_model
                .as_deref()
                .ok_or(RelayError::UnsupportedModality)
        } else {
            Ok(&self.model)
        }
    }

    fn to_wire(turn: &Turn) -> LocalChatMessage {
        LocalChatMessage {
            role: turn.role.as_str().to_string(),
            content: turn.content.clone(),
            images: turn
                .attachment
                .as_ref()
                .map(|attachment| vec![BASE64.encode(&attachment.data)]),
        }
    }
}

#[async_trait]
impl BackendAdapter for LocalChatAdapter {
    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }

    fn accepts_attachments(&self) -> bool {
        self.vision_model.is_some()
    }

    fn chat_request(&self, turns: &[Turn]) -> Result<RequestSpec, RelayError> {
        let model = self.select_model(turns)?.to_string();

        let mut messages = Vec::with_capacity(turns.len() + 1);
        messages.push(LocalChatMessage {
            role: Role::System.as_str().to_string(),
            content: SYSTEM_PROMPT.to_string(),
            images: None,
        });
        messages.extend(turns.iter().map(Self::to_wire));

        let request = LocalChatRequest {
            model,
            messages,
            stream: true,
            options: LocalChatOptions {
                temperature: self.temperature,
                num_predict: self.num_predict,
            },
        };

        Ok(RequestSpec {
            url: endpoint_url(&self.base_url, "api/chat"),
            bearer: None,
            body: serde_json::to_value(&request)?,
        })
    }

    fn decode_frame(&self, line: &str) -> FrameEvent {
        let line = line.trim();
        if line.is_empty() {
            return FrameEvent::Skip;
        }
        let frame: LocalChatFrame = match serde_json::from_str(line) {
            Ok(frame) => frame,
            Err(_) => return FrameEvent::Skip,
        };
        if let Some(error) = frame.error {
            return FrameEvent::UpstreamError(error);
        }
        if frame.done {
            return FrameEvent::Done;
        }
        match frame.message {
            // An absent content field is an empty delta, not a failure.
            Some(message) => FrameEvent::Delta(message.content.unwrap_or_default()),
            None => FrameEvent::Skip,
        }
    }

    fn connect_hint(&self) -> &'static str {
        "The local model server is not reachable. Make sure it is running (ollama serve)."
    }

    async fn list_models(
        &self,
        client: &reqwest::Client,
        timeout: Duration,
    ) -> Result<Vec<ModelSummary>, RelayError> {
        let url = endpoint_url(&self.base_url, "api/tags");
        let response = client
            .get(&url)
            .timeout(timeout)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|_| RelayError::BackendUnavailable(self.connect_hint().to_string()))?;
        let tags: LocalTagsResponse = response
            .json()
            .await
            .map_err(|err| RelayError::Upstream(format!("invalid model listing: {err}")))?;

        Ok(tags
            .models
            .into_iter()
            .map(|tag| ModelSummary {
                has_vision: model_has_vision(&tag.name),
                name: tag.name,
            })
            .collect())
    }
}
