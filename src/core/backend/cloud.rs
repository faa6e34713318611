//! Adapter for the OpenAI-style streaming completion protocol.
//!
//! Frames arrive as `data: ` prefixed SSE lines; a literal `[DONE]` payload
//! ends the stream. Content lives at `choices[0].delta.content`; a role-only
//! opening frame simply carries an empty delta. Images ride on the user
//! message as an `image_url` content part with a base64 data URL.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crate::api::{
    CloudChatChunk, CloudChatMessage, CloudChatRequest, CloudContent, CloudContentPart,
    CloudImageUrl, CloudModelsResponse, ModelSummary,
};
use crate::core::config::{BackendKind, Config};
use crate::core::constants::SYSTEM_PROMPT;
use crate::core::message::{Role, Turn};
use crate::core::relay::RelayError;

use super::{endpoint_url, model_has_vision, wants_vision, BackendAdapter, FrameEvent, RequestSpec};

pub struct CloudCompletionAdapter {
    base_url: String,
    api_key: Option<String>,
    model: String,
    vision_model: Option<String>,
    temperature: f32,
    max_tokens: u32,
}

impl CloudCompletionAdapter {
    pub fn from_config(config: &Config) -> Self {
        Self {
            base_url: config.base_url().to_string(),
            api_key: config.api_key(),
            model: config.model().to_string(),
            vision_model: config.vision_model().map(str::to_string),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
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

    fn to_wire(turn: &Turn) -> CloudChatMessage {
        let content = match &turn.attachment {
            None => CloudContent::Text(turn.content.clone()),
            Some(attachment) => CloudContent::Parts(vec![
                CloudContentPart::Text {
                    text: turn.content.clone(),
                },
                CloudContentPart::ImageUrl {
                    image_url: CloudImageUrl {
                        url: format!(
                            "data:{};base64,{}",
                            attachment.mime,
                            BASE64.encode(&attachment.data)
                        ),
                    },
                },
            ]),
        };
        CloudChatMessage {
            role: turn.role.as_str().to_string(),
            content,
        }
    }
}

/// `data:` may or may not be followed by a space; both forms are on the wire
/// in practice.
fn data_payload(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim_start)
}

fn error_summary(value: &serde_json::Value) -> String {
    value
        .pointer("/error/message")
        .and_then(|v| v.as_str())
        .or_else(|| value.get("error").and_then(|v| v.as_str()))
        .map(str::to_string)
        .unwrap_or_else(|| value.to_string())
}

#[async_trait]
impl BackendAdapter for CloudCompletionAdapter {
    fn kind(&self) -> BackendKind {
        BackendKind::Cloud
    }

    fn accepts_attachments(&self) -> bool {
        self.vision_model.is_some()
    }

    fn chat_request(&self, turns: &[Turn]) -> Result<RequestSpec, RelayError> {
        let model = self.select_model(turns)?.to_string();

        let mut messages = Vec::with_capacity(turns.len() + 1);
        messages.push(CloudChatMessage {
            role: Role::System.as_str().to_string(),
            content: CloudContent::Text(SYSTEM_PROMPT.to_string()),
        });
        messages.extend(turns.iter().map(Self::to_wire));

        let request = CloudChatRequest {
            model,
            messages,
            stream: true,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        Ok(RequestSpec {
            url: endpoint_url(&self.base_url, "chat/completions"),
            bearer: self.api_key.clone(),
            body: serde_json::to_value(&request)?,
        })
    }

    fn decode_frame(&self, line: &str) -> FrameEvent {
        let line = line.trim();
        let Some(payload) = data_payload(line) else {
            // Blank lines, SSE comments, and `event:` framing lines.
            return FrameEvent::Skip;
        };
        if payload == "[DONE]" {
            return FrameEvent::Done;
        }
        let value: serde_json::Value = match serde_json::from_str(payload) {
            Ok(value) => value,
            Err(_) => return FrameEvent::Skip,
        };
        if value.get("error").is_some() {
            return FrameEvent::UpstreamError(error_summary(&value));
        }
        match serde_json::from_value::<CloudChatChunk>(value) {
            Ok(chunk) => FrameEvent::Delta(
                chunk
                    .choices
                    .first()
                    .and_then(|choice| choice.delta.content.clone())
                    .unwrap_or_default(),
            ),
            Err(_) => FrameEvent::Skip,
        }
    }

    fn connect_hint(&self) -> &'static str {
        "The completion service is not reachable. Check the backend base URL and your network connection."
    }

    async fn list_models(
        &self,
        client: &reqwest::Client,
        timeout: Duration,
    ) -> Result<Vec<ModelSummary>, RelayError> {
        let url = endpoint_url(&self.base_url, "models");
        let mut request = client.get(&url).timeout(timeout);
        if let Some(token) = &self.api_key {
            request = request.bearer_auth(token);
        }
        let response = request
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|_| RelayError::BackendUnavailable(self.connect_hint().to_string()))?;
        let models: CloudModelsResponse = response
            .json()
            .await
            .map_err(|err| RelayError::Upstream(format!("invalid model listing: {err}")))?;

        Ok(models
            .data
            .into_iter()
            .map(|entry| ModelSummary {
                has_vision: model_has_vision(&entry.id),
                name: entry.id,
            })
            .collect())
    }
}
