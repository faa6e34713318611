//! Wire payload types for the supported backend protocols.
//!
//! Request shapes are what the relay sends upstream; frame shapes are what
//! each backend streams back, one unit per line.

use serde::{Deserialize, Serialize};

// Local chat protocol (newline-delimited JSON).

#[derive(Serialize)]
pub struct LocalChatRequest {
    pub model: String,
    pub messages: Vec<LocalChatMessage>,
    pub stream: bool,
    pub options: LocalChatOptions,
}

#[derive(Serialize)]
pub struct LocalChatMessage {
    pub role: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<String>>,
}

#[derive(Serialize)]
pub struct LocalChatOptions {
    pub temperature: f32,
    pub num_predict: u32,
}

/// One streamed frame. All fields are optional on the wire; the adapter
/// decides what an incomplete frame means.
#[derive(Deserialize)]
pub struct LocalChatFrame {
    #[serde(default)]
    pub message: Option<LocalFrameMessage>,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Deserialize)]
pub struct LocalFrameMessage {
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Deserialize)]
pub struct LocalTagsResponse {
    #[serde(default)]
    pub models: Vec<LocalModelTag>,
}

#[derive(Deserialize)]
pub struct LocalModelTag {
    pub name: String,
}

// Cloud completion protocol (OpenAI-style SSE).

#[derive(Serialize)]
pub struct CloudChatRequest {
    pub model: String,
    pub messages: Vec<CloudChatMessage>,
    pub stream: bool,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Serialize)]
pub struct CloudChatMessage {
    pub role: String,
    pub content: CloudContent,
}

/// Message content is either plain text or, for image-bearing turns, a list
/// of typed parts.
#[derive(Serialize)]
#[serde(untagged)]
pub enum CloudContent {
    Text(String),
    Parts(Vec<CloudContentPart>),
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CloudContentPart {
    Text { text: String },
    ImageUrl { image_url: CloudImageUrl },
}

#[derive(Serialize)]
pub struct CloudImageUrl {
    pub url: String,
}

#[derive(Deserialize)]
pub struct CloudChatChunk {
    pub choices: Vec<CloudChunkChoice>,
}

#[derive(Deserialize)]
pub struct CloudChunkChoice {
    pub delta: CloudChunkDelta,
}

#[derive(Deserialize)]
pub struct CloudChunkDelta {
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Deserialize)]
pub struct CloudModelsResponse {
    #[serde(default)]
    pub data: Vec<CloudModelEntry>,
}

#[derive(Deserialize)]
pub struct CloudModelEntry {
    pub id: String,
}

// Capability summaries shared by both backends.

#[derive(Debug, Clone, Serialize)]
pub struct ModelSummary {
    pub name: String,
    pub has_vision: bool,
}
