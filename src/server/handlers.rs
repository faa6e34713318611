//! HTTP handlers for the relay surface.

use std::convert::Infallible;

use axum::extract::{Multipart, Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::api::ModelSummary;
use crate::core::constants::DEFAULT_SESSION_ID;
use crate::core::message::{Attachment, Role};

use super::error::ApiError;
use super::{sse, AppState};

fn default_session_id() -> String {
    DEFAULT_SESSION_ID.to_string()
}

#[derive(Deserialize)]
pub struct ChatPayload {
    pub message: String,
    #[serde(default = "default_session_id")]
    pub session_id: String,
}

#[derive(Deserialize)]
pub struct SessionQuery {
    #[serde(default = "default_session_id")]
    pub session_id: String,
}

#[derive(Serialize)]
pub struct HistoryTurn {
    pub role: Role,
    pub content: String,
}

#[derive(Serialize)]
pub struct HistoryResponse {
    pub history: Vec<HistoryTurn>,
}

#[derive(Serialize)]
pub struct ClearResponse {
    pub status: &'static str,
}

#[derive(Serialize)]
pub struct PingResponse {
    pub status: &'static str,
    pub backend: &'static str,
    pub vision_available: bool,
}

#[derive(Serialize)]
pub struct ModelsResponse {
    pub models: Vec<ModelSummary>,
}

pub async fn chat(State(state): State<AppState>, Json(payload): Json<ChatPayload>) -> Response {
    info!(session = %payload.session_id, "chat request");
    relay_response(&state, payload.session_id, payload.message, None)
}

pub async fn chat_image(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    let mut message = None;
    let mut session_id = default_session_id();
    let mut attachment = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| ApiError::bad_request(format!("invalid multipart payload: {err}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "message" => {
                message = Some(field.text().await.map_err(|err| {
                    ApiError::bad_request(format!("unreadable message field: {err}"))
                })?);
            }
            "session_id" => {
                session_id = field.text().await.map_err(|err| {
                    ApiError::bad_request(format!("unreadable session_id field: {err}"))
                })?;
            }
            "image" => {
                let mime = field.content_type().unwrap_or("image/png").to_string();
                let bytes = field.bytes().await.map_err(|err| {
                    ApiError::bad_request(format!("unreadable image field: {err}"))
                })?;
                attachment = Some(Attachment::new(bytes.to_vec(), mime));
            }
            _ => {}
        }
    }

    let message = message.ok_or_else(|| ApiError::bad_request("missing multipart field: message"))?;
    let attachment =
        attachment.ok_or_else(|| ApiError::bad_request("missing multipart field: image"))?;

    info!(session = %session_id, image_bytes = attachment.data.len(), "chat request with image");
    Ok(relay_response(&state, session_id, message, Some(attachment)))
}

/// Spawn a relay for one turn and answer with its delta stream as SSE.
/// Dropping the response body (caller disconnect) cancels the relay.
fn relay_response(
    state: &AppState,
    session_id: String,
    message: String,
    attachment: Option<Attachment>,
) -> Response {
    let cancel = CancellationToken::new();
    let rx = state
        .relay
        .spawn_chat(session_id, message, attachment, cancel.clone());

    let guard = cancel.drop_guard();
    let stream = ReceiverStream::new(rx).map(move |message| {
        let _alive_until_stream_drop = &guard;
        Ok::<Event, Infallible>(sse::encode(&message))
    });

    Sse::new(stream)
        .keep_alive(KeepAlive::default())
        .into_response()
}

pub async fn clear_session(
    State(state): State<AppState>,
    Query(query): Query<SessionQuery>,
) -> Json<ClearResponse> {
    state.store.clear(&query.session_id);
    info!(session = %query.session_id, "session cleared");
    Json(ClearResponse { status: "cleared" })
}

pub async fn history(
    State(state): State<AppState>,
    Query(query): Query<SessionQuery>,
) -> Json<HistoryResponse> {
    let history = state
        .store
        .snapshot(&query.session_id)
        .into_iter()
        .map(|turn| HistoryTurn {
            role: turn.role,
            content: turn.content,
        })
        .collect();
    Json(HistoryResponse { history })
}

pub async fn ping(State(state): State<AppState>) -> Json<PingResponse> {
    match state
        .adapter
        .list_models(&state.client, state.probe_timeout)
        .await
    {
        Ok(models) => Json(PingResponse {
            status: "server is working",
            backend: "connected",
            vision_available: models.iter().any(|model| model.has_vision),
        }),
        Err(_) => Json(PingResponse {
            status: "server is working",
            backend: "disconnected",
            vision_available: false,
        }),
    }
}

pub async fn models(State(state): State<AppState>) -> Json<ModelsResponse> {
    let models = state
        .adapter
        .list_models(&state.client, state.probe_timeout)
        .await
        .unwrap_or_default();
    Json(ModelsResponse { models })
}
