//! HTTP boundary: application state and router assembly.

pub mod error;
pub mod handlers;
pub mod sse;

use std::sync::Arc;
use std::time::Duration;

use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::core::backend::{self, BackendAdapter};
use crate::core::config::Config;
use crate::core::relay::ChatRelay;
use crate::core::session::SessionStore;

#[derive(Clone)]
pub struct AppState {
    pub relay: ChatRelay,
    pub store: SessionStore,
    pub adapter: Arc<dyn BackendAdapter>,
    pub client: reqwest::Client,
    pub probe_timeout: Duration,
}

impl AppState {
    pub fn from_config(config: &Config) -> Self {
        let store = SessionStore::new();
        let adapter = backend::from_config(config);
        let client = reqwest::Client::new();
        let relay = ChatRelay::new(
            store.clone(),
            adapter.clone(),
            client.clone(),
            config.request_timeout(),
        );
        Self {
            relay,
            store,
            adapter,
            client,
            probe_timeout: config.probe_timeout(),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/chat", post(handlers::chat))
        .route("/chat/image", post(handlers::chat_image))
        .route("/chat/clear", delete(handlers::clear_session))
        .route("/chat/history", get(handlers::history))
        .route("/ping", get(handlers::ping))
        .route("/models", get(handlers::models))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::BackendKind;
    use crate::core::message::Turn;
    use crate::core::test_support::serve_script;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn test_state(base_url: String) -> AppState {
        AppState::from_config(&Config {
            backend: BackendKind::Local,
            base_url: Some(base_url),
            ..Config::default()
        })
    }

    async fn body_string(response: axum::response::Response) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn chat_streams_the_exact_wire_frames() {
        let body = concat!(
            "{\"message\":{\"role\":\"assistant\",\"content\":\"4\"},\"done\":false}\n",
            "{\"message\":{\"role\":\"assistant\",\"content\":\"\"},\"done\":false}\n",
            "{\"message\":{\"role\":\"assistant\",\"content\":\"\"},\"done\":true}\n",
        );
        let (addr, _requests) = serve_script(vec![body.to_string()]).await;
        let state = test_state(format!("http://{addr}"));
        let router = build_router(state.clone());

        let response = router
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/chat")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"message":"2+2?","session_id":"s1"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let text = body_string(response).await;
        assert_eq!(
            text,
            concat!(
                "data: {\"chunk\":\"4\",\"done\":false}\n\n",
                "data: {\"chunk\":\"\",\"done\":false}\n\n",
                "data: {\"chunk\":\"\",\"done\":true}\n\n",
            )
        );

        let turns = state.store.snapshot("s1");
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[1].content, "4");
    }

    #[tokio::test]
    async fn unreachable_backend_yields_one_error_frame() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let router = build_router(test_state(format!("http://{addr}")));
        let response = router
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/chat")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"message":"hi"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        let text = body_string(response).await;
        assert_eq!(text.matches("data: ").count(), 1);
        assert!(text.contains("\"done\":true"));
        assert!(text.contains("\"error\""));
        assert!(!text.contains("\"chunk\""));
    }

    #[tokio::test]
    async fn history_round_trips_appended_turns() {
        let state = test_state("http://127.0.0.1:9".to_string());
        state.store.append("s1", Turn::user("hello"));
        state.store.append("s1", Turn::assistant("hi there"));
        let router = build_router(state);

        let response = router
            .oneshot(
                Request::builder()
                    .uri("/chat/history?session_id=s1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let text = body_string(response).await;
        assert_eq!(
            text,
            r#"{"history":[{"role":"user","content":"hello"},{"role":"assistant","content":"hi there"}]}"#
        );
    }

    #[tokio::test]
    async fn clear_resets_a_session_and_tolerates_unknown_keys() {
        let state = test_state("http://127.0.0.1:9".to_string());
        state.store.append("s1", Turn::user("hello"));
        let router = build_router(state.clone());

        let response = router
            .clone()
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/chat/clear?session_id=s1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(body_string(response).await, r#"{"status":"cleared"}"#);
        assert!(state.store.snapshot("s1").is_empty());

        let response = router
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/chat/clear?session_id=never-seen")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn chat_image_requires_the_image_field() {
        let router = build_router(test_state("http://127.0.0.1:9".to_string()));
        let body = concat!(
            "--boundary\r\n",
            "Content-Disposition: form-data; name=\"message\"\r\n\r\n",
            "describe this\r\n",
            "--boundary--\r\n",
        );
        let response = router
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/chat/image")
                    .header(
                        header::CONTENT_TYPE,
                        "multipart/form-data; boundary=boundary",
                    )
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_string(response).await.contains("image"));
    }

    #[tokio::test]
    async fn chat_image_streams_like_plain_chat() {
        let body = concat!(
            "{\"message\":{\"role\":\"assistant\",\"content\":\"a cat\"},\"done\":false}\n",
            "{\"done\":true}\n",
        );
        let (addr, mut requests) = serve_script(vec![body.to_string()]).await;
        let state = test_state(format!("http://{addr}"));
        let router = build_router(state.clone());

        let multipart = concat!(
            "--boundary\r\n",
            "Content-Disposition: form-data; name=\"message\"\r\n\r\n",
            "what is this?\r\n",
            "--boundary\r\n",
            "Content-Disposition: form-data; name=\"session_id\"\r\n\r\n",
            "img-session\r\n",
            "--boundary\r\n",
            "Content-Disposition: form-data; name=\"image\"; filename=\"cat.png\"\r\n",
            "Content-Type: image/png\r\n\r\n",
            "PNGDATA\r\n",
            "--boundary--\r\n",
        );
        let response = router
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/chat/image")
                    .header(
                        header::CONTENT_TYPE,
                        "multipart/form-data; boundary=boundary",
                    )
                    .body(Body::from(multipart))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let text = body_string(response).await;
        assert!(text.ends_with("data: {\"chunk\":\"\",\"done\":true}\n\n"));

        // The request went to the vision model with the image embedded.
        let sent = crate::core::test_support::request_body(&requests.recv().await.unwrap());
        assert_eq!(sent["model"], "llava");
        assert!(sent["messages"][1]["images"][0].is_string());

        let turns = state.store.snapshot("img-session");
        assert_eq!(turns.len(), 2);
        assert!(turns[0].has_attachment());
        assert_eq!(turns[1].content, "a cat");
    }

    #[tokio::test]
    async fn ping_reports_vision_capability() {
        let tags = r#"{"models":[{"name":"qwen2.5:0.5b"},{"name":"llava:latest"}]}"#;
        let (addr, _requests) = serve_script(vec![tags.to_string()]).await;
        let router = build_router(test_state(format!("http://{addr}")));

        let response = router
            .oneshot(Request::builder().uri("/ping").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let text = body_string(response).await;
        assert_eq!(
            text,
            r#"{"status":"server is working","backend":"connected","vision_available":true}"#
        );
    }

    #[tokio::test]
    async fn ping_degrades_when_the_backend_is_down() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let router = build_router(test_state(format!("http://{addr}")));
        let response = router
            .oneshot(Request::builder().uri("/ping").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let text = body_string(response).await;
        assert_eq!(
            text,
            r#"{"status":"server is working","backend":"disconnected","vision_available":false}"#
        );
    }

    #[tokio::test]
    async fn models_lists_backend_tags() {
        let tags = r#"{"models":[{"name":"qwen2.5:0.5b"},{"name":"llava:latest"}]}"#;
        let (addr, _requests) = serve_script(vec![tags.to_string()]).await;
        let router = build_router(test_state(format!("http://{addr}")));

        let response = router
            .oneshot(
                Request::builder()
                    .uri("/models")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let text = body_string(response).await;
        assert_eq!(
            text,
            concat!(
                r#"{"models":[{"name":"qwen2.5:0.5b","has_vision":false},"#,
                r#"{"name":"llava:latest","has_vision":true}]}"#
            )
        );
    }
}
