//! Canonical delta to SSE wire frame encoding.
//!
//! The caller-facing frame format is fixed: content deltas are
//! `{"chunk":"<text>","done":false}`, the terminal marker is
//! `{"chunk":"","done":true}`, and failures are
//! `{"error":"<message>","done":true}`. Error and terminal frames are
//! mutually exclusive; each ends the stream.

use axum::response::sse::Event;
use serde::Serialize;

use crate::core::relay::StreamMessage;

#[derive(Serialize)]
struct DeltaFrame<'a> {
    chunk: &'a str,
    done: bool,
}

#[derive(Serialize)]
struct ErrorFrame<'a> {
    error: &'a str,
    done: bool,
}

pub fn encode(message: &StreamMessage) -> Event {
    let payload = match message {
        StreamMessage::Chunk(text) => to_json(&DeltaFrame {
            chunk: text,
            done: false,
        }),
        StreamMessage::End => to_json(&DeltaFrame {
            chunk: "",
            done: true,
        }),
        StreamMessage::Error(message) => to_json(&ErrorFrame {
            error: message,
            done: true,
        }),
    };
    Event::default().data(payload)
}

fn to_json<T: Serialize>(frame: &T) -> String {
    // Flat structs of strings and bools; serialization cannot fail.
    serde_json::to_string(frame).expect("wire frame serializes")
}
