//! Passerelle is a session-aware streaming relay that sits between chat
//! frontends and interchangeable LLM backends.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`core`] owns the data model, configuration, per-session transcripts,
//!   the backend protocol adapters, and the stream relay that drives one
//!   request end to end.
//! - [`server`] exposes the HTTP surface: JSON and multipart chat endpoints
//!   answered with an SSE stream of canonical deltas, plus history, session
//!   clearing, and backend capability probes.
//! - [`api`] defines the wire payload types spoken to each backend.
//!
//! The binary entrypoint (`src/main.rs`) loads configuration, selects a
//! backend adapter, and serves the router.

pub mod api;
pub mod core;
pub mod server;
