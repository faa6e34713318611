//! Shared constants and protocol defaults.

/// Behavioral instructions prepended to every backend request. Synthesized at
/// request-build time; never stored in a session transcript.
pub const SYSTEM_PROMPT: &str = "You are a general-purpose assistant embedded in a chat application. \
Answer the user's question directly. Work through math problems step by step, \
write correct and efficient code when asked, and keep explanations clear and \
to the point. When an image is attached, describe what it shows and answer \
questions about it. Do not invent facts.";

/// Session key used when a request does not name one.
pub const DEFAULT_SESSION_ID: &str = "default";

pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8000";

pub const DEFAULT_LOCAL_BASE_URL: &str = "http://localhost:11434";
pub const DEFAULT_CLOUD_BASE_URL: &str = "https://api.openai.com/v1";

pub const DEFAULT_LOCAL_MODEL: &str = "qwen2.5:0.5b";
pub const DEFAULT_LOCAL_VISION_MODEL: &str = "llava";
pub const DEFAULT_CLOUD_MODEL: &str = "gpt-4o-mini";

/// Name of the environment variable the backend credential is read from.
/// The config holds the variable's name; only the value is secret.
pub const DEFAULT_API_KEY_ENV: &str = "OPENAI_API_KEY";

pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_MAX_TOKENS: u32 = 2000;

/// Budget for the streaming data call, in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;
/// Budget for lightweight status calls (`/ping`, `/models`), in seconds.
pub const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 5;
