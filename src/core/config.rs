use directories::ProjectDirs;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::constants::{
    DEFAULT_API_KEY_ENV, DEFAULT_CLOUD_BASE_URL, DEFAULT_CLOUD_MODEL, DEFAULT_LISTEN_ADDR,
    DEFAULT_LOCAL_BASE_URL, DEFAULT_LOCAL_MODEL, DEFAULT_LOCAL_VISION_MODEL, DEFAULT_MAX_TOKENS,
    DEFAULT_PROBE_TIMEOUT_SECS, DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_TEMPERATURE,
};

/// Which backend protocol the relay speaks upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// A local inference server speaking newline-delimited JSON chat frames.
    #[default]
    Local,
    /// A hosted completion service speaking OpenAI-style SSE.
    Cloud,
}

impl BackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            BackendKind::Local => "local",
            BackendKind::Cloud => "cloud",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backend: BackendKind,
    /// Backend base URL; defaults per backend kind when unset.
    pub base_url: Option<String>,
    /// Text model identifier; defaults per backend kind when unset.
    pub model: Option<String>,
    /// Vision-capable model identifier. Unset falls back to the backend's
    /// default (local only); an empty string disables image support.
    pub vision_model: Option<String>,
    /// Name of the environment variable holding the backend credential.
    pub api_key_env: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub request_timeout_secs: u64,
    pub probe_timeout_secs: u64,
    pub listen: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: BackendKind::Local,
            base_url: None,
            model: None,
            vision_model: None,
            api_key_env: DEFAULT_API_KEY_ENV.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            probe_timeout_secs: DEFAULT_PROBE_TIMEOUT_SECS,
            listen: DEFAULT_LISTEN_ADDR.to_string(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Config, Box<dyn std::error::Error>> {
        let config_path = Self::config_path()?;
        Self::load_from_path(&config_path)
    }

    pub fn load_from_path(config_path: &Path) -> Result<Config, Box<dyn std::error::Error>> {
        if config_path.exists() {
            let contents = fs::read_to_string(config_path)?;
            let config: Config = toml::from_str(&contents)?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    fn config_path() -> Result<PathBuf, Box<dyn std::error::Error>> {
        let proj_dirs = ProjectDirs::from("dev", "passerelle", "passerelle")
            .ok_or("could not determine a config directory")?;
        Ok(proj_dirs.config_dir().join("config.toml"))
    }

    /// Overlay `PASSERELLE_*` environment variables on top of the file
    /// configuration.
    pub fn apply_env_overrides(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        if let Ok(value) = env::var("PASSERELLE_BACKEND") {
            self.backend = match value.as_str() {
                "local" => BackendKind::Local,
                "cloud" => BackendKind::Cloud,
                other => return Err(format!("invalid PASSERELLE_BACKEND value: {other}").into()),
            };
        }
        if let Ok(value) = env::var("PASSERELLE_BASE_URL") {
            self.base_url = Some(value);
        }
        if let Ok(value) = env::var("PASSERELLE_MODEL") {
            self.model = Some(value);
        }
        if let Ok(value) = env::var("PASSERELLE_VISION_MODEL") {
            self.vision_model = Some(value);
        }
        if let Ok(value) = env::var("PASSERELLE_API_KEY_ENV") {
            self.api_key_env = value;
        }
        if let Ok(value) = env::var("PASSERELLE_LISTEN") {
            self.listen = value;
        }
        if let Ok(value) = env::var("PASSERELLE_TEMPERATURE") {
            self.temperature = value
                .parse()
                .map_err(|_| format!("invalid PASSERELLE_TEMPERATURE value: {value}"))?;
        }
        if let Ok(value) = env::var("PASSERELLE_MAX_TOKENS") {
            self.max_tokens = value
                .parse()
                .map_err(|_| format!("invalid PASSERELLE_MAX_TOKENS value: {value}"))?;
        }
        if let Ok(value) = env::var("PASSERELLE_REQUEST_TIMEOUT_SECS") {
            self.request_timeout_secs = value
                .parse()
                .map_err(|_| format!("invalid PASSERELLE_REQUEST_TIMEOUT_SECS value: {value}"))?;
        }
        if let Ok(value) = env::var("PASSERELLE_PROBE_TIMEOUT_SECS") {
            self.probe_timeout_secs = value
                .parse()
                .map_err(|_| format!("invalid PASSERELLE_PROBE_TIMEOUT_SECS value: {value}"))?;
        }
        Ok(())
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_deref().unwrap_or(match self.backend {
            BackendKind::Local => DEFAULT_LOCAL_BASE_URL,
            BackendKind::Cloud => DEFAULT_CLOUD_BASE_URL,
        })
    }

    pub fn model(&self) -> &str {
        self.model.as_deref().unwrap_or(match self.backend {
            BackendKind::Local => DEFAULT_LOCAL_MODEL,
            BackendKind::Cloud => DEFAULT_CLOUD_MODEL,
        })
    }

    pub fn vision_model(&self) -> Option<&str> {
        match self.vision_model.as_deref() {
            // Empty string is the explicit opt-out knob.
            Some("") => None,
            Some(name) => Some(name),
            None => match self.backend {
                BackendKind::Local => Some(DEFAULT_LOCAL_VISION_MODEL),
                BackendKind::Cloud => None,
            },
        }
    }

    /// Resolve the backend credential from the configured environment
    /// variable. The variable's *name* comes from config; its *value* is the
    /// secret.
    pub fn api_key(&self) -> Option<String> {
        env::var(&self.api_key_env).ok().filter(|v| !v.is_empty())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}
