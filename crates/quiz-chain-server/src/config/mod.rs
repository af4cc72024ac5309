//! Configuration loading and resolution.
//!
//! Flags win over environment variables, environment variables over
//! defaults. Everything is resolved once at startup.

use std::time::Duration;

use quiz_chain::agent::gemini::DEFAULT_MODEL;
use quiz_chain::chain::DEFAULT_MAX_HOPS;
use quiz_chain::http::DEFAULT_TIMEOUT;
use quiz_chain::{ChainConfig, ScriptLimits};

pub const API_KEY_ENV: &str = "GOOGLE_API_KEY";
pub const MODEL_ENV: &str = "QUIZ_CHAIN_MODEL";
pub const BIND_ENV: &str = "QUIZ_CHAIN_BIND";

pub const DEFAULT_BIND: &str = "127.0.0.1:8000";

/// How challenge and interactive pages are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum RendererKind {
    /// Static markup over plain HTTP. Pages built by script render empty.
    Http,
    /// Headless Chromium (needs the `chromium` feature).
    Chromium,
}

impl Default for RendererKind {
    /// Chromium when this build has it, static HTTP otherwise.
    fn default() -> Self {
        if cfg!(feature = "chromium") {
            RendererKind::Chromium
        } else {
            RendererKind::Http
        }
    }
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Resolve the reasoning-service credential.
pub fn resolve_api_key(explicit: Option<&str>) -> Option<String> {
    explicit
        .map(str::to_string)
        .and_then(non_empty)
        .or_else(|| std::env::var(API_KEY_ENV).ok().and_then(non_empty))
}

/// Resolve the reasoning model name.
pub fn resolve_model(explicit: Option<&str>) -> String {
    explicit
        .map(str::to_string)
        .and_then(non_empty)
        .or_else(|| std::env::var(MODEL_ENV).ok().and_then(non_empty))
        .unwrap_or_else(|| DEFAULT_MODEL.to_string())
}

/// Resolve the listen address.
pub fn resolve_bind(explicit: Option<&str>) -> String {
    explicit
        .map(str::to_string)
        .and_then(non_empty)
        .or_else(|| std::env::var(BIND_ENV).ok().and_then(non_empty))
        .unwrap_or_else(|| DEFAULT_BIND.to_string())
}

/// Everything the service needs, fixed for the life of the process.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: String,
    pub api_key: Option<String>,
    pub model: String,
    pub renderer: RendererKind,
    pub max_hops: usize,
    pub http_timeout: Duration,
    pub max_steps: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            renderer: RendererKind::default(),
            max_hops: DEFAULT_MAX_HOPS,
            http_timeout: DEFAULT_TIMEOUT,
            max_steps: ScriptLimits::default().max_steps,
        }
    }
}

impl ServerConfig {
    pub fn chain_config(&self) -> ChainConfig {
        ChainConfig {
            max_hops: self.max_hops,
            http_timeout: self.http_timeout,
            script_limits: ScriptLimits {
                max_steps: self.max_steps,
                ..ScriptLimits::default()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_values_win() {
        assert_eq!(resolve_api_key(Some(" key-1 ")), Some("key-1".to_string()));
        assert_eq!(resolve_model(Some("gemini-pro")), "gemini-pro");
        assert_eq!(resolve_bind(Some("0.0.0.0:9000")), "0.0.0.0:9000");
    }

    #[test]
    fn test_default_renderer_follows_build() {
        let expected = if cfg!(feature = "chromium") {
            RendererKind::Chromium
        } else {
            RendererKind::Http
        };
        assert_eq!(RendererKind::default(), expected);
        assert_eq!(ServerConfig::default().renderer, expected);
    }

    #[test]
    fn test_chain_config_carries_limits() {
        let config = ServerConfig {
            max_hops: 3,
            max_steps: 42,
            ..ServerConfig::default()
        };
        let chain = config.chain_config();
        assert_eq!(chain.max_hops, 3);
        assert_eq!(chain.script_limits.max_steps, 42);
        assert_eq!(
            chain.script_limits.max_collection_len,
            ScriptLimits::default().max_collection_len
        );
    }
}
