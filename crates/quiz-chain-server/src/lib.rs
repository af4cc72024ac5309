//! quiz-chain-server: HTTP job intake and CLI around the quiz-chain pipeline.

pub mod config;
pub mod error;
pub mod intake;

use std::sync::Arc;
#[cfg(feature = "chromium")]
use std::time::Duration;

use quiz_chain::{ChainController, GeminiClient, HttpClient, HttpRenderer, PageRenderer};

pub use config::{resolve_api_key, RendererKind, ServerConfig};
pub use error::IntakeError;
pub use intake::{router, IntakeState, QuizRequest};

/// Build the page renderer selected in `config`.
pub async fn build_renderer(config: &ServerConfig) -> anyhow::Result<Arc<dyn PageRenderer>> {
    match config.renderer {
        RendererKind::Http => Ok(Arc::new(HttpRenderer::new(HttpClient::new(
            config.http_timeout,
        )))),
        #[cfg(feature = "chromium")]
        RendererKind::Chromium => {
            use quiz_chain::render::chromium::ChromiumRenderer;
            let renderer =
                ChromiumRenderer::launch(Duration::from_secs(30), Duration::from_secs(1)).await?;
            Ok(Arc::new(renderer))
        }
        #[cfg(not(feature = "chromium"))]
        RendererKind::Chromium => {
            anyhow::bail!("this build has no Chromium support; rebuild with `--features chromium`")
        }
    }
}

/// Build the chain controller, or `None` when no API key is configured.
pub async fn build_controller(config: &ServerConfig) -> anyhow::Result<Option<Arc<ChainController>>> {
    let Some(api_key) = &config.api_key else {
        return Ok(None);
    };
    let renderer = build_renderer(config).await?;
    let reasoner = Arc::new(GeminiClient::new(api_key.clone(), config.model.clone()));
    tracing::info!(model = %config.model, renderer = ?config.renderer, "Chain controller ready");
    Ok(Some(Arc::new(ChainController::new(
        config.chain_config(),
        renderer,
        reasoner,
    ))))
}
