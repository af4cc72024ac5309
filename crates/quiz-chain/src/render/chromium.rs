//! Chromium-based renderer using chromiumoxide.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::page::Page;
use futures::StreamExt;

use super::PageRenderer;
use crate::types::PageSnapshot;

/// Find the Chromium binary path.
pub fn find_chromium() -> Option<PathBuf> {
    if let Ok(p) = std::env::var("QUIZ_CHAIN_CHROMIUM_PATH") {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    for name in ["google-chrome", "chromium", "chromium-browser"] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    if cfg!(target_os = "macos") {
        let common = PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome");
        if common.exists() {
            return Some(common);
        }
    }

    None
}

/// Renders pages in a headless Chromium, one tab per render.
pub struct ChromiumRenderer {
    browser: Browser,
    navigation_timeout: Duration,
    settle_delay: Duration,
}

impl ChromiumRenderer {
    /// Launch a headless Chromium instance.
    pub async fn launch(navigation_timeout: Duration, settle_delay: Duration) -> Result<Self> {
        let chrome_path = find_chromium()
            .context("Chromium not found. Set QUIZ_CHAIN_CHROMIUM_PATH or install Chrome.")?;

        let config = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("failed to launch Chromium")?;

        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                let _ = event;
            }
        });

        tracing::info!("Chromium renderer launched");

        Ok(Self {
            browser,
            navigation_timeout,
            settle_delay,
        })
    }
}

#[async_trait]
impl PageRenderer for ChromiumRenderer {
    async fn render(&self, url: &str) -> Result<PageSnapshot> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .context("failed to create new page")?;

        let loaded = tokio::time::timeout(self.navigation_timeout, async {
            page.goto(url).await?;
            page.wait_for_navigation().await?;
            Ok::<_, chromiumoxide::error::CdpError>(())
        })
        .await;

        let outcome = match loaded {
            Ok(Ok(())) => {
                tokio::time::sleep(self.settle_delay).await;
                read_snapshot(&page).await
            }
            Ok(Err(e)) => Err(anyhow::anyhow!("navigation failed: {e}")),
            Err(_) => Err(anyhow::anyhow!(
                "navigation timed out after {}ms",
                self.navigation_timeout.as_millis()
            )),
        };

        let _ = page.close().await;
        outcome
    }
}

async fn read_snapshot(page: &Page) -> Result<PageSnapshot> {
    let text: String = page
        .evaluate("document.body ? document.body.innerText : ''")
        .await
        .context("failed to read page text")?
        .into_value()
        .map_err(|e| anyhow::anyhow!("failed to convert page text: {e:?}"))?;

    let markup: String = page
        .evaluate("document.documentElement.outerHTML")
        .await
        .context("failed to read page markup")?
        .into_value()
        .map_err(|e| anyhow::anyhow!("failed to convert page markup: {e:?}"))?;

    if markup.is_empty() {
        bail!("page rendered no markup");
    }

    Ok(PageSnapshot { text, markup })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore] // Requires Chromium to be installed
    async fn test_chromium_renders_script_content() {
        let renderer = ChromiumRenderer::launch(Duration::from_secs(10), Duration::from_millis(100))
            .await
            .expect("failed to launch renderer");

        let snap = renderer
            .render("data:text/html,<body><div id=q></div><script>document.getElementById('q').textContent='Quiz 7'</script></body>")
            .await
            .expect("render failed");

        assert!(snap.text.contains("Quiz 7"));
        assert!(snap.markup.contains("<script>"));
    }
}
