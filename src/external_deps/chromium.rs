//! Headless Chromium runtime backed by `chromiumoxide`.
//!
//! One browser process is shared by every session. Each session is a
//! separate CDP browser context, so cookies, cache and proxy settings stay
//! isolated per egress proxy.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::emulation::{
    SetDeviceMetricsOverrideParams, SetLocaleOverrideParams, SetTimezoneOverrideParams,
    SetUserAgentOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::cdp::browser_protocol::storage::GetCookiesParams;
use chromiumoxide::cdp::browser_protocol::target::{
    BrowserContextId, CreateBrowserContextParams, CreateTargetParams, DisposeBrowserContextParams,
};
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::browser::{BrowserError, BrowserPage, BrowserRuntime, BrowserSession, SessionOptions};

const LAUNCH_ARGS: &[&str] = &[
    "--disable-blink-features=AutomationControlled",
    "--disable-infobars",
    "--disable-dev-shm-usage",
    "--no-first-run",
    "--disable-extensions",
    "--disable-popup-blocking",
    "--disable-background-networking",
    "--disable-sync",
];

#[derive(Debug, Clone)]
pub struct ChromiumConfig {
    pub executable: Option<PathBuf>,
    pub headless: bool,
    pub sandbox: bool,
    pub extra_args: Vec<String>,
}

impl Default for ChromiumConfig {
    fn default() -> Self {
        Self {
            executable: None,
            headless: true,
            sandbox: false,
            extra_args: Vec::new(),
        }
    }
}

struct Running {
    browser: Arc<Browser>,
    handler: JoinHandle<()>,
}

pub struct ChromiumRuntime {
    config: ChromiumConfig,
    running: Mutex<Option<Running>>,
}

impl ChromiumRuntime {
    pub fn new(config: ChromiumConfig) -> Self {
        Self {
            config,
            running: Mutex::new(None),
        }
    }

    fn browser_config(&self) -> Result<BrowserConfig, BrowserError> {
        let mut builder = BrowserConfig::builder()
            .args(LAUNCH_ARGS.iter().copied())
            .args(self.config.extra_args.iter().map(String::as_str));
        if !self.config.headless {
            builder = builder.with_head();
        }
        if !self.config.sandbox {
            builder = builder.no_sandbox();
        }
        if let Some(path) = &self.config.executable {
            builder = builder.chrome_executable(path);
        }
        builder.build().map_err(BrowserError::Launch)
    }

    async fn browser(&self) -> Result<Arc<Browser>, BrowserError> {
        self.running
            .lock()
            .await
            .as_ref()
            .map(|running| Arc::clone(&running.browser))
            .ok_or(BrowserError::NotRunning)
    }
}

impl Default for ChromiumRuntime {
    fn default() -> Self {
        Self::new(ChromiumConfig::default())
    }
}

#[async_trait]
impl BrowserRuntime for ChromiumRuntime {
    async fn launch(&self) -> Result<(), BrowserError> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return Ok(());
        }

        let (browser, mut handler) = Browser::launch(self.browser_config()?)
            .await
            .map_err(|err| BrowserError::Launch(err.to_string()))?;
        let handler = tokio::spawn(async move { while handler.next().await.is_some() {} });
        log::info!("chromium launched");

        *running = Some(Running {
            browser: Arc::new(browser),
            handler,
        });
        Ok(())
    }

    async fn new_session(
        &self,
        options: &SessionOptions,
    ) -> Result<Box<dyn BrowserSession>, BrowserError> {
        let browser = self.browser().await?;

        let mut params = CreateBrowserContextParams::default();
        params.dispose_on_detach = Some(true);
        params.proxy_server = options.proxy.clone();
        let context_id = browser
            .execute(params)
            .await
            .map_err(|err| BrowserError::Context(err.to_string()))?
            .result
            .browser_context_id;

        Ok(Box::new(ChromiumSession {
            browser,
            context_id,
            options: options.clone(),
            init_script: Mutex::new(None),
        }))
    }

    async fn shutdown(&self) -> Result<(), BrowserError> {
        let Some(running) = self.running.lock().await.take() else {
            return Ok(());
        };

        let result = match Arc::try_unwrap(running.browser) {
            Ok(mut browser) => {
                let closed = browser
                    .close()
                    .await
                    .map(|_| ())
                    .map_err(|err| BrowserError::Protocol(err.to_string()));
                if let Err(err) = browser.wait().await {
                    log::warn!("chromium did not exit cleanly: {err}");
                }
                closed
            }
            // Sessions still hold the browser; dropping the last handle kills
            // the process.
            Err(_) => Ok(()),
        };
        running.handler.abort();
        log::info!("chromium stopped");
        result
    }
}

struct ChromiumSession {
    browser: Arc<Browser>,
    context_id: BrowserContextId,
    options: SessionOptions,
    init_script: Mutex<Option<String>>,
}

impl ChromiumSession {
    async fn configure(&self, page: &Page) -> Result<(), chromiumoxide::error::CdpError> {
        let fingerprint = &self.options.fingerprint;

        let mut user_agent = SetUserAgentOverrideParams::new(self.options.user_agent.clone());
        user_agent.accept_language = Some(fingerprint.accept_language.to_string());
        page.execute(user_agent).await?;
        page.execute(SetDeviceMetricsOverrideParams::new(
            i64::from(fingerprint.viewport.width),
            i64::from(fingerprint.viewport.height),
            1.0,
            fingerprint.mobile,
        ))
        .await?;
        page.execute(SetTimezoneOverrideParams::new(fingerprint.timezone_id))
            .await?;
        page.execute(SetLocaleOverrideParams {
            locale: Some(fingerprint.locale.to_string()),
        })
        .await?;

        if let Some(script) = self.init_script.lock().await.clone() {
            page.execute(AddScriptToEvaluateOnNewDocumentParams::new(script))
                .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    async fn prepare(&self, script: &str) -> Result<(), BrowserError> {
        *self.init_script.lock().await = Some(script.to_string());
        Ok(())
    }

    async fn new_page(&self) -> Result<Box<dyn BrowserPage>, BrowserError> {
        let target = CreateTargetParams::builder()
            .url("about:blank")
            .browser_context_id(self.context_id.clone())
            .build()
            .map_err(BrowserError::Context)?;
        let page = self
            .browser
            .new_page(target)
            .await
            .map_err(|err| BrowserError::Context(err.to_string()))?;

        if let Err(err) = self.configure(&page).await {
            if let Err(close_err) = page.clone().close().await {
                log::debug!("failed to close misconfigured page: {close_err}");
            }
            return Err(BrowserError::Protocol(err.to_string()));
        }
        Ok(Box::new(ChromiumPage { page }))
    }

    async fn cookies(&self) -> Result<Vec<String>, BrowserError> {
        let response = self
            .browser
            .execute(GetCookiesParams {
                browser_context_id: Some(self.context_id.clone()),
            })
            .await
            .map_err(|err| BrowserError::Protocol(err.to_string()))?;

        Ok(response
            .result
            .cookies
            .iter()
            .map(|cookie| {
                let mut line = format!(
                    "{}={}; Domain={}; Path={}",
                    cookie.name, cookie.value, cookie.domain, cookie.path
                );
                if cookie.secure {
                    line.push_str("; Secure");
                }
                line
            })
            .collect())
    }

    async fn close(&self) -> Result<(), BrowserError> {
        self.browser
            .execute(DisposeBrowserContextParams::new(self.context_id.clone()))
            .await
            .map(|_| ())
            .map_err(|err| BrowserError::Protocol(err.to_string()))
    }
}

struct ChromiumPage {
    page: Page,
}

#[async_trait]
impl BrowserPage for ChromiumPage {
    async fn goto(&self, url: &str, timeout: Duration) -> Result<(), BrowserError> {
        let navigation = tokio::time::timeout(timeout, self.page.goto(url)).await;
        match navigation {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(err)) => Err(BrowserError::Navigation {
                url: url.to_string(),
                reason: err.to_string(),
            }),
            Err(_) => Err(BrowserError::Navigation {
                url: url.to_string(),
                reason: format!("timed out after {timeout:?}"),
            }),
        }
    }

    async fn content(&self) -> Result<String, BrowserError> {
        self.page
            .content()
            .await
            .map_err(|err| BrowserError::Protocol(err.to_string()))
    }

    async fn close(&self) -> Result<(), BrowserError> {
        self.page
            .clone()
            .close()
            .await
            .map_err(|err| BrowserError::Protocol(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sessions_require_a_launched_browser() {
        let runtime = ChromiumRuntime::default();
        let options = SessionOptions {
            proxy: None,
            user_agent: "ua".into(),
            fingerprint: crate::modules::fingerprint::FINGERPRINT_CATALOG[0].clone(),
        };
        assert!(matches!(
            runtime.new_session(&options).await,
            Err(BrowserError::NotRunning)
        ));
        assert!(runtime.shutdown().await.is_ok());
    }
}
