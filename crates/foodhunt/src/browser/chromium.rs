//! Chromium-backed browser using chromiumoxide.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::Engine;
use chromiumoxide::browser::{Browser as CdpBrowser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{
    EnableParams, EventLoadingFailed, EventLoadingFinished, EventResponseReceived,
    GetResponseBodyParams, RequestId,
};
use chromiumoxide::page::Page;
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use tempfile::TempDir;
use tokio::task::JoinHandle;

use super::{Browser, Navigation, Tab};
use crate::capture::{CaptureSink, RawResponse};
use crate::config::BrowserSettings;
use crate::error::{ScrapeError, ScrapeResult};

/// Find the Chromium binary path.
pub fn find_chromium(explicit: Option<&PathBuf>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return path.exists().then(|| path.clone());
    }

    if let Ok(p) = std::env::var("FOODHUNT_CHROMIUM_PATH") {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    for name in ["google-chrome", "google-chrome-stable", "chromium", "chromium-browser"] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    if let Some(home) = dirs::home_dir() {
        let local = home.join(".local/share/foodhunt/chrome-linux64/chrome");
        if local.exists() {
            return Some(local);
        }
    }

    if cfg!(target_os = "macos") {
        let common =
            PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome");
        if common.exists() {
            return Some(common);
        }
    }

    None
}

/// A Chromium process owned by one run.
///
/// The profile directory lives as long as the process. Dropping the browser
/// without [`Browser::shutdown`] still kills the process and removes the
/// profile, on a spawned task when a runtime is available.
pub struct ChromiumBrowser {
    browser: Option<CdpBrowser>,
    handler: JoinHandle<()>,
    profile: Option<TempDir>,
}

/// Fresh, empty profile directory, removed when dropped.
fn profile_dir() -> ScrapeResult<TempDir> {
    tempfile::Builder::new()
        .prefix("foodhunt-profile-")
        .tempdir()
        .map_err(|e| ScrapeError::Environment(format!("cannot create browser profile: {e}")))
}

impl ChromiumBrowser {
    /// Launch Chromium with a fresh profile directory.
    pub async fn launch(settings: &BrowserSettings) -> ScrapeResult<Self> {
        let chrome_path = find_chromium(settings.chromium_path.as_ref()).ok_or_else(|| {
            ScrapeError::Environment(
                "Chromium not found. Set FOODHUNT_CHROMIUM_PATH or install chromium.".into(),
            )
        })?;

        let profile = profile_dir()?;
        let (width, height) = settings.window_size;

        let mut builder = BrowserConfig::builder()
            .chrome_executable(&chrome_path)
            .user_data_dir(profile.path())
            .window_size(width, height)
            .arg("--no-sandbox")
            .arg("--disable-gpu")
            .arg("--disable-software-rasterizer")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--no-first-run");
        if !settings.headless {
            builder = builder.with_head();
        }
        let config = builder
            .build()
            .map_err(|e| ScrapeError::Environment(format!("invalid browser config: {e}")))?;

        let (browser, mut handler) = CdpBrowser::launch(config).await.map_err(|e| {
            ScrapeError::Environment(format!(
                "failed to launch {}: {e}",
                chrome_path.display()
            ))
        })?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::debug!(error = %e, "devtools handler error");
                }
            }
        });

        tracing::info!(
            path = %chrome_path.display(),
            profile = %profile.path().display(),
            headless = settings.headless,
            "launched chromium"
        );

        Ok(Self {
            browser: Some(browser),
            handler,
            profile: Some(profile),
        })
    }

    /// Profile directory of the running process.
    pub fn profile_path(&self) -> Option<&Path> {
        self.profile.as_ref().map(TempDir::path)
    }
}

#[async_trait]
impl Browser for ChromiumBrowser {
    async fn open_tab(&self) -> ScrapeResult<Box<dyn Tab>> {
        let browser = self
            .browser
            .as_ref()
            .ok_or_else(|| ScrapeError::browser("opening a tab", "browser already shut down"))?;
        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| ScrapeError::browser("opening a tab", e))?;
        Ok(Box::new(ChromiumTab {
            page,
            listener: None,
        }))
    }

    async fn shutdown(&mut self) -> ScrapeResult<()> {
        if let Some(mut browser) = self.browser.take() {
            let closed = match browser.close().await {
                Ok(_) => browser.wait().await.map(|_| ()).map_err(|e| e.to_string()),
                Err(e) => Err(e.to_string()),
            };
            if let Err(reason) = closed {
                tracing::warn!(%reason, "graceful browser close failed, killing process");
                if let Some(Err(e)) = browser.kill().await {
                    tracing::warn!(error = %e, "failed to kill browser process");
                }
            }
        }
        self.handler.abort();
        remove_profile(self.profile.take());
        tracing::debug!("browser shut down");
        Ok(())
    }
}

impl Drop for ChromiumBrowser {
    fn drop(&mut self) {
        self.handler.abort();
        let profile = self.profile.take();
        let Some(mut browser) = self.browser.take() else {
            remove_profile(profile);
            return;
        };
        tracing::warn!("browser dropped without shutdown, killing process");
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    if let Some(Err(e)) = browser.kill().await {
                        tracing::warn!(error = %e, "failed to kill browser process");
                    }
                    // Chromium keeps writing to the profile until it exits.
                    let _ = browser.wait().await;
                    remove_profile(profile);
                });
            }
            // No runtime to reap the child; chromiumoxide kills it on drop.
            Err(_) => {
                drop(browser);
                remove_profile(profile);
            }
        }
    }
}

fn remove_profile(profile: Option<TempDir>) {
    let Some(profile) = profile else {
        return;
    };
    let path = profile.path().to_path_buf();
    if let Err(e) = profile.close() {
        tracing::debug!(dir = %path.display(), error = %e, "profile cleanup failed");
    }
}

/// A single Chromium page.
pub struct ChromiumTab {
    page: Page,
    listener: Option<JoinHandle<()>>,
}

enum NetworkEvent {
    Response(Arc<EventResponseReceived>),
    Finished(Arc<EventLoadingFinished>),
    Failed(Arc<EventLoadingFailed>),
}

#[async_trait]
impl Tab for ChromiumTab {
    async fn attach(&mut self, sink: CaptureSink) -> ScrapeResult<()> {
        self.page
            .execute(EnableParams::default())
            .await
            .map_err(|e| ScrapeError::browser("enabling network events", e))?;

        let responses = self
            .page
            .event_listener::<EventResponseReceived>()
            .await
            .map_err(|e| ScrapeError::browser("subscribing to responses", e))?;
        let finished = self
            .page
            .event_listener::<EventLoadingFinished>()
            .await
            .map_err(|e| ScrapeError::browser("subscribing to loading events", e))?;
        let failed = self
            .page
            .event_listener::<EventLoadingFailed>()
            .await
            .map_err(|e| ScrapeError::browser("subscribing to loading events", e))?;

        let events: BoxStream<'static, NetworkEvent> = stream::select_all(vec![
            responses.map(NetworkEvent::Response).boxed(),
            finished.map(NetworkEvent::Finished).boxed(),
            failed.map(NetworkEvent::Failed).boxed(),
        ])
        .boxed();

        let page = self.page.clone();
        self.listener = Some(tokio::spawn(forward_responses(page, sink, events)));
        Ok(())
    }

    async fn navigate(&mut self, url: &str, timeout_ms: u64) -> ScrapeResult<Navigation> {
        let start = Instant::now();
        let result =
            tokio::time::timeout(Duration::from_millis(timeout_ms), self.page.goto(url)).await;
        let load_time_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(Ok(_)) => {
                let final_url = self
                    .page
                    .url()
                    .await
                    .unwrap_or_default()
                    .unwrap_or_else(|| url.to_string());
                tracing::debug!(url, %final_url, load_time_ms, "page loaded");
                Ok(Navigation {
                    final_url,
                    load_time_ms,
                })
            }
            Ok(Err(e)) => Err(ScrapeError::Navigation {
                url: url.to_string(),
                message: e.to_string(),
            }),
            Err(_) => Err(ScrapeError::NavigationTimeout {
                url: url.to_string(),
                timeout_ms,
            }),
        }
    }

    async fn close(mut self: Box<Self>) -> ScrapeResult<()> {
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
        let page = self.page.clone();
        page.close()
            .await
            .map_err(|e| ScrapeError::browser("closing a tab", e))
    }
}

impl Drop for ChromiumTab {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
    }
}

/// Pair `responseReceived` with `loadingFinished` and hand finished bodies of
/// matching responses to the sink. Bodies are only fetchable once loading
/// has finished.
async fn forward_responses(
    page: Page,
    sink: CaptureSink,
    mut events: BoxStream<'static, NetworkEvent>,
) {
    let mut pending: HashMap<String, Arc<EventResponseReceived>> = HashMap::new();

    while let Some(event) = events.next().await {
        match event {
            NetworkEvent::Response(ev) => {
                let response = &ev.response;
                if sink
                    .matching_pattern(&response.url, &response.mime_type)
                    .is_some()
                {
                    pending.insert(ev.request_id.inner().clone(), ev);
                }
            }
            NetworkEvent::Failed(ev) => {
                if let Some(resp) = pending.remove(ev.request_id.inner()) {
                    tracing::debug!(url = %resp.response.url, error = %ev.error_text, "matching request failed");
                }
            }
            NetworkEvent::Finished(ev) => {
                let Some(resp) = pending.remove(ev.request_id.inner()) else {
                    continue;
                };
                let body = match fetch_body(&page, ev.request_id.clone()).await {
                    Ok(body) => body,
                    Err(e) => {
                        // Bodies of evicted or redirected requests are gone.
                        tracing::debug!(url = %resp.response.url, error = %e, "response body unavailable");
                        continue;
                    }
                };
                let raw = RawResponse {
                    url: resp.response.url.clone(),
                    status: u16::try_from(resp.response.status).unwrap_or(0),
                    mime_type: resp.response.mime_type.clone(),
                    body,
                };
                if !sink.record(raw).await {
                    break;
                }
            }
        }
    }
}

async fn fetch_body(page: &Page, request_id: RequestId) -> Result<String, String> {
    let resp = page
        .execute(GetResponseBodyParams::new(request_id))
        .await
        .map_err(|e| e.to_string())?;
    decode_body(&resp.result.body, resp.result.base64_encoded)
}

fn decode_body(body: &str, base64_encoded: bool) -> Result<String, String> {
    if !base64_encoded {
        return Ok(body.to_string());
    }
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(body)
        .map_err(|e| format!("invalid base64 body: {e}"))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{self, EndpointPattern, SettlePolicy};

    #[test]
    fn test_decode_plain_body() {
        assert_eq!(decode_body("{\"a\":1}", false).unwrap(), "{\"a\":1}");
    }

    #[test]
    fn test_decode_base64_body_replaces_invalid_utf8() {
        let encoded = base64::engine::general_purpose::STANDARD.encode([b'o', b'k', 0xff]);
        assert_eq!(decode_body(&encoded, true).unwrap(), "ok\u{fffd}");
        assert!(decode_body("%%%", true).is_err());
    }

    #[test]
    fn test_explicit_missing_path_is_not_found() {
        let missing = PathBuf::from("/definitely/not/here/chrome");
        assert!(find_chromium(Some(&missing)).is_none());
    }

    #[test]
    fn test_profile_dir_is_removed() {
        let profile = profile_dir().unwrap();
        let path = profile.path().to_path_buf();
        assert!(path.is_dir());
        assert!(path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with("foodhunt-profile-")));
        remove_profile(Some(profile));
        assert!(!path.exists());
    }

    #[tokio::test]
    #[ignore] // Requires Chromium to be installed
    async fn test_dropped_browser_removes_profile() {
        let browser = ChromiumBrowser::launch(&BrowserSettings::default())
            .await
            .expect("failed to launch chromium");
        let profile = browser.profile_path().unwrap().to_path_buf();
        assert!(profile.is_dir());

        drop(browser);
        for _ in 0..50 {
            if !profile.exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert!(!profile.exists());
    }

    #[tokio::test]
    #[ignore] // Requires Chromium to be installed
    async fn test_chromium_data_page_captures_nothing() {
        let settings = BrowserSettings::default();
        let mut browser = ChromiumBrowser::launch(&settings)
            .await
            .expect("failed to launch chromium");
        let mut tab = browser.open_tab().await.expect("failed to open tab");

        let patterns = vec![EndpointPattern::new("data", "/")];
        let (sink, handle) = capture::channel("data:", patterns, 16);
        tab.attach(sink).await.expect("attach failed");
        tab.navigate("data:text/html,<h1>Hello</h1>", 10_000)
            .await
            .expect("navigation failed");

        let policy = SettlePolicy {
            idle: Duration::from_millis(500),
            overall: Duration::from_secs(5),
        };
        // A data: page issues no network requests, so nothing is captured.
        assert!(handle.drain(policy).await.is_err());

        tab.close().await.expect("close failed");
        let profile = browser.profile_path().unwrap().to_path_buf();
        browser.shutdown().await.expect("shutdown failed");
        assert!(!profile.exists());
        assert!(browser.open_tab().await.is_err());
    }
}
