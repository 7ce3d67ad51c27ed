//! Browser session for one run.
//!
//! A session owns the browser process and hands out short-lived tabs. Every
//! capture follows the same order: open a tab, attach the interceptor,
//! navigate, wait for the network to settle, close the tab.

use std::time::{Duration, Instant};

use tokio::sync::Semaphore;

use crate::browser::chromium::ChromiumBrowser;
use crate::browser::{Browser, Tab};
use crate::capture::{self, EndpointPattern, MENU_PATTERN};
use crate::config::{CaptureSettings, ScrapeConfig};
use crate::error::{ScrapeError, ScrapeResult, Stage};
use crate::types::{CapturedResponse, Restaurant, ScrapeWarning, SearchQuery};

/// A page visited for its menu.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuTarget {
    /// Restaurant the page belongs to, when a search listing named it.
    pub restaurant_id: Option<String>,
    pub url: String,
}

impl MenuTarget {
    /// Target for a listed restaurant; `None` when it has no page URL.
    pub fn for_restaurant(restaurant: &Restaurant) -> Option<Self> {
        restaurant.url.as_ref().map(|url| Self {
            restaurant_id: Some(restaurant.id.clone()),
            url: url.clone(),
        })
    }

    /// Target for a bare restaurant page.
    pub fn page(url: &str) -> Self {
        Self {
            restaurant_id: None,
            url: url.to_string(),
        }
    }

    fn label(&self) -> String {
        self.restaurant_id
            .clone()
            .unwrap_or_else(|| page_label(&self.url))
    }
}

/// Responses captured from one restaurant page.
#[derive(Debug)]
pub struct PageCapture {
    pub url: String,
    pub captures: Vec<CapturedResponse>,
}

/// Result of visiting restaurant pages for their menus.
#[derive(Debug, Default)]
pub struct MenuCapture {
    /// Pages that produced at least one response, in target order.
    pub pages: Vec<PageCapture>,
    pub warnings: Vec<ScrapeWarning>,
}

impl MenuCapture {
    pub fn visited(&self) -> usize {
        self.pages.len()
    }

    pub fn responses(&self) -> usize {
        self.pages.iter().map(|p| p.captures.len()).sum()
    }
}

enum PageOutcome {
    Captured(PageCapture),
    Unavailable(ScrapeWarning),
}

/// One browser process plus the query and settings it serves.
pub struct Session {
    id: String,
    query: SearchQuery,
    config: ScrapeConfig,
    browser: Box<dyn Browser>,
    opened_at: Instant,
}

impl Session {
    /// Launch Chromium and open a session on it.
    pub async fn launch(query: SearchQuery, config: ScrapeConfig) -> ScrapeResult<Self> {
        let browser = ChromiumBrowser::launch(&config.browser).await?;
        Ok(Self::open(Box::new(browser), query, config))
    }

    /// Open a session on an already running browser.
    pub fn open(browser: Box<dyn Browser>, query: SearchQuery, config: ScrapeConfig) -> Self {
        let id = format!("run-{}", uuid::Uuid::new_v4().simple());
        tracing::info!(session = %id, query = %query, "session opened");
        Self {
            id,
            query,
            config,
            browser,
            opened_at: Instant::now(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn query(&self) -> &SearchQuery {
        &self.query
    }

    pub fn config(&self) -> &ScrapeConfig {
        &self.config
    }

    /// Capture everything the search page loads.
    pub async fn capture_search(&self) -> ScrapeResult<Vec<CapturedResponse>> {
        let captures = self
            .capture(self.query.as_str(), self.config.capture.patterns.clone())
            .await?;
        tracing::info!(session = %self.id, responses = captures.len(), "search capture settled");
        Ok(captures)
    }

    /// Visit restaurant pages, a few tabs at a time, and capture their menus.
    ///
    /// A page that fails to load or never settles becomes a
    /// [`ScrapeWarning::MenuUnavailable`]. Losing the browser itself fails the
    /// whole follow-up.
    pub async fn capture_menus(&self, targets: Vec<MenuTarget>) -> ScrapeResult<MenuCapture> {
        let patterns = self.menu_patterns();
        let tabs = Semaphore::new(self.config.follow.max_concurrent_tabs.max(1));

        let mut visits = Vec::with_capacity(targets.len());
        for target in targets {
            visits.push(self.visit_menu(&tabs, &patterns, target));
        }
        let outcomes = futures::future::try_join_all(visits).await?;

        let mut out = MenuCapture::default();
        for outcome in outcomes {
            match outcome {
                PageOutcome::Captured(page) => out.pages.push(page),
                PageOutcome::Unavailable(warning) => out.warnings.push(warning),
            }
        }
        Ok(out)
    }

    async fn visit_menu(
        &self,
        tabs: &Semaphore,
        patterns: &[EndpointPattern],
        target: MenuTarget,
    ) -> ScrapeResult<PageOutcome> {
        let _permit = tabs
            .acquire()
            .await
            .map_err(|e| ScrapeError::browser("waiting for a tab slot", e))?;
        match self.capture_with_retry(&target.url, patterns.to_vec()).await {
            Ok(captures) => Ok(PageOutcome::Captured(PageCapture {
                url: target.url,
                captures,
            })),
            Err(e) if matches!(e.stage(), Stage::Navigation | Stage::Capture) => {
                let warning = ScrapeWarning::MenuUnavailable {
                    restaurant_id: target.label(),
                    reason: e.to_string(),
                    url: target.url,
                };
                tracing::warn!(%warning, "menu follow-up failed");
                Ok(PageOutcome::Unavailable(warning))
            }
            Err(e) => Err(e),
        }
    }

    /// Terminate the browser. Consumes the session so it cannot be reused.
    pub async fn close(mut self) -> ScrapeResult<()> {
        let result = self.browser.shutdown().await;
        tracing::info!(
            session = %self.id,
            elapsed_ms = self.opened_at.elapsed().as_millis() as u64,
            "session closed"
        );
        result
    }

    fn menu_patterns(&self) -> Vec<EndpointPattern> {
        let menu: Vec<EndpointPattern> = self
            .config
            .capture
            .patterns
            .iter()
            .filter(|p| p.name == MENU_PATTERN)
            .cloned()
            .collect();
        if menu.is_empty() {
            self.config.capture.patterns.clone()
        } else {
            menu
        }
    }

    async fn capture_with_retry(
        &self,
        url: &str,
        patterns: Vec<EndpointPattern>,
    ) -> ScrapeResult<Vec<CapturedResponse>> {
        let retries = self.config.follow.retries;
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.capture(url, patterns.clone()).await {
                Ok(captures) => return Ok(captures),
                Err(e) if e.is_timeout() && attempt <= retries => {
                    let delay = backoff(self.config.follow.retry_backoff, attempt);
                    tracing::info!(
                        url,
                        attempt,
                        retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "retrying page"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn capture(
        &self,
        url: &str,
        patterns: Vec<EndpointPattern>,
    ) -> ScrapeResult<Vec<CapturedResponse>> {
        let settings = CaptureSettings {
            patterns,
            ..self.config.capture.clone()
        };
        let mut tab = self.browser.open_tab().await?;
        let outcome = self.capture_in(tab.as_mut(), url, &settings).await;
        if let Err(e) = tab.close().await {
            tracing::debug!(url, error = %e, "tab close failed");
        }
        outcome
    }

    async fn capture_in(
        &self,
        tab: &mut dyn Tab,
        url: &str,
        settings: &CaptureSettings,
    ) -> ScrapeResult<Vec<CapturedResponse>> {
        let handle = capture::attach(&mut *tab, url, settings).await?;
        let timeout_ms = self.config.browser.navigation_timeout.as_millis() as u64;
        let navigation = tab.navigate(url, timeout_ms).await?;
        tracing::debug!(
            url,
            final_url = %navigation.final_url,
            load_time_ms = navigation.load_time_ms,
            "navigated"
        );
        handle.drain(settings.settle).await
    }
}

/// Short name for a restaurant page: its last path segment, else its host.
pub(crate) fn page_label(url: &str) -> String {
    let Ok(parsed) = url::Url::parse(url) else {
        return url.to_string();
    };
    parsed
        .path_segments()
        .and_then(|mut segments| segments.rfind(|s| !s.is_empty()))
        .map(str::to_string)
        .or_else(|| parsed.host_str().map(str::to_string))
        .unwrap_or_else(|| url.to_string())
}

/// Exponential backoff: `base`, `2 * base`, `4 * base`, ...
fn backoff(base: Duration, attempt: u32) -> Duration {
    base * 2u32.saturating_pow(attempt.saturating_sub(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles() {
        let base = Duration::from_secs(1);
        assert_eq!(backoff(base, 1), Duration::from_secs(1));
        assert_eq!(backoff(base, 2), Duration::from_secs(2));
        assert_eq!(backoff(base, 3), Duration::from_secs(4));
    }

    #[test]
    fn test_page_label_prefers_slug() {
        assert_eq!(
            page_label("https://shopeefood.vn/ho-chi-minh/com-tam-ba-ghien"),
            "com-tam-ba-ghien"
        );
        assert_eq!(page_label("https://shopeefood.vn/ho-chi-minh/quan-a/"), "quan-a");
        assert_eq!(page_label("https://shopeefood.vn/"), "shopeefood.vn");
    }

    #[test]
    fn test_menu_target_for_restaurant_needs_url() {
        let mut restaurant = Restaurant {
            id: "7".into(),
            name: "Quán".into(),
            location: None,
            url: None,
        };
        assert_eq!(MenuTarget::for_restaurant(&restaurant), None);
        restaurant.url = Some("https://shopeefood.vn/ho-chi-minh/quan".into());
        let target = MenuTarget::for_restaurant(&restaurant).unwrap();
        assert_eq!(target.label(), "7");
        assert_eq!(MenuTarget::page("https://shopeefood.vn/ho-chi-minh/quan").label(), "quan");
    }
}
