//! Network capture: endpoint matching, the bounded capture buffer, and
//! settle detection.
//!
//! A [`CaptureSink`] is handed to a tab's network listener, which offers it
//! every response the page receives. Matching responses are pushed into a
//! bounded channel; the single [`CaptureHandle`] reader drains that channel
//! until traffic has been idle for the configured window.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::browser::Tab;
use crate::config::CaptureSettings;
use crate::error::{ScrapeError, ScrapeResult};
use crate::types::CapturedResponse;

/// An API endpoint whose responses are worth keeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointPattern {
    pub name: String,
    /// Substring matched against the URL path.
    pub path: String,
    /// Also require a JSON mime type.
    pub require_json: bool,
}

impl EndpointPattern {
    pub fn new(name: &str, path: &str) -> Self {
        Self {
            name: name.to_string(),
            path: path.to_string(),
            require_json: false,
        }
    }

    pub fn json_only(mut self) -> Self {
        self.require_json = true;
        self
    }

    /// Search listing and per-restaurant dish endpoints of the delivery site.
    pub fn defaults() -> Vec<Self> {
        vec![
            Self::new(SEARCH_PATTERN, "/api/delivery/get_infos").json_only(),
            Self::new(MENU_PATTERN, "/api/dish/get_delivery_dishes"),
        ]
    }

    pub fn matches(&self, url: &str, mime_type: &str) -> bool {
        let path = match url::Url::parse(url) {
            Ok(parsed) => parsed.path().to_string(),
            Err(_) => url.split('?').next().unwrap_or(url).to_string(),
        };
        if !path.contains(&self.path) {
            return false;
        }
        !self.require_json || mime_type.to_ascii_lowercase().contains("json")
    }
}

/// Pattern name of the search listing endpoint.
pub const SEARCH_PATTERN: &str = "search";
/// Pattern name of the menu endpoint.
pub const MENU_PATTERN: &str = "menu";

/// When a capture is considered complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettlePolicy {
    /// Quiet period after the last matching response.
    pub idle: Duration,
    /// Hard bound on the whole drain.
    pub overall: Duration,
}

impl Default for SettlePolicy {
    fn default() -> Self {
        Self {
            idle: Duration::from_secs(3),
            overall: Duration::from_secs(30),
        }
    }
}

/// A response as seen by the browser, before matching.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub url: String,
    pub status: u16,
    pub mime_type: String,
    pub body: String,
}

/// Write side of the capture buffer. Cheap to clone.
#[derive(Debug, Clone)]
pub struct CaptureSink {
    tx: mpsc::Sender<CapturedResponse>,
    patterns: Arc<Vec<EndpointPattern>>,
    seq: Arc<AtomicU64>,
}

impl CaptureSink {
    /// Name of the first pattern matching this response, if any.
    ///
    /// Listeners call this before fetching a body so unrelated traffic
    /// (images, fonts, analytics) is never downloaded.
    pub fn matching_pattern(&self, url: &str, mime_type: &str) -> Option<&str> {
        self.patterns
            .iter()
            .find(|p| p.matches(url, mime_type))
            .map(|p| p.name.as_str())
    }

    /// Buffer a response if it matches. Returns `false` once the reader is gone.
    pub async fn record(&self, raw: RawResponse) -> bool {
        let Some(pattern) = self.matching_pattern(&raw.url, &raw.mime_type) else {
            return true;
        };
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(url = %raw.url, pattern, seq, bytes = raw.body.len(), "captured response");
        let captured = CapturedResponse {
            seq,
            pattern: pattern.to_string(),
            request_url: raw.url,
            status: raw.status,
            mime_type: raw.mime_type,
            body: raw.body,
            captured_at: Utc::now(),
        };
        self.tx.send(captured).await.is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Read side of the capture buffer.
#[derive(Debug)]
pub struct CaptureHandle {
    url: String,
    rx: mpsc::Receiver<CapturedResponse>,
}

/// Create a connected sink/handle pair.
pub fn channel(
    url: &str,
    patterns: Vec<EndpointPattern>,
    capacity: usize,
) -> (CaptureSink, CaptureHandle) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let sink = CaptureSink {
        tx,
        patterns: Arc::new(patterns),
        seq: Arc::new(AtomicU64::new(0)),
    };
    let handle = CaptureHandle {
        url: url.to_string(),
        rx,
    };
    (sink, handle)
}

/// Attach an interceptor to `tab`. Must run before the tab navigates.
pub async fn attach(
    tab: &mut dyn Tab,
    url: &str,
    settings: &CaptureSettings,
) -> ScrapeResult<CaptureHandle> {
    let (sink, handle) = channel(url, settings.patterns.clone(), settings.capacity);
    tab.attach(sink).await?;
    Ok(handle)
}

impl CaptureHandle {
    /// Wait for network activity to settle and return everything captured,
    /// in arrival order.
    pub async fn drain(mut self, policy: SettlePolicy) -> ScrapeResult<Vec<CapturedResponse>> {
        let started = Instant::now();
        let deadline = started + policy.overall;
        let mut captured = Vec::new();

        loop {
            let now = Instant::now();
            if now >= deadline {
                return Err(self.timeout(format!(
                    "still receiving after {}ms ({} responses)",
                    policy.overall.as_millis(),
                    captured.len()
                )));
            }
            let remaining = deadline - now;
            let wait = policy.idle.min(remaining);

            match tokio::time::timeout(wait, self.rx.recv()).await {
                Ok(Some(response)) => captured.push(response),
                Ok(None) => {
                    if captured.is_empty() {
                        return Err(self.timeout("listener closed before any response".into()));
                    }
                    break;
                }
                Err(_) if wait < policy.idle => {
                    return Err(self.timeout(format!(
                        "still receiving after {}ms ({} responses)",
                        policy.overall.as_millis(),
                        captured.len()
                    )));
                }
                Err(_) if captured.is_empty() => {
                    return Err(self.timeout(format!(
                        "no matching response within {}ms",
                        policy.idle.as_millis()
                    )));
                }
                Err(_) => break,
            }
        }

        tracing::debug!(
            url = %self.url,
            responses = captured.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "capture settled"
        );
        Ok(captured)
    }

    fn timeout(&self, reason: String) -> ScrapeError {
        ScrapeError::CaptureTimeout {
            url: self.url.clone(),
            reason,
        }
    }
}
