//! Browser abstraction for the session controller.
//!
//! Defines the `Browser` and `Tab` traits that abstract over the browser
//! engine (currently Chromium via chromiumoxide), so a run can be driven by
//! a scripted fake in tests.

pub mod chromium;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::capture::CaptureSink;
use crate::error::ScrapeResult;

/// Result of navigating a tab.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Navigation {
    /// The final URL after any redirects.
    pub final_url: String,
    /// Time taken to load the page in milliseconds.
    pub load_time_ms: u64,
}

/// A running browser that can open tabs.
#[async_trait]
pub trait Browser: Send + Sync {
    /// Open a blank tab.
    async fn open_tab(&self) -> ScrapeResult<Box<dyn Tab>>;
    /// Terminate the browser process. Must be safe to call after failures.
    async fn shutdown(&mut self) -> ScrapeResult<()>;
}

/// A single tab.
#[async_trait]
pub trait Tab: Send + Sync {
    /// Start forwarding network responses to `sink`.
    async fn attach(&mut self, sink: CaptureSink) -> ScrapeResult<()>;
    /// Load `url`, failing with `NavigationTimeout` after `timeout_ms`.
    async fn navigate(&mut self, url: &str, timeout_ms: u64) -> ScrapeResult<Navigation>;
    /// Close the tab and stop its network listener.
    async fn close(self: Box<Self>) -> ScrapeResult<()>;
}
