//! foodhunt: capture a food-delivery site's API traffic from a headless
//! browser and pick out unusually cheap menu items.

pub mod browser;
pub mod capture;
pub mod config;
pub mod error;
pub mod extract;
pub mod parse;
pub mod pipeline;
pub mod price;
pub mod session;
pub mod types;

pub use browser::chromium::{find_chromium, ChromiumBrowser};
pub use browser::{Browser, Navigation, Tab};
pub use capture::{CaptureHandle, CaptureSink, EndpointPattern, RawResponse, SettlePolicy};
pub use config::{ScrapeConfig, DEFAULT_THRESHOLD};
pub use error::{ScrapeError, ScrapeResult, Stage};
pub use extract::{extract, extract_with_stats, Extraction};
pub use parse::{detect_shape, parse, ParseOutput, PayloadShape};
pub use pipeline::{
    deals_for_pages, deals_for_pages_with_browser, run, run_with_browser, run_with_config,
    search_restaurants,
};
pub use session::{MenuCapture, MenuTarget, PageCapture, Session};
pub use types::*;
