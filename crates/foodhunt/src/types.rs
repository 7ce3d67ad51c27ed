//! Core data types for captured traffic, restaurants, menu items and deals.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{ScrapeError, ScrapeResult};

/// The search page a run starts from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    url: Url,
}

impl SearchQuery {
    /// Parse and validate a search URL. Only absolute `http(s)` URLs are accepted.
    pub fn parse(raw: &str) -> ScrapeResult<Self> {
        let url = Url::parse(raw.trim())
            .map_err(|e| ScrapeError::InvalidQuery(format!("{raw}: {e}")))?;
        match url.scheme() {
            "http" | "https" => {}
            other => {
                return Err(ScrapeError::InvalidQuery(format!(
                    "{raw}: unsupported scheme '{other}'"
                )))
            }
        }
        if url.host_str().is_none() {
            return Err(ScrapeError::InvalidQuery(format!("{raw}: missing host")));
        }
        Ok(Self { url })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }
}

impl std::fmt::Display for SearchQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.url.as_str())
    }
}

/// A network response recorded by the interceptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapturedResponse {
    /// Arrival order within one capture handle.
    pub seq: u64,
    /// Name of the endpoint pattern that matched.
    pub pattern: String,
    /// URL of the request that produced this response.
    pub request_url: String,
    pub status: u16,
    pub mime_type: String,
    /// Response body, decoded to text.
    pub body: String,
    pub captured_at: DateTime<Utc>,
}

/// A restaurant listed in a search-results payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Restaurant {
    /// Site-assigned identifier, also used to request the menu.
    pub id: String,
    pub name: String,
    pub location: Option<String>,
    /// Restaurant page, visited when its menu was not seen on the search page.
    pub url: Option<String>,
}

/// A dish from a menu payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MenuItem {
    pub id: String,
    pub name: String,
    /// Back-reference to [`Restaurant::id`].
    pub restaurant_id: String,
    /// Listed price. Always finite and non-negative.
    pub price: f64,
    /// Discounted price, when the menu advertises one.
    pub discount_price: Option<f64>,
    pub currency: String,
}

impl MenuItem {
    /// Price the customer actually pays.
    pub fn effective_price(&self) -> f64 {
        self.discount_price.unwrap_or(self.price)
    }
}

/// A menu item priced strictly below the threshold, joined with its restaurant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deal {
    pub restaurant_id: String,
    pub restaurant_name: String,
    pub item_id: String,
    pub item_name: String,
    /// Effective price.
    pub price: f64,
    /// Listed price, present only when a discount brought the item under the threshold.
    pub original_price: Option<f64>,
    pub currency: String,
}

/// A recoverable problem met while scraping. Never aborts a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScrapeWarning {
    /// A captured payload, or one entry in it, could not be decoded.
    PayloadDecode { url: String, reason: String },
    /// A menu item was dropped because one of its prices was malformed.
    PriceNormalization {
        restaurant_id: String,
        item: String,
        raw: String,
        reason: String,
    },
    /// A restaurant page never produced a menu response.
    MenuUnavailable {
        restaurant_id: String,
        url: String,
        reason: String,
    },
}

impl std::fmt::Display for ScrapeWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScrapeWarning::PayloadDecode { url, reason } => {
                write!(f, "payload from {url} skipped: {reason}")
            }
            ScrapeWarning::PriceNormalization {
                restaurant_id,
                item,
                raw,
                reason,
            } => write!(
                f,
                "item '{item}' of restaurant {restaurant_id} dropped, price {raw}: {reason}"
            ),
            ScrapeWarning::MenuUnavailable {
                restaurant_id,
                url,
                reason,
            } => write!(f, "menu of restaurant {restaurant_id} ({url}) unavailable: {reason}"),
        }
    }
}

/// Counters collected over one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapeStats {
    pub responses_captured: usize,
    pub restaurants: usize,
    pub menu_items: usize,
    pub menus_followed: usize,
    pub duplicates_removed: usize,
    pub orphaned_items: usize,
}

/// Everything a run produces: the ordered deals plus diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeReport {
    pub query: String,
    pub threshold: f64,
    pub deals: Vec<Deal>,
    pub warnings: Vec<ScrapeWarning>,
    pub stats: ScrapeStats,
}
