//! End-to-end runs: search capture, parse, menu follow-up, extraction. Batches
//! of restaurant pages skip the search step.

use std::collections::BTreeSet;

use crate::browser::Browser;
use crate::config::ScrapeConfig;
use crate::error::{ScrapeError, ScrapeResult};
use crate::extract::extract_with_stats;
use crate::parse::{parse, ParseOutput};
use crate::session::{page_label, MenuTarget, Session};
use crate::types::{Restaurant, ScrapeReport, ScrapeStats, SearchQuery};

/// Scrape `url` and return items cheaper than `threshold`.
///
/// Settings other than the threshold come from the environment
/// (see [`ScrapeConfig::from_env`]).
pub async fn run(url: &str, threshold: f64) -> ScrapeResult<ScrapeReport> {
    let config = ScrapeConfig::from_env().with_threshold(threshold);
    run_with_config(url, config).await
}

/// [`run`] with explicit configuration.
pub async fn run_with_config(url: &str, config: ScrapeConfig) -> ScrapeResult<ScrapeReport> {
    let query = SearchQuery::parse(url)?;
    let session = Session::launch(query, config).await?;
    let outcome = tokio::time::timeout(session.config().run_timeout, scrape(&session)).await;
    finish(session, outcome).await
}

/// Run the pipeline on a browser supplied by the caller.
pub async fn run_with_browser(
    browser: Box<dyn Browser>,
    query: SearchQuery,
    config: ScrapeConfig,
) -> ScrapeResult<ScrapeReport> {
    let session = Session::open(browser, query, config);
    let outcome = tokio::time::timeout(session.config().run_timeout, scrape(&session)).await;
    finish(session, outcome).await
}

/// Restaurants listed on the search page, without visiting menus.
pub async fn search_restaurants(url: &str, config: ScrapeConfig) -> ScrapeResult<Vec<Restaurant>> {
    let query = SearchQuery::parse(url)?;
    let session = Session::launch(query, config).await?;
    let outcome =
        tokio::time::timeout(session.config().run_timeout, list_restaurants(&session)).await;
    finish(session, outcome).await
}

/// [`search_restaurants`] on a browser supplied by the caller.
pub async fn search_restaurants_with_browser(
    browser: Box<dyn Browser>,
    query: SearchQuery,
    config: ScrapeConfig,
) -> ScrapeResult<Vec<Restaurant>> {
    let session = Session::open(browser, query, config);
    let outcome =
        tokio::time::timeout(session.config().run_timeout, list_restaurants(&session)).await;
    finish(session, outcome).await
}

/// Scrape a list of restaurant pages directly and return their items cheaper
/// than the configured threshold, without a search page.
///
/// Restaurant names are taken from the page URLs. Pages share one browser and
/// are visited `follow.max_concurrent_tabs` at a time.
pub async fn deals_for_pages(urls: &[String], config: ScrapeConfig) -> ScrapeResult<ScrapeReport> {
    let pages = parse_pages(urls)?;
    let session = Session::launch(pages[0].clone(), config).await?;
    let outcome =
        tokio::time::timeout(session.config().run_timeout, scrape_pages(&session, &pages)).await;
    finish(session, outcome).await
}

/// [`deals_for_pages`] on a browser supplied by the caller.
pub async fn deals_for_pages_with_browser(
    browser: Box<dyn Browser>,
    urls: &[String],
    config: ScrapeConfig,
) -> ScrapeResult<ScrapeReport> {
    let pages = parse_pages(urls)?;
    let session = Session::open(browser, pages[0].clone(), config);
    let outcome =
        tokio::time::timeout(session.config().run_timeout, scrape_pages(&session, &pages)).await;
    finish(session, outcome).await
}

fn parse_pages(urls: &[String]) -> ScrapeResult<Vec<SearchQuery>> {
    if urls.is_empty() {
        return Err(ScrapeError::InvalidQuery("no restaurant URLs".into()));
    }
    urls.iter().map(|url| SearchQuery::parse(url)).collect()
}

/// Close the session whatever happened, then turn the timed outcome into the
/// run result. A timed-out run discards everything it gathered.
async fn finish<T>(
    session: Session,
    outcome: Result<ScrapeResult<T>, tokio::time::error::Elapsed>,
) -> ScrapeResult<T> {
    let limit = session.config().run_timeout;
    let session_id = session.id().to_string();
    if let Err(e) = session.close().await {
        tracing::warn!(session = %session_id, error = %e, "session teardown failed");
    }

    match outcome {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => {
            tracing::error!(session = %session_id, stage = %e.stage(), error = %e, "run failed");
            Err(e)
        }
        Err(_) => {
            let e = ScrapeError::RunTimeout {
                timeout_ms: limit.as_millis() as u64,
            };
            tracing::error!(session = %session_id, error = %e, "run cancelled");
            Err(e)
        }
    }
}

async fn list_restaurants(session: &Session) -> ScrapeResult<Vec<Restaurant>> {
    let captures = session.capture_search().await?;
    let parsed = parse(&captures, &session.config().currency);
    Ok(dedup_restaurants(parsed.restaurants))
}

async fn scrape(session: &Session) -> ScrapeResult<ScrapeReport> {
    let config = session.config();
    let captures = session.capture_search().await?;

    let mut stats = ScrapeStats {
        responses_captured: captures.len(),
        ..ScrapeStats::default()
    };
    let mut parsed = parse(&captures, &config.currency);

    if config.follow.enabled {
        let pending: Vec<MenuTarget> = restaurants_missing_menus(&parsed)
            .iter()
            .filter_map(MenuTarget::for_restaurant)
            .collect();
        if !pending.is_empty() {
            tracing::info!(restaurants = pending.len(), "following restaurant pages for menus");
            let followed = session.capture_menus(pending).await?;
            stats.responses_captured += followed.responses();
            stats.menus_followed = followed.visited();
            parsed.warnings.extend(followed.warnings);
            for page in &followed.pages {
                parsed.merge(parse(&page.captures, &config.currency));
            }
        }
    }

    Ok(build_report(session.query().to_string(), config, parsed, stats))
}

async fn scrape_pages(session: &Session, pages: &[SearchQuery]) -> ScrapeResult<ScrapeReport> {
    let config = session.config();
    let targets = pages
        .iter()
        .map(|page| MenuTarget::page(page.as_str()))
        .collect();
    let followed = session.capture_menus(targets).await?;

    let stats = ScrapeStats {
        responses_captured: followed.responses(),
        menus_followed: followed.visited(),
        ..ScrapeStats::default()
    };
    let mut parsed = ParseOutput::default();
    parsed.warnings.extend(followed.warnings);
    for page in &followed.pages {
        let mut page_parsed = parse(&page.captures, &config.currency);
        // Menus name restaurants by id only; the page slug stands in for a name.
        let name = page_label(&page.url);
        for id in &page_parsed.menus_for {
            page_parsed.restaurants.push(Restaurant {
                id: id.clone(),
                name: name.clone(),
                location: None,
                url: Some(page.url.clone()),
            });
        }
        parsed.merge(page_parsed);
    }

    let query = pages
        .iter()
        .map(SearchQuery::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    Ok(build_report(query, config, parsed, stats))
}

fn build_report(
    query: String,
    config: &ScrapeConfig,
    parsed: ParseOutput,
    mut stats: ScrapeStats,
) -> ScrapeReport {
    let extraction = extract_with_stats(&parsed.restaurants, &parsed.items, config.threshold);
    stats.restaurants = parsed
        .restaurants
        .iter()
        .map(|r| r.id.as_str())
        .collect::<BTreeSet<_>>()
        .len();
    stats.menu_items = parsed.items.len();
    stats.duplicates_removed = extraction.duplicates;
    stats.orphaned_items = extraction.orphaned;

    tracing::info!(
        deals = extraction.deals.len(),
        restaurants = stats.restaurants,
        items = stats.menu_items,
        warnings = parsed.warnings.len(),
        "extraction complete"
    );

    ScrapeReport {
        query,
        threshold: config.threshold,
        deals: extraction.deals,
        warnings: parsed.warnings,
        stats,
    }
}

/// Restaurants with a page URL whose menu has not been captured yet.
fn restaurants_missing_menus(parsed: &ParseOutput) -> Vec<Restaurant> {
    dedup_restaurants(parsed.restaurants.clone())
        .into_iter()
        .filter(|r| r.url.is_some() && !parsed.menus_for.contains(&r.id))
        .collect()
}

/// Keep the last record per id, in first-seen order.
fn dedup_restaurants(restaurants: Vec<Restaurant>) -> Vec<Restaurant> {
    let mut order: Vec<String> = Vec::new();
    let mut latest: std::collections::HashMap<String, Restaurant> = Default::default();
    for restaurant in restaurants {
        if !latest.contains_key(&restaurant.id) {
            order.push(restaurant.id.clone());
        }
        latest.insert(restaurant.id.clone(), restaurant);
    }
    order
        .into_iter()
        .filter_map(|id| latest.remove(&id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn restaurant(id: &str, name: &str, url: Option<&str>) -> Restaurant {
        Restaurant {
            id: id.into(),
            name: name.into(),
            location: None,
            url: url.map(str::to_string),
        }
    }

    #[test]
    fn test_dedup_restaurants_last_wins_first_order() {
        let out = dedup_restaurants(vec![
            restaurant("1", "old", None),
            restaurant("2", "B", None),
            restaurant("1", "new", None),
        ]);
        let names: Vec<&str> = out.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["new", "B"]);
    }

    #[test]
    fn test_batch_needs_at_least_one_valid_url() {
        assert!(matches!(parse_pages(&[]), Err(ScrapeError::InvalidQuery(_))));
        let urls = vec!["https://shopeefood.vn/a".to_string(), "nope".to_string()];
        assert!(matches!(parse_pages(&urls), Err(ScrapeError::InvalidQuery(_))));
    }

    #[test]
    fn test_missing_menus_skips_captured_and_urlless() {
        let mut parsed = ParseOutput::default();
        parsed.restaurants = vec![
            restaurant("1", "A", Some("https://shopeefood.vn/a")),
            restaurant("2", "B", Some("https://shopeefood.vn/b")),
            restaurant("3", "C", None),
        ];
        parsed.menus_for.insert("2".to_string());
        let pending = restaurants_missing_menus(&parsed);
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, "1");
    }
}
