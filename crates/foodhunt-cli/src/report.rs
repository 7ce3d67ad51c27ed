//! Human-readable and JSON rendering of run results and errors.

use std::fmt::Write as _;

use foodhunt::{Deal, Restaurant, ScrapeError, ScrapeReport};
use serde_json::{json, Value};

/// Deals grouped by restaurant. Groups appear in order of their cheapest deal.
pub fn render_deals(report: &ScrapeReport) -> String {
    let mut out = String::new();

    if report.deals.is_empty() {
        let _ = writeln!(
            out,
            "No items under {} on {}",
            format_amount(report.threshold),
            report.query
        );
    } else {
        let _ = writeln!(
            out,
            "{} {} under {} on {}",
            report.deals.len(),
            plural(report.deals.len(), "deal", "deals"),
            format_amount(report.threshold),
            report.query
        );

        for group in group_by_restaurant(&report.deals) {
            let _ = writeln!(out);
            let _ = writeln!(out, "{} [{}]", group[0].restaurant_name, group[0].restaurant_id);
            for deal in group {
                let price = format!("{} {}", format_amount(deal.price), deal.currency);
                let _ = write!(out, "  {price:>12}  {}", deal.item_name);
                if let Some(original) = deal.original_price {
                    let _ = write!(out, "  (was {} {})", format_amount(original), deal.currency);
                }
                let _ = writeln!(out);
            }
        }
    }

    let stats = &report.stats;
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "{} restaurants, {} items, {} responses captured, {} menus followed",
        stats.restaurants, stats.menu_items, stats.responses_captured, stats.menus_followed
    );
    if !report.warnings.is_empty() {
        let _ = writeln!(
            out,
            "{} {} (use --json or --log-level warn for details)",
            report.warnings.len(),
            plural(report.warnings.len(), "warning", "warnings")
        );
    }
    out
}

/// One line per restaurant.
pub fn render_restaurants(restaurants: &[Restaurant]) -> String {
    let mut out = String::new();
    if restaurants.is_empty() {
        out.push_str("No restaurants found\n");
        return out;
    }
    for r in restaurants {
        let _ = write!(out, "{:>10}  {}", r.id, r.name);
        if let Some(location) = &r.location {
            let _ = write!(out, " ({location})");
        }
        if let Some(url) = &r.url {
            let _ = write!(out, "  {url}");
        }
        let _ = writeln!(out);
    }
    out
}

/// Process exit code for a failed command.
pub fn exit_code(err: &anyhow::Error) -> i32 {
    err.downcast_ref::<ScrapeError>()
        .map(ScrapeError::exit_code)
        .unwrap_or(foodhunt::error::exit_codes::OTHER)
}

/// Error text for stderr, or a JSON error object when `json` is set.
pub fn render_error(err: &anyhow::Error, json: bool) -> String {
    match err.downcast_ref::<ScrapeError>() {
        Some(e) if json => error_json(e).to_string(),
        Some(e) => format!("Error: {}: {e}", e.stage()),
        None if json => json!({"ok": false, "stage": "cli", "error": format!("{err:#}")}).to_string(),
        None => format!("Error: {err:#}"),
    }
}

/// `{"ok": false, "stage": ..., "error": ...}`
pub fn error_json(err: &ScrapeError) -> Value {
    json!({
        "ok": false,
        "stage": err.stage().to_string(),
        "error": err.to_string(),
    })
}

fn group_by_restaurant(deals: &[Deal]) -> Vec<Vec<&Deal>> {
    let mut groups: Vec<Vec<&Deal>> = Vec::new();
    for deal in deals {
        match groups
            .iter_mut()
            .find(|g| g[0].restaurant_id == deal.restaurant_id)
        {
            Some(group) => group.push(deal),
            None => groups.push(vec![deal]),
        }
    }
    groups
}

/// `1000` -> `1,000`; fractional amounts keep two decimals.
fn format_amount(amount: f64) -> String {
    if amount.fract() != 0.0 || amount.abs() >= 1e15 {
        return format!("{amount:.2}");
    }
    let digits = format!("{}", amount.abs() as u64);
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if amount < 0.0 {
        grouped.insert(0, '-');
    }
    grouped
}

fn plural<'a>(n: usize, one: &'a str, many: &'a str) -> &'a str {
    if n == 1 {
        one
    } else {
        many
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use foodhunt::{ScrapeStats, ScrapeWarning};

    fn deal(restaurant_id: &str, restaurant: &str, item: &str, price: f64) -> Deal {
        Deal {
            restaurant_id: restaurant_id.into(),
            restaurant_name: restaurant.into(),
            item_id: format!("{restaurant_id}-{item}"),
            item_name: item.into(),
            price,
            original_price: None,
            currency: "₫".into(),
        }
    }

    fn report(deals: Vec<Deal>) -> ScrapeReport {
        ScrapeReport {
            query: "https://shopeefood.vn/ho-chi-minh/food/danh-sach-dia-diem?q=tra".into(),
            threshold: 100.0,
            deals,
            warnings: Vec::new(),
            stats: ScrapeStats::default(),
        }
    }

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(1.0), "1");
        assert_eq!(format_amount(1000.0), "1,000");
        assert_eq!(format_amount(1234567.0), "1,234,567");
        assert_eq!(format_amount(99.5), "99.50");
    }

    #[test]
    fn test_deals_grouped_by_restaurant() {
        let mut r = report(vec![
            deal("1", "Quán A", "Trà đá", 1.0),
            deal("2", "Quán B", "Khăn lạnh", 2.0),
            deal("1", "Quán A", "Chè", 50.0),
        ]);
        r.deals[2].original_price = Some(25000.0);
        let text = render_deals(&r);

        assert!(text.starts_with("3 deals under 100 on "));
        let a = text.find("Quán A [1]").unwrap();
        let b = text.find("Quán B [2]").unwrap();
        assert!(a < b);
        assert_eq!(text.matches("Quán A").count(), 1);
        assert!(text.contains("(was 25,000 ₫)"));
    }

    #[test]
    fn test_empty_report_and_warning_count() {
        let mut r = report(Vec::new());
        r.warnings.push(ScrapeWarning::MenuUnavailable {
            restaurant_id: "7".into(),
            url: "https://shopeefood.vn/quan-7".into(),
            reason: "timed out".into(),
        });
        let text = render_deals(&r);
        assert!(text.starts_with("No items under 100"));
        assert!(text.contains("1 warning (use --json"));
    }

    #[test]
    fn test_restaurant_lines() {
        let text = render_restaurants(&[Restaurant {
            id: "1".into(),
            name: "Quán A".into(),
            location: Some("12 Lý Tự Trọng".into()),
            url: None,
        }]);
        assert!(text.contains("Quán A (12 Lý Tự Trọng)"));
        assert_eq!(render_restaurants(&[]), "No restaurants found\n");
    }

    #[test]
    fn test_scrape_errors_keep_stage_and_exit_code() {
        let err = anyhow::Error::from(ScrapeError::CaptureTimeout {
            url: "https://shopeefood.vn".into(),
            reason: "nothing matched".into(),
        });
        assert_eq!(exit_code(&err), 4);
        assert!(render_error(&err, false).starts_with("Error: capture: "));

        let value: Value = serde_json::from_str(&render_error(&err, true)).unwrap();
        assert_eq!(value["ok"], false);
        assert_eq!(value["stage"], "capture");
    }

    #[test]
    fn test_other_errors_exit_one() {
        let err = anyhow::anyhow!("address already in use");
        assert_eq!(exit_code(&err), 1);
        assert_eq!(render_error(&err, false), "Error: address already in use");
    }
}
